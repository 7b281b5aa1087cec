//! Partitioned overlap-save FIR
//!
//! An impulse response is split into `frame_size` partitions, each
//! transformed to the frequency domain. At apply time the input block is
//! transformed once and multiply-accumulated against every partition
//! through a frequency-domain delay line; the inverse transform's second
//! half is the valid output.
//!
//! The FIR itself lives inside a `TripleBuffer` so the simulation thread
//! can update it without locks: fill the write slot, publish, and the
//! audio thread picks it up at the next block boundary.

use crate::Fft;
use ef_core::{Sample, TripleBuffer};
use rustfft::num_complex::Complex;
use std::sync::Arc;

/// Frequency-domain impulse response: per-channel partition spectra
pub struct OverlapSaveFIR {
    frame_size: usize,
    num_channels: usize,
    num_blocks: usize,
    /// `[channel][partition][bin]`, each spectrum `frame_size + 1` bins
    spectra: Vec<Vec<Vec<Complex<f32>>>>,
    /// Number of partitions that actually carry data after the last update
    num_valid_blocks: usize,
}

impl OverlapSaveFIR {
    /// Allocate for an IR of up to `ir_size` samples.
    pub fn new(num_channels: usize, ir_size: usize, frame_size: usize) -> Self {
        let num_blocks = ir_size.div_ceil(frame_size).max(1);
        let num_bins = frame_size + 1;
        Self {
            frame_size,
            num_channels,
            num_blocks,
            spectra: vec![
                vec![vec![Complex::new(0.0, 0.0); num_bins]; num_blocks];
                num_channels
            ],
            num_valid_blocks: 0,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn num_valid_blocks(&self) -> usize {
        self.num_valid_blocks
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn spectrum(&self, channel: usize, partition: usize) -> &[Complex<f32>] {
        &self.spectra[channel][partition]
    }

    /// Zero all partitions.
    pub fn reset(&mut self) {
        for channel in &mut self.spectra {
            for partition in channel.iter_mut() {
                partition.fill(Complex::new(0.0, 0.0));
            }
        }
        self.num_valid_blocks = 0;
    }

    /// Triple buffer of identically-shaped FIRs for lock-free IR updates.
    pub fn triple_buffer(
        num_channels: usize,
        ir_size: usize,
        frame_size: usize,
    ) -> Arc<TripleBuffer<OverlapSaveFIR>> {
        Arc::new(TripleBuffer::new_with(|| {
            OverlapSaveFIR::new(num_channels, ir_size, frame_size)
        }))
    }
}

impl std::fmt::Debug for OverlapSaveFIR {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlapSaveFIR")
            .field("frame_size", &self.frame_size)
            .field("num_channels", &self.num_channels)
            .field("num_blocks", &self.num_blocks)
            .finish()
    }
}

/// Transforms time-domain impulse responses into `OverlapSaveFIR`s
pub struct OverlapSavePartitioner {
    frame_size: usize,
    fft: Fft,
    time_scratch: Vec<f32>,
}

impl OverlapSavePartitioner {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frame_size,
            fft: Fft::new(2 * frame_size),
            time_scratch: vec![0.0; 2 * frame_size],
        }
    }

    /// Partition one IR channel into `fir`'s spectra for `channel`.
    pub fn partition_channel(&mut self, ir: &[f32], channel: usize, fir: &mut OverlapSaveFIR) {
        debug_assert_eq!(fir.frame_size, self.frame_size);
        let frame = self.frame_size;
        let used = ir.len().div_ceil(frame).min(fir.num_blocks);
        for block in 0..fir.num_blocks {
            let spectrum = &mut fir.spectra[channel][block];
            if block >= used {
                spectrum.fill(Complex::new(0.0, 0.0));
                continue;
            }
            let start = block * frame;
            let end = (start + frame).min(ir.len());
            self.time_scratch.fill(0.0);
            self.time_scratch[..end - start].copy_from_slice(&ir[start..end]);
            self.fft.forward(&mut self.time_scratch, spectrum);
        }
        fir.num_valid_blocks = fir.num_valid_blocks.max(used);
    }

    /// Partition a whole multichannel IR.
    pub fn partition(&mut self, channels: &[&[f32]], fir: &mut OverlapSaveFIR) {
        debug_assert_eq!(channels.len(), fir.num_channels);
        fir.num_valid_blocks = 0;
        for (ch, ir) in channels.iter().enumerate() {
            self.partition_channel(ir, ch, fir);
        }
    }
}

/// Shared overlap-save convolution engine: one mono input stream against a
/// multichannel partitioned FIR. Used by the convolution effect and by
/// per-speaker HRTF lanes.
pub struct OverlapSaveEngine {
    frame_size: usize,
    num_blocks: usize,
    fft: Fft,
    /// Sliding window of the last two input blocks
    window: Vec<f32>,
    /// Frequency-domain delay line of past input spectra (ring)
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,
    acc: Vec<Complex<f32>>,
    time_scratch: Vec<f32>,
}

impl OverlapSaveEngine {
    pub fn new(num_blocks: usize, frame_size: usize) -> Self {
        let fft = Fft::new(2 * frame_size);
        let num_bins = frame_size + 1;
        Self {
            frame_size,
            num_blocks: num_blocks.max(1),
            window: vec![0.0; 2 * frame_size],
            fdl: vec![vec![Complex::new(0.0, 0.0); num_bins]; num_blocks.max(1)],
            fdl_pos: 0,
            acc: fft.make_spectrum(),
            time_scratch: vec![0.0; 2 * frame_size],
            fft,
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    pub fn reset(&mut self) {
        self.window.fill(0.0);
        for spectrum in &mut self.fdl {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.fdl_pos = 0;
    }

    /// Slide the window, transform the new input block, and push its
    /// spectrum into the delay line. Call once per block, before
    /// `convolve`. Pass an empty slice during the tail phase.
    pub fn push_input(&mut self, input: &[f32]) {
        let frame = self.frame_size;
        self.window.copy_within(frame.., 0);
        let tail = &mut self.window[frame..];
        tail.fill(0.0);
        let n = input.len().min(frame);
        tail[..n].copy_from_slice(&input[..n]);

        self.time_scratch.copy_from_slice(&self.window);
        self.fdl_pos = (self.fdl_pos + 1) % self.num_blocks;
        let spectrum = &mut self.fdl[self.fdl_pos];
        self.fft.forward(&mut self.time_scratch, spectrum);
    }

    /// Multiply-accumulate the delay line against one channel's partition
    /// spectra and write the valid output samples.
    pub fn convolve(&mut self, fir: &OverlapSaveFIR, channel: usize, output: &mut [Sample]) {
        debug_assert_eq!(output.len(), self.frame_size);
        let blocks = fir.num_blocks().min(self.num_blocks);

        self.acc.fill(Complex::new(0.0, 0.0));
        for k in 0..blocks {
            let fdl_index = (self.fdl_pos + self.num_blocks - k) % self.num_blocks;
            let input_spectrum = &self.fdl[fdl_index];
            let ir_spectrum = fir.spectrum(channel, k);
            for ((a, x), h) in self.acc.iter_mut().zip(input_spectrum).zip(ir_spectrum) {
                *a += x * h;
            }
        }

        self.fft.inverse(&mut self.acc, &mut self.time_scratch);
        output.copy_from_slice(&self.time_scratch[self.frame_size..]);
    }

    /// Convolve against a raw spectrum list instead of an `OverlapSaveFIR`
    /// (used by HRTF lanes that own their partition spectra directly).
    pub fn convolve_spectra(&mut self, partitions: &[Vec<Complex<f32>>], output: &mut [Sample]) {
        debug_assert_eq!(output.len(), self.frame_size);
        let blocks = partitions.len().min(self.num_blocks);

        self.acc.fill(Complex::new(0.0, 0.0));
        for (k, ir_spectrum) in partitions.iter().take(blocks).enumerate() {
            let fdl_index = (self.fdl_pos + self.num_blocks - k) % self.num_blocks;
            let input_spectrum = &self.fdl[fdl_index];
            for ((a, x), h) in self.acc.iter_mut().zip(input_spectrum).zip(ir_spectrum) {
                *a += x * h;
            }
        }

        self.fft.inverse(&mut self.acc, &mut self.time_scratch);
        output.copy_from_slice(&self.time_scratch[self.frame_size..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct_convolution(x: &[f32], h: &[f32], len: usize) -> Vec<f32> {
        let mut out = vec![0.0; len];
        for (i, o) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (j, &hj) in h.iter().enumerate() {
                if i >= j && i - j < x.len() {
                    sum += x[i - j] * hj;
                }
            }
            *o = sum;
        }
        out
    }

    #[test]
    fn test_streamed_equals_direct_convolution() {
        let frame = 64;
        let ir: Vec<f32> = (0..200).map(|i| ((i * 13 % 31) as f32 - 15.0) * 0.01).collect();
        let input: Vec<f32> = (0..frame * 6)
            .map(|i| ((i * 7 % 23) as f32 - 11.0) * 0.05)
            .collect();

        let mut fir = OverlapSaveFIR::new(1, ir.len(), frame);
        let mut partitioner = OverlapSavePartitioner::new(frame);
        partitioner.partition(&[&ir], &mut fir);

        let mut engine = OverlapSaveEngine::new(fir.num_blocks(), frame);
        let mut streamed = Vec::new();
        let mut block_out = vec![0.0; frame];
        for block in input.chunks(frame) {
            engine.push_input(block);
            engine.convolve(&fir, 0, &mut block_out);
            streamed.extend_from_slice(&block_out);
        }

        let expected = direct_convolution(&input, &ir, streamed.len());
        let err: f32 = streamed
            .iter()
            .zip(&expected)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            / streamed.len() as f32;
        assert!(err.sqrt() < 1e-4, "rms error {}", err.sqrt());
    }

    #[test]
    fn test_identity_ir_passthrough() {
        let frame = 32;
        let mut ir = vec![0.0f32; frame];
        ir[0] = 1.0;

        let mut fir = OverlapSaveFIR::new(1, frame, frame);
        let mut partitioner = OverlapSavePartitioner::new(frame);
        partitioner.partition(&[&ir], &mut fir);

        let mut engine = OverlapSaveEngine::new(1, frame);
        let input: Vec<f32> = (0..frame).map(|i| i as f32 * 0.01).collect();
        let mut out = vec![0.0; frame];
        engine.push_input(&input);
        engine.convolve(&fir, 0, &mut out);
        for (a, b) in input.iter().zip(&out) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_triple_buffer_update() {
        let frame = 32;
        let buffer = OverlapSaveFIR::triple_buffer(1, frame, frame);

        // Simulation side writes and publishes.
        {
            let fir = buffer.write();
            let mut ir = vec![0.0f32; frame];
            ir[0] = 0.5;
            let mut partitioner = OverlapSavePartitioner::new(frame);
            partitioner.partition(&[&ir], fir);
        }
        buffer.publish();

        // Audio side sees the committed IR at the next block.
        let fir = buffer.acquire_read();
        assert_eq!(fir.num_valid_blocks(), 1);
        let mut engine = OverlapSaveEngine::new(1, frame);
        let mut out = vec![0.0; frame];
        engine.push_input(&[1.0; 32]);
        engine.convolve(fir, 0, &mut out);
        assert!((out[0] - 0.5).abs() < 1e-4);
    }
}
