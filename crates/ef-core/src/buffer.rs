//! Multichannel audio buffers
//!
//! Non-interleaved layout: one contiguous row per channel. Effects write
//! every sample of every channel on each `apply`.

use crate::Sample;

/// Ambisonics channel normalization conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AmbisonicsType {
    /// Full 3-D normalization (internal canonical form)
    N3D,
    /// Schmidt semi-normalized
    SN3D,
    /// FuMa (SN3D with a -3 dB W channel)
    FuMa,
}

/// Rectangular block of audio: `channels` rows of `samples` floats
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    data: Vec<Vec<Sample>>,
    num_samples: usize,
}

impl AudioBuffer {
    /// Allocate a zeroed buffer
    pub fn new(num_channels: usize, num_samples: usize) -> Self {
        Self {
            data: vec![vec![0.0; num_samples]; num_channels],
            num_samples,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.data.len()
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Immutable channel row
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.data[index]
    }

    /// Mutable channel row
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.data[index]
    }

    /// Two distinct mutable channel rows
    pub fn channel_pair_mut(&mut self, a: usize, b: usize) -> (&mut [Sample], &mut [Sample]) {
        assert!(a < b);
        let (head, tail) = self.data.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    }

    /// Zero every sample
    pub fn make_silent(&mut self) {
        for channel in &mut self.data {
            channel.fill(0.0);
        }
    }

    /// Accumulate a same-shape buffer into this one
    pub fn mix(&mut self, other: &AudioBuffer) {
        debug_assert_eq!(self.num_channels(), other.num_channels());
        debug_assert_eq!(self.num_samples(), other.num_samples());
        for (dst, src) in self.data.iter_mut().zip(&other.data) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d += *s;
            }
        }
    }

    /// Scale every sample
    pub fn scale(&mut self, gain: Sample) {
        for channel in &mut self.data {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }

    /// Average all channels into a mono buffer
    pub fn downmix(&self, out: &mut AudioBuffer) {
        debug_assert_eq!(out.num_channels(), 1);
        debug_assert_eq!(out.num_samples(), self.num_samples());
        let norm = 1.0 / self.num_channels() as Sample;
        let mono = out.channel_mut(0);
        for (i, sample) in mono.iter_mut().enumerate() {
            let mut sum = 0.0;
            for channel in &self.data {
                sum += channel[i];
            }
            *sample = sum * norm;
        }
    }

    /// Transpose into a packed interleaved stream
    pub fn interleave(&self, out: &mut [Sample]) {
        let channels = self.num_channels();
        debug_assert_eq!(out.len(), channels * self.num_samples);
        for (ch, row) in self.data.iter().enumerate() {
            for (i, &sample) in row.iter().enumerate() {
                out[i * channels + ch] = sample;
            }
        }
    }

    /// Fill from a packed interleaved stream
    pub fn deinterleave(&mut self, input: &[Sample]) {
        let channels = self.num_channels();
        debug_assert_eq!(input.len(), channels * self.num_samples);
        for (ch, row) in self.data.iter_mut().enumerate() {
            for (i, sample) in row.iter_mut().enumerate() {
                *sample = input[i * channels + ch];
            }
        }
    }

    /// Re-weight ambisonics channels from one normalization to another.
    ///
    /// Channel ordering stays ACN throughout; only per-degree weights
    /// change. FuMa is treated as SN3D with a 1/sqrt(2) weight on
    /// channel 0.
    pub fn convert_ambisonics(&mut self, from: AmbisonicsType, to: AmbisonicsType) {
        if from == to {
            return;
        }
        for (acn, channel) in self.data.iter_mut().enumerate() {
            let l = (acn as f32).sqrt().floor() as i32;
            let weight = ambisonics_weight(from, to, l, acn);
            if (weight - 1.0).abs() > f32::EPSILON {
                for sample in channel.iter_mut() {
                    *sample *= weight;
                }
            }
        }
    }
}

fn ambisonics_weight(from: AmbisonicsType, to: AmbisonicsType, l: i32, acn: usize) -> f32 {
    // Conversion factor through the N3D canonical form.
    let n3d_over_sn3d = ((2 * l + 1) as f32).sqrt();
    let to_n3d = match from {
        AmbisonicsType::N3D => 1.0,
        AmbisonicsType::SN3D => n3d_over_sn3d,
        AmbisonicsType::FuMa => {
            let w = if acn == 0 { (2.0f32).sqrt() } else { 1.0 };
            n3d_over_sn3d * w
        }
    };
    let from_n3d = match to {
        AmbisonicsType::N3D => 1.0,
        AmbisonicsType::SN3D => 1.0 / n3d_over_sn3d,
        AmbisonicsType::FuMa => {
            let w = if acn == 0 { 1.0 / (2.0f32).sqrt() } else { 1.0 };
            w / n3d_over_sn3d
        }
    };
    to_n3d * from_n3d
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_interleave_roundtrip() {
        let mut buffer = AudioBuffer::new(3, 4);
        for ch in 0..3 {
            for i in 0..4 {
                buffer.channel_mut(ch)[i] = (ch * 10 + i) as f32;
            }
        }
        let mut packed = vec![0.0; 12];
        buffer.interleave(&mut packed);

        let mut back = AudioBuffer::new(3, 4);
        back.deinterleave(&packed);
        for ch in 0..3 {
            assert_eq!(buffer.channel(ch), back.channel(ch));
        }
    }

    #[test]
    fn test_downmix_mono_identity() {
        let mut buffer = AudioBuffer::new(1, 8);
        for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
            *s = i as f32 * 0.1;
        }
        let mut mono = AudioBuffer::new(1, 8);
        buffer.downmix(&mut mono);
        for i in 0..8 {
            assert_relative_eq!(mono.channel(0)[i], buffer.channel(0)[i]);
        }
    }

    #[test]
    fn test_mix_accumulates() {
        let mut a = AudioBuffer::new(2, 4);
        let mut b = AudioBuffer::new(2, 4);
        a.channel_mut(0)[0] = 1.0;
        b.channel_mut(0)[0] = 0.5;
        a.mix(&b);
        assert_relative_eq!(a.channel(0)[0], 1.5);
    }

    #[test]
    fn test_ambisonics_conversion_roundtrip() {
        let mut buffer = AudioBuffer::new(9, 2);
        for ch in 0..9 {
            buffer.channel_mut(ch)[0] = 1.0;
        }
        buffer.convert_ambisonics(AmbisonicsType::N3D, AmbisonicsType::FuMa);
        buffer.convert_ambisonics(AmbisonicsType::FuMa, AmbisonicsType::N3D);
        for ch in 0..9 {
            assert_relative_eq!(buffer.channel(ch)[0], 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_sn3d_weights() {
        let mut buffer = AudioBuffer::new(4, 1);
        for ch in 0..4 {
            buffer.channel_mut(ch)[0] = 1.0;
        }
        buffer.convert_ambisonics(AmbisonicsType::N3D, AmbisonicsType::SN3D);
        assert_relative_eq!(buffer.channel(0)[0], 1.0);
        // Degree-1 channels divide by sqrt(3).
        assert_relative_eq!(buffer.channel(1)[0], 1.0 / 3.0f32.sqrt(), epsilon = 1e-6);
    }
}
