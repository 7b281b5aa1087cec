//! Parametric reverb
//!
//! 16-line feedback delay network with a Householder feedback matrix.
//! Mutually prime delay lengths avoid coincident modes; each line carries
//! a per-band absorption stage whose gains are derived from the requested
//! 3-band T60, so decay rate is frequency dependent. Retunes crossfade
//! the broadband decay gain across the block.

use crate::{AudioEffect, AudioEffectState, IIRFilterer, IIR};
use ef_core::{
    AudioBuffer, AudioSettings, Sample, LOW_MID_CROSSOVER, MID_HIGH_CROSSOVER, NUM_BANDS,
};

/// Number of feedback delay lines
const NUM_DELAY_LINES: usize = 16;

/// Base delay-line lengths in milliseconds; scaled to the sampling rate
/// and snapped to the nearest prime sample count.
const LINE_LENGTHS_MS: [f32; NUM_DELAY_LINES] = [
    23.0, 29.0, 31.0, 37.0, 41.0, 43.0, 47.0, 53.0, 59.0, 61.0, 67.0, 71.0, 73.0, 79.0, 83.0,
    89.0,
];

/// Parameters for `ReverbEffect`
#[derive(Debug, Clone, Copy)]
pub struct ReverbEffectParams {
    /// T60 per band, seconds
    pub reverb_times: [f32; NUM_BANDS],
}

struct DelayLine {
    ring: Vec<Sample>,
    pos: usize,
    /// Broadband (mid-band) decay gain for this line's length
    gain: f32,
    /// Low and high shelves expressing the band T60 ratios
    low_shelf: IIRFilterer,
    high_shelf: IIRFilterer,
}

impl DelayLine {
    fn new(length: usize) -> Self {
        Self {
            ring: vec![0.0; length],
            pos: 0,
            gain: 0.0,
            low_shelf: IIRFilterer::new(IIR::identity()),
            high_shelf: IIRFilterer::new(IIR::identity()),
        }
    }

    #[inline]
    fn read(&self) -> Sample {
        self.ring[self.pos]
    }

    #[inline]
    fn write(&mut self, value: Sample) {
        self.ring[self.pos] = value;
        self.pos += 1;
        if self.pos == self.ring.len() {
            self.pos = 0;
        }
    }
}

/// Feedback-delay-network parametric reverb (mono in, mono out)
pub struct ReverbEffect {
    settings: AudioSettings,
    lines: Vec<DelayLine>,
    prev_times: [f32; NUM_BANDS],
    prev_gains: [f32; NUM_DELAY_LINES],
    first_frame: bool,
    tail_remaining: usize,
    scratch: Vec<Sample>,
}

impl ReverbEffect {
    pub fn new(settings: AudioSettings) -> Self {
        let rate = settings.sampling_rate() as f32;
        let lines = LINE_LENGTHS_MS
            .iter()
            .map(|&ms| DelayLine::new(nearest_prime((ms * 1e-3 * rate) as usize)))
            .collect();
        Self {
            settings,
            lines,
            prev_times: [0.0; NUM_BANDS],
            prev_gains: [0.0; NUM_DELAY_LINES],
            first_frame: true,
            tail_remaining: 0,
            scratch: vec![0.0; settings.frame_size()],
        }
    }

    fn retune(&mut self, reverb_times: &[f32; NUM_BANDS]) {
        let rate = self.settings.sampling_rate();
        let t_mid = reverb_times[1].max(0.01);
        for line in &mut self.lines {
            let seconds = line.ring.len() as f32 / rate as f32;
            // -60 dB over T60: per-pass gain for this line length.
            line.gain = decay_gain(seconds, t_mid);
            let g_low = decay_gain(seconds, reverb_times[0].max(0.01)) / line.gain;
            let g_high = decay_gain(seconds, reverb_times[2].max(0.01)) / line.gain;
            line.low_shelf
                .set_filter(IIR::low_shelf(LOW_MID_CROSSOVER, g_low, rate));
            line.high_shelf
                .set_filter(IIR::high_shelf(MID_HIGH_CROSSOVER, g_high, rate));
        }
        self.prev_times = *reverb_times;
    }

    fn tail_length_samples(&self) -> usize {
        let t_max = self
            .prev_times
            .iter()
            .fold(0.0f32, |acc, &t| acc.max(t));
        (t_max * self.settings.sampling_rate() as f32) as usize
    }

    fn process_block(&mut self, input: &[Sample], output: &mut [Sample], gain_alpha_step: f32) {
        let n = self.lines.len() as f32;
        let feedback_norm = 2.0 / n;
        let out_norm = 1.0 / n.sqrt();

        let mut reads = [0.0f32; NUM_DELAY_LINES];
        for (i, y) in output.iter_mut().enumerate() {
            let x = input.get(i).copied().unwrap_or(0.0);

            let mut sum = 0.0;
            for (r, line) in reads.iter_mut().zip(&self.lines) {
                *r = line.read();
                sum += *r;
            }
            *y = sum * out_norm;

            let k = sum * feedback_norm;
            let alpha = (i as f32 * gain_alpha_step).min(1.0);
            for (j, line) in self.lines.iter_mut().enumerate() {
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                let v = reads[j] - k + x * sign * out_norm;
                let gain = alpha * line.gain + (1.0 - alpha) * self.prev_gains[j];
                let filtered = line.high_shelf.tick(line.low_shelf.tick(v)) * gain;
                line.write(filtered);
            }
        }

        for (prev, line) in self.prev_gains.iter_mut().zip(&self.lines) {
            *prev = line.gain;
        }
    }

    pub fn apply(
        &mut self,
        params: &ReverbEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        debug_assert_eq!(output.num_channels(), 1);
        debug_assert_eq!(input.num_samples(), self.settings.frame_size());

        let changed = params
            .reverb_times
            .iter()
            .zip(&self.prev_times)
            .any(|(a, b)| (a - b).abs() > 1e-6);
        if changed || self.first_frame {
            self.retune(&params.reverb_times);
            if self.first_frame {
                self.prev_gains = core::array::from_fn(|i| self.lines[i].gain);
            }
        }
        self.first_frame = false;

        let frame = input.num_samples();
        let step = 1.0 / frame.max(1) as f32;
        self.scratch.copy_from_slice(input.channel(0));
        let mut src = std::mem::take(&mut self.scratch);
        self.process_block(&src, output.channel_mut(0), step);
        std::mem::swap(&mut self.scratch, &mut src);

        self.tail_remaining = self.tail_length_samples();
        AudioEffectState::TailRemaining
    }
}

impl AudioEffect for ReverbEffect {
    fn reset(&mut self) {
        for line in &mut self.lines {
            line.ring.fill(0.0);
            line.pos = 0;
            line.low_shelf.reset();
            line.high_shelf.reset();
        }
        self.first_frame = true;
        self.tail_remaining = 0;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        let frame = out.num_samples();
        self.process_block(&[], out.channel_mut(0), 0.0);
        self.tail_remaining = self.tail_remaining.saturating_sub(frame);
        if self.tail_remaining == 0 {
            AudioEffectState::TailComplete
        } else {
            AudioEffectState::TailRemaining
        }
    }

    fn num_tail_samples_remaining(&self) -> usize {
        self.tail_remaining
    }
}

/// Per-pass gain producing a 60 dB decay over `t60` seconds for a loop of
/// `loop_seconds`.
fn decay_gain(loop_seconds: f32, t60: f32) -> f32 {
    10.0f32.powf(-3.0 * loop_seconds / t60)
}

fn nearest_prime(n: usize) -> usize {
    let n = n.max(2);
    for offset in 0..n {
        if is_prime(n + offset) {
            return n + offset;
        }
        if n > offset + 1 && is_prime(n - offset) {
            return n - offset;
        }
    }
    n
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    let mut d = 2;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_prime() {
        assert_eq!(nearest_prime(1000), 997);
        assert!(is_prime(nearest_prime(48000 / 10)));
    }

    #[test]
    fn test_impulse_decays() {
        let settings = AudioSettings::new(48000, 1024).unwrap();
        let mut effect = ReverbEffect::new(settings);
        let params = ReverbEffectParams {
            reverb_times: [1.0, 0.8, 0.5],
        };

        let mut input = AudioBuffer::new(1, 1024);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBuffer::new(1, 1024);
        effect.apply(&params, &input, &mut output);

        // Collect two seconds of tail and compare early/late energy.
        let mut early = 0.0f32;
        let mut late = 0.0f32;
        let mut tail = AudioBuffer::new(1, 1024);
        for block in 0..90 {
            effect.tail(&mut tail);
            let energy: f32 = tail.channel(0).iter().map(|x| x * x).sum();
            if block < 10 {
                early += energy;
            } else if block >= 80 {
                late += energy;
            }
        }
        assert!(early > 0.0, "reverb produced no early energy");
        assert!(late < early * 1e-2, "tail failed to decay: {late} vs {early}");
    }

    #[test]
    fn test_tail_terminates() {
        let settings = AudioSettings::new(48000, 1024).unwrap();
        let mut effect = ReverbEffect::new(settings);
        let params = ReverbEffectParams {
            reverb_times: [0.3, 0.3, 0.3],
        };
        let mut input = AudioBuffer::new(1, 1024);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBuffer::new(1, 1024);
        effect.apply(&params, &input, &mut output);

        let mut state = AudioEffectState::TailRemaining;
        let mut blocks = 0;
        while state == AudioEffectState::TailRemaining && blocks < 100 {
            state = effect.tail(&mut output);
            blocks += 1;
        }
        assert_eq!(state, AudioEffectState::TailComplete);
        assert!(blocks <= 16, "tail ran too long: {blocks} blocks");
    }

    #[test]
    fn test_silence_in_silence_out_after_reset() {
        let settings = AudioSettings::new(48000, 512).unwrap();
        let mut effect = ReverbEffect::new(settings);
        effect.reset();
        let input = AudioBuffer::new(1, 512);
        let mut output = AudioBuffer::new(1, 512);
        effect.apply(
            &ReverbEffectParams {
                reverb_times: [1.0; 3],
            },
            &input,
            &mut output,
        );
        assert!(output.channel(0).iter().all(|&x| x == 0.0));
    }
}
