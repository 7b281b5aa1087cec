//! Gain effect with per-sample ramping

use crate::{AudioEffect, AudioEffectState};
use ef_core::AudioBuffer;

/// Parameters for `GainEffect`
#[derive(Debug, Clone, Copy)]
pub struct GainEffectParams {
    /// Linear gain applied this block
    pub gain: f32,
}

/// Scalar gain with a linear per-sample ramp from the previous block's
/// value, so gain steps never click.
#[derive(Debug, Clone, Default)]
pub struct GainEffect {
    prev_gain: f32,
    first_frame: bool,
}

impl GainEffect {
    pub fn new() -> Self {
        Self {
            prev_gain: 0.0,
            first_frame: true,
        }
    }

    pub fn apply(
        &mut self,
        params: &GainEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), output.num_channels());
        debug_assert_eq!(input.num_samples(), output.num_samples());

        let start = if self.first_frame {
            params.gain
        } else {
            self.prev_gain
        };
        self.first_frame = false;

        let num_samples = input.num_samples().max(1) as f32;
        for ch in 0..input.num_channels() {
            let src = input.channel(ch);
            let dst = output.channel_mut(ch);
            for (i, (&x, y)) in src.iter().zip(dst.iter_mut()).enumerate() {
                let alpha = i as f32 / num_samples;
                let gain = alpha * params.gain + (1.0 - alpha) * start;
                *y = gain * x;
            }
        }

        self.prev_gain = params.gain;
        AudioEffectState::TailComplete
    }
}

impl AudioEffect for GainEffect {
    fn reset(&mut self) {
        self.prev_gain = 0.0;
        self.first_frame = true;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        out.make_silent();
        AudioEffectState::TailComplete
    }

    fn num_tail_samples_remaining(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_gain() {
        let mut effect = GainEffect::new();
        let mut input = AudioBuffer::new(1, 16);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBuffer::new(1, 16);

        effect.apply(&GainEffectParams { gain: 0.5 }, &input, &mut output);
        // First frame applies the target gain directly.
        assert!(output.channel(0).iter().all(|&x| (x - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_ramped_gain_change() {
        let mut effect = GainEffect::new();
        let mut input = AudioBuffer::new(1, 64);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBuffer::new(1, 64);

        effect.apply(&GainEffectParams { gain: 1.0 }, &input, &mut output);
        effect.apply(&GainEffectParams { gain: 0.0 }, &input, &mut output);

        // Gain ramps monotonically down across the block.
        let samples = output.channel(0);
        assert!((samples[0] - 1.0).abs() < 0.05);
        assert!(samples[63] < 0.05);
        for w in samples.windows(2) {
            assert!(w[1] <= w[0] + 1e-6);
        }
    }
}
