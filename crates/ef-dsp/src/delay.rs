//! Integer-sample delay line effect

use crate::{AudioEffect, AudioEffectState};
use ef_core::AudioBuffer;

/// Parameters for `DelayEffect`
#[derive(Debug, Clone, Copy)]
pub struct DelayEffectParams {
    /// Delay in whole samples; clamped to the capacity chosen at
    /// construction.
    pub delay_samples: usize,
}

/// Mono circular-buffer delay. A change in delay crossfades between the
/// old and new read taps across the block.
#[derive(Debug, Clone)]
pub struct DelayEffect {
    ring: Vec<f32>,
    write_pos: usize,
    prev_delay: usize,
    first_frame: bool,
    tail_remaining: usize,
}

impl DelayEffect {
    /// `max_delay_samples` bounds the delay reachable at runtime.
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            ring: vec![0.0; max_delay_samples.max(1) + 1],
            write_pos: 0,
            prev_delay: 0,
            first_frame: true,
            tail_remaining: 0,
        }
    }

    fn read_tap(&self, delay: usize, offset: usize) -> f32 {
        let len = self.ring.len();
        let pos = (self.write_pos + offset + len - delay.min(len - 1)) % len;
        self.ring[pos]
    }

    pub fn apply(
        &mut self,
        params: &DelayEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        debug_assert_eq!(output.num_channels(), 1);
        debug_assert_eq!(input.num_samples(), output.num_samples());

        let delay = params.delay_samples.min(self.ring.len() - 1);
        let start_delay = if self.first_frame {
            delay
        } else {
            self.prev_delay
        };
        self.first_frame = false;

        let num_samples = input.num_samples();
        let src = input.channel(0);

        // Write first so zero delay reads back the current sample.
        let len = self.ring.len();
        for (i, &x) in src.iter().enumerate() {
            self.ring[(self.write_pos + i) % len] = x;
        }

        let dst = output.channel_mut(0);
        let denom = num_samples.max(1) as f32;
        for (i, y) in dst.iter_mut().enumerate() {
            let alpha = i as f32 / denom;
            let new = self.read_tap(delay, i);
            if delay == start_delay {
                *y = new;
            } else {
                let old = self.read_tap(start_delay, i);
                *y = alpha * new + (1.0 - alpha) * old;
            }
        }

        self.write_pos = (self.write_pos + num_samples) % len;
        self.prev_delay = delay;
        self.tail_remaining = delay;
        if delay == 0 {
            AudioEffectState::TailComplete
        } else {
            AudioEffectState::TailRemaining
        }
    }
}

impl AudioEffect for DelayEffect {
    fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.prev_delay = 0;
        self.first_frame = true;
        self.tail_remaining = 0;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        let num_samples = out.num_samples();
        let len = self.ring.len();
        for i in 0..num_samples {
            self.ring[(self.write_pos + i) % len] = 0.0;
        }
        let delay = self.prev_delay;
        let dst = out.channel_mut(0);
        for (i, y) in dst.iter_mut().enumerate() {
            *y = self.read_tap(delay, i);
        }
        self.write_pos = (self.write_pos + num_samples) % len;
        self.tail_remaining = self.tail_remaining.saturating_sub(num_samples);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_delayed() {
        let mut effect = DelayEffect::new(256);
        let mut input = AudioBuffer::new(1, 64);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBuffer::new(1, 64);

        effect.apply(&DelayEffectParams { delay_samples: 10 }, &input, &mut output);
        assert_eq!(output.channel(0)[10], 1.0);
        assert!(output.channel(0)[..10].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_tail_flushes_delay_line() {
        let mut effect = DelayEffect::new(256);
        let mut input = AudioBuffer::new(1, 64);
        input.channel_mut(0)[60] = 1.0;
        let mut output = AudioBuffer::new(1, 64);

        let state = effect.apply(&DelayEffectParams { delay_samples: 32 }, &input, &mut output);
        assert_eq!(state, AudioEffectState::TailRemaining);

        let mut tail = AudioBuffer::new(1, 64);
        let state = effect.tail(&mut tail);
        // Impulse written at 60 with delay 32 emerges at index 92 - 64 = 28.
        assert_eq!(tail.channel(0)[28], 1.0);
        assert_eq!(state, AudioEffectState::TailComplete);
    }

    #[test]
    fn test_zero_input_after_reset() {
        let mut effect = DelayEffect::new(128);
        let mut input = AudioBuffer::new(1, 32);
        input.channel_mut(0).fill(0.7);
        let mut output = AudioBuffer::new(1, 32);
        effect.apply(&DelayEffectParams { delay_samples: 16 }, &input, &mut output);

        effect.reset();
        input.make_silent();
        effect.apply(&DelayEffectParams { delay_samples: 16 }, &input, &mut output);
        assert!(output.channel(0).iter().all(|&x| x == 0.0));
    }
}
