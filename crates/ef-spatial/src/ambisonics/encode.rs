//! Ambisonics encoding

use crate::sh;
use crate::{AudioEffect, AudioEffectState};
use ef_core::{AudioBuffer, Vector3};

/// Settings for `AmbisonicsEncodeEffect`
#[derive(Debug, Clone, Copy)]
pub struct AmbisonicsEncodeEffectSettings {
    pub max_order: usize,
}

/// Parameters for `AmbisonicsEncodeEffect`
#[derive(Debug, Clone, Copy)]
pub struct AmbisonicsEncodeEffectParams {
    /// Source direction in the ambisonics reference frame
    pub direction: Vector3,
    /// Requested order, clamped to the construction-time maximum
    pub order: usize,
}

/// Projects a mono stream onto SH channels, crossfading the basis
/// weights per sample from the previous block's direction. The direction
/// at the end of each block seeds the next block's crossfade.
#[derive(Debug, Clone)]
pub struct AmbisonicsEncodeEffect {
    max_order: usize,
    prev_direction: Vector3,
}

impl AmbisonicsEncodeEffect {
    pub fn new(settings: AmbisonicsEncodeEffectSettings) -> Self {
        Self {
            max_order: settings.max_order,
            prev_direction: Vector3::ZERO,
        }
    }

    pub fn apply(
        &mut self,
        params: &AmbisonicsEncodeEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        let order = params.order.min(self.max_order);
        debug_assert!(output.num_channels() >= sh::num_coeffs(order));
        debug_assert_eq!(input.num_samples(), output.num_samples());

        // A (nearly) zero direction stays zero: the SH evaluation projects
        // it onto order 0 only.
        let direction = if params.direction.is_nearly_zero() {
            Vector3::ZERO
        } else {
            params.direction.normalized()
        };

        let num_samples = input.num_samples().max(1) as f32;
        for l in 0..=order as i32 {
            for m in -l..=l {
                let ch = sh::acn_index(l, m);
                let weight = sh::evaluate(l, m, direction);
                let weight_prev = sh::evaluate(l, m, self.prev_direction);
                let src = input.channel(0);
                let dst = output.channel_mut(ch);
                if (weight - weight_prev).abs() < 1e-9 {
                    for (&x, y) in src.iter().zip(dst.iter_mut()) {
                        *y = weight * x;
                    }
                } else {
                    for (j, (&x, y)) in src.iter().zip(dst.iter_mut()).enumerate() {
                        let alpha = j as f32 / num_samples;
                        *y = (alpha * weight + (1.0 - alpha) * weight_prev) * x;
                    }
                }
            }
        }
        for ch in sh::num_coeffs(order)..output.num_channels() {
            output.channel_mut(ch).fill(0.0);
        }

        self.prev_direction = direction;
        AudioEffectState::TailComplete
    }
}

impl AudioEffect for AmbisonicsEncodeEffect {
    fn reset(&mut self) {
        self.prev_direction = Vector3::ZERO;
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
    use approx::assert_relative_eq;

    #[test]
    fn test_steady_direction_weights() {
        let mut effect = AmbisonicsEncodeEffect::new(AmbisonicsEncodeEffectSettings {
            max_order: 3,
        });
        let mut input = AudioBuffer::new(1, 64);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBuffer::new(16, 64);

        let direction = Vector3::new(0.0, 0.0, -1.0);
        let params = AmbisonicsEncodeEffectParams { direction, order: 3 };
        effect.apply(&params, &input, &mut output);
        effect.apply(&params, &input, &mut output);

        // Second block is steady-state: channels equal the SH basis.
        for l in 0..=3i32 {
            for m in -l..=l {
                let expected = sh::evaluate(l, m, direction);
                let got = output.channel(sh::acn_index(l, m))[32];
                assert_relative_eq!(got, expected, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_order_clamped_to_max() {
        let mut effect = AmbisonicsEncodeEffect::new(AmbisonicsEncodeEffectSettings {
            max_order: 1,
        });
        let mut input = AudioBuffer::new(1, 16);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBuffer::new(16, 16);
        effect.apply(
            &AmbisonicsEncodeEffectParams {
                direction: Vector3::UNIT_X,
                order: 3,
            },
            &input,
            &mut output,
        );
        // Channels beyond the clamped order are silent.
        for ch in 4..16 {
            assert!(output.channel(ch).iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn test_first_block_fades_in_from_zero_direction() {
        let mut effect = AmbisonicsEncodeEffect::new(AmbisonicsEncodeEffectSettings {
            max_order: 1,
        });
        let mut input = AudioBuffer::new(1, 64);
        input.channel_mut(0).fill(1.0);
        let mut output = AudioBuffer::new(4, 64);
        effect.apply(
            &AmbisonicsEncodeEffectParams {
                direction: Vector3::UNIT_X,
                order: 1,
            },
            &input,
            &mut output,
        );
        // Degree-1 weights ramp from zero (the reset direction).
        let first = output.channel(3)[0].abs();
        let last = output.channel(3)[63].abs();
        assert!(first < last * 0.1, "no fade-in: {first} vs {last}");
    }
}
