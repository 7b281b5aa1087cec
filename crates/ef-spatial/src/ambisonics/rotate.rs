//! Ambisonics rotation

use crate::sh::{self, ShRotation};
use crate::{AudioEffect, AudioEffectState};
use ef_core::{AudioBuffer, CoordinateSpace3};

/// Settings for `AmbisonicsRotateEffect`
#[derive(Debug, Clone, Copy)]
pub struct AmbisonicsRotateEffectSettings {
    pub max_order: usize,
}

/// Parameters for `AmbisonicsRotateEffect`
#[derive(Debug, Clone, Copy)]
pub struct AmbisonicsRotateEffectParams {
    /// Listener frame; world-frame coefficients rotate into it
    pub listener: CoordinateSpace3,
    pub order: usize,
}

/// Rotates a world-frame SH soundfield into the listener frame.
///
/// Rotation matrices are rebuilt only when the listener frame changes;
/// the block after a change crossfades per sample between the old and
/// new rotations.
#[derive(Debug, Clone)]
pub struct AmbisonicsRotateEffect {
    max_order: usize,
    rotation: ShRotation,
    prev_rotation: ShRotation,
    crossfade_pending: bool,
    prev_listener: Option<CoordinateSpace3>,
}

impl AmbisonicsRotateEffect {
    pub fn new(settings: AmbisonicsRotateEffectSettings) -> Self {
        let settings = AmbisonicsRotateEffectSettings {
            max_order: settings.max_order.min(crate::sh::MAX_ORDER),
        };
        Self {
            max_order: settings.max_order,
            rotation: ShRotation::new(settings.max_order),
            prev_rotation: ShRotation::new(settings.max_order),
            crossfade_pending: false,
            prev_listener: None,
        }
    }

    pub fn apply(
        &mut self,
        params: &AmbisonicsRotateEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        let order = params.order.min(self.max_order);
        let num_channels = sh::num_coeffs(order);
        debug_assert!(input.num_channels() >= num_channels);
        debug_assert!(output.num_channels() >= num_channels);
        debug_assert_eq!(input.num_samples(), output.num_samples());

        let changed = match &self.prev_listener {
            None => true,
            Some(prev) => frame_differs(prev, &params.listener),
        };
        if changed {
            std::mem::swap(&mut self.prev_rotation, &mut self.rotation);
            self.rotation.set_listener(&params.listener);
            self.crossfade_pending = self.prev_listener.is_some();
            self.prev_listener = Some(params.listener);
        }

        let num_samples = input.num_samples();
        let denom = num_samples.max(1) as f32;
        let mut in_vec = [0.0f32; 16];
        let mut out_new = [0.0f32; 16];
        let mut out_old = [0.0f32; 16];

        for j in 0..num_samples {
            for ch in 0..num_channels {
                in_vec[ch] = input.channel(ch)[j];
            }
            self.rotation.apply(&in_vec[..num_channels], &mut out_new[..num_channels]);
            if self.crossfade_pending {
                self.prev_rotation
                    .apply(&in_vec[..num_channels], &mut out_old[..num_channels]);
                let alpha = j as f32 / denom;
                for ch in 0..num_channels {
                    output.channel_mut(ch)[j] =
                        alpha * out_new[ch] + (1.0 - alpha) * out_old[ch];
                }
            } else {
                for ch in 0..num_channels {
                    output.channel_mut(ch)[j] = out_new[ch];
                }
            }
        }
        self.crossfade_pending = false;

        for ch in num_channels..output.num_channels() {
            output.channel_mut(ch).fill(0.0);
        }
        AudioEffectState::TailComplete
    }
}

fn frame_differs(a: &CoordinateSpace3, b: &CoordinateSpace3) -> bool {
    (a.ahead - b.ahead).length() > 1e-6 || (a.up - b.up).length() > 1e-6
}

impl AudioEffect for AmbisonicsRotateEffect {
    fn reset(&mut self) {
        self.prev_listener = None;
        self.crossfade_pending = false;
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
    use ef_core::Vector3;

    #[test]
    fn test_identity_rotation_passthrough() {
        let mut effect = AmbisonicsRotateEffect::new(AmbisonicsRotateEffectSettings {
            max_order: 2,
        });
        let mut input = AudioBuffer::new(9, 32);
        for ch in 0..9 {
            input.channel_mut(ch).fill(0.1 * (ch as f32 + 1.0));
        }
        let mut output = AudioBuffer::new(9, 32);
        let params = AmbisonicsRotateEffectParams {
            listener: CoordinateSpace3::default(),
            order: 2,
        };
        effect.apply(&params, &input, &mut output);
        effect.apply(&params, &input, &mut output);
        for ch in 0..9 {
            assert!((output.channel(ch)[16] - input.channel(ch)[16]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rotation_moves_energy_between_channels() {
        let mut effect = AmbisonicsRotateEffect::new(AmbisonicsRotateEffectSettings {
            max_order: 1,
        });
        // Soundfield of a source straight ahead in world space.
        let mut coeffs = vec![0.0; 4];
        sh::project(Vector3::new(0.0, 0.0, -1.0), 1, &mut coeffs);
        let mut input = AudioBuffer::new(4, 16);
        for ch in 0..4 {
            input.channel_mut(ch).fill(coeffs[ch]);
        }

        // Listener turned 90 degrees right: the source is now on the left.
        let listener =
            CoordinateSpace3::from_ahead(Vector3::new(1.0, 0.0, 0.0), Vector3::ZERO);
        let mut output = AudioBuffer::new(4, 16);
        let params = AmbisonicsRotateEffectParams { listener, order: 1 };
        effect.apply(&params, &input, &mut output);
        effect.apply(&params, &input, &mut output);

        let mut expected = vec![0.0; 4];
        sh::project(Vector3::new(-1.0, 0.0, 0.0), 1, &mut expected);
        for ch in 0..4 {
            assert!(
                (output.channel(ch)[8] - expected[ch]).abs() < 1e-4,
                "channel {ch}: {} vs {}",
                output.channel(ch)[8],
                expected[ch]
            );
        }
    }
}
