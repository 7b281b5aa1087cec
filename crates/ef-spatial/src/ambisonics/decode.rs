//! Ambisonics decode effect
//!
//! The outer rendering surface: optional rotation into the listener
//! frame, then either speaker decoding or binaural rendering.

use crate::{
    AmbisonicsBinauralEffect, AmbisonicsBinauralEffectParams, AmbisonicsBinauralEffectSettings,
    AmbisonicsPanningEffect, AmbisonicsPanningEffectParams, AmbisonicsPanningEffectSettings,
    AmbisonicsRotateEffect, AmbisonicsRotateEffectParams, AmbisonicsRotateEffectSettings,
    AudioEffect, AudioEffectState, HrtfDatabase,
};
use crate::sh;
use ef_core::{AudioBuffer, AudioSettings, CoordinateSpace3, SpeakerLayout};
use std::sync::Arc;

enum DecodeBackend {
    Panning(AmbisonicsPanningEffect),
    Binaural(AmbisonicsBinauralEffect),
}

/// Settings for `AmbisonicsDecodeEffect`
#[derive(Clone)]
pub struct AmbisonicsDecodeEffectSettings {
    pub audio: AudioSettings,
    pub layout: SpeakerLayout,
    pub max_order: usize,
    /// Render binaurally through this HRTF instead of to speakers
    pub hrtf: Option<Arc<HrtfDatabase>>,
}

/// Parameters for `AmbisonicsDecodeEffect`
#[derive(Debug, Clone, Copy)]
pub struct AmbisonicsDecodeEffectParams {
    pub order: usize,
    /// Rotate the world-frame field into this listener frame first
    pub listener: Option<CoordinateSpace3>,
}

/// Rotation + decode in one effect
pub struct AmbisonicsDecodeEffect {
    rotate: AmbisonicsRotateEffect,
    backend: DecodeBackend,
    rotated: AudioBuffer,
}

impl AmbisonicsDecodeEffect {
    pub fn new(settings: AmbisonicsDecodeEffectSettings) -> Self {
        let backend = match &settings.hrtf {
            Some(hrtf) => DecodeBackend::Binaural(AmbisonicsBinauralEffect::new(
                AmbisonicsBinauralEffectSettings {
                    audio: settings.audio,
                    hrtf: Arc::clone(hrtf),
                    max_order: settings.max_order,
                },
            )),
            None => DecodeBackend::Panning(AmbisonicsPanningEffect::new(
                AmbisonicsPanningEffectSettings {
                    layout: settings.layout.clone(),
                    max_order: settings.max_order,
                },
            )),
        };
        Self {
            rotate: AmbisonicsRotateEffect::new(AmbisonicsRotateEffectSettings {
                max_order: settings.max_order,
            }),
            backend,
            rotated: AudioBuffer::new(
                sh::num_coeffs(settings.max_order),
                settings.audio.frame_size(),
            ),
        }
    }

    pub fn apply(
        &mut self,
        params: &AmbisonicsDecodeEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        let field = match params.listener {
            Some(listener) => {
                self.rotate.apply(
                    &AmbisonicsRotateEffectParams {
                        listener,
                        order: params.order,
                    },
                    input,
                    &mut self.rotated,
                );
                &self.rotated
            }
            None => input,
        };

        match &mut self.backend {
            DecodeBackend::Panning(panning) => panning.apply(
                &AmbisonicsPanningEffectParams {
                    order: params.order,
                },
                field,
                output,
            ),
            DecodeBackend::Binaural(binaural) => binaural.apply(
                &AmbisonicsBinauralEffectParams {
                    order: params.order,
                },
                field,
                output,
            ),
        }
    }
}

impl AudioEffect for AmbisonicsDecodeEffect {
    fn reset(&mut self) {
        self.rotate.reset();
        match &mut self.backend {
            DecodeBackend::Panning(panning) => panning.reset(),
            DecodeBackend::Binaural(binaural) => binaural.reset(),
        }
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        match &mut self.backend {
            DecodeBackend::Panning(panning) => panning.tail(out),
            DecodeBackend::Binaural(binaural) => binaural.tail(out),
        }
    }

    fn num_tail_samples_remaining(&self) -> usize {
        match &self.backend {
            DecodeBackend::Panning(panning) => panning.num_tail_samples_remaining(),
            DecodeBackend::Binaural(binaural) => binaural.num_tail_samples_remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams,
        AmbisonicsEncodeEffectSettings};
    use ef_core::Vector3;

    #[test]
    fn test_rotation_then_decode() {
        let audio = AudioSettings::new(48000, 128).unwrap();
        let mut encode = AmbisonicsEncodeEffect::new(AmbisonicsEncodeEffectSettings {
            max_order: 1,
        });
        let mut decode = AmbisonicsDecodeEffect::new(AmbisonicsDecodeEffectSettings {
            audio,
            layout: SpeakerLayout::stereo(),
            max_order: 1,
            hrtf: None,
        });

        // Source ahead in world space; listener turned 90 degrees left, so
        // the source appears on the right.
        let mut input = AudioBuffer::new(1, 128);
        input.channel_mut(0).fill(1.0);
        let mut field = AudioBuffer::new(4, 128);
        let mut speakers = AudioBuffer::new(2, 128);
        let listener = CoordinateSpace3::from_ahead(Vector3::new(-1.0, 0.0, 0.0), Vector3::ZERO);
        for _ in 0..3 {
            encode.apply(
                &AmbisonicsEncodeEffectParams {
                    direction: Vector3::new(0.0, 0.0, -1.0),
                    order: 1,
                },
                &input,
                &mut field,
            );
            decode.apply(
                &AmbisonicsDecodeEffectParams {
                    order: 1,
                    listener: Some(listener),
                },
                &field,
                &mut speakers,
            );
        }

        let energy = |x: &[f32]| x.iter().map(|v| v * v).sum::<f32>();
        assert!(energy(speakers.channel(1)) > energy(speakers.channel(0)));
    }
}
