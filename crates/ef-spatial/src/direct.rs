//! Direct-path rendering
//!
//! Applies the output of the direct simulator to an audio stream:
//! broadband distance attenuation and directivity, then a 3-band EQ
//! carrying air absorption and the occlusion/transmission term. The EQ
//! is normalized so its largest gain folds into the broadband gain,
//! keeping the filters near unity.

use crate::{AudioEffect, AudioEffectState};
use ef_core::{AudioBuffer, AudioSettings, NUM_BANDS};
use ef_dsp::{EQEffect, EQEffectParams, GainEffect, GainEffectParams};

/// Per-source output of the direct simulator
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DirectSoundPath {
    pub distance_attenuation: f32,
    pub air_absorption: [f32; NUM_BANDS],
    pub directivity: f32,
    /// 0 = unoccluded, 1 = fully occluded
    pub occlusion: f32,
    pub transmission: [f32; NUM_BANDS],
}

impl Default for DirectSoundPath {
    fn default() -> Self {
        Self {
            distance_attenuation: 1.0,
            air_absorption: [1.0; NUM_BANDS],
            directivity: 1.0,
            occlusion: 0.0,
            transmission: [1.0; NUM_BANDS],
        }
    }
}

/// Which components of the direct path to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DirectApplyFlags {
    pub distance_attenuation: bool,
    pub air_absorption: bool,
    pub directivity: bool,
    pub occlusion: bool,
    pub transmission: bool,
}

/// How transmission through occluders affects the spectrum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum TransmissionType {
    /// Broadband: the average transmission coefficient scales the signal
    #[default]
    FrequencyIndependent,
    /// Per-band transmission shapes the occluded signal
    FrequencyDependent,
}

/// Settings for `DirectEffect`
#[derive(Debug, Clone, Copy)]
pub struct DirectEffectSettings {
    pub audio: AudioSettings,
    pub num_channels: usize,
}

/// Parameters for `DirectEffect`
#[derive(Debug, Clone, Copy)]
pub struct DirectEffectParams {
    pub path: DirectSoundPath,
    pub flags: DirectApplyFlags,
    pub transmission: TransmissionType,
}

/// Applies direct-path gains and EQ to an N-channel stream
pub struct DirectEffect {
    settings: DirectEffectSettings,
    eqs: Vec<EQEffect>,
    gain: GainEffect,
    scratch_in: AudioBuffer,
    scratch_out: AudioBuffer,
    scratch_multi: AudioBuffer,
}

impl DirectEffect {
    pub fn new(settings: DirectEffectSettings) -> Self {
        Self {
            settings,
            eqs: (0..settings.num_channels)
                .map(|_| EQEffect::new(settings.audio))
                .collect(),
            gain: GainEffect::new(),
            scratch_in: AudioBuffer::new(1, settings.audio.frame_size()),
            scratch_out: AudioBuffer::new(1, settings.audio.frame_size()),
            scratch_multi: AudioBuffer::new(settings.num_channels, settings.audio.frame_size()),
        }
    }

    /// Collapse the path and flags into a broadband gain and 3 EQ gains.
    fn gains(params: &DirectEffectParams) -> (f32, [f32; NUM_BANDS], bool) {
        let path = &params.path;
        let flags = &params.flags;

        let mut gain = 1.0f32;
        let mut eq = [1.0f32; NUM_BANDS];
        let mut eq_needed = false;

        if flags.distance_attenuation {
            gain *= path.distance_attenuation;
        }
        if flags.directivity {
            gain *= path.directivity;
        }
        if flags.air_absorption {
            for (g, &a) in eq.iter_mut().zip(&path.air_absorption) {
                *g *= a;
            }
            eq_needed = true;
        }
        if flags.occlusion {
            let open = 1.0 - path.occlusion;
            if flags.transmission {
                match params.transmission {
                    TransmissionType::FrequencyIndependent => {
                        let avg = path.transmission.iter().sum::<f32>() / NUM_BANDS as f32;
                        gain *= open + path.occlusion * avg;
                    }
                    TransmissionType::FrequencyDependent => {
                        for (g, &t) in eq.iter_mut().zip(&path.transmission) {
                            *g *= open + path.occlusion * t;
                        }
                        eq_needed = true;
                    }
                }
            } else {
                gain *= open;
            }
        }

        // Fold the peak EQ gain into the broadband term so the filters
        // stay near unity.
        if eq_needed {
            let peak = eq.iter().fold(0.0f32, |m, &g| m.max(g));
            if peak > 1e-6 {
                for g in &mut eq {
                    *g /= peak;
                }
                gain *= peak;
            }
        }

        (gain, eq, eq_needed)
    }

    pub fn apply(
        &mut self,
        params: &DirectEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), self.settings.num_channels);
        debug_assert_eq!(output.num_channels(), self.settings.num_channels);
        debug_assert_eq!(input.num_samples(), self.settings.audio.frame_size());

        let (gain, eq_gains, eq_needed) = Self::gains(params);

        if eq_needed {
            for (ch, eq) in self.eqs.iter_mut().enumerate() {
                self.scratch_in
                    .channel_mut(0)
                    .copy_from_slice(input.channel(ch));
                eq.apply(
                    &EQEffectParams { gains: eq_gains },
                    &self.scratch_in,
                    &mut self.scratch_out,
                );
                self.scratch_multi
                    .channel_mut(ch)
                    .copy_from_slice(self.scratch_out.channel(0));
            }
            self.gain
                .apply(&GainEffectParams { gain }, &self.scratch_multi, output)
        } else {
            self.gain.apply(&GainEffectParams { gain }, input, output)
        }
    }
}

impl AudioEffect for DirectEffect {
    fn reset(&mut self) {
        for eq in &mut self.eqs {
            eq.reset();
        }
        self.gain.reset();
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

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    /// Deterministic wideband noise.
    fn noise_block(frame: usize, seed: u64, offset: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(1, frame);
        let mut state = seed.wrapping_add(offset as u64 * 0x9E3779B97F4A7C15);
        for s in buffer.channel_mut(0).iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *s = ((state >> 40) as f32 / 8388608.0) - 1.0;
        }
        buffer
    }

    #[test]
    fn test_distance_only_is_pure_gain() {
        let audio = AudioSettings::new(48000, 512).unwrap();
        let mut effect = DirectEffect::new(DirectEffectSettings {
            audio,
            num_channels: 1,
        });
        let params = DirectEffectParams {
            path: DirectSoundPath {
                distance_attenuation: 0.25,
                ..Default::default()
            },
            flags: DirectApplyFlags {
                distance_attenuation: true,
                ..Default::default()
            },
            transmission: TransmissionType::FrequencyIndependent,
        };
        let input = noise_block(512, 1, 0);
        let mut output = AudioBuffer::new(1, 512);
        effect.apply(&params, &input, &mut output);
        let ratio = rms(output.channel(0)) / rms(input.channel(0));
        assert!((ratio - 0.25).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn test_air_absorption_shapes_spectrum() {
        // distanceAttenuation 0.5, airAbsorption (1.0, 0.5, 0.1): band 0
        // ends up at 0.5x, band 1 at 0.25x, band 2 at 0.05x (within 1 dB).
        let audio = AudioSettings::new(48000, 1024).unwrap();
        let mut effect = DirectEffect::new(DirectEffectSettings {
            audio,
            num_channels: 1,
        });
        let params = DirectEffectParams {
            path: DirectSoundPath {
                distance_attenuation: 0.5,
                air_absorption: [1.0, 0.5, 0.1],
                ..Default::default()
            },
            flags: DirectApplyFlags {
                distance_attenuation: true,
                air_absorption: true,
                ..Default::default()
            },
            transmission: TransmissionType::FrequencyIndependent,
        };

        let tone = |freq: f32, offset: usize| {
            let mut buffer = AudioBuffer::new(1, 1024);
            for (i, s) in buffer.channel_mut(0).iter_mut().enumerate() {
                *s = (2.0 * std::f32::consts::PI * freq * (offset + i) as f32 / 48000.0).sin();
            }
            buffer
        };

        for (freq, expected) in [(100.0, 0.5f32), (2500.0, 0.25), (16000.0, 0.05)] {
            effect.reset();
            let mut output = AudioBuffer::new(1, 1024);
            let mut ratio = 0.0;
            for block in 0..12 {
                let input = tone(freq, block * 1024);
                effect.apply(&params, &input, &mut output);
                ratio = rms(output.channel(0)) / rms(input.channel(0));
            }
            let db_error = (20.0 * (ratio / expected).log10()).abs();
            assert!(db_error < 1.0, "{freq} Hz: ratio {ratio}, expected {expected}");
        }
    }

    #[test]
    fn test_full_occlusion_without_transmission_is_silent() {
        let audio = AudioSettings::new(48000, 256).unwrap();
        let mut effect = DirectEffect::new(DirectEffectSettings {
            audio,
            num_channels: 1,
        });
        let params = DirectEffectParams {
            path: DirectSoundPath {
                occlusion: 1.0,
                ..Default::default()
            },
            flags: DirectApplyFlags {
                occlusion: true,
                ..Default::default()
            },
            transmission: TransmissionType::FrequencyIndependent,
        };
        let input = noise_block(256, 7, 0);
        let mut output = AudioBuffer::new(1, 256);
        effect.apply(&params, &input, &mut output);
        effect.apply(&params, &input, &mut output);
        assert!(rms(output.channel(0)) < 1e-4);
    }

    #[test]
    fn test_transmission_leaks_through_occluder() {
        let audio = AudioSettings::new(48000, 256).unwrap();
        let mut effect = DirectEffect::new(DirectEffectSettings {
            audio,
            num_channels: 1,
        });
        let params = DirectEffectParams {
            path: DirectSoundPath {
                occlusion: 1.0,
                transmission: [0.4, 0.4, 0.4],
                ..Default::default()
            },
            flags: DirectApplyFlags {
                occlusion: true,
                transmission: true,
                ..Default::default()
            },
            transmission: TransmissionType::FrequencyIndependent,
        };
        let input = noise_block(256, 9, 0);
        let mut output = AudioBuffer::new(1, 256);
        effect.apply(&params, &input, &mut output);
        effect.apply(&params, &input, &mut output);
        let ratio = rms(output.channel(0)) / rms(input.channel(0));
        assert!((ratio - 0.4).abs() < 0.05, "ratio {ratio}");
    }
}
