//! Ambisonics binaural rendering
//!
//! Each SH channel convolves with the HRTF database's projection HRIR
//! for that channel (precomputed at database load); the per-channel
//! stereo results sum into the output.

use crate::binaural::partition_hrir;
use crate::{AudioEffect, AudioEffectState, HrtfDatabase};
use crate::sh;
use ef_core::{AudioBuffer, AudioSettings};
use ef_dsp::{Fft, OverlapSaveEngine};
use num_complex::Complex;
use std::sync::Arc;

/// Settings for `AmbisonicsBinauralEffect`
#[derive(Clone)]
pub struct AmbisonicsBinauralEffectSettings {
    pub audio: AudioSettings,
    pub hrtf: Arc<HrtfDatabase>,
    pub max_order: usize,
}

/// Parameters for `AmbisonicsBinauralEffect`
#[derive(Debug, Clone, Copy)]
pub struct AmbisonicsBinauralEffectParams {
    pub order: usize,
}

struct ChannelLane {
    engine: OverlapSaveEngine,
    spectra: [Vec<Vec<Complex<f32>>>; 2],
}

/// SH soundfield directly to stereo through projection HRIRs
pub struct AmbisonicsBinauralEffect {
    audio: AudioSettings,
    max_order: usize,
    lanes: Vec<ChannelLane>,
    lane_out: Vec<f32>,
    tail_blocks_remaining: usize,
}

impl AmbisonicsBinauralEffect {
    pub fn new(settings: AmbisonicsBinauralEffectSettings) -> Self {
        let frame = settings.audio.frame_size();
        let fft = Fft::new(2 * frame);
        let max_order = settings.max_order.min(settings.hrtf.max_ambisonics_order());
        let num_blocks = settings.hrtf.hrir_length().div_ceil(frame).max(1);

        let lanes = (0..sh::num_coeffs(max_order))
            .map(|acn| {
                let hrir = settings.hrtf.ambisonics_hrir(acn);
                let mut spectra = [Vec::new(), Vec::new()];
                for ear in 0..2 {
                    partition_hrir(hrir[ear], frame, &fft, &mut spectra[ear]);
                }
                ChannelLane {
                    engine: OverlapSaveEngine::new(num_blocks, frame),
                    spectra,
                }
            })
            .collect();

        Self {
            audio: settings.audio,
            max_order,
            lanes,
            lane_out: vec![0.0; frame],
            tail_blocks_remaining: 0,
        }
    }

    pub fn apply(
        &mut self,
        params: &AmbisonicsBinauralEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        let order = params.order.min(self.max_order);
        let num_channels = sh::num_coeffs(order);
        debug_assert!(input.num_channels() >= num_channels);
        debug_assert_eq!(output.num_channels(), 2);

        output.make_silent();
        for (acn, lane) in self.lanes.iter_mut().take(num_channels).enumerate() {
            lane.engine.push_input(input.channel(acn));
            for ear in 0..2 {
                lane.engine
                    .convolve_spectra(&lane.spectra[ear], &mut self.lane_out);
                let dst = output.channel_mut(ear);
                for (y, &v) in dst.iter_mut().zip(&self.lane_out) {
                    *y += v;
                }
            }
        }

        self.tail_blocks_remaining = self
            .lanes
            .first()
            .map(|lane| lane.engine.num_blocks())
            .unwrap_or(0);
        AudioEffectState::TailRemaining
    }
}

impl AudioEffect for AmbisonicsBinauralEffect {
    fn reset(&mut self) {
        for lane in &mut self.lanes {
            lane.engine.reset();
        }
        self.tail_blocks_remaining = 0;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        out.make_silent();
        for lane in &mut self.lanes {
            lane.engine.push_input(&[]);
            for ear in 0..2 {
                lane.engine
                    .convolve_spectra(&lane.spectra[ear], &mut self.lane_out);
                let dst = out.channel_mut(ear);
                for (y, &v) in dst.iter_mut().zip(&self.lane_out) {
                    *y += v;
                }
            }
        }
        self.tail_blocks_remaining = self.tail_blocks_remaining.saturating_sub(1);
        if self.tail_blocks_remaining == 0 {
            AudioEffectState::TailComplete
        } else {
            AudioEffectState::TailRemaining
        }
    }

    fn num_tail_samples_remaining(&self) -> usize {
        self.tail_blocks_remaining * self.audio.frame_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AmbisonicsEncodeEffect, AmbisonicsEncodeEffectParams,
        AmbisonicsEncodeEffectSettings, HrtfSettings};
    use ef_core::Vector3;

    #[test]
    fn test_lateral_field_lateralizes() {
        let audio = AudioSettings::new(48000, 256).unwrap();
        let hrtf = Arc::new(HrtfDatabase::default_database(audio, &HrtfSettings::default()));
        let mut encode = AmbisonicsEncodeEffect::new(AmbisonicsEncodeEffectSettings {
            max_order: 2,
        });
        let mut binaural = AmbisonicsBinauralEffect::new(AmbisonicsBinauralEffectSettings {
            audio,
            hrtf,
            max_order: 2,
        });

        let mut input = AudioBuffer::new(1, 256);
        input.channel_mut(0).fill(0.5);
        let mut field = AudioBuffer::new(9, 256);
        let params = AmbisonicsEncodeEffectParams {
            direction: Vector3::UNIT_X,
            order: 2,
        };
        let mut output = AudioBuffer::new(2, 256);
        for _ in 0..4 {
            encode.apply(&params, &input, &mut field);
            binaural.apply(&AmbisonicsBinauralEffectParams { order: 2 }, &field, &mut output);
        }

        let energy = |x: &[f32]| x.iter().map(|v| v * v).sum::<f32>();
        let left = energy(output.channel(0));
        let right = energy(output.channel(1));
        assert!(right > left, "L {left} R {right}");
    }
}
