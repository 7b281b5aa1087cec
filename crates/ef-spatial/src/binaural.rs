//! HRTF binaural rendering
//!
//! Convolves a mono input with the interpolated left/right HRIR pair via
//! overlap-save. When the direction (or blend) changes between blocks,
//! the previous block's filters are kept and the two outputs crossfade
//! per sample, hiding the filter switch.

use crate::{HrtfDatabase, HrtfInterpolation, PhaseInterpolation};
use crate::{AudioEffect, AudioEffectState};
use ef_core::{AudioBuffer, AudioSettings, Vector3};
use ef_dsp::{Fft, OverlapSaveEngine};
use num_complex::Complex;
use std::sync::Arc;

/// Settings for `BinauralEffect`
#[derive(Clone)]
pub struct BinauralEffectSettings {
    pub audio: AudioSettings,
    pub hrtf: Arc<HrtfDatabase>,
}

/// Parameters for `BinauralEffect`
#[derive(Debug, Clone, Copy)]
pub struct BinauralEffectParams {
    /// Source direction in listener-local coordinates
    pub direction: Vector3,
    pub interpolation: HrtfInterpolation,
    pub phase: PhaseInterpolation,
    /// 1.0 = fully directional, 0.0 = direction-independent response
    pub spatial_blend: f32,
}

/// Partitioned spectra for one ear pair
type EarSpectra = [Vec<Vec<Complex<f32>>>; 2];

/// Mono-to-stereo HRTF effect
pub struct BinauralEffect {
    audio: AudioSettings,
    hrtf: Arc<HrtfDatabase>,
    engine: OverlapSaveEngine,
    fft: Fft,
    current: EarSpectra,
    previous: EarSpectra,
    crossfade_pending: bool,
    prev_direction: Vector3,
    prev_blend: f32,
    prev_interpolation: Option<(HrtfInterpolation, PhaseInterpolation)>,
    hrir_scratch: [Vec<f32>; 2],
    lane_scratch: [Vec<f32>; 2],
    tail_blocks_remaining: usize,
    last_peak_delays: [f32; 2],
}

impl BinauralEffect {
    pub fn new(settings: BinauralEffectSettings) -> Self {
        let frame = settings.audio.frame_size();
        let num_blocks = settings.hrtf.hrir_length().div_ceil(frame).max(1);
        Self {
            audio: settings.audio,
            engine: OverlapSaveEngine::new(num_blocks, frame),
            fft: Fft::new(2 * frame),
            current: [Vec::new(), Vec::new()],
            previous: [Vec::new(), Vec::new()],
            crossfade_pending: false,
            prev_direction: -Vector3::UNIT_Z,
            prev_blend: -1.0,
            prev_interpolation: None,
            hrir_scratch: [Vec::new(), Vec::new()],
            lane_scratch: [vec![0.0; frame], vec![0.0; frame]],
            tail_blocks_remaining: 0,
            last_peak_delays: [0.0; 2],
            hrtf: settings.hrtf,
        }
    }

    /// Ear peak delays (seconds) resolved by the last `apply`.
    pub fn peak_delays(&self) -> [f32; 2] {
        self.last_peak_delays
    }

    fn refresh_filters(&mut self, params: &BinauralEffectParams, direction: Vector3) {
        let delays = self.hrtf.interpolated(
            direction,
            params.interpolation,
            params.phase,
            params.spatial_blend,
            &mut self.hrir_scratch,
        );
        self.last_peak_delays = delays;

        std::mem::swap(&mut self.previous, &mut self.current);
        for ear in 0..2 {
            partition_hrir(
                &self.hrir_scratch[ear],
                self.audio.frame_size(),
                &self.fft,
                &mut self.current[ear],
            );
        }
        self.crossfade_pending = !self.previous[0].is_empty();
    }

    pub fn apply(
        &mut self,
        params: &BinauralEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        debug_assert_eq!(output.num_channels(), 2);
        debug_assert_eq!(input.num_samples(), self.audio.frame_size());

        // A near-zero direction keeps the previous block's direction.
        let direction = if params.direction.is_nearly_zero() {
            self.prev_direction
        } else {
            params.direction.normalized()
        };

        let interpolation_changed = self.prev_interpolation
            != Some((params.interpolation, params.phase));
        let moved = (direction - self.prev_direction).length() > 1e-6
            || (params.spatial_blend - self.prev_blend).abs() > 1e-6;
        if self.current[0].is_empty() || moved || interpolation_changed {
            self.refresh_filters(params, direction);
        }
        self.prev_direction = direction;
        self.prev_blend = params.spatial_blend;
        self.prev_interpolation = Some((params.interpolation, params.phase));

        self.engine.push_input(input.channel(0));
        let frame = self.audio.frame_size();
        for ear in 0..2 {
            let mut lane = std::mem::take(&mut self.lane_scratch[ear]);
            self.engine.convolve_spectra(&self.current[ear], &mut lane);
            if self.crossfade_pending {
                let out = output.channel_mut(ear);
                self.engine.convolve_spectra(&self.previous[ear], out);
                let denom = frame.max(1) as f32;
                for (i, (y, &new)) in out.iter_mut().zip(lane.iter()).enumerate() {
                    let alpha = i as f32 / denom;
                    *y = alpha * new + (1.0 - alpha) * *y;
                }
            } else {
                output.channel_mut(ear).copy_from_slice(&lane);
            }
            self.lane_scratch[ear] = lane;
        }
        self.crossfade_pending = false;

        self.tail_blocks_remaining = self.engine.num_blocks();
        AudioEffectState::TailRemaining
    }
}

impl AudioEffect for BinauralEffect {
    fn reset(&mut self) {
        self.engine.reset();
        self.current = [Vec::new(), Vec::new()];
        self.previous = [Vec::new(), Vec::new()];
        self.crossfade_pending = false;
        self.prev_direction = -Vector3::UNIT_Z;
        self.prev_blend = -1.0;
        self.prev_interpolation = None;
        self.tail_blocks_remaining = 0;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        if self.current[0].is_empty() {
            out.make_silent();
            return AudioEffectState::TailComplete;
        }
        self.engine.push_input(&[]);
        for ear in 0..2 {
            let mut lane = std::mem::take(&mut self.lane_scratch[ear]);
            self.engine.convolve_spectra(&self.current[ear], &mut lane);
            out.channel_mut(ear).copy_from_slice(&lane);
            self.lane_scratch[ear] = lane;
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

/// FFT an HRIR into overlap-save partitions of `frame` samples.
pub(crate) fn partition_hrir(
    hrir: &[f32],
    frame: usize,
    fft: &Fft,
    out: &mut Vec<Vec<Complex<f32>>>,
) {
    let num_blocks = hrir.len().div_ceil(frame).max(1);
    out.clear();
    let mut time = vec![0.0f32; 2 * frame];
    for block in 0..num_blocks {
        let start = block * frame;
        let end = (start + frame).min(hrir.len());
        time.fill(0.0);
        if start < hrir.len() {
            time[..end - start].copy_from_slice(&hrir[start..end]);
        }
        let mut spectrum = fft.make_spectrum();
        fft.forward(&mut time, &mut spectrum);
        out.push(spectrum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HrtfSettings;

    fn effect() -> BinauralEffect {
        let audio = AudioSettings::new(48000, 256).unwrap();
        let hrtf = Arc::new(HrtfDatabase::default_database(audio, &HrtfSettings::default()));
        BinauralEffect::new(BinauralEffectSettings { audio, hrtf })
    }

    fn rms(x: &[f32]) -> f32 {
        (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt()
    }

    #[test]
    fn test_ahead_is_balanced() {
        let mut effect = effect();
        let params = BinauralEffectParams {
            direction: -Vector3::UNIT_Z,
            interpolation: HrtfInterpolation::Nearest,
            phase: PhaseInterpolation::Full,
            spatial_blend: 1.0,
        };

        let mut output = AudioBuffer::new(2, 256);
        let mut left = 0.0;
        let mut right = 0.0;
        for block in 0..20 {
            let mut input = AudioBuffer::new(1, 256);
            for (i, s) in input.channel_mut(0).iter_mut().enumerate() {
                let n = (block * 256 + i) as f32;
                *s = (2.0 * std::f32::consts::PI * 1000.0 * n / 48000.0).sin();
            }
            effect.apply(&params, &input, &mut output);
            if block >= 4 {
                left += rms(output.channel(0));
                right += rms(output.channel(1));
            }
        }
        let ratio_db = 20.0 * (left / right).log10();
        assert!(ratio_db.abs() < 0.3, "L/R imbalance {ratio_db} dB");
    }

    #[test]
    fn test_right_source_favors_right_ear() {
        let mut effect = effect();
        let params = BinauralEffectParams {
            direction: Vector3::UNIT_X,
            interpolation: HrtfInterpolation::Bilinear,
            phase: PhaseInterpolation::Full,
            spatial_blend: 1.0,
        };
        let mut input = AudioBuffer::new(1, 256);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBuffer::new(2, 256);
        effect.apply(&params, &input, &mut output);

        let energy_l: f32 = output.channel(0).iter().map(|x| x * x).sum();
        let energy_r: f32 = output.channel(1).iter().map(|x| x * x).sum();
        assert!(energy_r > 2.0 * energy_l, "L {energy_l} R {energy_r}");
    }

    #[test]
    fn test_direction_switch_no_click() {
        let mut effect = effect();
        let mut input = AudioBuffer::new(1, 256);
        input.channel_mut(0).fill(0.5);
        let mut output = AudioBuffer::new(2, 256);

        effect.apply(
            &BinauralEffectParams {
                direction: -Vector3::UNIT_X,
                interpolation: HrtfInterpolation::Nearest,
                phase: PhaseInterpolation::Full,
                spatial_blend: 1.0,
            },
            &input,
            &mut output,
        );
        let before = output.channel(1)[255];
        effect.apply(
            &BinauralEffectParams {
                direction: Vector3::UNIT_X,
                interpolation: HrtfInterpolation::Nearest,
                phase: PhaseInterpolation::Full,
                spatial_blend: 1.0,
            },
            &input,
            &mut output,
        );
        let after = output.channel(1)[0];
        // First sample of the crossfaded block continues the old filter.
        assert!((after - before).abs() < 0.2, "jump {before} -> {after}");
    }

    #[test]
    fn test_zero_direction_reuses_previous() {
        let mut effect = effect();
        let mut input = AudioBuffer::new(1, 256);
        input.channel_mut(0).fill(0.3);
        let mut output = AudioBuffer::new(2, 256);

        effect.apply(
            &BinauralEffectParams {
                direction: Vector3::UNIT_X,
                interpolation: HrtfInterpolation::Nearest,
                phase: PhaseInterpolation::Full,
                spatial_blend: 1.0,
            },
            &input,
            &mut output,
        );
        // Zero direction keeps rendering from the right.
        effect.apply(
            &BinauralEffectParams {
                direction: Vector3::ZERO,
                interpolation: HrtfInterpolation::Nearest,
                phase: PhaseInterpolation::Full,
                spatial_blend: 1.0,
            },
            &input,
            &mut output,
        );
        let energy_l: f32 = output.channel(0).iter().map(|x| x * x).sum();
        let energy_r: f32 = output.channel(1).iter().map(|x| x * x).sum();
        assert!(energy_r > energy_l);
    }

    #[test]
    fn test_tail_completes() {
        let mut effect = effect();
        let mut input = AudioBuffer::new(1, 256);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBuffer::new(2, 256);
        effect.apply(
            &BinauralEffectParams {
                direction: -Vector3::UNIT_Z,
                interpolation: HrtfInterpolation::Nearest,
                phase: PhaseInterpolation::Full,
                spatial_blend: 1.0,
            },
            &input,
            &mut output,
        );
        let mut state = AudioEffectState::TailRemaining;
        let mut blocks = 0;
        while state == AudioEffectState::TailRemaining && blocks < 10 {
            state = effect.tail(&mut output);
            blocks += 1;
        }
        assert_eq!(state, AudioEffectState::TailComplete);
    }
}
