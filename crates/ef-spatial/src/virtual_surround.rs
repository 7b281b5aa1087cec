//! Virtual surround
//!
//! Pans a mono source to a speaker layout, then binauralizes each
//! speaker feed through that speaker's fixed HRTF and sums to stereo.

use crate::binaural::partition_hrir;
use crate::{AudioEffect, AudioEffectState};
use crate::{HrtfDatabase, HrtfInterpolation, PanningEffect, PanningEffectParams,
    PanningEffectSettings, PhaseInterpolation};
use ef_core::{AudioBuffer, AudioSettings, SpeakerLayout, Vector3};
use ef_dsp::{Fft, OverlapSaveEngine};
use num_complex::Complex;
use std::sync::Arc;

/// Settings for `VirtualSurroundEffect`
#[derive(Clone)]
pub struct VirtualSurroundEffectSettings {
    pub audio: AudioSettings,
    pub layout: SpeakerLayout,
    pub hrtf: Arc<HrtfDatabase>,
}

/// Parameters for `VirtualSurroundEffect`
#[derive(Debug, Clone, Copy)]
pub struct VirtualSurroundEffectParams {
    /// Source direction in listener-local coordinates
    pub direction: Vector3,
}

struct SpeakerLane {
    engine: OverlapSaveEngine,
    spectra: [Vec<Vec<Complex<f32>>>; 2],
}

/// Mono source rendered through virtual speakers
pub struct VirtualSurroundEffect {
    audio: AudioSettings,
    panning: PanningEffect,
    lanes: Vec<SpeakerLane>,
    speaker_buffer: AudioBuffer,
    lane_out: Vec<f32>,
    tail_blocks_remaining: usize,
}

impl VirtualSurroundEffect {
    pub fn new(settings: VirtualSurroundEffectSettings) -> Self {
        let frame = settings.audio.frame_size();
        let fft = Fft::new(2 * frame);
        let num_blocks = settings.hrtf.hrir_length().div_ceil(frame).max(1);

        let mut hrir_scratch = [Vec::new(), Vec::new()];
        let lanes = settings
            .layout
            .speakers()
            .iter()
            .map(|&speaker| {
                let direction = if speaker.is_nearly_zero() {
                    -Vector3::UNIT_Z // LFE renders as a centered source
                } else {
                    speaker
                };
                settings.hrtf.interpolated(
                    direction,
                    HrtfInterpolation::Nearest,
                    PhaseInterpolation::Full,
                    1.0,
                    &mut hrir_scratch,
                );
                let mut spectra = [Vec::new(), Vec::new()];
                for ear in 0..2 {
                    partition_hrir(&hrir_scratch[ear], frame, &fft, &mut spectra[ear]);
                }
                SpeakerLane {
                    engine: OverlapSaveEngine::new(num_blocks, frame),
                    spectra,
                }
            })
            .collect();

        Self {
            audio: settings.audio,
            panning: PanningEffect::new(PanningEffectSettings {
                layout: settings.layout.clone(),
            }),
            lanes,
            speaker_buffer: AudioBuffer::new(settings.layout.num_speakers(), frame),
            lane_out: vec![0.0; frame],
            tail_blocks_remaining: 0,
        }
    }

    pub fn apply(
        &mut self,
        params: &VirtualSurroundEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        debug_assert_eq!(output.num_channels(), 2);

        self.panning.apply(
            &PanningEffectParams {
                direction: params.direction,
            },
            input,
            &mut self.speaker_buffer,
        );

        output.make_silent();
        for (index, lane) in self.lanes.iter_mut().enumerate() {
            lane.engine.push_input(self.speaker_buffer.channel(index));
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

impl AudioEffect for VirtualSurroundEffect {
    fn reset(&mut self) {
        self.panning.reset();
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
