//! Path rendering
//!
//! Applies the path simulator's 3-band EQ, then projects the filtered
//! signal onto SH channels using the aggregated path coefficients. With
//! `spatialize`, the ambisonics result is decoded to binaural in-effect
//! so no external ambisonics chain is needed.

use crate::sh;
use crate::{
    AmbisonicsDecodeEffect, AmbisonicsDecodeEffectParams, AmbisonicsDecodeEffectSettings,
    AudioEffect, AudioEffectState, HrtfDatabase,
};
use ef_core::{AudioBuffer, AudioSettings, CoordinateSpace3, SpeakerLayout, NUM_BANDS};
use ef_dsp::{EQEffect, EQEffectParams};
use std::sync::Arc;

/// Settings for `PathEffect`
#[derive(Clone)]
pub struct PathEffectSettings {
    pub audio: AudioSettings,
    pub max_order: usize,
    /// Decode to binaural inside the effect
    pub spatialize: bool,
    /// HRTF for spatialized output
    pub hrtf: Option<Arc<HrtfDatabase>>,
}

/// Parameters for `PathEffect`
#[derive(Debug, Clone, Copy)]
pub struct PathEffectParams<'a> {
    /// Per-band EQ from the path simulation
    pub eq_gains: [f32; NUM_BANDS],
    /// Aggregated SH coefficients, `(order+1)^2` values
    pub sh_coeffs: &'a [f32],
    pub order: usize,
    /// Listener frame for spatialized decode
    pub listener: Option<CoordinateSpace3>,
}

/// Renders baked/runtime paths into ambisonics (or binaural)
pub struct PathEffect {
    settings: PathEffectSettings,
    eq: EQEffect,
    decode: Option<AmbisonicsDecodeEffect>,
    filtered: AudioBuffer,
    ambisonics: AudioBuffer,
    prev_coeffs: Vec<f32>,
    first_frame: bool,
}

impl PathEffect {
    pub fn new(settings: PathEffectSettings) -> Self {
        let num_channels = sh::num_coeffs(settings.max_order);
        let decode = if settings.spatialize {
            Some(AmbisonicsDecodeEffect::new(AmbisonicsDecodeEffectSettings {
                audio: settings.audio,
                layout: SpeakerLayout::stereo(),
                max_order: settings.max_order,
                hrtf: settings.hrtf.clone(),
            }))
        } else {
            None
        };
        Self {
            eq: EQEffect::new(settings.audio),
            decode,
            filtered: AudioBuffer::new(1, settings.audio.frame_size()),
            ambisonics: AudioBuffer::new(num_channels, settings.audio.frame_size()),
            prev_coeffs: vec![0.0; num_channels],
            first_frame: true,
            settings,
        }
    }

    pub fn apply(
        &mut self,
        params: &PathEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        let order = params.order.min(self.settings.max_order);
        let num_channels = sh::num_coeffs(order);
        debug_assert!(params.sh_coeffs.len() >= num_channels);

        self.eq.apply(
            &EQEffectParams {
                gains: params.eq_gains,
            },
            input,
            &mut self.filtered,
        );

        if self.first_frame {
            self.prev_coeffs[..num_channels].copy_from_slice(&params.sh_coeffs[..num_channels]);
            self.first_frame = false;
        }

        let num_samples = input.num_samples().max(1) as f32;
        for ch in 0..num_channels {
            let target = params.sh_coeffs[ch];
            let start = self.prev_coeffs[ch];
            let src = self.filtered.channel(0);
            let dst = self.ambisonics.channel_mut(ch);
            if (target - start).abs() < 1e-9 {
                for (&x, y) in src.iter().zip(dst.iter_mut()) {
                    *y = target * x;
                }
            } else {
                for (j, (&x, y)) in src.iter().zip(dst.iter_mut()).enumerate() {
                    let alpha = j as f32 / num_samples;
                    *y = (alpha * target + (1.0 - alpha) * start) * x;
                }
            }
            self.prev_coeffs[ch] = target;
        }
        for ch in num_channels..self.ambisonics.num_channels() {
            self.ambisonics.channel_mut(ch).fill(0.0);
        }

        match &mut self.decode {
            Some(decode) => decode.apply(
                &AmbisonicsDecodeEffectParams {
                    order,
                    listener: params.listener,
                },
                &self.ambisonics,
                output,
            ),
            None => {
                debug_assert!(output.num_channels() >= num_channels);
                for ch in 0..output.num_channels() {
                    if ch < self.ambisonics.num_channels() {
                        output
                            .channel_mut(ch)
                            .copy_from_slice(self.ambisonics.channel(ch));
                    } else {
                        output.channel_mut(ch).fill(0.0);
                    }
                }
                AudioEffectState::TailRemaining
            }
        }
    }
}

impl AudioEffect for PathEffect {
    fn reset(&mut self) {
        self.eq.reset();
        if let Some(decode) = &mut self.decode {
            decode.reset();
        }
        self.prev_coeffs.fill(0.0);
        self.first_frame = true;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        match &mut self.decode {
            Some(decode) => decode.tail(out),
            None => {
                out.make_silent();
                AudioEffectState::TailComplete
            }
        }
    }

    fn num_tail_samples_remaining(&self) -> usize {
        match &self.decode {
            Some(decode) => decode.num_tail_samples_remaining(),
            None => 0,
        }
    }
}
