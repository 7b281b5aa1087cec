//! Multichannel panning
//!
//! Maps a mono input onto a speaker layout: constant-power stereo,
//! pairwise constant-power for surround rings, and truncated spherical
//! weights for custom layouts. Weight vectors crossfade per sample from
//! the previous block's direction.

use crate::{AudioEffect, AudioEffectState};
use ef_core::{AudioBuffer, SpeakerLayout, SpeakerLayoutKind, Vector3};
use std::f32::consts::PI;

/// Settings for `PanningEffect`
#[derive(Debug, Clone)]
pub struct PanningEffectSettings {
    pub layout: SpeakerLayout,
}

/// Parameters for `PanningEffect`
#[derive(Debug, Clone, Copy)]
pub struct PanningEffectParams {
    /// Source direction in listener-local coordinates
    pub direction: Vector3,
}

/// Mono-to-layout panner
#[derive(Debug, Clone)]
pub struct PanningEffect {
    layout: SpeakerLayout,
    /// Ring speakers sorted by azimuth for pairwise panning: `(azimuth, index)`
    ring: Vec<(f32, usize)>,
    prev_direction: Vector3,
    first_frame: bool,
}

impl PanningEffect {
    pub fn new(settings: PanningEffectSettings) -> Self {
        let mut ring: Vec<(f32, usize)> = settings
            .layout
            .speakers()
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_nearly_zero())
            .map(|(i, s)| (azimuth_of(*s), i))
            .collect();
        ring.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        Self {
            layout: settings.layout,
            ring,
            prev_direction: Vector3::ZERO,
            first_frame: true,
        }
    }

    pub fn apply(
        &mut self,
        params: &PanningEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        debug_assert_eq!(output.num_channels(), self.layout.num_speakers());
        debug_assert_eq!(input.num_samples(), output.num_samples());

        let direction = params.direction.normalized();
        let prev = if self.first_frame {
            direction
        } else {
            self.prev_direction
        };
        self.first_frame = false;

        let num_samples = input.num_samples().max(1) as f32;
        for index in 0..self.layout.num_speakers() {
            let weight = self.weight(direction, index);
            let weight_prev = self.weight(prev, index);
            let src = input.channel(0);
            let dst = output.channel_mut(index);
            if (weight - weight_prev).abs() < 1e-9 {
                for (&x, y) in src.iter().zip(dst.iter_mut()) {
                    *y = weight * x;
                }
            } else {
                for (i, (&x, y)) in src.iter().zip(dst.iter_mut()).enumerate() {
                    let alpha = i as f32 / num_samples;
                    *y = (alpha * weight + (1.0 - alpha) * weight_prev) * x;
                }
            }
        }

        self.prev_direction = direction;
        AudioEffectState::TailComplete
    }

    /// Panning weight of one speaker for a direction.
    pub fn weight(&self, direction: Vector3, index: usize) -> f32 {
        panning_weight(direction, &self.layout, &self.ring, index)
    }
}

impl AudioEffect for PanningEffect {
    fn reset(&mut self) {
        self.prev_direction = Vector3::ZERO;
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

/// Azimuth in the horizontal plane, radians: 0 ahead, positive right.
fn azimuth_of(direction: Vector3) -> f32 {
    direction.x.atan2(-direction.z)
}

/// Stateless weight computation shared with the virtual-surround and
/// ambisonics panning effects.
pub fn panning_weight(
    direction: Vector3,
    layout: &SpeakerLayout,
    ring: &[(f32, usize)],
    index: usize,
) -> f32 {
    match layout.kind() {
        SpeakerLayoutKind::Mono => 1.0,
        SpeakerLayoutKind::Stereo => stereo_weight(direction, index),
        SpeakerLayoutKind::Quadraphonic
        | SpeakerLayoutKind::FivePointOne
        | SpeakerLayoutKind::SevenPointOne => pairwise_weight(direction, ring, index),
        SpeakerLayoutKind::Custom => spherical_weight(direction, layout, index),
    }
}

/// Constant-power stereo: full lateral displacement silences the far
/// channel. Rear sources fold onto the same side.
fn stereo_weight(direction: Vector3, index: usize) -> f32 {
    let lateral = direction.x.clamp(-1.0, 1.0);
    let t = (lateral + 1.0) * 0.5;
    if index == 0 {
        (t * PI / 2.0).cos()
    } else {
        (t * PI / 2.0).sin()
    }
}

/// Pairwise constant-power panning between the two ring speakers whose
/// azimuths bracket the source. LFE (index not in the ring) gets zero.
fn pairwise_weight(direction: Vector3, ring: &[(f32, usize)], index: usize) -> f32 {
    if ring.len() < 2 {
        return if ring.first().map(|&(_, i)| i) == Some(index) {
            1.0
        } else {
            0.0
        };
    }
    let azimuth = azimuth_of(direction);

    // Find the bracketing pair with wraparound.
    let mut lo = ring.len() - 1;
    for (k, &(az, _)) in ring.iter().enumerate() {
        if az <= azimuth {
            lo = k;
        }
    }
    let hi = (lo + 1) % ring.len();

    let (az_lo, idx_lo) = ring[lo];
    let (az_hi, idx_hi) = ring[hi];
    if index != idx_lo && index != idx_hi {
        return 0.0;
    }

    let mut span = az_hi - az_lo;
    if span <= 0.0 {
        span += 2.0 * PI;
    }
    let mut offset = azimuth - az_lo;
    if offset < 0.0 {
        offset += 2.0 * PI;
    }
    let fraction = (offset / span).clamp(0.0, 1.0);

    if index == idx_lo {
        (fraction * PI / 2.0).cos()
    } else {
        (fraction * PI / 2.0).sin()
    }
}

/// Truncated spherical-harmonic weights for custom layouts: second order
/// for dense layouts, first order otherwise.
fn spherical_weight(direction: Vector3, layout: &SpeakerLayout, index: usize) -> f32 {
    let speaker = layout.speaker(index);
    if speaker.is_nearly_zero() {
        return 0.0;
    }
    let cos_gamma = direction.dot(&speaker.normalized()).clamp(-1.0, 1.0);
    let n = layout.num_speakers() as f32;
    let second_order = layout.num_speakers() >= 9;
    let mut weight = 1.0 + 3.0 * cos_gamma;
    if second_order {
        let p2 = 0.5 * (3.0 * cos_gamma * cos_gamma - 1.0);
        weight += 5.0 * p2;
    }
    (weight / n).max(0.0)
}
