//! Three-band EQ effect
//!
//! Low shelf, band peaking, and high shelf at the runtime band edges.
//! Gains retune the underlying filters, which crossfade over one block.

use crate::{AudioEffect, AudioEffectState, IIRFilterer, IIR};
use ef_core::{AudioBuffer, AudioSettings, LOW_MID_CROSSOVER, MID_HIGH_CROSSOVER, NUM_BANDS};

/// Gains below this floor are clamped to keep the shelving filters stable.
pub const MIN_EQ_GAIN: f32 = 1e-4;

/// Parameters for `EQEffect`
#[derive(Debug, Clone, Copy)]
pub struct EQEffectParams {
    /// Linear per-band gains
    pub gains: [f32; NUM_BANDS],
}

/// 3-band EQ over the shared band partitioning
#[derive(Debug, Clone)]
pub struct EQEffect {
    settings: AudioSettings,
    filters: [IIRFilterer; NUM_BANDS],
    prev_gains: [f32; NUM_BANDS],
    first_frame: bool,
    tail_frames: usize,
    scratch: Vec<f32>,
}

impl EQEffect {
    pub fn new(settings: AudioSettings) -> Self {
        let mut effect = Self {
            settings,
            filters: Default::default(),
            prev_gains: [1.0; NUM_BANDS],
            first_frame: true,
            tail_frames: 0,
            scratch: vec![0.0; settings.frame_size()],
        };
        effect.retune([1.0; NUM_BANDS]);
        effect
    }

    fn retune(&mut self, gains: [f32; NUM_BANDS]) {
        let rate = self.settings.sampling_rate();
        self.filters[0].set_filter(IIR::low_shelf(LOW_MID_CROSSOVER, gains[0], rate));
        self.filters[1].set_filter(IIR::peaking(
            LOW_MID_CROSSOVER,
            MID_HIGH_CROSSOVER,
            gains[1],
            rate,
        ));
        self.filters[2].set_filter(IIR::high_shelf(MID_HIGH_CROSSOVER, gains[2], rate));
        self.prev_gains = gains;
    }

    pub fn apply(
        &mut self,
        params: &EQEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        debug_assert_eq!(output.num_channels(), 1);
        debug_assert_eq!(input.num_samples(), self.settings.frame_size());

        let mut gains = params.gains;
        for g in &mut gains {
            *g = g.max(MIN_EQ_GAIN);
        }

        let changed = gains
            .iter()
            .zip(&self.prev_gains)
            .any(|(a, b)| (a - b).abs() > 1e-6);
        if changed || self.first_frame {
            self.retune(gains);
        }
        self.first_frame = false;

        self.scratch.copy_from_slice(input.channel(0));
        for filter in &mut self.filters {
            filter.apply_in_place(&mut self.scratch);
        }
        output.channel_mut(0).copy_from_slice(&self.scratch);

        // IIR ringing is short; one frame of tail flushes it below audibility.
        self.tail_frames = 1;
        AudioEffectState::TailRemaining
    }
}

impl AudioEffect for EQEffect {
    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
        self.first_frame = true;
        self.tail_frames = 0;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        self.scratch.fill(0.0);
        for filter in &mut self.filters {
            filter.apply_in_place(&mut self.scratch);
        }
        out.channel_mut(0).copy_from_slice(&self.scratch);
        self.tail_frames = self.tail_frames.saturating_sub(1);
        if self.tail_frames == 0 {
            AudioEffectState::TailComplete
        } else {
            AudioEffectState::TailRemaining
        }
    }

    fn num_tail_samples_remaining(&self) -> usize {
        self.tail_frames * self.settings.frame_size()
    }
}
