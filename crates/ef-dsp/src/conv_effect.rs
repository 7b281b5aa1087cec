//! Overlap-save convolution effect
//!
//! Convolves a mono input stream against a long multichannel IR held in a
//! triple buffer. The simulation thread replaces the IR by writing the
//! triple buffer's write slot and publishing; the audio thread sees the
//! swap at the next block boundary, never a mix of old and new.

use crate::{AudioEffect, AudioEffectState, OverlapSaveEngine, OverlapSaveFIR};
use ef_core::{AudioBuffer, AudioSettings, TripleBuffer};
use std::sync::Arc;

/// Settings for `OverlapSaveConvolutionEffect`
#[derive(Debug, Clone, Copy)]
pub struct OverlapSaveConvolutionEffectSettings {
    pub audio: AudioSettings,
    /// Output channel count (e.g. ambisonics `(order+1)^2`)
    pub num_channels: usize,
    /// Maximum IR length in samples
    pub ir_size: usize,
}

/// Parameters for `OverlapSaveConvolutionEffect`
pub struct OverlapSaveConvolutionEffectParams {
    /// Triple-buffered IR shared with the simulation thread
    pub fir: Arc<TripleBuffer<OverlapSaveFIR>>,
    /// Output channels to fill this block (clamped to the effect setting)
    pub num_channels: usize,
}

/// Long-IR convolution of one input stream into N output channels
pub struct OverlapSaveConvolutionEffect {
    settings: OverlapSaveConvolutionEffectSettings,
    engine: OverlapSaveEngine,
    /// IR source retained from the last `apply` so the tail can flush
    fir: Option<Arc<TripleBuffer<OverlapSaveFIR>>>,
    tail_blocks_remaining: usize,
}

impl OverlapSaveConvolutionEffect {
    pub fn new(settings: OverlapSaveConvolutionEffectSettings) -> Self {
        let num_blocks = settings.ir_size.div_ceil(settings.audio.frame_size()).max(1);
        Self {
            settings,
            engine: OverlapSaveEngine::new(num_blocks, settings.audio.frame_size()),
            fir: None,
            tail_blocks_remaining: 0,
        }
    }

    pub fn apply(
        &mut self,
        params: &OverlapSaveConvolutionEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);
        debug_assert_eq!(input.num_samples(), self.settings.audio.frame_size());

        let num_channels = params
            .num_channels
            .min(self.settings.num_channels)
            .min(output.num_channels());

        self.engine.push_input(input.channel(0));

        let fir = params.fir.acquire_read();
        for ch in 0..num_channels {
            self.engine.convolve(fir, ch, output.channel_mut(ch));
        }
        for ch in num_channels..output.num_channels() {
            output.channel_mut(ch).fill(0.0);
        }

        self.fir = Some(Arc::clone(&params.fir));
        // The IR extends up to num_blocks frames past the current input.
        self.tail_blocks_remaining = self.engine.num_blocks();
        AudioEffectState::TailRemaining
    }
}

impl AudioEffect for OverlapSaveConvolutionEffect {
    fn reset(&mut self) {
        self.engine.reset();
        self.fir = None;
        self.tail_blocks_remaining = 0;
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        let Some(fir_buffer) = self.fir.clone() else {
            out.make_silent();
            return AudioEffectState::TailComplete;
        };

        self.engine.push_input(&[]);
        let fir = fir_buffer.acquire_read();
        let num_channels = self.settings.num_channels.min(out.num_channels());
        for ch in 0..num_channels {
            self.engine.convolve(fir, ch, out.channel_mut(ch));
        }
        for ch in num_channels..out.num_channels() {
            out.channel_mut(ch).fill(0.0);
        }

        self.tail_blocks_remaining = self.tail_blocks_remaining.saturating_sub(1);
        if self.tail_blocks_remaining == 0 {
            AudioEffectState::TailComplete
        } else {
            AudioEffectState::TailRemaining
        }
    }

    fn num_tail_samples_remaining(&self) -> usize {
        self.tail_blocks_remaining * self.settings.audio.frame_size()
    }
}
