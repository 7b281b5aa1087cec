//! Hybrid reverb effect
//!
//! Splices a short convolutional early section (the first
//! `transition_time` seconds of a simulated IR) with a parametric tail
//! from the FDN reverb. The tail passes through a 3-band EQ whose gains
//! are solved by the hybrid reverb estimator so per-band energy continues
//! smoothly across the splice, then an integer-sample delay aligns it
//! with the end of the convolution head. The tail feeds the W channel of
//! the ambisonics output.

use crate::{
    AudioEffect, AudioEffectState, DelayEffect, DelayEffectParams, EQEffect, EQEffectParams,
    OverlapSaveConvolutionEffect, OverlapSaveConvolutionEffectParams,
    OverlapSaveConvolutionEffectSettings, OverlapSaveFIR, ReverbEffect, ReverbEffectParams,
};
use ef_core::{AudioBuffer, AudioSettings, TripleBuffer, NUM_BANDS};
use std::sync::Arc;

/// Settings for `HybridReverbEffect`
#[derive(Debug, Clone, Copy)]
pub struct HybridReverbEffectSettings {
    pub audio: AudioSettings,
    /// Ambisonics channel count of the convolution head
    pub num_channels: usize,
    /// Maximum convolution head length in samples
    pub ir_size: usize,
}

/// Parameters for `HybridReverbEffect`
pub struct HybridReverbEffectParams {
    /// Triple-buffered convolution head
    pub fir: Arc<TripleBuffer<OverlapSaveFIR>>,
    /// Parametric tail T60 per band, seconds
    pub reverb_times: [f32; NUM_BANDS],
    /// Splice EQ gains from the hybrid reverb estimator
    pub eq_gains: [f32; NUM_BANDS],
    /// Tail alignment delay in samples
    pub delay_samples: usize,
    /// Ambisonics channels to render
    pub num_channels: usize,
}

/// Convolution head + parametric tail reverb
pub struct HybridReverbEffect {
    settings: HybridReverbEffectSettings,
    convolution: OverlapSaveConvolutionEffect,
    reverb: ReverbEffect,
    eq: EQEffect,
    delay: DelayEffect,
    mono_scratch: AudioBuffer,
    mono_scratch2: AudioBuffer,
    /// Splice parameters retained from the last `apply` for the tail phase
    last_eq_gains: [f32; NUM_BANDS],
    last_delay_samples: usize,
    warned_delay_overflow: bool,
}

impl HybridReverbEffect {
    pub fn new(settings: HybridReverbEffectSettings) -> Self {
        let frame_size = settings.audio.frame_size();
        Self {
            settings,
            convolution: OverlapSaveConvolutionEffect::new(
                OverlapSaveConvolutionEffectSettings {
                    audio: settings.audio,
                    num_channels: settings.num_channels,
                    ir_size: settings.ir_size,
                },
            ),
            reverb: ReverbEffect::new(settings.audio),
            eq: EQEffect::new(settings.audio),
            delay: DelayEffect::new(settings.ir_size.max(frame_size)),
            mono_scratch: AudioBuffer::new(1, frame_size),
            mono_scratch2: AudioBuffer::new(1, frame_size),
            last_eq_gains: [1.0; NUM_BANDS],
            last_delay_samples: 0,
            warned_delay_overflow: false,
        }
    }

    pub fn apply(
        &mut self,
        params: &HybridReverbEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        debug_assert_eq!(input.num_channels(), 1);

        if params.delay_samples > self.settings.ir_size && !self.warned_delay_overflow {
            log::warn!(
                "hybrid tail delay {} exceeds head capacity {}, clamping",
                params.delay_samples,
                self.settings.ir_size
            );
            self.warned_delay_overflow = true;
        }

        let conv_state = self.convolution.apply(
            &OverlapSaveConvolutionEffectParams {
                fir: Arc::clone(&params.fir),
                num_channels: params.num_channels,
            },
            input,
            output,
        );

        self.last_eq_gains = params.eq_gains;
        self.last_delay_samples = params.delay_samples;
        let tail_state = self.process_tail(params, Some(input));
        self.mix_tail_into(output);

        if conv_state == AudioEffectState::TailComplete
            && tail_state == AudioEffectState::TailComplete
        {
            AudioEffectState::TailComplete
        } else {
            AudioEffectState::TailRemaining
        }
    }

    fn process_tail(
        &mut self,
        params: &HybridReverbEffectParams,
        input: Option<&AudioBuffer>,
    ) -> AudioEffectState {
        let reverb_state = match input {
            Some(input) => self.reverb.apply(
                &ReverbEffectParams {
                    reverb_times: params.reverb_times,
                },
                input,
                &mut self.mono_scratch,
            ),
            None => self.reverb.tail(&mut self.mono_scratch),
        };
        self.eq.apply(
            &EQEffectParams {
                gains: params.eq_gains,
            },
            &self.mono_scratch,
            &mut self.mono_scratch2,
        );
        self.delay.apply(
            &DelayEffectParams {
                delay_samples: params.delay_samples,
            },
            &self.mono_scratch2,
            &mut self.mono_scratch,
        );
        reverb_state
    }

    fn mix_tail_into(&mut self, output: &mut AudioBuffer) {
        let tail = self.mono_scratch.channel(0);
        let w = output.channel_mut(0);
        for (y, &t) in w.iter_mut().zip(tail) {
            *y += t;
        }
    }
}

impl AudioEffect for HybridReverbEffect {
    fn reset(&mut self) {
        self.convolution.reset();
        self.reverb.reset();
        self.eq.reset();
        self.delay.reset();
        self.mono_scratch.make_silent();
        self.mono_scratch2.make_silent();
    }

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        let conv_state = self.convolution.tail(out);

        // Keep driving the EQ and delay with the reverb's decaying output.
        let reverb_state = self.reverb.tail(&mut self.mono_scratch);
        self.eq.apply(
            &EQEffectParams {
                gains: self.last_eq_gains,
            },
            &self.mono_scratch,
            &mut self.mono_scratch2,
        );
        self.delay.apply(
            &DelayEffectParams {
                delay_samples: self.last_delay_samples,
            },
            &self.mono_scratch2,
            &mut self.mono_scratch,
        );
        self.mix_tail_into(out);

        if conv_state == AudioEffectState::TailComplete
            && reverb_state == AudioEffectState::TailComplete
        {
            AudioEffectState::TailComplete
        } else {
            AudioEffectState::TailRemaining
        }
    }

    fn num_tail_samples_remaining(&self) -> usize {
        self.convolution
            .num_tail_samples_remaining()
            .max(self.reverb.num_tail_samples_remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OverlapSavePartitioner;

    #[test]
    fn test_head_and_tail_both_present() {
        let frame = 256;
        let audio = AudioSettings::new(48000, frame).unwrap();
        let ir_size = frame * 2;
        let settings = HybridReverbEffectSettings {
            audio,
            num_channels: 1,
            ir_size,
        };

        let mut head_ir = vec![0.0f32; ir_size];
        head_ir[4] = 0.8;
        let fir = OverlapSaveFIR::triple_buffer(1, ir_size, frame);
        {
            let mut partitioner = OverlapSavePartitioner::new(frame);
            partitioner.partition(&[&head_ir], fir.write());
        }
        fir.publish();

        let mut effect = HybridReverbEffect::new(settings);
        let params = HybridReverbEffectParams {
            fir,
            reverb_times: [0.5, 0.4, 0.3],
            eq_gains: [1.0, 1.0, 1.0],
            delay_samples: ir_size / 2,
            num_channels: 1,
        };

        let mut input = AudioBuffer::new(1, frame);
        input.channel_mut(0)[0] = 1.0;
        let mut output = AudioBuffer::new(1, frame);
        effect.apply(&params, &input, &mut output);

        // The convolution head's impulse copy lands at sample 4.
        assert!((output.channel(0)[4] - 0.8).abs() < 1e-2);

        // The parametric tail contributes energy in later blocks.
        let mut tail_energy = 0.0f32;
        let mut tail = AudioBuffer::new(1, frame);
        for _ in 0..20 {
            effect.tail(&mut tail);
            tail_energy += tail.channel(0).iter().map(|x| x * x).sum::<f32>();
        }
        assert!(tail_energy > 0.0, "parametric tail produced no energy");
    }
}
