//! Reverberation estimation
//!
//! Fits 3-band T60 from the backward-integrated energy decay curve, and
//! solves the splice between a convolutional early section and the
//! parametric tail for the hybrid reverb effect.

use crate::{EnergyField, ImpulseResponse, ENERGY_BIN_DURATION};
use ef_core::{
    AudioBuffer, AudioSettings, LOW_MID_CROSSOVER, MID_HIGH_CROSSOVER, NUM_BANDS,
};
use ef_dsp::{AudioEffect, AudioEffectState, ReverbEffect, ReverbEffectParams, IIR8};

/// Three reverberation times, seconds per band
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Reverb {
    pub reverb_times: [f32; NUM_BANDS],
}

/// Fallback T60 per band when the decay has too little dynamic range
const DEFAULT_REVERB_TIMES: [f32; NUM_BANDS] = [1.0, 0.8, 0.6];

/// Decay range used for the slope fit, dB below peak
const FIT_START_DB: f32 = -5.0;
const FIT_END_DB: f32 = -35.0;

/// T60 estimation from fields and impulse responses
#[derive(Debug, Default, Clone)]
pub struct ReverbEstimator;

impl ReverbEstimator {
    /// Estimate from an energy field's omni channel (energy per bin).
    pub fn estimate_from_energy_field(field: &EnergyField) -> Reverb {
        let mut reverb = Reverb::default();
        for band in 0..NUM_BANDS {
            let energy = field.bins(0, band);
            reverb.reverb_times[band] =
                fit_t60(energy, ENERGY_BIN_DURATION).unwrap_or(DEFAULT_REVERB_TIMES[band]);
        }
        reverb
    }

    /// Estimate from channel 0 of a time-domain IR, band-filtering first.
    pub fn estimate_from_ir(ir: &ImpulseResponse) -> Reverb {
        let rate = ir.sampling_rate();
        let samples = ir.channel(0);
        let mut filtered = vec![0.0f32; samples.len()];
        let mut reverb = Reverb::default();

        for band in 0..NUM_BANDS {
            let mut filter = match band {
                0 => IIR8::low_pass(LOW_MID_CROSSOVER, rate),
                1 => IIR8::band_pass(LOW_MID_CROSSOVER, MID_HIGH_CROSSOVER, rate),
                _ => IIR8::high_pass(MID_HIGH_CROSSOVER, rate),
            };
            filter.apply(samples, &mut filtered);
            let energy: Vec<f32> = filtered.iter().map(|x| x * x).collect();
            reverb.reverb_times[band] =
                fit_t60(&energy, 1.0 / rate as f32).unwrap_or(DEFAULT_REVERB_TIMES[band]);
        }
        reverb
    }
}

/// Backward-integrate the squared signal and fit the decay slope between
/// -5 dB and -35 dB. Returns `None` when the dynamic range is too small.
fn fit_t60(energy: &[f32], step_seconds: f32) -> Option<f32> {
    if energy.is_empty() {
        return None;
    }

    // Energy decay curve: backward cumulative sum.
    let mut edc = vec![0.0f64; energy.len()];
    let mut sum = 0.0f64;
    for (i, &e) in energy.iter().enumerate().rev() {
        sum += e.max(0.0) as f64;
        edc[i] = sum;
    }
    let total = edc[0];
    if total <= 0.0 {
        return None;
    }

    let db_at = |i: usize| 10.0 * (edc[i] / total).max(1e-20).log10();

    let start = (0..edc.len()).find(|&i| db_at(i) <= FIT_START_DB as f64)?;
    let end = (start..edc.len()).find(|&i| db_at(i) <= FIT_END_DB as f64)?;
    if end <= start {
        return None;
    }

    let delta_db = db_at(end) - db_at(start);
    let delta_t = (end - start) as f64 * step_seconds as f64;
    let slope = delta_db / delta_t; // dB per second, negative
    if slope >= -1e-6 {
        return None;
    }
    Some((-60.0 / slope) as f32)
}

/// Result of the hybrid splice solve
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct HybridReverbParams {
    /// Per-band EQ gains for the parametric tail
    pub eq_gains: [f32; NUM_BANDS],
    /// Tail alignment delay, samples
    pub delay_samples: usize,
}

/// Solves EQ gains and delay so the parametric tail continues the
/// convolutional head's per-band energy at the transition.
#[derive(Debug, Clone)]
pub struct HybridReverbEstimator {
    audio: AudioSettings,
}

impl HybridReverbEstimator {
    pub fn new(audio: AudioSettings) -> Self {
        Self { audio }
    }

    pub fn estimate(
        &self,
        reverb: &Reverb,
        ir: &ImpulseResponse,
        transition_time: f32,
        overlap_fraction: f32,
    ) -> HybridReverbParams {
        // Accept only a fraction in (0, 1]; out-of-range inputs are a
        // configuration bug upstream.
        let overlap_fraction = if (0.0..=1.0).contains(&overlap_fraction) && overlap_fraction > 0.0
        {
            overlap_fraction
        } else {
            log::warn!("hybrid overlap fraction {overlap_fraction} outside (0, 1], clamping");
            overlap_fraction.clamp(0.05, 1.0)
        };

        let rate = self.audio.sampling_rate();
        let transition_samples = ((transition_time * rate as f32) as usize)
            .clamp(1, ir.num_samples().max(1));
        let overlap_samples = ((transition_samples as f32 * overlap_fraction) as usize).max(1);
        let window_start = transition_samples.saturating_sub(overlap_samples);

        // Per-band energy density of the IR head near the transition.
        let head_density = band_energy_density(
            ir.channel(0),
            window_start,
            transition_samples,
            rate,
        );

        // The parametric reverb's own impulse density over the same
        // window, measured by running it.
        let tail_density = self.parametric_density(reverb, window_start, transition_samples);

        let mut eq_gains = [1.0f32; NUM_BANDS];
        for band in 0..NUM_BANDS {
            if tail_density[band] > 1e-12 {
                eq_gains[band] = (head_density[band] / tail_density[band])
                    .sqrt()
                    .clamp(1e-4, 16.0);
            } else if head_density[band] <= 1e-12 {
                eq_gains[band] = 1e-4;
            }
        }

        HybridReverbParams {
            eq_gains,
            delay_samples: window_start,
        }
    }

    /// Drive the parametric reverb with a unit impulse and measure its
    /// per-band energy density over `[start, end)`.
    fn parametric_density(
        &self,
        reverb: &Reverb,
        start: usize,
        end: usize,
    ) -> [f32; NUM_BANDS] {
        let frame = self.audio.frame_size();
        let mut effect = ReverbEffect::new(self.audio);
        let params = ReverbEffectParams {
            reverb_times: reverb.reverb_times,
        };

        let mut impulse = AudioBuffer::new(1, frame);
        impulse.channel_mut(0)[0] = 1.0;
        let mut block = AudioBuffer::new(1, frame);
        let mut response = Vec::with_capacity(end);

        effect.apply(&params, &impulse, &mut block);
        response.extend_from_slice(block.channel(0));
        while response.len() < end {
            if effect.tail(&mut block) == AudioEffectState::TailComplete {
                response.extend_from_slice(block.channel(0));
                break;
            }
            response.extend_from_slice(block.channel(0));
        }
        response.resize(end, 0.0);

        band_energy_density(&response, start, end, self.audio.sampling_rate())
    }
}

/// Mean squared amplitude per band over `[start, end)`.
fn band_energy_density(
    samples: &[f32],
    start: usize,
    end: usize,
    rate: u32,
) -> [f32; NUM_BANDS] {
    let end = end.min(samples.len());
    let mut out = [0.0f32; NUM_BANDS];
    if start >= end {
        return out;
    }
    let mut filtered = vec![0.0f32; samples.len()];
    for (band, density) in out.iter_mut().enumerate() {
        let mut filter = match band {
            0 => IIR8::low_pass(LOW_MID_CROSSOVER, rate),
            1 => IIR8::band_pass(LOW_MID_CROSSOVER, MID_HIGH_CROSSOVER, rate),
            _ => IIR8::high_pass(MID_HIGH_CROSSOVER, rate),
        };
        filter.apply(samples, &mut filtered);
        *density = filtered[start..end].iter().map(|x| x * x).sum::<f32>()
            / (end - start) as f32;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic exponential decay with a known T60.
    fn synthetic_energy(t60: f32, step: f32, duration: f32) -> Vec<f32> {
        let count = (duration / step) as usize;
        (0..count)
            .map(|i| {
                let t = i as f32 * step;
                10.0f32.powf(-6.0 * t / t60)
            })
            .collect()
    }

    #[test]
    fn test_t60_recovered_within_5_percent() {
        for &t60 in &[0.4f32, 1.0, 2.0] {
            let energy = synthetic_energy(t60, 0.01, t60 * 1.5);
            let estimate = fit_t60(&energy, 0.01).unwrap();
            let error = (estimate - t60).abs() / t60;
            assert!(error < 0.05, "t60 {t60}: estimate {estimate}");
        }
    }

    #[test]
    fn test_insufficient_range_uses_defaults() {
        // Flat energy never decays 35 dB.
        let energy = vec![1.0f32; 50];
        assert!(fit_t60(&energy, 0.01).is_none());

        let mut field = EnergyField::new(0.5, 0);
        for bin in 0..field.num_bins() {
            for band in 0..NUM_BANDS {
                field.add_energy(0, band, bin, 1.0);
            }
        }
        let reverb = ReverbEstimator::estimate_from_energy_field(&field);
        assert_eq!(reverb.reverb_times, DEFAULT_REVERB_TIMES);
    }

    #[test]
    fn test_energy_field_estimation() {
        let mut field = EnergyField::new(2.0, 0);
        let energy = synthetic_energy(1.2, ENERGY_BIN_DURATION, 2.0);
        for (bin, &e) in energy.iter().enumerate().take(field.num_bins()) {
            for band in 0..NUM_BANDS {
                field.add_energy(0, band, bin, e);
            }
        }
        let reverb = ReverbEstimator::estimate_from_energy_field(&field);
        for band in 0..NUM_BANDS {
            let error = (reverb.reverb_times[band] - 1.2).abs() / 1.2;
            assert!(error < 0.05, "band {band}: {}", reverb.reverb_times[band]);
        }
    }

    #[test]
    fn test_reverb_effect_roundtrip() {
        // Feed an impulse through the FDN reverb and re-estimate its T60.
        let audio = AudioSettings::new(48000, 1024).unwrap();
        let target = Reverb {
            reverb_times: [2.0, 1.5, 1.0],
        };
        let mut effect = ReverbEffect::new(audio);
        let params = ReverbEffectParams {
            reverb_times: target.reverb_times,
        };

        let mut impulse = AudioBuffer::new(1, 1024);
        impulse.channel_mut(0)[0] = 1.0;
        let mut block = AudioBuffer::new(1, 1024);
        let mut ir = ImpulseResponse::new(1, 48000 * 5 / 2, 48000);

        effect.apply(&params, &impulse, &mut block);
        let mut cursor = 0;
        let total = ir.num_samples();
        let mut copy_block = |block: &AudioBuffer, cursor: &mut usize, ir: &mut ImpulseResponse| {
            let n = block.num_samples().min(total - *cursor);
            ir.channel_mut(0)[*cursor..*cursor + n].copy_from_slice(&block.channel(0)[..n]);
            *cursor += n;
        };
        copy_block(&block, &mut cursor, &mut ir);
        while cursor < total {
            effect.tail(&mut block);
            copy_block(&block, &mut cursor, &mut ir);
        }

        let estimate = ReverbEstimator::estimate_from_ir(&ir);
        for band in 0..NUM_BANDS {
            let expected = target.reverb_times[band];
            let got = estimate.reverb_times[band];
            assert!(
                (got - expected).abs() < 0.1 + expected * 0.1,
                "band {band}: expected {expected}, got {got}"
            );
        }
    }

    #[test]
    fn test_hybrid_estimator_matches_energy() {
        let audio = AudioSettings::new(48000, 1024).unwrap();
        let estimator = HybridReverbEstimator::new(audio);
        let reverb = Reverb {
            reverb_times: [0.8, 0.6, 0.4],
        };

        // An IR decaying like the reverb itself: EQ should come out in a
        // sane range and delay before the transition.
        let mut ir = ImpulseResponse::new(1, 24000, 48000);
        let mut rng_state = 12345u64;
        for (t, sample) in ir.channel_mut(0).iter_mut().enumerate() {
            rng_state = rng_state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let noise = ((rng_state >> 40) as f32 / 8388608.0) - 1.0;
            let env = 10.0f32.powf(-3.0 * t as f32 / (0.6 * 48000.0));
            *sample = noise * env * 0.1;
        }

        let result = estimator.estimate(&reverb, &ir, 0.25, 0.25);
        assert!(result.delay_samples < (0.25f32 * 48000.0) as usize);
        for band in 0..NUM_BANDS {
            assert!(result.eq_gains[band].is_finite());
            assert!(result.eq_gains[band] > 0.0);
        }
    }
}
