//! Impulse-response reconstruction
//!
//! Turns an energy field into a time-domain IR: per channel and band, a
//! sign-randomized noise carrier shaped by the per-bin energy envelope,
//! band-limited with an 8th-order filter, weighted by air absorption,
//! and summed across bands.

use crate::{AirAbsorptionModel, EnergyField, ImpulseResponse, ENERGY_BIN_DURATION};
use ef_core::{LOW_MID_CROSSOVER, MID_HIGH_CROSSOVER, NUM_BANDS, SPEED_OF_SOUND};
use ef_dsp::IIR8;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Envelope interpretation during reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ReconstructionType {
    /// Piecewise-constant staircase per bin
    #[default]
    Linear,
    /// Gaussian-smoothed envelope to soften bin transients
    Gaussian,
}

/// Energy field to impulse response
#[derive(Debug, Clone)]
pub struct Reconstructor {
    sampling_rate: u32,
}

impl Reconstructor {
    pub fn new(sampling_rate: u32) -> Self {
        Self { sampling_rate }
    }

    pub fn reconstruct(
        &self,
        field: &EnergyField,
        air_absorption: &AirAbsorptionModel,
        kind: ReconstructionType,
        ir: &mut ImpulseResponse,
    ) {
        let samples_per_bin = (ENERGY_BIN_DURATION * self.sampling_rate as f32).round() as usize;
        let num_samples = ir.num_samples();
        let usable_bins = field
            .num_bins()
            .min(num_samples.div_ceil(samples_per_bin.max(1)));

        ir.reset();
        let mut envelope = vec![0.0f32; num_samples];
        let mut band_signal = vec![0.0f32; num_samples];
        let mut filtered = vec![0.0f32; num_samples];

        for channel in 0..field.num_channels().min(ir.num_channels()) {
            for band in 0..NUM_BANDS {
                let bins = field.bins(channel, band);

                build_envelope(
                    &bins[..usable_bins],
                    samples_per_bin,
                    kind,
                    &mut envelope,
                );

                // Deterministic carrier per channel/band pair.
                let mut rng = ChaCha8Rng::seed_from_u64(
                    0xEC0_F1E1Du64 ^ ((channel as u64) << 16) ^ band as u64,
                );
                for (sample, &env) in band_signal.iter_mut().zip(envelope.iter()) {
                    let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
                    *sample = sign * env;
                }

                let mut filter = band_filter(band, self.sampling_rate);
                filter.apply(&band_signal, &mut filtered);

                let out = ir.channel_mut(channel);
                for (t, (o, &v)) in out.iter_mut().zip(&filtered).enumerate() {
                    let distance = t as f32 / self.sampling_rate as f32 * SPEED_OF_SOUND;
                    *o += v * air_absorption.evaluate(distance, band);
                }
            }
        }
    }
}

fn band_filter(band: usize, sampling_rate: u32) -> IIR8 {
    match band {
        0 => IIR8::low_pass(LOW_MID_CROSSOVER, sampling_rate),
        1 => IIR8::band_pass(LOW_MID_CROSSOVER, MID_HIGH_CROSSOVER, sampling_rate),
        _ => IIR8::high_pass(MID_HIGH_CROSSOVER, sampling_rate),
    }
}

/// Amplitude envelope whose squared sum per bin matches the bin energy.
fn build_envelope(
    bins: &[f32],
    samples_per_bin: usize,
    kind: ReconstructionType,
    envelope: &mut [f32],
) {
    envelope.fill(0.0);
    let amplitudes: Vec<f32> = bins
        .iter()
        .map(|&e| (e.max(0.0) / samples_per_bin.max(1) as f32).sqrt())
        .collect();

    match kind {
        ReconstructionType::Linear => {
            for (bin, &amp) in amplitudes.iter().enumerate() {
                let start = bin * samples_per_bin;
                let end = (start + samples_per_bin).min(envelope.len());
                if start >= envelope.len() {
                    break;
                }
                envelope[start..end].fill(amp);
            }
        }
        ReconstructionType::Gaussian => {
            // Each bin spreads a Gaussian around its center; sigma of half
            // a bin keeps neighbors overlapping smoothly.
            let sigma = samples_per_bin as f32 * 0.5;
            let radius = (2.0 * sigma) as isize;
            for (bin, &amp) in amplitudes.iter().enumerate() {
                if amp == 0.0 {
                    continue;
                }
                let center = (bin * samples_per_bin + samples_per_bin / 2) as isize;
                for t in (center - radius)..=(center + radius) {
                    if t < 0 || t as usize >= envelope.len() {
                        continue;
                    }
                    let x = (t - center) as f32 / sigma;
                    envelope[t as usize] += amp * (-0.5 * x * x).exp();
                }
            }
            // Rescale so total energy matches the field.
            let target: f32 = bins.iter().map(|&e| e.max(0.0)).sum();
            let actual: f32 = envelope.iter().map(|&a| a * a).sum();
            if actual > 1e-12 {
                let scale = (target / actual).sqrt();
                for value in envelope.iter_mut() {
                    *value *= scale;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bin_impulse_lands_in_time() {
        let mut field = EnergyField::new(0.5, 0);
        // Energy only in bin 20 (200 ms).
        field.add_energy(0, 0, 20, 1.0);
        field.add_energy(0, 1, 20, 1.0);
        field.add_energy(0, 2, 20, 1.0);

        let reconstructor = Reconstructor::new(48000);
        let mut ir = ImpulseResponse::new(1, 24000, 48000);
        reconstructor.reconstruct(
            &field,
            &AirAbsorptionModel::Default,
            ReconstructionType::Linear,
            &mut ir,
        );

        // Energy centroid near 200 ms within one bin width.
        let samples = ir.channel(0);
        let total: f32 = samples.iter().map(|x| x * x).sum();
        assert!(total > 0.0);
        let centroid: f32 = samples
            .iter()
            .enumerate()
            .map(|(t, x)| t as f32 * x * x)
            .sum::<f32>()
            / total;
        let centroid_seconds = centroid / 48000.0;
        assert!(
            (centroid_seconds - 0.205).abs() < ENERGY_BIN_DURATION * 2.0,
            "centroid at {centroid_seconds} s"
        );
    }

    #[test]
    fn test_energy_preserved_roughly() {
        let mut field = EnergyField::new(0.3, 0);
        for bin in 0..30 {
            field.add_energy(0, 1, bin, 0.1);
        }
        let reconstructor = Reconstructor::new(48000);
        let mut ir = ImpulseResponse::new(1, 14400, 48000);
        reconstructor.reconstruct(
            &field,
            &AirAbsorptionModel::Default,
            ReconstructionType::Linear,
            &mut ir,
        );
        let energy: f32 = ir.channel(0).iter().map(|x| x * x).sum();
        // Band filtering and air absorption remove some energy; most of
        // the mid-band field should survive.
        assert!(energy > 0.5 && energy < 6.0, "energy {energy}");
    }

    #[test]
    fn test_gaussian_smoother_than_linear() {
        let mut field = EnergyField::new(0.2, 0);
        field.add_energy(0, 1, 5, 1.0);

        let reconstructor = Reconstructor::new(48000);
        let mut linear = ImpulseResponse::new(1, 9600, 48000);
        let mut gaussian = ImpulseResponse::new(1, 9600, 48000);
        reconstructor.reconstruct(
            &field,
            &AirAbsorptionModel::Default,
            ReconstructionType::Linear,
            &mut linear,
        );
        reconstructor.reconstruct(
            &field,
            &AirAbsorptionModel::Default,
            ReconstructionType::Gaussian,
            &mut gaussian,
        );

        // The Gaussian envelope spreads energy over more samples.
        let support = |ir: &ImpulseResponse| {
            ir.channel(0)
                .iter()
                .filter(|x| x.abs() > 1e-4)
                .count()
        };
        assert!(support(&gaussian) > support(&linear));
    }

    #[test]
    fn test_reconstruction_is_deterministic() {
        let mut field = EnergyField::new(0.2, 1);
        field.add_energy(0, 0, 3, 0.5);
        field.add_energy(2, 2, 9, 0.1);

        let reconstructor = Reconstructor::new(48000);
        let mut a = ImpulseResponse::new(4, 9600, 48000);
        let mut b = ImpulseResponse::new(4, 9600, 48000);
        reconstructor.reconstruct(
            &field,
            &AirAbsorptionModel::Default,
            ReconstructionType::Linear,
            &mut a,
        );
        reconstructor.reconstruct(
            &field,
            &AirAbsorptionModel::Default,
            ReconstructionType::Linear,
            &mut b,
        );
        assert_eq!(a, b);
    }
}
