//! HRTF database
//!
//! Immutable after construction and shareable across threads. Holds the
//! measurement grid, time-domain HRIR pairs, their analysis spectra
//! (magnitude + unwrapped phase), peak-delay tables, loudness
//! normalization, and the per-SH-channel projection HRIRs used for
//! ambisonics binaural rendering.
//!
//! Two sources: the built-in spherical-head grid, or a host-decoded
//! measurement record (`HrtfData`). File parsing happens outside the
//! engine.

use crate::sh;
use crate::{SpatialError, SpatialResult};
use ef_core::{AudioSettings, EngineSettings, Vector3, SPEED_OF_SOUND};
use ef_dsp::{next_pow2, Fft};
use num_complex::Complex;
use std::f32::consts::PI;

/// Head radius of the built-in spherical model, meters
const HEAD_RADIUS: f32 = 0.0875;

/// HRIR length of the built-in database, samples
const DEFAULT_HRIR_LENGTH: usize = 64;

/// Highest ambisonics order the projection HRIRs cover
pub const HRTF_MAX_AMBISONICS_ORDER: usize = 3;

/// Host-decoded HRTF measurement record (the shape a SOFA decoder yields)
#[derive(Debug, Clone)]
pub struct HrtfData {
    pub sampling_rate: u32,
    /// Unit measurement directions, listener convention
    pub directions: Vec<Vector3>,
    /// Per-direction left/right impulse responses
    pub hrirs: Vec<[Vec<f32>; 2]>,
}

/// Spectrum interpolation between measurement directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HrtfInterpolation {
    Nearest,
    Bilinear,
}

/// Phase handling applied after magnitude interpolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PhaseInterpolation {
    /// Minimum-phase reconstruction from the interpolated magnitude
    None,
    /// Geometric spherical-head ITD as linear phase
    SphereItd,
    /// Interpolate unwrapped measurement phase
    Full,
}

/// Loudness normalization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum HrtfNormalization {
    #[default]
    None,
    /// Per-direction RMS equalization of long-term loudness
    Rms,
}

/// Construction-time options
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct HrtfSettings {
    /// Broadband volume adjustment, dB
    pub volume_gain_db: f32,
    pub normalization: HrtfNormalization,
    /// Force the Nyquist bin real after phase interpolation
    pub nyquist_correction: bool,
}

impl Default for HrtfSettings {
    fn default() -> Self {
        Self {
            volume_gain_db: 0.0,
            normalization: HrtfNormalization::None,
            nyquist_correction: true,
        }
    }
}

struct DirectionRecord {
    hrir: [Vec<f32>; 2],
    magnitude: [Vec<f32>; 2],
    unwrapped_phase: [Vec<f32>; 2],
    peak_delay: [f32; 2],
}

/// Immutable HRTF database
pub struct HrtfDatabase {
    audio: AudioSettings,
    directions: Vec<Vector3>,
    records: Vec<DirectionRecord>,
    hrir_length: usize,
    /// Analysis FFT over `analysis_size` real samples
    analysis_size: usize,
    fft: Fft,
    /// Direction-averaged magnitude, the order-0 response for spatial blend
    mean_magnitude: [Vec<f32>; 2],
    /// Per-ACN-channel projection HRIRs for ambisonics binaural rendering
    ambisonics_hrirs: Vec<[Vec<f32>; 2]>,
    /// Linear broadband gain from the configured volume adjustment
    gain: f32,
    nyquist_correction: bool,
}

impl HrtfDatabase {
    /// Build from a decoded measurement record.
    pub fn new(
        data: HrtfData,
        audio: AudioSettings,
        settings: &HrtfSettings,
    ) -> SpatialResult<Self> {
        if data.directions.is_empty() || data.directions.len() != data.hrirs.len() {
            return Err(SpatialError::InvalidHrtfData(
                "direction and HRIR counts must match and be non-empty".into(),
            ));
        }
        if data.sampling_rate != audio.sampling_rate() {
            return Err(SpatialError::HrtfSampleRateMismatch {
                hrtf: data.sampling_rate,
                pipeline: audio.sampling_rate(),
            });
        }

        let hrir_length = data
            .hrirs
            .iter()
            .map(|pair| pair[0].len().max(pair[1].len()))
            .max()
            .unwrap_or(0);
        if hrir_length == 0 {
            return Err(SpatialError::InvalidHrtfData("empty impulse responses".into()));
        }

        let analysis_size = next_pow2((hrir_length + audio.frame_size()).max(2 * hrir_length));
        let fft = Fft::new(analysis_size);

        let mut records = Vec::with_capacity(data.directions.len());
        for pair in &data.hrirs {
            records.push(analyze_direction(pair, hrir_length, analysis_size, &fft, audio));
        }

        let gain = db_to_linear(settings.volume_gain_db);
        if settings.normalization == HrtfNormalization::Rms {
            normalize_loudness(&mut records);
        }

        let mean_magnitude = mean_magnitude(&records);
        let ambisonics_hrirs = project_ambisonics(&data.directions, &records, hrir_length);
        log::debug!(
            "HRTF database ready: {} directions, {hrir_length}-sample HRIRs, analysis size {analysis_size}",
            data.directions.len()
        );

        Ok(Self {
            audio,
            directions: data.directions,
            records,
            hrir_length,
            analysis_size,
            fft,
            mean_magnitude,
            ambisonics_hrirs,
            gain,
            nyquist_correction: settings.nyquist_correction,
        })
    }

    /// The built-in spherical-head measurement grid.
    pub fn default_database(audio: AudioSettings, settings: &HrtfSettings) -> Self {
        let data = synthesize_sphere_grid(audio.sampling_rate());
        // The synthetic grid is well-formed by construction.
        Self::new(data, audio, settings).expect("built-in HRTF grid is always valid")
    }

    pub fn audio_settings(&self) -> AudioSettings {
        self.audio
    }

    pub fn num_directions(&self) -> usize {
        self.directions.len()
    }

    pub fn direction(&self, index: usize) -> Vector3 {
        self.directions[index]
    }

    pub fn hrir_length(&self) -> usize {
        self.hrir_length
    }

    /// Broadband gain from the configured volume adjustment.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Index of the measurement direction closest to `direction`.
    pub fn nearest_index(&self, direction: Vector3) -> usize {
        let d = direction.normalized();
        let mut best = 0;
        let mut best_dot = f32::NEG_INFINITY;
        for (i, m) in self.directions.iter().enumerate() {
            let dot = m.dot(&d);
            if dot > best_dot {
                best_dot = dot;
                best = i;
            }
        }
        best
    }

    /// Time-domain HRIR pair at a measurement direction.
    pub fn hrir(&self, index: usize) -> [&[f32]; 2] {
        [&self.records[index].hrir[0], &self.records[index].hrir[1]]
    }

    /// Peak-delay pair (seconds) at a measurement direction.
    pub fn peak_delay(&self, index: usize) -> [f32; 2] {
        self.records[index].peak_delay
    }

    /// Magnitude spectrum pair at a measurement direction.
    pub fn magnitude(&self, index: usize) -> [&[f32]; 2] {
        [
            &self.records[index].magnitude[0],
            &self.records[index].magnitude[1],
        ]
    }

    /// Projection HRIR pair for one ACN channel.
    pub fn ambisonics_hrir(&self, acn: usize) -> [&[f32]; 2] {
        [
            &self.ambisonics_hrirs[acn][0],
            &self.ambisonics_hrirs[acn][1],
        ]
    }

    pub fn max_ambisonics_order(&self) -> usize {
        HRTF_MAX_AMBISONICS_ORDER
    }

    /// Interpolated time-domain HRIR pair for an arbitrary direction.
    ///
    /// `spatial_blend` in [0, 1] fades the direction-specific response
    /// toward the direction-averaged (order-0) response. Outputs are
    /// `hrir_length` samples and include the database gain. Also returns
    /// the ear peak-delay pair (seconds).
    pub fn interpolated(
        &self,
        direction: Vector3,
        interpolation: HrtfInterpolation,
        phase: PhaseInterpolation,
        spatial_blend: f32,
        out: &mut [Vec<f32>; 2],
    ) -> [f32; 2] {
        let direction = if direction.is_nearly_zero() {
            -Vector3::UNIT_Z
        } else {
            direction.normalized()
        };
        let spatial_blend = spatial_blend.clamp(0.0, 1.0);

        let weights = match interpolation {
            HrtfInterpolation::Nearest => vec![(self.nearest_index(direction), 1.0)],
            HrtfInterpolation::Bilinear => self.triangle_weights(direction),
        };

        // Exact measurement, full blend, measured phase: return it verbatim
        // so nearest lookups at grid directions are bit-faithful.
        if phase == PhaseInterpolation::Full
            && spatial_blend >= 1.0
            && weights.len() == 1
            && weights[0].1 == 1.0
        {
            let record = &self.records[weights[0].0];
            for ear in 0..2 {
                out[ear].clear();
                out[ear].extend_from_slice(&record.hrir[ear]);
                for sample in out[ear].iter_mut() {
                    *sample *= self.gain;
                }
                out[ear].resize(self.hrir_length, 0.0);
            }
            return record.peak_delay;
        }

        let num_bins = self.analysis_size / 2 + 1;
        let mut delays = [0.0f32; 2];
        for ear in 0..2 {
            let mut magnitude = vec![0.0f32; num_bins];
            let mut phase_acc = vec![0.0f32; num_bins];
            for &(index, weight) in &weights {
                let record = &self.records[index];
                for (bin, m) in magnitude.iter_mut().enumerate() {
                    *m += weight * record.magnitude[ear][bin];
                }
                for (bin, p) in phase_acc.iter_mut().enumerate() {
                    *p += weight * record.unwrapped_phase[ear][bin];
                }
                delays[ear] += weight * record.peak_delay[ear];
            }

            if spatial_blend < 1.0 {
                for (m, &mean) in magnitude.iter_mut().zip(&self.mean_magnitude[ear]) {
                    *m = spatial_blend * *m + (1.0 - spatial_blend) * mean;
                }
            }

            let mut spectrum = match phase {
                PhaseInterpolation::None => minimum_phase_spectrum(&magnitude, &self.fft),
                PhaseInterpolation::SphereItd => {
                    let delay = sphere_itd(direction, ear);
                    linear_phase_spectrum(
                        &magnitude,
                        delay,
                        self.audio.sampling_rate(),
                        self.analysis_size,
                    )
                }
                PhaseInterpolation::Full => magnitude
                    .iter()
                    .zip(&phase_acc)
                    .map(|(&m, &p)| Complex::from_polar(m, p))
                    .collect(),
            };

            if EngineSettings::dc_correction_for_phase_interpolation() {
                spectrum[0] = Complex::new(spectrum[0].norm(), 0.0);
            }
            if self.nyquist_correction {
                let last = spectrum.len() - 1;
                spectrum[last] = Complex::new(spectrum[last].re, 0.0);
            }

            let mut time = vec![0.0f32; self.analysis_size];
            self.fft.inverse(&mut spectrum, &mut time);

            out[ear].clear();
            out[ear].extend_from_slice(&time[..self.hrir_length]);
            for sample in out[ear].iter_mut() {
                *sample *= self.gain;
            }
        }
        delays
    }

    /// Barycentric weights over the enclosing triangle of nearby
    /// measurement directions; falls back to the nearest direction when no
    /// non-degenerate triangle contains the query (grid boundaries).
    fn triangle_weights(&self, direction: Vector3) -> Vec<(usize, f32)> {
        const NEIGHBORS: usize = 8;
        let mut nearest: Vec<(usize, f32)> = self
            .directions
            .iter()
            .enumerate()
            .map(|(i, m)| (i, m.dot(&direction)))
            .collect();
        nearest.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        nearest.truncate(NEIGHBORS);

        if let Some(&(index, dot)) = nearest.first() {
            if dot > 1.0 - 1e-7 {
                return vec![(index, 1.0)];
            }
        }

        let mut best: Option<(f32, [(usize, f32); 3])> = None;
        for a in 0..nearest.len() {
            for b in (a + 1)..nearest.len() {
                for c in (b + 1)..nearest.len() {
                    let (ia, ib, ic) = (nearest[a].0, nearest[b].0, nearest[c].0);
                    let Some(w) = barycentric(
                        direction,
                        self.directions[ia],
                        self.directions[ib],
                        self.directions[ic],
                    ) else {
                        continue;
                    };
                    if w.iter().any(|&x| x < -1e-4) {
                        continue;
                    }
                    // Prefer the tightest containing triangle.
                    let spread = 3.0
                        - (self.directions[ia].dot(&direction)
                            + self.directions[ib].dot(&direction)
                            + self.directions[ic].dot(&direction));
                    if best.map(|(s, _)| spread < s).unwrap_or(true) {
                        best = Some((spread, [(ia, w[0]), (ib, w[1]), (ic, w[2])]));
                    }
                }
            }
        }

        match best {
            Some((_, weights)) => {
                let sum: f32 = weights.iter().map(|&(_, w)| w).sum();
                weights
                    .iter()
                    .map(|&(i, w)| (i, w / sum.max(1e-9)))
                    .collect()
            }
            None => vec![(nearest.first().map(|&(i, _)| i).unwrap_or(0), 1.0)],
        }
    }
}

impl std::fmt::Debug for HrtfDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HrtfDatabase")
            .field("directions", &self.directions.len())
            .field("hrir_length", &self.hrir_length)
            .field("analysis_size", &self.analysis_size)
            .finish()
    }
}

/// Solve `d = w0 a + w1 b + w2 c` for the (projective) barycentric
/// weights. Returns `None` for a degenerate triangle.
fn barycentric(d: Vector3, a: Vector3, b: Vector3, c: Vector3) -> Option<[f32; 3]> {
    let det = a.dot(&b.cross(&c));
    if det.abs() < 1e-7 {
        return None;
    }
    let w0 = d.dot(&b.cross(&c)) / det;
    let w1 = a.dot(&d.cross(&c)) / det;
    let w2 = a.dot(&b.cross(&d)) / det;
    Some([w0, w1, w2])
}

fn analyze_direction(
    pair: &[Vec<f32>; 2],
    hrir_length: usize,
    analysis_size: usize,
    fft: &Fft,
    audio: AudioSettings,
) -> DirectionRecord {
    let mut hrir = [vec![0.0f32; hrir_length], vec![0.0f32; hrir_length]];
    let mut magnitude = [Vec::new(), Vec::new()];
    let mut unwrapped_phase = [Vec::new(), Vec::new()];
    let mut peak_delay = [0.0f32; 2];

    for ear in 0..2 {
        let n = pair[ear].len().min(hrir_length);
        hrir[ear][..n].copy_from_slice(&pair[ear][..n]);

        let peak_index = hrir[ear]
            .iter()
            .enumerate()
            .max_by(|a, b| {
                a.1.abs()
                    .partial_cmp(&b.1.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        peak_delay[ear] = peak_index as f32 / audio.sampling_rate() as f32;

        let mut time = vec![0.0f32; analysis_size];
        time[..hrir_length].copy_from_slice(&hrir[ear]);
        let mut spectrum = fft.make_spectrum();
        fft.forward(&mut time, &mut spectrum);

        magnitude[ear] = spectrum.iter().map(|c| c.norm()).collect();
        unwrapped_phase[ear] = unwrap_phase(&spectrum);
    }

    DirectionRecord {
        hrir,
        magnitude,
        unwrapped_phase,
        peak_delay,
    }
}

/// Unwrap `arg` along frequency so interpolation between directions does
/// not jump across branch cuts.
fn unwrap_phase(spectrum: &[Complex<f32>]) -> Vec<f32> {
    let mut out = Vec::with_capacity(spectrum.len());
    let mut offset = 0.0f32;
    let mut prev = 0.0f32;
    for (i, c) in spectrum.iter().enumerate() {
        let raw = c.arg();
        if i > 0 {
            let mut diff = raw - prev;
            while diff > PI {
                diff -= 2.0 * PI;
                offset -= 2.0 * PI;
            }
            while diff < -PI {
                diff += 2.0 * PI;
                offset += 2.0 * PI;
            }
        }
        prev = raw;
        out.push(raw + offset);
    }
    out
}

/// Minimum-phase spectrum from a magnitude via the real cepstrum.
fn minimum_phase_spectrum(magnitude: &[f32], fft: &Fft) -> Vec<Complex<f32>> {
    let size = fft.size();
    let mut log_mag: Vec<Complex<f32>> = magnitude
        .iter()
        .map(|&m| Complex::new(m.max(1e-9).ln(), 0.0))
        .collect();

    let mut cepstrum = vec![0.0f32; size];
    fft.inverse(&mut log_mag, &mut cepstrum);

    // Fold the anticausal part onto the causal side.
    for i in 1..size / 2 {
        cepstrum[i] *= 2.0;
        cepstrum[size - i] = 0.0;
    }

    let mut folded = fft.make_spectrum();
    fft.forward(&mut cepstrum, &mut folded);

    folded
        .iter()
        .map(|c| Complex::from_polar(c.re.exp(), c.im))
        .collect()
}

/// Linear-phase spectrum: magnitude with delay `tau` seconds.
fn linear_phase_spectrum(
    magnitude: &[f32],
    tau: f32,
    sampling_rate: u32,
    analysis_size: usize,
) -> Vec<Complex<f32>> {
    magnitude
        .iter()
        .enumerate()
        .map(|(bin, &m)| {
            let omega = 2.0 * PI * bin as f32 * sampling_rate as f32 / analysis_size as f32;
            Complex::from_polar(m, -omega * tau)
        })
        .collect()
}

/// Woodworth spherical-head ear delay, seconds. Ear 0 is left.
pub fn sphere_itd(direction: Vector3, ear: usize) -> f32 {
    let ear_axis = if ear == 0 {
        -Vector3::UNIT_X
    } else {
        Vector3::UNIT_X
    };
    let cos_inc = direction.normalized().dot(&ear_axis).clamp(-1.0, 1.0);
    let incidence = cos_inc.acos();
    if incidence <= PI / 2.0 {
        (HEAD_RADIUS / SPEED_OF_SOUND) * (1.0 - cos_inc)
    } else {
        (HEAD_RADIUS / SPEED_OF_SOUND) * (1.0 + incidence - PI / 2.0)
    }
}

fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-12).log10()
}

/// Equalize per-direction RMS loudness of the magnitude spectra; applied
/// gain is capped by the process-wide limit.
fn normalize_loudness(records: &mut [DirectionRecord]) {
    let loudness: Vec<f32> = records
        .iter()
        .map(|r| {
            let energy: f32 = r.magnitude[0]
                .iter()
                .chain(&r.magnitude[1])
                .map(|m| m * m)
                .sum();
            linear_to_db((energy / (2 * r.magnitude[0].len()) as f32).sqrt())
        })
        .collect();
    let reference = loudness.iter().sum::<f32>() / loudness.len() as f32;
    let max_gain_db = EngineSettings::max_hrtf_normalization_volume_gain_db();

    for (record, &measured) in records.iter_mut().zip(&loudness) {
        let gain = db_to_linear((reference - measured).min(max_gain_db));
        for ear in 0..2 {
            for s in record.hrir[ear].iter_mut() {
                *s *= gain;
            }
            for m in record.magnitude[ear].iter_mut() {
                *m *= gain;
            }
        }
    }
}

fn mean_magnitude(records: &[DirectionRecord]) -> [Vec<f32>; 2] {
    let bins = records[0].magnitude[0].len();
    let mut mean = [vec![0.0f32; bins], vec![0.0f32; bins]];
    for record in records {
        for ear in 0..2 {
            for (m, &v) in mean[ear].iter_mut().zip(&record.magnitude[ear]) {
                *m += v;
            }
        }
    }
    let norm = 1.0 / records.len() as f32;
    for ear_mean in &mut mean {
        for m in ear_mean.iter_mut() {
            *m *= norm;
        }
    }
    mean
}

/// Quadrature projection of the measurement grid onto SH channels:
/// `h_ch = (4 pi / M) * sum_d Y_ch(d) * hrir_d`.
fn project_ambisonics(
    directions: &[Vector3],
    records: &[DirectionRecord],
    hrir_length: usize,
) -> Vec<[Vec<f32>; 2]> {
    let num_channels = sh::num_coeffs(HRTF_MAX_AMBISONICS_ORDER);
    let weight = 4.0 * PI / directions.len() as f32;
    let mut out = Vec::with_capacity(num_channels);
    for acn in 0..num_channels {
        let l = (acn as f32).sqrt().floor() as i32;
        let m = acn as i32 - l * l - l;
        let mut pair = [vec![0.0f32; hrir_length], vec![0.0f32; hrir_length]];
        for (direction, record) in directions.iter().zip(records) {
            let y = sh::evaluate(l, m, *direction) * weight;
            for ear in 0..2 {
                for (o, &s) in pair[ear].iter_mut().zip(&record.hrir[ear]) {
                    *o += y * s;
                }
            }
        }
        out.push(pair);
    }
    out
}

/// The built-in measurement grid: a spherical-head model sampled on
/// azimuth/elevation rings.
fn synthesize_sphere_grid(sampling_rate: u32) -> HrtfData {
    let mut directions = Vec::new();
    for elevation_deg in (-60..=60).step_by(30) {
        for azimuth_deg in (0..360).step_by(30) {
            let el = (elevation_deg as f32).to_radians();
            let az = (azimuth_deg as f32).to_radians();
            // Azimuth 0 ahead (-Z), positive toward +X (right).
            directions.push(Vector3::new(
                el.cos() * az.sin(),
                el.sin(),
                -el.cos() * az.cos(),
            ));
        }
    }
    directions.push(Vector3::UNIT_Y);
    directions.push(-Vector3::UNIT_Y);

    let hrirs = directions
        .iter()
        .map(|&d| synthesize_sphere_hrir(d, sampling_rate))
        .collect();

    HrtfData {
        sampling_rate,
        directions,
        hrirs,
    }
}

/// Delay-and-shadow spherical-head HRIR pair.
fn synthesize_sphere_hrir(direction: Vector3, sampling_rate: u32) -> [Vec<f32>; 2] {
    let mut pair = [
        vec![0.0f32; DEFAULT_HRIR_LENGTH],
        vec![0.0f32; DEFAULT_HRIR_LENGTH],
    ];
    for (ear, hrir) in pair.iter_mut().enumerate() {
        let ear_axis = if ear == 0 {
            -Vector3::UNIT_X
        } else {
            Vector3::UNIT_X
        };
        let cos_inc = direction.dot(&ear_axis).clamp(-1.0, 1.0);

        let delay = sphere_itd(direction, ear) * sampling_rate as f32;
        let index = delay as usize;
        let frac = delay - index as f32;
        // Head shadow: the far ear is quieter and duller.
        let gain = 0.35 + 0.65 * (0.5 * (1.0 + cos_inc));
        if index + 1 < hrir.len() {
            hrir[index] = gain * (1.0 - frac);
            hrir[index + 1] = gain * frac;
        }

        // One-pole low-pass, heavier on the shadowed side.
        let shadow = (0.5 * (1.0 - cos_inc)).clamp(0.0, 1.0);
        let coeff = 0.05 + 0.6 * shadow;
        let mut state = 0.0f32;
        for sample in hrir.iter_mut() {
            state += coeff * (*sample - state);
            *sample = state;
        }
    }
    pair
}

#[cfg(test)]
mod tests {
    use super::*;

    fn database() -> HrtfDatabase {
        let audio = AudioSettings::new(48000, 256).unwrap();
        HrtfDatabase::default_database(audio, &HrtfSettings::default())
    }

    #[test]
    fn test_nearest_at_measurement_is_identity() {
        let db = database();
        let index = 7;
        let direction = db.direction(index);
        assert_eq!(db.nearest_index(direction), index);

        // Nearest + full phase at a grid direction returns the measured
        // HRIR verbatim.
        let mut out = [Vec::new(), Vec::new()];
        db.interpolated(
            direction,
            HrtfInterpolation::Nearest,
            PhaseInterpolation::Full,
            1.0,
            &mut out,
        );
        let reference = db.hrir(index);
        for ear in 0..2 {
            for (a, b) in out[ear].iter().zip(reference[ear]) {
                assert!((a - b).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_bilinear_at_vertex_matches_nearest() {
        let db = database();
        let direction = db.direction(3);
        let mut bilinear = [Vec::new(), Vec::new()];
        db.interpolated(
            direction,
            HrtfInterpolation::Bilinear,
            PhaseInterpolation::Full,
            1.0,
            &mut bilinear,
        );
        let mut nearest = [Vec::new(), Vec::new()];
        db.interpolated(
            direction,
            HrtfInterpolation::Nearest,
            PhaseInterpolation::Full,
            1.0,
            &mut nearest,
        );
        for ear in 0..2 {
            for (a, b) in bilinear[ear].iter().zip(&nearest[ear]) {
                assert!((a - b).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_ahead_is_symmetric() {
        let db = database();
        let mut out = [Vec::new(), Vec::new()];
        db.interpolated(
            -Vector3::UNIT_Z,
            HrtfInterpolation::Nearest,
            PhaseInterpolation::Full,
            1.0,
            &mut out,
        );
        let energy_l: f32 = out[0].iter().map(|x| x * x).sum();
        let energy_r: f32 = out[1].iter().map(|x| x * x).sum();
        let ratio_db = 10.0 * (energy_l / energy_r).log10();
        assert!(ratio_db.abs() < 0.3, "L/R asymmetry {ratio_db} dB");
    }

    #[test]
    fn test_lateral_source_itd_and_ild() {
        let db = database();
        let mut out = [Vec::new(), Vec::new()];
        // Source hard right: right ear louder and earlier.
        let delays = db.interpolated(
            Vector3::UNIT_X,
            HrtfInterpolation::Nearest,
            PhaseInterpolation::Full,
            1.0,
            &mut out,
        );
        let energy_l: f32 = out[0].iter().map(|x| x * x).sum();
        let energy_r: f32 = out[1].iter().map(|x| x * x).sum();
        assert!(energy_r > energy_l, "ILD missing");
        assert!(delays[0] > delays[1], "ITD missing: {delays:?}");
    }

    #[test]
    fn test_no_nan_near_grid_edges() {
        let db = database();
        let mut out = [Vec::new(), Vec::new()];
        // Sweep a 1-degree arc near an elevation ring boundary.
        for i in 0..10 {
            let az = (29.5 + 0.1 * i as f32).to_radians();
            let el = (59.9f32).to_radians();
            let d = Vector3::new(el.cos() * az.sin(), el.sin(), -el.cos() * az.cos());
            db.interpolated(
                d,
                HrtfInterpolation::Bilinear,
                PhaseInterpolation::Full,
                1.0,
                &mut out,
            );
            for ear in 0..2 {
                assert!(out[ear].iter().all(|x| x.is_finite()));
            }
        }
    }

    #[test]
    fn test_min_phase_preserves_magnitude() {
        let db = database();
        let mut full = [Vec::new(), Vec::new()];
        let mut minp = [Vec::new(), Vec::new()];
        let d = Vector3::new(0.4, 0.2, -0.89).normalized();
        db.interpolated(
            d,
            HrtfInterpolation::Bilinear,
            PhaseInterpolation::Full,
            1.0,
            &mut full,
        );
        db.interpolated(
            d,
            HrtfInterpolation::Bilinear,
            PhaseInterpolation::None,
            1.0,
            &mut minp,
        );
        let energy = |h: &[f32]| h.iter().map(|x| x * x).sum::<f32>();
        for ear in 0..2 {
            let ratio = energy(&minp[ear]) / energy(&full[ear]).max(1e-12);
            assert!((0.5..2.0).contains(&ratio), "energy ratio {ratio}");
        }
    }

    #[test]
    fn test_spatial_blend_zero_is_direction_independent() {
        let db = database();
        let mut a = [Vec::new(), Vec::new()];
        let mut b = [Vec::new(), Vec::new()];
        db.interpolated(
            Vector3::UNIT_X,
            HrtfInterpolation::Bilinear,
            PhaseInterpolation::None,
            0.0,
            &mut a,
        );
        db.interpolated(
            -Vector3::UNIT_X,
            HrtfInterpolation::Bilinear,
            PhaseInterpolation::None,
            0.0,
            &mut b,
        );
        for ear in 0..2 {
            for (x, y) in a[ear].iter().zip(&b[ear]) {
                assert!((x - y).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_normalization_gain_capped() {
        EngineSettings::set_max_hrtf_normalization_volume_gain_db(12.0);
        let audio = AudioSettings::new(48000, 256).unwrap();
        let db = HrtfDatabase::new(
            synthesize_sphere_grid(48000),
            audio,
            &HrtfSettings {
                normalization: HrtfNormalization::Rms,
                ..Default::default()
            },
        )
        .unwrap();
        // All HRIRs stay finite and bounded after normalization.
        for i in 0..db.num_directions() {
            for ear_hrir in db.hrir(i) {
                assert!(ear_hrir.iter().all(|x| x.is_finite() && x.abs() < 100.0));
            }
        }
    }
}
