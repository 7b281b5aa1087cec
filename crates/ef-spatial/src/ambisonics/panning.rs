//! Ambisonics-to-speaker decoding
//!
//! The decode matrix is the pseudo-inverse of the layout's SH-sampled
//! basis, computed once at construction. Falls back to a plain sampling
//! (transpose) decode when the basis Gram matrix is singular.

use crate::sh;
use crate::{AudioEffect, AudioEffectState};
use ef_core::{AudioBuffer, SpeakerLayout};

/// Settings for `AmbisonicsPanningEffect`
#[derive(Debug, Clone)]
pub struct AmbisonicsPanningEffectSettings {
    pub layout: SpeakerLayout,
    pub max_order: usize,
}

/// Parameters for `AmbisonicsPanningEffect`
#[derive(Debug, Clone, Copy)]
pub struct AmbisonicsPanningEffectParams {
    pub order: usize,
}

/// SH soundfield to speaker feeds through a precomputed decode matrix
#[derive(Debug, Clone)]
pub struct AmbisonicsPanningEffect {
    max_order: usize,
    num_speakers: usize,
    /// `decode[speaker][acn]`
    decode: Vec<Vec<f32>>,
}

impl AmbisonicsPanningEffect {
    pub fn new(settings: AmbisonicsPanningEffectSettings) -> Self {
        let num_coeffs = sh::num_coeffs(settings.max_order);
        let decode = decode_matrix(&settings.layout, num_coeffs);
        Self {
            max_order: settings.max_order,
            num_speakers: settings.layout.num_speakers(),
            decode,
        }
    }

    pub fn apply(
        &mut self,
        params: &AmbisonicsPanningEffectParams,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
    ) -> AudioEffectState {
        let order = params.order.min(self.max_order);
        let num_coeffs = sh::num_coeffs(order);
        debug_assert!(input.num_channels() >= num_coeffs);
        debug_assert_eq!(output.num_channels(), self.num_speakers);
        debug_assert_eq!(input.num_samples(), output.num_samples());

        for (speaker, row) in self.decode.iter().enumerate() {
            let dst = output.channel_mut(speaker);
            dst.fill(0.0);
            for (acn, &weight) in row.iter().take(num_coeffs).enumerate() {
                if weight == 0.0 {
                    continue;
                }
                let src = input.channel(acn);
                for (y, &x) in dst.iter_mut().zip(src) {
                    *y += weight * x;
                }
            }
        }
        AudioEffectState::TailComplete
    }
}

impl AudioEffect for AmbisonicsPanningEffect {
    fn reset(&mut self) {}

    fn tail(&mut self, out: &mut AudioBuffer) -> AudioEffectState {
        out.make_silent();
        AudioEffectState::TailComplete
    }

    fn num_tail_samples_remaining(&self) -> usize {
        0
    }
}

/// Decode matrix for a layout.
///
/// Dense layouts (at least as many ring speakers as SH channels) get the
/// pseudo-inverse of the SH-sampled basis, `D = Y^T (Y Y^T)^-1`. Sparse
/// layouts make that system underdetermined and the least-squares
/// solution leaks out-of-phase energy, so they fall back to a sampling
/// (transpose) decode at a reduced order matched to the speaker count.
fn decode_matrix(layout: &SpeakerLayout, num_coeffs: usize) -> Vec<Vec<f32>> {
    let num_speakers = layout.num_speakers();
    let num_ring = layout
        .speakers()
        .iter()
        .filter(|s| !s.is_nearly_zero())
        .count();
    let order = (num_coeffs as f32).sqrt() as usize - 1;

    // Basis sampled at the speaker directions; LFE rows stay zero.
    let mut basis = vec![vec![0.0f32; num_speakers]; num_coeffs];
    for (s, &speaker) in layout.speakers().iter().enumerate() {
        if speaker.is_nearly_zero() {
            continue;
        }
        let mut coeffs = vec![0.0f32; num_coeffs];
        sh::project(speaker, order, &mut coeffs);
        for (k, &c) in coeffs.iter().enumerate() {
            basis[k][s] = c;
        }
    }

    if num_ring >= num_coeffs {
        // Gram matrix Y Y^T with a small Tikhonov term.
        let mut gram = vec![vec![0.0f32; num_coeffs]; num_coeffs];
        for i in 0..num_coeffs {
            for j in 0..num_coeffs {
                let mut sum = 0.0;
                for s in 0..num_speakers {
                    sum += basis[i][s] * basis[j][s];
                }
                gram[i][j] = sum;
            }
            gram[i][i] += 1e-4;
        }
        if let Some(inverse) = invert(&gram) {
            // D[s][k] = sum_i basis[i][s] * inverse[i][k]
            let mut decode = vec![vec![0.0f32; num_coeffs]; num_speakers];
            for (s, row) in decode.iter_mut().enumerate() {
                for (k, value) in row.iter_mut().enumerate() {
                    let mut sum = 0.0;
                    for i in 0..num_coeffs {
                        sum += basis[i][s] * inverse[i][k];
                    }
                    *value = sum;
                }
            }
            return decode;
        }
    }

    // Sampling decode at the order the ring can support.
    let effective_order = ((num_ring as f32).sqrt() as usize).saturating_sub(1).max(1);
    let effective_coeffs = sh::num_coeffs(effective_order.min(order));
    let scale = 4.0 * std::f32::consts::PI / num_ring.max(1) as f32;
    let mut decode = vec![vec![0.0f32; num_coeffs]; num_speakers];
    for (s, row) in decode.iter_mut().enumerate() {
        for (k, value) in row.iter_mut().enumerate().take(effective_coeffs) {
            *value = basis[k][s] * scale;
        }
    }
    decode
}

/// Gauss-Jordan inverse with partial pivoting.
fn invert(matrix: &[Vec<f32>]) -> Option<Vec<Vec<f32>>> {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix
        .iter()
        .map(|row| row.iter().map(|&x| x as f64).collect())
        .collect();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[i][col]
                    .abs()
                    .partial_cmp(&a[j][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..n {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    Some(
        inv.iter()
            .map(|row| row.iter().map(|&x| x as f32).collect())
            .collect(),
    )
}
