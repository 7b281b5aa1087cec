//! Real FFT wrapper
//!
//! Planned forward/inverse transforms over `realfft`, half-spectrum
//! complex output, normalization folded into the inverse.

use rustfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Round up to the next power of two
pub fn next_pow2(n: usize) -> usize {
    n.next_power_of_two()
}

/// Planned real-to-complex FFT of a fixed size
pub struct Fft {
    size: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl Fft {
    /// Plan transforms for `size` real samples.
    pub fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            size,
            forward: planner.plan_fft_forward(size),
            inverse: planner.plan_fft_inverse(size),
        }
    }

    /// Real transform length
    pub fn size(&self) -> usize {
        self.size
    }

    /// Half-spectrum length (`size / 2 + 1`)
    pub fn num_complex(&self) -> usize {
        self.size / 2 + 1
    }

    /// Zeroed spectrum buffer of the right length
    pub fn make_spectrum(&self) -> Vec<Complex<f32>> {
        vec![Complex::new(0.0, 0.0); self.num_complex()]
    }

    /// Forward transform. Scrambles `time` (scratch reuse).
    pub fn forward(&self, time: &mut [f32], spectrum: &mut [Complex<f32>]) {
        debug_assert_eq!(time.len(), self.size);
        debug_assert_eq!(spectrum.len(), self.num_complex());
        self.forward.process(time, spectrum).ok();
    }

    /// Inverse transform, normalized by `1 / size`. Scrambles `spectrum`.
    pub fn inverse(&self, spectrum: &mut [Complex<f32>], time: &mut [f32]) {
        debug_assert_eq!(time.len(), self.size);
        debug_assert_eq!(spectrum.len(), self.num_complex());
        // realfft rejects non-zero imaginary parts in the DC/Nyquist bins.
        spectrum[0].im = 0.0;
        let last = spectrum.len() - 1;
        spectrum[last].im = 0.0;
        self.inverse.process(spectrum, time).ok();
        let norm = 1.0 / self.size as f32;
        for sample in time.iter_mut() {
            *sample *= norm;
        }
    }
}

impl std::fmt::Debug for Fft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft").field("size", &self.size).finish()
    }
}
