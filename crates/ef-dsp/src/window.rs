//! Window functions

use std::f32::consts::PI;

/// Window function family
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowFunction {
    Rectangular,
    Bartlett,
    Hann,
    Hamming,
    Blackman,
    /// Tapered cosine; the parameter is the taper fraction in [0, 1].
    Tukey(f32),
    BlackmanHarris,
}

impl WindowFunction {
    /// Fill `out` with window samples.
    pub fn fill(&self, out: &mut [f32]) {
        let n = out.len();
        if n == 0 {
            return;
        }
        if n == 1 {
            out[0] = 1.0;
            return;
        }
        let denom = (n - 1) as f32;
        match *self {
            WindowFunction::Rectangular => out.fill(1.0),
            WindowFunction::Bartlett => {
                for (i, w) in out.iter_mut().enumerate() {
                    *w = 1.0 - ((i as f32 - denom / 2.0) / (denom / 2.0)).abs();
                }
            }
            WindowFunction::Hann => {
                for (i, w) in out.iter_mut().enumerate() {
                    *w = 0.5 - 0.5 * (2.0 * PI * i as f32 / denom).cos();
                }
            }
            WindowFunction::Hamming => {
                for (i, w) in out.iter_mut().enumerate() {
                    *w = 0.54 - 0.46 * (2.0 * PI * i as f32 / denom).cos();
                }
            }
            WindowFunction::Blackman => {
                for (i, w) in out.iter_mut().enumerate() {
                    let x = 2.0 * PI * i as f32 / denom;
                    *w = 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos();
                }
            }
            WindowFunction::Tukey(alpha) => {
                let alpha = alpha.clamp(0.0, 1.0);
                if alpha <= 0.0 {
                    out.fill(1.0);
                    return;
                }
                let edge = alpha * denom / 2.0;
                for (i, w) in out.iter_mut().enumerate() {
                    let i = i as f32;
                    *w = if i < edge {
                        0.5 * (1.0 + (PI * (i / edge - 1.0)).cos())
                    } else if i > denom - edge {
                        0.5 * (1.0 + (PI * ((i - denom + edge) / edge)).cos())
                    } else {
                        1.0
                    };
                }
            }
            WindowFunction::BlackmanHarris => {
                for (i, w) in out.iter_mut().enumerate() {
                    let x = 2.0 * PI * i as f32 / denom;
                    *w = 0.35875 - 0.48829 * x.cos() + 0.14128 * (2.0 * x).cos()
                        - 0.01168 * (3.0 * x).cos();
                }
            }
        }
    }
}
