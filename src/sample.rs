// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Complex baseband sample type shared by the RX and TX paths.

use num_complex::Complex;

/// A complex I/Q baseband sample. Only its magnitude participates in
/// demodulation; the TX path writes both components.
pub type Sample = Complex<f32>;

/// Magnitude of a sample as `f64`, the precision the RX averaging
/// pipeline accumulates in.
#[must_use]
pub fn magnitude(sample: Sample) -> f64 {
    f64::from(sample.norm())
}
