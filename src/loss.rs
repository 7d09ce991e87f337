//! Error functions and error accumulation.
//!
//! This module provides:
//!
//! - [`ErrorFunction`] - pluggable per-output delta used by backpropagation
//! - [`ErrorCalculation`] - running accumulator reporting SSE, MSE and RMS
//!
//! # Sign Convention
//!
//! [`ErrorFunction::output_delta`] points from the actual output towards the
//! ideal (`ideal - actual` for the linear function). Workers negate it when
//! they accumulate `∂E/∂w`.
//!
//! # Example
//!
//! ```rust
//! use flatlm::loss::{ErrorCalculation, ErrorFunction};
//!
//! let ideal = [1.0, 0.0];
//! let actual = [0.5, 0.5];
//!
//! let mut delta = [0.0; 2];
//! ErrorFunction::Linear.output_delta(&ideal, &actual, &mut delta);
//! assert_eq!(delta, [0.5, -0.5]);
//!
//! let mut error = ErrorCalculation::new();
//! error.update(&actual, &ideal, 1.0);
//! assert_eq!(error.sse(), 0.25);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Clamp applied to probabilities before dividing by `p * (1 - p)`.
pub const EPSILON: f64 = 1e-7;

/// Per-output delta function.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorFunction {
    /// `ideal - actual`, the derivative of half the squared error.
    #[default]
    Linear,
    /// Binary cross-entropy for outputs in (0, 1).
    ///
    /// Combined with a sigmoid output layer the activation derivative cancels
    /// the denominator and the delta becomes `ideal - actual`.
    CrossEntropy,
    /// `atan(ideal - actual)`, which emphasises small errors less sharply.
    Arctan,
    /// Huber (smooth L1): linear inside `±delta`, clipped outside.
    Huber {
        /// Threshold between the quadratic and linear regions.
        delta: f64,
    },
}

impl ErrorFunction {
    /// Writes the delta for each output into `out`.
    pub fn output_delta(&self, ideal: &[f64], actual: &[f64], out: &mut [f64]) {
        debug_assert_eq!(ideal.len(), actual.len());
        debug_assert_eq!(ideal.len(), out.len());

        match *self {
            ErrorFunction::Linear => {
                for ((o, t), y) in out.iter_mut().zip(ideal).zip(actual) {
                    *o = t - y;
                }
            }
            ErrorFunction::CrossEntropy => {
                for ((o, t), y) in out.iter_mut().zip(ideal).zip(actual) {
                    let p = y.clamp(EPSILON, 1.0 - EPSILON);
                    *o = (t - p) / (p * (1.0 - p));
                }
            }
            ErrorFunction::Arctan => {
                for ((o, t), y) in out.iter_mut().zip(ideal).zip(actual) {
                    *o = (t - y).atan();
                }
            }
            ErrorFunction::Huber { delta } => {
                for ((o, t), y) in out.iter_mut().zip(ideal).zip(actual) {
                    *o = (t - y).clamp(-delta, delta);
                }
            }
        }
    }
}

/// Running squared-error accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorCalculation {
    global_error: f64,
    set_size: usize,
}

impl ErrorCalculation {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one record's squared errors, scaled by `significance`.
    pub fn update(&mut self, actual: &[f64], ideal: &[f64], significance: f64) {
        debug_assert_eq!(actual.len(), ideal.len());
        for (y, t) in actual.iter().zip(ideal) {
            let e = t - y;
            self.global_error += e * e * significance;
        }
        self.set_size += ideal.len();
    }

    /// Adds a single squared-error term.
    #[inline]
    pub fn update_single(&mut self, error: f64, significance: f64) {
        self.global_error += error * error * significance;
        self.set_size += 1;
    }

    /// Merges another accumulator into this one.
    pub fn merge(&mut self, other: &ErrorCalculation) {
        self.global_error += other.global_error;
        self.set_size += other.set_size;
    }

    /// Half the weighted sum of squared errors.
    pub fn sse(&self) -> f64 {
        self.global_error / 2.0
    }

    /// Mean squared error per output value.
    pub fn mse(&self) -> f64 {
        if self.set_size == 0 {
            0.0
        } else {
            self.global_error / self.set_size as f64
        }
    }

    /// Root mean squared error.
    pub fn rms(&self) -> f64 {
        self.mse().sqrt()
    }

    /// Resets to empty.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delta() {
        let mut out = [0.0; 3];
        ErrorFunction::Linear.output_delta(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], &mut out);
        assert_eq!(out, [0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_huber_clips() {
        let mut out = [0.0; 3];
        ErrorFunction::Huber { delta: 1.0 }.output_delta(&[5.0, 0.5, -5.0], &[0.0; 3], &mut out);
        assert_eq!(out, [1.0, 0.5, -1.0]);
    }

    #[test]
    fn test_cross_entropy_cancels_sigmoid_derivative() {
        let (t, y) = (1.0, 0.3);
        let mut out = [0.0];
        ErrorFunction::CrossEntropy.output_delta(&[t], &[y], &mut out);
        let sigmoid_derivative = y * (1.0 - y);
        assert!((out[0] * sigmoid_derivative - (t - y)).abs() < 1e-12);
    }

    #[test]
    fn test_arctan_sign() {
        let mut out = [0.0; 2];
        ErrorFunction::Arctan.output_delta(&[1.0, 0.0], &[0.0, 1.0], &mut out);
        assert!(out[0] > 0.0 && out[1] < 0.0);
    }

    #[test]
    fn test_error_calculation() {
        let mut error = ErrorCalculation::new();
        error.update(&[0.0, 1.0], &[1.0, 1.0], 1.0);
        error.update(&[0.0, 0.0], &[0.0, 2.0], 0.5);

        // squared: 1 + 0 + 0 + 4 * 0.5 = 3
        assert_eq!(error.sse(), 1.5);
        assert_eq!(error.mse(), 0.75);
        assert!((error.rms() - 0.75f64.sqrt()).abs() < 1e-15);

        let mut other = ErrorCalculation::new();
        other.update_single(1.0, 1.0);
        error.merge(&other);
        assert_eq!(error.sse(), 2.0);

        error.reset();
        assert_eq!(error.mse(), 0.0);
    }
}
