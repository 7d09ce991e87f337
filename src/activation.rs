//! Activation functions.
//!
//! Every layer of a [`FlatNetwork`](crate::FlatNetwork) carries one
//! [`Activation`]. The forward pass stores the pre-activation sum of each
//! neuron and its post-activation output; derivatives are expressed in terms
//! of both so that each variant can use whichever is cheaper.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::FLAT_SPOT;

/// Element-wise activation function with its own parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Activation {
    /// Identity.
    #[default]
    Linear,
    /// Logistic sigmoid, range (0, 1).
    Sigmoid,
    /// Hyperbolic tangent, range (-1, 1).
    Tanh,
    /// Rectified linear unit.
    Relu,
    /// Elliott approximation of the sigmoid, range (0, 1).
    Elliott {
        /// Steepness.
        slope: f64,
    },
    /// Elliott approximation of tanh, range (-1, 1).
    ElliottSymmetric {
        /// Steepness.
        slope: f64,
    },
    /// Sine.
    Sin,
    /// Hard threshold. Not differentiable.
    Step {
        /// Output below `center`.
        low: f64,
        /// Threshold.
        center: f64,
        /// Output at or above `center`.
        high: f64,
    },
}

impl Activation {
    /// Applies the activation in place.
    pub fn activate(&self, values: &mut [f64]) {
        match *self {
            Activation::Linear => {}
            Activation::Sigmoid => {
                for v in values.iter_mut() {
                    *v = 1.0 / (1.0 + (-*v).exp());
                }
            }
            Activation::Tanh => {
                for v in values.iter_mut() {
                    *v = v.tanh();
                }
            }
            Activation::Relu => {
                for v in values.iter_mut() {
                    *v = v.max(0.0);
                }
            }
            Activation::Elliott { slope } => {
                for v in values.iter_mut() {
                    let s = *v * slope;
                    *v = (s / 2.0) / (1.0 + s.abs()) + 0.5;
                }
            }
            Activation::ElliottSymmetric { slope } => {
                for v in values.iter_mut() {
                    let s = *v * slope;
                    *v = s / (1.0 + s.abs());
                }
            }
            Activation::Sin => {
                for v in values.iter_mut() {
                    *v = v.sin();
                }
            }
            Activation::Step { low, center, high } => {
                for v in values.iter_mut() {
                    *v = if *v >= center { high } else { low };
                }
            }
        }
    }

    /// Derivative w.r.t. the pre-activation sum, given both the sum and the
    /// cached output.
    #[inline]
    pub fn derivative(&self, sum: f64, output: f64) -> f64 {
        match *self {
            Activation::Linear => 1.0,
            Activation::Sigmoid => output * (1.0 - output),
            Activation::Tanh => 1.0 - output * output,
            Activation::Relu => {
                if sum > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Elliott { slope } => {
                let d = 1.0 + (sum * slope).abs();
                slope / (2.0 * d * d)
            }
            Activation::ElliottSymmetric { slope } => {
                let d = 1.0 + (sum * slope).abs();
                slope / (d * d)
            }
            Activation::Sin => sum.cos(),
            Activation::Step { .. } => 0.0,
        }
    }

    /// Whether [`derivative`](Self::derivative) is meaningful.
    pub fn has_derivative(&self) -> bool {
        !matches!(self, Activation::Step { .. })
    }

    /// Parameter vector of this activation (empty for parameterless ones).
    pub fn params(&self) -> Vec<f64> {
        match *self {
            Activation::Elliott { slope } | Activation::ElliottSymmetric { slope } => vec![slope],
            Activation::Step { low, center, high } => vec![low, center, high],
            _ => Vec::new(),
        }
    }

    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Linear => "linear",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Relu => "relu",
            Activation::Elliott { .. } => "elliott",
            Activation::ElliottSymmetric { .. } => "elliott-symmetric",
            Activation::Sin => "sin",
            Activation::Step { .. } => "step",
        }
    }

    /// Flat-spot constant for this activation.
    ///
    /// Only the sigmoid saturates towards a zero derivative over a range wide
    /// enough to stall training.
    pub fn flat_spot(&self) -> f64 {
        match self {
            Activation::Sigmoid => FLAT_SPOT,
            _ => 0.0,
        }
    }
}
