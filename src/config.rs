//! Trainer configuration and hyperparameters.
//!
//! This module provides [`LmConfig`] for the Levenberg-Marquardt trainer and
//! [`PropagationConfig`] for the first-order trainers.
//!
//! # Example
//!
//! ```rust
//! use flatlm::config::{HessianStrategy, LmConfig};
//!
//! // Defaults: chain-rule Hessian, lambda starting at 0.1
//! let config = LmConfig::default();
//! assert!(config.validate().is_ok());
//!
//! // Or customize through the builder
//! let config = LmConfig::builder()
//!     .threads(4)
//!     .hessian(HessianStrategy::FiniteDifference { points_per_side: 2 })
//!     .build()
//!     .unwrap();
//! assert_eq!(config.threads, 4);
//! ```
//!
//! # Damping Parameters
//!
//! | Parameter | Default | Effect |
//! |-----------|---------|--------|
//! | `initial_lambda` | 0.1 | Starting blend between Gauss-Newton and gradient descent |
//! | `lambda_scale` | 10 | Factor applied on every accept/reject |
//! | `lambda_min` | 1e-25 | Floor lambda never shrinks below |
//! | `lambda_max` | 1e25 | Cap that ends the damping loop |

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::loss::ErrorFunction;

/// Initial damping factor.
pub const DEFAULT_INITIAL_LAMBDA: f64 = 0.1;

/// Factor by which lambda grows on rejection and shrinks on acceptance.
pub const DEFAULT_LAMBDA_SCALE: f64 = 10.0;

/// Lower bound for lambda. Accepted steps never shrink it further.
pub const DEFAULT_LAMBDA_MIN: f64 = 1e-25;

/// Upper bound for lambda. Reaching it ends the damping loop.
pub const DEFAULT_LAMBDA_MAX: f64 = 1e25;

/// Finite-difference stencil points on each side of the center.
pub const DEFAULT_POINTS_PER_SIDE: usize = 3;

/// Relative (and minimum absolute) finite-difference step.
pub const FD_INITIAL_STEP: f64 = 0.001;

/// Flat-spot constant added to sigmoid derivatives.
pub const FLAT_SPOT: f64 = 0.1;

/// Strategy used to build the approximate Hessian.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HessianStrategy {
    /// Analytic Jacobian rows via the chain rule.
    #[default]
    ChainRule,
    /// Symmetric finite differences with `2 * points_per_side + 1` points.
    FiniteDifference {
        /// Stencil points on each side of the center.
        points_per_side: usize,
    },
}

/// Levenberg-Marquardt configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LmConfig {
    /// Worker threads. 0 uses the detected core count.
    pub threads: usize,

    /// Starting damping factor.
    pub initial_lambda: f64,

    /// Growth/shrink factor for lambda.
    pub lambda_scale: f64,

    /// Lambda floor.
    pub lambda_min: f64,

    /// Lambda cap.
    pub lambda_max: f64,

    /// Hessian strategy.
    pub hessian: HessianStrategy,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            initial_lambda: DEFAULT_INITIAL_LAMBDA,
            lambda_scale: DEFAULT_LAMBDA_SCALE,
            lambda_min: DEFAULT_LAMBDA_MIN,
            lambda_max: DEFAULT_LAMBDA_MAX,
            hessian: HessianStrategy::ChainRule,
        }
    }
}

impl LmConfig {
    /// Starts a builder from the defaults.
    pub fn builder() -> LmConfigBuilder {
        LmConfigBuilder {
            config: Self::default(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `lambda_min` is not finite and positive
    /// - `initial_lambda` is not finite or lies below `lambda_min`
    /// - `lambda_scale` is not greater than 1
    /// - `lambda_max` is smaller than `initial_lambda`
    /// - the finite-difference stencil has zero points per side
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lambda_min.is_finite() && self.lambda_min > 0.0) {
            return Err(ConfigError::InvalidLambda(self.lambda_min));
        }
        if !(self.initial_lambda.is_finite() && self.initial_lambda >= self.lambda_min) {
            return Err(ConfigError::InvalidLambda(self.initial_lambda));
        }
        if !(self.lambda_scale.is_finite() && self.lambda_scale > 1.0) {
            return Err(ConfigError::InvalidLambdaScale(self.lambda_scale));
        }
        if !(self.lambda_max >= self.initial_lambda) {
            return Err(ConfigError::InvalidLambda(self.lambda_max));
        }
        if let HessianStrategy::FiniteDifference { points_per_side } = self.hessian {
            if points_per_side == 0 || points_per_side > 8 {
                return Err(ConfigError::InvalidStencil(points_per_side));
            }
        }
        Ok(())
    }
}

/// Builder for [`LmConfig`].
#[derive(Debug, Clone)]
pub struct LmConfigBuilder {
    config: LmConfig,
}

impl LmConfigBuilder {
    /// Worker threads (0 = detected core count).
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Starting damping factor.
    pub fn initial_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Growth/shrink factor for lambda.
    pub fn lambda_scale(mut self, scale: f64) -> Self {
        self.config.lambda_scale = scale;
        self
    }

    /// Lambda floor.
    pub fn lambda_min(mut self, min: f64) -> Self {
        self.config.lambda_min = min;
        self
    }

    /// Lambda cap.
    pub fn lambda_max(mut self, max: f64) -> Self {
        self.config.lambda_max = max;
        self
    }

    /// Hessian strategy.
    pub fn hessian(mut self, strategy: HessianStrategy) -> Self {
        self.config.hessian = strategy;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<LmConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// RPROP flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RpropVariant {
    /// Classic RPROP with weight backtracking.
    RpropPlus,
    /// RPROP without backtracking.
    RpropMinus,
    /// Improved RPROP, backtracks only when the error grew.
    IRpropPlus,
    /// Improved RPROP without backtracking.
    IRpropMinus,
}

/// Weight update rule for [`Propagation`](crate::train::Propagation).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UpdateRule {
    /// Gradient descent with momentum.
    Backprop {
        /// Step size.
        learning_rate: f64,
        /// Fraction of the previous update carried into the next.
        momentum: f64,
    },
    /// Resilient propagation: per-weight step sizes driven by gradient sign.
    Resilient {
        /// Which RPROP flavour to run.
        variant: RpropVariant,
    },
}

impl Default for UpdateRule {
    fn default() -> Self {
        UpdateRule::Resilient {
            variant: RpropVariant::IRpropPlus,
        }
    }
}

/// First-order (propagation) trainer configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PropagationConfig {
    /// Worker threads. 0 uses the detected core count.
    pub threads: usize,

    /// Update rule.
    pub rule: UpdateRule,

    /// Output delta function.
    pub error_function: ErrorFunction,

    /// Add [`FLAT_SPOT`] to sigmoid derivatives.
    pub flat_spot: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            rule: UpdateRule::default(),
            error_function: ErrorFunction::Linear,
            flat_spot: true,
        }
    }
}

impl PropagationConfig {
    /// Starts a builder from the defaults.
    pub fn builder() -> PropagationConfigBuilder {
        PropagationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let UpdateRule::Backprop {
            learning_rate,
            momentum,
        } = self.rule
        {
            if !(learning_rate.is_finite() && learning_rate > 0.0) {
                return Err(ConfigError::InvalidLearningRate(learning_rate));
            }
            if !(0.0..1.0).contains(&momentum) {
                return Err(ConfigError::InvalidMomentum(momentum));
            }
        }
        if let ErrorFunction::Huber { delta } = self.error_function {
            if !(delta.is_finite() && delta > 0.0) {
                return Err(ConfigError::InvalidHuberDelta(delta));
            }
        }
        Ok(())
    }
}

/// Builder for [`PropagationConfig`].
#[derive(Debug, Clone)]
pub struct PropagationConfigBuilder {
    config: PropagationConfig,
}

impl PropagationConfigBuilder {
    /// Worker threads (0 = detected core count).
    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = threads;
        self
    }

    /// Update rule.
    pub fn rule(mut self, rule: UpdateRule) -> Self {
        self.config.rule = rule;
        self
    }

    /// Output delta function.
    pub fn error_function(mut self, error_function: ErrorFunction) -> Self {
        self.config.error_function = error_function;
        self
    }

    /// Enable or disable the flat-spot constant.
    pub fn flat_spot(mut self, enabled: bool) -> Self {
        self.config.flat_spot = enabled;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<PropagationConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Errors returned by configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Lambda (initial or cap) is not usable.
    #[error("Lambda must be finite, positive and between floor and cap, got {0}")]
    InvalidLambda(f64),

    /// Lambda scale must exceed 1.
    #[error("Lambda scale must be > 1, got {0}")]
    InvalidLambdaScale(f64),

    /// Finite-difference stencil size out of range (1-8 per side).
    #[error("Points per side must be 1-8, got {0}")]
    InvalidStencil(usize),

    /// Learning rate is not usable.
    #[error("Learning rate must be finite and positive, got {0}")]
    InvalidLearningRate(f64),

    /// Momentum outside `[0, 1)`.
    #[error("Momentum must be in [0, 1), got {0}")]
    InvalidMomentum(f64),

    /// Huber threshold is not usable.
    #[error("Huber delta must be finite and positive, got {0}")]
    InvalidHuberDelta(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert!(LmConfig::default().validate().is_ok());
        assert!(PropagationConfig::default().validate().is_ok());
        assert_eq!(HessianStrategy::default(), HessianStrategy::ChainRule);
        assert_eq!(LmConfig::default().lambda_min, DEFAULT_LAMBDA_MIN);
    }

    #[test]
    fn test_builder() {
        let config = LmConfig::builder()
            .threads(2)
            .initial_lambda(0.01)
            .build()
            .unwrap();
        assert_eq!(config.threads, 2);
        assert_eq!(config.initial_lambda, 0.01);
        assert_eq!(config.hessian, HessianStrategy::ChainRule);
    }

    #[test]
    fn test_invalid_lambda() {
        let result = LmConfig::builder().initial_lambda(0.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLambda(_))));

        let result = LmConfig::builder().initial_lambda(1e-323).build();
        assert!(matches!(result, Err(ConfigError::InvalidLambda(_))));

        let result = LmConfig::builder().lambda_min(0.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLambda(_))));

        let result = LmConfig::builder().lambda_scale(1.0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLambdaScale(_))));
    }

    #[test]
    fn test_invalid_stencil() {
        let result = LmConfig::builder()
            .hessian(HessianStrategy::FiniteDifference { points_per_side: 0 })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidStencil(0))));
    }

    #[test]
    fn test_invalid_momentum() {
        let result = PropagationConfig::builder()
            .rule(UpdateRule::Backprop {
                learning_rate: 0.7,
                momentum: 1.5,
            })
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidMomentum(_))));
    }
}
