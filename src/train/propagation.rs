//! First-order training: backpropagation with momentum and resilient
//! propagation.
//!
//! Every iteration runs the [`GradientCalculator`] over the whole training
//! set (batch training) and then applies the configured [`UpdateRule`].
//!
//! # RPROP
//!
//! Each weight keeps its own step size. While the gradient keeps its sign
//! the step grows by [`POSITIVE_ETA`] (up to [`DELTA_MAX`]); when the sign
//! flips it shrinks by [`NEGATIVE_ETA`] (down to [`DELTA_MIN`]). Only the
//! sign of the gradient is used.
//!
//! | Variant | On sign flip |
//! |---------|--------------|
//! | RPROP+  | undo the previous step |
//! | RPROP-  | keep going |
//! | iRPROP+ | undo the previous step only if the error grew |
//! | iRPROP- | skip this step |

use crate::config::{PropagationConfig, RpropVariant, UpdateRule};
use crate::data::TrainingSet;
use crate::error::FlatResult;
use crate::network::FlatNetwork;

use super::gradient::GradientCalculator;
use super::pool::WorkerPool;
use super::{check_training, Train};

/// Starting step size for every weight.
pub const DEFAULT_INITIAL_UPDATE: f64 = 0.1;

/// Step growth while the gradient keeps its sign.
pub const POSITIVE_ETA: f64 = 1.2;

/// Step shrink after a sign flip.
pub const NEGATIVE_ETA: f64 = 0.5;

/// Largest step size.
pub const DELTA_MAX: f64 = 50.0;

/// Smallest step size.
pub const DELTA_MIN: f64 = 1e-6;

/// Gradients smaller than this count as zero.
pub const DEFAULT_ZERO_TOLERANCE: f64 = 1e-17;

#[inline]
fn sign(value: f64) -> f64 {
    if value.abs() < DEFAULT_ZERO_TOLERANCE {
        0.0
    } else if value > 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Per-weight optimizer memory.
#[derive(Debug, Clone)]
struct UpdateState {
    last_gradients: Vec<f64>,
    last_change: Vec<f64>,
    update_values: Vec<f64>,
}

impl UpdateState {
    fn new(weight_count: usize) -> Self {
        Self {
            last_gradients: vec![0.0; weight_count],
            last_change: vec![0.0; weight_count],
            update_values: vec![DEFAULT_INITIAL_UPDATE; weight_count],
        }
    }

    /// `weight += -learning_rate * g + momentum * last_change`.
    fn backprop(&mut self, weights: &mut [f64], gradients: &[f64], learning_rate: f64, momentum: f64) {
        for ((w, &g), last) in weights.iter_mut().zip(gradients).zip(&mut self.last_change) {
            let change = -learning_rate * g + momentum * *last;
            *w += change;
            *last = change;
        }
    }

    fn resilient(
        &mut self,
        variant: RpropVariant,
        weights: &mut [f64],
        gradients: &[f64],
        error: f64,
        last_error: f64,
    ) {
        for i in 0..weights.len() {
            let g = gradients[i];
            let change = sign(g * self.last_gradients[i]);

            let weight_change = if change > 0.0 {
                let delta = (self.update_values[i] * POSITIVE_ETA).min(DELTA_MAX);
                self.update_values[i] = delta;
                self.last_gradients[i] = g;
                -sign(g) * delta
            } else if change < 0.0 {
                self.update_values[i] = (self.update_values[i] * NEGATIVE_ETA).max(DELTA_MIN);
                match variant {
                    RpropVariant::RpropPlus => {
                        self.last_gradients[i] = 0.0;
                        -self.last_change[i]
                    }
                    RpropVariant::RpropMinus => {
                        self.last_gradients[i] = g;
                        -sign(g) * self.update_values[i]
                    }
                    RpropVariant::IRpropPlus => {
                        self.last_gradients[i] = 0.0;
                        if error > last_error {
                            -self.last_change[i]
                        } else {
                            0.0
                        }
                    }
                    RpropVariant::IRpropMinus => {
                        self.last_gradients[i] = 0.0;
                        0.0
                    }
                }
            } else {
                self.last_gradients[i] = g;
                -sign(g) * self.update_values[i]
            };

            weights[i] += weight_change;
            self.last_change[i] = weight_change;
        }
    }
}

/// Batch first-order trainer.
pub struct Propagation<'a> {
    network: FlatNetwork,
    training: &'a dyn TrainingSet,
    config: PropagationConfig,
    pool: WorkerPool,
    calculator: GradientCalculator,
    update: UpdateState,
    weights: Vec<f64>,
    error: f64,
    iteration: usize,
}

impl std::fmt::Debug for Propagation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagation")
            .field("config", &self.config)
            .field("threads", &self.pool.threads())
            .field("records", &self.training.count())
            .field("error", &self.error)
            .field("iteration", &self.iteration)
            .finish()
    }
}

impl<'a> Propagation<'a> {
    /// Creates a trainer.
    ///
    /// # Errors
    ///
    /// Same as [`LevenbergMarquardt::new`](super::LevenbergMarquardt::new),
    /// minus the derivative check: activations without a derivative simply
    /// contribute nothing to the gradient.
    pub fn new(
        network: FlatNetwork,
        training: &'a dyn TrainingSet,
        config: PropagationConfig,
    ) -> FlatResult<Self> {
        config.validate()?;
        check_training(&network, training)?;

        let pool = WorkerPool::new(config.threads)?;
        let calculator = GradientCalculator::new(
            &network,
            training,
            &pool,
            config.error_function,
            config.flat_spot,
        );
        let weight_count = network.weight_count();

        Ok(Self {
            update: UpdateState::new(weight_count),
            weights: network.weights().to_vec(),
            error: f64::INFINITY,
            iteration: 0,
            network,
            training,
            config,
            pool,
            calculator,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Gradient from the last iteration.
    pub fn gradients(&self) -> &[f64] {
        self.calculator.gradients()
    }

    /// Current RPROP step sizes.
    pub fn update_values(&self) -> &[f64] {
        &self.update.update_values
    }
}

impl Train for Propagation<'_> {
    fn iteration(&mut self) -> FlatResult<()> {
        self.calculator
            .calculate(&self.pool, &self.network, self.network.weights(), self.training)?;

        let error = self.calculator.error().mse();
        let last_error = self.error;

        self.weights.copy_from_slice(self.network.weights());
        let gradients = self.calculator.gradients();
        match self.config.rule {
            UpdateRule::Backprop {
                learning_rate,
                momentum,
            } => self
                .update
                .backprop(&mut self.weights, gradients, learning_rate, momentum),
            UpdateRule::Resilient { variant } => {
                self.update
                    .resilient(variant, &mut self.weights, gradients, error, last_error)
            }
        }
        self.network.set_weights(&self.weights)?;
        self.error = error;

        self.iteration += 1;
        log::debug!(
            "Propagation iteration {}: mse {}",
            self.iteration,
            self.error
        );
        Ok(())
    }

    /// Mean squared error of the weights the last iteration started from
    /// (infinite before the first iteration).
    fn error(&self) -> f64 {
        self.error
    }

    fn iteration_count(&self) -> usize {
        self.iteration
    }

    fn network(&self) -> &FlatNetwork {
        &self.network
    }

    fn into_network(self) -> FlatNetwork {
        self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_tolerance() {
        assert_eq!(sign(1e-18), 0.0);
        assert_eq!(sign(-3.0), -1.0);
        assert_eq!(sign(0.5), 1.0);
    }

    #[test]
    fn test_backprop_momentum() {
        let mut state = UpdateState::new(1);
        let mut w = [1.0];
        state.backprop(&mut w, &[2.0], 0.1, 0.5);
        assert!((w[0] - 0.8).abs() < 1e-15);
        state.backprop(&mut w, &[2.0], 0.1, 0.5);
        // -0.2 + 0.5 * -0.2
        assert!((w[0] - 0.5).abs() < 1e-15);
    }

    #[test]
    fn test_rprop_step_grows_then_backtracks() {
        let mut state = UpdateState::new(1);
        let mut w = [0.0];

        state.resilient(RpropVariant::RpropPlus, &mut w, &[1.0], 1.0, f64::INFINITY);
        assert!((w[0] + 0.1).abs() < 1e-15);

        state.resilient(RpropVariant::RpropPlus, &mut w, &[1.0], 1.0, 1.0);
        assert!((state.update_values[0] - 0.12).abs() < 1e-15);
        assert!((w[0] + 0.22).abs() < 1e-15);

        // Sign flip: undo the last step and shrink.
        state.resilient(RpropVariant::RpropPlus, &mut w, &[-1.0], 1.0, 1.0);
        assert!((w[0] + 0.1).abs() < 1e-15);
        assert!((state.update_values[0] - 0.06).abs() < 1e-15);
    }

    #[test]
    fn test_irprop_plus_backtracks_only_on_worse_error() {
        let mut better = UpdateState::new(1);
        let mut worse = UpdateState::new(1);
        let mut wb = [0.0];
        let mut ww = [0.0];
        better.resilient(RpropVariant::IRpropPlus, &mut wb, &[1.0], 1.0, f64::INFINITY);
        worse.resilient(RpropVariant::IRpropPlus, &mut ww, &[1.0], 1.0, f64::INFINITY);

        better.resilient(RpropVariant::IRpropPlus, &mut wb, &[-1.0], 0.5, 1.0);
        worse.resilient(RpropVariant::IRpropPlus, &mut ww, &[-1.0], 2.0, 1.0);

        assert!((wb[0] + 0.1).abs() < 1e-15);
        assert!(ww[0].abs() < 1e-15);
    }

    #[test]
    fn test_step_bounds() {
        let mut state = UpdateState::new(1);
        let mut w = [0.0];
        for _ in 0..200 {
            state.resilient(RpropVariant::RpropMinus, &mut w, &[1.0], 1.0, 1.0);
        }
        assert_eq!(state.update_values[0], DELTA_MAX);

        for i in 0..200 {
            let g = if i % 2 == 0 { 1.0 } else { -1.0 };
            state.resilient(RpropVariant::IRpropMinus, &mut w, &[g], 1.0, 1.0);
        }
        assert!(state.update_values[0] >= DELTA_MIN);
    }
}
