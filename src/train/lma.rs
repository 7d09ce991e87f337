//! Levenberg-Marquardt training.
//!
//! # Iteration
//!
//! 1. Compute gradient, Hessian and SSE at the current weights
//! 2. Save the undamped Hessian diagonal
//! 3. Damping loop:
//!    - add `λ` to the diagonal and LU-decompose
//!    - singular: grow `λ`
//!    - otherwise solve `(H + λI) δ = g`, evaluate `w - δ` on a snapshot
//!    - lower SSE: shrink `λ` (not below the floor), commit, done
//!    - not lower: restore the diagonal, grow `λ`
//!    - `λ` past the cap: clamp it, commit the last finite trial (if any), done
//!
//! Rejected trials never reach the network.

use std::fmt;

use crate::config::LmConfig;
use crate::data::TrainingSet;
use crate::error::{FlatError, FlatResult};
use crate::matrix::LuDecomposition;
use crate::network::FlatNetwork;

use super::evaluate::{evaluate_sse, evaluation_workers, EvaluationWorker};
use super::hessian::{create_hessian, ComputeHessian, HessianState};
use super::pool::WorkerPool;
use super::{check_training, Train};

/// How an iteration's damping loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A trial lowered the SSE and was committed.
    Accepted,
    /// `λ` reached the cap; the last trial was committed if it had a finite
    /// error.
    LambdaCapped,
}

/// Multi-threaded Levenberg-Marquardt trainer.
pub struct LevenbergMarquardt<'a> {
    network: FlatNetwork,
    training: &'a dyn TrainingSet,
    config: LmConfig,
    pool: WorkerPool,
    hessian: Box<dyn ComputeHessian>,
    state: HessianState,
    evaluators: Vec<EvaluationWorker>,
    diagonal: Vec<f64>,
    trial: Vec<f64>,
    lambda: f64,
    error: f64,
    last_outcome: Option<Outcome>,
    iteration: usize,
}

impl fmt::Debug for LevenbergMarquardt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevenbergMarquardt")
            .field("config", &self.config)
            .field("threads", &self.pool.threads())
            .field("weights", &self.network.weight_count())
            .field("records", &self.training.count())
            .field("lambda", &self.lambda)
            .field("error", &self.error)
            .field("iteration", &self.iteration)
            .finish()
    }
}

impl<'a> LevenbergMarquardt<'a> {
    /// Creates a trainer.
    ///
    /// # Errors
    ///
    /// - [`FlatError::Config`] for an invalid configuration
    /// - [`FlatError::ShapeMismatch`] if the training set does not fit the
    ///   network
    /// - [`FlatError::EmptyTrainingSet`]
    /// - [`FlatError::NoDerivative`] for the chain-rule Hessian on a network
    ///   with a non-differentiable activation
    pub fn new(
        network: FlatNetwork,
        training: &'a dyn TrainingSet,
        config: LmConfig,
    ) -> FlatResult<Self> {
        config.validate()?;
        check_training(&network, training)?;

        let pool = WorkerPool::new(config.threads)?;
        let hessian = create_hessian(config.hessian, &network, training, &pool)?;
        let evaluators = evaluation_workers(&network, training, &pool);
        let weight_count = network.weight_count();

        Ok(Self {
            state: HessianState::new(weight_count),
            evaluators,
            diagonal: vec![0.0; weight_count],
            trial: vec![0.0; weight_count],
            lambda: config.initial_lambda,
            error: 0.0,
            last_outcome: None,
            iteration: 0,
            network,
            training,
            config,
            pool,
            hessian,
        })
    }

    /// Current damping factor.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Configuration in use.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Gradient, Hessian and SSE from the start of the last iteration.
    pub fn hessian_state(&self) -> &HessianState {
        &self.state
    }

    /// How the last iteration ended.
    pub fn last_outcome(&self) -> Option<Outcome> {
        self.last_outcome
    }

    /// Half the weighted SSE of the network's current weights.
    pub fn sse(&mut self) -> FlatResult<f64> {
        evaluate_sse(
            &self.pool,
            &mut self.evaluators,
            &self.network,
            self.network.weights(),
            self.training,
        )
    }

    fn damp(&mut self) {
        let hessian = self.state.hessian_mut();
        for (i, &d) in self.diagonal.iter().enumerate() {
            hessian[(i, i)] = d + self.lambda;
        }
    }

    fn undamp(&mut self) {
        self.state.hessian_mut().set_diagonal(&self.diagonal);
    }
}

impl Train for LevenbergMarquardt<'_> {
    fn iteration(&mut self) -> FlatResult<()> {
        self.hessian
            .compute(&self.network, self.training, &self.pool, &mut self.state)?;

        let before = self.state.sse();
        if !before.is_finite() {
            return Err(FlatError::non_finite("error"));
        }
        self.diagonal = self.state.hessian().diagonal();

        let mut after = before;
        let mut have_trial = false;
        let outcome = loop {
            self.damp();
            let lu = LuDecomposition::new(self.state.hessian());

            if lu.is_nonsingular() {
                let delta = lu.solve_vec(self.state.gradients())?;
                for ((t, w), d) in self.trial.iter_mut().zip(self.network.weights()).zip(&delta) {
                    *t = w - d;
                }
                after = evaluate_sse(
                    &self.pool,
                    &mut self.evaluators,
                    &self.network,
                    &self.trial,
                    self.training,
                )?;
                have_trial = true;

                if after < before {
                    self.lambda =
                        (self.lambda / self.config.lambda_scale).max(self.config.lambda_min);
                    self.network.set_weights(&self.trial)?;
                    break Outcome::Accepted;
                }
                log::trace!("Rejected step: sse {} -> {} at lambda {}", before, after, self.lambda);
            } else {
                log::trace!("Singular damped Hessian at lambda {}", self.lambda);
            }

            self.undamp();
            self.lambda *= self.config.lambda_scale;
            if self.lambda > self.config.lambda_max {
                self.lambda = self.config.lambda_max;
                log::warn!(
                    "Lambda reached its cap ({}) without lowering sse {}",
                    self.config.lambda_max,
                    before
                );
                if have_trial && after.is_finite() {
                    self.network.set_weights(&self.trial)?;
                } else {
                    after = before;
                }
                break Outcome::LambdaCapped;
            }
        };

        self.error = after;
        self.last_outcome = Some(outcome);
        self.iteration += 1;
        log::debug!(
            "LM iteration {}: sse {} -> {}, lambda {}, {:?}",
            self.iteration,
            before,
            after,
            self.lambda,
            outcome
        );
        Ok(())
    }

    /// Half the weighted SSE after the last iteration.
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
    use crate::activation::Activation;
    use crate::config::HessianStrategy;
    use crate::data::BasicTrainingSet;

    fn line() -> BasicTrainingSet {
        // y = 2x - 1
        let inputs: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64 * 0.5]).collect();
        let ideals: Vec<Vec<f64>> = inputs.iter().map(|x| vec![2.0 * x[0] - 1.0]).collect();
        BasicTrainingSet::from_rows(&inputs, &ideals).unwrap()
    }

    fn linear_network() -> FlatNetwork {
        FlatNetwork::feedforward(1, &[], 1, Activation::Linear, Activation::Linear).unwrap()
    }

    #[test]
    fn test_linear_fit_converges() {
        let training = line();
        let config = LmConfig::builder().threads(2).build().unwrap();
        let mut train = LevenbergMarquardt::new(linear_network(), &training, config).unwrap();

        train.iteration().unwrap();
        assert_eq!(train.last_outcome(), Some(Outcome::Accepted));
        assert!((train.lambda() - 0.01).abs() < 1e-15);

        for _ in 0..5 {
            train.iteration().unwrap();
        }
        let w = train.network().weights();
        assert!((w[0] - 2.0).abs() < 1e-6);
        assert!((w[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_finite_difference_strategy() {
        let training = line();
        let config = LmConfig::builder()
            .threads(1)
            .hessian(HessianStrategy::FiniteDifference { points_per_side: 2 })
            .build()
            .unwrap();
        let mut train = LevenbergMarquardt::new(linear_network(), &training, config).unwrap();
        train.train_until(1e-12, 20).unwrap();
        assert!(train.error() < 1e-12);
    }

    #[test]
    fn test_cap_on_perfect_fit() {
        let training = line();
        let mut network = linear_network();
        network.set_weights(&[2.0, -1.0]).unwrap();

        let config = LmConfig::builder().threads(1).lambda_max(1e3).build().unwrap();
        let mut train = LevenbergMarquardt::new(network, &training, config).unwrap();
        train.iteration().unwrap();

        // Nothing beats zero error, so the loop runs into the cap.
        assert_eq!(train.last_outcome(), Some(Outcome::LambdaCapped));
        assert_eq!(train.lambda(), 1e3);
        assert!(train.error() < 1e-20);
    }

    #[test]
    fn test_lambda_never_drops_below_floor() {
        let training = line();
        let config = LmConfig::builder()
            .threads(1)
            .initial_lambda(crate::config::DEFAULT_LAMBDA_MIN)
            .build()
            .unwrap();
        let mut train = LevenbergMarquardt::new(linear_network(), &training, config).unwrap();

        // The first step is accepted at the floor; later ones find nothing
        // better and have to climb all the way to the cap.
        train.iteration().unwrap();
        assert_eq!(train.last_outcome(), Some(Outcome::Accepted));
        assert_eq!(train.lambda(), crate::config::DEFAULT_LAMBDA_MIN);

        for _ in 0..4 {
            train.iteration().unwrap();
            assert!(train.lambda() >= crate::config::DEFAULT_LAMBDA_MIN);
        }
        assert!(train.error() < 1e-20);
    }

    #[test]
    fn test_custom_floor() {
        let training = line();
        let config = LmConfig::builder()
            .threads(1)
            .lambda_min(1e-3)
            .initial_lambda(1e-3)
            .build()
            .unwrap();
        let mut train = LevenbergMarquardt::new(linear_network(), &training, config).unwrap();
        train.iteration().unwrap();
        assert_eq!(train.last_outcome(), Some(Outcome::Accepted));
        assert_eq!(train.lambda(), 1e-3);
    }

    #[test]
    fn test_rejected_trials_are_not_committed() {
        // Single saturated tanh neuron: y = tanh(w + b) with w = b = 1.5,
        // target 0. The Gauss-Newton step overshoots into the opposite
        // saturation, so the first two trials (lambda 1e-4, 1e-3) raise the
        // error and only the third (lambda 1e-2) is accepted.
        let mut network =
            FlatNetwork::feedforward(1, &[], 1, Activation::Linear, Activation::Tanh).unwrap();
        network.set_weights(&[1.5, 1.5]).unwrap();
        let training = BasicTrainingSet::from_rows(&[vec![1.0]], &[vec![0.0]]).unwrap();

        let config = LmConfig::builder().threads(1).initial_lambda(1e-4).build().unwrap();
        let mut train = LevenbergMarquardt::new(network, &training, config).unwrap();
        train.iteration().unwrap();

        assert_eq!(train.last_outcome(), Some(Outcome::Accepted));
        // Two rejections (x100) then one accept (/10)
        assert!((train.lambda() - 1e-3).abs() < 1e-15);

        let y = 3.0_f64.tanh();
        let d = 1.0 - y * y;
        let e = -y;
        let step = e * d / (2.0 * d * d + 1e-2);
        for w in train.network().weights() {
            assert!((w - (1.5 + step)).abs() < 1e-9, "{}", w);
        }

        let committed = (1.5 + step) * 2.0;
        assert!((train.error() - 0.5 * committed.tanh().powi(2)).abs() < 1e-12);
        assert!(train.error() < train.hessian_state().sse());
    }

    #[test]
    fn test_shape_mismatch_before_pool() {
        let training = BasicTrainingSet::from_rows(&[vec![0.0, 1.0]], &[vec![1.0]]).unwrap();
        let result = LevenbergMarquardt::new(linear_network(), &training, LmConfig::default());
        assert!(matches!(result, Err(FlatError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_step_activation_needs_finite_differences() {
        let network = FlatNetwork::feedforward(
            1,
            &[2],
            1,
            Activation::Step {
                low: 0.0,
                center: 0.0,
                high: 1.0,
            },
            Activation::Linear,
        )
        .unwrap();
        let training = BasicTrainingSet::from_rows(&[vec![0.0]], &[vec![1.0]]).unwrap();
        let result = LevenbergMarquardt::new(network, &training, LmConfig::default());
        assert!(matches!(result, Err(FlatError::NoDerivative("step"))));
    }
}
