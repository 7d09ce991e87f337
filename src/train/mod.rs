//! Multi-threaded trainers.
//!
//! - [`LevenbergMarquardt`] - damped Gauss-Newton on an approximate Hessian
//! - [`Propagation`] - first-order training (backpropagation, RPROP)
//!
//! Both shard the training set over a fixed [`WorkerPool`]. Each worker owns
//! its scratch buffers and a private [`NeuronState`](crate::NeuronState);
//! the network and the weight vector are only read during a pass, and the
//! per-shard results are summed in shard order once every worker is done.
//! Recurrent context is reset at the start of every shard, so each shard is
//! an independent sequence.
//!
//! # Example
//!
//! ```rust,no_run
//! use flatlm::train::{LevenbergMarquardt, Train};
//! use flatlm::{Activation, BasicTrainingSet, FlatNetwork, LmConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut network =
//!     FlatNetwork::feedforward(2, &[3], 1, Activation::Tanh, Activation::Linear).unwrap();
//! network.nguyen_widrow(&mut StdRng::seed_from_u64(7));
//!
//! let training = BasicTrainingSet::from_rows(
//!     &[vec![0.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]],
//!     &[vec![0.0], vec![1.0], vec![1.0], vec![0.0]],
//! )
//! .unwrap();
//!
//! let mut train = LevenbergMarquardt::new(network, &training, LmConfig::default()).unwrap();
//! train.train_until(0.01, 50).unwrap();
//! println!("sse = {}", train.error());
//! ```

pub mod chain_rule;
pub mod evaluate;
pub mod gradient;
pub mod hessian;
pub mod lma;
pub mod pool;
pub mod propagation;

pub use chain_rule::ChainRuleWorker;
pub use evaluate::EvaluationWorker;
pub use gradient::{GradientCalculator, GradientWorker};
pub use hessian::{ChainRuleHessian, ComputeHessian, FiniteDifferenceHessian, HessianState};
pub use lma::{LevenbergMarquardt, Outcome};
pub use pool::{partition, WorkerPool};
pub use propagation::Propagation;

use crate::data::TrainingSet;
use crate::error::{FlatError, FlatResult};
use crate::network::FlatNetwork;

/// Common surface of every trainer.
pub trait Train {
    /// Runs one training iteration. Blocks until the iteration is complete.
    fn iteration(&mut self) -> FlatResult<()>;

    /// Error reported by the last iteration.
    fn error(&self) -> f64;

    /// Iterations run so far.
    fn iteration_count(&self) -> usize;

    /// The network being trained.
    fn network(&self) -> &FlatNetwork;

    /// Consumes the trainer, returning the trained network.
    fn into_network(self) -> FlatNetwork
    where
        Self: Sized;

    /// Iterates until [`error`](Self::error) drops below `target` or
    /// `max_iterations` iterations have run. Returns the iterations run by
    /// this call.
    fn train_until(&mut self, target: f64, max_iterations: usize) -> FlatResult<usize> {
        for run in 1..=max_iterations {
            self.iteration()?;
            if self.error() < target {
                return Ok(run);
            }
        }
        Ok(max_iterations)
    }
}

/// Checks a training set against a network before any worker is built.
pub(crate) fn check_training(network: &FlatNetwork, training: &dyn TrainingSet) -> FlatResult<()> {
    if training.input_size() != network.input_count()
        || training.ideal_size() != network.output_count()
    {
        return Err(FlatError::shape_mismatch(
            &[network.input_count(), network.output_count()],
            &[training.input_size(), training.ideal_size()],
        ));
    }
    if training.count() == 0 {
        return Err(FlatError::EmptyTrainingSet);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::data::BasicTrainingSet;

    #[test]
    fn test_check_training() {
        let network =
            FlatNetwork::feedforward(2, &[2], 1, Activation::Sigmoid, Activation::Linear).unwrap();

        let wrong = BasicTrainingSet::from_rows(&[vec![0.0]], &[vec![0.0]]).unwrap();
        assert!(matches!(
            check_training(&network, &wrong),
            Err(FlatError::ShapeMismatch { .. })
        ));

        let empty = BasicTrainingSet::new(2, 1);
        assert!(matches!(
            check_training(&network, &empty),
            Err(FlatError::EmptyTrainingSet)
        ));

        let ok = BasicTrainingSet::from_rows(&[vec![0.0, 1.0]], &[vec![1.0]]).unwrap();
        assert!(check_training(&network, &ok).is_ok());
    }
}
