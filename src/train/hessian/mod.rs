//! Gauss-Newton Hessian approximations.
//!
//! Two interchangeable engines implement [`ComputeHessian`]:
//!
//! | Engine | Derivatives | Requires |
//! |--------|-------------|----------|
//! | [`ChainRuleHessian`] | analytic, one backward pass per record and output | differentiable activations |
//! | [`FiniteDifferenceHessian`] | symmetric stencil, `2k` extra forward passes per weight | nothing |
//!
//! Both fill a [`HessianState`] with `∂E/∂w`, `Σ s * d * dᵀ` and the
//! half weighted SSE, summed over every output neuron and record.

mod chain_rule;
mod finite_difference;

pub use chain_rule::ChainRuleHessian;
pub use finite_difference::{stencil_coefficients, FiniteDifferenceHessian};

use crate::config::HessianStrategy;
use crate::data::TrainingSet;
use crate::error::FlatResult;
use crate::matrix::Matrix;
use crate::network::FlatNetwork;

use super::pool::WorkerPool;

/// Gradient, approximate Hessian and SSE for one set of weights.
#[derive(Debug, Clone, PartialEq)]
pub struct HessianState {
    gradients: Vec<f64>,
    hessian: Matrix,
    sse: f64,
}

impl HessianState {
    /// Zeroed state for `weight_count` weights.
    pub fn new(weight_count: usize) -> Self {
        Self {
            gradients: vec![0.0; weight_count],
            hessian: Matrix::zeros(weight_count, weight_count),
            sse: 0.0,
        }
    }

    /// Zeroes every accumulator.
    pub fn clear(&mut self) {
        self.gradients.fill(0.0);
        self.hessian.clear();
        self.sse = 0.0;
    }

    /// `∂E/∂w`.
    pub fn gradients(&self) -> &[f64] {
        &self.gradients
    }

    /// Approximate Hessian.
    pub fn hessian(&self) -> &Matrix {
        &self.hessian
    }

    /// Mutable Hessian, used for damping.
    pub fn hessian_mut(&mut self) -> &mut Matrix {
        &mut self.hessian
    }

    /// Half the weighted sum of squared errors.
    pub fn sse(&self) -> f64 {
        self.sse
    }

    /// Adds one worker's local contribution.
    pub(crate) fn accumulate(&mut self, gradients: &[f64], hessian: &Matrix, sse: f64) {
        for (total, g) in self.gradients.iter_mut().zip(gradients) {
            *total += g;
        }
        for (total, h) in self
            .hessian
            .as_mut_slice()
            .iter_mut()
            .zip(hessian.as_slice())
        {
            *total += h;
        }
        self.sse += sse;
    }
}

/// Engine that fills a [`HessianState`] for the network's current weights.
pub trait ComputeHessian: Send + std::fmt::Debug {
    /// Clears `state` and accumulates the whole training set into it.
    fn compute(
        &mut self,
        network: &FlatNetwork,
        training: &dyn TrainingSet,
        pool: &WorkerPool,
        state: &mut HessianState,
    ) -> FlatResult<()>;
}

/// Builds the engine selected by `strategy`, one worker per pool shard.
pub fn create_hessian(
    strategy: HessianStrategy,
    network: &FlatNetwork,
    training: &dyn TrainingSet,
    pool: &WorkerPool,
) -> FlatResult<Box<dyn ComputeHessian>> {
    Ok(match strategy {
        HessianStrategy::ChainRule => Box::new(ChainRuleHessian::new(network, training, pool)?),
        HessianStrategy::FiniteDifference { points_per_side } => Box::new(
            FiniteDifferenceHessian::new(network, training, pool, points_per_side)?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_clear() {
        let mut state = HessianState::new(2);
        let local = Matrix::from_rows(&[vec![1.0, 2.0], vec![2.0, 4.0]]).unwrap();
        state.accumulate(&[1.0, -1.0], &local, 0.5);
        state.accumulate(&[1.0, -1.0], &local, 0.5);

        assert_eq!(state.gradients(), &[2.0, -2.0]);
        assert_eq!(state.hessian()[(1, 1)], 8.0);
        assert_eq!(state.sse(), 1.0);

        state.clear();
        assert_eq!(state, HessianState::new(2));
    }
}
