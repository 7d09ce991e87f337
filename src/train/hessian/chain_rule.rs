//! Analytic Hessian engine.
//!
//! For every output neuron `o` each worker walks its shard, builds the
//! Jacobian row `∂y_o/∂w` by back-propagating the output derivative, and adds
//! `s d dᵀ` into its local Hessian. The engine sums the workers in shard
//! order after every pass.

use crate::data::TrainingSet;
use crate::error::FlatResult;
use crate::network::FlatNetwork;
use crate::train::chain_rule::ChainRuleWorker;
use crate::train::pool::WorkerPool;

use super::{ComputeHessian, HessianState};

/// Analytic Hessian: chain-rule workers, one pass per output neuron.
#[derive(Debug, Clone)]
pub struct ChainRuleHessian {
    workers: Vec<ChainRuleWorker>,
}

impl ChainRuleHessian {
    /// Creates one worker per pool shard.
    ///
    /// # Errors
    ///
    /// [`FlatError::NoDerivative`](crate::error::FlatError::NoDerivative)
    /// if a non-input layer uses an activation without a derivative.
    pub fn new(
        network: &FlatNetwork,
        training: &dyn TrainingSet,
        pool: &WorkerPool,
    ) -> FlatResult<Self> {
        network.check_derivatives()?;

        let workers = pool
            .shards(training.count())
            .into_iter()
            .map(|range| ChainRuleWorker::new(network, range))
            .collect();
        Ok(Self { workers })
    }

    /// Workers, in shard order.
    pub fn workers(&self) -> &[ChainRuleWorker] {
        &self.workers
    }
}

impl ComputeHessian for ChainRuleHessian {
    fn compute(
        &mut self,
        network: &FlatNetwork,
        training: &dyn TrainingSet,
        pool: &WorkerPool,
        state: &mut HessianState,
    ) -> FlatResult<()> {
        state.clear();
        let weights = network.weights();

        for neuron in 0..network.output_count() {
            for worker in self.workers.iter_mut() {
                worker.set_output_neuron(neuron);
            }
            pool.run(&mut self.workers, |worker| worker.run(network, weights, training))?;

            for worker in &self.workers {
                state.accumulate(worker.gradients(), worker.hessian(), worker.sse());
            }
        }
        Ok(())
    }
}
