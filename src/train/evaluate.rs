//! Parallel error evaluation for trial weight vectors.

use std::ops::Range;

use crate::data::{TrainingPair, TrainingSet};
use crate::error::{FlatError, FlatResult};
use crate::loss::ErrorCalculation;
use crate::network::FlatNetwork;
use crate::state::NeuronState;

use super::pool::WorkerPool;

/// Forward-only worker accumulating the squared error of one shard.
#[derive(Debug, Clone)]
pub struct EvaluationWorker {
    range: Range<usize>,
    state: NeuronState,
    pair: TrainingPair,
    actual: Vec<f64>,
    error: ErrorCalculation,
}

impl EvaluationWorker {
    /// Creates a worker for records `range`.
    pub fn new(network: &FlatNetwork, range: Range<usize>) -> Self {
        Self {
            range,
            state: network.create_state(),
            pair: TrainingPair::new(network.input_count(), network.output_count()),
            actual: vec![0.0; network.output_count()],
            error: ErrorCalculation::new(),
        }
    }

    /// Error from the last [`run`](Self::run).
    pub fn error(&self) -> &ErrorCalculation {
        &self.error
    }

    /// Evaluates every record of the shard against `weights`.
    pub fn run(
        &mut self,
        network: &FlatNetwork,
        weights: &[f64],
        training: &dyn TrainingSet,
    ) -> FlatResult<()> {
        self.error.reset();
        network.clear_context_in(&mut self.state);
        for index in self.range.clone() {
            training
                .record(index, &mut self.pair)
                .map_err(|e| FlatError::worker(self.range.start, self.range.end, e.to_string()))?;
            network.compute_with(weights, &self.pair.input, &mut self.actual, &mut self.state);
            self.error
                .update(&self.actual, &self.pair.ideal, self.pair.significance);
        }
        Ok(())
    }
}

/// One evaluation worker per pool shard.
pub(crate) fn evaluation_workers(
    network: &FlatNetwork,
    training: &dyn TrainingSet,
    pool: &WorkerPool,
) -> Vec<EvaluationWorker> {
    pool.shards(training.count())
        .into_iter()
        .map(|range| EvaluationWorker::new(network, range))
        .collect()
}

/// Half the weighted SSE of `weights` over the whole training set.
///
/// A non-finite result is returned as is; callers decide whether to reject
/// it.
pub(crate) fn evaluate_sse(
    pool: &WorkerPool,
    workers: &mut [EvaluationWorker],
    network: &FlatNetwork,
    weights: &[f64],
    training: &dyn TrainingSet,
) -> FlatResult<f64> {
    pool.run(workers, |worker| worker.run(network, weights, training))?;

    let mut total = ErrorCalculation::new();
    for worker in workers.iter() {
        total.merge(worker.error());
    }
    Ok(total.sse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::data::BasicTrainingSet;

    #[test]
    fn test_sharded_sse_matches_serial() {
        let mut network =
            FlatNetwork::feedforward(1, &[], 1, Activation::Linear, Activation::Linear).unwrap();
        network.set_weights(&[1.0, 0.0]).unwrap();

        let inputs: Vec<Vec<f64>> = (0..9).map(|i| vec![i as f64]).collect();
        let ideals: Vec<Vec<f64>> = (0..9).map(|i| vec![i as f64 + 1.0]).collect();
        let training = BasicTrainingSet::from_rows(&inputs, &ideals).unwrap();

        let pool = WorkerPool::new(4).unwrap();
        let mut workers = evaluation_workers(&network, &training, &pool);
        assert_eq!(workers.len(), 4);

        let sse = evaluate_sse(&pool, &mut workers, &network, network.weights(), &training).unwrap();
        // every record is off by exactly one
        assert_eq!(sse, 4.5);
    }
}
