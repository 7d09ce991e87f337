//! Per-shard backpropagation.
//!
//! A [`GradientWorker`] owns one contiguous shard of the training set and
//! accumulates `∂E/∂w` and the squared error over it. The
//! [`GradientCalculator`] runs one worker per shard on a [`WorkerPool`] and
//! sums their contributions in shard order.
//!
//! # Algorithm
//!
//! For every record:
//!
//! 1. Forward pass into the worker's private state
//! 2. Output delta: `-ef(ideal, actual) * (f'(sum, out) + flat_spot) * significance`
//! 3. Walk the levels output to input:
//!    `grad[w] += source_out * target_delta` and
//!    `source_delta = Σ w * target_delta * (f' + flat_spot)`

use std::ops::Range;

use crate::data::{TrainingPair, TrainingSet};
use crate::error::{FlatError, FlatResult};
use crate::loss::{ErrorCalculation, ErrorFunction};
use crate::network::FlatNetwork;
use crate::state::NeuronState;

use super::pool::WorkerPool;

/// Walks the network levels from output to input, handing every weight's
/// `source_output * target_delta` to `record` and overwriting `layer_delta`
/// with the upstream deltas.
///
/// `layer_delta` must hold the output deltas on entry.
pub(crate) fn back_propagate<F>(
    network: &FlatNetwork,
    weights: &[f64],
    state: &NeuronState,
    flat_spot: &[f64],
    layer_delta: &mut [f64],
    mut record: F,
) where
    F: FnMut(usize, f64),
{
    let layer_index = network.layer_index();
    let layer_counts = network.layer_counts();
    let feed_counts = network.layer_feed_counts();
    let weight_index = network.weight_index();
    let activations = network.activations();

    for level in 0..network.layer_count() - 1 {
        let from_index = layer_index[level + 1];
        let to_index = layer_index[level];
        let from_size = layer_counts[level + 1];
        let to_size = feed_counts[level];
        let activation = activations[level + 1];
        let spot = flat_spot[level + 1];

        for y in 0..from_size {
            let yi = from_index + y;
            let output = state.layer_output[yi];
            let mut sum = 0.0;
            let mut wi = weight_index[level] + y;
            for x in 0..to_size {
                let delta = layer_delta[to_index + x];
                record(wi, output * delta);
                sum += weights[wi] * delta;
                wi += from_size;
            }
            layer_delta[yi] = sum * (activation.derivative(state.layer_sums[yi], output) + spot);
        }
    }
}

/// Per-layer flat-spot constants, zero when disabled.
pub(crate) fn flat_spots(network: &FlatNetwork, enabled: bool) -> Vec<f64> {
    network
        .activations()
        .iter()
        .map(|a| if enabled { a.flat_spot() } else { 0.0 })
        .collect()
}

/// Backpropagation over one shard.
#[derive(Debug, Clone)]
pub struct GradientWorker {
    range: Range<usize>,
    error_function: ErrorFunction,
    flat_spot: Vec<f64>,
    state: NeuronState,
    pair: TrainingPair,
    actual: Vec<f64>,
    layer_delta: Vec<f64>,
    gradients: Vec<f64>,
    error: ErrorCalculation,
}

impl GradientWorker {
    /// Creates a worker for records `range`.
    pub fn new(
        network: &FlatNetwork,
        range: Range<usize>,
        error_function: ErrorFunction,
        flat_spot: bool,
    ) -> Self {
        Self {
            range,
            error_function,
            flat_spot: flat_spots(network, flat_spot),
            state: network.create_state(),
            pair: TrainingPair::new(network.input_count(), network.output_count()),
            actual: vec![0.0; network.output_count()],
            layer_delta: vec![0.0; network.neuron_count()],
            gradients: vec![0.0; network.weight_count()],
            error: ErrorCalculation::new(),
        }
    }

    /// Records handled by this worker.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// `∂E/∂w` summed over the shard by the last [`run`](Self::run).
    pub fn gradients(&self) -> &[f64] {
        &self.gradients
    }

    /// Squared error over the shard from the last [`run`](Self::run).
    pub fn error(&self) -> &ErrorCalculation {
        &self.error
    }

    /// Processes every record of the shard against `weights`.
    ///
    /// # Errors
    ///
    /// [`FlatError::Worker`] if a record cannot be read or the network
    /// produces a non-finite output. The worker's accumulators are then
    /// incomplete and must not be used.
    pub fn run(
        &mut self,
        network: &FlatNetwork,
        weights: &[f64],
        training: &dyn TrainingSet,
    ) -> FlatResult<()> {
        self.gradients.fill(0.0);
        self.error.reset();
        network.clear_context_in(&mut self.state);

        for index in self.range.clone() {
            training
                .record(index, &mut self.pair)
                .map_err(|e| FlatError::worker(self.range.start, self.range.end, e.to_string()))?;
            self.process(network, weights)?;
        }
        Ok(())
    }

    fn process(&mut self, network: &FlatNetwork, weights: &[f64]) -> FlatResult<()> {
        network.compute_with(weights, &self.pair.input, &mut self.actual, &mut self.state);
        if self.actual.iter().any(|v| !v.is_finite()) {
            return Err(FlatError::worker(
                self.range.start,
                self.range.end,
                FlatError::non_finite("output").to_string(),
            ));
        }

        let significance = self.pair.significance;
        self.error
            .update(&self.actual, &self.pair.ideal, significance);

        let outputs = self.actual.len();
        self.error_function.output_delta(
            &self.pair.ideal,
            &self.actual,
            &mut self.layer_delta[..outputs],
        );

        let activation = network.activations()[0];
        let spot = self.flat_spot[0];
        for i in 0..outputs {
            let derivative =
                activation.derivative(self.state.layer_sums[i], self.state.layer_output[i]);
            self.layer_delta[i] = -(derivative + spot) * self.layer_delta[i] * significance;
        }

        let gradients = &mut self.gradients;
        back_propagate(
            network,
            weights,
            &self.state,
            &self.flat_spot,
            &mut self.layer_delta,
            |wi, value| gradients[wi] += value,
        );
        Ok(())
    }
}

/// Gradient over a whole training set, computed by one worker per shard.
#[derive(Debug, Clone)]
pub struct GradientCalculator {
    workers: Vec<GradientWorker>,
    gradients: Vec<f64>,
    error: ErrorCalculation,
}

impl GradientCalculator {
    /// Creates one worker per pool shard of `training`.
    pub fn new(
        network: &FlatNetwork,
        training: &dyn TrainingSet,
        pool: &WorkerPool,
        error_function: ErrorFunction,
        flat_spot: bool,
    ) -> Self {
        let workers = pool
            .shards(training.count())
            .into_iter()
            .map(|range| GradientWorker::new(network, range, error_function, flat_spot))
            .collect();
        Self {
            workers,
            gradients: vec![0.0; network.weight_count()],
            error: ErrorCalculation::new(),
        }
    }

    /// Runs every worker against `weights` and sums their results.
    ///
    /// On error the previous totals are left untouched.
    pub fn calculate(
        &mut self,
        pool: &WorkerPool,
        network: &FlatNetwork,
        weights: &[f64],
        training: &dyn TrainingSet,
    ) -> FlatResult<()> {
        pool.run(&mut self.workers, |worker| worker.run(network, weights, training))?;

        self.gradients.fill(0.0);
        self.error.reset();
        for worker in &self.workers {
            for (total, g) in self.gradients.iter_mut().zip(worker.gradients()) {
                *total += g;
            }
            self.error.merge(worker.error());
        }

        if self.gradients.iter().any(|g| !g.is_finite()) {
            return Err(FlatError::non_finite("gradient"));
        }
        Ok(())
    }

    /// Summed `∂E/∂w` from the last [`calculate`](Self::calculate).
    pub fn gradients(&self) -> &[f64] {
        &self.gradients
    }

    /// Summed error from the last [`calculate`](Self::calculate).
    pub fn error(&self) -> &ErrorCalculation {
        &self.error
    }

    /// Half the weighted sum of squared errors.
    pub fn sse(&self) -> f64 {
        self.error.sse()
    }

    /// Workers, in shard order.
    pub fn workers(&self) -> &[GradientWorker] {
        &self.workers
    }
}
