//! Jacobian rows by the chain rule.
//!
//! For one designated output neuron `o`, a [`ChainRuleWorker`] computes per
//! record the derivative vector `d = ∂y_o/∂w` and folds it into a local
//! Gauss-Newton system over its shard:
//!
//! ```text
//! H   += s * d * dᵀ
//! g   -= s * e * d        (e = ideal_o - actual_o)
//! sse += s * e² / 2
//! ```
//!
//! Unlike [`GradientWorker`](super::GradientWorker) the backward pass starts
//! from the raw output derivative and carries no flat spot.

use std::ops::Range;

use crate::data::{TrainingPair, TrainingSet};
use crate::error::{FlatError, FlatResult};
use crate::matrix::Matrix;
use crate::network::FlatNetwork;
use crate::state::NeuronState;

use super::gradient::back_propagate;

/// Chain-rule derivative worker over one shard.
#[derive(Debug, Clone)]
pub struct ChainRuleWorker {
    range: Range<usize>,
    output_neuron: usize,
    no_flat_spot: Vec<f64>,
    state: NeuronState,
    pair: TrainingPair,
    actual: Vec<f64>,
    layer_delta: Vec<f64>,
    derivative: Vec<f64>,
    gradients: Vec<f64>,
    hessian: Matrix,
    sse: f64,
}

impl ChainRuleWorker {
    /// Creates a worker for records `range`, targeting output neuron 0.
    pub fn new(network: &FlatNetwork, range: Range<usize>) -> Self {
        let weights = network.weight_count();
        Self {
            range,
            output_neuron: 0,
            no_flat_spot: vec![0.0; network.layer_count()],
            state: network.create_state(),
            pair: TrainingPair::new(network.input_count(), network.output_count()),
            actual: vec![0.0; network.output_count()],
            layer_delta: vec![0.0; network.neuron_count()],
            derivative: vec![0.0; weights],
            gradients: vec![0.0; weights],
            hessian: Matrix::zeros(weights, weights),
            sse: 0.0,
        }
    }

    /// Records handled by this worker.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Output neuron whose Jacobian row the next run computes.
    pub fn output_neuron(&self) -> usize {
        self.output_neuron
    }

    /// Selects the output neuron for the next run.
    pub fn set_output_neuron(&mut self, neuron: usize) {
        self.output_neuron = neuron;
    }

    /// Local gradient (`∂E/∂w` restricted to the current output neuron).
    pub fn gradients(&self) -> &[f64] {
        &self.gradients
    }

    /// Local Gauss-Newton Hessian.
    pub fn hessian(&self) -> &Matrix {
        &self.hessian
    }

    /// Local half weighted SSE of the current output neuron.
    pub fn sse(&self) -> f64 {
        self.sse
    }

    /// Derivative vector of the last processed record.
    pub fn derivative(&self) -> &[f64] {
        &self.derivative
    }

    /// Processes every record of the shard against `weights`.
    pub fn run(
        &mut self,
        network: &FlatNetwork,
        weights: &[f64],
        training: &dyn TrainingSet,
    ) -> FlatResult<()> {
        self.gradients.fill(0.0);
        self.hessian.clear();
        self.sse = 0.0;
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

        let o = self.output_neuron;
        let e = self.pair.ideal[o] - self.actual[o];
        if !e.is_finite() {
            return Err(FlatError::worker(
                self.range.start,
                self.range.end,
                FlatError::non_finite("output").to_string(),
            ));
        }
        let s = self.pair.significance;
        self.sse += 0.5 * s * e * e;

        let activation = network.activations()[0];
        for i in 0..self.actual.len() {
            self.layer_delta[i] = if i == o {
                activation.derivative(self.state.layer_sums[i], self.state.layer_output[i])
            } else {
                0.0
            };
        }

        let derivative = &mut self.derivative;
        back_propagate(
            network,
            weights,
            &self.state,
            &self.no_flat_spot,
            &mut self.layer_delta,
            |wi, value| derivative[wi] = value,
        );

        for (g, d) in self.gradients.iter_mut().zip(&self.derivative) {
            *g -= s * e * d;
        }
        accumulate_outer(&mut self.hessian, &self.derivative, s);
        Ok(())
    }
}

/// `hessian += scale * d * dᵀ`.
pub(crate) fn accumulate_outer(hessian: &mut Matrix, d: &[f64], scale: f64) {
    for (i, &di) in d.iter().enumerate() {
        if di == 0.0 {
            continue;
        }
        let a = scale * di;
        for (h, &dj) in hessian.row_mut(i).iter_mut().zip(d) {
            *h += a * dj;
        }
    }
}
