//! Finite-difference Hessian engine.
//!
//! Derivatives of every output with respect to every weight come from a
//! symmetric `2k + 1` point stencil around the current weight, with step
//! `max(0.001 |w|, 0.001)`. Each probe is a full forward pass over the
//! worker's own copy of the weights, so workers never share mutable state.
//! Context slots of a recurrent network are restored after each probe.

use std::ops::Range;

use crate::config::{ConfigError, FD_INITIAL_STEP};
use crate::data::{TrainingPair, TrainingSet};
use crate::error::{FlatError, FlatResult};
use crate::matrix::Matrix;
use crate::network::FlatNetwork;
use crate::state::NeuronState;
use crate::train::chain_rule::accumulate_outer;
use crate::train::pool::WorkerPool;

use super::{ComputeHessian, HessianState};

fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// First-derivative coefficients for a symmetric stencil of
/// `2 * points_per_side + 1` points.
///
/// With `t[j][c] = (j - center)^c / c!`, row 1 of `t⁻¹` maps the sampled
/// values `f(x + (j - center) * h)` to `h * f'(x)`. Coefficients are
/// rounded to multiples of `1 / (2k + 1)!`.
///
/// ```rust
/// use flatlm::train::hessian::stencil_coefficients;
///
/// let c = stencil_coefficients(1).unwrap();
/// assert_eq!(c, vec![-0.5, 0.0, 0.5]);
/// ```
pub fn stencil_coefficients(points_per_side: usize) -> FlatResult<Vec<f64>> {
    if points_per_side == 0 {
        return Err(ConfigError::InvalidStencil(points_per_side).into());
    }
    let count = 2 * points_per_side + 1;
    let center = points_per_side as f64;

    let mut t = Matrix::zeros(count, count);
    for j in 0..count {
        let delta = j as f64 - center;
        let mut x = 1.0;
        for c in 0..count {
            t[(j, c)] = x / factorial(c);
            x *= delta;
        }
    }

    let inverse = t.inverse()?;
    let f = factorial(count);
    Ok((0..count)
        .map(|k| (inverse[(1, k)] * f).round() / f)
        .collect())
}

/// Finite-difference Hessian: output derivatives from a symmetric stencil
/// around every weight.
///
/// Each perturbed point is a full forward pass; nothing is reused between
/// points.
#[derive(Debug, Clone)]
pub struct FiniteDifferenceHessian {
    coefficients: Vec<f64>,
    workers: Vec<FiniteDifferenceWorker>,
}

impl FiniteDifferenceHessian {
    /// Creates one worker per pool shard with a `2k + 1` point stencil.
    pub fn new(
        network: &FlatNetwork,
        training: &dyn TrainingSet,
        pool: &WorkerPool,
        points_per_side: usize,
    ) -> FlatResult<Self> {
        let coefficients = stencil_coefficients(points_per_side)?;
        let workers = pool
            .shards(training.count())
            .into_iter()
            .map(|range| FiniteDifferenceWorker::new(network, range, coefficients.len()))
            .collect();
        Ok(Self {
            coefficients,
            workers,
        })
    }

    /// Stencil coefficients, centre in the middle.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl ComputeHessian for FiniteDifferenceHessian {
    fn compute(
        &mut self,
        network: &FlatNetwork,
        training: &dyn TrainingSet,
        pool: &WorkerPool,
        state: &mut HessianState,
    ) -> FlatResult<()> {
        state.clear();
        let weights = network.weights();
        let coefficients = &self.coefficients;

        pool.run(&mut self.workers, |worker| {
            worker.run(network, weights, training, coefficients)
        })?;

        for worker in &self.workers {
            state.accumulate(&worker.gradients, &worker.hessian, worker.sse);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FiniteDifferenceWorker {
    range: Range<usize>,
    weights: Vec<f64>,
    state: NeuronState,
    /// Context before and after the unperturbed pass of a recurrent network.
    context_before: NeuronState,
    context_after: NeuronState,
    pair: TrainingPair,
    actual: Vec<f64>,
    probe: Vec<f64>,
    /// Stencil samples, `[point][output]`.
    points: Vec<f64>,
    /// `∂y/∂w`, `[output][weight]`.
    derivatives: Vec<f64>,
    gradients: Vec<f64>,
    hessian: Matrix,
    sse: f64,
}

impl FiniteDifferenceWorker {
    fn new(network: &FlatNetwork, range: Range<usize>, point_count: usize) -> Self {
        let weights = network.weight_count();
        let outputs = network.output_count();
        let state = network.create_state();
        Self {
            range,
            weights: network.weights().to_vec(),
            context_before: state.clone(),
            context_after: state.clone(),
            state,
            pair: TrainingPair::new(network.input_count(), outputs),
            actual: vec![0.0; outputs],
            probe: vec![0.0; outputs],
            points: vec![0.0; point_count * outputs],
            derivatives: vec![0.0; outputs * weights],
            gradients: vec![0.0; weights],
            hessian: Matrix::zeros(weights, weights),
            sse: 0.0,
        }
    }

    fn run(
        &mut self,
        network: &FlatNetwork,
        weights: &[f64],
        training: &dyn TrainingSet,
        coefficients: &[f64],
    ) -> FlatResult<()> {
        self.weights.copy_from_slice(weights);
        self.gradients.fill(0.0);
        self.hessian.clear();
        self.sse = 0.0;
        network.clear_context_in(&mut self.state);

        for index in self.range.clone() {
            training
                .record(index, &mut self.pair)
                .map_err(|e| FlatError::worker(self.range.start, self.range.end, e.to_string()))?;
            self.process(network, coefficients)?;
        }
        Ok(())
    }

    fn process(&mut self, network: &FlatNetwork, coefficients: &[f64]) -> FlatResult<()> {
        let recurrent = network.has_context();
        if recurrent {
            self.context_before.clone_from(&self.state);
        }
        network.compute_with(&self.weights, &self.pair.input, &mut self.actual, &mut self.state);
        if self.actual.iter().any(|v| !v.is_finite()) {
            return Err(FlatError::worker(
                self.range.start,
                self.range.end,
                FlatError::non_finite("output").to_string(),
            ));
        }
        if recurrent {
            self.context_after.clone_from(&self.state);
        }

        let outputs = self.actual.len();
        let weight_count = self.weights.len();
        let center = coefficients.len() / 2;

        for w in 0..weight_count {
            let original = self.weights[w];
            let step = (FD_INITIAL_STEP * original.abs()).max(FD_INITIAL_STEP);

            for point in 0..coefficients.len() {
                let row = &mut self.points[point * outputs..(point + 1) * outputs];
                if point == center {
                    row.copy_from_slice(&self.actual);
                    continue;
                }
                self.weights[w] = original + (point as f64 - center as f64) * step;
                if recurrent {
                    self.state.clone_from(&self.context_before);
                }
                network.compute_with(&self.weights, &self.pair.input, &mut self.probe, &mut self.state);
                row.copy_from_slice(&self.probe);
            }
            self.weights[w] = original;

            for o in 0..outputs {
                let value: f64 = coefficients
                    .iter()
                    .enumerate()
                    .map(|(point, c)| c * self.points[point * outputs + o])
                    .sum();
                self.derivatives[o * weight_count + w] = value / step;
            }
        }

        if recurrent {
            self.state.clone_from(&self.context_after);
        }

        let s = self.pair.significance;
        for o in 0..outputs {
            let e = self.pair.ideal[o] - self.actual[o];
            self.sse += 0.5 * s * e * e;

            let d = &self.derivatives[o * weight_count..(o + 1) * weight_count];
            for (g, di) in self.gradients.iter_mut().zip(d) {
                *g -= s * e * di;
            }
            accumulate_outer(&mut self.hessian, d, s);
        }
        Ok(())
    }
}
