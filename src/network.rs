//! Flat (packed-array) network representation.
//!
//! # Layout
//!
//! All layers live in parallel index arrays, numbered output-first: index 0
//! is the output layer and index `layer_count - 1` is the input layer.
//!
//! - `layer_index[i]`: start of layer `i` in the neuron arrays
//! - `weight_index[i]`: start of the weights feeding layer `i` from layer `i + 1`
//! - weights into layer `i` are row-major `[to_neuron][from_neuron]`, where
//!   `from_neuron` spans every slot of layer `i + 1` (feed, bias, context)
//!
//! So `weights.len() == Σ feed[i] * total[i + 1]` and the neuron arrays hold
//! `Σ total[i]` slots.

use rand::Rng;
use wide::f64x4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::data::{TrainingPair, TrainingSet};
use crate::error::{FlatError, FlatResult};
use crate::layer::FlatLayer;
use crate::loss::ErrorCalculation;
use crate::state::NeuronState;

/// Layered network stored in flat arrays.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlatNetwork {
    input_count: usize,
    output_count: usize,
    /// Feed + bias + context slots per layer.
    layer_counts: Vec<usize>,
    /// Feed neurons per layer.
    layer_feed_counts: Vec<usize>,
    /// Context slots per layer.
    layer_context_counts: Vec<usize>,
    layer_index: Vec<usize>,
    weight_index: Vec<usize>,
    activations: Vec<Activation>,
    bias_activation: Vec<f64>,
    /// Where the outputs of layer `i` are copied before each pass.
    context_target_offset: Vec<usize>,
    context_target_size: Vec<usize>,
    has_context: bool,
    weights: Vec<f64>,
    state: NeuronState,
}

impl FlatNetwork {
    /// Builds a network from input-first layer descriptors.
    ///
    /// Weights start at zero; call [`randomize`](Self::randomize) or
    /// [`nguyen_widrow`](Self::nguyen_widrow) before training.
    ///
    /// # Errors
    ///
    /// [`FlatError::InvalidTopology`] when fewer than two layers are given, a
    /// layer has no neurons, a context source is out of range, or one layer
    /// feeds the context of more than one layer.
    pub fn new(layers: &[FlatLayer]) -> FlatResult<Self> {
        validate_layers(layers)?;

        let n = layers.len();
        let mut layer_counts = vec![0; n];
        let mut layer_feed_counts = vec![0; n];
        let mut layer_context_counts = vec![0; n];
        let mut layer_index = vec![0; n];
        let mut weight_index = vec![0; n];
        let mut activations = vec![Activation::Linear; n];
        let mut bias_activation = vec![0.0; n];
        let mut context_target_offset = vec![0; n];
        let mut context_target_size = vec![0; n];
        let mut has_context = false;
        let mut neuron_count = 0;
        let mut weight_count = 0;

        // Output-most descriptor first.
        for (index, i) in (0..n).rev().enumerate() {
            let layer = &layers[i];

            layer_counts[index] = layer.total_count(layers);
            layer_feed_counts[index] = layer.count;
            layer_context_counts[index] = layer.context_count(layers);
            activations[index] = layer.activation;
            bias_activation[index] = layer.bias_activation;
            neuron_count += layer_counts[index];

            if i > 0 {
                weight_count += layer.count * layers[i - 1].total_count(layers);
            }

            if index > 0 {
                weight_index[index] =
                    weight_index[index - 1] + layer_counts[index] * layer_feed_counts[index - 1];
                layer_index[index] = layer_index[index - 1] + layer_counts[index - 1];
            }

            let mut neuron_index = 0;
            for j in (0..n).rev() {
                let target = &layers[j];
                let target_total = target.total_count(layers);
                if target.context_source == Some(i) {
                    has_context = true;
                    let size = target.context_count(layers);
                    context_target_size[index] = size;
                    context_target_offset[index] = neuron_index + target_total - size;
                }
                neuron_index += target_total;
            }
        }

        debug_assert_eq!(weight_index[n - 1], weight_count);

        let mut network = Self {
            input_count: layers[0].count,
            output_count: layers[n - 1].count,
            layer_counts,
            layer_feed_counts,
            layer_context_counts,
            layer_index,
            weight_index,
            activations,
            bias_activation,
            context_target_offset,
            context_target_size,
            has_context,
            weights: vec![0.0; weight_count],
            state: NeuronState::new(neuron_count),
        };
        network.clear_context();
        Ok(network)
    }

    /// Feed-forward network: linear input, biased hidden layers, unbiased
    /// output.
    pub fn feedforward(
        input: usize,
        hidden: &[usize],
        output: usize,
        hidden_activation: Activation,
        output_activation: Activation,
    ) -> FlatResult<Self> {
        let mut layers = Vec::with_capacity(hidden.len() + 2);
        layers.push(FlatLayer::new(input, Activation::Linear));
        layers.extend(
            hidden
                .iter()
                .map(|&count| FlatLayer::new(count, hidden_activation)),
        );
        layers.push(FlatLayer::without_bias(output, output_activation));
        Self::new(&layers)
    }

    /// Elman (simple recurrent) network: the input layer carries a context
    /// copy of the hidden layer from the previous pass.
    pub fn elman(
        input: usize,
        hidden: usize,
        output: usize,
        activation: Activation,
    ) -> FlatResult<Self> {
        Self::new(&[
            FlatLayer::new(input, Activation::Linear).with_context(1),
            FlatLayer::new(hidden, activation),
            FlatLayer::without_bias(output, activation),
        ])
    }

    /// Allocates a neuron state for this network, bias and context slots
    /// initialised.
    pub fn create_state(&self) -> NeuronState {
        let mut state = NeuronState::new(self.neuron_count());
        self.clear_context_in(&mut state);
        state
    }

    /// Resets the network's own context slots and bias slots.
    pub fn clear_context(&mut self) {
        let mut state = std::mem::take(&mut self.state);
        if state.len() != self.neuron_count() {
            state = NeuronState::new(self.neuron_count());
        }
        self.clear_context_in(&mut state);
        self.state = state;
    }

    /// Resets context slots to zero and bias slots to their activation in an
    /// external state.
    pub fn clear_context_in(&self, state: &mut NeuronState) {
        let mut index = 0;
        for i in 0..self.layer_counts.len() {
            let feed = self.layer_feed_counts[i];
            let context = self.layer_context_counts[i];
            let has_bias = feed + context != self.layer_counts[i];

            state.layer_output[index..index + feed].fill(0.0);
            index += feed;

            if has_bias {
                state.layer_output[index] = self.bias_activation[i];
                index += 1;
            }

            state.layer_output[index..index + context].fill(0.0);
            index += context;
        }
    }

    /// Forward pass using the network's own weights and state.
    ///
    /// # Arguments
    /// * `input` - Input features `[input_count]`
    /// * `output` - Output buffer `[output_count]`
    pub fn compute(&mut self, input: &[f64], output: &mut [f64]) {
        let mut state = std::mem::take(&mut self.state);
        self.compute_with(&self.weights, input, output, &mut state);
        self.state = state;
    }

    /// Forward pass against an explicit weight slice and caller-owned state.
    ///
    /// The network itself is only read, so any number of threads can call
    /// this concurrently with their own states.
    pub fn compute_with(
        &self,
        weights: &[f64],
        input: &[f64],
        output: &mut [f64],
        state: &mut NeuronState,
    ) {
        debug_assert_eq!(weights.len(), self.weights.len());
        debug_assert_eq!(input.len(), self.input_count);
        debug_assert_eq!(output.len(), self.output_count);
        debug_assert_eq!(state.len(), self.neuron_count());

        // Context slots take the feed outputs of the previous pass, so the
        // state afterwards holds exactly the values this pass consumed.
        let last = self.layer_counts.len() - 1;
        if self.has_context {
            for layer in 0..=last {
                self.copy_context(layer, state);
            }
        }

        let source_index = self.layer_index[last];
        state.layer_output[source_index..source_index + self.input_count].copy_from_slice(input);

        for i in (1..=last).rev() {
            self.compute_layer(weights, i, state);
        }

        output.copy_from_slice(&state.layer_output[..self.output_count]);
    }

    /// Computes layer `current - 1` from layer `current`.
    fn compute_layer(&self, weights: &[f64], current: usize, state: &mut NeuronState) {
        let input_index = self.layer_index[current];
        let output_index = self.layer_index[current - 1];
        let input_size = self.layer_counts[current];
        let output_size = self.layer_feed_counts[current - 1];

        let mut index = self.weight_index[current - 1];
        for x in output_index..output_index + output_size {
            let sum = weighted_sum(
                &weights[index..index + input_size],
                &state.layer_output[input_index..input_index + input_size],
            );
            index += input_size;
            state.layer_sums[x] = sum;
            state.layer_output[x] = sum;
        }

        self.activations[current - 1]
            .activate(&mut state.layer_output[output_index..output_index + output_size]);
    }

    /// Copies the feed outputs of `layer` into the context slots it feeds.
    #[inline]
    fn copy_context(&self, layer: usize, state: &mut NeuronState) {
        let size = self.context_target_size[layer];
        if size > 0 {
            let start = self.layer_index[layer];
            state
                .layer_output
                .copy_within(start..start + size, self.context_target_offset[layer]);
        }
    }

    /// Fills every weight uniformly from `[min, max)`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, min: f64, max: f64) {
        if min < max {
            for w in self.weights.iter_mut() {
                *w = rng.gen_range(min..max);
            }
        } else {
            self.weights.fill(min);
        }
    }

    /// Nguyen-Widrow initialisation.
    ///
    /// Each neuron's incoming feed weights are drawn from `[-0.5, 0.5)` and
    /// rescaled to norm `0.7 * h^(1/n)`, where `h` is the neuron's layer size
    /// and `n` the feed size of its source layer. Bias and context weights are
    /// drawn from `[-beta, beta)`.
    pub fn nguyen_widrow<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for to_layer in 0..self.layer_counts.len() - 1 {
            let from_layer = to_layer + 1;
            let to_count = self.layer_feed_counts[to_layer];
            let from_feed = self.layer_feed_counts[from_layer];
            let from_total = self.layer_counts[from_layer];
            let beta = 0.7 * (to_count as f64).powf(1.0 / from_feed as f64);

            let base = self.weight_index[to_layer];
            for to in 0..to_count {
                let row = &mut self.weights[base + to * from_total..base + (to + 1) * from_total];
                for w in row[..from_feed].iter_mut() {
                    *w = rng.gen_range(-0.5..0.5);
                }
                let norm = row[..from_feed].iter().map(|w| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for w in row[..from_feed].iter_mut() {
                        *w *= beta / norm;
                    }
                }
                for w in row[from_feed..].iter_mut() {
                    *w = rng.gen_range(-beta..beta);
                }
            }
        }
    }

    /// Mean squared error of the network over a training set.
    pub fn calculate_error(&self, training: &dyn TrainingSet) -> FlatResult<f64> {
        let mut state = self.create_state();
        let mut pair = TrainingPair::new(training.input_size(), training.ideal_size());
        let mut actual = vec![0.0; self.output_count];
        let mut error = ErrorCalculation::new();

        for index in 0..training.count() {
            training.record(index, &mut pair)?;
            self.compute_with(&self.weights, &pair.input, &mut actual, &mut state);
            error.update(&actual, &pair.ideal, pair.significance);
        }
        Ok(error.mse())
    }

    /// Flat weight vector, in the network's own index order.
    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Replaces the weight vector.
    ///
    /// # Errors
    ///
    /// [`FlatError::ShapeMismatch`] if the length differs from
    /// [`weight_count`](Self::weight_count).
    pub fn set_weights(&mut self, weights: &[f64]) -> FlatResult<()> {
        if weights.len() != self.weights.len() {
            return Err(FlatError::shape_mismatch(
                &[self.weights.len()],
                &[weights.len()],
            ));
        }
        self.weights.copy_from_slice(weights);
        Ok(())
    }

    /// Offset of the weight from `from_neuron` of descriptor layer
    /// `from_layer` to `to_neuron` of layer `from_layer + 1`.
    ///
    /// `from_neuron` may address bias and context slots (`0..total`).
    pub fn weight_offset(
        &self,
        from_layer: usize,
        from_neuron: usize,
        to_neuron: usize,
    ) -> FlatResult<usize> {
        let n = self.layer_counts.len();
        if from_layer + 1 >= n {
            return Err(FlatError::topology(format!(
                "layer {} has no outgoing weights",
                from_layer
            )));
        }
        let from = n - from_layer - 1;
        let to = from - 1;
        if from_neuron >= self.layer_counts[from] || to_neuron >= self.layer_feed_counts[to] {
            return Err(FlatError::shape_mismatch(
                &[self.layer_counts[from], self.layer_feed_counts[to]],
                &[from_neuron, to_neuron],
            ));
        }
        Ok(self.weight_index[to] + from_neuron + to_neuron * self.layer_counts[from])
    }

    /// Weight between two neurons, addressed by descriptor layer.
    pub fn weight(&self, from_layer: usize, from_neuron: usize, to_neuron: usize) -> FlatResult<f64> {
        Ok(self.weights[self.weight_offset(from_layer, from_neuron, to_neuron)?])
    }

    /// Sets the weight between two neurons, addressed by descriptor layer.
    pub fn set_weight(
        &mut self,
        from_layer: usize,
        from_neuron: usize,
        to_neuron: usize,
        value: f64,
    ) -> FlatResult<()> {
        let offset = self.weight_offset(from_layer, from_neuron, to_neuron)?;
        self.weights[offset] = value;
        Ok(())
    }

    /// Input feed neurons.
    #[inline]
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    /// Output feed neurons.
    #[inline]
    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// Number of layers, input and output included.
    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layer_counts.len()
    }

    /// Total neuron slots (feed, bias and context).
    #[inline]
    pub fn neuron_count(&self) -> usize {
        self.layer_counts.iter().sum()
    }

    /// Total weights.
    #[inline]
    pub fn weight_count(&self) -> usize {
        self.weights.len()
    }

    /// Whether any layer feeds context slots.
    #[inline]
    pub fn has_context(&self) -> bool {
        self.has_context
    }

    /// Per-layer slot counts, output-first.
    pub fn layer_counts(&self) -> &[usize] {
        &self.layer_counts
    }

    /// Per-layer feed counts, output-first.
    pub fn layer_feed_counts(&self) -> &[usize] {
        &self.layer_feed_counts
    }

    /// Per-layer context counts, output-first.
    pub fn layer_context_counts(&self) -> &[usize] {
        &self.layer_context_counts
    }

    /// Per-layer neuron offsets, output-first.
    pub fn layer_index(&self) -> &[usize] {
        &self.layer_index
    }

    /// Per-layer weight offsets, output-first. The last entry equals the
    /// weight count.
    pub fn weight_index(&self) -> &[usize] {
        &self.weight_index
    }

    /// Per-layer activations, output-first.
    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }

    /// Per-layer bias activations, output-first.
    pub fn bias_activation(&self) -> &[f64] {
        &self.bias_activation
    }

    /// Fails with [`FlatError::NoDerivative`] naming the first non-input
    /// activation that has no analytic derivative.
    pub fn check_derivatives(&self) -> FlatResult<()> {
        match self.activations[..self.activations.len() - 1]
            .iter()
            .find(|a| !a.has_derivative())
        {
            Some(act) => Err(FlatError::NoDerivative(act.name())),
            None => Ok(()),
        }
    }

    /// Neuron outputs of the last [`compute`](Self::compute).
    pub fn layer_output(&self) -> &[f64] {
        self.state.layer_output()
    }

    /// Pre-activation sums of the last [`compute`](Self::compute).
    pub fn layer_sums(&self) -> &[f64] {
        self.state.layer_sums()
    }
}

fn validate_layers(layers: &[FlatLayer]) -> FlatResult<()> {
    if layers.len() < 2 {
        return Err(FlatError::topology(format!(
            "need at least 2 layers, got {}",
            layers.len()
        )));
    }
    let mut fed = vec![false; layers.len()];
    for (i, layer) in layers.iter().enumerate() {
        if layer.count == 0 {
            return Err(FlatError::topology(format!("layer {} has no neurons", i)));
        }
        if !layer.bias_activation.is_finite() {
            return Err(FlatError::topology(format!(
                "layer {} has a non-finite bias activation",
                i
            )));
        }
        if let Some(src) = layer.context_source {
            if src >= layers.len() {
                return Err(FlatError::topology(format!(
                    "layer {} takes context from missing layer {}",
                    i, src
                )));
            }
            if fed[src] {
                return Err(FlatError::topology(format!(
                    "layer {} already feeds another context",
                    src
                )));
            }
            fed[src] = true;
        }
    }
    Ok(())
}

/// Dot product of a weight row with a slice of neuron outputs.
#[inline]
fn weighted_sum(weights: &[f64], inputs: &[f64]) -> f64 {
    debug_assert_eq!(weights.len(), inputs.len());

    let chunks = weights.len() / 4;
    let mut acc = f64x4::splat(0.0);
    for chunk in 0..chunks {
        let i = chunk * 4;
        let w = f64x4::new([weights[i], weights[i + 1], weights[i + 2], weights[i + 3]]);
        let x = f64x4::new([inputs[i], inputs[i + 1], inputs[i + 2], inputs[i + 3]]);
        acc += w * x;
    }

    let mut sum: f64 = acc.to_array().iter().sum();
    for i in (chunks * 4)..weights.len() {
        sum += weights[i] * inputs[i];
    }
    sum
}
