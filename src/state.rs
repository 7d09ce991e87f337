//! Per-evaluator neuron state.
//!
//! A forward pass writes every neuron's pre-activation sum and output into a
//! [`NeuronState`]. The network keeps one for its own
//! [`compute`](crate::FlatNetwork::compute); every training worker owns a
//! private one so the shared network is only ever read.
//!
//! # Reuse Pattern
//!
//! ```rust
//! use flatlm::{Activation, FlatNetwork};
//!
//! let network = FlatNetwork::feedforward(2, &[3], 1, Activation::Tanh, Activation::Linear).unwrap();
//!
//! // Allocate once, reuse for every record
//! let mut state = network.create_state();
//! let mut output = [0.0];
//! for input in [[0.0, 1.0], [1.0, 0.0]] {
//!     network.compute_with(network.weights(), &input, &mut output, &mut state);
//! }
//! ```
//!
//! States are NOT shared between threads; each thread holds its own. The
//! context slots of a recurrent network live here too, so two states
//! evaluating the same records in a different order may diverge.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Neuron outputs and pre-activation sums, laid out like the network's
/// neuron index (output layer first).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NeuronState {
    pub(crate) layer_output: Vec<f64>,
    pub(crate) layer_sums: Vec<f64>,
}

impl NeuronState {
    pub(crate) fn new(neuron_count: usize) -> Self {
        Self {
            layer_output: vec![0.0; neuron_count],
            layer_sums: vec![0.0; neuron_count],
        }
    }

    /// Post-activation output of every neuron.
    #[inline]
    pub fn layer_output(&self) -> &[f64] {
        &self.layer_output
    }

    /// Pre-activation sum of every neuron.
    #[inline]
    pub fn layer_sums(&self) -> &[f64] {
        &self.layer_sums
    }

    /// Number of neuron slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.layer_output.len()
    }

    /// Is empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layer_output.is_empty()
    }
}
