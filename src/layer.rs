//! Layer descriptors for building a [`FlatNetwork`](crate::FlatNetwork).
//!
//! A descriptor names how many neurons a layer has, which activation it
//! applies, whether it carries a bias slot, and optionally which other layer
//! feeds its context (recurrent) slots.
//!
//! # Slot Layout
//!
//! Within the flattened neuron array each layer occupies
//! `[feed..., bias?, context...]`:
//!
//! - `count` feed neurons, computed from the previous layer
//! - one bias neuron when `bias_activation != 0`, held at that value
//! - one context neuron per feed neuron of `context_source`, loaded from the
//!   source's previous outputs at the start of every forward pass

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::activation::Activation;

/// Descriptor of a single layer, listed input-first.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlatLayer {
    /// Number of feed neurons.
    pub count: usize,
    /// Activation applied to the feed neurons.
    pub activation: Activation,
    /// Constant output of the bias neuron. 0 means no bias neuron.
    pub bias_activation: f64,
    /// Index (in the descriptor list) of the layer whose outputs are copied
    /// into this layer's context slots.
    pub context_source: Option<usize>,
}

impl FlatLayer {
    /// Layer with a bias neuron fixed at 1.
    pub fn new(count: usize, activation: Activation) -> Self {
        Self {
            count,
            activation,
            bias_activation: 1.0,
            context_source: None,
        }
    }

    /// Layer without a bias neuron.
    pub fn without_bias(count: usize, activation: Activation) -> Self {
        Self {
            bias_activation: 0.0,
            ..Self::new(count, activation)
        }
    }

    /// Declares that this layer's context slots are fed by layer `source`.
    pub fn with_context(mut self, source: usize) -> Self {
        self.context_source = Some(source);
        self
    }

    /// Whether the layer owns a bias neuron.
    #[inline]
    pub fn has_bias(&self) -> bool {
        self.bias_activation != 0.0
    }

    /// Context slots this layer carries, given the full descriptor list.
    pub fn context_count(&self, layers: &[FlatLayer]) -> usize {
        self.context_source
            .and_then(|src| layers.get(src))
            .map_or(0, |src| src.count)
    }

    /// Feed + bias + context slots.
    pub fn total_count(&self, layers: &[FlatLayer]) -> usize {
        self.count + usize::from(self.has_bias()) + self.context_count(layers)
    }
}
