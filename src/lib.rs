//! # flatlm - Flat Networks with Levenberg-Marquardt Training
//!
//! Packed-array feed-forward (and Elman recurrent) networks, trained by a
//! multi-threaded Levenberg-Marquardt optimizer or by first-order
//! propagation.
//!
//! ## Architecture
//! - All neuron outputs in one array, all weights in another, indexed by
//!   per-layer offset tables (output layer first)
//! - Row-major weight layout: `[to_neuron][from_neuron]` per layer
//! - Training set sharded over a fixed rayon pool; workers own their scratch
//! - Dense LU/QR solvers for the damped Gauss-Newton step
//!
//! ## Usage
//! ```rust
//! use flatlm::train::{LevenbergMarquardt, Train};
//! use flatlm::{Activation, BasicTrainingSet, FlatNetwork, LmConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut network =
//!     FlatNetwork::feedforward(1, &[4], 1, Activation::Tanh, Activation::Linear).unwrap();
//! network.nguyen_widrow(&mut StdRng::seed_from_u64(1));
//!
//! let inputs: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 / 10.0]).collect();
//! let ideals: Vec<Vec<f64>> = inputs.iter().map(|x| vec![x[0] * x[0]]).collect();
//! let training = BasicTrainingSet::from_rows(&inputs, &ideals).unwrap();
//!
//! let config = LmConfig::builder().threads(2).build().unwrap();
//! let mut train = LevenbergMarquardt::new(network, &training, config).unwrap();
//! train.iteration().unwrap();
//!
//! let mut network = train.into_network();
//! let mut output = [0.0];
//! network.compute(&[0.5], &mut output);
//! ```

pub mod activation;
pub mod config;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod matrix;
pub mod network;
pub mod state;
pub mod train;

// Re-exports
pub use activation::Activation;
pub use config::{
    ConfigError, HessianStrategy, LmConfig, PropagationConfig, RpropVariant, UpdateRule,
    FLAT_SPOT,
};
pub use data::{BasicTrainingSet, TrainingPair, TrainingSet};
pub use error::{FlatError, FlatResult};
pub use layer::FlatLayer;
pub use loss::{ErrorCalculation, ErrorFunction};
pub use matrix::{LuDecomposition, Matrix, QrDecomposition};
pub use network::FlatNetwork;
pub use state::NeuronState;
pub use train::{LevenbergMarquardt, Propagation, Train};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
