//! Unified error types for flatlm.
//!
//! This module provides [`FlatError`], the single error type returned by
//! network construction, the linear solvers and the trainers. It uses the
//! `thiserror` crate for ergonomic error handling.
//!
//! # Example
//!
//! ```rust
//! use flatlm::FlatError;
//!
//! fn validate_shape(expected: &[usize], got: &[usize]) -> Result<(), FlatError> {
//!     if expected != got {
//!         return Err(FlatError::ShapeMismatch {
//!             expected: expected.to_vec(),
//!             got: got.to_vec(),
//!         });
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for flatlm operations.
#[derive(Error, Debug)]
pub enum FlatError {
    /// Shape mismatch between expected and actual dimensions.
    ///
    /// Raised when a training set does not match the network's input/output
    /// counts, when a weight vector has the wrong length, or when matrix
    /// dimensions are incompatible.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape received.
        got: Vec<usize>,
    },

    /// Layer descriptors do not describe a valid network.
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// The training set holds no records.
    #[error("Training set is empty")]
    EmptyTrainingSet,

    /// Record index outside the training set.
    #[error("Record index {index} out of bounds (count: {count})")]
    RecordOutOfBounds {
        /// Requested index.
        index: usize,
        /// Number of records in the set.
        count: usize,
    },

    /// Attempted to solve a system whose LU factorisation has a zero pivot.
    #[error("Matrix is singular")]
    SingularMatrix,

    /// Attempted a least-squares solve with a rank-deficient QR factorisation.
    #[error("Matrix is rank deficient")]
    RankDeficient,

    /// A worker failed while processing its shard.
    ///
    /// The pass that produced this error is discarded as a whole.
    #[error("Worker for records {low}..{high} failed: {reason}")]
    Worker {
        /// First record of the shard.
        low: usize,
        /// One past the last record of the shard.
        high: usize,
        /// What went wrong.
        reason: String,
    },

    /// NaN or infinity produced during training.
    #[error("Non-finite value encountered in {context}")]
    NonFinite {
        /// Where the value was observed: "output", "gradient", "error".
        context: String,
    },

    /// The configured activation cannot be differentiated analytically.
    #[error("Activation {0} has no derivative; use the finite-difference Hessian")]
    NoDerivative(&'static str),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The worker thread pool could not be created.
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// I/O error from a storage-backed training set.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for flatlm operations.
pub type FlatResult<T> = Result<T, FlatError>;

impl FlatError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        FlatError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Creates an invalid topology error.
    pub fn topology<S: Into<String>>(msg: S) -> Self {
        FlatError::InvalidTopology(msg.into())
    }

    /// Creates a record out of bounds error.
    pub fn record_out_of_bounds(index: usize, count: usize) -> Self {
        FlatError::RecordOutOfBounds { index, count }
    }

    /// Creates a worker fault for the shard `low..high`.
    pub fn worker<S: Into<String>>(low: usize, high: usize, reason: S) -> Self {
        FlatError::Worker {
            low,
            high,
            reason: reason.into(),
        }
    }

    /// Creates a non-finite value error.
    pub fn non_finite<S: Into<String>>(context: S) -> Self {
        FlatError::NonFinite {
            context: context.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch() {
        let err = FlatError::shape_mismatch(&[2, 1], &[3, 1]);
        let msg = err.to_string();
        assert!(msg.contains("Shape mismatch"));
        assert!(msg.contains("[2, 1]"));
        assert!(msg.contains("[3, 1]"));
    }

    #[test]
    fn test_worker_error() {
        let err = FlatError::worker(10, 20, "record read failed");
        let msg = err.to_string();
        assert!(msg.contains("10..20"));
        assert!(msg.contains("record read failed"));
    }

    #[test]
    fn test_config_error() {
        let err: FlatError = ConfigError::InvalidLambda(-1.0).into();
        assert!(err.to_string().contains("Configuration error"));
    }
}
