//! Training data.
//!
//! Trainers consume records through the [`TrainingSet`] trait: a countable,
//! indexable collection of [`TrainingPair`]s. [`BasicTrainingSet`] keeps
//! everything in memory; storage-backed sets implement the same trait and
//! report read failures through [`FlatResult`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{FlatError, FlatResult};

/// One training record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainingPair {
    /// Input vector.
    pub input: Vec<f64>,
    /// Expected output vector.
    pub ideal: Vec<f64>,
    /// Sample weight applied to this record's error and gradient.
    pub significance: f64,
}

impl TrainingPair {
    /// Zeroed pair used as a reusable read buffer.
    pub fn new(input_size: usize, ideal_size: usize) -> Self {
        Self {
            input: vec![0.0; input_size],
            ideal: vec![0.0; ideal_size],
            significance: 1.0,
        }
    }

    /// Pair with significance 1.
    pub fn from_vecs(input: Vec<f64>, ideal: Vec<f64>) -> Self {
        Self {
            input,
            ideal,
            significance: 1.0,
        }
    }

    /// Sets the significance.
    pub fn with_significance(mut self, significance: f64) -> Self {
        self.significance = significance;
        self
    }
}

/// Countable, indexable source of training records.
///
/// `Sync` so that workers on different threads can read disjoint index
/// ranges at the same time.
pub trait TrainingSet: Sync {
    /// Number of records.
    fn count(&self) -> usize;

    /// Length of every input vector.
    fn input_size(&self) -> usize;

    /// Length of every ideal vector.
    fn ideal_size(&self) -> usize;

    /// Copies record `index` into `pair`, whose vectors are already sized
    /// `input_size` and `ideal_size`.
    fn record(&self, index: usize, pair: &mut TrainingPair) -> FlatResult<()>;
}

/// In-memory training set.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BasicTrainingSet {
    input_size: usize,
    ideal_size: usize,
    pairs: Vec<TrainingPair>,
}

impl BasicTrainingSet {
    /// Empty set with fixed vector sizes.
    pub fn new(input_size: usize, ideal_size: usize) -> Self {
        Self {
            input_size,
            ideal_size,
            pairs: Vec::new(),
        }
    }

    /// Builds a set from parallel rows of inputs and ideals.
    ///
    /// # Errors
    ///
    /// [`FlatError::ShapeMismatch`] if the row counts differ or any row has a
    /// different length than the first.
    pub fn from_rows(inputs: &[Vec<f64>], ideals: &[Vec<f64>]) -> FlatResult<Self> {
        if inputs.len() != ideals.len() {
            return Err(FlatError::shape_mismatch(&[inputs.len()], &[ideals.len()]));
        }
        let input_size = inputs.first().map_or(0, Vec::len);
        let ideal_size = ideals.first().map_or(0, Vec::len);
        let mut set = Self::new(input_size, ideal_size);
        for (input, ideal) in inputs.iter().zip(ideals) {
            set.push(TrainingPair::from_vecs(input.clone(), ideal.clone()))?;
        }
        Ok(set)
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// [`FlatError::ShapeMismatch`] if the record's vector lengths differ from
    /// the set's.
    pub fn push(&mut self, pair: TrainingPair) -> FlatResult<()> {
        if pair.input.len() != self.input_size || pair.ideal.len() != self.ideal_size {
            return Err(FlatError::shape_mismatch(
                &[self.input_size, self.ideal_size],
                &[pair.input.len(), pair.ideal.len()],
            ));
        }
        self.pairs.push(pair);
        Ok(())
    }

    /// All records.
    pub fn pairs(&self) -> &[TrainingPair] {
        &self.pairs
    }

    /// Is empty?
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl TrainingSet for BasicTrainingSet {
    fn count(&self) -> usize {
        self.pairs.len()
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn ideal_size(&self) -> usize {
        self.ideal_size
    }

    fn record(&self, index: usize, pair: &mut TrainingPair) -> FlatResult<()> {
        let src = self
            .pairs
            .get(index)
            .ok_or_else(|| FlatError::record_out_of_bounds(index, self.pairs.len()))?;
        pair.input.copy_from_slice(&src.input);
        pair.ideal.copy_from_slice(&src.ideal);
        pair.significance = src.significance;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let set = BasicTrainingSet::from_rows(
            &[vec![0.0, 1.0], vec![1.0, 0.0]],
            &[vec![1.0], vec![0.0]],
        )
        .unwrap();
        assert_eq!(set.count(), 2);
        assert_eq!(set.input_size(), 2);
        assert_eq!(set.ideal_size(), 1);

        let mut pair = TrainingPair::new(2, 1);
        set.record(1, &mut pair).unwrap();
        assert_eq!(pair.input, vec![1.0, 0.0]);
        assert_eq!(pair.ideal, vec![0.0]);
        assert_eq!(pair.significance, 1.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result =
            BasicTrainingSet::from_rows(&[vec![0.0, 1.0], vec![1.0]], &[vec![1.0], vec![0.0]]);
        assert!(matches!(result, Err(FlatError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_record_out_of_bounds() {
        let set = BasicTrainingSet::new(1, 1);
        let mut pair = TrainingPair::new(1, 1);
        assert!(matches!(
            set.record(0, &mut pair),
            Err(FlatError::RecordOutOfBounds { index: 0, count: 0 })
        ));
    }
}
