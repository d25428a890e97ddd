//! Datasets
//!
//! The [`Dataset`] struct is the immutable table every evaluation run starts
//! from: a two-dimensional record matrix, one outcome column and optional
//! feature names. Splits refer to it by row index only, so the row count and
//! column identity stay fixed for the lifetime of a resample set.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, ScalarOperand};

use num_traits::{AsPrimitive, FromPrimitive, NumAssignOps, NumCast, Signed};
use rand::distributions::uniform::SampleUniform;

use std::fmt;
use std::iter::Sum;

/// Floating point numbers
///
/// This trait bound multiplexes to the most common assumptions on floating
/// point numbers and implements them for 32bit and 64bit floats. They are
/// used in records and targets of a dataset and in every metric value.
pub trait Float:
    FromPrimitive
    + num_traits::Float
    + PartialOrd
    + Sync
    + Send
    + Default
    + fmt::Display
    + fmt::Debug
    + Signed
    + Sum
    + NumAssignOps
    + AsPrimitive<usize>
    + SampleUniform
    + ScalarOperand
    + approx::AbsDiffEq<Epsilon = Self>
    + 'static
{
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}
impl Float for f64 {}

/// Dataset
///
/// A number of records stored as an `Array2` with dimensionality
/// `(nsamples, nfeatures)` and one continuous outcome per record. Feature
/// names are optional and copied when subsets are created.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<F> {
    records: Array2<F>,
    targets: Array1<F>,
    feature_names: Vec<String>,
}

impl<F: Float> Dataset<F> {
    /// Create a new dataset from a record matrix and an outcome vector
    ///
    /// # Panics
    ///
    /// When the number of records and the number of outcomes disagree.
    pub fn new(records: Array2<F>, targets: Array1<F>) -> Self {
        assert_eq!(
            records.nrows(),
            targets.len(),
            "records and targets must contain the same number of samples"
        );

        Dataset {
            records,
            targets,
            feature_names: Vec::new(),
        }
    }

    /// Updates the feature names of the dataset
    pub fn with_feature_names<I: Into<String>>(mut self, names: Vec<I>) -> Self {
        assert_eq!(
            names.len(),
            self.records.ncols(),
            "one feature name per record column is required"
        );

        self.feature_names = names.into_iter().map(|x| x.into()).collect();
        self
    }

    pub fn nsamples(&self) -> usize {
        self.records.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.records.ncols()
    }

    pub fn records(&self) -> ArrayView2<F> {
        self.records.view()
    }

    pub fn targets(&self) -> ArrayView1<F> {
        self.targets.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Copy out the rows at `indices`, in order
    ///
    /// Bootstrap analysis sets contain repeated indices, so the returned
    /// subset may be larger than the number of distinct rows.
    pub fn select(&self, indices: &[usize]) -> (Array2<F>, Array1<F>) {
        (
            self.records.select(Axis(0), indices),
            self.targets.select(Axis(0), indices),
        )
    }
}

impl<F: Float> From<(Array2<F>, Array1<F>)> for Dataset<F> {
    fn from(rec_tar: (Array2<F>, Array1<F>)) -> Self {
        Dataset::new(rec_tar.0, rec_tar.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn select_copies_rows_in_order() {
        let dataset = Dataset::new(
            array![[1., 2.], [3., 4.], [5., 6.], [7., 8.]],
            array![10., 20., 30., 40.],
        );

        let (records, targets) = dataset.select(&[2, 0, 2]);
        assert_eq!(records, array![[5., 6.], [1., 2.], [5., 6.]]);
        assert_eq!(targets, array![30., 10., 30.]);
    }

    #[test]
    fn feature_names_are_kept() {
        let dataset = Dataset::new(array![[1., 2.], [3., 4.]], array![0., 1.])
            .with_feature_names(vec!["area", "age"]);

        assert_eq!(dataset.feature_names(), &["area", "age"]);
        assert_eq!(dataset.nsamples(), 2);
        assert_eq!(dataset.nfeatures(), 2);
    }

    #[test]
    #[should_panic]
    fn mismatched_targets_panic() {
        let _ = Dataset::new(array![[1., 2.], [3., 4.]], array![0., 1., 2.]);
    }
}
