//! Dataset partitioners
//!
//! A partitioner turns one [`Dataset`](crate::dataset::Dataset) into a
//! [`ResampleSet`]: an ordered collection of analysis/assessment index pairs
//! sharing one generation scheme and one seed. Regenerating with identical
//! parameters yields an identical set, every scheme draws from a seeded
//! `Xoshiro256PlusPlus`.
//!
//! Supported schemes are k-fold (optionally stratified and repeated),
//! bootstrap, Monte Carlo and rolling-origin splitting:
//!
//! ```
//! use retune::prelude::*;
//! use ndarray::{Array1, Array2};
//!
//! let dataset = Dataset::new(Array2::<f64>::zeros((20, 2)), Array1::zeros(20));
//! let folds = KFold::params(5).seed(42).check().unwrap().partition(&dataset).unwrap();
//! assert_eq!(folds.len(), 5);
//! ```

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

mod algorithm;
mod hyperparams;

pub use hyperparams::{
    Bootstrap, BootstrapParams, BootstrapValidParams, KFold, KFoldParams, KFoldValidParams,
    MonteCarlo, MonteCarloParams, MonteCarloValidParams, RollingOrigin, RollingOriginParams,
    RollingOriginValidParams,
};

/// One analysis/assessment pair of row indices
///
/// Analysis and assessment are disjoint for every scheme except bootstrap,
/// where the analysis multiset is drawn with replacement and the assessment
/// holds the rows never drawn (possibly none).
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    id: usize,
    analysis: Vec<usize>,
    assessment: Vec<usize>,
}

impl Split {
    pub(crate) fn new(id: usize, analysis: Vec<usize>, assessment: Vec<usize>) -> Self {
        Split {
            id,
            analysis,
            assessment,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn analysis(&self) -> &[usize] {
        &self.analysis
    }

    pub fn assessment(&self) -> &[usize] {
        &self.assessment
    }
}

/// An ordered, immutable collection of splits
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResampleSet {
    splits: Vec<Split>,
    scheme: String,
    seed: u64,
}

impl ResampleSet {
    pub(crate) fn new(splits: Vec<Split>, scheme: String, seed: u64) -> Self {
        ResampleSet {
            splits,
            scheme,
            seed,
        }
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<Split> {
        self.splits.iter()
    }

    /// Human readable description of the generating scheme
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl<'a> IntoIterator for &'a ResampleSet {
    type Item = &'a Split;
    type IntoIter = std::slice::Iter<'a, Split>;

    fn into_iter(self) -> Self::IntoIter {
        self.splits.iter()
    }
}
