//! k-nearest-neighbour regression
//!
//! Brute force neighbour search over the analysis subset, predicting the
//! mean outcome of the `k` closest rows. Cheap, nonlinear and with a single
//! integer hyperparameter, which makes it the natural second member for
//! stacked ensembles.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::dataset::Float;
use crate::error::{Error, Result};
use crate::hyperparams::Config;
use crate::param_guard::ParamGuard;
use crate::traits::{ModelFamily, Regressor};

pub struct KnnRegressor;

impl KnnRegressor {
    /// Create a default parameter set with `k = 5`
    pub fn params() -> KnnParams {
        KnnParams(KnnValidParams { k: 5 })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnnValidParams {
    k: usize,
}

impl KnnValidParams {
    pub fn k(&self) -> usize {
        self.k
    }

    /// Fit by memorizing the analysis subset
    pub fn fit<F: Float>(
        &self,
        records: ArrayView2<F>,
        targets: ArrayView1<F>,
    ) -> Result<FittedKnn<F>> {
        if records.nrows() == 0 {
            return Err(Error::NotEnoughSamples);
        }
        if self.k > records.nrows() {
            return Err(Error::Parameters(format!(
                "k = {} exceeds the {} analysis rows",
                self.k,
                records.nrows()
            )));
        }

        Ok(FittedKnn {
            records: records.to_owned(),
            targets: targets.to_owned(),
            k: self.k,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnnParams(KnnValidParams);

impl KnnParams {
    /// Number of neighbours averaged per prediction
    pub fn k(mut self, k: usize) -> Self {
        self.0.k = k;
        self
    }
}

impl ParamGuard for KnnParams {
    type Checked = KnnValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.k == 0 {
            Err(Error::Parameters(
                "at least one neighbour is required".to_string(),
            ))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedKnn<F> {
    records: Array2<F>,
    targets: Array1<F>,
    k: usize,
}

impl<F: Float> Regressor<F> for FittedKnn<F> {
    fn predict(&self, records: ArrayView2<F>) -> Array1<F> {
        let mut predictions = Array1::zeros(records.nrows());
        let mut distances: Vec<(F, usize)> = Vec::with_capacity(self.records.nrows());

        for (row, query) in records.rows().into_iter().enumerate() {
            distances.clear();
            for (neighbour, candidate) in self.records.rows().into_iter().enumerate() {
                let dist = query
                    .iter()
                    .zip(candidate.iter())
                    .map(|(&a, &b)| (a - b) * (a - b))
                    .sum::<F>();
                distances.push((dist, neighbour));
            }
            distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

            let total: F = distances[..self.k]
                .iter()
                .map(|&(_, neighbour)| self.targets[neighbour])
                .sum();
            predictions[row] = total / F::cast(self.k);
        }

        predictions
    }
}

/// The k-nearest-neighbour family as seen by the evaluation machinery
///
/// The single recognized hyperparameter is `k`, rounded to the nearest
/// integer since configurations carry floats.
#[derive(Debug, Clone, Default)]
pub struct KnnFamily;

impl KnnFamily {
    pub fn new() -> Self {
        KnnFamily
    }
}

impl<F: Float> ModelFamily<F> for KnnFamily {
    fn name(&self) -> &str {
        "nearest_neighbours"
    }

    fn fit(
        &self,
        config: &Config<F>,
        records: ArrayView2<F>,
        targets: ArrayView1<F>,
    ) -> Result<Box<dyn Regressor<F>>> {
        let mut params = KnnRegressor::params();
        if let Some(k) = config.try_get("k") {
            params = params.k(k.round().as_());
        }

        let fitted = params.check()?.fit(records, targets)?;
        Ok(Box::new(fitted))
    }
}
