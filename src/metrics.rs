//! Common metrics for regression
//!
//! Metrics are named so they can be requested per evaluation run and carried
//! through records and summaries. Each knows its optimization direction,
//! which is what ranking and racing consult.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use ndarray::ArrayView1;

use crate::dataset::Float;

/// Whether smaller or larger values of a metric are better
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Minimize,
    Maximize,
}

impl Direction {
    /// Is `a` strictly better than `b`?
    pub fn improves<F: Float>(&self, a: F, b: F) -> bool {
        match self {
            Direction::Minimize => a < b,
            Direction::Maximize => a > b,
        }
    }
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Root of the mean squared error
    Rmse,
    /// Mean absolute error
    Mae,
    /// Proportion of outcome variance explained by the prediction
    R2,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Rmse => "rmse",
            Metric::Mae => "mae",
            Metric::R2 => "r2",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Metric::Rmse | Metric::Mae => Direction::Minimize,
            Metric::R2 => Direction::Maximize,
        }
    }

    /// Compare a prediction against the true outcomes
    ///
    /// # Panics
    ///
    /// When the two arrays differ in length or are empty.
    pub fn compute<F: Float>(&self, prediction: ArrayView1<F>, truth: ArrayView1<F>) -> F {
        assert_eq!(
            prediction.len(),
            truth.len(),
            "prediction and truth must have the same length"
        );
        assert!(!truth.is_empty(), "cannot score an empty assessment set");

        match self {
            Metric::Rmse => {
                let mse = (&prediction - &truth).mapv(|x| x * x).mean().unwrap();
                mse.sqrt()
            }
            Metric::Mae => (&prediction - &truth).mapv(|x| x.abs()).mean().unwrap(),
            Metric::R2 => {
                let mean = truth.mean().unwrap();
                F::one()
                    - (&prediction - &truth).mapv(|x| x * x).sum()
                        / (truth.mapv(|x| (x - mean) * (x - mean)).sum() + F::cast(1e-10))
            }
        }
    }
}
