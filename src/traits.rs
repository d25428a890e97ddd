//! Capability traits at the engine's seams
//!
//! The evaluation machinery never names a concrete model. It depends on the
//! pair of capabilities below: configure-and-fit on an analysis subset,
//! predict on new rows. Swapping a linear model for a nearest-neighbour
//! model is implementing these two traits.

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::dataset::Float;
use crate::error::Result;
use crate::hyperparams::Config;

/// A fitted model which maps record rows to predicted outcomes
pub trait Regressor<F: Float>: Send + Sync {
    fn predict(&self, records: ArrayView2<F>) -> Array1<F>;
}

/// A model family which can be fitted on an analysis subset
///
/// The family owns its defaults; `config` carries the resolved values of
/// every hyperparameter a [`ModelSpec`](crate::hyperparams::ModelSpec)
/// declared for it. A family must not read anything besides its arguments,
/// evaluation cells call `fit` concurrently.
pub trait ModelFamily<F: Float>: Send + Sync {
    /// Name of the family, used to tag records and blended members
    fn name(&self) -> &str;

    /// Fit one model on the (already preprocessed) analysis subset
    fn fit(
        &self,
        config: &Config<F>,
        records: ArrayView2<F>,
        targets: ArrayView1<F>,
    ) -> Result<Box<dyn Regressor<F>>>;
}
