//! `retune` is a resampling-based model evaluation and selection engine.
//!
//! It covers the loop every careful modeling workflow repeats: partition a
//! dataset into analysis/assessment splits, fit a preprocessing pipeline and
//! a model configuration on the analysis side of each split, score the
//! assessment side, and aggregate the per-split metrics into comparable
//! summaries. On top of that loop sit interchangeable hyperparameter search
//! strategies (exhaustive grids, surrogate-guided iterative search, racing
//! with early elimination) and a stacked ensemble blender over out-of-fold
//! predictions.
//!
//! The statistical models themselves are deliberately exchangeable: the
//! engine only depends on the [`ModelFamily`](traits::ModelFamily) and
//! [`Regressor`](traits::Regressor) capabilities, and ships an elastic net
//! and a nearest-neighbour family as working members.
//!
//! ```
//! use retune::prelude::*;
//! use ndarray::{Array1, Array2};
//!
//! // ten rows of one feature, outcome equals the feature
//! let records = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
//! let dataset = Dataset::new(records, Array1::from_shape_fn(10, |i| i as f64));
//!
//! let folds = KFold::params(5).seed(42).check_unwrap().partition(&dataset).unwrap();
//! let spec = ModelSpec::new(ElasticNetFamily::linear());
//! let run = fit_resamples(
//!     &dataset,
//!     &folds,
//!     &Pipeline::new(),
//!     &spec,
//!     &Evaluation::new(vec![Metric::Rmse]),
//! )
//! .unwrap();
//!
//! let summary = run.summary(0, Metric::Rmse).unwrap();
//! assert!(summary.mean() < 1e-6);
//! ```

pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod evaluate;
pub mod hyperparams;
pub mod metrics;
pub mod models;
mod param_guard;
pub mod pipeline;
pub mod resampling;
pub mod search;
pub mod traits;

pub use dataset::{Dataset, Float};
pub use error::{Error, Result};
pub use param_guard::ParamGuard;

/// Common imports
pub mod prelude {
    pub use crate::dataset::{Dataset, Float};
    pub use crate::ensemble::{Blended, Blender, Member};
    pub use crate::evaluate::{
        fit_grid, fit_resamples, Evaluation, FitFailure, MetricRecord, PerformanceSummary,
        ResampleRun,
    };
    pub use crate::hyperparams::{Config, HyperValue, ModelSpec, ParamRange, Scale};
    pub use crate::metrics::{Direction, Metric};
    pub use crate::models::{ElasticNet, ElasticNetFamily, KnnFamily, KnnRegressor};
    pub use crate::param_guard::ParamGuard;
    pub use crate::pipeline::{FittedPipeline, MinMax, Pipeline, Standardize};
    pub use crate::resampling::{
        Bootstrap, KFold, MonteCarlo, ResampleSet, RollingOrigin, Split,
    };
    pub use crate::search::{
        space_filling, BayesSearch, Candidate, CandidatePool, CandidateState, GridSearch,
        GridSpec, RaceSearch, SearchOutcome, TuneResult,
    };
    pub use crate::traits::{ModelFamily, Regressor};
}
