//! Error types in retune
//!
//! Invalid inputs are rejected eagerly, before any fitting work begins. A
//! model that fails to fit on one analysis subset is *not* an error; it is
//! recorded as a [`FitFailure`](crate::evaluate::FitFailure) and contained at
//! the orchestrator boundary.

use thiserror::Error;

use ndarray::ShapeError;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid parameter {0}")]
    Parameters(String),
    #[error("invalid partition: {0}")]
    Partition(String),
    #[error("unknown hyperparameter {0}")]
    UnknownHyperParam(String),
    #[error("hyperparameter {0} is still marked as tunable")]
    UnresolvedHyperParam(String),
    #[error("every candidate configuration failed, no ranking is possible")]
    AllConfigurationsFailed,
    #[error("not enough samples")]
    NotEnoughSamples,
    #[error("invalid ndarray shape {0}")]
    NdShape(#[from] ShapeError),
}
