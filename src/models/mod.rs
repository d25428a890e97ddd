//! Model families shipped with the engine
//!
//! Anything implementing [`ModelFamily`](crate::traits::ModelFamily) plugs
//! into the evaluation machinery; these two cover the linear/regularized and
//! the nonlinear end of the spectrum.

mod elastic_net;
mod knn;

pub use elastic_net::{
    ElasticNet, ElasticNetFamily, ElasticNetParams, ElasticNetValidParams, FittedElasticNet,
};
pub use knn::{FittedKnn, KnnFamily, KnnParams, KnnRegressor, KnnValidParams};
