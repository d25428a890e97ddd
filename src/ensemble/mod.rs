//! Stacked ensembles over out-of-fold predictions
//!
//! The blender turns the out-of-fold predictions of several tuned member
//! configurations into a feature matrix, row-aligned with the true outcome,
//! and fits a regularized linear meta-model on it. The meta penalty is
//! itself selected by an internal cross-validated grid search, and larger
//! penalties zero out more members, so ensemble membership is sparse. Every
//! member left with a nonzero weight is refitted on the full training set
//! before prediction.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView2};

use crate::dataset::{Dataset, Float};
use crate::error::{Error, Result};
use crate::evaluate::{fit_grid, Evaluation};
use crate::hyperparams::{Config, ModelSpec, ParamRange};
use crate::metrics::Metric;
use crate::models::{ElasticNet, ElasticNetFamily};
use crate::param_guard::ParamGuard;
use crate::pipeline::{FittedPipeline, Pipeline};
use crate::resampling::{KFold, ResampleSet};
use crate::search::{GridSearch, GridSpec};
use crate::traits::{ModelFamily, Regressor};

/// One ensemble member: a family with a fully resolved configuration
#[derive(Clone)]
pub struct Member<F: Float> {
    name: String,
    family: Arc<dyn ModelFamily<F>>,
    config: Config<F>,
}

impl<F: Float> Member<F> {
    /// Pair a specification with one resolved configuration
    pub fn new(name: impl Into<String>, spec: &ModelSpec<F>, config: Config<F>) -> Self {
        Member {
            name: name.into(),
            family: spec.family_arc(),
            config,
        }
    }

    /// Use a specification without tunables as a member
    pub fn from_spec(name: impl Into<String>, spec: &ModelSpec<F>) -> Result<Self> {
        Ok(Member {
            name: name.into(),
            family: spec.family_arc(),
            config: spec.fixed_config()?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config<F> {
        &self.config
    }
}

/// Configure and fit a stacked ensemble
///
/// ```no_run
/// use retune::prelude::*;
///
/// # fn run(dataset: &Dataset<f64>, folds: &ResampleSet, members: &[Member<f64>]) -> retune::error::Result<()> {
/// let blended = Blender::params()
///     .penalty_grid(vec![0.001, 0.01, 0.1])
///     .check()?
///     .blend(dataset, folds, &Pipeline::new(), members, &Evaluation::default())?;
/// for (name, weight) in blended.member_weights() {
///     println!("{}: {}", name, weight);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Blender;

impl Blender {
    pub fn params<F: Float>() -> BlenderParams<F> {
        BlenderParams(BlenderValidParams {
            penalty_grid: vec![
                F::cast(1e-6),
                F::cast(1e-4),
                F::cast(1e-2),
                F::cast(1e-1),
                F::one(),
            ],
            l1_ratio: F::one(),
            meta_folds: 5,
            seed: 0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BlenderValidParams<F> {
    penalty_grid: Vec<F>,
    l1_ratio: F,
    meta_folds: usize,
    seed: u64,
}

impl<F: Float> BlenderValidParams<F> {
    pub fn penalty_grid(&self) -> &[F] {
        &self.penalty_grid
    }

    pub fn l1_ratio(&self) -> F {
        self.l1_ratio
    }

    pub fn meta_folds(&self) -> usize {
        self.meta_folds
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Collect out-of-fold predictions, select the meta penalty, fit the
    /// meta-model and refit the surviving members on the full training set
    pub fn blend(
        &self,
        dataset: &Dataset<F>,
        resamples: &ResampleSet,
        pipeline: &Pipeline<F>,
        members: &[Member<F>],
        settings: &Evaluation,
    ) -> Result<Blended<F>> {
        if members.is_empty() {
            return Err(Error::Parameters(
                "at least one ensemble member is required".to_string(),
            ));
        }

        let nsamples = dataset.nsamples();
        let retaining = settings.clone().retain_predictions(true);

        let oof_columns: Vec<Vec<Option<F>>> = members
            .iter()
            .map(|member| {
                let run = fit_grid(
                    dataset,
                    resamples,
                    pipeline,
                    &*member.family,
                    std::slice::from_ref(&member.config),
                    &retaining,
                );
                run.out_of_fold(0, nsamples)
            })
            .collect();

        // rows where every member produced an out-of-fold prediction
        let rows: Vec<usize> = (0..nsamples)
            .filter(|&row| oof_columns.iter().all(|column| column[row].is_some()))
            .collect();
        if rows.len() < self.meta_folds {
            return Err(Error::NotEnoughSamples);
        }

        let meta_records = Array2::from_shape_fn((rows.len(), members.len()), |(i, j)| {
            oof_columns[j][rows[i]].unwrap()
        });
        let meta_targets: Array1<F> = rows.iter().map(|&row| dataset.targets()[row]).collect();
        let meta_dataset = Dataset::new(meta_records.clone(), meta_targets.clone());

        let penalty = self.select_penalty(&meta_dataset, settings)?;
        let meta = ElasticNet::params()
            .penalty(penalty)
            .l1_ratio(self.l1_ratio)
            .check()?
            .fit(meta_records.view(), meta_targets.view())?;

        // full refit of every member the meta-model kept
        let fitted_pipeline = pipeline.fit(dataset.records())?;
        let full_records = fitted_pipeline.transform(dataset.records().to_owned());
        let mut weights = Vec::with_capacity(members.len());
        let mut artifacts = Vec::with_capacity(members.len());
        for (member, &weight) in members.iter().zip(meta.weights()) {
            weights.push((member.name.clone(), weight));
            if weight != F::zero() {
                artifacts.push(Some(member.family.fit(
                    &member.config,
                    full_records.view(),
                    dataset.targets(),
                )?));
            } else {
                artifacts.push(None);
            }
        }

        Ok(Blended {
            pipeline: fitted_pipeline,
            weights,
            artifacts,
            intercept: meta.intercept(),
            penalty,
        })
    }

    fn select_penalty(&self, meta_dataset: &Dataset<F>, settings: &Evaluation) -> Result<F> {
        let mut distinct = self.penalty_grid.clone();
        distinct.sort_by(|a, b| a.partial_cmp(b).unwrap());
        distinct.dedup();
        if distinct.len() == 1 {
            return Ok(distinct[0]);
        }

        let range = ParamRange::linear(distinct[0], *distinct.last().unwrap());
        let meta_spec = ModelSpec::new(ElasticNetFamily::new())
            .fixed("l1_ratio", self.l1_ratio)
            .tunable("penalty", range);
        let folds = KFold::params(self.meta_folds)
            .seed(self.seed)
            .check()?
            .partition(meta_dataset)?;

        let result = GridSearch::params(GridSpec::new().levels("penalty", distinct))
            .metric(Metric::Rmse)
            .check()?
            .run(
                meta_dataset,
                &folds,
                &Pipeline::new(),
                &meta_spec,
                settings,
            )?;
        result.best_config().get("penalty")
    }
}

#[derive(Debug, Clone)]
pub struct BlenderParams<F>(BlenderValidParams<F>);

impl<F: Float> BlenderParams<F> {
    /// Penalty values the meta-model selects from
    pub fn penalty_grid(mut self, penalty_grid: Vec<F>) -> Self {
        self.0.penalty_grid = penalty_grid;
        self
    }

    /// L1 share of the meta penalty
    ///
    /// Defaults to `1.0` (lasso), which produces sparse memberships
    pub fn l1_ratio(mut self, l1_ratio: F) -> Self {
        self.0.l1_ratio = l1_ratio;
        self
    }

    /// Folds of the internal penalty selection
    ///
    /// Defaults to `5` if not set
    pub fn meta_folds(mut self, meta_folds: usize) -> Self {
        self.0.meta_folds = meta_folds;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float> ParamGuard for BlenderParams<F> {
    type Checked = BlenderValidParams<F>;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.penalty_grid.is_empty() {
            Err(Error::Parameters(
                "the penalty grid must not be empty".to_string(),
            ))
        } else if self.0.penalty_grid.iter().any(|p| p.is_negative()) {
            Err(Error::Parameters(
                "penalties must not be negative".to_string(),
            ))
        } else if !(F::zero()..=F::one()).contains(&self.0.l1_ratio) {
            Err(Error::Parameters(format!(
                "l1 ratio must lie in [0, 1], got {}",
                self.0.l1_ratio
            )))
        } else if self.0.meta_folds < 2 {
            Err(Error::Parameters(
                "penalty selection needs at least two folds".to_string(),
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

/// A fitted stacked ensemble
///
/// Member predictions on new rows come from the full-refit artifacts and are
/// combined with the meta-model's weights; members the meta-model zeroed out
/// carry no artifact at all.
pub struct Blended<F: Float> {
    pipeline: FittedPipeline<F>,
    weights: Vec<(String, F)>,
    artifacts: Vec<Option<Box<dyn Regressor<F>>>>,
    intercept: F,
    penalty: F,
}

impl<F: Float> Blended<F> {
    /// Meta-model weight per member, in member order
    pub fn member_weights(&self) -> &[(String, F)] {
        &self.weights
    }

    /// The penalty the internal grid search selected
    pub fn penalty(&self) -> F {
        self.penalty
    }

    pub fn intercept(&self) -> F {
        self.intercept
    }
}

impl<F: Float> Regressor<F> for Blended<F> {
    fn predict(&self, records: ArrayView2<F>) -> Array1<F> {
        let transformed = self.pipeline.transform(records.to_owned());
        let mut combined = Array1::from_elem(records.nrows(), self.intercept);
        for ((_, weight), artifact) in self.weights.iter().zip(&self.artifacts) {
            if let Some(artifact) = artifact {
                combined = combined + artifact.predict(transformed.view()) * *weight;
            }
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metric;
    use crate::models::KnnFamily;
    use ndarray::{Array1, ArrayView1, Axis};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// Deterministic predictions uncorrelated with any outcome
    struct NoiseFamily;

    struct NoiseModel;

    impl ModelFamily<f64> for NoiseFamily {
        fn name(&self) -> &str {
            "noise"
        }

        fn fit(
            &self,
            _config: &Config<f64>,
            _records: ArrayView2<f64>,
            _targets: ArrayView1<f64>,
        ) -> Result<Box<dyn Regressor<f64>>> {
            Ok(Box::new(NoiseModel))
        }
    }

    impl Regressor<f64> for NoiseModel {
        fn predict(&self, records: ArrayView2<f64>) -> Array1<f64> {
            records
                .rows()
                .into_iter()
                .map(|row| {
                    let x = row.sum() * 12.9898;
                    (x.sin() * 43758.5453).fract()
                })
                .collect()
        }
    }

    fn linear_dataset(seed: u64) -> Dataset<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let x = Array1::linspace(0., 10., 60);
        let noise: Array1<f64> = Array1::random_using(60, Normal::new(0., 0.2).unwrap(), &mut rng);
        let y = x.mapv(|v| 1. + 2. * v) + &noise;
        Dataset::new(x.insert_axis(Axis(1)), y)
    }

    fn members() -> Vec<Member<f64>> {
        vec![
            Member::from_spec("linear", &ModelSpec::new(ElasticNetFamily::linear())).unwrap(),
            Member::from_spec(
                "nearest_neighbours",
                &ModelSpec::new(KnnFamily::new()).fixed("k", 5.0),
            )
            .unwrap(),
            Member::from_spec("noise", &ModelSpec::new(NoiseFamily)).unwrap(),
        ]
    }

    fn folds(dataset: &Dataset<f64>) -> ResampleSet {
        KFold::params(5)
            .seed(9)
            .check()
            .unwrap()
            .partition(dataset)
            .unwrap()
    }

    #[test]
    fn lasso_blending_zeroes_the_noise_member() {
        let dataset = linear_dataset(21);
        let blended = Blender::params()
            .penalty_grid(vec![0.05, 0.2])
            .check()
            .unwrap()
            .blend(
                &dataset,
                &folds(&dataset),
                &Pipeline::new(),
                &members(),
                &Evaluation::default(),
            )
            .unwrap();

        let weights = blended.member_weights();
        assert_eq!(weights.len(), 3);
        assert_eq!(weights[2].0, "noise");
        assert_eq!(weights[2].1, 0.0);
        // the informative members carry the ensemble
        assert!(weights[0].1.abs() + weights[1].1.abs() > 0.5);
    }

    #[test]
    fn blended_predictions_track_the_outcome() {
        let dataset = linear_dataset(22);
        let blended = Blender::params()
            .penalty_grid(vec![0.001, 0.01, 0.1])
            .check()
            .unwrap()
            .blend(
                &dataset,
                &folds(&dataset),
                &Pipeline::new(),
                &members(),
                &Evaluation::default(),
            )
            .unwrap();

        let prediction = blended.predict(dataset.records());
        let rmse = Metric::Rmse.compute(prediction.view(), dataset.targets());
        assert!(rmse < 0.5, "rmse was {}", rmse);
    }

    #[test]
    fn single_member_blends_reduce_to_that_member() {
        let dataset = linear_dataset(23);
        let member =
            vec![Member::from_spec("linear", &ModelSpec::new(ElasticNetFamily::linear())).unwrap()];
        let blended = Blender::params()
            .penalty_grid(vec![0.001, 0.01])
            .check()
            .unwrap()
            .blend(
                &dataset,
                &folds(&dataset),
                &Pipeline::new(),
                &member,
                &Evaluation::default(),
            )
            .unwrap();

        assert!(blended.member_weights()[0].1.abs() > 0.5);
        let prediction = blended.predict(dataset.records());
        let rmse = Metric::Rmse.compute(prediction.view(), dataset.targets());
        assert!(rmse < 0.5);
    }

    #[test]
    fn blender_validation() {
        assert!(Blender::params::<f64>().penalty_grid(vec![]).check().is_err());
        assert!(Blender::params::<f64>()
            .penalty_grid(vec![-0.1])
            .check()
            .is_err());
        assert!(Blender::params::<f64>().l1_ratio(1.5).check().is_err());
        assert!(Blender::params::<f64>().meta_folds(1).check().is_err());

        let dataset = linear_dataset(24);
        let res = Blender::params()
            .check()
            .unwrap()
            .blend(
                &dataset,
                &folds(&dataset),
                &Pipeline::new(),
                &[],
                &Evaluation::default(),
            );
        assert!(res.is_err());
    }
}
