use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::{CandidatePool, SearchOutcome, TuneResult};
use crate::dataset::{Dataset, Float};
use crate::error::{Error, Result};
use crate::evaluate::{fit_grid, Evaluation};
use crate::hyperparams::{Config, ModelSpec};
use crate::metrics::Metric;
use crate::param_guard::ParamGuard;
use crate::pipeline::Pipeline;
use crate::resampling::ResampleSet;

/// Discrete level sets over a specification's tunable parameters
///
/// Expanding a regular grid yields the full factorial cross of the levels,
/// so its candidate count is the product of the level counts.
#[derive(Debug, Clone, Default)]
pub struct GridSpec<F> {
    levels: Vec<(String, Vec<F>)>,
}

impl<F: Float> GridSpec<F> {
    pub fn new() -> Self {
        GridSpec { levels: Vec::new() }
    }

    /// Declare the level set of one tunable parameter
    pub fn levels(mut self, name: impl Into<String>, values: Vec<F>) -> Self {
        self.levels.push((name.into(), values));
        self
    }

    /// Number of configurations the grid expands to
    pub fn size(&self) -> usize {
        self.levels.iter().map(|(_, values)| values.len()).product()
    }

    pub(crate) fn expand(&self, spec: &ModelSpec<F>) -> Result<Vec<Config<F>>> {
        let tunables = spec.tunables();
        if tunables.is_empty() {
            return Err(Error::Parameters(
                "the specification declares no tunable parameter".to_string(),
            ));
        }
        for (name, values) in &self.levels {
            if values.is_empty() {
                return Err(Error::Parameters(format!("no levels declared for {}", name)));
            }
            if !tunables.iter().any(|(tunable, _)| *tunable == name.as_str()) {
                return Err(Error::UnknownHyperParam(name.clone()));
            }
        }

        let per_tunable = tunables
            .iter()
            .map(|(name, _)| {
                self.levels
                    .iter()
                    .find(|(level_name, _)| level_name.as_str() == *name)
                    .map(|(_, values)| values)
                    .ok_or_else(|| {
                        Error::Parameters(format!("no grid levels declared for {}", name))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut assignments: Vec<Vec<F>> = vec![Vec::new()];
        for values in per_tunable {
            assignments = assignments
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |&value| {
                        let mut assignment = prefix.clone();
                        assignment.push(value);
                        assignment
                    })
                })
                .collect();
        }

        assignments
            .into_iter()
            .map(|assignment| spec.resolve(&assignment))
            .collect()
    }
}

/// Sample `n` space-filling configurations over the tunable ranges
///
/// Candidate points are drawn uniformly in unit space (so log-scaled ranges
/// are covered uniformly in exponent space) and thinned with a greedy
/// maximin rule. Identical seeds give identical configurations.
pub fn space_filling<F: Float>(spec: &ModelSpec<F>, n: usize, seed: u64) -> Result<Vec<Config<F>>> {
    spec.validate_tunables()?;
    let tunables = spec.tunables();
    if tunables.is_empty() {
        return Err(Error::Parameters(
            "the specification declares no tunable parameter".to_string(),
        ));
    }
    if n == 0 {
        return Err(Error::Parameters(
            "at least one configuration must be sampled".to_string(),
        ));
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let pool_size = (n * 8).max(32);
    let candidates: Vec<Vec<f64>> = (0..pool_size)
        .map(|_| (0..tunables.len()).map(|_| rng.gen::<f64>()).collect())
        .collect();

    let mut chosen: Vec<Vec<f64>> = vec![candidates[0].clone()];
    while chosen.len() < n {
        let next = candidates
            .iter()
            .max_by(|a, b| {
                min_squared_distance(a, &chosen)
                    .partial_cmp(&min_squared_distance(b, &chosen))
                    .unwrap()
            })
            .unwrap()
            .clone();
        chosen.push(next);
    }

    chosen
        .into_iter()
        .map(|point| {
            let assignment: Vec<F> = tunables
                .iter()
                .zip(point)
                .map(|((_, range), u)| range.from_unit(u))
                .collect();
            spec.resolve(&assignment)
        })
        .collect()
}

fn min_squared_distance(point: &[f64], chosen: &[Vec<f64>]) -> f64 {
    chosen
        .iter()
        .map(|other| {
            point
                .iter()
                .zip(other)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
        })
        .fold(f64::INFINITY, f64::min)
}

/// Exhaustive search over a configuration grid
///
/// ```no_run
/// use retune::prelude::*;
///
/// # fn run(dataset: &Dataset<f64>, folds: &ResampleSet) -> retune::error::Result<()> {
/// let spec = ModelSpec::new(ElasticNetFamily::new())
///     .tunable("penalty", ParamRange::log(1e-4, 1.0))
///     .fixed("l1_ratio", 0.5);
/// let grid = GridSpec::new().levels("penalty", vec![1e-4, 1e-3, 1e-2, 1e-1, 1.0]);
///
/// let result = GridSearch::params(grid)
///     .metric(Metric::Rmse)
///     .check()?
///     .run(dataset, folds, &Pipeline::new(), &spec, &Evaluation::default())?;
/// println!("best: {}", result.best_config());
/// # Ok(())
/// # }
/// ```
pub struct GridSearch;

impl GridSearch {
    pub fn params<F: Float>(grid: GridSpec<F>) -> GridSearchParams<F> {
        GridSearchParams(GridSearchValidParams {
            grid,
            metric: Metric::Rmse,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GridSearchValidParams<F> {
    grid: GridSpec<F>,
    metric: Metric,
}

impl<F: Float> GridSearchValidParams<F> {
    pub fn grid(&self) -> &GridSpec<F> {
        &self.grid
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Evaluate every grid configuration and rank the outcomes
    pub fn run(
        &self,
        dataset: &Dataset<F>,
        resamples: &ResampleSet,
        pipeline: &Pipeline<F>,
        spec: &ModelSpec<F>,
        settings: &Evaluation,
    ) -> Result<TuneResult<F>> {
        spec.validate_tunables()?;
        let configs = self.grid.expand(spec)?;
        let settings = settings.with_metric(self.metric);

        let run = fit_grid(
            dataset,
            resamples,
            pipeline,
            spec.family(),
            &configs,
            &settings,
        );

        let mut pool = CandidatePool::new(configs, self.metric);
        for (id, summary) in run.summaries(self.metric).into_iter().enumerate() {
            pool.record(id, summary);
        }

        let best = pool.select_best()?;
        Ok(TuneResult::new(pool, best, SearchOutcome::GridExhausted))
    }
}

#[derive(Debug, Clone)]
pub struct GridSearchParams<F>(GridSearchValidParams<F>);

impl<F: Float> GridSearchParams<F> {
    /// Metric the candidates are ranked by
    ///
    /// Defaults to [`Metric::Rmse`]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.0.metric = metric;
        self
    }
}

impl<F: Float> ParamGuard for GridSearchParams<F> {
    type Checked = GridSearchValidParams<F>;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.grid.levels.is_empty() {
            Err(Error::Parameters("the grid declares no levels".to_string()))
        } else if self.0.grid.levels.iter().any(|(_, values)| values.is_empty()) {
            Err(Error::Parameters(
                "every grid parameter needs at least one level".to_string(),
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
