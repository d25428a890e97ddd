use rayon::prelude::*;
use statrs::distribution::{ContinuousCDF, StudentsT};

use super::grid::GridSpec;
use super::{CandidatePool, SearchOutcome, TuneResult};
use crate::dataset::{Dataset, Float};
use crate::error::{Error, Result};
use crate::evaluate::{evaluate_cell, mean_and_std_err, Evaluation, PerformanceSummary};
use crate::hyperparams::ModelSpec;
use crate::metrics::{Direction, Metric};
use crate::param_guard::ParamGuard;
use crate::pipeline::Pipeline;
use crate::resampling::ResampleSet;

/// Grid search with early elimination of dominated candidates
///
/// Candidates are evaluated split by split. Once `burn_in` splits have
/// reported, every remaining candidate is tested against the current leader
/// with a one-sided paired Students-T test on the per-split metric
/// differences; candidates significantly worse at level `alpha` are pruned
/// and skip all remaining splits. With one clearly dominant configuration
/// the surviving winner matches full grid search with high probability
/// while spending far fewer cells.
pub struct RaceSearch;

impl RaceSearch {
    pub fn params<F: Float>(grid: GridSpec<F>) -> RaceSearchParams<F> {
        RaceSearchParams(RaceSearchValidParams {
            grid,
            metric: Metric::Rmse,
            alpha: 0.05,
            burn_in: 3,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RaceSearchValidParams<F> {
    grid: GridSpec<F>,
    metric: Metric,
    alpha: f64,
    burn_in: usize,
}

impl<F: Float> RaceSearchValidParams<F> {
    pub fn grid(&self) -> &GridSpec<F> {
        &self.grid
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn burn_in(&self) -> usize {
        self.burn_in
    }

    /// Race the grid over the resample set
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
        let direction = self.metric.direction();

        let mut pool = CandidatePool::new(configs.clone(), self.metric);
        // per candidate: one entry per dispatched split, None when the cell
        // failed
        let mut values: Vec<Vec<Option<F>>> = vec![Vec::new(); configs.len()];
        let mut active: Vec<bool> = vec![true; configs.len()];
        let mut rounds = 0;

        for split in resamples
            .iter()
            .filter(|split| !split.assessment().is_empty())
        {
            let contenders: Vec<usize> = (0..configs.len()).filter(|&id| active[id]).collect();

            let run_cell = |&id: &usize| {
                evaluate_cell(
                    dataset,
                    split,
                    pipeline,
                    spec.family(),
                    &configs[id],
                    id,
                    &settings,
                )
            };
            let outcomes: Vec<_> = if settings.is_parallel() {
                contenders.par_iter().map(run_cell).collect()
            } else {
                contenders.iter().map(run_cell).collect()
            };

            for (&id, outcome) in contenders.iter().zip(outcomes) {
                values[id].push(outcome.ok().and_then(|record| record.value(self.metric)));
            }
            rounds += 1;

            if rounds >= self.burn_in {
                self.prune_dominated(&mut active, &values, direction);
            }
        }

        let mut pruned = 0;
        for id in 0..configs.len() {
            if !active[id] {
                pool.prune(id);
                pruned += 1;
                continue;
            }

            let observed: Vec<F> = values[id].iter().filter_map(|v| *v).collect();
            if observed.is_empty() {
                pool.record(id, None);
            } else {
                let (mean, std_err) = mean_and_std_err(&observed);
                pool.record(
                    id,
                    Some(PerformanceSummary::new(
                        id,
                        self.metric,
                        mean,
                        std_err,
                        observed.len(),
                    )),
                );
            }
        }

        let best = pool.select_best()?;
        Ok(TuneResult::new(
            pool,
            best,
            SearchOutcome::RaceCompleted { pruned },
        ))
    }

    fn prune_dominated(
        &self,
        active: &mut [bool],
        values: &[Vec<Option<F>>],
        direction: Direction,
    ) {
        let running_mean = |id: usize| -> Option<f64> {
            let observed: Vec<f64> = values[id]
                .iter()
                .filter_map(|v| v.map(|v| v.to_f64().unwrap()))
                .collect();
            if observed.is_empty() {
                None
            } else {
                Some(observed.iter().sum::<f64>() / observed.len() as f64)
            }
        };

        let leader = (0..values.len())
            .filter(|&id| active[id])
            .filter_map(|id| running_mean(id).map(|mean| (id, mean)))
            .min_by(|a, b| {
                let (a, b) = match direction {
                    Direction::Minimize => (a.1, b.1),
                    Direction::Maximize => (b.1, a.1),
                };
                a.partial_cmp(&b).unwrap()
            });
        let leader = match leader {
            Some((id, _)) => id,
            None => return,
        };

        for id in 0..values.len() {
            if !active[id] || id == leader {
                continue;
            }

            // paired per-split differences, oriented so positive means worse
            // than the leader
            let diffs: Vec<f64> = values[id]
                .iter()
                .zip(&values[leader])
                .filter_map(|(candidate, leader)| match (candidate, leader) {
                    (Some(c), Some(l)) => {
                        let (c, l) = (c.to_f64().unwrap(), l.to_f64().unwrap());
                        Some(match direction {
                            Direction::Minimize => c - l,
                            Direction::Maximize => l - c,
                        })
                    }
                    _ => None,
                })
                .collect();

            if diffs.len() >= self.burn_in && significantly_positive(&diffs, self.alpha) {
                active[id] = false;
            }
        }
    }
}

/// One-sided paired T test for a positive mean difference
fn significantly_positive(diffs: &[f64], alpha: f64) -> bool {
    let n = diffs.len() as f64;
    let mean = diffs.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return false;
    }

    let var = diffs.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / (n - 1.0);
    let std_err = (var / n).sqrt();
    if std_err == 0.0 {
        return true;
    }

    let t = mean / std_err;
    let dist = StudentsT::new(0.0, 1.0, n - 1.0).unwrap();
    1.0 - dist.cdf(t) < alpha
}

#[derive(Debug, Clone)]
pub struct RaceSearchParams<F>(RaceSearchValidParams<F>);

impl<F: Float> RaceSearchParams<F> {
    /// Metric the candidates are raced on
    ///
    /// Defaults to [`Metric::Rmse`]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.0.metric = metric;
        self
    }

    /// Significance level of the elimination test
    ///
    /// Defaults to `0.05` if not set
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.0.alpha = alpha;
        self
    }

    /// Splits every candidate sees before elimination starts
    ///
    /// Defaults to `3` if not set
    pub fn burn_in(mut self, burn_in: usize) -> Self {
        self.0.burn_in = burn_in;
        self
    }
}

impl<F: Float> ParamGuard for RaceSearchParams<F> {
    type Checked = RaceSearchValidParams<F>;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(0.0..1.0).contains(&self.0.alpha) || self.0.alpha == 0.0 {
            Err(Error::Parameters(format!(
                "significance level must lie strictly between 0 and 1, got {}",
                self.0.alpha
            )))
        } else if self.0.burn_in < 2 {
            Err(Error::Parameters(
                "the paired test needs a burn in of at least two splits".to_string(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparams::{Config, ParamRange};
    use crate::resampling::KFold;
    use crate::search::{CandidateState, GridSearch};
    use crate::traits::{ModelFamily, Regressor};
    use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    struct ConstantFamily;

    struct ConstantModel(f64);

    impl ModelFamily<f64> for ConstantFamily {
        fn name(&self) -> &str {
            "constant"
        }

        fn fit(
            &self,
            config: &Config<f64>,
            _records: ArrayView2<f64>,
            _targets: ArrayView1<f64>,
        ) -> Result<Box<dyn Regressor<f64>>> {
            Ok(Box::new(ConstantModel(config.get("c")?)))
        }
    }

    impl Regressor<f64> for ConstantModel {
        fn predict(&self, records: ArrayView2<f64>) -> Array1<f64> {
            Array1::from_elem(records.nrows(), self.0)
        }
    }

    fn noisy_dataset(seed: u64) -> Dataset<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let targets = Array1::random_using(60, Normal::new(0.0, 0.2).unwrap(), &mut rng);
        Dataset::new(Array2::zeros((60, 1)), targets)
    }

    fn spec() -> ModelSpec<f64> {
        ModelSpec::new(ConstantFamily).tunable("c", ParamRange::linear(0.0, 4.0))
    }

    fn grid() -> GridSpec<f64> {
        // c = 0 tracks the zero-mean targets closely, the rest are dominated
        GridSpec::new().levels("c", vec![0.0, 1.0, 2.0, 3.0])
    }

    #[test]
    fn dominated_candidates_are_pruned() {
        let dataset = noisy_dataset(17);
        let folds = KFold::params(6)
            .seed(2)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();

        let result = RaceSearch::params(grid())
            .burn_in(3)
            .check()
            .unwrap()
            .run(&dataset, &folds, &Pipeline::new(), &spec(), &Evaluation::default())
            .unwrap();

        assert_eq!(result.best_config().get("c").unwrap(), 0.0);
        match result.outcome() {
            SearchOutcome::RaceCompleted { pruned } => assert!(pruned > 0),
            _ => panic!("racing must report a race outcome"),
        }
        assert_eq!(
            result.pool().candidates()[3].state(),
            CandidateState::Pruned
        );
    }

    #[test]
    fn racing_agrees_with_full_grid_search_on_a_dominant_candidate() {
        for seed in 0..5 {
            let dataset = noisy_dataset(seed);
            let folds = KFold::params(6)
                .seed(seed)
                .check()
                .unwrap()
                .partition(&dataset)
                .unwrap();

            let raced = RaceSearch::params(grid())
                .check()
                .unwrap()
                .run(&dataset, &folds, &Pipeline::new(), &spec(), &Evaluation::default())
                .unwrap();
            let exhaustive = GridSearch::params(grid())
                .check()
                .unwrap()
                .run(&dataset, &folds, &Pipeline::new(), &spec(), &Evaluation::default())
                .unwrap();

            assert_eq!(
                raced.best_config().get("c").unwrap(),
                exhaustive.best_config().get("c").unwrap()
            );
        }
    }

    #[test]
    fn survivors_keep_full_summaries() {
        let dataset = noisy_dataset(3);
        let folds = KFold::params(6)
            .seed(4)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();

        let result = RaceSearch::params(grid())
            .check()
            .unwrap()
            .run(&dataset, &folds, &Pipeline::new(), &spec(), &Evaluation::default())
            .unwrap();

        let winner = &result.pool().candidates()[result.best()];
        assert_eq!(winner.state(), CandidateState::Evaluated);
        assert_eq!(winner.summary().unwrap().n_cells(), 6);
    }

    #[test]
    fn degenerate_race_parameters_are_rejected() {
        assert!(RaceSearch::params(grid()).alpha(0.0).check().is_err());
        assert!(RaceSearch::params(grid()).alpha(1.2).check().is_err());
        assert!(RaceSearch::params(grid()).burn_in(1).check().is_err());
    }
}
