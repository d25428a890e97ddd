use friedrich::gaussian_process::GaussianProcess;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use super::grid::space_filling;
use super::{CandidatePool, SearchOutcome, TuneResult};
use crate::dataset::{Dataset, Float};
use crate::error::{Error, Result};
use crate::evaluate::{fit_grid, Evaluation, PerformanceSummary};
use crate::hyperparams::{Config, ModelSpec, ParamRange};
use crate::metrics::{Direction, Metric};
use crate::param_guard::ParamGuard;
use crate::pipeline::Pipeline;
use crate::resampling::ResampleSet;

/// Iterative search guided by a Gaussian process surrogate
///
/// Starting from a space-filling batch, each iteration fits the surrogate to
/// every observed (configuration, mean metric) pair in unit space, proposes
/// the candidate maximizing expected improvement and evaluates it on the
/// full resample set. The search stops after `no_improve` consecutive
/// iterations without beating the incumbent by `tolerance`, or when the
/// iteration budget runs out; both are normal outcomes carrying the best
/// configuration found.
pub struct BayesSearch;

impl BayesSearch {
    pub fn params<F: Float>() -> BayesSearchParams<F> {
        BayesSearchParams(BayesSearchValidParams {
            metric: Metric::Rmse,
            initial_points: 5,
            max_iter: 20,
            no_improve: 5,
            tolerance: F::cast(1e-6),
            proposals: 256,
            seed: 0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BayesSearchValidParams<F> {
    metric: Metric,
    initial_points: usize,
    max_iter: usize,
    no_improve: usize,
    tolerance: F,
    proposals: usize,
    seed: u64,
}

impl<F: Float> BayesSearchValidParams<F> {
    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn initial_points(&self) -> usize {
        self.initial_points
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn no_improve(&self) -> usize {
        self.no_improve
    }

    pub fn tolerance(&self) -> F {
        self.tolerance
    }

    pub fn proposals(&self) -> usize {
        self.proposals
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run the iterative search until convergence or budget exhaustion
    pub fn run(
        &self,
        dataset: &Dataset<F>,
        resamples: &ResampleSet,
        pipeline: &Pipeline<F>,
        spec: &ModelSpec<F>,
        settings: &Evaluation,
    ) -> Result<TuneResult<F>> {
        spec.validate_tunables()?;
        let tunables = spec.tunables();
        if tunables.is_empty() {
            return Err(Error::Parameters(
                "the specification declares no tunable parameter".to_string(),
            ));
        }

        let settings = settings.with_metric(self.metric);
        let sign = match self.metric.direction() {
            Direction::Minimize => 1.0,
            Direction::Maximize => -1.0,
        };
        let tolerance = self.tolerance.to_f64().unwrap();

        // space-filling warm start, evaluated as one orchestrator batch
        let initial = space_filling(spec, self.initial_points, self.seed)?;
        let mut pool = CandidatePool::new(initial.clone(), self.metric);
        let warm_up = fit_grid(
            dataset,
            resamples,
            pipeline,
            spec.family(),
            &initial,
            &settings,
        );

        let mut observations: Vec<(Vec<f64>, f64)> = Vec::new();
        let mut best_score = f64::INFINITY;
        for (id, summary) in warm_up.summaries(self.metric).into_iter().enumerate() {
            if let Some(summary) = summary {
                let score = sign * summary.mean().to_f64().unwrap();
                best_score = best_score.min(score);
                observations.push((unit_point(&tunables, &initial[id])?, score));
            }
            pool.record(id, summary);
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed.wrapping_add(1));
        let mut stall = 0;
        let mut iterations = 0;
        let mut outcome = SearchOutcome::BudgetExhausted {
            iterations: self.max_iter,
        };
        for _ in 0..self.max_iter {
            iterations += 1;

            // with fewer than two observations there is nothing to fit a
            // surrogate to, fall back to a uniform draw
            let point = if observations.len() >= 2 {
                propose(&observations, tunables.len(), self.proposals, &mut rng)
            } else {
                (0..tunables.len()).map(|_| rng.gen::<f64>()).collect()
            };

            let assignment: Vec<F> = tunables
                .iter()
                .zip(&point)
                .map(|((_, range), &u)| range.from_unit(u))
                .collect();
            let config = spec.resolve(&assignment)?;
            let id = pool.push(config.clone());

            let run = fit_grid(
                dataset,
                resamples,
                pipeline,
                spec.family(),
                std::slice::from_ref(&config),
                &settings,
            );
            match run.summary(0, self.metric) {
                Some(summary) => {
                    let summary = PerformanceSummary::new(
                        id,
                        self.metric,
                        summary.mean(),
                        summary.std_err(),
                        summary.n_cells(),
                    );
                    pool.record(id, Some(summary));

                    let score = sign * summary.mean().to_f64().unwrap();
                    if best_score - score > tolerance {
                        best_score = score;
                        stall = 0;
                    } else {
                        stall += 1;
                    }
                    observations.push((point, score));
                }
                None => {
                    pool.record(id, None);
                    stall += 1;
                }
            }

            if stall >= self.no_improve {
                outcome = SearchOutcome::Converged { iterations };
                break;
            }
        }

        let best = pool.select_best()?;
        Ok(TuneResult::new(pool, best, outcome))
    }
}

fn unit_point<F: Float>(
    tunables: &[(&str, ParamRange<F>)],
    config: &Config<F>,
) -> Result<Vec<f64>> {
    tunables
        .iter()
        .map(|(name, range)| config.get(name).map(|value| range.to_unit(value)))
        .collect()
}

/// Maximize expected improvement over uniform proposals
fn propose(
    observations: &[(Vec<f64>, f64)],
    dims: usize,
    proposals: usize,
    rng: &mut Xoshiro256PlusPlus,
) -> Vec<f64> {
    let inputs: Vec<Vec<f64>> = observations.iter().map(|(point, _)| point.clone()).collect();
    let outputs: Vec<f64> = observations.iter().map(|(_, score)| *score).collect();
    let best = outputs.iter().fold(f64::INFINITY, |acc, &y| acc.min(y));

    let surrogate = GaussianProcess::default(inputs, outputs);
    let normal = Normal::new(0.0, 1.0).unwrap();

    let mut best_point: Option<Vec<f64>> = None;
    let mut best_ei = f64::NEG_INFINITY;
    for _ in 0..proposals {
        let point: Vec<f64> = (0..dims).map(|_| rng.gen()).collect();
        let mean = surrogate.predict(&point);
        let sigma = surrogate.predict_variance(&point).max(0.0).sqrt();

        let ei = if sigma > 1e-12 {
            let z = (best - mean) / sigma;
            (best - mean) * normal.cdf(z) + sigma * normal.pdf(z)
        } else {
            (best - mean).max(0.0)
        };
        if ei > best_ei {
            best_ei = ei;
            best_point = Some(point);
        }
    }

    best_point.unwrap()
}

#[derive(Debug, Clone)]
pub struct BayesSearchParams<F>(BayesSearchValidParams<F>);

impl<F: Float> BayesSearchParams<F> {
    /// Metric the candidates are ranked by
    ///
    /// Defaults to [`Metric::Rmse`]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.0.metric = metric;
        self
    }

    /// Size of the space-filling warm start batch
    ///
    /// Defaults to `5` if not set
    pub fn initial_points(mut self, initial_points: usize) -> Self {
        self.0.initial_points = initial_points;
        self
    }

    /// Iteration budget after the warm start
    ///
    /// Defaults to `20` if not set
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    /// Consecutive non-improving iterations before the search converges
    ///
    /// Defaults to `5` if not set
    pub fn no_improve(mut self, no_improve: usize) -> Self {
        self.0.no_improve = no_improve;
        self
    }

    /// Minimum improvement of the incumbent that counts as progress
    pub fn tolerance(mut self, tolerance: F) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Uniform proposals scored per acquisition round
    ///
    /// Defaults to `256` if not set
    pub fn proposals(mut self, proposals: usize) -> Self {
        self.0.proposals = proposals;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl<F: Float> ParamGuard for BayesSearchParams<F> {
    type Checked = BayesSearchValidParams<F>;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.initial_points < 2 {
            Err(Error::Parameters(
                "the surrogate needs at least two warm start points".to_string(),
            ))
        } else if self.0.max_iter == 0 {
            Err(Error::Parameters(
                "at least one search iteration is required".to_string(),
            ))
        } else if self.0.no_improve == 0 {
            Err(Error::Parameters(
                "no_improve must be positive".to_string(),
            ))
        } else if self.0.proposals == 0 {
            Err(Error::Parameters(
                "at least one proposal per iteration is required".to_string(),
            ))
        } else if self.0.tolerance.is_negative() {
            Err(Error::Parameters(
                "tolerance must not be negative".to_string(),
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
    use crate::resampling::KFold;
    use crate::traits::{ModelFamily, Regressor};
    use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

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

    #[test]
    fn surrogate_search_homes_in_on_the_optimum() {
        // rmse of the constant family is |c - 2|, minimized at c = 2
        let dataset = Dataset::new(Array2::zeros((20, 1)), Array1::from_elem(20, 2.0));
        let folds = KFold::params(4)
            .seed(5)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();
        let spec = ModelSpec::new(ConstantFamily).tunable("c", ParamRange::linear(0.0, 4.0));

        let result = BayesSearch::params()
            .initial_points(4)
            .max_iter(8)
            .no_improve(3)
            .seed(1)
            .check()
            .unwrap()
            .run(&dataset, &folds, &Pipeline::new(), &spec, &Evaluation::default())
            .unwrap();

        let best_c = result.best_config().get("c").unwrap();
        assert!((best_c - 2.0).abs() < 1.0, "best c was {}", best_c);
        assert!(matches!(
            result.outcome(),
            SearchOutcome::Converged { .. } | SearchOutcome::BudgetExhausted { .. }
        ));

        // warm start plus one candidate per completed iteration
        let iterations = match result.outcome() {
            SearchOutcome::Converged { iterations } => iterations,
            SearchOutcome::BudgetExhausted { iterations } => iterations,
            _ => unreachable!(),
        };
        assert_eq!(result.pool().len(), 4 + iterations);
    }

    #[test]
    fn specs_without_tunables_are_rejected() {
        let dataset = Dataset::new(Array2::zeros((10, 1)), Array1::zeros(10));
        let folds = KFold::params(2)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();
        let spec = ModelSpec::new(ConstantFamily).fixed("c", 1.0);

        let res = BayesSearch::params()
            .check()
            .unwrap()
            .run(&dataset, &folds, &Pipeline::new(), &spec, &Evaluation::default());
        assert!(res.is_err());
    }

    #[test]
    fn degenerate_budgets_are_rejected() {
        assert!(BayesSearch::params::<f64>().initial_points(1).check().is_err());
        assert!(BayesSearch::params::<f64>().max_iter(0).check().is_err());
        assert!(BayesSearch::params::<f64>().tolerance(-1.0).check().is_err());
    }
}
