//! Search strategies over a candidate pool
//!
//! All strategies share one state machine: every candidate configuration is
//! `Pending` until its cells report, then `Evaluated` (carrying a
//! performance summary), `Pruned` (eliminated by racing) or `Excluded`
//! (every cell failed). The pool is only ever mutated by the strategy's
//! controlling thread, between orchestrator batches.
//!
//! Three interchangeable strategies are provided: exhaustive
//! [`GridSearch`], surrogate-guided [`BayesSearch`] and the early-stopping
//! [`RaceSearch`].

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

mod bayes;
mod grid;
mod racing;

pub use bayes::{BayesSearch, BayesSearchParams, BayesSearchValidParams};
pub use grid::{space_filling, GridSearch, GridSearchParams, GridSearchValidParams, GridSpec};
pub use racing::{RaceSearch, RaceSearchParams, RaceSearchValidParams};

use crate::dataset::Float;
use crate::error::{Error, Result};
use crate::evaluate::PerformanceSummary;
use crate::hyperparams::Config;
use crate::metrics::Metric;

/// Lifecycle state of one candidate configuration
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Pending,
    Evaluated,
    Pruned,
    Excluded,
}

/// A configuration together with its evaluation state
#[derive(Debug, Clone)]
pub struct Candidate<F> {
    config: Config<F>,
    state: CandidateState,
    summary: Option<PerformanceSummary<F>>,
}

impl<F: Float> Candidate<F> {
    pub fn config(&self) -> &Config<F> {
        &self.config
    }

    pub fn state(&self) -> CandidateState {
        self.state
    }

    pub fn summary(&self) -> Option<&PerformanceSummary<F>> {
        self.summary.as_ref()
    }
}

/// The pool of candidate configurations of one search
pub struct CandidatePool<F> {
    candidates: Vec<Candidate<F>>,
    metric: Metric,
}

impl<F: Float> CandidatePool<F> {
    pub(crate) fn new(configs: Vec<Config<F>>, metric: Metric) -> Self {
        CandidatePool {
            candidates: configs
                .into_iter()
                .map(|config| Candidate {
                    config,
                    state: CandidateState::Pending,
                    summary: None,
                })
                .collect(),
            metric,
        }
    }

    pub(crate) fn push(&mut self, config: Config<F>) -> usize {
        self.candidates.push(Candidate {
            config,
            state: CandidateState::Pending,
            summary: None,
        });
        self.candidates.len() - 1
    }

    /// Move a candidate out of `Pending` once all of its cells reported
    ///
    /// No summary means every cell failed and the candidate is excluded from
    /// ranking, never silently scored as zero.
    pub(crate) fn record(&mut self, id: usize, summary: Option<PerformanceSummary<F>>) {
        let candidate = &mut self.candidates[id];
        match summary {
            Some(summary) => {
                candidate.state = CandidateState::Evaluated;
                candidate.summary = Some(summary);
            }
            None => candidate.state = CandidateState::Excluded,
        }
    }

    pub(crate) fn prune(&mut self, id: usize) {
        self.candidates[id].state = CandidateState::Pruned;
    }

    pub fn candidates(&self) -> &[Candidate<F>] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The evaluated candidate with the best mean metric
    ///
    /// Ties are broken by the lower standard error, then by enumeration
    /// order. Fails with [`Error::AllConfigurationsFailed`] when nothing was
    /// evaluated successfully.
    pub fn select_best(&self) -> Result<usize> {
        let direction = self.metric.direction();
        let mut best: Option<(usize, &PerformanceSummary<F>)> = None;
        for (id, candidate) in self.candidates.iter().enumerate() {
            if candidate.state != CandidateState::Evaluated {
                continue;
            }
            let summary = match &candidate.summary {
                Some(summary) => summary,
                None => continue,
            };

            best = match best {
                None => Some((id, summary)),
                Some((best_id, best_summary)) => {
                    let better = direction.improves(summary.mean(), best_summary.mean())
                        || (summary.mean() == best_summary.mean()
                            && summary.std_err() < best_summary.std_err());
                    if better {
                        Some((id, summary))
                    } else {
                        Some((best_id, best_summary))
                    }
                }
            };
        }

        best.map(|(id, _)| id).ok_or(Error::AllConfigurationsFailed)
    }
}

/// How a search reached its terminal state
///
/// Exhausting a budget is a normal outcome carrying the best configuration
/// found so far, not an error.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Every grid configuration was evaluated
    GridExhausted,
    /// Iterative search stopped improving
    Converged { iterations: usize },
    /// Iterative search ran out of iterations
    BudgetExhausted { iterations: usize },
    /// Racing finished, with the given number of pruned candidates
    RaceCompleted { pruned: usize },
}

/// The result of one search run
pub struct TuneResult<F> {
    pool: CandidatePool<F>,
    best: usize,
    outcome: SearchOutcome,
}

impl<F: Float> TuneResult<F> {
    pub(crate) fn new(pool: CandidatePool<F>, best: usize, outcome: SearchOutcome) -> Self {
        TuneResult {
            pool,
            best,
            outcome,
        }
    }

    pub fn pool(&self) -> &CandidatePool<F> {
        &self.pool
    }

    pub fn best(&self) -> usize {
        self.best
    }

    pub fn best_config(&self) -> &Config<F> {
        self.pool.candidates()[self.best].config()
    }

    pub fn best_summary(&self) -> &PerformanceSummary<F> {
        self.pool.candidates()[self.best]
            .summary()
            .expect("the selected candidate is always evaluated")
    }

    pub fn outcome(&self) -> SearchOutcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(config_id: usize, mean: f64, std_err: f64) -> PerformanceSummary<f64> {
        PerformanceSummary::new(config_id, Metric::Rmse, mean, std_err, 5)
    }

    #[test]
    fn select_best_prefers_lower_mean_for_minimized_metrics() {
        let configs = vec![Config::new().with("c", 0.0); 3];
        let mut pool = CandidatePool::new(configs, Metric::Rmse);
        pool.record(0, Some(summary(0, 1.0, 0.1)));
        pool.record(1, Some(summary(1, 0.5, 0.1)));
        pool.record(2, Some(summary(2, 2.0, 0.1)));

        assert_eq!(pool.select_best().unwrap(), 1);
    }

    #[test]
    fn ties_break_on_std_err_then_enumeration_order() {
        let configs = vec![Config::new().with("c", 0.0); 3];
        let mut pool = CandidatePool::new(configs, Metric::Rmse);
        pool.record(0, Some(summary(0, 1.0, 0.3)));
        pool.record(1, Some(summary(1, 1.0, 0.1)));
        pool.record(2, Some(summary(2, 1.0, 0.1)));

        // candidate 1 wins on standard error, candidate 2 cannot displace it
        assert_eq!(pool.select_best().unwrap(), 1);
    }

    #[test]
    fn excluded_and_pruned_candidates_never_win() {
        let configs = vec![Config::new().with("c", 0.0); 3];
        let mut pool = CandidatePool::new(configs, Metric::Rmse);
        pool.record(0, None);
        pool.prune(1);
        pool.record(2, Some(summary(2, 9.0, 0.1)));

        assert_eq!(pool.select_best().unwrap(), 2);
        assert_eq!(pool.candidates()[0].state(), CandidateState::Excluded);
        assert_eq!(pool.candidates()[1].state(), CandidateState::Pruned);
    }

    #[test]
    fn empty_pool_fails() {
        let pool = CandidatePool::<f64>::new(Vec::new(), Metric::Rmse);
        assert!(matches!(
            pool.select_best(),
            Err(Error::AllConfigurationsFailed)
        ));
    }
}
