//! Fit-evaluate cells and the resampling orchestrator
//!
//! One *cell* fits a pipeline and a model configuration on the analysis side
//! of one split and scores it on the assessment side. The orchestrator runs
//! the full `splits × configurations` grid of cells, serially or on the
//! rayon pool, and aggregates per-cell metric records into performance
//! summaries.
//!
//! A cell that fails to fit contributes a [`FitFailure`] instead of a
//! record. Failures never abort sibling cells; a configuration whose cells
//! all failed simply has no summary.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use std::fmt;

use crate::metrics::Metric;

mod cell;
mod orchestrator;

pub use cell::evaluate_cell;
pub use orchestrator::{fit_grid, fit_resamples, ResampleRun};

/// Settings of one evaluation run
#[derive(Debug, Clone)]
pub struct Evaluation {
    metrics: Vec<Metric>,
    parallel: bool,
    retain_predictions: bool,
}

impl Default for Evaluation {
    fn default() -> Self {
        Evaluation::new(vec![Metric::Rmse])
    }
}

impl Evaluation {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Evaluation {
            metrics,
            parallel: false,
            retain_predictions: false,
        }
    }

    /// Dispatch cells on the rayon pool instead of the calling thread
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Keep raw assessment predictions on every record, keyed by original
    /// row index
    pub fn retain_predictions(mut self, retain: bool) -> Self {
        self.retain_predictions = retain;
        self
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn retains_predictions(&self) -> bool {
        self.retain_predictions
    }

    /// A copy of the settings guaranteed to score `metric`
    pub(crate) fn with_metric(&self, metric: Metric) -> Evaluation {
        let mut settings = self.clone();
        if !settings.metrics.contains(&metric) {
            settings.metrics.push(metric);
        }
        settings
    }
}

pub(crate) fn mean_and_std_err<F: crate::dataset::Float>(values: &[F]) -> (F, F) {
    let n = F::cast(values.len());
    let mean = values.iter().copied().sum::<F>() / n;
    if values.len() < 2 {
        return (mean, F::zero());
    }

    let var = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<F>() / (n - F::one());
    (mean, (var / n).sqrt())
}

/// One retained assessment prediction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowPrediction<F> {
    pub row: usize,
    pub prediction: F,
    pub truth: F,
}

/// The scored outcome of one successful cell
#[derive(Debug, Clone)]
pub struct MetricRecord<F> {
    split_id: usize,
    config_id: usize,
    values: Vec<(Metric, F)>,
    predictions: Option<Vec<RowPrediction<F>>>,
}

impl<F: Copy> MetricRecord<F> {
    pub(crate) fn new(
        split_id: usize,
        config_id: usize,
        values: Vec<(Metric, F)>,
        predictions: Option<Vec<RowPrediction<F>>>,
    ) -> Self {
        MetricRecord {
            split_id,
            config_id,
            values,
            predictions,
        }
    }

    pub fn split_id(&self) -> usize {
        self.split_id
    }

    pub fn config_id(&self) -> usize {
        self.config_id
    }

    pub fn values(&self) -> &[(Metric, F)] {
        &self.values
    }

    pub fn value(&self, metric: Metric) -> Option<F> {
        self.values
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, v)| *v)
    }

    pub fn predictions(&self) -> Option<&[RowPrediction<F>]> {
        self.predictions.as_deref()
    }
}

/// A contained fitting or prediction failure of one cell
#[derive(Debug, Clone)]
pub struct FitFailure {
    pub split_id: usize,
    pub config_id: usize,
    pub error: String,
}

impl fmt::Display for FitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "split {} / configuration {}: {}",
            self.split_id, self.config_id, self.error
        )
    }
}

/// Mean and standard error of one metric over the successful cells of one
/// configuration
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSummary<F> {
    config_id: usize,
    metric: Metric,
    mean: F,
    std_err: F,
    n_cells: usize,
}

impl<F: Copy> PerformanceSummary<F> {
    pub(crate) fn new(
        config_id: usize,
        metric: Metric,
        mean: F,
        std_err: F,
        n_cells: usize,
    ) -> Self {
        PerformanceSummary {
            config_id,
            metric,
            mean,
            std_err,
            n_cells,
        }
    }

    pub fn config_id(&self) -> usize {
        self.config_id
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn mean(&self) -> F {
        self.mean
    }

    pub fn std_err(&self) -> F {
        self.std_err
    }

    /// Number of successful cells the summary aggregates
    pub fn n_cells(&self) -> usize {
        self.n_cells
    }
}
