use rayon::prelude::*;

use super::cell::evaluate_cell;
use super::{mean_and_std_err, Evaluation, FitFailure, MetricRecord, PerformanceSummary};
use crate::dataset::{Dataset, Float};
use crate::error::Result;
use crate::hyperparams::{Config, ModelSpec};
use crate::metrics::Metric;
use crate::pipeline::Pipeline;
use crate::resampling::ResampleSet;
use crate::traits::ModelFamily;

/// The collected outcome of one orchestrator run
///
/// Records and failures together cover every dispatched cell; splits with an
/// empty assessment set (bootstrap out-of-bag) are skipped up front and
/// appear in neither.
pub struct ResampleRun<F> {
    records: Vec<MetricRecord<F>>,
    failures: Vec<FitFailure>,
    n_configs: usize,
}

impl<F: Float> ResampleRun<F> {
    pub fn records(&self) -> &[MetricRecord<F>] {
        &self.records
    }

    pub fn failures(&self) -> &[FitFailure] {
        &self.failures
    }

    pub fn n_configs(&self) -> usize {
        self.n_configs
    }

    /// Summarize one configuration, `None` when every cell failed
    pub fn summary(&self, config_id: usize, metric: Metric) -> Option<PerformanceSummary<F>> {
        let values: Vec<F> = self
            .records
            .iter()
            .filter(|record| record.config_id() == config_id)
            .filter_map(|record| record.value(metric))
            .collect();
        if values.is_empty() {
            return None;
        }

        let (mean, std_err) = mean_and_std_err(&values);
        Some(PerformanceSummary::new(
            config_id,
            metric,
            mean,
            std_err,
            values.len(),
        ))
    }

    /// Summaries of all configurations, in configuration order
    pub fn summaries(&self, metric: Metric) -> Vec<Option<PerformanceSummary<F>>> {
        (0..self.n_configs)
            .map(|config_id| self.summary(config_id, metric))
            .collect()
    }

    /// Out-of-fold prediction per original row, averaged when a row was
    /// assessed more than once
    ///
    /// Requires the run to have retained predictions; rows never assessed
    /// yield `None`.
    pub fn out_of_fold(&self, config_id: usize, nsamples: usize) -> Vec<Option<F>> {
        let mut sums = vec![F::zero(); nsamples];
        let mut counts = vec![0usize; nsamples];
        for record in self
            .records
            .iter()
            .filter(|record| record.config_id() == config_id)
        {
            if let Some(predictions) = record.predictions() {
                for p in predictions {
                    sums[p.row] += p.prediction;
                    counts[p.row] += 1;
                }
            }
        }

        sums.into_iter()
            .zip(counts)
            .map(|(sum, count)| {
                if count == 0 {
                    None
                } else {
                    Some(sum / F::cast(count))
                }
            })
            .collect()
    }
}

/// Evaluate a fully resolved model specification over every split
///
/// Fails eagerly when the specification still contains tunable markers; use
/// a search strategy to resolve those first.
pub fn fit_resamples<F: Float>(
    dataset: &Dataset<F>,
    resamples: &ResampleSet,
    pipeline: &Pipeline<F>,
    spec: &ModelSpec<F>,
    settings: &Evaluation,
) -> Result<ResampleRun<F>> {
    let config = spec.fixed_config()?;
    Ok(fit_grid(
        dataset,
        resamples,
        pipeline,
        spec.family(),
        std::slice::from_ref(&config),
        settings,
    ))
}

/// Evaluate the full `splits × configurations` grid of cells
///
/// Cells are pure functions of their read-only inputs, so the parallel path
/// dispatches them on the rayon pool without any locking. Record order is
/// identical between the serial and parallel paths.
pub fn fit_grid<F: Float>(
    dataset: &Dataset<F>,
    resamples: &ResampleSet,
    pipeline: &Pipeline<F>,
    family: &dyn ModelFamily<F>,
    configs: &[Config<F>],
    settings: &Evaluation,
) -> ResampleRun<F> {
    let cells: Vec<_> = configs
        .iter()
        .enumerate()
        .flat_map(|(config_id, config)| {
            resamples
                .iter()
                .filter(|split| !split.assessment().is_empty())
                .map(move |split| (config_id, config, split))
        })
        .collect();

    let run_cell = |&(config_id, config, split): &(usize, &Config<F>, &crate::resampling::Split)| {
        evaluate_cell(dataset, split, pipeline, family, config, config_id, settings)
    };

    let outcomes: Vec<_> = if settings.is_parallel() {
        cells.par_iter().map(run_cell).collect()
    } else {
        cells.iter().map(run_cell).collect()
    };

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(record) => records.push(record),
            Err(failure) => failures.push(failure),
        }
    }

    ResampleRun {
        records,
        failures,
        n_configs: configs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::hyperparams::Config;
    use crate::metrics::Metric;
    use crate::models::ElasticNetFamily;
    use crate::param_guard::ParamGuard;
    use crate::resampling::{Bootstrap, KFold};
    use crate::traits::{ModelFamily, Regressor};
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    /// Predicts the constant `c` from its configuration; negative values of
    /// `c` simulate a fit that does not converge
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
        ) -> crate::error::Result<Box<dyn Regressor<f64>>> {
            let c = config.get("c")?;
            if c < 0.0 {
                return Err(Error::Parameters("did not converge".to_string()));
            }
            Ok(Box::new(ConstantModel(c)))
        }
    }

    impl Regressor<f64> for ConstantModel {
        fn predict(&self, records: ArrayView2<f64>) -> Array1<f64> {
            Array1::from_elem(records.nrows(), self.0)
        }
    }

    fn constant_dataset(n: usize, value: f64) -> Dataset<f64> {
        Dataset::new(Array2::zeros((n, 1)), Array1::from_elem(n, value))
    }

    #[test]
    fn summaries_aggregate_over_splits() {
        let dataset = constant_dataset(20, 2.0);
        let folds = KFold::params(5)
            .seed(1)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();

        let configs = vec![Config::new().with("c", 2.0), Config::new().with("c", 5.0)];
        let run = fit_grid(
            &dataset,
            &folds,
            &Pipeline::new(),
            &ConstantFamily,
            &configs,
            &Evaluation::new(vec![Metric::Rmse, Metric::Mae]),
        );

        assert_eq!(run.records().len(), 10);
        assert!(run.failures().is_empty());

        let exact = run.summary(0, Metric::Rmse).unwrap();
        assert_abs_diff_eq!(exact.mean(), 0.0);
        assert_abs_diff_eq!(exact.std_err(), 0.0);
        assert_eq!(exact.n_cells(), 5);

        let off = run.summary(1, Metric::Mae).unwrap();
        assert_abs_diff_eq!(off.mean(), 3.0);
        assert_abs_diff_eq!(off.std_err(), 0.0);
    }

    #[test]
    fn failures_are_contained_per_configuration() {
        let dataset = constant_dataset(12, 1.0);
        let folds = KFold::params(3)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();

        let configs = vec![Config::new().with("c", 1.0), Config::new().with("c", -1.0)];
        let run = fit_grid(
            &dataset,
            &folds,
            &Pipeline::new(),
            &ConstantFamily,
            &configs,
            &Evaluation::default(),
        );

        // the sound configuration is unaffected by its failing sibling
        assert!(run.summary(0, Metric::Rmse).is_some());
        assert!(run.summary(1, Metric::Rmse).is_none());
        assert_eq!(run.failures().len(), 3);
        assert!(run.failures()[0].error.contains("did not converge"));

        let summaries = run.summaries(Metric::Rmse);
        assert!(summaries[0].is_some());
        assert!(summaries[1].is_none());
    }

    #[test]
    fn empty_assessment_splits_are_skipped() {
        // a single-row dataset bootstraps onto itself, so the out-of-bag
        // assessment set is always empty
        let dataset = constant_dataset(1, 1.0);
        let sets = Bootstrap::params(3)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();

        let run = fit_resamples(
            &dataset,
            &sets,
            &Pipeline::new(),
            &crate::hyperparams::ModelSpec::new(ConstantFamily).fixed("c", 1.0),
            &Evaluation::default(),
        )
        .unwrap();

        assert!(run.records().is_empty());
        assert!(run.failures().is_empty());
        assert!(run.summary(0, Metric::Rmse).is_none());
    }

    #[test]
    fn parallel_and_serial_runs_agree() {
        let dataset = constant_dataset(20, 2.0);
        let folds = KFold::params(4)
            .seed(2)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();
        let configs = vec![Config::new().with("c", 1.5), Config::new().with("c", 3.0)];

        let serial = fit_grid(
            &dataset,
            &folds,
            &Pipeline::new(),
            &ConstantFamily,
            &configs,
            &Evaluation::default(),
        );
        let parallel = fit_grid(
            &dataset,
            &folds,
            &Pipeline::new(),
            &ConstantFamily,
            &configs,
            &Evaluation::default().parallel(true),
        );

        assert_eq!(serial.records().len(), parallel.records().len());
        for (a, b) in serial.records().iter().zip(parallel.records()) {
            assert_eq!(a.split_id(), b.split_id());
            assert_eq!(a.config_id(), b.config_id());
            assert_abs_diff_eq!(a.value(Metric::Rmse).unwrap(), b.value(Metric::Rmse).unwrap());
        }
    }

    #[test]
    fn retained_predictions_cover_every_assessment_row() {
        let dataset = constant_dataset(10, 2.0);
        let folds = KFold::params(5)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();

        let run = fit_resamples(
            &dataset,
            &folds,
            &Pipeline::new(),
            &crate::hyperparams::ModelSpec::new(ConstantFamily).fixed("c", 2.0),
            &Evaluation::default().retain_predictions(true),
        )
        .unwrap();

        let oof = run.out_of_fold(0, 10);
        assert!(oof.iter().all(|p| p.is_some()));
        assert!(oof.iter().all(|p| (p.unwrap() - 2.0).abs() < 1e-12));
    }

    #[test]
    fn unresolved_specs_are_rejected_eagerly() {
        let dataset = constant_dataset(10, 2.0);
        let folds = KFold::params(5)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();

        let spec = crate::hyperparams::ModelSpec::new(ConstantFamily)
            .tunable("c", crate::hyperparams::ParamRange::linear(0.0, 1.0));
        let res = fit_resamples(
            &dataset,
            &folds,
            &Pipeline::new(),
            &spec,
            &Evaluation::default(),
        );

        assert!(matches!(res, Err(Error::UnresolvedHyperParam(_))));
    }

    #[test]
    fn linear_noise_recovery_end_to_end() {
        // y = 1 + 2x plus gaussian noise; a linear model cross-validated on
        // five folds should land near the noise standard deviation
        let mut rng = SmallRng::seed_from_u64(42);
        let noise_std = 0.5;
        let x = Array1::linspace(0., 10., 100);
        let noise: Array1<f64> = Array1::random_using(100, Normal::new(0., noise_std).unwrap(), &mut rng);
        let y = x.mapv(|v| 1. + 2. * v) + &noise;
        let dataset = Dataset::new(x.insert_axis(Axis(1)), y);

        let spec = crate::hyperparams::ModelSpec::new(ElasticNetFamily::linear());
        let settings = Evaluation::default();

        let folds = KFold::params(5)
            .seed(7)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();
        let run = fit_resamples(&dataset, &folds, &Pipeline::new(), &spec, &settings).unwrap();
        let summary = run.summary(0, Metric::Rmse).unwrap();
        assert!((summary.mean() - noise_std).abs() < 0.15);

        // more, smaller assessment sets shrink the standard error of the
        // mean metric
        let repeated = KFold::params(10)
            .repeats(5)
            .seed(7)
            .check()
            .unwrap()
            .partition(&dataset)
            .unwrap();
        let run_repeated =
            fit_resamples(&dataset, &repeated, &Pipeline::new(), &spec, &settings).unwrap();
        let summary_repeated = run_repeated.summary(0, Metric::Rmse).unwrap();

        assert!(summary_repeated.std_err() < summary.std_err());
    }
}
