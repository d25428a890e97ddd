use super::{Evaluation, FitFailure, MetricRecord, RowPrediction};
use crate::dataset::{Dataset, Float};
use crate::error::Error;
use crate::hyperparams::Config;
use crate::pipeline::Pipeline;
use crate::resampling::Split;
use crate::traits::ModelFamily;

/// Fit and score one split/configuration pair
///
/// The pipeline is fitted on the analysis subset only and applied frozen to
/// both subsets, then the family is fitted on the transformed analysis data
/// and scored on the transformed assessment data. Every error on the way is
/// captured as a [`FitFailure`] tagged with the split and configuration, so
/// sibling cells are never affected.
///
/// # Panics
///
/// When the split's assessment set is empty; the orchestrator skips such
/// splits before dispatching.
pub fn evaluate_cell<F: Float>(
    dataset: &Dataset<F>,
    split: &Split,
    pipeline: &Pipeline<F>,
    family: &dyn ModelFamily<F>,
    config: &Config<F>,
    config_id: usize,
    settings: &Evaluation,
) -> std::result::Result<MetricRecord<F>, FitFailure> {
    let fail = |error: Error| FitFailure {
        split_id: split.id(),
        config_id,
        error: error.to_string(),
    };

    let (analysis_records, analysis_targets) = dataset.select(split.analysis());
    let (assessment_records, assessment_targets) = dataset.select(split.assessment());

    let fitted_pipeline = pipeline.fit(analysis_records.view()).map_err(fail)?;
    let analysis_records = fitted_pipeline.transform(analysis_records);
    let assessment_records = fitted_pipeline.transform(assessment_records);

    let model = family
        .fit(config, analysis_records.view(), analysis_targets.view())
        .map_err(fail)?;
    let prediction = model.predict(assessment_records.view());

    let values = settings
        .metrics()
        .iter()
        .map(|&metric| {
            (
                metric,
                metric.compute(prediction.view(), assessment_targets.view()),
            )
        })
        .collect();

    let predictions = if settings.retains_predictions() {
        Some(
            split
                .assessment()
                .iter()
                .zip(prediction.iter())
                .zip(assessment_targets.iter())
                .map(|((&row, &prediction), &truth)| RowPrediction {
                    row,
                    prediction,
                    truth,
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(MetricRecord::new(
        split.id(),
        config_id,
        values,
        predictions,
    ))
}
