//! Preprocessing pipelines
//!
//! A [`Pipeline`] is an ordered list of fit-then-apply steps. Fitting
//! estimates each step's statistics on the analysis subset only and freezes
//! them into a [`FittedPipeline`]; applying the frozen pipeline to the
//! assessment subset therefore never leaks assessment information into the
//! preprocessing state.

use approx::abs_diff_eq;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::dataset::Float;
use crate::error::{Error, Result};

/// An unfitted preprocessing step
pub trait PreprocessStep<F: Float>: Send + Sync {
    fn name(&self) -> &str;

    /// Estimate the step's statistics on the analysis records
    fn fit(&self, records: ArrayView2<F>) -> Result<Box<dyn TransformStep<F>>>;
}

/// A fitted step, applying frozen statistics to any record matrix
pub trait TransformStep<F: Float>: Send + Sync {
    fn transform(&self, records: Array2<F>) -> Array2<F>;
}

/// Ordered sequence of preprocessing steps
///
/// The empty pipeline is valid and acts as the identity.
#[derive(Default)]
pub struct Pipeline<F: Float> {
    steps: Vec<Box<dyn PreprocessStep<F>>>,
}

impl<F: Float> Pipeline<F> {
    pub fn new() -> Self {
        Pipeline { steps: Vec::new() }
    }

    pub fn step(mut self, step: impl PreprocessStep<F> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Fit every step in order, feeding each the output of its predecessor
    pub fn fit(&self, records: ArrayView2<F>) -> Result<FittedPipeline<F>> {
        let mut fitted = Vec::with_capacity(self.steps.len());
        let mut current = records.to_owned();
        for step in &self.steps {
            let transform = step.fit(current.view())?;
            current = transform.transform(current);
            fitted.push(transform);
        }

        Ok(FittedPipeline { steps: fitted })
    }
}

/// A pipeline with all statistics frozen
pub struct FittedPipeline<F: Float> {
    steps: Vec<Box<dyn TransformStep<F>>>,
}

impl<F: Float> FittedPipeline<F> {
    pub fn transform(&self, records: Array2<F>) -> Array2<F> {
        self.steps
            .iter()
            .fold(records, |current, step| step.transform(current))
    }
}

/// Standardization to zero mean and unit variance
///
/// Constant features are left unscaled instead of dividing by a zero
/// standard deviation.
#[derive(Debug, Clone)]
pub struct Standardize {
    with_mean: bool,
    with_std: bool,
}

impl Default for Standardize {
    fn default() -> Self {
        Standardize::new()
    }
}

impl Standardize {
    pub fn new() -> Self {
        Standardize {
            with_mean: true,
            with_std: true,
        }
    }

    pub fn with_mean(mut self, with_mean: bool) -> Self {
        self.with_mean = with_mean;
        self
    }

    pub fn with_std(mut self, with_std: bool) -> Self {
        self.with_std = with_std;
        self
    }

    /// Typed fitting entry point, also used by the trait impl
    pub fn fit_params<F: Float>(&self, records: ArrayView2<F>) -> Result<FittedStandardize<F>> {
        if records.nrows() == 0 {
            return Err(Error::NotEnoughSamples);
        }

        let offsets = if self.with_mean {
            records.mean_axis(Axis(0)).unwrap()
        } else {
            Array1::zeros(records.ncols())
        };
        let scales = if self.with_std {
            records.std_axis(Axis(0), F::zero()).mapv(|s| {
                if abs_diff_eq!(s, F::zero()) {
                    F::one()
                } else {
                    F::one() / s
                }
            })
        } else {
            Array1::ones(records.ncols())
        };

        Ok(FittedStandardize { offsets, scales })
    }
}

impl<F: Float> PreprocessStep<F> for Standardize {
    fn name(&self) -> &str {
        "standardize"
    }

    fn fit(&self, records: ArrayView2<F>) -> Result<Box<dyn TransformStep<F>>> {
        self.fit_params(records)
            .map(|fitted| Box::new(fitted) as Box<dyn TransformStep<F>>)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedStandardize<F> {
    offsets: Array1<F>,
    scales: Array1<F>,
}

impl<F: Float> FittedStandardize<F> {
    pub fn offsets(&self) -> &Array1<F> {
        &self.offsets
    }

    pub fn scales(&self) -> &Array1<F> {
        &self.scales
    }
}

impl<F: Float> TransformStep<F> for FittedStandardize<F> {
    fn transform(&self, mut records: Array2<F>) -> Array2<F> {
        for mut row in records.rows_mut() {
            row -= &self.offsets;
            row *= &self.scales;
        }
        records
    }
}

/// Rescaling of every feature into the unit interval
///
/// Constant features map onto their lower bound.
#[derive(Debug, Clone, Default)]
pub struct MinMax;

impl MinMax {
    pub fn new() -> Self {
        MinMax
    }

    pub fn fit_params<F: Float>(&self, records: ArrayView2<F>) -> Result<FittedMinMax<F>> {
        if records.nrows() == 0 {
            return Err(Error::NotEnoughSamples);
        }

        let mins = records.fold_axis(Axis(0), F::infinity(), |&acc, &x| acc.min(x));
        let maxs = records.fold_axis(Axis(0), F::neg_infinity(), |&acc, &x| acc.max(x));
        let scales = maxs.iter().zip(mins.iter()).map(|(&max, &min)| {
            if abs_diff_eq!(max - min, F::zero()) {
                F::one()
            } else {
                F::one() / (max - min)
            }
        });

        Ok(FittedMinMax {
            offsets: mins,
            scales: scales.collect(),
        })
    }
}

impl<F: Float> PreprocessStep<F> for MinMax {
    fn name(&self) -> &str {
        "min_max"
    }

    fn fit(&self, records: ArrayView2<F>) -> Result<Box<dyn TransformStep<F>>> {
        self.fit_params(records)
            .map(|fitted| Box::new(fitted) as Box<dyn TransformStep<F>>)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FittedMinMax<F> {
    offsets: Array1<F>,
    scales: Array1<F>,
}

impl<F: Float> TransformStep<F> for FittedMinMax<F> {
    fn transform(&self, mut records: Array2<F>) -> Array2<F> {
        for mut row in records.rows_mut() {
            row -= &self.offsets;
            row *= &self.scales;
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn standardize_centers_and_scales() {
        let records = array![[1., 10.], [2., 20.], [3., 30.]];
        let fitted = Standardize::new().fit_params(records.view()).unwrap();
        let out = fitted.transform(records);

        for col in 0..2 {
            assert_abs_diff_eq!(out.column(col).mean().unwrap(), 0.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(out.column(0).std(0.), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_features_are_left_unscaled() {
        let records = array![[5., 1.], [5., 2.], [5., 3.]];
        let fitted = Standardize::new().fit_params(records.view()).unwrap();

        assert_abs_diff_eq!(fitted.scales()[0], 1.0);
        let out = fitted.transform(records);
        assert!(out.column(0).iter().all(|x| x.is_finite()));
    }

    #[test]
    fn min_max_maps_to_unit_interval() {
        let records = array![[0., -4.], [5., 0.], [10., 4.]];
        let fitted = MinMax::new().fit_params(records.view()).unwrap();
        let out = fitted.transform(records);

        assert_abs_diff_eq!(out.column(0)[0], 0.0);
        assert_abs_diff_eq!(out.column(0)[2], 1.0);
        assert_abs_diff_eq!(out.column(1)[1], 0.5);
    }

    #[test]
    fn fitted_state_ignores_assessment_rows() {
        // statistics come from the fit records; transforming other rows must
        // not change them
        let analysis = array![[1., 2.], [3., 4.]];
        let fitted = Standardize::new().fit_params(analysis.view()).unwrap();
        let before = fitted.clone();

        let _ = fitted.transform(array![[100., -100.], [42., 0.]]);
        assert_eq!(before, fitted);
    }

    #[test]
    fn pipeline_chains_steps_in_order() {
        let records = array![[0., 100.], [10., 200.]];
        let pipeline = Pipeline::new().step(MinMax::new()).step(Standardize::new());
        let fitted = pipeline.fit(records.view()).unwrap();
        let out = fitted.transform(records);

        assert_abs_diff_eq!(out.column(0).mean().unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let records = array![[1., 2.], [3., 4.]];
        let fitted = Pipeline::<f64>::new().fit(records.view()).unwrap();
        assert_eq!(fitted.transform(records.clone()), records);
    }
}
