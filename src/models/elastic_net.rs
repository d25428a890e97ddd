//! Elastic net regression by coordinate descent
//!
//! One solver covers the whole regularization family: `l1_ratio = 1` is the
//! lasso, `l1_ratio = 0` is ridge and `penalty = 0` degenerates to ordinary
//! least squares. The engine uses it both as a tunable model family and as
//! the sparse meta-model of the ensemble blender.

use approx::{abs_diff_eq, abs_diff_ne};
use ndarray::{s, Array1, ArrayView1, ArrayView2, Axis};

use crate::dataset::Float;
use crate::error::{Error, Result};
use crate::hyperparams::Config;
use crate::param_guard::ParamGuard;
use crate::traits::{ModelFamily, Regressor};

/// Elastic net model
///
/// Configures and minimizes the following objective function:
/// ```ignore
/// 1 / (2 * n_samples) * ||y - Xw||^2_2
///     + penalty * l1_ratio * ||w||_1
///     + 0.5 * penalty * (1 - l1_ratio) * ||w||^2_2
/// ```
pub struct ElasticNet;

impl ElasticNet {
    /// Create a default parameter set
    ///
    /// By default an intercept is fitted, the penalty is `1.0` and it is
    /// split evenly between the L1 and L2 terms.
    pub fn params<F: Float>() -> ElasticNetParams<F> {
        ElasticNetParams::new()
    }

    /// Create a ridge only parameter set
    pub fn ridge<F: Float>() -> ElasticNetParams<F> {
        ElasticNetParams::new().l1_ratio(F::zero())
    }

    /// Create a lasso only parameter set
    pub fn lasso<F: Float>() -> ElasticNetParams<F> {
        ElasticNetParams::new().l1_ratio(F::one())
    }

    /// Create an unpenalized least squares parameter set
    pub fn least_squares<F: Float>() -> ElasticNetParams<F> {
        ElasticNetParams::new().penalty(F::zero())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElasticNetValidParams<F> {
    penalty: F,
    l1_ratio: F,
    with_intercept: bool,
    max_iterations: u32,
    tolerance: F,
}

impl<F: Float> ElasticNetValidParams<F> {
    pub fn penalty(&self) -> F {
        self.penalty
    }

    pub fn l1_ratio(&self) -> F {
        self.l1_ratio
    }

    pub fn with_intercept(&self) -> bool {
        self.with_intercept
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn tolerance(&self) -> F {
        self.tolerance
    }

    /// Fit an elastic net model on `records` with outcomes `targets`
    ///
    /// With an intercept both sides are centered first and the intercept is
    /// recovered from the feature means, so unpenalized fits reproduce
    /// ordinary least squares on uncentered features.
    pub fn fit(&self, records: ArrayView2<F>, targets: ArrayView1<F>) -> Result<FittedElasticNet<F>> {
        if records.nrows() == 0 {
            return Err(Error::NotEnoughSamples);
        }

        if self.with_intercept {
            let record_means = records.mean_axis(Axis(0)).unwrap();
            let target_mean = targets.mean().unwrap();
            let centered_records = &records - &record_means;
            let centered_targets = &targets - target_mean;

            let (weights, duality_gap, n_steps) = coordinate_descent(
                centered_records.view(),
                centered_targets.view(),
                self.tolerance,
                self.max_iterations,
                self.l1_ratio,
                self.penalty,
            );
            let intercept = target_mean - record_means.dot(&weights);

            Ok(FittedElasticNet {
                weights,
                intercept,
                duality_gap,
                n_steps,
            })
        } else {
            let (weights, duality_gap, n_steps) = coordinate_descent(
                records,
                targets,
                self.tolerance,
                self.max_iterations,
                self.l1_ratio,
                self.penalty,
            );

            Ok(FittedElasticNet {
                weights,
                intercept: F::zero(),
                duality_gap,
                n_steps,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElasticNetParams<F>(ElasticNetValidParams<F>);

impl<F: Float> Default for ElasticNetParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> ElasticNetParams<F> {
    pub fn new() -> Self {
        Self(ElasticNetValidParams {
            penalty: F::one(),
            l1_ratio: F::cast(0.5),
            with_intercept: true,
            max_iterations: 1000,
            tolerance: F::cast(1e-4),
        })
    }

    /// Overall penalty strength, otherwise known as `alpha`
    pub fn penalty(mut self, penalty: F) -> Self {
        self.0.penalty = penalty;
        self
    }

    /// Distribution of the penalty between L1 and L2 regularization
    ///
    /// Must lie in `[0, 1]`; `1.0` is pure lasso, `0.0` pure ridge.
    pub fn l1_ratio(mut self, l1_ratio: F) -> Self {
        self.0.l1_ratio = l1_ratio;
        self
    }

    pub fn with_intercept(mut self, with_intercept: bool) -> Self {
        self.0.with_intercept = with_intercept;
        self
    }

    /// Minimum relative change of the weights for optimization to continue
    pub fn tolerance(mut self, tolerance: F) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.0.max_iterations = max_iterations;
        self
    }
}

impl<F: Float> ParamGuard for ElasticNetParams<F> {
    type Checked = ElasticNetValidParams<F>;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.penalty.is_negative() {
            Err(Error::Parameters(format!(
                "penalty must not be negative, got {}",
                self.0.penalty
            )))
        } else if !(F::zero()..=F::one()).contains(&self.0.l1_ratio) {
            Err(Error::Parameters(format!(
                "l1 ratio must lie in [0, 1], got {}",
                self.0.l1_ratio
            )))
        } else if self.0.tolerance.is_negative() {
            Err(Error::Parameters(format!(
                "tolerance must not be negative, got {}",
                self.0.tolerance
            )))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// A fitted elastic net model
#[derive(Debug, Clone, PartialEq)]
pub struct FittedElasticNet<F> {
    weights: Array1<F>,
    intercept: F,
    duality_gap: F,
    n_steps: u32,
}

impl<F: Float> FittedElasticNet<F> {
    pub fn weights(&self) -> &Array1<F> {
        &self.weights
    }

    /// The fitted intercept, `0.` if none was fitted
    pub fn intercept(&self) -> F {
        self.intercept
    }

    pub fn n_steps(&self) -> u32 {
        self.n_steps
    }

    pub fn duality_gap(&self) -> F {
        self.duality_gap
    }
}

impl<F: Float> Regressor<F> for FittedElasticNet<F> {
    fn predict(&self, records: ArrayView2<F>) -> Array1<F> {
        records.dot(&self.weights) + self.intercept
    }
}

/// Cyclic coordinate descent with duality gap stopping
fn coordinate_descent<F: Float>(
    x: ArrayView2<F>,
    y: ArrayView1<F>,
    tol: F,
    max_steps: u32,
    l1_ratio: F,
    penalty: F,
) -> (Array1<F>, F, u32) {
    let n_samples = F::cast(x.nrows());
    let n_features = x.ncols();
    let mut weights = Array1::<F>::zeros(n_features);
    // residuals `y - X*w`, updated in place as single weights move
    let mut residuals = y.to_owned();
    let mut n_steps = 0u32;
    let norm_cols_x = x.map_axis(Axis(0), |col| col.dot(&col));
    let mut gap = F::one() + tol;
    let weight_tol = tol;
    let gap_tol = tol * y.dot(&y);

    while n_steps < max_steps {
        let mut weight_max = F::zero();
        let mut delta_max = F::zero();
        for feature in 0..n_features {
            if abs_diff_eq!(norm_cols_x[feature], F::zero()) {
                continue;
            }

            let old_weight = weights[feature];
            let column: ArrayView1<F> = x.slice(s![.., feature]);
            if abs_diff_ne!(old_weight, F::zero()) {
                residuals += &(&column * old_weight);
            }
            let dot = column.dot(&residuals);
            weights[feature] = dot.signum()
                * F::max(dot.abs() - n_samples * l1_ratio * penalty, F::zero())
                / (norm_cols_x[feature] + n_samples * (F::one() - l1_ratio) * penalty);
            if abs_diff_ne!(weights[feature], F::zero()) {
                residuals -= &(&column * weights[feature]);
            }

            delta_max = F::max(delta_max, (weights[feature] - old_weight).abs());
            weight_max = F::max(weight_max, weights[feature].abs());
        }
        n_steps += 1;

        if n_steps == max_steps - 1
            || abs_diff_eq!(weight_max, F::zero())
            || delta_max / weight_max < weight_tol
        {
            // plausible stopping point, the duality gap decides
            gap = duality_gap(x, y, weights.view(), residuals.view(), l1_ratio, penalty);
            if gap < gap_tol {
                break;
            }
        }
    }

    (weights, gap, n_steps)
}

fn duality_gap<F: Float>(
    x: ArrayView2<F>,
    y: ArrayView1<F>,
    weights: ArrayView1<F>,
    residuals: ArrayView1<F>,
    l1_ratio: F,
    penalty: F,
) -> F {
    let half = F::cast(0.5);
    let n_samples = F::cast(x.nrows());
    let l1_reg = l1_ratio * penalty * n_samples;
    let l2_reg = (F::one() - l1_ratio) * penalty * n_samples;
    let xta = x.t().dot(&residuals) - &weights * l2_reg;

    let dual_norm_xta = xta.fold(F::zero(), |abs_max, &x| abs_max.max(x.abs()));
    let r_norm2 = residuals.dot(&residuals);
    let w_norm2 = weights.dot(&weights);
    let (constant, mut gap) = if dual_norm_xta > l1_reg {
        let constant = l1_reg / dual_norm_xta;
        let a_norm2 = r_norm2 * constant * constant;
        (constant, half * (r_norm2 + a_norm2))
    } else {
        (F::one(), r_norm2)
    };
    let l1_norm = weights.fold(F::zero(), |sum, w| sum + w.abs());
    gap += l1_reg * l1_norm - constant * residuals.dot(&y)
        + half * l2_reg * (F::one() + constant * constant) * w_norm2;
    gap
}

/// The elastic net family as seen by the evaluation machinery
///
/// Recognized hyperparameters are `penalty` and `l1_ratio`; values missing
/// from a configuration keep the family's defaults.
#[derive(Clone, Debug)]
pub struct ElasticNetFamily<F: Float> {
    name: &'static str,
    base: ElasticNetParams<F>,
}

impl<F: Float> ElasticNetFamily<F> {
    pub fn new() -> Self {
        ElasticNetFamily {
            name: "elastic_net",
            base: ElasticNet::params(),
        }
    }

    pub fn lasso() -> Self {
        ElasticNetFamily {
            name: "lasso",
            base: ElasticNet::lasso(),
        }
    }

    pub fn ridge() -> Self {
        ElasticNetFamily {
            name: "ridge",
            base: ElasticNet::ridge(),
        }
    }

    /// An unpenalized linear regression family
    pub fn linear() -> Self {
        ElasticNetFamily {
            name: "linear",
            base: ElasticNet::least_squares(),
        }
    }
}

impl<F: Float> Default for ElasticNetFamily<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> ModelFamily<F> for ElasticNetFamily<F> {
    fn name(&self) -> &str {
        self.name
    }

    fn fit(
        &self,
        config: &Config<F>,
        records: ArrayView2<F>,
        targets: ArrayView1<F>,
    ) -> Result<Box<dyn Regressor<F>>> {
        let mut params = self.base.clone();
        if let Some(penalty) = config.try_get("penalty") {
            params = params.penalty(penalty);
        }
        if let Some(l1_ratio) = config.try_get("l1_ratio") {
            params = params.l1_ratio(l1_ratio);
        }

        let fitted = params.check()?.fit(records, targets)?;
        Ok(Box::new(fitted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn least_squares_fits_a_line_through_two_dots() {
        let records = array![[0.0f64], [1.0]];
        let targets = array![1.0, 2.0];
        let model = ElasticNet::least_squares()
            .check()
            .unwrap()
            .fit(records.view(), targets.view())
            .unwrap();

        let prediction = model.predict(records.view());
        assert_abs_diff_eq!(prediction, array![1., 2.], epsilon = 1e-6);
        assert_abs_diff_eq!(model.weights()[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn large_lasso_penalty_zeroes_all_weights() {
        let records = array![[1.0f64, 0.5], [2., 1.5], [3., 0.2], [4., 1.1]];
        let targets = array![1., 2., 3., 4.];
        let model = ElasticNet::lasso()
            .penalty(1e3)
            .check()
            .unwrap()
            .fit(records.view(), targets.view())
            .unwrap();

        assert!(model.weights().iter().all(|w| *w == 0.0));
        // with all weights zeroed the prediction falls back to the intercept
        assert_abs_diff_eq!(model.intercept(), 2.5);
    }

    #[test]
    fn ridge_shrinks_weights_towards_zero() {
        let records = array![[0.0f64], [1.0], [2.0], [3.0]];
        let targets = array![0.0, 1.0, 2.0, 3.0];

        let plain = ElasticNet::least_squares()
            .check()
            .unwrap()
            .fit(records.view(), targets.view())
            .unwrap();
        let ridge = ElasticNet::ridge()
            .penalty(10.0)
            .check()
            .unwrap()
            .fit(records.view(), targets.view())
            .unwrap();

        assert_abs_diff_eq!(plain.weights()[0], 1.0, epsilon = 1e-6);
        assert!(ridge.weights()[0] < plain.weights()[0]);
        assert!(ridge.weights()[0] > 0.0);
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(ElasticNet::params::<f64>().penalty(-1.0).check().is_err());
        assert!(ElasticNet::params::<f64>().l1_ratio(1.5).check().is_err());
        assert!(ElasticNet::params::<f64>().tolerance(-0.1).check().is_err());
    }

    #[test]
    fn family_reads_config_values() {
        let records = array![[0.0f64], [1.0], [2.0], [3.0]];
        let targets = array![0.0, 1.0, 2.0, 3.0];

        let family = ElasticNetFamily::new();
        let config = Config::new().with("penalty", 0.0).with("l1_ratio", 1.0);
        let model = family
            .fit(&config, records.view(), targets.view())
            .unwrap();

        assert_abs_diff_eq!(
            model.predict(records.view()),
            array![0., 1., 2., 3.],
            epsilon = 1e-6
        );
    }

    #[test]
    fn family_rejects_invalid_config_values() {
        let family = ElasticNetFamily::<f64>::new();
        let config = Config::new().with("penalty", -2.0);
        let records = array![[0.0f64], [1.0]];
        let targets = array![0.0, 1.0];

        assert!(family.fit(&config, records.view(), targets.view()).is_err());
    }
}
