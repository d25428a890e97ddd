use crate::error::{Error, Result};
use crate::param_guard::ParamGuard;

/// V-fold cross-validation splitting
///
/// Shuffled row indices are dealt into `v` near-equal folds; each split uses
/// one fold as assessment and the remainder as analysis. With stratification
/// the dealing happens within outcome quantile bins, so every fold mirrors
/// the outcome distribution of the whole dataset. A stratum smaller than `v`
/// is spread round-robin rather than raising an error.
pub struct KFold;

impl KFold {
    pub fn params(v: usize) -> KFoldParams {
        KFoldParams(KFoldValidParams {
            v,
            repeats: 1,
            stratify_bins: None,
            seed: 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KFoldValidParams {
    v: usize,
    repeats: usize,
    stratify_bins: Option<usize>,
    seed: u64,
}

impl KFoldValidParams {
    pub fn v(&self) -> usize {
        self.v
    }

    pub fn repeats(&self) -> usize {
        self.repeats
    }

    pub fn stratify_bins(&self) -> Option<usize> {
        self.stratify_bins
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KFoldParams(KFoldValidParams);

impl KFoldParams {
    /// Number of independent repetitions of the whole partitioning
    ///
    /// Defaults to `1` if not set
    pub fn repeats(mut self, repeats: usize) -> Self {
        self.0.repeats = repeats;
        self
    }

    /// Stratify fold assignment by binning the outcome into `bins` quantile
    /// groups
    pub fn stratify_bins(mut self, bins: usize) -> Self {
        self.0.stratify_bins = Some(bins);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl ParamGuard for KFoldParams {
    type Checked = KFoldValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.v < 2 {
            Err(Error::Parameters(format!(
                "at least two folds are required, got {}",
                self.0.v
            )))
        } else if self.0.repeats == 0 {
            Err(Error::Parameters("repeats must be positive".to_string()))
        } else if self.0.stratify_bins.map(|b| b < 2).unwrap_or(false) {
            Err(Error::Parameters(
                "stratification needs at least two bins".to_string(),
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

/// Bootstrap splitting
///
/// Each split draws `n` rows with replacement as analysis; the rows never
/// drawn form the out-of-bag assessment set. An empty assessment set is a
/// valid split, it is skipped during aggregation rather than rejected here.
pub struct Bootstrap;

impl Bootstrap {
    pub fn params(times: usize) -> BootstrapParams {
        BootstrapParams(BootstrapValidParams { times, seed: 0 })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapValidParams {
    times: usize,
    seed: u64,
}

impl BootstrapValidParams {
    pub fn times(&self) -> usize {
        self.times
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapParams(BootstrapValidParams);

impl BootstrapParams {
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl ParamGuard for BootstrapParams {
    type Checked = BootstrapValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.times == 0 {
            Err(Error::Parameters(
                "at least one bootstrap repetition is required".to_string(),
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

/// Monte Carlo splitting
///
/// Each of the `times` splits draws a `prop` fraction of the rows without
/// replacement as analysis and keeps the remainder as assessment. Repeats
/// are independent, so assessment sets overlap across splits.
pub struct MonteCarlo;

impl MonteCarlo {
    pub fn params(prop: f64, times: usize) -> MonteCarloParams {
        MonteCarloParams(MonteCarloValidParams {
            prop,
            times,
            seed: 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloValidParams {
    prop: f64,
    times: usize,
    seed: u64,
}

impl MonteCarloValidParams {
    pub fn prop(&self) -> f64 {
        self.prop
    }

    pub fn times(&self) -> usize {
        self.times
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloParams(MonteCarloValidParams);

impl MonteCarloParams {
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl ParamGuard for MonteCarloParams {
    type Checked = MonteCarloValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !(0.0..1.0).contains(&self.0.prop) || self.0.prop == 0.0 {
            Err(Error::Parameters(format!(
                "analysis proportion must lie strictly between 0 and 1, got {}",
                self.0.prop
            )))
        } else if self.0.times == 0 {
            Err(Error::Parameters(
                "at least one Monte Carlo repetition is required".to_string(),
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

/// Rolling-origin splitting for ordered data
///
/// The analysis window covers `initial` rows (growing from the start when
/// `cumulative` is set), the assessment window the `assess` rows immediately
/// after it. Each step advances the origin by `skip + 1` rows and splitting
/// stops when the assessment window would pass the end of the dataset.
pub struct RollingOrigin;

impl RollingOrigin {
    pub fn params(initial: usize, assess: usize) -> RollingOriginParams {
        RollingOriginParams(RollingOriginValidParams {
            initial,
            assess,
            skip: 0,
            cumulative: false,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingOriginValidParams {
    initial: usize,
    assess: usize,
    skip: usize,
    cumulative: bool,
}

impl RollingOriginValidParams {
    pub fn initial(&self) -> usize {
        self.initial
    }

    pub fn assess(&self) -> usize {
        self.assess
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    pub fn cumulative(&self) -> bool {
        self.cumulative
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingOriginParams(RollingOriginValidParams);

impl RollingOriginParams {
    /// Additional rows skipped when the origin advances
    ///
    /// Defaults to `0`, advancing one row per step
    pub fn skip(mut self, skip: usize) -> Self {
        self.0.skip = skip;
        self
    }

    /// Grow the analysis window from the start instead of sliding it
    pub fn cumulative(mut self, cumulative: bool) -> Self {
        self.0.cumulative = cumulative;
        self
    }
}

impl ParamGuard for RollingOriginParams {
    type Checked = RollingOriginValidParams;
    type Error = Error;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.initial == 0 {
            Err(Error::Parameters(
                "the analysis window must contain at least one row".to_string(),
            ))
        } else if self.0.assess == 0 {
            Err(Error::Parameters(
                "the assessment window must contain at least one row".to_string(),
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
