use ndarray::ArrayView1;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::hyperparams::{
    BootstrapValidParams, KFoldValidParams, MonteCarloValidParams, RollingOriginValidParams,
};
use super::{ResampleSet, Split};
use crate::dataset::{Dataset, Float};
use crate::error::{Error, Result};

impl KFoldValidParams {
    /// Partition `dataset` into `v * repeats` splits
    ///
    /// Every row lands in exactly one assessment set per repetition, so the
    /// assessment sets of one repetition tile the dataset.
    pub fn partition<F: Float>(&self, dataset: &Dataset<F>) -> Result<ResampleSet> {
        let n = dataset.nsamples();
        if n == 0 {
            return Err(Error::NotEnoughSamples);
        }
        if self.v() > n {
            return Err(Error::Partition(format!(
                "cannot split {} samples into {} folds",
                n,
                self.v()
            )));
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed());
        let strata = match self.stratify_bins() {
            Some(bins) => outcome_strata(dataset.targets(), bins),
            None => vec![(0..n).collect::<Vec<_>>()],
        };

        let mut splits = Vec::with_capacity(self.v() * self.repeats());
        for _ in 0..self.repeats() {
            let mut folds = vec![Vec::new(); self.v()];
            // one running counter across strata keeps fold sizes near-equal
            // even when strata are smaller than v
            let mut next = 0;
            for stratum in &strata {
                let mut stratum = stratum.clone();
                stratum.shuffle(&mut rng);
                for row in stratum {
                    folds[next % self.v()].push(row);
                    next += 1;
                }
            }

            for k in 0..self.v() {
                let mut assessment = folds[k].clone();
                assessment.sort_unstable();
                let mut analysis: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != k)
                    .flat_map(|(_, fold)| fold.iter().copied())
                    .collect();
                analysis.sort_unstable();
                splits.push(Split::new(splits.len(), analysis, assessment));
            }
        }

        let scheme = if self.repeats() > 1 {
            format!(
                "{}-fold cross-validation, {} repeats",
                self.v(),
                self.repeats()
            )
        } else {
            format!("{}-fold cross-validation", self.v())
        };
        Ok(ResampleSet::new(splits, scheme, self.seed()))
    }
}

/// Sort rows by outcome and chunk them into near-equal quantile bins
fn outcome_strata<F: Float>(targets: ArrayView1<F>, bins: usize) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..targets.len()).collect();
    order.sort_by(|&a, &b| targets[a].partial_cmp(&targets[b]).unwrap());

    let bins = bins.min(order.len()).max(1);
    let chunk = (order.len() + bins - 1) / bins;
    order.chunks(chunk).map(|c| c.to_vec()).collect()
}

impl BootstrapValidParams {
    /// Draw `times` bootstrap resamples from `dataset`
    ///
    /// The analysis multiset always contains exactly `n` draws; rows never
    /// drawn form the out-of-bag assessment set, which may be empty.
    pub fn partition<F: Float>(&self, dataset: &Dataset<F>) -> Result<ResampleSet> {
        let n = dataset.nsamples();
        if n == 0 {
            return Err(Error::NotEnoughSamples);
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed());
        let mut splits = Vec::with_capacity(self.times());
        for t in 0..self.times() {
            let mut drawn = vec![false; n];
            let mut analysis: Vec<usize> = (0..n)
                .map(|_| {
                    let row = rng.gen_range(0..n);
                    drawn[row] = true;
                    row
                })
                .collect();
            analysis.sort_unstable();
            let assessment: Vec<usize> = (0..n).filter(|&row| !drawn[row]).collect();
            splits.push(Split::new(t, analysis, assessment));
        }

        Ok(ResampleSet::new(
            splits,
            format!("bootstrap, {} resamples", self.times()),
            self.seed(),
        ))
    }
}

impl MonteCarloValidParams {
    /// Draw `times` independent analysis/assessment splits
    pub fn partition<F: Float>(&self, dataset: &Dataset<F>) -> Result<ResampleSet> {
        let n = dataset.nsamples();
        if n < 2 {
            return Err(Error::NotEnoughSamples);
        }

        // at least one row on each side of the split
        let n_analysis = ((self.prop() * n as f64).floor() as usize).max(1).min(n - 1);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed());
        let mut rows: Vec<usize> = (0..n).collect();
        let mut splits = Vec::with_capacity(self.times());
        for t in 0..self.times() {
            rows.shuffle(&mut rng);
            let mut analysis = rows[..n_analysis].to_vec();
            let mut assessment = rows[n_analysis..].to_vec();
            analysis.sort_unstable();
            assessment.sort_unstable();
            splits.push(Split::new(t, analysis, assessment));
        }

        Ok(ResampleSet::new(
            splits,
            format!(
                "Monte Carlo, {} resamples at {} analysis proportion",
                self.times(),
                self.prop()
            ),
            self.seed(),
        ))
    }
}

impl RollingOriginValidParams {
    /// Split an ordered dataset into forward-moving windows
    pub fn partition<F: Float>(&self, dataset: &Dataset<F>) -> Result<ResampleSet> {
        let n = dataset.nsamples();
        if self.initial() + self.assess() > n {
            return Err(Error::Partition(format!(
                "an analysis window of {} plus an assessment window of {} does not fit {} samples",
                self.initial(),
                self.assess(),
                n
            )));
        }

        let mut splits = Vec::new();
        let mut step = 0;
        loop {
            let origin = step * (self.skip() + 1);
            let analysis_start = if self.cumulative() { 0 } else { origin };
            let analysis_end = origin + self.initial();
            let assessment_end = analysis_end + self.assess();
            if assessment_end > n {
                break;
            }

            splits.push(Split::new(
                step,
                (analysis_start..analysis_end).collect(),
                (analysis_end..assessment_end).collect(),
            ));
            step += 1;
        }

        Ok(ResampleSet::new(
            splits,
            format!(
                "rolling origin, {} analysis / {} assessment",
                self.initial(),
                self.assess()
            ),
            0,
        ))
    }
}
