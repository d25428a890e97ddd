//! Hyperparameter values, ranges and model specifications
//!
//! A [`ModelSpec`] pairs a model family with named hyperparameters, each
//! either [`HyperValue::Fixed`] or [`HyperValue::Tunable`] over a declared
//! range. Search strategies replace every `Tunable` with a concrete value,
//! producing a [`Config`] which is the only form a family will accept.

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use std::fmt;
use std::sync::Arc;

use crate::dataset::Float;
use crate::error::{Error, Result};
use crate::traits::ModelFamily;

/// Scale on which a tunable parameter is searched
///
/// Penalty-like parameters spanning several orders of magnitude are searched
/// on [`Scale::Log`], so a uniform draw in unit space lands uniformly in
/// exponent space.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Linear,
    Log,
}

/// Valid range of one tunable hyperparameter
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange<F> {
    lo: F,
    hi: F,
    scale: Scale,
}

impl<F: Float> ParamRange<F> {
    pub fn linear(lo: F, hi: F) -> Self {
        ParamRange {
            lo,
            hi,
            scale: Scale::Linear,
        }
    }

    pub fn log(lo: F, hi: F) -> Self {
        ParamRange {
            lo,
            hi,
            scale: Scale::Log,
        }
    }

    pub fn lo(&self) -> F {
        self.lo
    }

    pub fn hi(&self) -> F {
        self.hi
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    pub(crate) fn validate(&self, name: &str) -> Result<()> {
        if !(self.lo < self.hi) {
            return Err(Error::Parameters(format!(
                "range of {} must satisfy lo < hi",
                name
            )));
        }
        if self.scale == Scale::Log && self.lo <= F::zero() {
            return Err(Error::Parameters(format!(
                "log-scaled range of {} must be strictly positive",
                name
            )));
        }

        Ok(())
    }

    /// Map a unit-interval coordinate onto the range, honoring the scale
    pub(crate) fn from_unit(&self, u: f64) -> F {
        let u = F::cast(u.clamp(0.0, 1.0));
        match self.scale {
            Scale::Linear => self.lo + u * (self.hi - self.lo),
            Scale::Log => self.lo * (self.hi / self.lo).powf(u),
        }
    }

    /// Inverse of [`from_unit`](Self::from_unit)
    pub(crate) fn to_unit(&self, value: F) -> f64 {
        let u = match self.scale {
            Scale::Linear => (value - self.lo) / (self.hi - self.lo),
            Scale::Log => (value / self.lo).ln() / (self.hi / self.lo).ln(),
        };
        u.to_f64().unwrap().clamp(0.0, 1.0)
    }
}

/// A hyperparameter value: concrete, or still to be searched
#[derive(Debug, Clone, PartialEq)]
pub enum HyperValue<F> {
    Fixed(F),
    Tunable(ParamRange<F>),
}

/// A fully resolved hyperparameter assignment
///
/// Insertion order is preserved, so iterating a `Config` yields parameters in
/// the order the [`ModelSpec`] declared them.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config<F> {
    values: Vec<(String, F)>,
}

impl<F: Float> Config<F> {
    pub fn new() -> Self {
        Config { values: Vec::new() }
    }

    pub fn with(mut self, name: impl Into<String>, value: F) -> Self {
        self.insert(name.into(), value);
        self
    }

    pub(crate) fn insert(&mut self, name: String, value: F) {
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.values.push((name, value)),
        }
    }

    /// Look up a parameter, failing on unknown names
    pub fn get(&self, name: &str) -> Result<F> {
        self.try_get(name)
            .ok_or_else(|| Error::UnknownHyperParam(name.to_string()))
    }

    /// Look up a parameter the family treats as optional
    pub fn try_get(&self, name: &str) -> Option<F> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, F)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<F: Float> fmt::Display for Config<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// A model family plus its declared hyperparameters
///
/// ```
/// use retune::hyperparams::{ModelSpec, ParamRange};
/// use retune::models::ElasticNetFamily;
///
/// let spec = ModelSpec::new(ElasticNetFamily::lasso())
///     .tunable("penalty", ParamRange::log(1e-4, 1.0))
///     .fixed("l1_ratio", 1.0);
/// assert_eq!(spec.tunables().len(), 1);
/// ```
#[derive(Clone)]
pub struct ModelSpec<F: Float> {
    family: Arc<dyn ModelFamily<F>>,
    params: Vec<(String, HyperValue<F>)>,
}

impl<F: Float> ModelSpec<F> {
    pub fn new(family: impl ModelFamily<F> + 'static) -> Self {
        ModelSpec {
            family: Arc::new(family),
            params: Vec::new(),
        }
    }

    pub fn fixed(mut self, name: impl Into<String>, value: F) -> Self {
        self.set(name.into(), HyperValue::Fixed(value));
        self
    }

    pub fn tunable(mut self, name: impl Into<String>, range: ParamRange<F>) -> Self {
        self.set(name.into(), HyperValue::Tunable(range));
        self
    }

    fn set(&mut self, name: String, value: HyperValue<F>) {
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.params.push((name, value)),
        }
    }

    pub fn family(&self) -> &dyn ModelFamily<F> {
        &*self.family
    }

    pub(crate) fn family_arc(&self) -> Arc<dyn ModelFamily<F>> {
        Arc::clone(&self.family)
    }

    /// The still-tunable parameters, in declaration order
    pub fn tunables(&self) -> Vec<(&str, ParamRange<F>)> {
        self.params
            .iter()
            .filter_map(|(name, value)| match value {
                HyperValue::Tunable(range) => Some((name.as_str(), *range)),
                HyperValue::Fixed(_) => None,
            })
            .collect()
    }

    /// Substitute every tunable with the matching value of `assignment`
    ///
    /// `assignment` pairs up with [`tunables`](Self::tunables) by position.
    pub fn resolve(&self, assignment: &[F]) -> Result<Config<F>> {
        let tunables = self.tunables();
        if assignment.len() != tunables.len() {
            return Err(Error::Parameters(format!(
                "expected {} tunable values, got {}",
                tunables.len(),
                assignment.len()
            )));
        }

        let mut config = Config::new();
        let mut next = 0;
        for (name, value) in &self.params {
            let resolved = match value {
                HyperValue::Fixed(v) => *v,
                HyperValue::Tunable(_) => {
                    let v = assignment[next];
                    next += 1;
                    v
                }
            };
            config.insert(name.clone(), resolved);
        }

        Ok(config)
    }

    /// The configuration of a spec without tunables
    ///
    /// Fails with [`Error::UnresolvedHyperParam`] when a tunable is left, a
    /// family never sees an unresolved marker.
    pub fn fixed_config(&self) -> Result<Config<F>> {
        for (name, value) in &self.params {
            if let HyperValue::Tunable(_) = value {
                return Err(Error::UnresolvedHyperParam(name.clone()));
            }
        }
        self.resolve(&[])
    }

    pub(crate) fn validate_tunables(&self) -> Result<()> {
        for (name, range) in self.tunables() {
            range.validate(name)?;
        }
        Ok(())
    }
}

impl<F: Float> fmt::Debug for ModelSpec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSpec")
            .field("family", &self.family.name())
            .field("params", &self.params)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ElasticNetFamily;
    use approx::assert_abs_diff_eq;

    #[test]
    fn unit_mapping_roundtrips() {
        let linear = ParamRange::linear(-2.0, 6.0);
        assert_abs_diff_eq!(linear.from_unit(0.5), 2.0);
        assert_abs_diff_eq!(linear.to_unit(2.0), 0.5);

        let log = ParamRange::log(1e-4, 1.0);
        assert_abs_diff_eq!(log.from_unit(0.0), 1e-4);
        assert_abs_diff_eq!(log.from_unit(1.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(log.to_unit(1e-2), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(ParamRange::linear(1.0, 1.0).validate("x").is_err());
        assert!(ParamRange::log(0.0, 1.0).validate("x").is_err());
        assert!(ParamRange::log(1e-6, 1e-2).validate("x").is_ok());
    }

    #[test]
    fn resolve_substitutes_in_declaration_order() {
        let spec = ModelSpec::new(ElasticNetFamily::new())
            .fixed("l1_ratio", 0.5)
            .tunable("penalty", ParamRange::log(1e-4, 1.0));

        let config = spec.resolve(&[0.1]).unwrap();
        assert_abs_diff_eq!(config.get("l1_ratio").unwrap(), 0.5);
        assert_abs_diff_eq!(config.get("penalty").unwrap(), 0.1);

        assert!(matches!(
            spec.fixed_config(),
            Err(Error::UnresolvedHyperParam(_))
        ));
        assert!(matches!(spec.resolve(&[]), Err(Error::Parameters(_))));
    }

    #[test]
    fn config_lookup() {
        let config = Config::new().with("penalty", 0.1).with("k", 3.0);
        assert_abs_diff_eq!(config.get("penalty").unwrap(), 0.1);
        assert!(config.try_get("missing").is_none());
        assert!(matches!(
            config.get("missing"),
            Err(Error::UnknownHyperParam(_))
        ));
        assert_eq!(format!("{}", config), "penalty=0.1, k=3");
    }
}
