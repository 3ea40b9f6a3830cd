//! # Observables and parameters
//!
//! The [Registry] owns every named scalar of a model. Pdfs never look variables up
//! by name: they keep the [VarId] handle returned at declaration time and read the
//! value from a snapshot (`&[f64]` indexed by [VarId::index]) when they are evaluated.
//!
//! There are 3 kinds of variables:
//!  - **Observables** ([Registry::observable]): the variable the data is measured in.
//!     They always have finite bounds (their support) and can own named [Range]s.
//!  - **Free parameters** ([Registry::parameter], [Registry::unbounded_parameter]):
//!     moved by the minimizer during a fit.
//!  - **Constants** ([Registry::constant]): parameters that are never fitted.
//!     A parameter can be frozen or released later with [Registry::set_constant].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::ContinuousDomain;
use crate::errors::{FitError, Result};
use crate::range::{Range, RangeSet};

/// Handle to a variable of a [Registry].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VarId(usize);

impl VarId {
    /// Position of the variable in the value snapshot of the registry.
    pub const fn index(self) -> usize {
        return self.0;
    }
}

/// A named scalar with an optional domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    value: f64,
    domain: ContinuousDomain,
    constant: bool,
    observable: bool,
    ranges: RangeSet,
}

impl Variable {
    pub fn name(&self) -> &str {
        return &self.name;
    }

    pub const fn value(&self) -> f64 {
        return self.value;
    }

    pub const fn domain(&self) -> &ContinuousDomain {
        return &self.domain;
    }

    pub const fn is_constant(&self) -> bool {
        return self.constant;
    }

    pub const fn is_observable(&self) -> bool {
        return self.observable;
    }

    /// A parameter the minimizer is allowed to move.
    pub const fn is_free(&self) -> bool {
        return !self.constant && !self.observable;
    }

    pub const fn ranges(&self) -> &RangeSet {
        return &self.ranges;
    }
}

/// Owner of all the variables of a model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    variables: Vec<Variable>,
    by_name: HashMap<String, VarId>,
}

impl Registry {
    pub fn new() -> Registry {
        return Registry::default();
    }

    fn insert(&mut self, variable: Variable) -> Result<VarId> {
        if self.by_name.contains_key(&variable.name) {
            return Err(FitError::DuplicateName(variable.name));
        }
        if !variable.value.is_finite() {
            return Err(FitError::InvalidParameter {
                name: variable.name,
                reason: String::from("the value must be finite"),
            });
        }

        let id: VarId = VarId(self.variables.len());
        self.by_name.insert(variable.name.clone(), id);
        self.variables.push(variable);
        return Ok(id);
    }

    /// Declares an observable with the support `[min, max]`.
    ///
    /// The bounds must be finite and `min < max`. The current value is set to the
    /// middle of the support.
    pub fn observable(&mut self, name: &str, min: f64, max: f64) -> Result<VarId> {
        #[allow(clippy::nonminimal_bool)]
        if !min.is_finite() || !max.is_finite() || !(min < max) {
            return Err(FitError::InvalidRange {
                name: name.to_string(),
                low: min,
                high: max,
            });
        }

        return self.insert(Variable {
            name: name.to_string(),
            value: 0.5 * (min + max),
            domain: ContinuousDomain::Range(min, max),
            constant: true,
            observable: true,
            ranges: RangeSet::new(),
        });
    }

    /// Declares a parameter that is never fitted.
    pub fn constant(&mut self, name: &str, value: f64) -> Result<VarId> {
        return self.insert(Variable {
            name: name.to_string(),
            value,
            domain: ContinuousDomain::Reals,
            constant: true,
            observable: false,
            ranges: RangeSet::new(),
        });
    }

    /// Declares a free parameter with bounds `[min, max]`. Infinite bounds are allowed
    /// (`0.0, f64::INFINITY` gives a parameter bounded only from below).
    ///
    /// If `value` is outside the bounds it is moved to the closest bound
    /// (and a warning is logged).
    pub fn parameter(&mut self, name: &str, value: f64, min: f64, max: f64) -> Result<VarId> {
        if min.is_nan() || max.is_nan() || max <= min {
            return Err(FitError::InvalidParameter {
                name: name.to_string(),
                reason: format!("invalid bounds [{min}, {max}]"),
            });
        }

        let domain: ContinuousDomain = ContinuousDomain::from_bounds(Some(min), Some(max));
        let clamped: f64 = domain.clamp(value);
        if clamped != value {
            log::warn!("Value {value} of `{name}` is outside [{min}, {max}], using {clamped}. ");
        }

        return self.insert(Variable {
            name: name.to_string(),
            value: clamped,
            domain,
            constant: false,
            observable: false,
            ranges: RangeSet::new(),
        });
    }

    /// Declares a free parameter without bounds.
    pub fn unbounded_parameter(&mut self, name: &str, value: f64) -> Result<VarId> {
        return self.insert(Variable {
            name: name.to_string(),
            value,
            domain: ContinuousDomain::Reals,
            constant: false,
            observable: false,
            ranges: RangeSet::new(),
        });
    }

    pub fn get(&self, id: VarId) -> Result<&Variable> {
        return self
            .variables
            .get(id.0)
            .ok_or_else(|| FitError::UnknownVariable(format!("#{}", id.0)));
    }

    fn get_mut(&mut self, id: VarId) -> Result<&mut Variable> {
        return self
            .variables
            .get_mut(id.0)
            .ok_or_else(|| FitError::UnknownVariable(format!("#{}", id.0)));
    }

    /// Looks a variable up by name.
    pub fn find(&self, name: &str) -> Result<VarId> {
        return self
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| FitError::UnknownVariable(name.to_string()));
    }

    pub fn name(&self, id: VarId) -> Result<&str> {
        return self.get(id).map(Variable::name);
    }

    pub fn value(&self, id: VarId) -> Result<f64> {
        return self.get(id).map(Variable::value);
    }

    /// Sets the value of a variable. Values outside the domain are moved inside it.
    pub fn set_value(&mut self, id: VarId, value: f64) -> Result<()> {
        let variable: &mut Variable = self.get_mut(id)?;
        if !value.is_finite() {
            return Err(FitError::InvalidParameter {
                name: variable.name.clone(),
                reason: format!("cannot set the non finite value {value}"),
            });
        }
        variable.value = variable.domain.clamp(value);
        return Ok(());
    }

    /// Freezes (`true`) or releases (`false`) a parameter. Observables cannot be released.
    pub fn set_constant(&mut self, id: VarId, constant: bool) -> Result<()> {
        let variable: &mut Variable = self.get_mut(id)?;
        if variable.observable && !constant {
            return Err(FitError::InvalidParameter {
                name: variable.name.clone(),
                reason: String::from("an observable cannot be a free parameter"),
            });
        }
        variable.constant = constant;
        return Ok(());
    }

    /// Snapshot of all the current values, indexed by [VarId::index].
    pub fn values(&self) -> Vec<f64> {
        return self.variables.iter().map(|v| v.value).collect::<Vec<f64>>();
    }

    pub fn len(&self) -> usize {
        return self.variables.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.variables.is_empty();
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Variable)> {
        return self
            .variables
            .iter()
            .enumerate()
            .map(|(i, v)| (VarId(i), v));
    }

    /// The full support of an observable.
    pub fn support(&self, observable: VarId) -> Result<Range> {
        let variable: &Variable = self.get(observable)?;
        if !variable.observable || !variable.domain.is_finite() {
            return Err(FitError::NotAnObservable(variable.name.clone()));
        }
        let (low, high): (f64, f64) = variable.domain.get_bounds();
        return Range::new(low, high);
    }

    // Range manager

    /// Defines the named range `[low, high)` on `observable`.
    ///
    /// Fails with [FitError::InvalidRange] if `low >= high` or if the range leaves the
    /// observable bounds. Redefining an existing name replaces the old range.
    pub fn define_range(&mut self, observable: VarId, name: &str, low: f64, high: f64) -> Result<()> {
        let support: Range = self.support(observable)?;
        let range: Range = Range::new(low, high).map_err(|_| FitError::InvalidRange {
            name: name.to_string(),
            low,
            high,
        })?;
        if !support.includes(&range) {
            return Err(FitError::InvalidRange {
                name: name.to_string(),
                low,
                high,
            });
        }

        let variable: &mut Variable = self.get_mut(observable)?;
        if let Some(old) = variable.ranges.define(name, range) {
            log::debug!(
                "Range `{name}` of `{}` redefined: [{}, {}) -> [{low}, {high})",
                variable.name,
                old.low(),
                old.high()
            );
        }
        return Ok(());
    }

    /// Returns the bounds of the named range of `observable`.
    ///
    /// Fails with [FitError::UnknownRange] if the range was never defined.
    pub fn resolve_range(&self, observable: VarId, name: &str) -> Result<(f64, f64)> {
        return self.range(observable, name).map(|r| r.bounds());
    }

    /// Same as [Registry::resolve_range] but returning the [Range].
    pub fn range(&self, observable: VarId, name: &str) -> Result<Range> {
        let variable: &Variable = self.get(observable)?;
        return variable
            .ranges
            .get(name)
            .copied()
            .ok_or_else(|| FitError::UnknownRange {
                observable: variable.name.clone(),
                range: name.to_string(),
            });
    }

    /// The named range if `name` is given, the full support otherwise.
    pub fn range_or_support(&self, observable: VarId, name: Option<&str>) -> Result<Range> {
        return match name {
            Some(n) => self.range(observable, n),
            None => self.support(observable),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declare_and_lookup() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        let mean: VarId = reg.constant("mean", 5.0).unwrap();
        let a0: VarId = reg.parameter("a0", 0.5, 0.0, 1.0).unwrap();

        assert_eq!(reg.find("mean").unwrap(), mean);
        assert_eq!(reg.value(x).unwrap(), 5.0);
        assert!(reg.get(a0).unwrap().is_free());
        assert!(!reg.get(mean).unwrap().is_free());
        assert!(!reg.get(x).unwrap().is_free());
        assert_eq!(reg.values(), vec![5.0, 5.0, 0.5]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut reg: Registry = Registry::new();
        reg.constant("mean", 5.0).unwrap();
        assert_eq!(
            reg.constant("mean", 4.0),
            Err(FitError::DuplicateName(String::from("mean")))
        );
    }

    #[test]
    fn out_of_bounds_start_is_clamped() {
        let mut reg: Registry = Registry::new();
        let a1: VarId = reg.parameter("a1", -0.2, 0.0, 1.0).unwrap();
        assert_eq!(reg.value(a1).unwrap(), 0.0);
        reg.set_value(a1, 3.0).unwrap();
        assert_eq!(reg.value(a1).unwrap(), 1.0);
    }

    #[test]
    fn ranges_are_resolved_per_observable() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        let y: VarId = reg.observable("y", 0.0, 10.0).unwrap();
        reg.define_range(x, "signalRange", 4.0, 6.0).unwrap();

        assert_eq!(reg.resolve_range(x, "signalRange").unwrap(), (4.0, 6.0));
        assert!(matches!(
            reg.resolve_range(y, "signalRange"),
            Err(FitError::UnknownRange { .. })
        ));
        assert!(matches!(
            reg.define_range(x, "outside", 8.0, 12.0),
            Err(FitError::InvalidRange { .. })
        ));
        assert!(matches!(
            reg.define_range(x, "inverted", 6.0, 4.0),
            Err(FitError::InvalidRange { .. })
        ));
    }

    #[test]
    fn parameters_cannot_own_ranges() {
        let mut reg: Registry = Registry::new();
        let p: VarId = reg.parameter("p", 1.0, 0.0, 2.0).unwrap();
        assert!(matches!(
            reg.define_range(p, "r", 0.0, 1.0),
            Err(FitError::NotAnObservable(_))
        ));
    }
}
