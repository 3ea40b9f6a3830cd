//! A Domain represents the set of values a variable is allowed to take.
//!
//! In this library every [Variable](crate::registry::Variable) carries a
//! [ContinuousDomain]. Observables always have a finite [ContinuousDomain::Range]
//! (it is their support). Parameters may be unbounded ([ContinuousDomain::Reals]),
//! bounded on one side or on both; the [minimizer](crate::minimizer) picks the
//! change of variables from the variant.

use serde::{Deserialize, Serialize};

/// A [domain](https://en.wikipedia.org/wiki/Domain_of_a_function) of a region
/// of the real numbers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ContinuousDomain {
    /// All real numbers
    #[default]
    Reals,
    /// The values contained in the range.
    ///
    /// The first number is the minimum, and the last is the maximum.
    ///
    /// Has the **invariant** that `min <= max`.
    Range(f64, f64),
    /// All the numbers from the given value onwards.
    From(f64),
    /// All the numbers until the given value.
    To(f64),
}

impl ContinuousDomain {
    /// Builds the domain from optional bounds. Infinite bounds are treated as absent.
    pub fn from_bounds(min: Option<f64>, max: Option<f64>) -> ContinuousDomain {
        let min: Option<f64> = min.filter(|m| m.is_finite());
        let max: Option<f64> = max.filter(|m| m.is_finite());
        return match (min, max) {
            (Some(a), Some(b)) => ContinuousDomain::Range(a, b),
            (Some(a), None) => ContinuousDomain::From(a),
            (None, Some(b)) => ContinuousDomain::To(b),
            (None, None) => ContinuousDomain::Reals,
        };
    }

    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        match self {
            ContinuousDomain::Reals => true,
            ContinuousDomain::Range(min, max) => (*min <= x) && (x <= *max),
            ContinuousDomain::From(min) => *min <= x,
            ContinuousDomain::To(max) => x <= *max,
        }
    }

    /// Returns the upper and lower bounds of the domain.
    ///
    /// Take into account that the values can also include positive and negative infinity.
    /// It is guaranteed that return.0 <= return.1. If the bounds are finite, the values
    /// themselves are included.
    #[must_use]
    pub fn get_bounds(&self) -> (f64, f64) {
        match &self {
            ContinuousDomain::Reals => (f64::NEG_INFINITY, f64::INFINITY),
            ContinuousDomain::Range(min, max) => (*min, *max),
            ContinuousDomain::From(min) => (*min, f64::INFINITY),
            ContinuousDomain::To(max) => (f64::NEG_INFINITY, *max),
        }
    }

    /// Returns true if both bounds are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        return matches!(self, ContinuousDomain::Range(_, _));
    }

    /// Moves `x` to the closest value inside the domain.
    #[must_use]
    pub fn clamp(&self, x: f64) -> f64 {
        let (min, max): (f64, f64) = self.get_bounds();
        return x.max(min).min(max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_and_membership() {
        let d: ContinuousDomain = ContinuousDomain::from_bounds(Some(0.0), Some(10.0));
        assert_eq!(d, ContinuousDomain::Range(0.0, 10.0));
        assert!(d.contains(0.0) && d.contains(10.0));
        assert!(!d.contains(10.5));
        assert_eq!(d.clamp(-0.2), 0.0);

        let half: ContinuousDomain = ContinuousDomain::from_bounds(Some(0.0), Some(f64::INFINITY));
        assert_eq!(half, ContinuousDomain::From(0.0));
        assert_eq!(half.get_bounds(), (0.0, f64::INFINITY));
        assert!(!half.is_finite());
    }
}
