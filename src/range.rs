//! Named sub-ranges of an observable.
//!
//! A [Range] restricts normalization, generation and event counting to a part of
//! the support of an observable. Ranges are owned by the observable they belong
//! to (see [crate::registry::Registry::define_range]). Several ranges can coexist
//! and overlap; they are never merged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{FitError, Result};

/// A half open interval `[low, high)`.
///
/// Has the **invariant** that `low < high` and that both values are finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    low: f64,
    high: f64,
}

impl Range {
    /// Creates a new [Range]. `low` and `high` must be finite and `low < high`.
    pub fn new(low: f64, high: f64) -> Result<Range> {
        #[allow(clippy::nonminimal_bool)]
        if !low.is_finite() || !high.is_finite() || !(low < high) {
            return Err(FitError::InvalidRange {
                name: String::from("<anonymous>"),
                low,
                high,
            });
        }
        return Ok(Range { low, high });
    }

    pub const fn low(&self) -> f64 {
        return self.low;
    }

    pub const fn high(&self) -> f64 {
        return self.high;
    }

    pub const fn bounds(&self) -> (f64, f64) {
        return (self.low, self.high);
    }

    pub fn width(&self) -> f64 {
        return self.high - self.low;
    }

    /// `low <= x < high`
    pub fn contains(&self, x: f64) -> bool {
        return self.low <= x && x < self.high;
    }

    /// Returns true if `other` is fully inside `self`.
    pub fn includes(&self, other: &Range) -> bool {
        return self.low <= other.low && other.high <= self.high;
    }

    /// The intersection of both ranges, or [None] if they do not overlap.
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        let low: f64 = self.low.max(other.low);
        let high: f64 = self.high.min(other.high);
        if low < high {
            return Some(Range { low, high });
        }
        return None;
    }
}

/// The named ranges of a single observable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeSet {
    ranges: BTreeMap<String, Range>,
}

impl RangeSet {
    pub fn new() -> RangeSet {
        return RangeSet::default();
    }

    /// Defines (or redefines) the range `name`. The caller is responsible for
    /// checking that the range lies inside the observable bounds.
    pub fn define(&mut self, name: &str, range: Range) -> Option<Range> {
        return self.ranges.insert(name.to_string(), range);
    }

    pub fn get(&self, name: &str) -> Option<&Range> {
        return self.ranges.get(name);
    }

    pub fn contains_name(&self, name: &str) -> bool {
        return self.ranges.contains_key(name);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        return self.ranges.keys().map(String::as_str);
    }

    pub fn len(&self) -> usize {
        return self.ranges.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.ranges.is_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_membership() {
        let r: Range = Range::new(4.0, 6.0).unwrap();
        assert!(r.contains(4.0));
        assert!(r.contains(5.999));
        assert!(!r.contains(6.0));
        assert!(!r.contains(3.999));
    }

    #[test]
    fn rejects_empty_and_inverted() {
        assert!(Range::new(1.0, 1.0).is_err());
        assert!(Range::new(2.0, 1.0).is_err());
        assert!(Range::new(f64::NAN, 1.0).is_err());
        assert!(Range::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn overlapping_ranges_coexist() {
        let mut set: RangeSet = RangeSet::new();
        set.define("signal", Range::new(4.0, 6.0).unwrap());
        set.define("wide", Range::new(3.0, 7.0).unwrap());
        assert_eq!(set.len(), 2);
        let wide: Range = *set.get("wide").unwrap();
        let signal: Range = *set.get("signal").unwrap();
        assert!(wide.includes(&signal));
        assert_eq!(wide.intersection(&signal), Some(signal));
    }

    #[test]
    fn redefinition_replaces() {
        let mut set: RangeSet = RangeSet::new();
        set.define("r", Range::new(0.0, 1.0).unwrap());
        let old: Option<Range> = set.define("r", Range::new(0.0, 2.0).unwrap());
        assert_eq!(old, Some(Range::new(0.0, 1.0).unwrap()));
        assert_eq!(set.get("r").unwrap().high(), 2.0);
    }
}
