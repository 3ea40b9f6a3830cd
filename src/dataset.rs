//! # Dataset
//!
//! An immutable, columnar set of observations. Every column belongs to one
//! observable of the [Registry] and all the columns have the same length (one
//! entry per event). The order of the events is kept.
//!
//! Simple statistics of each column ([ColumnProperties]) are computed once when
//! the dataset is built.

use serde::{Deserialize, Serialize};

use crate::errors::{FitError, Result};
use crate::range::Range;
use crate::registry::{Registry, VarId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    observables: Vec<VarId>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    properties: Vec<ColumnProperties>,
}

/// Stores the sample properties of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProperties {
    /// the average of the column
    ///
    /// Or None if the column is empty
    pub mean: Option<f64>,
    /// the (unbiased) variance of the column
    ///
    /// Or None if there are less than 2 events
    pub variance: Option<f64>,
    /// The maximum value of the column
    pub maximum: Option<f64>,
    /// The minimum value of the column
    pub minimum: Option<f64>,
}

impl Dataset {
    /// Creates a [Dataset] with a single column.
    ///
    /// `data` must not contain NaNs or infinities and every value must be inside
    /// the support of `observable` ([FitError::RangeMismatch] otherwise).
    pub fn from_column(registry: &Registry, observable: VarId, data: Vec<f64>) -> Result<Dataset> {
        return Dataset::from_columns(registry, vec![(observable, data)]);
    }

    /// Creates a [Dataset] from several columns of the same length.
    pub fn from_columns(registry: &Registry, columns: Vec<(VarId, Vec<f64>)>) -> Result<Dataset> {
        let n: usize = columns.first().map(|(_, c)| c.len()).unwrap_or(0);

        let mut observables: Vec<VarId> = Vec::with_capacity(columns.len());
        let mut names: Vec<String> = Vec::with_capacity(columns.len());
        let mut data: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
        let mut properties: Vec<ColumnProperties> = Vec::with_capacity(columns.len());

        for (id, column) in columns {
            let name: &str = registry.name(id)?;
            let support: Range = registry.support(id)?;
            if observables.contains(&id) {
                return Err(FitError::DuplicateName(name.to_string()));
            }
            if column.len() != n {
                return Err(FitError::RangeMismatch(format!(
                    "column `{name}` has {} events, expected {n}",
                    column.len()
                )));
            }

            let invalid_contained: Option<&f64> = column
                .iter()
                .find(|&&v| !v.is_finite() || v < support.low() || support.high() < v);
            if let Some(v) = invalid_contained {
                return Err(FitError::RangeMismatch(format!(
                    "value {v} of `{name}` is outside [{}, {}]",
                    support.low(),
                    support.high()
                )));
            }

            properties.push(ColumnProperties::compute(&column));
            observables.push(id);
            names.push(name.to_string());
            data.push(column);
        }

        return Ok(Dataset {
            observables,
            names,
            columns: data,
            properties,
        });
    }

    /// The number of events.
    pub fn len(&self) -> usize {
        return self.columns.first().map(Vec::len).unwrap_or(0);
    }

    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    pub fn observables(&self) -> &[VarId] {
        return &self.observables;
    }

    fn position(&self, observable: VarId) -> Option<usize> {
        return self.observables.iter().position(|&o| o == observable);
    }

    /// The values of `observable` for every event.
    pub fn column(&self, observable: VarId) -> Option<&[f64]> {
        return self.position(observable).map(|i| self.columns[i].as_slice());
    }

    /// The values of the event `index` (in the order of [Dataset::observables]).
    pub fn row(&self, index: usize) -> Option<Vec<f64>> {
        if self.len() <= index {
            return None;
        }
        return Some(self.columns.iter().map(|c| c[index]).collect::<Vec<f64>>());
    }

    /// Returns a reference to the statistics of the column of `observable`.
    pub fn properties(&self, observable: VarId) -> Option<&ColumnProperties> {
        return self.position(observable).map(|i| &self.properties[i]);
    }

    /// Number of events with the value of `observable` inside `range`.
    pub fn count_in(&self, observable: VarId, range: &Range) -> usize {
        return match self.column(observable) {
            Some(c) => c.iter().filter(|&&v| range.contains(v)).count(),
            None => 0,
        };
    }

    /// Number of events inside the named range of `observable`.
    pub fn count_in_range(&self, registry: &Registry, observable: VarId, range: &str) -> Result<usize> {
        let range: Range = registry.range(observable, range)?;
        return Ok(self.count_in(observable, &range));
    }

    /// A new [Dataset] with only the events whose `observable` is inside `range`.
    pub fn reduce(&self, observable: VarId, range: &Range) -> Result<Dataset> {
        let Some(column) = self.column(observable) else {
            return Err(FitError::UnknownVariable(format!("#{}", observable.index())));
        };
        let keep: Vec<usize> = column
            .iter()
            .enumerate()
            .filter(|(_, v)| range.contains(**v))
            .map(|(i, _)| i)
            .collect::<Vec<usize>>();

        let columns: Vec<Vec<f64>> = self
            .columns
            .iter()
            .map(|c| keep.iter().map(|&i| c[i]).collect::<Vec<f64>>())
            .collect::<Vec<Vec<f64>>>();
        let properties: Vec<ColumnProperties> = columns
            .iter()
            .map(|c| ColumnProperties::compute(c))
            .collect::<Vec<ColumnProperties>>();

        return Ok(Dataset {
            observables: self.observables.clone(),
            names: self.names.clone(),
            columns,
            properties,
        });
    }
}

impl ColumnProperties {
    pub fn empty() -> ColumnProperties {
        return ColumnProperties {
            mean: None,
            variance: None,
            maximum: None,
            minimum: None,
        };
    }

    fn compute(data: &[f64]) -> ColumnProperties {
        let n: usize = data.len();
        if n == 0 {
            return ColumnProperties::empty();
        }

        let mut mean: f64 = 0.0;
        let mut min: f64 = f64::INFINITY;
        let mut max: f64 = f64::NEG_INFINITY;
        for &s in data {
            mean += s;
            min = min.min(s);
            max = max.max(s);
        }
        mean = mean / n as f64;

        let variance: Option<f64> = if n < 2 {
            // No variance for 1 sample.
            None
        } else {
            let sq: f64 = data.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>();
            Some(sq / (n - 1) as f64)
        };

        return ColumnProperties {
            mean: Some(mean),
            variance,
            maximum: Some(max),
            minimum: Some(min),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn properties_and_counts() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        reg.define_range(x, "signalRange", 4.0, 6.0).unwrap();

        let data: Dataset = Dataset::from_column(&reg, x, vec![1.0, 4.0, 5.0, 6.0, 9.0]).unwrap();
        assert_eq!(data.len(), 5);
        assert_eq!(data.row(2), Some(vec![5.0]));
        assert_eq!(data.row(5), None);

        let props: &ColumnProperties = data.properties(x).unwrap();
        assert_approx_eq!(props.mean.unwrap(), 5.0, 1e-12);
        assert_approx_eq!(props.variance.unwrap(), 8.5, 1e-12);
        assert_eq!(props.minimum, Some(1.0));
        assert_eq!(props.maximum, Some(9.0));

        // [4, 6) is half open
        assert_eq!(data.count_in_range(&reg, x, "signalRange").unwrap(), 2);
        let signal: Range = reg.range(x, "signalRange").unwrap();
        assert_eq!(data.reduce(x, &signal).unwrap().column(x).unwrap(), &[4.0, 5.0]);
    }

    #[test]
    fn values_outside_the_support_are_rejected() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        assert!(matches!(
            Dataset::from_column(&reg, x, vec![1.0, 11.0]),
            Err(FitError::RangeMismatch(_))
        ));
        assert!(matches!(
            Dataset::from_column(&reg, x, vec![f64::NAN]),
            Err(FitError::RangeMismatch(_))
        ));
    }

    #[test]
    fn columns_must_have_the_same_length() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        let y: VarId = reg.observable("y", 0.0, 10.0).unwrap();
        assert!(Dataset::from_columns(&reg, vec![(x, vec![1.0, 2.0]), (y, vec![3.0])]).is_err());
        let ok: Dataset = Dataset::from_columns(&reg, vec![(x, vec![1.0, 2.0]), (y, vec![3.0, 4.0])]).unwrap();
        assert_eq!(ok.row(1), Some(vec![2.0, 4.0]));
    }
}
