//! # Likelihood
//!
//! The (extended) unbinned negative log likelihood of a [Pdf] given a [Dataset]:
//!
//! ```text
//! nll = - sum_i ln( f(x_i) / int_D f )            (+ nu - N ln(nu) if extended)
//! ```
//!
//! `D` is the normalization domain: the named fit range or the full support of
//! the observable. `nu` is the number of events the pdf expects inside `D`
//! (range scoped yields are converted, see [Pdf::expected_events]).
//!
//! The sum over the events runs in parallel with [rayon] when there are at least
//! [DEFAULT_PARALLEL_THRESHOLD] events (configurable).

use rayon::prelude::*;

use crate::configuration::likelihood::{DEFAULT_PARALLEL_THRESHOLD, PARALLEL_CHUNK_SIZE};
use crate::dataset::Dataset;
use crate::errors::{FitError, Result};
use crate::minimizer::ObjectiveFunction;
use crate::pdf::{NamedRange, Pdf, PreparedPdf};
use crate::range::Range;
use crate::registry::{Registry, VarId};

#[derive(Debug, Clone)]
pub struct Nll<'a> {
    pdf: &'a Pdf,
    /// Events inside the normalization domain
    events: Vec<f64>,
    domain: Range,
    /// The domain ends at the upper bound of the observable
    closed: bool,
    extended: bool,
    parallel_threshold: usize,
}

impl<'a> Nll<'a> {
    /// Builds the negative log likelihood of `pdf` for `data`.
    ///
    /// Errors:
    ///  - [FitError::ObservableMismatch] if `data` has no column for the observable of `pdf`.
    ///  - [FitError::NotExtendable] if `extended` is requested for a pdf without yields.
    ///  - [FitError::UnknownRange] if `fit_range` is not defined.
    ///  - [FitError::RangeMismatch] if an event is outside the observable or if a
    ///     yield is scoped to a range that does not overlap the fit range.
    ///  - [FitError::EmptyDataset] if no event is inside the fit range (and it is not extended).
    pub fn new(
        pdf: &'a Pdf,
        registry: &Registry,
        data: &Dataset,
        extended: bool,
        fit_range: Option<&str>,
    ) -> Result<Nll<'a>> {
        let observable: VarId = pdf.observable();
        let column: &[f64] = data
            .column(observable)
            .ok_or_else(|| FitError::ObservableMismatch(pdf.name().to_string()))?;

        if extended && !pdf.is_extendable() {
            return Err(FitError::NotExtendable(pdf.name().to_string()));
        }

        let support: Range = registry.support(observable)?;
        let domain: Range = registry.range_or_support(observable, fit_range)?;
        let closed: bool = domain.high() == support.high();

        if let Some(v) = column
            .iter()
            .find(|&&v| !v.is_finite() || v < support.low() || support.high() < v)
        {
            return Err(FitError::RangeMismatch(format!(
                "event {v} is outside the bounds of `{}`",
                registry.name(observable)?
            )));
        }

        for scope in pdf.extended_ranges() {
            check_scope(scope, &domain)?;
        }

        let events: Vec<f64> = match fit_range {
            Some(_) => column
                .iter()
                .copied()
                .filter(|&v| domain.contains(v) || (closed && v == domain.high()))
                .collect::<Vec<f64>>(),
            None => column.to_vec(),
        };

        let excluded: usize = column.len() - events.len();
        if 0 < excluded {
            log::info!(
                "{excluded} of {} events are outside the fit range [{}, {}) and are ignored",
                column.len(),
                domain.low(),
                domain.high()
            );
        }

        if events.is_empty() && !extended {
            return Err(FitError::EmptyDataset);
        }

        return Ok(Nll {
            pdf,
            events,
            domain,
            closed,
            extended,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        });
    }

    /// Sets the minimum number of events for the parallel evaluation.
    #[must_use]
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        return self;
    }

    pub fn pdf(&self) -> &Pdf {
        return self.pdf;
    }

    pub fn domain(&self) -> Range {
        return self.domain;
    }

    pub fn n_events(&self) -> usize {
        return self.events.len();
    }

    pub fn is_extended(&self) -> bool {
        return self.extended;
    }

    /// Evaluates the negative log likelihood for the full parameter snapshot `values`.
    ///
    /// Returns an error if the pdf can not be normalized, if it is negative at an
    /// event or if the result is not finite.
    pub fn eval(&self, values: &[f64]) -> Result<f64> {
        let mut prepared: PreparedPdf = self.pdf.prepare(values, self.domain)?;
        if self.closed {
            prepared = prepared.with_upper_edge();
        }

        let sum_log: f64 = if self.parallel_threshold <= self.events.len() {
            self.events
                .par_chunks(PARALLEL_CHUNK_SIZE)
                .map(|chunk| sum_log_density(&prepared, chunk))
                .try_reduce(|| 0.0, |a, b| Ok(a + b))?
        } else {
            sum_log_density(&prepared, &self.events)?
        };

        let mut nll: f64 = -sum_log;

        if self.extended {
            let nu: f64 = self
                .pdf
                .expected_events(values, &self.domain)?
                .ok_or_else(|| FitError::NotExtendable(self.pdf.name().to_string()))?;
            if !nu.is_finite() || nu <= 0.0 {
                return Err(FitError::Numerical(format!(
                    "the expected number of events is {nu}"
                )));
            }
            nll += nu - self.events.len() as f64 * nu.ln();
        }

        if !nll.is_finite() {
            return Err(FitError::Numerical(format!("the nll is {nll}")));
        }
        return Ok(nll);
    }
}

fn check_scope(scope: &NamedRange, domain: &Range) -> Result<()> {
    if scope.range.intersection(domain).is_none() {
        return Err(FitError::RangeMismatch(format!(
            "the yield range `{}` [{}, {}) does not overlap the fit range [{}, {})",
            scope.name,
            scope.range.low(),
            scope.range.high(),
            domain.low(),
            domain.high()
        )));
    }
    return Ok(());
}

fn sum_log_density(prepared: &PreparedPdf, events: &[f64]) -> Result<f64> {
    return events
        .iter()
        .try_fold(0.0, |acc: f64, &x| prepared.log_density(x).map(|l| acc + l));
}

/// An [Nll] as a function of the free parameters only.
///
/// The parameters not listed in `free` keep the value they had in the registry
/// when the function was created.
#[derive(Debug, Clone)]
pub struct NllFunction<'a> {
    nll: Nll<'a>,
    base_values: Vec<f64>,
    free: Vec<VarId>,
}

impl<'a> NllFunction<'a> {
    pub fn new(nll: Nll<'a>, registry: &Registry, free: Vec<VarId>) -> NllFunction<'a> {
        return NllFunction {
            nll,
            base_values: registry.values(),
            free,
        };
    }

    pub fn nll(&self) -> &Nll<'a> {
        return &self.nll;
    }

    pub fn free(&self) -> &[VarId] {
        return &self.free;
    }

    /// The full snapshot with the free parameters set to `params`.
    pub fn values_at(&self, params: &[f64]) -> Vec<f64> {
        let mut values: Vec<f64> = self.base_values.clone();
        for (id, &p) in self.free.iter().zip(params) {
            values[id.index()] = p;
        }
        return values;
    }
}

impl ObjectiveFunction for NllFunction<'_> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        let values: Vec<f64> = self.values_at(params);
        return self.nll.eval(&values);
    }
}
