//! This script contains the interface used to comunicate with the leaf shapes of a pdf.
//!
//! A [Shape] is an (unnormalized) non-negative function of a single observable and
//! some parameters. The normalization is never done by the shape itself: the
//! [pdf tree](crate::pdf) divides by [Shape::integral] over whatever domain the
//! density is used on (the full support of the observable or a named range).

use rand::{Rng, RngCore};

use crate::configuration::sampling::{
    MAX_PROPOSALS_PER_SAMPLE, MAX_SAFETY_FACTOR, MAX_SEARCH_GRID_POINTS,
};
use crate::errors::{FitError, Result};
use crate::euclid;
use crate::range::Range;
use crate::registry::VarId;

/// The trait for any leaf shape.
///
/// None of the provided methods are guaranteed to work if the implemented
/// [Shape::unnormalized] is not a non-negative, finite function on the ranges
/// it is used on.
///
/// The parameter values are always given as the full value snapshot of the
/// [Registry](crate::registry::Registry) (`values[id.index()]`).
pub trait Shape: Send + Sync + std::fmt::Debug {
    //Requiered methods:

    /// The name of the shape, used in error messages and reports.
    fn name(&self) -> &str;

    /// The observable the shape is a function of.
    fn observable(&self) -> VarId;

    /// The parameters the shape depends on (not including the observable).
    fn parameters(&self) -> Vec<VarId>;

    /// Evaluates the shape at `x`. It does not need to be normalized.
    fn unnormalized(&self, x: f64, values: &[f64]) -> f64;

    // Provided methods:
    // Manual implementation for a specific shape is recommended.

    /// Checks that the parameter values are valid for this shape.
    fn validate(&self, _values: &[f64]) -> Result<()> {
        return Ok(());
    }

    /// Integral of [Shape::unnormalized] over `range`.
    ///
    /// The deafult implementation uses the [Simpson's rule](https://en.wikipedia.org/wiki/Simpson%27s_rule#Composite_Simpson's_1/3_rule)
    /// (see [euclid::integrate]) and may be expensive.
    fn integral(&self, values: &[f64], range: &Range) -> f64 {
        return euclid::integrate(|x: f64| self.unnormalized(x, values), range.bounds());
    }

    /// An upper bound of [Shape::unnormalized] inside `range`.
    ///
    /// The deafult implementation evaluates the shape on a grid and multiplies the
    /// maximum by [MAX_SAFETY_FACTOR]. Narrow peaks between grid points may be
    /// underestimated: implement this method if there is an analytical bound.
    fn max_unnormalized(&self, values: &[f64], range: &Range) -> f64 {
        let n: usize = MAX_SEARCH_GRID_POINTS;
        let step: f64 = range.width() / (n - 1) as f64;
        let mut max: f64 = 0.0;
        for i in 0..n {
            let x: f64 = range.low() + step * i as f64;
            max = max.max(self.unnormalized(x, values));
        }
        return max * MAX_SAFETY_FACTOR;
    }

    /// Draws a single value from the shape restricted to `range`.
    ///
    /// Calling [Shape::sample_multiple] is recommended when more than one value
    /// is needed: the envelope is only computed once.
    fn sample(&self, values: &[f64], range: &Range, rng: &mut dyn RngCore) -> Result<f64> {
        let sample: Vec<f64> = self.sample_multiple(values, range, 1, rng)?;
        return sample
            .first()
            .copied()
            .ok_or_else(|| FitError::Numerical(format!("`{}` returned no sample", self.name())));
    }

    /// Draws `n` independent values from the shape restricted to `range`.
    ///
    /// The deafult method is [rejection sampling](https://en.wikipedia.org/wiki/Rejection_sampling)
    /// with a flat envelope of height [Shape::max_unnormalized].
    fn sample_multiple(
        &self,
        values: &[f64],
        range: &Range,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>> {
        let pdf_max: f64 = self.max_unnormalized(values, range);
        return rejection_sample_range(self, values, range, n, pdf_max, rng);
    }
}

/// Samples `shape` inside `range` with the [rejection sampling](https://en.wikipedia.org/wiki/Rejection_sampling)
/// method.
///
/// `pdf_max` does **not** need to be the real maximum, it just needs to be equal or
/// greater to it. A greater `pdf_max` value will incur a performance penalty.
pub fn rejection_sample_range<S: Shape + ?Sized>(
    shape: &S,
    values: &[f64],
    range: &Range,
    n: usize,
    pdf_max: f64,
    rng: &mut dyn RngCore,
) -> Result<Vec<f64>> {
    if !pdf_max.is_finite() || pdf_max <= 0.0 {
        return Err(FitError::UnnormalizablePdf {
            name: shape.name().to_string(),
            integral: pdf_max,
        });
    }

    let (low, width): (f64, f64) = (range.low(), range.width());
    let mut ret: Vec<f64> = Vec::with_capacity(n);
    for _i in 0..n {
        let mut accepted: Option<f64> = None;
        for _ in 0..MAX_PROPOSALS_PER_SAMPLE {
            let x: f64 = low + rng.random::<f64>() * width;
            let y: f64 = rng.random::<f64>() * pdf_max;
            let f: f64 = shape.unnormalized(x, values);
            if pdf_max < f {
                log::warn!(
                    "Envelope of `{}` too low at x = {x} ({f} > {pdf_max}). The sample is biased. ",
                    shape.name()
                );
            }
            if y < f {
                accepted = Some(x);
                break;
            }
        }

        match accepted {
            Some(x) => ret.push(x),
            None => {
                return Err(FitError::Numerical(format!(
                    "rejection sampling of `{}` accepted nothing after {MAX_PROPOSALS_PER_SAMPLE} proposals",
                    shape.name()
                )));
            }
        }
    }

    return Ok(ret);
}
