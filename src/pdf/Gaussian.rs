//! # Gaussian
//!
//! The [Gaussian](https://en.wikipedia.org/wiki/Normal_distribution) shape
//! `exp(-(x - mean)^2 / (2 sigma^2))`.
//!
//! Both the mean and the standard deviation are parameters of the
//! [Registry](crate::registry::Registry), so they can be shared between shapes or
//! left free for the fit. The integral over any finite range is computed with the
//! [error function](https://en.wikipedia.org/wiki/Error_function).

use rand::RngCore;
use rand_distr::{Distribution, Normal};

use crate::configuration::sampling::{MAX_PROPOSALS_PER_SAMPLE, MIN_GAUSSIAN_ACCEPTANCE};
use crate::errors::{FitError, Result};
use crate::euclid;
use crate::pdf::shape_trait::{Shape, rejection_sample_range};
use crate::range::Range;
use crate::registry::{Registry, VarId};

#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    name: String,
    x: VarId,
    /// The mean of the peak
    mean: VarId,
    /// The standard deviation of the peak
    sigma: VarId,
}

impl Gaussian {
    /// Create a [Gaussian] shape over the observable `x`.
    ///
    /// `x` must be an observable and `mean` and `sigma` must be declared in `registry`.
    /// The value of `sigma` is only checked when the shape is evaluated
    /// (it must be stricly greater than `0.0`).
    pub fn new(registry: &Registry, name: &str, x: VarId, mean: VarId, sigma: VarId) -> Result<Gaussian> {
        registry.support(x)?;
        registry.get(mean)?;
        registry.get(sigma)?;
        return Ok(Gaussian {
            name: name.to_string(),
            x,
            mean,
            sigma,
        });
    }

    #[inline]
    fn mean_sigma(&self, values: &[f64]) -> (f64, f64) {
        return (values[self.mean.index()], values[self.sigma.index()]);
    }
}

impl Shape for Gaussian {
    fn name(&self) -> &str {
        return &self.name;
    }

    fn observable(&self) -> VarId {
        return self.x;
    }

    fn parameters(&self) -> Vec<VarId> {
        return vec![self.mean, self.sigma];
    }

    fn validate(&self, values: &[f64]) -> Result<()> {
        let (mean, sigma): (f64, f64) = self.mean_sigma(values);
        if !mean.is_finite() {
            return Err(FitError::InvalidParameter {
                name: self.name.clone(),
                reason: format!("the mean must be finite (got {mean})"),
            });
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(FitError::InvalidParameter {
                name: self.name.clone(),
                reason: format!("sigma must be finite and positive (got {sigma})"),
            });
        }
        return Ok(());
    }

    fn unnormalized(&self, x: f64, values: &[f64]) -> f64 {
        let (mean, sigma): (f64, f64) = self.mean_sigma(values);
        let z: f64 = (x - mean) / sigma;
        return (-0.5 * z * z).exp();
    }

    fn integral(&self, values: &[f64], range: &Range) -> f64 {
        let (mean, sigma): (f64, f64) = self.mean_sigma(values);
        let z_a: f64 = (range.low() - mean) / sigma;
        let z_b: f64 = (range.high() - mean) / sigma;
        // sigma * sqrt(2 pi) * P(z_a < Z < z_b)
        return sigma / euclid::INV_SQRT_2_PI * euclid::std_normal_interval(z_a, z_b);
    }

    fn max_unnormalized(&self, values: &[f64], range: &Range) -> f64 {
        let (mean, _): (f64, f64) = self.mean_sigma(values);
        let closest: f64 = mean.clamp(range.low(), range.high());
        return self.unnormalized(closest, values);
    }

    /// Draws from the untruncated normal and discards the values outside `range`.
    ///
    /// If less than [MIN_GAUSSIAN_ACCEPTANCE] of the probability is inside `range`
    /// it uses rejection sampling against a flat envelope instead.
    fn sample_multiple(
        &self,
        values: &[f64],
        range: &Range,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>> {
        self.validate(values)?;
        let (mean, sigma): (f64, f64) = self.mean_sigma(values);
        let acceptance: f64 = euclid::std_normal_interval(
            (range.low() - mean) / sigma,
            (range.high() - mean) / sigma,
        );

        if acceptance < MIN_GAUSSIAN_ACCEPTANCE {
            let pdf_max: f64 = self.max_unnormalized(values, range);
            return rejection_sample_range(self, values, range, n, pdf_max, rng);
        }

        let normal: Normal<f64> = Normal::new(mean, sigma).map_err(|e| FitError::InvalidParameter {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;

        let mut ret: Vec<f64> = Vec::with_capacity(n);
        let mut proposals: usize = 0;
        while ret.len() < n {
            let x: f64 = normal.sample(rng);
            if range.contains(x) {
                ret.push(x);
            }
            proposals += 1;
            if MAX_PROPOSALS_PER_SAMPLE.saturating_mul(n) < proposals {
                return Err(FitError::Numerical(format!(
                    "could not draw {n} values of `{}` inside [{}, {})",
                    self.name,
                    range.low(),
                    range.high()
                )));
            }
        }

        return Ok(ret);
    }
}
