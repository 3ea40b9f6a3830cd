//! # Exponential
//!
//! The shape `exp(c x)`. With `c < 0` it is the usual falling background.
//! Samples are drawn with the inverse of the truncated cdf.

use rand::{Rng, RngCore};

use crate::errors::Result;
use crate::pdf::shape_trait::Shape;
use crate::range::Range;
use crate::registry::{Registry, VarId};

/// Below this `|c * width|` the shape is treated as flat.
const FLAT_THRESHOLD: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Exponential {
    name: String,
    x: VarId,
    /// The slope `c`
    slope: VarId,
}

impl Exponential {
    pub fn new(registry: &Registry, name: &str, x: VarId, slope: VarId) -> Result<Exponential> {
        registry.support(x)?;
        registry.get(slope)?;
        return Ok(Exponential {
            name: name.to_string(),
            x,
            slope,
        });
    }
}

impl Shape for Exponential {
    fn name(&self) -> &str {
        return &self.name;
    }

    fn observable(&self) -> VarId {
        return self.x;
    }

    fn parameters(&self) -> Vec<VarId> {
        return vec![self.slope];
    }

    fn unnormalized(&self, x: f64, values: &[f64]) -> f64 {
        return (values[self.slope.index()] * x).exp();
    }

    fn integral(&self, values: &[f64], range: &Range) -> f64 {
        let c: f64 = values[self.slope.index()];
        let width: f64 = range.width();
        if (c * width).abs() < FLAT_THRESHOLD {
            return width * (c * range.low()).exp();
        }
        // exp(c a) * (exp(c w) - 1) / c
        return (c * range.low()).exp() * (c * width).exp_m1() / c;
    }

    fn max_unnormalized(&self, values: &[f64], range: &Range) -> f64 {
        return self
            .unnormalized(range.low(), values)
            .max(self.unnormalized(range.high(), values));
    }

    fn sample_multiple(
        &self,
        values: &[f64],
        range: &Range,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>> {
        let c: f64 = values[self.slope.index()];
        let (low, width): (f64, f64) = (range.low(), range.width());
        let scale: f64 = (c * width).exp_m1();

        let mut ret: Vec<f64> = Vec::with_capacity(n);
        for _ in 0..n {
            let u: f64 = rng.random::<f64>();
            let x: f64 = if (c * width).abs() < FLAT_THRESHOLD {
                low + u * width
            } else {
                low + (u * scale).ln_1p() / c
            };
            // rounding can land exactly on the open end
            ret.push(if range.contains(x) { x } else { low });
        }
        return Ok(ret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn inverse_cdf_sampling_has_the_right_mean() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        let c: VarId = reg.constant("c", -0.5).unwrap();
        let e: Exponential = Exponential::new(&reg, "e", x, c).unwrap();
        let values: Vec<f64> = reg.values();
        let range: Range = reg.support(x).unwrap();

        let mut rng: StdRng = StdRng::seed_from_u64(11);
        let xs: Vec<f64> = e.sample_multiple(&values, &range, 20_000, &mut rng).unwrap();
        assert!(xs.iter().all(|&v| range.contains(v)));

        // mean of the truncated exponential: 1/lambda - w / (exp(lambda w) - 1)
        let expected: f64 = 2.0 - 10.0 / (5.0_f64.exp() - 1.0);
        let mean: f64 = xs.iter().sum::<f64>() / xs.len() as f64;
        // std dev of the mean ~ 2 / sqrt(20000) ~ 0.014
        assert_approx_eq!(mean, expected, 0.07);
    }

    #[test]
    fn integral() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        let c: VarId = reg.constant("c", -0.5).unwrap();
        let e: Exponential = Exponential::new(&reg, "e", x, c).unwrap();
        let values: Vec<f64> = reg.values();
        let range: Range = Range::new(1.0, 3.0).unwrap();
        let expected: f64 = ((-0.5_f64).exp() - (-1.5_f64).exp()) / 0.5;
        assert_approx_eq!(e.integral(&values, &range), expected, 1e-12);
    }
}
