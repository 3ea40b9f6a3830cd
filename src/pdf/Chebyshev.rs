//! # Chebyshev polynomial
//!
//! `1 + c_1 T_1(x') + c_2 T_2(x') + ...` where `T_k` are the
//! [Chebyshev polynomials](https://en.wikipedia.org/wiki/Chebyshev_polynomials)
//! of the first kind and `x'` maps the bounds of the observable to `[-1, 1]`.
//!
//! The mapping always uses the full support of the observable, so the shape does
//! not change when it is normalized over a sub-range. Non-negativity is **not**
//! enforced: the caller must keep the coefficients in a valid region.

use crate::errors::Result;
use crate::euclid;
use crate::pdf::shape_trait::Shape;
use crate::range::Range;
use crate::registry::{Registry, VarId};

#[derive(Debug, Clone, PartialEq)]
pub struct Chebyshev {
    name: String,
    x: VarId,
    /// `c_1, c_2, ...` (the order 0 coefficient is fixed to 1)
    coefficients: Vec<VarId>,
    support: Range,
}

impl Chebyshev {
    pub fn new(registry: &Registry, name: &str, x: VarId, coefficients: &[VarId]) -> Result<Chebyshev> {
        let support: Range = registry.support(x)?;
        for &c in coefficients {
            registry.get(c)?;
        }
        return Ok(Chebyshev {
            name: name.to_string(),
            x,
            coefficients: coefficients.to_vec(),
            support,
        });
    }

    /// Maps `x` from the support of the observable to `[-1, 1]`.
    #[inline]
    fn to_unit(&self, x: f64) -> f64 {
        return (2.0 * x - (self.support.low() + self.support.high())) / self.support.width();
    }

    /// The polynomial `t + sum_k c_k int T_k` (the antiderivative in unit space).
    fn antiderivative(&self, t: f64, values: &[f64]) -> f64 {
        let order: usize = self.coefficients.len();
        let mut t_values: Vec<f64> = vec![0.0; order + 2];
        euclid::chebyshev_values(t, &mut t_values);

        let mut acc: f64 = t;
        for (i, c) in self.coefficients.iter().enumerate() {
            acc += values[c.index()] * euclid::chebyshev_antiderivative(i + 1, &t_values, t);
        }
        return acc;
    }
}

impl Shape for Chebyshev {
    fn name(&self) -> &str {
        return &self.name;
    }

    fn observable(&self) -> VarId {
        return self.x;
    }

    fn parameters(&self) -> Vec<VarId> {
        return self.coefficients.clone();
    }

    fn unnormalized(&self, x: f64, values: &[f64]) -> f64 {
        let t: f64 = self.to_unit(x);
        let mut t_values: Vec<f64> = vec![0.0; self.coefficients.len() + 1];
        euclid::chebyshev_values(t, &mut t_values);

        let mut acc: f64 = 1.0;
        for (i, c) in self.coefficients.iter().enumerate() {
            acc += values[c.index()] * t_values[i + 1];
        }
        return acc;
    }

    fn integral(&self, values: &[f64], range: &Range) -> f64 {
        // dx = width / 2 * dt
        let jacobian: f64 = 0.5 * self.support.width();
        let a: f64 = self.antiderivative(self.to_unit(range.low()), values);
        let b: f64 = self.antiderivative(self.to_unit(range.high()), values);
        return jacobian * (b - a);
    }

    /// `|T_k| <= 1` inside the support, so `1 + sum |c_k|` is an upper bound.
    fn max_unnormalized(&self, values: &[f64], _range: &Range) -> f64 {
        return 1.0
            + self
                .coefficients
                .iter()
                .map(|c| values[c.index()].abs())
                .sum::<f64>();
    }
}
