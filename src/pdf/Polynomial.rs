//! # Polynomial
//!
//! The power series `1 + a_1 x + a_2 x^2 + ...`. The constant term is fixed to `1`
//! so the coefficients only control the shape (the normalization removes the
//! overall scale). Non-negativity is the responsibility of the caller.

use crate::errors::Result;
use crate::pdf::shape_trait::Shape;
use crate::range::Range;
use crate::registry::{Registry, VarId};
use crate::euclid;

#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    name: String,
    x: VarId,
    /// `a_1, a_2, ...`
    coefficients: Vec<VarId>,
}

impl Polynomial {
    pub fn new(registry: &Registry, name: &str, x: VarId, coefficients: &[VarId]) -> Result<Polynomial> {
        registry.support(x)?;
        for &c in coefficients {
            registry.get(c)?;
        }
        return Ok(Polynomial {
            name: name.to_string(),
            x,
            coefficients: coefficients.to_vec(),
        });
    }

    fn coefficient_values(&self, values: &[f64]) -> Vec<f64> {
        return self
            .coefficients
            .iter()
            .map(|c| values[c.index()])
            .collect::<Vec<f64>>();
    }

    /// `x + a_1 x^2 / 2 + a_2 x^3 / 3 + ...`
    fn antiderivative(coefs: &[f64], x: f64) -> f64 {
        let mut acc: f64 = 0.0;
        for (i, &a) in coefs.iter().enumerate().rev() {
            acc = (acc + a / (i + 2) as f64) * x;
        }
        return x + acc * x;
    }
}

impl Shape for Polynomial {
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
        let mut acc: f64 = 0.0;
        for c in self.coefficients.iter().rev() {
            acc = (acc + values[c.index()]) * x;
        }
        return 1.0 + acc;
    }

    fn integral(&self, values: &[f64], range: &Range) -> f64 {
        let coefs: Vec<f64> = self.coefficient_values(values);
        return Polynomial::antiderivative(&coefs, range.high())
            - Polynomial::antiderivative(&coefs, range.low());
    }

    fn max_unnormalized(&self, values: &[f64], range: &Range) -> f64 {
        let m: f64 = range.low().abs().max(range.high().abs());
        let abs_coefs: Vec<f64> = self
            .coefficient_values(values)
            .iter()
            .map(|a| a.abs())
            .collect::<Vec<f64>>();
        return euclid::one_plus_polynomial(m, &abs_coefs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn closed_form_integral() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 2.0).unwrap();
        let a1: VarId = reg.constant("a1", 0.5).unwrap();
        let a2: VarId = reg.constant("a2", 0.25).unwrap();
        let poly: Polynomial = Polynomial::new(&reg, "p", x, &[a1, a2]).unwrap();
        let values: Vec<f64> = reg.values();

        // int_0^2 1 + x/2 + x^2/4 = 2 + 1 + 2/3
        let full: Range = reg.support(x).unwrap();
        assert_approx_eq!(poly.integral(&values, &full), 2.0 + 1.0 + 2.0 / 3.0, 1e-12);

        let sub: Range = Range::new(0.3, 1.7).unwrap();
        let numeric: f64 = euclid::integrate(|v| poly.unnormalized(v, &values), sub.bounds());
        assert_approx_eq!(poly.integral(&values, &sub), numeric, 1e-10);
    }

    #[test]
    fn envelope_is_above_the_shape() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", -3.0, 3.0).unwrap();
        let a1: VarId = reg.constant("a1", -0.2).unwrap();
        let a2: VarId = reg.constant("a2", 0.1).unwrap();
        let poly: Polynomial = Polynomial::new(&reg, "p", x, &[a1, a2]).unwrap();
        let values: Vec<f64> = reg.values();
        let full: Range = reg.support(x).unwrap();
        let max: f64 = poly.max_unnormalized(&values, &full);
        for i in 0..=60 {
            let v: f64 = -3.0 + 0.1 * i as f64;
            assert!(poly.unnormalized(v, &values) <= max);
        }
    }
}
