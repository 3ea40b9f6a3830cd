//! Testing module for the closed form integrals of the shapes.
//!
//! They must agree with Simpson's quadrature of the unnormalized density.

use std::sync::Arc;

use CompositeFit::pdf::{
    Chebyshev::Chebyshev, Exponential::Exponential, Gaussian::Gaussian, Polynomial::Polynomial,
    Shape, Uniform::Uniform,
};
use CompositeFit::*;
use assert_approx_eq::assert_approx_eq;

#[test]
fn closed_forms_match_quadrature() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", -2.0, 8.0).unwrap();
    let mean: VarId = reg.constant("mean", 3.0).unwrap();
    let sigma: VarId = reg.constant("sigma", 0.7).unwrap();
    let c1: VarId = reg.constant("c1", 0.4).unwrap();
    let c2: VarId = reg.constant("c2", -0.2).unwrap();
    let c3: VarId = reg.constant("c3", 0.05).unwrap();
    let slope: VarId = reg.constant("slope", -0.3).unwrap();
    let p1: VarId = reg.constant("p1", 0.1).unwrap();
    let p2: VarId = reg.constant("p2", 0.02).unwrap();

    let shapes: Vec<Arc<dyn Shape>> = vec![
        Arc::new(Gaussian::new(&reg, "gauss", x, mean, sigma).unwrap()),
        Arc::new(Chebyshev::new(&reg, "cheb", x, &[c1, c2, c3]).unwrap()),
        Arc::new(Polynomial::new(&reg, "poly", x, &[p1, p2]).unwrap()),
        Arc::new(Exponential::new(&reg, "expo", x, slope).unwrap()),
        Arc::new(Uniform::new(&reg, "flat", x).unwrap()),
    ];
    let values: Vec<f64> = reg.values();
    let ranges: [Range; 3] = [
        reg.support(x).unwrap(),
        Range::new(2.0, 4.0).unwrap(),
        Range::new(-1.5, 0.25).unwrap(),
    ];

    for shape in &shapes {
        for range in &ranges {
            let exact: f64 = shape.integral(&values, range);
            let numeric: f64 = euclid::integrate(|v| shape.unnormalized(v, &values), range.bounds());
            assert_approx_eq!(exact, numeric, 1e-8 * exact.abs().max(1.0));
        }
    }
}

#[test]
fn envelopes_bound_the_shapes() {
    let mut reg: Registry = Registry::new();
    let x: VarId = reg.observable("x", -1.0, 3.0).unwrap();
    let c1: VarId = reg.constant("c1", -0.6).unwrap();
    let c2: VarId = reg.constant("c2", 0.3).unwrap();
    let p1: VarId = reg.constant("p1", -0.2).unwrap();
    let p2: VarId = reg.constant("p2", 0.1).unwrap();

    let shapes: Vec<Arc<dyn Shape>> = vec![
        Arc::new(Chebyshev::new(&reg, "cheb", x, &[c1, c2]).unwrap()),
        Arc::new(Polynomial::new(&reg, "poly", x, &[p1, p2]).unwrap()),
    ];
    let values: Vec<f64> = reg.values();
    let range: Range = reg.support(x).unwrap();

    for shape in &shapes {
        let max: f64 = shape.max_unnormalized(&values, &range);
        for i in 0..=400 {
            let v: f64 = -1.0 + 4.0 * i as f64 / 400.0;
            assert!(shape.unnormalized(v, &values) <= max, "{} at {v}", shape.name());
        }
    }
}
