//! # Custom shape
//!
//! A shape defined by a user closure `f(x, parameters)`. The closure receives the
//! values of the declared parameters in the order they were given.
//!
//! The integral and the sampling use the generic numerical methods of
//! [Shape], so a custom shape is slower than the built in ones.

use std::sync::Arc;

use crate::errors::Result;
use crate::pdf::shape_trait::Shape;
use crate::registry::{Registry, VarId};

pub type ShapeFunction = dyn Fn(f64, &[f64]) -> f64 + Send + Sync;

#[derive(Clone)]
pub struct CustomShape {
    name: String,
    x: VarId,
    parameters: Vec<VarId>,
    func: Arc<ShapeFunction>,
}

impl CustomShape {
    /// Create a [CustomShape].
    ///
    /// `func` must return a non-negative finite value for every `x` inside the
    /// support of the observable.
    pub fn new<F>(registry: &Registry, name: &str, x: VarId, parameters: &[VarId], func: F) -> Result<CustomShape>
    where
        F: Fn(f64, &[f64]) -> f64 + Send + Sync + 'static,
    {
        registry.support(x)?;
        for &p in parameters {
            registry.get(p)?;
        }
        return Ok(CustomShape {
            name: name.to_string(),
            x,
            parameters: parameters.to_vec(),
            func: Arc::new(func),
        });
    }
}

impl std::fmt::Debug for CustomShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("CustomShape")
            .field("name", &self.name)
            .field("x", &self.x)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive();
    }
}

impl Shape for CustomShape {
    fn name(&self) -> &str {
        return &self.name;
    }

    fn observable(&self) -> VarId {
        return self.x;
    }

    fn parameters(&self) -> Vec<VarId> {
        return self.parameters.clone();
    }

    fn unnormalized(&self, x: f64, values: &[f64]) -> f64 {
        let params: Vec<f64> = self
            .parameters
            .iter()
            .map(|p| values[p.index()])
            .collect::<Vec<f64>>();
        return (self.func)(x, &params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::Range;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn numerical_defaults() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 1.0).unwrap();
        let k: VarId = reg.constant("k", 2.0).unwrap();
        let shape: CustomShape = CustomShape::new(&reg, "triangle", x, &[k], |x, p| p[0] * x).unwrap();
        let values: Vec<f64> = reg.values();
        let full: Range = reg.support(x).unwrap();

        assert_approx_eq!(shape.integral(&values, &full), 1.0, 1e-10);
        assert!(shape.max_unnormalized(&values, &full) >= 2.0);

        let mut rng: StdRng = StdRng::seed_from_u64(3);
        let xs: Vec<f64> = shape.sample_multiple(&values, &full, 5000, &mut rng).unwrap();
        let mean: f64 = xs.iter().sum::<f64>() / xs.len() as f64;
        // mean of the density 2x on [0, 1] is 2/3, std dev of the mean ~ 0.0033
        assert_approx_eq!(mean, 2.0 / 3.0, 0.02);
    }
}
