//! # Uniform
//!
//! A flat shape. Over a range `[a, b)` it normalizes to `1 / (b - a)`.

use rand::{Rng, RngCore};

use crate::errors::Result;
use crate::pdf::shape_trait::Shape;
use crate::range::Range;
use crate::registry::{Registry, VarId};

#[derive(Debug, Clone, PartialEq)]
pub struct Uniform {
    name: String,
    x: VarId,
}

impl Uniform {
    pub fn new(registry: &Registry, name: &str, x: VarId) -> Result<Uniform> {
        registry.support(x)?;
        return Ok(Uniform {
            name: name.to_string(),
            x,
        });
    }
}

impl Shape for Uniform {
    fn name(&self) -> &str {
        return &self.name;
    }

    fn observable(&self) -> VarId {
        return self.x;
    }

    fn parameters(&self) -> Vec<VarId> {
        return Vec::new();
    }

    fn unnormalized(&self, _x: f64, _values: &[f64]) -> f64 {
        return 1.0;
    }

    fn integral(&self, _values: &[f64], range: &Range) -> f64 {
        return range.width();
    }

    fn max_unnormalized(&self, _values: &[f64], _range: &Range) -> f64 {
        return 1.0;
    }

    fn sample_multiple(
        &self,
        _values: &[f64],
        range: &Range,
        n: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<f64>> {
        let (low, width): (f64, f64) = (range.low(), range.width());
        return Ok((0..n)
            .map(|_| low + rng.random::<f64>() * width)
            .collect::<Vec<f64>>());
    }
}
