//! # Sampler
//!
//! Draws synthetic datasets from a [Pdf] tree.
//!
//! Sums are sampled exactly: for every event a child is picked with a
//! categorical draw and then the chosen child is sampled (recursively). The
//! probability of child `i` when sampling inside a range `R` is
//!
//! ```text
//! w_i * int_R f_i / int_D f_i
//! ```
//!
//! (normalized), where `D` is the full support of the observable, so the sampled
//! events follow the mixture restricted to `R`. Leaves use the method of their
//! [Shape](crate::pdf::Shape) (inverse cdf, truncated normal draws or rejection
//! sampling).
//!
//! With a `seed` the generation is deterministic, without it the thread rng is used.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Poisson};

use crate::dataset::Dataset;
use crate::errors::{FitError, Result};
use crate::pdf::Pdf;
use crate::range::Range;
use crate::registry::{Registry, VarId};

/// Generates exactly `n` independent events from `pdf`.
///
/// The events are drawn over the full support of the observable or inside the
/// named `range` if it is given.
///
/// ```
/// use CompositeFit::{pdf::Gaussian::Gaussian, pdf::Pdf, registry::Registry, sampler};
///
/// let mut reg: Registry = Registry::new();
/// let x = reg.observable("x", 0.0, 10.0).unwrap();
/// let mean = reg.constant("mean", 5.0).unwrap();
/// let sigma = reg.constant("sigma", 0.5).unwrap();
/// let g: Pdf = Pdf::leaf(Gaussian::new(&reg, "g", x, mean, sigma).unwrap());
///
/// let data = sampler::generate().pdf(&g).registry(&reg).n(100).seed(42).call().unwrap();
/// assert_eq!(data.len(), 100);
/// ```
#[bon::builder]
pub fn generate(
    pdf: &Pdf,
    registry: &Registry,
    n: usize,
    range: Option<&str>,
    seed: Option<u64>,
) -> Result<Dataset> {
    let mut rng: StdRng = make_rng(seed);
    let observable: VarId = pdf.observable();
    let range: Range = registry.range_or_support(observable, range)?;
    let values: Vec<f64> = registry.values();

    let events: Vec<f64> = generate_with_rng(pdf, registry, &values, &range, n, &mut rng)?;
    log::debug!("Generated {n} events of `{}`", pdf.name());
    return Dataset::from_column(registry, observable, events);
}

/// Generates a dataset whose size is drawn from a
/// [Poisson](https://en.wikipedia.org/wiki/Poisson_distribution) distribution with
/// the expected number of events of `pdf` (inside `range` if given).
///
/// Fails with [FitError::NotExtendable] if the pdf has no expected number of events.
#[bon::builder]
pub fn generate_extended(
    pdf: &Pdf,
    registry: &Registry,
    range: Option<&str>,
    seed: Option<u64>,
) -> Result<Dataset> {
    let mut rng: StdRng = make_rng(seed);
    let observable: VarId = pdf.observable();
    let range: Range = registry.range_or_support(observable, range)?;
    let values: Vec<f64> = registry.values();

    let expected: f64 = pdf
        .expected_events(&values, &range)?
        .ok_or_else(|| FitError::NotExtendable(pdf.name().to_string()))?;
    if !expected.is_finite() || expected < 0.0 {
        return Err(FitError::Numerical(format!(
            "`{}` expects {expected} events",
            pdf.name()
        )));
    }

    let n: usize = if expected == 0.0 {
        0
    } else {
        let poisson: Poisson<f64> =
            Poisson::new(expected).map_err(|e| FitError::Numerical(e.to_string()))?;
        poisson.sample(&mut rng) as usize
    };

    let events: Vec<f64> = generate_with_rng(pdf, registry, &values, &range, n, &mut rng)?;
    log::debug!(
        "Generated {n} events of `{}` ({expected:.1} expected)",
        pdf.name()
    );
    return Dataset::from_column(registry, observable, events);
}

/// Draws `n` values of the observable of `pdf` inside `range` using `rng`.
///
/// `values` is the parameter snapshot (see [Registry::values]).
pub fn generate_with_rng(
    pdf: &Pdf,
    registry: &Registry,
    values: &[f64],
    range: &Range,
    n: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<f64>> {
    let domain: Range = registry.support(pdf.observable())?;
    if !domain.includes(range) {
        return Err(FitError::RangeMismatch(format!(
            "cannot sample `{}` in [{}, {}), it is outside the observable",
            pdf.name(),
            range.low(),
            range.high()
        )));
    }
    return sample_node(pdf, values, &domain, range, n, rng);
}

fn make_rng(seed: Option<u64>) -> StdRng {
    return match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_rng(&mut rand::rng()),
    };
}

fn sample_node(
    pdf: &Pdf,
    values: &[f64],
    domain: &Range,
    range: &Range,
    n: usize,
    rng: &mut dyn RngCore,
) -> Result<Vec<f64>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    match pdf {
        Pdf::Leaf(shape) => {
            shape.validate(values)?;
            let integral: f64 = shape.integral(values, range);
            if !integral.is_finite() || integral <= 0.0 {
                return Err(FitError::UnnormalizablePdf {
                    name: shape.name().to_string(),
                    integral,
                });
            }
            return shape.sample_multiple(values, range, n, rng);
        }
        Pdf::Extended(e) => return sample_node(e.child(), values, domain, range, n, rng),
        Pdf::Sum(sum) => {
            let weights: Vec<f64> = sum.weights(values, domain)?;
            let mut probabilities: Vec<f64> = Vec::with_capacity(weights.len());
            for (w, child) in weights.iter().zip(sum.children()) {
                let norm: f64 = child.normalization(values, domain)?;
                let p: f64 = w * child.integral(values, domain, range)? / norm;
                if !p.is_finite() || p < 0.0 {
                    return Err(FitError::Numerical(format!(
                        "component `{}` of `{}` has probability {p}",
                        child.name(),
                        pdf.name()
                    )));
                }
                probabilities.push(p);
            }

            let total: f64 = probabilities.iter().sum::<f64>();
            if !total.is_finite() || total <= 0.0 {
                return Err(FitError::UnnormalizablePdf {
                    name: pdf.name().to_string(),
                    integral: total,
                });
            }

            // pick the branch of every event, keeping the positions so the
            // order of the events stays random
            let mut positions: Vec<Vec<usize>> = vec![Vec::new(); probabilities.len()];
            for i in 0..n {
                let branch: usize = categorical(&probabilities, total, rng);
                positions[branch].push(i);
            }

            let mut ret: Vec<f64> = vec![0.0; n];
            for (child, indices) in sum.children().iter().zip(&positions) {
                let xs: Vec<f64> = sample_node(child, values, domain, range, indices.len(), rng)?;
                for (&i, x) in indices.iter().zip(xs) {
                    ret[i] = x;
                }
            }
            return Ok(ret);
        }
    }
}

/// Index `i` with probability `weights[i] / total`.
fn categorical(weights: &[f64], total: f64, rng: &mut dyn RngCore) -> usize {
    let u: f64 = rng.random::<f64>() * total;
    let mut acc: f64 = 0.0;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        if u < acc {
            return i;
        }
    }
    // rounding: return the last branch with non zero weight
    return weights.iter().rposition(|&w| 0.0 < w).unwrap_or(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::SumCoefficients;
    use crate::pdf::Uniform::Uniform;

    #[test]
    fn categorical_respects_zero_weights() {
        let mut rng: StdRng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let i: usize = categorical(&[0.0, 1.0, 0.0], 1.0, &mut rng);
            assert_eq!(i, 1);
        }
    }

    #[test]
    fn same_seed_same_data() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 1.0).unwrap();
        let u: Pdf = Pdf::leaf(Uniform::new(&reg, "u", x).unwrap());
        let a: Dataset = generate().pdf(&u).registry(&reg).n(50).seed(9).call().unwrap();
        let b: Dataset = generate().pdf(&u).registry(&reg).n(50).seed(9).call().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn range_generation_stays_in_range() {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        let frac: VarId = reg.constant("frac", 0.5).unwrap();
        reg.define_range(x, "low", 0.0, 1.0).unwrap();
        let narrow = crate::pdf::Custom::CustomShape::new(&reg, "narrow", x, &[], |v, _| {
            if v < 2.0 { 1.0 } else { 0.0 }
        })
        .unwrap();
        let wide: Pdf = Pdf::leaf(Uniform::new(&reg, "wide", x).unwrap());
        let model: Pdf = Pdf::sum(
            &reg,
            "model",
            vec![Pdf::leaf(narrow), wide],
            SumCoefficients::Fractions(vec![frac]),
        )
        .unwrap();

        let data: Dataset = generate()
            .pdf(&model)
            .registry(&reg)
            .n(4000)
            .range("low")
            .seed(5)
            .call()
            .unwrap();
        assert_eq!(data.len(), 4000);
        let low: Range = reg.range(x, "low").unwrap();
        assert_eq!(data.count_in(x, &low), 4000);
    }
}
