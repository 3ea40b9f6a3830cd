//! Euclid contains uscefull math functions: numerical integration and the few
//! special functions needed by the closed form integrals of the pdfs.

use crate::configuration::integration::{
    DEFAULT_INTEGRATION_MAXIMUM_STEPS, DEFAULT_INTEGRATION_MINIMUM_STEPS,
    DEFAULT_INTEGRATION_PRECISION, SMALL_INTEGRATION_NUM_STEPS,
};

/// `1 / sqrt(2 * pi)`
pub const INV_SQRT_2_PI: f64 = 0.398_942_280_401_432_7;

/// `sqrt(2)`
pub const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// Chooses the step length and the number of steps to integrate over `bounds`
/// with the [Simpson's rule](https://en.wikipedia.org/wiki/Simpson%27s_rule#Composite_Simpson's_1/3_rule).
///
/// The returned number of steps is always odd (one more than the number of
/// subintervals, wich is even). See [crate::configuration::integration].
///
/// **Panicks** if the bounds are not finite.
pub fn choose_integration_precision_and_steps(bounds: (f64, f64)) -> (f64, usize) {
    let range: f64 = bounds.1 - bounds.0;
    assert!(range.is_finite(), "Tried to integrate over an infinite interval. ");

    if range <= 2.0 {
        // small interval: fixed number of steps
        let steps: usize = SMALL_INTEGRATION_NUM_STEPS;
        return (range / (steps - 1) as f64, steps);
    }

    let ideal_steps: f64 = (range / DEFAULT_INTEGRATION_PRECISION).ceil();
    let mut steps: usize = if (DEFAULT_INTEGRATION_MAXIMUM_STEPS as f64) < ideal_steps {
        DEFAULT_INTEGRATION_MAXIMUM_STEPS
    } else {
        (ideal_steps as usize).max(DEFAULT_INTEGRATION_MINIMUM_STEPS)
    };

    if steps % 2 == 0 {
        // Simpson needs an even number of subintervals
        steps += 1;
    }

    return (range / (steps - 1) as f64, steps);
}

/// Numerically integrates `func` over the finite interval `bounds` using the composite
/// [Simpson's rule](https://en.wikipedia.org/wiki/Simpson%27s_rule#Composite_Simpson's_1/3_rule)
/// with `num_steps` evaluation points.
///
/// `num_steps` is rounded up to the next odd number (and to at least 3).
pub fn numerical_integration(func: impl Fn(f64) -> f64, bounds: (f64, f64), num_steps: u64) -> f64 {
    let mut n: u64 = num_steps.max(3);
    if n % 2 == 0 {
        n += 1;
    }

    let intervals: f64 = (n - 1) as f64;
    let h: f64 = (bounds.1 - bounds.0) / intervals;

    // ends have weight 1, odd points 4, even points 2
    let mut accumulator: f64 = func(bounds.0) + func(bounds.1);
    for i in 1..(n - 1) {
        let x: f64 = bounds.0 + h * i as f64;
        let weight: f64 = if i % 2 == 1 { 4.0 } else { 2.0 };
        accumulator += weight * func(x);
    }

    return accumulator * h / 3.0;
}

/// Integrates `func` over `bounds` choosing the number of steps with
/// [choose_integration_precision_and_steps].
pub fn integrate(func: impl Fn(f64) -> f64, bounds: (f64, f64)) -> f64 {
    let (_, steps): (f64, usize) = choose_integration_precision_and_steps(bounds);
    return numerical_integration(func, bounds, steps as u64);
}

/// The [error function](https://en.wikipedia.org/wiki/Error_function).
#[inline]
pub fn erf(x: f64) -> f64 {
    return statrs::function::erf::erf(x);
}

/// The cdf of the standard normal distribution.
#[inline]
pub fn std_normal_cdf(z: f64) -> f64 {
    return 0.5 * statrs::function::erf::erfc(-z / SQRT_2);
}

/// Integral of the standard normal density over `[z_a, z_b]`.
///
/// Uses the upper tail when both points are positive (and the lower tail when
/// both are negative) to avoid the cancellation of `Phi(z_b) - Phi(z_a)`.
pub fn std_normal_interval(z_a: f64, z_b: f64) -> f64 {
    if 0.0 < z_a {
        return std_normal_cdf(-z_a) - std_normal_cdf(-z_b);
    }
    return std_normal_cdf(z_b) - std_normal_cdf(z_a);
}

/// Evaluates the polynomial `1 + coefs[0] * x + coefs[1] * x^2 + ...`
/// using [Horner's rule](https://en.wikipedia.org/wiki/Horner%27s_method).
pub fn one_plus_polynomial(x: f64, coefs: &[f64]) -> f64 {
    let mut acc: f64 = 0.0;
    for &c in coefs.iter().rev() {
        acc = (acc + c) * x;
    }
    return 1.0 + acc;
}

/// Fills `out[k] = T_k(x)` for `k = 0..out.len()`
/// ([Chebyshev polynomials](https://en.wikipedia.org/wiki/Chebyshev_polynomials) of the first kind).
pub fn chebyshev_values(x: f64, out: &mut [f64]) {
    if out.is_empty() {
        return;
    }
    out[0] = 1.0;
    if out.len() == 1 {
        return;
    }
    out[1] = x;
    // T_{k+1}(x) = 2x T_k(x) - T_{k-1}(x)
    for k in 2..out.len() {
        out[k] = 2.0 * x * out[k - 1] - out[k - 2];
    }
}

/// Antiderivative of `T_k` evaluated at `x` (with the constant chosen so that it is
/// a polynomial).
///
/// ```text
/// k = 0:  x
/// k = 1:  x^2 / 2
/// k > 1:  ( T_{k+1}(x) / (k+1) - T_{k-1}(x) / (k-1) ) / 2
/// ```
pub fn chebyshev_antiderivative(k: usize, t_values: &[f64], x: f64) -> f64 {
    return match k {
        0 => x,
        1 => 0.5 * x * x,
        _ => {
            let kf: f64 = k as f64;
            0.5 * (t_values[k + 1] / (kf + 1.0) - t_values[k - 1] / (kf - 1.0))
        }
    };
}
