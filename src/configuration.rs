//! This file contains the deafult values and other value choices used trough the library.
//!
//! The values in the submodules are plain statics. The values that make sense to change
//! for a single fit are collected in [FitConfig], wich uses them as defaults.

use bon::Builder;

use crate::errors::{FitError, Result};

/// The library uses numerical integration for shapes without a closed form integral
/// (see [crate::pdf::Custom::CustomShape]). We use the [Simpson's rule](https://en.wikipedia.org/wiki/Simpson%27s_rule#Composite_Simpson's_1/3_rule)
/// to integrate, but for a given integral we still need to choose the step length
/// or the number of steps.
///
/// For most intervals, we integrate using a step length of [integration::DEFAULT_INTEGRATION_PRECISION],
/// however if the interval is too large (it would requiere more than
/// [integration::DEFAULT_INTEGRATION_MAXIMUM_STEPS] to integrate), we keep the number of steps
/// fixed and just change the precision. If the interval is very small (2 units or less), we
/// use [integration::SMALL_INTEGRATION_NUM_STEPS] with the appropiate precision.
///
/// In order to choose the correct values, we use the [crate::euclid::choose_integration_precision_and_steps]
/// function.
pub mod integration {
    /// The deafult integration precision is `1/1024`.
    pub static DEFAULT_INTEGRATION_PRECISION: f64 = 1.0 / 1024.0;

    /// The maximum number of subdivisions of the domains to numerically integrate functions.
    /// `(1 << 16) + 1 = 65 537`
    ///
    /// The `+ 1` is because odd numbers are better for Simpson's integration.
    pub static DEFAULT_INTEGRATION_MAXIMUM_STEPS: usize = (1 << 16) + 1;

    /// The minimum number of subdivisions of the domains to numerically integrate functions.
    /// `(1 << 10) + 1 = 1 025`
    pub static DEFAULT_INTEGRATION_MINIMUM_STEPS: usize = (1 << 10) + 1;

    /// The number of steps used to integrate among a small interval
    /// (such as `[0, 1]` or `[-1, 1]`).
    ///
    /// `4097` = `2^12 + 1`
    pub static SMALL_INTEGRATION_NUM_STEPS: usize = 4097;
}

/// Values used by the [sampler](crate::sampler).
pub mod sampling {
    /// Number of grid points used to estimate the maximum of a shape without
    /// an analytical envelope.
    pub static MAX_SEARCH_GRID_POINTS: usize = 1024;

    /// The grid maximum is multiplied by this factor to account for peaks between
    /// grid points.
    pub static MAX_SAFETY_FACTOR: f64 = 1.2;

    /// A truncated Gaussian is sampled by drawing from the full Gaussian and
    /// discarding values outside the range. If the range contains less than this
    /// probability, uniform accept-reject is used instead.
    pub static MIN_GAUSSIAN_ACCEPTANCE: f64 = 0.05;

    /// Upper limit of proposals for a single accepted sample. Reaching it means
    /// the envelope is useless (or the pdf is 0 everywhere in the range).
    pub static MAX_PROPOSALS_PER_SAMPLE: usize = 1_000_000;
}

/// Values used by the [minimizer](crate::minimizer).
pub mod minimizer {
    /// Maximum number of iterations of the minimizer.
    pub static DEFAULT_MAX_ITERATIONS: u64 = 2000;

    /// Convergence tolerance on the gradient norm (in the internal, unbounded
    /// parameter space).
    pub static DEFAULT_GRADIENT_TOLERANCE: f64 = 1e-4;

    /// Convergence tolerance on the change of the NLL between iterations.
    pub static DEFAULT_COST_TOLERANCE: f64 = 1e-9;

    /// Number of corrections stored by L-BFGS.
    pub static DEFAULT_LBFGS_MEMORY: usize = 10;

    /// Relative step for the central differences of the gradient.
    pub static GRADIENT_STEP: f64 = 1e-6;

    /// Relative step for the numerical Hessian.
    pub static HESSIAN_STEP: f64 = 1e-4;

    /// Value returned to the minimizer when the NLL cannot be evaluated
    /// (negative density, invalid weights...).
    pub static INVALID_NLL_PENALTY: f64 = 1e30;

    /// Bounded parameters never start closer than this fraction of the
    /// bound width to a bound.
    pub static BOUND_NUDGE: f64 = 1e-4;
}

/// Values used by the [likelihood](crate::likelihood).
pub mod likelihood {
    /// Datasets with at least this many events are summed in parallel.
    pub static DEFAULT_PARALLEL_THRESHOLD: usize = 4096;

    /// Number of events per parallel task.
    pub static PARALLEL_CHUNK_SIZE: usize = 1024;
}

/// Options of a single fit.
///
/// ```
/// use CompositeFit::configuration::FitConfig;
///
/// let config: FitConfig = FitConfig::builder().max_iterations(500).build();
/// assert_eq!(config.max_iterations, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct FitConfig {
    /// Iteration cap of every minimizer pass.
    #[builder(default = minimizer::DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: u64,
    /// Gradient norm tolerance.
    #[builder(default = minimizer::DEFAULT_GRADIENT_TOLERANCE)]
    pub gradient_tolerance: f64,
    /// NLL change tolerance.
    #[builder(default = minimizer::DEFAULT_COST_TOLERANCE)]
    pub cost_tolerance: f64,
    /// L-BFGS history length.
    #[builder(default = minimizer::DEFAULT_LBFGS_MEMORY)]
    pub lbfgs_memory: usize,
    /// Retry with Nelder-Mead if L-BFGS fails.
    #[builder(default = true)]
    pub simplex_fallback: bool,
    /// Compute the Hessian (and therefore uncertainties and correlations).
    #[builder(default = true)]
    pub compute_hessian: bool,
    /// See [likelihood::DEFAULT_PARALLEL_THRESHOLD].
    #[builder(default = likelihood::DEFAULT_PARALLEL_THRESHOLD)]
    pub parallel_threshold: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        return FitConfig::builder().build();
    }
}

impl FitConfig {
    /// Checks the options the minimizer can not work with.
    ///
    /// Returns [FitError::InvalidParameter] naming the offending option if a
    /// tolerance is negative or not finite or if the L-BFGS memory is 0.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, reason: String| -> FitError {
            return FitError::InvalidParameter {
                name: name.to_string(),
                reason,
            };
        };

        for (name, tolerance) in [
            ("gradient_tolerance", self.gradient_tolerance),
            ("cost_tolerance", self.cost_tolerance),
        ] {
            if !(tolerance.is_finite() && 0.0 <= tolerance) {
                return Err(invalid(name, format!("{tolerance} is not a valid tolerance")));
            }
        }
        if self.lbfgs_memory == 0 {
            return Err(invalid("lbfgs_memory", String::from("L-BFGS needs a history of at least 1")));
        }
        return Ok(());
    }
}
