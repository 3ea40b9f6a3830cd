//! # Minimizer
//!
//! Minimizes an [ObjectiveFunction] over a box of (possibly one sided or
//! unbounded) parameters and estimates the uncertainties at the minimum.
//!
//! Bounded parameters are mapped to an unconstrained internal space:
//!
//!  - `[low, high]`: `x = low + (high - low) / (1 + exp(-z))`
//!  - `[low, inf)`: `x = low + exp(z)`
//!  - `(-inf, high]`: `x = high - exp(z)`
//!
//! The primary solver is [L-BFGS](https://en.wikipedia.org/wiki/Limited-memory_BFGS)
//! with a More-Thuente line search ([argmin]). If it fails or stops without
//! converging, [Nelder-Mead](https://en.wikipedia.org/wiki/Nelder%E2%80%93Mead_method)
//! is started from the best point found.
//!
//! Objective values that are not finite (or evaluations that fail) are replaced
//! by [INVALID_NLL_PENALTY] and counted.
//!
//! The covariance matrix is the inverse of the numerical Hessian of the
//! objective in the external parameters (the objective is a negative log
//! likelihood, so no factor 2 is involved).

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::DMatrix;

use crate::configuration::FitConfig;
use crate::configuration::minimizer::{BOUND_NUDGE, GRADIENT_STEP, HESSIAN_STEP, INVALID_NLL_PENALTY};
use crate::domain::ContinuousDomain;
use crate::errors::{FitError, Result};
use crate::fit::FitStatus;

/// Size of the initial Nelder-Mead simplex in internal units.
const SIMPLEX_STEP: f64 = 0.1;

/// Objective function trait for optimization
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// `true` if [ObjectiveFunction::gradient] is overridden with an analytic gradient.
    ///
    /// The minimizer then uses it (through the chain rule of the parameter
    /// transforms) instead of differentiating the objective itself. If the
    /// analytic gradient fails, L-BFGS stops and Nelder-Mead takes over.
    fn has_gradient(&self) -> bool {
        return false;
    }

    /// Compute gradient at given parameters (central differences if not overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let n: usize = params.len();
        let mut grad: Vec<f64> = vec![0.0; n];
        let mut shifted: Vec<f64> = params.to_vec();

        for i in 0..n {
            let eps: f64 = GRADIENT_STEP * params[i].abs().max(1.0);

            shifted[i] = params[i] + eps;
            let f_plus: f64 = self.eval(&shifted)?;
            shifted[i] = params[i] - eps;
            let f_minus: f64 = self.eval(&shifted)?;
            shifted[i] = params[i];

            grad[i] = (f_plus - f_minus) / (2.0 * eps);
        }

        return Ok(grad);
    }
}

/// Change of variables between the external (bounded) and the internal
/// (unbounded) parameter space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterTransform {
    Identity,
    Logistic { low: f64, high: f64 },
    LowerBound { low: f64 },
    UpperBound { high: f64 },
}

impl ParameterTransform {
    pub fn from_domain(domain: &ContinuousDomain) -> ParameterTransform {
        return match *domain {
            ContinuousDomain::Reals => ParameterTransform::Identity,
            ContinuousDomain::Range(low, high) => ParameterTransform::Logistic { low, high },
            ContinuousDomain::From(low) => ParameterTransform::LowerBound { low },
            ContinuousDomain::To(high) => ParameterTransform::UpperBound { high },
        };
    }

    /// Moves `x` slightly away from the bounds (the internal value of a bound is infinite).
    pub fn nudge(&self, x: f64) -> f64 {
        return match *self {
            ParameterTransform::Identity => x,
            ParameterTransform::Logistic { low, high } => {
                let margin: f64 = BOUND_NUDGE * (high - low);
                x.clamp(low + margin, high - margin)
            }
            ParameterTransform::LowerBound { low } => x.max(low + BOUND_NUDGE * low.abs().max(1.0)),
            ParameterTransform::UpperBound { high } => x.min(high - BOUND_NUDGE * high.abs().max(1.0)),
        };
    }

    pub fn to_internal(&self, x: f64) -> f64 {
        let x: f64 = self.nudge(x);
        return match *self {
            ParameterTransform::Identity => x,
            ParameterTransform::Logistic { low, high } => ((x - low) / (high - x)).ln(),
            ParameterTransform::LowerBound { low } => (x - low).ln(),
            ParameterTransform::UpperBound { high } => (high - x).ln(),
        };
    }

    pub fn to_external(&self, z: f64) -> f64 {
        return match *self {
            ParameterTransform::Identity => z,
            ParameterTransform::Logistic { low, high } => low + (high - low) / (1.0 + (-z).exp()),
            ParameterTransform::LowerBound { low } => low + z.exp(),
            ParameterTransform::UpperBound { high } => high - z.exp(),
        };
    }

    /// `dx/dz` at the internal value `z`.
    pub fn derivative(&self, z: f64) -> f64 {
        return match *self {
            ParameterTransform::Identity => 1.0,
            ParameterTransform::Logistic { low, high } => {
                let s: f64 = 1.0 / (1.0 + (-z).exp());
                (high - low) * s * (1.0 - s)
            }
            ParameterTransform::LowerBound { .. } => z.exp(),
            ParameterTransform::UpperBound { .. } => -z.exp(),
        };
    }
}

/// Result of a minimization
#[derive(Debug, Clone)]
pub struct MinimizationOutcome {
    /// Best parameters (external space)
    pub parameters: Vec<f64>,
    /// Function value at the minimum
    pub fval: f64,
    /// Number of iterations (of all the solvers used)
    pub iterations: u64,
    /// Number of objective evaluations
    pub n_fev: usize,
    /// Number of gradient evaluations
    pub n_gev: usize,
    /// Evaluations that failed or were not finite
    pub invalid_evaluations: usize,
    pub status: FitStatus,
    /// The solver that produced the final point
    pub solver: &'static str,
}

impl fmt::Display for MinimizationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MinimizationOutcome(fval={:.6}, iterations={}, n_fev={}, n_gev={}, invalid={}, solver={}, status={})",
            self.fval,
            self.iterations,
            self.n_fev,
            self.n_gev,
            self.invalid_evaluations,
            self.solver,
            self.status
        )
    }
}

#[derive(Default)]
struct EvalCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
    invalid: AtomicUsize,
}

/// The objective seen by argmin: internal parameters, penalized invalid values.
struct InternalProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    transforms: &'a [ParameterTransform],
    counts: Arc<EvalCounts>,
}

impl InternalProblem<'_> {
    fn external(&self, z: &[f64]) -> Vec<f64> {
        return z
            .iter()
            .zip(self.transforms)
            .map(|(&z, t)| t.to_external(z))
            .collect::<Vec<f64>>();
    }

    fn penalized(&self, z: &[f64]) -> f64 {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        return match self.objective.eval(&self.external(z)) {
            Ok(v) if v.is_finite() => v,
            Ok(v) => {
                self.counts.invalid.fetch_add(1, Ordering::Relaxed);
                log::debug!("Invalid objective value {v}");
                INVALID_NLL_PENALTY
            }
            Err(e) => {
                self.counts.invalid.fetch_add(1, Ordering::Relaxed);
                log::debug!("Objective evaluation failed: {e}");
                INVALID_NLL_PENALTY
            }
        };
    }
}

impl ObjectiveFunction for InternalProblem<'_> {
    fn eval(&self, z: &[f64]) -> Result<f64> {
        return Ok(self.penalized(z));
    }
}

impl CostFunction for InternalProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        return Ok(self.penalized(z));
    }
}

impl Gradient for InternalProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, z: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        if !self.objective.has_gradient() {
            return ObjectiveFunction::gradient(self, z)
                .map_err(|e| argmin::core::Error::msg(e.to_string()));
        }

        let external: Vec<f64> = self
            .objective
            .gradient(&self.external(z))
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        if external.len() != z.len() || external.iter().any(|g| !g.is_finite()) {
            return Err(argmin::core::Error::msg("invalid analytic gradient"));
        }
        return Ok(external
            .iter()
            .zip(z.iter().zip(self.transforms))
            .map(|(g, (&z, t))| g * t.derivative(z))
            .collect::<Vec<f64>>());
    }
}

/// The state reached by one solver.
struct SolverRun {
    z: Vec<f64>,
    cost: f64,
    iterations: u64,
    status: FitStatus,
}

fn classify(termination: &TerminationStatus, iterations: u64) -> FitStatus {
    return match termination {
        TerminationStatus::Terminated(
            TerminationReason::SolverConverged | TerminationReason::TargetCostReached,
        ) => FitStatus::Converged,
        TerminationStatus::Terminated(TerminationReason::MaxItersReached) => FitStatus::Failed {
            reason: FitError::MaxIterationsExceeded { iterations },
        },
        other => FitStatus::Failed {
            reason: FitError::Numerical(format!("the minimizer stopped: {other}")),
        },
    };
}

pub struct Minimizer {
    config: FitConfig,
}

impl Minimizer {
    pub fn new(config: FitConfig) -> Minimizer {
        return Minimizer { config };
    }

    pub fn config(&self) -> &FitConfig {
        return &self.config;
    }

    /// Minimizes `objective` starting at `init` (external values) with every
    /// parameter restricted to its `domains` entry.
    ///
    /// Only configuration problems are returned as errors: a minimization that
    /// does not converge returns an outcome with [FitStatus::Failed].
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init: &[f64],
        domains: &[ContinuousDomain],
    ) -> Result<MinimizationOutcome> {
        self.config.validate()?;
        if init.len() != domains.len() {
            return Err(FitError::InvalidParameter {
                name: String::from("<minimizer>"),
                reason: format!(
                    "{} initial values for {} parameters",
                    init.len(),
                    domains.len()
                ),
            });
        }

        let transforms: Vec<ParameterTransform> = domains
            .iter()
            .map(ParameterTransform::from_domain)
            .collect::<Vec<ParameterTransform>>();
        let z0: Vec<f64> = init
            .iter()
            .zip(&transforms)
            .map(|(&x, t)| t.to_internal(x))
            .collect::<Vec<f64>>();

        let counts: Arc<EvalCounts> = Arc::new(EvalCounts::default());
        let problem = || InternalProblem {
            objective,
            transforms: &transforms,
            counts: Arc::clone(&counts),
        };

        let mut solver: &'static str = "L-BFGS";
        let mut iterations: u64 = 0;

        let mut best: SolverRun = if z0.is_empty() {
            // nothing to move
            SolverRun {
                cost: problem().penalized(&z0),
                z: z0.clone(),
                iterations: 0,
                status: FitStatus::Converged,
            }
        } else {
            match self.run_lbfgs(problem(), z0.clone()) {
                Ok(run) => run,
                Err(e) => {
                    log::debug!("L-BFGS failed: {e}");
                    SolverRun {
                        cost: problem().penalized(&z0),
                        z: z0.clone(),
                        iterations: 0,
                        status: FitStatus::Failed {
                            reason: FitError::Numerical(e.to_string()),
                        },
                    }
                }
            }
        };
        iterations += best.iterations;

        if !best.status.is_converged() && self.config.simplex_fallback {
            log::debug!(
                "L-BFGS did not converge ({}), trying Nelder-Mead from fval = {}",
                best.status,
                best.cost
            );
            match self.run_simplex(problem(), &best.z) {
                Ok(run) => {
                    iterations += run.iterations;
                    if run.status.is_converged() || run.cost < best.cost {
                        solver = "Nelder-Mead";
                        best = run;
                    }
                }
                Err(e) => log::debug!("Nelder-Mead failed: {e}"),
            }
        }

        if INVALID_NLL_PENALTY <= best.cost {
            best.status = FitStatus::Failed {
                reason: FitError::Numerical(String::from("no valid evaluation of the objective")),
            };
        }

        let invalid_evaluations: usize = counts.invalid.load(Ordering::Relaxed);
        if 0 < invalid_evaluations {
            log::warn!("{invalid_evaluations} evaluations of the objective were invalid");
        }

        return Ok(MinimizationOutcome {
            parameters: problem().external(&best.z),
            fval: best.cost,
            iterations,
            n_fev: counts.cost.load(Ordering::Relaxed),
            n_gev: counts.grad.load(Ordering::Relaxed),
            invalid_evaluations,
            status: best.status,
            solver,
        });
    }

    fn run_lbfgs(
        &self,
        problem: InternalProblem,
        z0: Vec<f64>,
    ) -> std::result::Result<SolverRun, argmin::core::Error> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.config.lbfgs_memory)
            .with_tolerance_grad(self.config.gradient_tolerance)?
            .with_tolerance_cost(self.config.cost_tolerance)?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(z0).max_iters(self.config.max_iterations))
            .run()?;

        let state = res.state();
        let z: Vec<f64> = state
            .get_best_param()
            .ok_or_else(|| argmin::core::Error::msg("no best parameters found"))?
            .clone();
        let iterations: u64 = state.get_iter();
        return Ok(SolverRun {
            z,
            cost: state.get_best_cost(),
            iterations,
            status: classify(state.get_termination_status(), iterations),
        });
    }

    fn run_simplex(
        &self,
        problem: InternalProblem,
        start: &[f64],
    ) -> std::result::Result<SolverRun, argmin::core::Error> {
        let mut vertices: Vec<Vec<f64>> = vec![start.to_vec()];
        for i in 0..start.len() {
            let mut v: Vec<f64> = start.to_vec();
            v[i] += SIMPLEX_STEP * start[i].abs().max(1.0);
            vertices.push(v);
        }

        let solver = NelderMead::new(vertices).with_sd_tolerance(self.config.cost_tolerance)?;
        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.config.max_iterations))
            .run()?;

        let state = res.state();
        let z: Vec<f64> = state
            .get_best_param()
            .ok_or_else(|| argmin::core::Error::msg("no best parameters found"))?
            .clone();
        let iterations: u64 = state.get_iter();
        return Ok(SolverRun {
            z,
            cost: state.get_best_cost(),
            iterations,
            status: classify(state.get_termination_status(), iterations),
        });
    }
}

/// Uncertainties of the parameters at a minimum.
#[derive(Debug, Clone)]
pub struct Uncertainties {
    /// `sqrt` of the diagonal of the covariance
    pub errors: Vec<f64>,
    /// [None] if the Hessian could not be inverted (the errors then come from
    /// its diagonal)
    pub covariance: Option<DMatrix<f64>>,
}

/// Numerical Hessian of `objective` at `params` with central second differences.
///
/// The steps are shrunk near the bounds of `domains` so every evaluation
/// stays inside them.
pub fn hessian(
    objective: &dyn ObjectiveFunction,
    params: &[f64],
    domains: &[ContinuousDomain],
) -> Result<DMatrix<f64>> {
    let n: usize = params.len();
    let steps: Vec<f64> = params
        .iter()
        .zip(domains)
        .map(|(&x, d)| {
            let (low, high): (f64, f64) = d.get_bounds();
            let h: f64 = HESSIAN_STEP * x.abs().max(1.0);
            let room: f64 = (x - low).min(high - x);
            if room < h {
                h.min(0.5 * room).max(f64::EPSILON * x.abs().max(1.0))
            } else {
                h
            }
        })
        .collect::<Vec<f64>>();

    let center: f64 = objective.eval(params)?;
    let mut hessian: DMatrix<f64> = DMatrix::zeros(n, n);
    let mut p: Vec<f64> = params.to_vec();

    for i in 0..n {
        let hi: f64 = steps[i];
        p[i] = params[i] + hi;
        let f_plus: f64 = objective.eval(&p)?;
        p[i] = params[i] - hi;
        let f_minus: f64 = objective.eval(&p)?;
        p[i] = params[i];
        hessian[(i, i)] = (f_plus - 2.0 * center + f_minus) / (hi * hi);

        for j in 0..i {
            let hj: f64 = steps[j];
            let mut corner = |si: f64, sj: f64| -> Result<f64> {
                p[i] = params[i] + si * hi;
                p[j] = params[j] + sj * hj;
                let v: f64 = objective.eval(&p)?;
                p[i] = params[i];
                p[j] = params[j];
                return Ok(v);
            };
            let f_pp: f64 = corner(1.0, 1.0)?;
            let f_pm: f64 = corner(1.0, -1.0)?;
            let f_mp: f64 = corner(-1.0, 1.0)?;
            let f_mm: f64 = corner(-1.0, -1.0)?;
            let h_ij: f64 = (f_pp - f_pm - f_mp + f_mm) / (4.0 * hi * hj);
            hessian[(i, j)] = h_ij;
            hessian[(j, i)] = h_ij;
        }
    }

    return Ok(hessian);
}

/// Invert Hessian to get covariance matrix via Cholesky decomposition.
///
/// Returns `None` if the Hessian is not positive definite even after damping.
pub fn invert_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n: usize = hessian.nrows();
    let identity: DMatrix<f64> = DMatrix::identity(n, n);

    // Scale damping to the Hessian diagonal
    let diag_scale: f64 = (0..n)
        .map(|i| hessian[(i, i)].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let mut h_damped: DMatrix<f64> = hessian.clone();
    let mut damping: f64 = 0.0;
    let max_attempts: usize = 10;

    for attempt in 0..max_attempts {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            if 0.0 < damping {
                log::warn!("Hessian is not positive definite, damped with {damping:e}");
            }
            return Some(chol.solve(&identity));
        }

        if attempt + 1 == max_attempts {
            break;
        }

        let next_damping: f64 = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        let add: f64 = next_damping - damping;
        for i in 0..n {
            h_damped[(i, i)] += add;
        }
        damping = next_damping;
    }

    return None;
}

/// Errors (and covariance if possible) of the parameters at the minimum `params`.
///
/// If the Hessian can not be inverted the errors are `1 / sqrt(H_ii)` and a
/// warning is logged.
pub fn uncertainties(
    objective: &dyn ObjectiveFunction,
    params: &[f64],
    domains: &[ContinuousDomain],
) -> Result<Uncertainties> {
    let h: DMatrix<f64> = hessian(objective, params, domains)?;

    if let Some(cov) = invert_hessian(&h) {
        let valid: bool = (0..cov.nrows()).all(|i| cov[(i, i)].is_finite() && 0.0 < cov[(i, i)]);
        if valid {
            let errors: Vec<f64> = (0..cov.nrows())
                .map(|i| cov[(i, i)].sqrt())
                .collect::<Vec<f64>>();
            return Ok(Uncertainties {
                errors,
                covariance: Some(cov),
            });
        }
    }

    log::warn!("Could not invert the Hessian, using its diagonal for the errors");
    let errors: Vec<f64> = (0..h.nrows())
        .map(|i| 1.0 / h[(i, i)].abs().max(1e-12).sqrt())
        .collect::<Vec<f64>>();
    return Ok(Uncertainties {
        errors,
        covariance: None,
    });
}

/// `rho_ij = C_ij / sqrt(C_ii C_jj)`
pub fn correlation(covariance: &DMatrix<f64>) -> DMatrix<f64> {
    let n: usize = covariance.nrows();
    return DMatrix::from_fn(n, n, |i, j| {
        let denom: f64 = (covariance[(i, i)] * covariance[(j, j)]).sqrt();
        if i == j {
            1.0
        } else if 0.0 < denom {
            covariance[(i, j)] / denom
        } else {
            0.0
        }
    });
}
