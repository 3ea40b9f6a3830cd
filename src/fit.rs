//! # Fitting
//!
//! Unbinned maximum likelihood fits of a [Pdf] to a [Dataset].
//!
//! The usual entry point is [fit_to]:
//!
//! ```ignore
//! let result: FitResult = fit_to()
//!     .pdf(&model)
//!     .registry(&registry)
//!     .data(&data)
//!     .extended(true)
//!     .call()?;
//! println!("{result}");
//! ```
//!
//! A fit goes through the states of [FitState]: `Unfit -> Fitting -> {Converged, Failed}`.
//! Problems in the definition of the model (unknown ranges, invalid weights,
//! data outside the observable...) are returned as errors before anything is
//! minimized. Numerical problems found while minimizing are *not* errors: the
//! fit still returns a [FitResult] with [FitStatus::Failed].
//!
//! The [FitResult] is never modified after the fit. To continue from the fitted
//! values use [FitResult::apply] and fit again.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::configuration::FitConfig;
use crate::configuration::minimizer::INVALID_NLL_PENALTY;
use crate::dataset::Dataset;
use crate::domain::ContinuousDomain;
use crate::errors::{FitError, Result};
use crate::likelihood::{Nll, NllFunction};
use crate::minimizer::{self, MinimizationOutcome, Minimizer, Uncertainties};
use crate::pdf::Pdf;
use crate::registry::{Registry, VarId, Variable};

/// Outcome of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitStatus {
    Converged,
    Failed { reason: FitError },
}

impl FitStatus {
    pub fn is_converged(&self) -> bool {
        return matches!(self, FitStatus::Converged);
    }
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            FitStatus::Converged => write!(f, "converged"),
            FitStatus::Failed { reason } => write!(f, "failed ({reason})"),
        };
    }
}

/// A fitted (floating) parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    pub name: String,
    /// The value before the fit
    pub initial: f64,
    /// The value at the minimum
    pub value: f64,
    /// Parabolic error. `0.0` if it could not be computed.
    pub error: f64,
}

/// The result of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    status: FitStatus,
    min_nll: f64,
    parameters: Vec<FitParameter>,
    /// `(name, value)` of the parameters that were not fitted
    constants: Vec<(String, f64)>,
    /// Row major, in the order of `parameters`
    covariance: Option<Vec<Vec<f64>>>,
    iterations: u64,
    nll_evaluations: usize,
    invalid_nll: usize,
    n_events: usize,
    extended: bool,
    fit_range: Option<String>,
    solver: String,
}

impl FitResult {
    pub fn status(&self) -> &FitStatus {
        return &self.status;
    }

    pub fn is_converged(&self) -> bool {
        return self.status.is_converged();
    }

    /// The value of the negative log likelihood at the minimum.
    pub fn min_nll(&self) -> f64 {
        return self.min_nll;
    }

    /// The floating parameters, in the order of their declaration.
    pub fn parameters(&self) -> &[FitParameter] {
        return &self.parameters;
    }

    pub fn constants(&self) -> &[(String, f64)] {
        return &self.constants;
    }

    pub fn parameter(&self, name: &str) -> Option<&FitParameter> {
        return self.parameters.iter().find(|p| p.name == name);
    }

    /// Fitted value of a floating parameter (or the value of a constant one).
    pub fn value(&self, name: &str) -> Option<f64> {
        if let Some(p) = self.parameter(name) {
            return Some(p.value);
        }
        return self
            .constants
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v);
    }

    pub fn error(&self, name: &str) -> Option<f64> {
        return self.parameter(name).map(|p| p.error);
    }

    /// `name -> (value, error)` for every floating parameter.
    pub fn values(&self) -> BTreeMap<String, (f64, f64)> {
        return self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), (p.value, p.error)))
            .collect::<BTreeMap<String, (f64, f64)>>();
    }

    fn index(&self, name: &str) -> Option<usize> {
        return self.parameters.iter().position(|p| p.name == name);
    }

    pub fn covariance_matrix(&self) -> Option<DMatrix<f64>> {
        let cov: &Vec<Vec<f64>> = self.covariance.as_ref()?;
        let n: usize = cov.len();
        return Some(DMatrix::from_fn(n, n, |i, j| cov[i][j]));
    }

    pub fn correlation_matrix(&self) -> Option<DMatrix<f64>> {
        return self
            .covariance_matrix()
            .map(|cov| minimizer::correlation(&cov));
    }

    pub fn covariance(&self, a: &str, b: &str) -> Option<f64> {
        let cov: &Vec<Vec<f64>> = self.covariance.as_ref()?;
        return Some(cov[self.index(a)?][self.index(b)?]);
    }

    /// Correlation coefficient of two floating parameters.
    pub fn correlation(&self, a: &str, b: &str) -> Option<f64> {
        let (i, j): (usize, usize) = (self.index(a)?, self.index(b)?);
        return self.correlation_matrix().map(|rho| rho[(i, j)]);
    }

    /// Number of iterations of the minimizer.
    pub fn iterations(&self) -> u64 {
        return self.iterations;
    }

    pub fn nll_evaluations(&self) -> usize {
        return self.nll_evaluations;
    }

    /// Number of evaluations where the nll was invalid (negative density,
    /// invalid weights, ...).
    pub fn invalid_nll(&self) -> usize {
        return self.invalid_nll;
    }

    /// Number of events inside the fit range.
    pub fn n_events(&self) -> usize {
        return self.n_events;
    }

    pub fn is_extended(&self) -> bool {
        return self.extended;
    }

    pub fn fit_range(&self) -> Option<&str> {
        return self.fit_range.as_deref();
    }

    /// Writes the fitted values into `registry`.
    pub fn apply(&self, registry: &mut Registry) -> Result<()> {
        for p in &self.parameters {
            let id: VarId = registry.find(&p.name)?;
            registry.set_value(id, p.value)?;
        }
        return Ok(());
    }

    pub fn to_json(&self) -> Result<String> {
        return Ok(serde_json::to_string_pretty(self)?);
    }

    pub fn from_json(json: &str) -> Result<FitResult> {
        return Ok(serde_json::from_str(json)?);
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(
            f,
            "  FitResult: minimized NLL value: {:.6}, status: {}",
            self.min_nll, self.status
        )?;
        writeln!(
            f,
            "  {} events{}, range: {}, {} iterations ({}), {} NLL evaluations ({} invalid)",
            self.n_events,
            if self.extended { " (extended)" } else { "" },
            self.fit_range.as_deref().unwrap_or("full"),
            self.iterations,
            self.solver,
            self.nll_evaluations,
            self.invalid_nll
        )?;
        writeln!(f)?;

        if !self.constants.is_empty() {
            writeln!(f, "    Constant Parameter    Value")?;
            writeln!(f, "  --------------------  ------------")?;
            for (name, value) in &self.constants {
                writeln!(f, "  {name:>20}  {value:>12.4e}")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "    Floating Parameter    InitialValue    FinalValue +/-  Error")?;
        writeln!(f, "  --------------------  ------------  --------------------------")?;
        for p in &self.parameters {
            writeln!(
                f,
                "  {:>20}  {:>12.4e}  {:>12.4e} +/-  {:<10.2e}",
                p.name, p.initial, p.value, p.error
            )?;
        }
        return Ok(());
    }
}

/// The states of a [Fitter].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    Unfit,
    Fitting,
    Converged,
    Failed,
}

/// A single fit of a pdf to a dataset.
///
/// Everything that can be checked before minimizing is checked in [Fitter::new].
/// [Fitter::run] can only minimize once: after reaching [FitState::Converged] or
/// [FitState::Failed] it keeps returning the same [FitResult].
#[derive(Debug)]
pub struct Fitter<'a> {
    function: NllFunction<'a>,
    names: Vec<String>,
    initial: Vec<f64>,
    initial_nll: f64,
    domains: Vec<ContinuousDomain>,
    constants: Vec<(String, f64)>,
    fit_range: Option<String>,
    config: FitConfig,
    state: FitState,
    result: Option<FitResult>,
}

impl<'a> Fitter<'a> {
    pub fn new(
        pdf: &'a Pdf,
        registry: &Registry,
        data: &Dataset,
        extended: bool,
        range: Option<&str>,
        config: FitConfig,
    ) -> Result<Fitter<'a>> {
        let nll: Nll<'a> = Nll::new(pdf, registry, data, extended, range)?
            .with_parallel_threshold(config.parallel_threshold);

        let mut free: Vec<VarId> = Vec::new();
        let mut names: Vec<String> = Vec::new();
        let mut initial: Vec<f64> = Vec::new();
        let mut domains: Vec<ContinuousDomain> = Vec::new();
        let mut constants: Vec<(String, f64)> = Vec::new();
        for id in pdf.parameters() {
            let variable: &Variable = registry.get(id)?;
            if variable.is_free() {
                free.push(id);
                names.push(variable.name().to_string());
                initial.push(variable.value());
                domains.push(*variable.domain());
            } else if !variable.is_observable() {
                constants.push((variable.name().to_string(), variable.value()));
            }
        }

        // the starting point must be valid
        let initial_nll: f64 = nll.eval(&registry.values())?;

        return Ok(Fitter {
            function: NllFunction::new(nll, registry, free),
            names,
            initial,
            initial_nll,
            domains,
            constants,
            fit_range: range.map(str::to_string),
            config,
            state: FitState::Unfit,
            result: None,
        });
    }

    pub fn state(&self) -> FitState {
        return self.state;
    }

    /// Names of the floating parameters.
    pub fn parameter_names(&self) -> &[String] {
        return &self.names;
    }

    /// Minimizes the nll and computes the uncertainties.
    ///
    /// A minimizer that does not converge, or that can not even start (for
    /// example with an invalid [FitConfig]), gives a result with
    /// [FitStatus::Failed] and leaves the fitter in [FitState::Failed]. The
    /// result is stored, so calling `run` again does not minimize again.
    pub fn run(&mut self) -> Result<FitResult> {
        if let Some(result) = &self.result {
            log::debug!("The fit already finished ({:?})", self.state);
            return Ok(result.clone());
        }

        self.state = FitState::Fitting;
        log::debug!(
            "Fitting `{}` with {} floating parameters to {} events",
            self.function.nll().pdf().name(),
            self.names.len(),
            self.function.nll().n_events()
        );

        let minimizer: Minimizer = Minimizer::new(self.config.clone());
        let (outcome, started): (MinimizationOutcome, bool) =
            match minimizer.minimize(&self.function, &self.initial, &self.domains) {
                Ok(o) => (o, true),
                Err(e) => {
                    log::warn!("The minimizer could not start: {e}");
                    let outcome: MinimizationOutcome = MinimizationOutcome {
                        parameters: self.initial.clone(),
                        fval: self.initial_nll,
                        iterations: 0,
                        n_fev: 0,
                        n_gev: 0,
                        invalid_evaluations: 0,
                        status: FitStatus::Failed { reason: e },
                        solver: "none",
                    };
                    (outcome, false)
                }
            };
        log::debug!("{outcome}");

        let mut errors: Vec<f64> = vec![0.0; self.names.len()];
        let mut covariance: Option<Vec<Vec<f64>>> = None;
        if started
            && self.config.compute_hessian
            && !self.names.is_empty()
            && outcome.fval < INVALID_NLL_PENALTY
        {
            match minimizer::uncertainties(&self.function, &outcome.parameters, &self.domains) {
                Ok(Uncertainties { errors: e, covariance: cov }) => {
                    errors = e;
                    covariance = cov.map(|c| {
                        (0..c.nrows())
                            .map(|i| (0..c.ncols()).map(|j| c[(i, j)]).collect::<Vec<f64>>())
                            .collect::<Vec<Vec<f64>>>()
                    });
                }
                Err(e) => log::warn!("Could not compute the Hessian: {e}"),
            }
        }

        let parameters: Vec<FitParameter> = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| FitParameter {
                name: name.clone(),
                initial: self.initial[i],
                value: outcome.parameters[i],
                error: errors[i],
            })
            .collect::<Vec<FitParameter>>();

        self.state = if outcome.status.is_converged() {
            FitState::Converged
        } else {
            log::warn!("The fit did not converge: {}", outcome.status);
            FitState::Failed
        };

        let result: FitResult = FitResult {
            status: outcome.status,
            min_nll: outcome.fval,
            parameters,
            constants: self.constants.clone(),
            covariance,
            iterations: outcome.iterations,
            nll_evaluations: outcome.n_fev,
            invalid_nll: outcome.invalid_evaluations,
            n_events: self.function.nll().n_events(),
            extended: self.function.nll().is_extended(),
            fit_range: self.fit_range.clone(),
            solver: outcome.solver.to_string(),
        };
        self.result = Some(result.clone());
        return Ok(result);
    }
}

/// Fits `pdf` to `data` by minimizing the (extended) negative log likelihood.
///
///  - `extended`: add the Poisson term of the expected number of events. By
///     default it is used if the pdf is extendable.
///  - `range`: normalize (and select events) over this named range of the
///     observable instead of its full support.
///  - `config`: see [FitConfig].
///
/// The registry is not modified, use [FitResult::apply] to write the fitted values.
#[bon::builder]
pub fn fit_to(
    pdf: &Pdf,
    registry: &Registry,
    data: &Dataset,
    extended: Option<bool>,
    range: Option<&str>,
    #[builder(default)] config: FitConfig,
) -> Result<FitResult> {
    let extended: bool = extended.unwrap_or_else(|| pdf.is_extendable());
    let mut fitter: Fitter = Fitter::new(pdf, registry, data, extended, range, config)?;
    return fitter.run();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::Exponential::Exponential;
    use crate::sampler;
    use assert_approx_eq::assert_approx_eq;

    fn exponential_fit() -> (Registry, FitResult) {
        let mut reg: Registry = Registry::new();
        let x: VarId = reg.observable("x", 0.0, 10.0).unwrap();
        let c: VarId = reg.parameter("c", -0.5, -5.0, 5.0).unwrap();
        let e: Pdf = Pdf::leaf(Exponential::new(&reg, "e", x, c).unwrap());
        let data: Dataset = sampler::generate()
            .pdf(&e)
            .registry(&reg)
            .n(2000)
            .seed(17)
            .call()
            .unwrap();

        reg.set_value(c, -0.2).unwrap();
        let result: FitResult = fit_to().pdf(&e).registry(&reg).data(&data).call().unwrap();
        (reg, result)
    }

    #[test]
    fn slope_is_recovered() {
        let (_, result) = exponential_fit();
        assert!(result.is_converged(), "{result}");
        let c: &FitParameter = result.parameter("c").unwrap();
        assert_eq!(c.initial, -0.2);
        assert!(0.0 < c.error && c.error < 0.1);
        assert!((c.value + 0.5).abs() < 5.0 * c.error, "{result}");
        assert!(!result.is_extended());
    }

    #[test]
    fn json_round_trip() {
        let (_, result) = exponential_fit();
        let json: String = result.to_json().unwrap();
        let back: FitResult = FitResult::from_json(&json).unwrap();
        assert_eq!(back, result);
        assert!(matches!(FitResult::from_json("{"), Err(FitError::Serialization(_))));
    }

    #[test]
    fn apply_writes_the_values() {
        let (mut reg, result) = exponential_fit();
        result.apply(&mut reg).unwrap();
        let c: VarId = reg.find("c").unwrap();
        assert_approx_eq!(reg.value(c).unwrap(), result.value("c").unwrap(), 0.0);
    }

    #[test]
    fn failed_status_round_trip() {
        let status: FitStatus = FitStatus::Failed {
            reason: FitError::MaxIterationsExceeded { iterations: 12 },
        };
        let json: String = serde_json::to_string(&status).unwrap();
        assert_eq!(serde_json::from_str::<FitStatus>(&json).unwrap(), status);
        assert_eq!(FitStatus::Converged.to_string(), "converged");
    }
}
