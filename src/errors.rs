use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong while building, sampling or fitting a model.
///
/// Construction errors ([FitError::InvalidWeight], [FitError::UnknownRange], ...)
/// are returned immediately and the model definition must be fixed by the caller.
/// Numerical problems found *while fitting* are not returned as errors, they end
/// up in [FitStatus::Failed](crate::fit::FitStatus::Failed) instead.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FitError {
    /// A mixture weight (explicit or implicit) fell outside `[0, 1]`.
    #[error("Mixture weight {value} of `{name}` is outside [0, 1]. ")]
    InvalidWeight { name: String, value: f64 },
    /// A range name was used that was never defined on the observable.
    #[error("The range `{range}` is not defined on observable `{observable}`. ")]
    UnknownRange { observable: String, range: String },
    /// The integral of a pdf is zero, infinite or NaN.
    #[error("The pdf `{name}` cannot be normalized (integral = {integral}). ")]
    UnnormalizablePdf { name: String, integral: f64 },
    /// Data, fit range and declared ranges are inconsistent.
    #[error("Range mismatch: {0}")]
    RangeMismatch(String),
    /// The minimizer hit the iteration cap.
    #[error("The minimizer did not converge after {iterations} iterations. ")]
    MaxIterationsExceeded { iterations: u64 },
    /// Two variables were declared with the same name.
    #[error("A variable named `{0}` already exists. ")]
    DuplicateName(String),
    /// A [VarId](crate::registry::VarId) or name that the registry does not know.
    #[error("Unknown variable `{0}`. ")]
    UnknownVariable(String),
    /// The variable has no finite bounds, so it cannot be used as an observable.
    #[error("The variable `{0}` is not an observable (it needs finite bounds). ")]
    NotAnObservable(String),
    /// `low < high` was violated or the range leaves the observable bounds.
    #[error("Invalid range [{low}, {high}) for `{name}`. ")]
    InvalidRange { name: String, low: f64, high: f64 },
    /// The value or bounds of a parameter are not valid.
    #[error("Invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    /// Children of a composite pdf are defined over different observables.
    #[error("The components of `{0}` are not defined over the same observable. ")]
    ObservableMismatch(String),
    /// An extended likelihood was requested for a pdf without expected event count.
    #[error("The pdf `{0}` does not define an expected number of events. ")]
    NotExtendable(String),
    /// There were not enough events to do the operation.
    #[error("The dataset does not contain any event inside the fit range. ")]
    EmptyDataset,
    /// The pdf evaluated to a negative or non finite value.
    #[error("The pdf `{name}` evaluated to {value} at x = {x}. ")]
    NegativeDensity { name: String, x: f64, value: f64 },
    /// There was an error when performing some numerical computation.
    #[error("Numerical error: {0}")]
    Numerical(String),
    /// A fit result could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, FitError>;

impl From<serde_json::Error> for FitError {
    fn from(value: serde_json::Error) -> Self {
        return FitError::Serialization(value.to_string());
    }
}
