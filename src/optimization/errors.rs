//! Optimizer-layer error surface.
//!
//! [`OptError`] normalizes configuration mistakes, derivative validation
//! failures, backend (`argmin`) errors, and numerical faults raised by the
//! objective itself into one enum. Objective faults mirror the model-layer
//! variants of [`MaxentError`] so that they survive the round trip through
//! the solver and reach the caller unchanged.
use argmin::core::{ArgminError, Error};

use crate::maxent::errors::MaxentError;

/// Crate-wide result alias for optimizer operations.
pub type OptResult<T> = Result<T, OptError>;

#[derive(Debug, Clone, PartialEq)]
pub enum OptError {
    // ---- Gradient ----
    /// Implies that FD should be used
    GradientNotImplemented,

    /// Gradient dimensions do not match parameter dimensions.
    GradientDimMismatch {
        expected: usize,
        found: usize,
    },

    /// Gradient elements need to be finite
    InvalidGradient {
        index: usize,
        value: f64,
        reason: &'static str,
    },

    // ---- FitOptions ----
    /// Gradient tolerance needs to be positive and finite.
    InvalidTolGrad {
        tol: f64,
        reason: &'static str,
    },
    /// Cost change tolerance needs to be positive and finite.
    InvalidTolCost {
        tol: f64,
        reason: &'static str,
    },
    /// Maximum iterations needs to be positive.
    InvalidMaxIter {
        max_iter: usize,
        reason: &'static str,
    },
    /// At least one tolerance must be provided.
    NoTolerancesProvided,

    /// Invalid line searcher name.
    InvalidLineSearch {
        name: String,
        reason: &'static str,
    },

    /// Algorithm name outside the supported set.
    UnsupportedAlgorithm {
        name: String,
        reason: &'static str,
    },

    /// lbfgs_mem needs to be at least 1.
    InvalidLBFGSMem {
        mem: usize,
        reason: &'static str,
    },

    /// Stochastic-approximation settings out of range.
    InvalidStepSchedule {
        value: f64,
        reason: &'static str,
    },

    // ---- Cost function ----
    /// Cost function returned a non-finite value.
    NonFiniteCost {
        value: f64,
    },

    /// Initial parameter vector contains a non-finite entry.
    InvalidThetaInput {
        index: usize,
        value: f64,
    },

    /// A solver proposed a trial point with a non-finite entry.
    NonFiniteTrialPoint {
        index: usize,
        value: f64,
    },

    // ---- Optimizer outcome ----
    /// Estimated parameters must be finite.
    InvalidThetaHat {
        index: usize,
        value: f64,
        reason: &'static str,
    },

    /// Theta hat is missing
    MissingThetaHat,

    // ---- Objective faults (mirrored from the model layer) ----
    /// Vector or matrix dimensions disagree.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A log-density or importance weight is NaN or +inf.
    InvalidDensity {
        what: &'static str,
        index: usize,
        value: f64,
    },
    /// Importance weights vanished or the effective sample size collapsed.
    DegenerateSample {
        ess: f64,
        size: usize,
    },
    /// Dual fell below the configured floor; constraints are likely infeasible.
    Divergence {
        dual: f64,
        min_dual: f64,
    },
    /// Log-weights overflowed at a finite θ; the dual is unbounded below
    /// along the current direction.
    Unbounded {
        value: f64,
    },
    /// Any other model-layer failure, carried as text.
    ModelFailure {
        text: String,
    },

    // ---- Argmin ---
    /// Wrapper for argmin::InvalidParameter
    InvalidParameter {
        text: String,
    },
    /// Wrapper for argmin::NotImplemented
    NotImplemented {
        text: String,
    },
    /// Wrapper for argmin::NotInitialized
    NotInitialized {
        text: String,
    },
    /// Wrapper for argmin::ConditionViolated
    ConditionViolated {
        text: String,
    },
    /// Wrapper for argmin::CheckpointNotFound
    CheckPointNotFound {
        text: String,
    },
    /// Wrapper for argmin::PotentialBug
    PotentialBug {
        text: String,
    },
    /// Wrapper for argmin::ImpossibleError
    ImpossibleError {
        text: String,
    },
    /// Wrapper for other argmin::Error types
    BackendError {
        text: String,
    },

    // ---- Fallback ----
    UnknownError,
}

impl OptError {
    /// Whether the error describes a fault of the objective itself rather
    /// than a breakdown of the solver.
    ///
    /// Objective faults abort a fit. Solver breakdowns (line-search failure,
    /// violated solver conditions, divergence of the dual) are reported as a
    /// failed fit outcome with diagnostics instead.
    pub fn is_objective_fault(&self) -> bool {
        matches!(
            self,
            OptError::GradientDimMismatch { .. }
                | OptError::InvalidGradient { .. }
                | OptError::NonFiniteCost { .. }
                | OptError::InvalidThetaInput { .. }
                | OptError::DimensionMismatch { .. }
                | OptError::InvalidDensity { .. }
                | OptError::DegenerateSample { .. }
                | OptError::ModelFailure { .. }
        )
    }

    /// Whether the error signals that the dual has no finite minimizer
    /// (infeasible moment constraints).
    pub fn is_divergence(&self) -> bool {
        matches!(self, OptError::Divergence { .. } | OptError::Unbounded { .. })
    }
}

impl std::error::Error for OptError {}

impl std::fmt::Display for OptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Gradient ----
            OptError::GradientNotImplemented => {
                write!(f, "Gradient optimization not implemented")
            }
            OptError::GradientDimMismatch { expected, found } => {
                write!(f, "Gradient dimension mismatch: expected {expected}, found {found}")
            }
            OptError::InvalidGradient { index, value, reason } => {
                write!(f, "Invalid gradient at index {index}: {value}: {reason}")
            }

            // ---- FitOptions ----
            OptError::InvalidTolGrad { tol, reason } => {
                write!(f, "Invalid gradient tolerance {tol}: {reason}")
            }
            OptError::InvalidTolCost { tol, reason } => {
                write!(f, "Invalid cost function change tolerance {tol}: {reason}")
            }
            OptError::InvalidMaxIter { max_iter, reason } => {
                write!(f, "Invalid maximum iterations {max_iter}: {reason}")
            }
            OptError::NoTolerancesProvided => {
                write!(f, "No tolerances provided")
            }
            OptError::InvalidLineSearch { name, reason } => {
                write!(f, "Invalid line searcher '{name}': {reason}")
            }
            OptError::UnsupportedAlgorithm { name, reason } => {
                write!(f, "Unsupported algorithm '{name}': {reason}")
            }
            OptError::InvalidLBFGSMem { mem, reason } => {
                write!(f, "Invalid L-BFGS memory {mem}: {reason}")
            }
            OptError::InvalidStepSchedule { value, reason } => {
                write!(f, "Invalid step schedule value {value}: {reason}")
            }

            // ---- Cost function ----
            OptError::NonFiniteCost { value } => {
                write!(f, "Non-finite cost value: {value}")
            }
            OptError::InvalidThetaInput { index, value } => {
                write!(f, "Invalid theta input at index {index}: {value}, must be finite")
            }
            OptError::NonFiniteTrialPoint { index, value } => {
                write!(f, "Solver proposed a non-finite trial point: entry {index} is {value}")
            }

            // ---- Optimizer outcome ----
            OptError::InvalidThetaHat { index, value, reason } => {
                write!(f, "Invalid estimated parameter at index {index}: {value}: {reason}")
            }
            OptError::MissingThetaHat => {
                write!(f, "Missing estimated parameters (theta hat)")
            }

            // ---- Objective faults ----
            OptError::DimensionMismatch { what, expected, found } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, found {found}")
            }
            OptError::InvalidDensity { what, index, value } => {
                write!(f, "Invalid {what} at index {index}: {value}, must be finite or -inf")
            }
            OptError::DegenerateSample { ess, size } => {
                write!(f, "Degenerate importance sample: effective size {ess} of {size} draws")
            }
            OptError::Divergence { dual, min_dual } => {
                write!(
                    f,
                    "Dual {dual} fell below the threshold {min_dual}; the constraints may be infeasible"
                )
            }
            OptError::Unbounded { value } => {
                write!(
                    f,
                    "Log-weights overflowed ({value}); the dual is unbounded and the constraints may be infeasible"
                )
            }
            OptError::ModelFailure { text } => {
                write!(f, "Model failure: {text}")
            }

            // ---- Argmin ----
            OptError::InvalidParameter { text } => {
                write!(f, "Invalid parameter: {text}")
            }
            OptError::NotImplemented { text } => {
                write!(f, "Not implemented: {text}")
            }
            OptError::NotInitialized { text } => {
                write!(f, "Not initialized: {text}")
            }
            OptError::ConditionViolated { text } => {
                write!(f, "Condition violated: {text}")
            }
            OptError::CheckPointNotFound { text } => {
                write!(f, "Checkpoint not found: {text}")
            }
            OptError::PotentialBug { text } => {
                write!(f, "Potential bug: {text}")
            }
            OptError::ImpossibleError { text } => {
                write!(f, "Impossible error: {text}")
            }
            OptError::BackendError { text } => {
                write!(f, "Backend error: {text}")
            }

            // ---- Fallback ----
            OptError::UnknownError => {
                write!(f, "Unknown error")
            }
        }
    }
}

impl From<Error> for OptError {
    fn from(original_err: Error) -> Self {
        let original_err = match original_err.downcast::<OptError>() {
            Ok(opt_err) => return opt_err,
            Err(err) => err,
        };
        match original_err.downcast() {
            Ok(opt_err) => match opt_err {
                ArgminError::InvalidParameter { text } => OptError::InvalidParameter { text },
                ArgminError::NotImplemented { text } => OptError::NotImplemented { text },
                ArgminError::NotInitialized { text } => OptError::NotInitialized { text },
                ArgminError::ConditionViolated { text } => OptError::ConditionViolated { text },
                ArgminError::CheckpointNotFound { text } => OptError::CheckPointNotFound { text },
                ArgminError::PotentialBug { text } => OptError::PotentialBug { text },
                ArgminError::ImpossibleError { text } => OptError::ImpossibleError { text },
                _ => OptError::UnknownError,
            },
            Err(err) => OptError::BackendError { text: err.to_string() },
        }
    }
}

impl From<MaxentError> for OptError {
    fn from(err: MaxentError) -> Self {
        match err {
            MaxentError::DimensionMismatch { what, expected, found } => {
                OptError::DimensionMismatch { what, expected, found }
            }
            MaxentError::InvalidDensity { what, index, value } => {
                OptError::InvalidDensity { what, index, value }
            }
            MaxentError::DegenerateSample { ess, size } => OptError::DegenerateSample { ess, size },
            MaxentError::Divergence { dual, min_dual } => OptError::Divergence { dual, min_dual },
            MaxentError::Unbounded { value } => OptError::Unbounded { value },
            MaxentError::Optimization(inner) => inner,
            other => OptError::ModelFailure { text: other.to_string() },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Recovery of crate errors that were boxed into `argmin::core::Error`.
    // - Mapping of argmin's own error kinds.
    // - Classification of objective faults versus solver breakdowns.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // An `OptError` that travelled through argmin as a boxed error must come
    // back as the same variant, not as a stringified backend error.
    fn boxed_opt_error_round_trips_through_argmin_error() {
        // Arrange
        let original = OptError::DegenerateSample { ess: 0.0, size: 10 };
        let boxed: Error = original.clone().into();

        // Act
        let recovered = OptError::from(boxed);

        // Assert
        assert_eq!(recovered, original);
    }

    #[test]
    // Purpose
    // -------
    // Argmin's `ConditionViolated` (raised e.g. by line searches) maps onto
    // the matching wrapper and is not treated as an objective fault.
    fn argmin_condition_violated_is_a_solver_breakdown() {
        // Arrange
        let boxed: Error =
            ArgminError::ConditionViolated { text: "not a descent direction".to_string() }.into();

        // Act
        let err = OptError::from(boxed);

        // Assert
        assert!(matches!(err, OptError::ConditionViolated { .. }));
        assert!(!err.is_objective_fault());
    }

    #[test]
    // Purpose
    // -------
    // Numerical faults from the model layer keep their variant when lifted
    // into the optimizer layer.
    fn model_faults_are_mirrored() {
        let err = OptError::from(MaxentError::InvalidDensity {
            what: "prior log-density",
            index: 3,
            value: f64::NAN,
        });
        assert!(matches!(err, OptError::InvalidDensity { index: 3, .. }));
        assert!(err.is_objective_fault());

        let err = OptError::from(MaxentError::Divergence { dual: -1e9, min_dual: -100.0 });
        assert!(matches!(err, OptError::Divergence { .. }));
        assert!(!err.is_objective_fault());
        assert!(err.is_divergence());
    }

    #[test]
    // Purpose
    // -------
    // Overflow of the log-weights and non-finite trial points are solver-side
    // conditions, not faults of the objective.
    fn overflow_and_trial_points_are_not_objective_faults() {
        let overflow = OptError::from(MaxentError::Unbounded { value: f64::INFINITY });
        assert!(matches!(overflow, OptError::Unbounded { .. }));
        assert!(overflow.is_divergence());
        assert!(!overflow.is_objective_fault());

        let trial = OptError::NonFiniteTrialPoint { index: 0, value: f64::NAN };
        assert!(!trial.is_divergence());
        assert!(!trial.is_objective_fault());
    }
}
