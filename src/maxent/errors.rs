//! Errors for max-ent models (feature and density validation, fit state,
//! sampling diagnostics, and optimizer failures).
//!
//! [`MaxentError`] is the model-layer error. Numerical faults raised while
//! the optimizer evaluates the dual travel through
//! [`OptError`](crate::optimization::errors::OptError) and are converted back
//! here with their variant intact, so a `DegenerateSample` detected inside a
//! line search reaches the caller as `MaxentError::DegenerateSample`.
//!
//! ## Conventions
//! - **Indices are 0-based**. Feature matrices are (features × samples), so
//!   `row` is a feature index and `col` a sample index.
//! - Log-densities may be `-inf` (zero mass) but never NaN or `+inf`.
use crate::optimization::errors::OptError;

/// Result alias for model-layer operations.
pub type MaxentResult<T> = Result<T, MaxentError>;

#[derive(Debug, Clone, PartialEq)]
pub enum MaxentError {
    // ---- Shapes and inputs ----
    /// Vector or matrix dimensions disagree (e.g. `len(K) != numFeatures`).
    DimensionMismatch { what: &'static str, expected: usize, found: usize },

    /// Feature matrix has no columns.
    EmptySampleSpace,

    /// A feature value is NaN or infinite.
    NonFiniteFeature { row: usize, col: usize, value: f64 },

    /// A target expectation is NaN or infinite.
    NonFiniteConstraint { index: usize, value: f64 },

    /// A log-density or log-weight is NaN or `+inf`, or an auxiliary
    /// log-density is not finite.
    InvalidDensity { what: &'static str, index: usize, value: f64 },

    /// Context weights are negative, non-finite, or sum to zero.
    InvalidContextWeights { reason: &'static str },

    /// Requested context does not exist.
    ContextOutOfRange { index: usize, len: usize },

    // ---- Sampling ----
    /// Importance weights vanished or the effective sample size fell below
    /// the configured floor.
    DegenerateSample { ess: f64, size: usize },

    /// A sampled model has neither a sampler nor a fixed sample.
    NoSampler,

    /// Requested external sample set does not exist.
    ExternalIndexOutOfRange { index: usize, len: usize },

    // ---- Options ----
    /// Smoothing variance must be finite and > 0.
    InvalidSmoothing { value: f64 },

    /// A model option is out of range.
    InvalidOption { name: &'static str, reason: &'static str },

    // ---- Fit state ----
    /// Query requires a fitted (or explicitly parameterized) model.
    NotFitted,

    /// The dual was requested before any constraint vector was bound.
    ConstraintsNotSet,

    /// Dual fell below `min_dual`; the constraints are likely infeasible.
    Divergence { dual: f64, min_dual: f64 },

    /// Log-weights overflowed at a finite θ; the dual has no finite minimizer.
    Unbounded { value: f64 },

    // ---- Optimizer ----
    /// Any other optimizer-layer failure.
    Optimization(OptError),
}

impl std::error::Error for MaxentError {}

impl std::fmt::Display for MaxentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Shapes and inputs ----
            MaxentError::DimensionMismatch { what, expected, found } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, found {found}.")
            }
            MaxentError::EmptySampleSpace => {
                write!(f, "Feature matrix has no samples.")
            }
            MaxentError::NonFiniteFeature { row, col, value } => {
                write!(f, "Feature ({row}, {col}) is non-finite: {value}")
            }
            MaxentError::NonFiniteConstraint { index, value } => {
                write!(f, "Target expectation at index {index} is non-finite: {value}")
            }
            MaxentError::InvalidDensity { what, index, value } => {
                write!(f, "Invalid {what} at index {index}: {value}")
            }
            MaxentError::InvalidContextWeights { reason } => {
                write!(f, "Invalid context weights: {reason}")
            }
            MaxentError::ContextOutOfRange { index, len } => {
                write!(f, "Context index {index} out of range ({len} contexts).")
            }
            // ---- Sampling ----
            MaxentError::DegenerateSample { ess, size } => {
                write!(
                    f,
                    "Degenerate importance sample: effective size {ess} of {size} draws. \
                     Try a better auxiliary distribution or a larger sample."
                )
            }
            MaxentError::NoSampler => {
                write!(f, "No sampler or fixed sample has been installed.")
            }
            MaxentError::ExternalIndexOutOfRange { index, len } => {
                write!(f, "External sample index {index} out of range ({len} registered).")
            }
            // ---- Options ----
            MaxentError::InvalidSmoothing { value } => {
                write!(f, "Smoothing variance must be finite and > 0; got: {value}")
            }
            MaxentError::InvalidOption { name, reason } => {
                write!(f, "Invalid option '{name}': {reason}")
            }
            // ---- Fit state ----
            MaxentError::NotFitted => {
                write!(f, "Model hasn't been fitted yet.")
            }
            MaxentError::ConstraintsNotSet => {
                write!(f, "No target expectations have been set.")
            }
            MaxentError::Divergence { dual, min_dual } => {
                write!(
                    f,
                    "Dual {dual} fell below the threshold {min_dual}; the constraints may be infeasible."
                )
            }
            MaxentError::Unbounded { value } => {
                write!(
                    f,
                    "Log-weights overflowed ({value}); the dual is unbounded and the constraints may be infeasible."
                )
            }
            // ---- Optimizer ----
            MaxentError::Optimization(err) => {
                write!(f, "Optimization error: {err}")
            }
        }
    }
}

impl From<OptError> for MaxentError {
    fn from(err: OptError) -> Self {
        match err {
            OptError::DimensionMismatch { what, expected, found } => {
                MaxentError::DimensionMismatch { what, expected, found }
            }
            OptError::InvalidDensity { what, index, value } => {
                MaxentError::InvalidDensity { what, index, value }
            }
            OptError::DegenerateSample { ess, size } => MaxentError::DegenerateSample { ess, size },
            OptError::Divergence { dual, min_dual } => MaxentError::Divergence { dual, min_dual },
            OptError::Unbounded { value } => MaxentError::Unbounded { value },
            other => MaxentError::Optimization(other),
        }
    }
}
