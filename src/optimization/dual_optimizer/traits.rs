//! Public API surface for dual minimization.
//!
//! - [`DualObjective`]: trait implemented by anything exposing a convex dual.
//! - [`Algorithm`]: closed set of supported optimization strategies.
//! - [`FitOptions`] and [`Tolerances`]: configuration for the optimizer.
//! - [`LineSearcher`]: line search used by the gradient-based strategies.
//! - [`OptimOutcome`] / [`FitStatus`]: normalized result of a run.
//!
//! Convention: the objective is minimized as-is. Gradients returned by
//! [`DualObjective::grad`] are gradients of the same function.
use crate::optimization::{
    dual_optimizer::{
        Cost, FnEvalMap, Grad, Theta,
        validation::{validate_theta_hat, validate_value, verify_tol_cost, verify_tol_grad},
    },
    errors::{OptError, OptResult},
};
use argmin::core::{TerminationReason, TerminationStatus};
use std::str::FromStr;

/// Objective interface consumed by [`minimize`](super::api::minimize).
///
/// - `type Data`: payload carried into `value`/`grad`/`check` (for the
///   max-ent models this is the bound constraint vector `K`).
///
/// Required:
/// - `value(&Theta, &Data) -> OptResult<Cost>`: evaluate the objective.
/// - `check(&Theta, &Data) -> OptResult<()>`: reject malformed `θ`/`data`
///   pairs; called once before optimization.
///
/// Optional:
/// - `grad(&Theta, &Data) -> OptResult<Grad>`: analytic gradient. If not
///   implemented, robust finite differences are used automatically.
pub trait DualObjective {
    type Data: 'static;

    // Required methods
    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<Cost>;
    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()>;

    // Optional methods
    fn grad(&self, _theta: &Theta, _data: &Self::Data) -> OptResult<Grad> {
        Err(OptError::GradientNotImplemented)
    }
}

/// Choice of line search used inside the gradient-based solvers.
///
/// Parsing is case-insensitive (`"MoreThuente"`, `"HagerZhang"`). Unknown
/// names return `OptError::InvalidLineSearch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morethuente" => Ok(LineSearcher::MoreThuente),
            "hagerzhang" => Ok(LineSearcher::HagerZhang),
            _ => Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'MoreThuente' or 'HagerZhang'.",
            }),
        }
    }
}

/// Optimization strategy used to minimize the dual.
///
/// - `CG`: Polak–Ribière nonlinear conjugate gradients. Linear memory in
///   the number of parameters; the default.
/// - `BFGS`: dense quasi-Newton; `O(n²)` memory.
/// - `LBFGSB`: limited-memory BFGS. The dual is unconstrained, so no box
///   bounds are applied.
/// - `Powell`: derivative-free direction-set search.
/// - `NelderMead`: derivative-free simplex search.
///
/// Parsing accepts the names `CG`, `BFGS`, `LBFGSB` (also `L-BFGS-B`,
/// `LBFGS`), `Powell`, and `Nelder-Mead` (also `NelderMead`), case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    CG,
    BFGS,
    LBFGSB,
    Powell,
    NelderMead,
}

impl Algorithm {
    /// Whether the strategy evaluates the gradient.
    pub fn uses_gradient(&self) -> bool {
        matches!(self, Algorithm::CG | Algorithm::BFGS | Algorithm::LBFGSB)
    }
}

impl FromStr for Algorithm {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "cg" => Ok(Algorithm::CG),
            "bfgs" => Ok(Algorithm::BFGS),
            "lbfgsb" | "lbfgs" => Ok(Algorithm::LBFGSB),
            "powell" => Ok(Algorithm::Powell),
            "neldermead" => Ok(Algorithm::NelderMead),
            _ => Err(OptError::UnsupportedAlgorithm {
                name: s.to_string(),
                reason: "Valid options are 'CG', 'BFGS', 'LBFGSB', 'Powell', or 'Nelder-Mead'.",
            }),
        }
    }
}

/// Optimizer-level configuration.
///
/// Fields:
/// - `algorithm: Algorithm` — optimization strategy.
/// - `tols: Tolerances` — numerical tolerances and iteration limits.
/// - `line_searcher: LineSearcher` — line search for CG/BFGS/L-BFGS.
/// - `lbfgs_mem: Option<usize>` — L-BFGS history (default 7).
/// - `verbose: bool` — with the `obs_slog` feature, attaches a terminal
///   observer and prints the initial state.
///
/// Default:
/// - `algorithm`: `CG`
/// - `tols`: `tol_grad = 1e-8`, `tol_cost = None`, `max_iter = 1000`
/// - `line_searcher`: `MoreThuente`
/// - `lbfgs_mem`: `None`
/// - `verbose`: `false`
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub algorithm: Algorithm,
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
}

impl FitOptions {
    /// Create a new set of optimizer options.
    ///
    /// # Errors
    /// - `OptError::InvalidLBFGSMem` if `lbfgs_mem == Some(0)`.
    pub fn new(
        algorithm: Algorithm, tols: Tolerances, line_searcher: LineSearcher, verbose: bool,
        lbfgs_mem: Option<usize>,
    ) -> OptResult<Self> {
        if let Some(m) = lbfgs_mem {
            if m == 0 {
                return Err(OptError::InvalidLBFGSMem {
                    mem: m,
                    reason: "L-BFGS memory must be greater than zero.",
                });
            }
        }
        Ok(Self { algorithm, tols, line_searcher, verbose, lbfgs_mem })
    }

    /// Default options with a different algorithm.
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self { algorithm, ..Self::default() }
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::CG,
            tols: Tolerances { tol_grad: Some(1e-8), tol_cost: None, max_iter: Some(1000) },
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
        }
    }
}

/// Numerical tolerances and iteration limits used by the optimizer.
///
/// - `tol_grad`: converged when the gradient norm falls below this value.
/// - `tol_cost`: converged when the change in cost falls below this value
///   (also the simplex / direction-set tolerance of the derivative-free
///   strategies).
/// - `max_iter`: hard cap on the number of iterations.
///
/// Any field can be `None` but **at least one** must be provided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// Construct validated tolerances.
    ///
    /// # Errors
    /// - [`OptError::NoTolerancesProvided`] if all three are `None`.
    /// - [`OptError::InvalidTolGrad`] / [`OptError::InvalidTolCost`] for
    ///   non-finite or non-positive tolerances.
    /// - [`OptError::InvalidMaxIter`] if `max_iter == 0`.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if tol_grad.is_none() && tol_cost.is_none() && max_iter.is_none() {
            return Err(OptError::NoTolerancesProvided);
        }
        verify_tol_cost(tol_cost)?;
        verify_tol_grad(tol_grad)?;
        if let Some(max_iter) = max_iter {
            if max_iter == 0 {
                return Err(OptError::InvalidMaxIter {
                    max_iter,
                    reason: "Maximum iterations must be greater than zero.",
                });
            }
        }
        Ok(Self { tol_grad, tol_cost, max_iter })
    }
}

/// How a fit ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FitStatus {
    /// A convergence criterion (gradient norm or cost change) was met.
    Converged,
    /// The iteration budget ran out before convergence.
    MaxIterationsReached,
    /// The solver broke down (line-search failure, divergence of the dual,
    /// interruption). The reason is the solver's own message.
    Failed { reason: String },
}

impl FitStatus {
    /// Map Argmin's termination status onto [`FitStatus`].
    pub fn from_termination(status: &TerminationStatus) -> Self {
        match status {
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached) => {
                FitStatus::Converged
            }
            TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
                FitStatus::MaxIterationsReached
            }
            TerminationStatus::NotTerminated => {
                FitStatus::Failed { reason: "Not terminated".to_string() }
            }
            other => FitStatus::Failed { reason: format!("{other:?}") },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FitStatus::Failed { .. })
    }
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitStatus::Converged => write!(f, "converged"),
            FitStatus::MaxIterationsReached => write!(f, "maximum iterations reached"),
            FitStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Canonical result returned by `minimize`.
///
/// - `theta_hat`: best parameter vector found.
/// - `value`: objective value at `theta_hat`.
/// - `status`: how the run ended.
/// - `iterations`: number of optimizer iterations performed.
/// - `fn_evals`: function-evaluation counters (`cost_count`,
///   `gradient_count`, ...).
/// - `grad_norm`: gradient norm at `theta_hat`, when a gradient exists.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub status: FitStatus,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

/// Largest `|θᵢ|` an outcome may report without being flagged as a
/// runaway (the dual has no finite minimizer).
pub const THETA_RUNAWAY: f64 = 1e6;

impl OptimOutcome {
    /// Build a validated [`OptimOutcome`] from raw solver results.
    ///
    /// - Any `|θ̂ᵢ| > THETA_RUNAWAY` turns the status into `Failed`: the
    ///   solver chased an unbounded dual.
    /// - A `Failed` run (solver breakdown) whose final gradient norm
    ///   satisfies `tol_grad` at a bounded `θ̂` is reported as converged;
    ///   line searches often give up once the gradient is already tiny.
    ///   `MaxIterationsReached` is never promoted. Pass `tol_grad = None`
    ///   to disable promotion.
    ///
    /// # Errors
    /// - Propagates validation errors for `theta_hat` (missing/non-finite)
    ///   and `value` (non-finite).
    pub fn new(
        theta_hat_opt: Option<Theta>, value: f64, mut status: FitStatus, iterations: u64,
        fn_evals: FnEvalMap, grad_norm: Option<f64>, tol_grad: Option<f64>,
    ) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(theta_hat_opt)?;
        validate_value(value)?;
        let peak = theta_hat.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if peak > THETA_RUNAWAY {
            if !status.is_failure() {
                status = FitStatus::Failed {
                    reason: format!(
                        "parameters ran away (max |theta| = {peak:e}); the constraints may be infeasible"
                    ),
                };
            }
        } else if status.is_failure() {
            if let (Some(norm), Some(tol)) = (grad_norm, tol_grad) {
                if norm <= tol {
                    status = FitStatus::Converged;
                }
            }
        }
        let iterations = iterations as usize;
        Ok(Self { theta_hat, value, status, iterations, fn_evals, grad_norm })
    }

    pub fn converged(&self) -> bool {
        matches!(self.status, FitStatus::Converged)
    }
}
