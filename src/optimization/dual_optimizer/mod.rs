//! dual_optimizer — argmin-powered minimization of convex duals.
//!
//! Purpose
//! -------
//! Provide a high-level, Argmin-backed layer for **minimizing** a smooth
//! objective, in practice the entropy dual `L(θ)` of a max-ent model.
//! Callers implement a single trait, [`DualObjective`], and invoke
//! [`minimize`] with a [`FitOptions`] naming the algorithm, tolerances, and
//! line search.
//!
//! Key behaviors
//! -------------
//! - Expose Argmin solvers through [`adapter::ArgMinAdapter`], which forwards
//!   values and gradients and falls back to finite differences when no
//!   analytic gradient exists.
//! - Dispatch over a closed set of strategies ([`Algorithm`]): restarted
//!   nonlinear CG ([`cg`]), BFGS, L-BFGS, Powell's direction-set search,
//!   and Nelder–Mead.
//! - Normalize every run into an [`OptimOutcome`] with a [`FitStatus`]:
//!   solver breakdowns and divergence become `Failed` outcomes at the best
//!   finite point seen, objective faults become errors even when the
//!   solver itself swallowed them.
//! - Provide [`finite_diff::check_gradient`] to compare an analytic gradient
//!   against central differences.
//!
//! Invariants & assumptions
//! ------------------------
//! - The objective is minimized as-is; no sign conventions are applied.
//! - [`DualObjective::value`] and [`DualObjective::grad`] report invalid
//!   inputs as recoverable [`OptError`](crate::optimization::errors::OptError)
//!   values, never panics.
//! - Configuration types ([`Tolerances`], [`FitOptions`]) are validated on
//!   construction.
//!
//! Conventions
//! -----------
//! - Parameters are unconstrained [`Theta`] vectors (`Array1<f64>`).
//! - Errors bubble up as `OptResult<T>`; Argmin's error type never crosses
//!   the module boundary.
//!
//! Downstream usage
//! ----------------
//! - The max-ent models wrap themselves in a [`DualObjective`] whose data
//!   payload is the target expectation vector `K`, then call [`minimize`].
//!
//! Testing notes
//! -------------
//! - Unit tests in submodules cover gradient forwarding and tracking
//!   ([`adapter`]), the restarted CG ([`cg`]), solver construction
//!   ([`builders`]), runners and failure
//!   recovery ([`run`]), Powell's method ([`powell`]), finite differences
//!   ([`finite_diff`]), and configuration invariants ([`traits`]).
//! - [`api`] tests run every algorithm on a logistic dual with a known
//!   minimizer.

pub mod adapter;
pub mod api;
pub mod builders;
pub mod cg;
pub mod finite_diff;
pub mod powell;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::minimize;
pub use self::finite_diff::{GradientCheck, check_gradient};
pub use self::traits::{
    Algorithm, DualObjective, FitOptions, FitStatus, LineSearcher, OptimOutcome, Tolerances,
};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Hessian, Theta};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::api::minimize;
    pub use super::traits::{
        Algorithm, DualObjective, FitOptions, FitStatus, LineSearcher, OptimOutcome, Tolerances,
    };
    pub use super::types::{Cost, Grad, Theta};
}
