//! optimization — dual minimization, log-domain numerics, and the
//! optimizer error surface.
//!
//! Purpose
//! -------
//! Provide the optimization layer the max-ent models fit on: an
//! Argmin-backed minimizer for convex duals, a stochastic-approximation
//! driver for noisy gradients, numerically stable log-domain reductions, and
//! a single error/result surface.
//!
//! Key behaviors
//! -------------
//! - [`dual_optimizer`]: minimize a [`DualObjective`](dual_optimizer::DualObjective)
//!   with CG, BFGS, L-BFGS, Powell, or Nelder–Mead, with finite-difference
//!   fallbacks and normalized outcomes.
//! - [`stochastic`]: Robbins–Monro iterations with Polyak–Ruppert averaging.
//! - [`numerical_stability`]: max-shifted log-sum-exp, importance weights,
//!   effective sample size.
//! - [`errors`]: [`OptError`](errors::OptError) / `OptResult<T>`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Optimizers operate in an unconstrained parameter space `θ` and assume
//!   finite inputs once validation has passed; invalid states are reported
//!   as `OptError`, not panics.
//! - Numerical faults raised by an objective keep their identity through
//!   the solver so the model layer can report them precisely.
//!
//! Conventions
//! -----------
//! - Parameters, gradients, and Hessians are `ndarray` aliases (`Theta`,
//!   `Grad`, `Hessian`).
//! - Progress and outcomes are reported through `tracing` events; nothing
//!   here prints.
//!
//! Downstream usage
//! ----------------
//! - The model layer implements `DualObjective` for its dual adapter and
//!   calls `minimize`; the sampled model drives `robbins_monro` with a fresh
//!   sample per step.
//! - Front-ends typically import `optimization::prelude::*`.
//!
//! Testing notes
//! -------------
//! - Unit tests in the submodules cover solver wiring, failure recovery,
//!   Powell's method, step schedules, log-domain reductions, and error
//!   conversions.

pub mod dual_optimizer;
pub mod errors;
pub mod numerical_stability;
pub mod stochastic;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use maxentropy::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::dual_optimizer::prelude::*;
    pub use super::errors::{OptError, OptResult};
    pub use super::numerical_stability::prelude::*;
    pub use super::stochastic::{StochasticOptions, StochasticOutcome, robbins_monro};
}
