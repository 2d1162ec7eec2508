//! dual_optimizer::types — shared numeric aliases and solver wiring.
//!
//! Purpose
//! -------
//! Centralize the numeric types and solver aliases used by the dual
//! optimizer, so the rest of the optimization code stays agnostic to
//! `ndarray` and Argmin generics.
//!
//! Key behaviors
//! -------------
//! - Canonical aliases for parameter vectors, gradients, Hessians, and
//!   scalar costs (`Theta`, `Grad`, `Hessian`, `Cost`).
//! - A standard map for function-evaluation counters (`FnEvalMap`).
//! - Pre-wired solver aliases for every supported algorithm and line search.
//!
//! Invariants & assumptions
//! ------------------------
//! - All optimizer vectors and matrices are `ndarray` containers over `f64`.
//! - `Cost` is the dual value itself; the dual is minimized directly, so no
//!   sign flips happen anywhere in the optimizer layer.
//!
//! Testing notes
//! -------------
//! - Only aliases and constants live here; they are exercised by the
//!   builder and runner tests.
use argmin::solver::{
    linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
    neldermead::NelderMead,
    quasinewton::{BFGS, LBFGS},
};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

use crate::optimization::dual_optimizer::cg::RestartedCg;

/// Parameter vector `θ` (natural / Lagrange parameters).
pub type Theta = Array1<f64>;

/// Gradient vector `∇dual(θ)`, same shape as `Theta`.
pub type Grad = Array1<f64>;

/// Dense Hessian (or inverse-Hessian) matrix, `n × n` for `n = Theta.len()`.
pub type Hessian = Array2<f64>;

/// Scalar objective value (the dual).
pub type Cost = f64;

/// Function-evaluation counters as reported by the solver.
///
/// Maps counter names (e.g., `"cost_count"`, `"gradient_count"`) to counts.
pub type FnEvalMap = HashMap<String, u64>;

/// Default history size (`m`) for L-BFGS runs.
pub const DEFAULT_LBFGS_MEM: usize = 7;

/// Largest step a More–Thuente line search may take along its direction.
pub const MAX_LINE_SEARCH_STEP: f64 = 1e8;

/// Relative size of the initial Nelder–Mead simplex edges.
pub const SIMPLEX_STEP: f64 = 0.5;

/// Counter keys shared with Argmin's own bookkeeping.
pub const COST_COUNT: &str = "cost_count";
pub const GRADIENT_COUNT: &str = "gradient_count";

/// Hager–Zhang line search specialized to this crate’s numeric types.
pub type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, Cost>;

/// More–Thuente line search specialized to this crate’s numeric types.
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;

/// Restarted PR+ nonlinear CG with Hager–Zhang line search.
pub type CgHagerZhang = RestartedCg<HagerZhangLS>;

/// Restarted PR+ nonlinear CG with More–Thuente line search.
pub type CgMoreThuente = RestartedCg<MoreThuenteLS>;

/// Dense BFGS with Hager–Zhang line search.
pub type BfgsHagerZhang = BFGS<HagerZhangLS, Cost>;

/// Dense BFGS with More–Thuente line search.
pub type BfgsMoreThuente = BFGS<MoreThuenteLS, Cost>;

/// L-BFGS solver wired to the Hager–Zhang line search.
pub type LbfgsHagerZhang = LBFGS<HagerZhangLS, Theta, Grad, Cost>;

/// L-BFGS solver wired to the More–Thuente line search.
pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Theta, Grad, Cost>;

/// Derivative-free Nelder–Mead simplex search.
pub type NelderMeadSimplex = NelderMead<Theta, Cost>;
