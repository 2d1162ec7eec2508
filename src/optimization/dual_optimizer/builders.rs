//! dual_optimizer::builders — solver construction helpers.
//!
//! Purpose
//! -------
//! Provide small, focused builders for every Argmin solver the dual
//! optimizer can dispatch to. These helpers hide Argmin’s generic wiring and
//! apply crate-level options (tolerances, L-BFGS memory, initial simplex)
//! so that [`minimize`](super::api::minimize) can request a configured
//! solver without touching Argmin-specific types.
//!
//! Key behaviors
//! -------------
//! - Restarted nonlinear conjugate gradients (Polak–Ribière+, see
//!   [`cg`](super::cg)), dense BFGS, and L-BFGS, each with either
//!   Hager–Zhang or More–Thuente line search.
//! - More–Thuente searches are capped at [`MAX_LINE_SEARCH_STEP`] so a single
//!   step along an unbounded dual stays finite.
//! - Nelder–Mead with an axis-aligned initial simplex around `θ₀`.
//! - Optional gradient and cost-change tolerances from [`FitOptions`] are
//!   applied where the solver supports them.
//!
//! Invariants & assumptions
//! ------------------------
//! - All solvers operate on [`Theta`], [`Grad`], and [`Cost`].
//! - Any invalid tolerance passed into Argmin is surfaced as an
//!   [`OptError`](crate::optimization::errors::OptError) via
//!   `From<argmin::core::Error>`.
//!
//! Conventions
//! -----------
//! - Builders never set the initial parameter vector or `max_iters`; those
//!   are applied by the runners in [`run`](super::run).
//! - Powell's method is not an Argmin solver; it lives in
//!   [`powell`](super::powell) and needs no builder.
use argmin::solver::quasinewton::{BFGS, LBFGS};

use crate::optimization::{
    dual_optimizer::{
        cg::RestartedCg,
        traits::FitOptions,
        types::{
            BfgsHagerZhang, BfgsMoreThuente, CgHagerZhang, CgMoreThuente, Cost,
            DEFAULT_LBFGS_MEM, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente,
            MAX_LINE_SEARCH_STEP, MoreThuenteLS, NelderMeadSimplex, SIMPLEX_STEP, Theta,
        },
    },
    errors::OptResult,
};

/// Default standard-deviation tolerance of the simplex when no cost
/// tolerance is configured.
pub const SIMPLEX_SD_TOL: f64 = 1e-12;

// ---- Conjugate gradients ----

/// Restarted nonlinear CG with Hager–Zhang line search.
pub fn build_cg_hager_zhang(opts: &FitOptions) -> OptResult<CgHagerZhang> {
    Ok(configure_cg(RestartedCg::new(HagerZhangLS::new()), opts))
}

/// Restarted nonlinear CG with a step-capped More–Thuente line search.
pub fn build_cg_more_thuente(opts: &FitOptions) -> OptResult<CgMoreThuente> {
    Ok(configure_cg(RestartedCg::new(more_thuente()?), opts))
}

/// Apply optional gradient and cost tolerances to a CG solver.
pub fn configure_cg<L>(mut solver: RestartedCg<L>, opts: &FitOptions) -> RestartedCg<L> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g);
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c);
    }
    solver
}

/// More–Thuente search with steps in `[√ε, MAX_LINE_SEARCH_STEP]`.
pub fn more_thuente() -> OptResult<MoreThuenteLS> {
    Ok(MoreThuenteLS::new().with_bounds(f64::EPSILON.sqrt(), MAX_LINE_SEARCH_STEP)?)
}

// ---- BFGS ----

/// Dense BFGS with Hager–Zhang line search.
pub fn build_bfgs_hager_zhang(opts: &FitOptions) -> OptResult<BfgsHagerZhang> {
    configure_bfgs(BFGS::new(HagerZhangLS::new()), opts)
}

/// Dense BFGS with More–Thuente line search.
pub fn build_bfgs_more_thuente(opts: &FitOptions) -> OptResult<BfgsMoreThuente> {
    configure_bfgs(BFGS::new(more_thuente()?), opts)
}

/// Apply optional gradient and cost tolerances to a BFGS solver.
pub fn configure_bfgs<L>(mut solver: BFGS<L, Cost>, opts: &FitOptions) -> OptResult<BFGS<L, Cost>> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

// ---- L-BFGS ----

/// L-BFGS with Hager–Zhang line search; memory from `opts.lbfgs_mem` or
/// [`DEFAULT_LBFGS_MEM`].
pub fn build_lbfgs_hager_zhang(opts: &FitOptions) -> OptResult<LbfgsHagerZhang> {
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LbfgsHagerZhang::new(HagerZhangLS::new(), mem), opts)
}

/// L-BFGS with More–Thuente line search; memory from `opts.lbfgs_mem` or
/// [`DEFAULT_LBFGS_MEM`].
pub fn build_lbfgs_more_thuente(opts: &FitOptions) -> OptResult<LbfgsMoreThuente> {
    let mem = opts.lbfgs_mem.unwrap_or(DEFAULT_LBFGS_MEM);
    configure_lbfgs(LbfgsMoreThuente::new(more_thuente()?, mem), opts)
}

/// Apply optional gradient and cost tolerances to an L-BFGS solver.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, opts: &FitOptions,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    if let Some(g) = opts.tols.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = opts.tols.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

// ---- Nelder–Mead ----

/// Initial simplex: `θ₀` plus one vertex per coordinate, displaced by
/// `SIMPLEX_STEP · max(|θ₀ᵢ|, 1)` along that axis.
pub fn initial_simplex(theta0: &Theta) -> Vec<Theta> {
    let mut vertices = Vec::with_capacity(theta0.len() + 1);
    vertices.push(theta0.clone());
    for i in 0..theta0.len() {
        let mut v = theta0.clone();
        v[i] += SIMPLEX_STEP * theta0[i].abs().max(1.0);
        vertices.push(v);
    }
    vertices
}

/// Nelder–Mead around `theta0`. The simplex tolerance is `opts.tols.tol_cost`
/// or [`SIMPLEX_SD_TOL`].
pub fn build_nelder_mead(theta0: &Theta, opts: &FitOptions) -> OptResult<NelderMeadSimplex> {
    let sd_tol = opts.tols.tol_cost.unwrap_or(SIMPLEX_SD_TOL);
    Ok(NelderMeadSimplex::new(initial_simplex(theta0)).with_sd_tolerance(sd_tol)?)
}
