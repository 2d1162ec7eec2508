//! dual_optimizer::cg — restarted nonlinear conjugate gradients.
//!
//! Purpose
//! -------
//! Polak–Ribière+ conjugate gradients driven by an Argmin line search, with
//! the safeguards a bare PR iteration lacks: every search direction handed
//! to the line search is a descent direction, and the run stops on its own
//! gradient and cost-change tolerances.
//!
//! Key behaviors
//! -------------
//! - The direction is reset to steepest descent when
//!   - it is not a descent direction (`dᵀg ≥ 0`),
//!   - `n` iterations have passed since the last reset (`n = dim θ`),
//!   - successive gradients lose orthogonality (Powell's test,
//!     `|g₊ᵀg| ≥ 0.1 ‖g₊‖²`).
//! - A line search that fails along a conjugate direction is retried once
//!   along steepest descent. If that fails too, the iteration terminates
//!   with a `SolverExit` carrying the line-search message, parked at the
//!   last accepted point.
//! - Terminates with `SolverConverged` when `‖g‖ ≤ tol_grad`, when the
//!   gradient vanishes exactly, or when the dual changed by at most
//!   `tol_cost` over one iteration.
//!
//! Invariants & assumptions
//! ------------------------
//! - The problem is `Clone`: a failed line search consumes it, and the
//!   retry starts from a copy taken before the attempt.
//! - The state always carries the cost and gradient of its parameter.
use argmin::{
    core::{
        CostFunction, Error, Executor, Gradient, IterState, KV, LineSearch, NLCGBetaUpdate,
        OptimizationResult, Problem, Solver, State, TerminationReason, TerminationStatus,
    },
    kv,
    solver::conjugategradient::beta::PolakRibierePlus,
};
use argmin_math::ArgminL2Norm;

use crate::optimization::{
    dual_optimizer::types::{Cost, Grad, Theta},
    errors::OptError,
};

/// Threshold of Powell's orthogonality restart test.
pub const CG_RESTART_ORTHOGONALITY: f64 = 0.1;

type CgState = IterState<Theta, Grad, (), (), (), Cost>;

/// Nonlinear CG with descent and orthogonality restarts.
#[derive(Clone)]
pub struct RestartedCg<L> {
    linesearch: L,
    tol_grad: Option<f64>,
    tol_cost: Option<f64>,
    direction: Option<Grad>,
    since_restart: u64,
}

impl<L> RestartedCg<L> {
    pub fn new(linesearch: L) -> Self {
        Self { linesearch, tol_grad: None, tol_cost: None, direction: None, since_restart: 0 }
    }

    /// Stop once `‖∇f‖ ≤ tol`.
    pub fn with_tolerance_grad(mut self, tol: f64) -> Self {
        self.tol_grad = Some(tol);
        self
    }

    /// Stop once one iteration changes the cost by at most `tol`.
    pub fn with_tolerance_cost(mut self, tol: f64) -> Self {
        self.tol_cost = Some(tol);
        self
    }

    /// Run one line search from `xk` along `direction` on a copy of the problem.
    ///
    /// On failure the problem is restored from the copy so the caller can
    /// retry along another direction.
    fn search<O>(
        &self, problem: &mut Problem<O>, xk: &Theta, grad: &Grad, cost: Cost, direction: Grad,
    ) -> Result<Theta, Error>
    where
        O: Clone,
        L: Clone + LineSearch<Grad, Cost> + Solver<O, CgState>,
    {
        let inner = problem.take_problem().ok_or_else(|| missing("problem"))?;
        let backup = inner.clone();
        let mut linesearch = self.linesearch.clone();
        linesearch.search_direction(direction);
        let run = Executor::new(inner, linesearch)
            .configure(|state| state.param(xk.clone()).gradient(grad.clone()).cost(cost))
            .ctrlc(false)
            .run();
        match run {
            Ok(OptimizationResult { problem: line_problem, state: mut line_state, .. }) => {
                problem.consume_problem(line_problem);
                line_state.take_param().ok_or_else(|| missing("line-search param"))
            }
            Err(err) => {
                problem.problem = Some(backup);
                Err(err)
            }
        }
    }
}

impl<O, L> Solver<O, CgState> for RestartedCg<L>
where
    O: CostFunction<Param = Theta, Output = Cost>
        + Gradient<Param = Theta, Gradient = Grad>
        + Clone,
    L: Clone + LineSearch<Grad, Cost> + Solver<O, CgState>,
{
    const NAME: &'static str = "Restarted nonlinear CG (PR+)";

    fn init(
        &mut self, problem: &mut Problem<O>, state: CgState,
    ) -> Result<(CgState, Option<KV>), Error> {
        let param = state.get_param().cloned().ok_or_else(|| missing("initial param"))?;
        let cost = problem.cost(&param)?;
        let grad = problem.gradient(&param)?;
        self.direction = Some(grad.mapv(|g| -g));
        self.since_restart = 0;
        Ok((state.param(param).cost(cost).gradient(grad), None))
    }

    fn next_iter(
        &mut self, problem: &mut Problem<O>, mut state: CgState,
    ) -> Result<(CgState, Option<KV>), Error> {
        let xk = state.take_param().ok_or_else(|| missing("param"))?;
        let grad = match state.take_gradient() {
            Some(g) => g,
            None => problem.gradient(&xk)?,
        };
        let cost = state.get_cost();
        let steepest = grad.mapv(|g| -g);

        let mut direction = self.direction.take().unwrap_or_else(|| steepest.clone());
        let descent = direction.dot(&grad) < 0.0;
        if !descent {
            direction = steepest.clone();
        }
        let mut searched = self.search(problem, &xk, &grad, cost, direction.clone());
        if searched.is_err() && direction != steepest {
            tracing::debug!("line search failed along the conjugate direction; retrying steepest descent");
            direction = steepest;
            searched = self.search(problem, &xk, &grad, cost, direction.clone());
        }
        let xk1 = match searched {
            Ok(xk1) => xk1,
            Err(err) => {
                let reason = format!("Line search terminated with: '{err}'");
                return Ok((
                    state
                        .param(xk)
                        .cost(cost)
                        .gradient(grad)
                        .terminate_with(TerminationReason::SolverExit(reason)),
                    None,
                ));
            }
        };

        let new_cost = problem.cost(&xk1)?;
        let new_grad = problem.gradient(&xk1)?;

        self.since_restart += 1;
        let periodic = self.since_restart >= xk1.len() as u64;
        let new_sq = new_grad.dot(&new_grad);
        let nonorthogonal = new_grad.dot(&grad).abs() >= CG_RESTART_ORTHOGONALITY * new_sq;
        let beta = if periodic || nonorthogonal {
            self.since_restart = 0;
            0.0
        } else {
            NLCGBetaUpdate::<Grad, Grad, f64>::update(
                &PolakRibierePlus::new(),
                &grad,
                &new_grad,
                &direction,
            )
        };
        self.direction = Some(&direction * beta - &new_grad);

        Ok((
            state.param(xk1).cost(new_cost).gradient(new_grad),
            Some(kv!(
                "beta" => beta;
                "descent" => descent;
                "restart" => beta == 0.0;
            )),
        ))
    }

    fn terminate(&mut self, state: &CgState) -> TerminationStatus {
        if let Some(g) = state.get_gradient() {
            let norm: f64 = g.l2_norm();
            if norm == 0.0 || self.tol_grad.is_some_and(|tol| norm <= tol) {
                return TerminationStatus::Terminated(TerminationReason::SolverConverged);
            }
        }
        if let Some(tol) = self.tol_cost {
            if state.get_iter() > 0 && (state.get_prev_cost() - state.get_cost()).abs() <= tol {
                return TerminationStatus::Terminated(TerminationReason::SolverConverged);
            }
        }
        TerminationStatus::NotTerminated
    }
}

// ---- Helper Methods ----

fn missing(what: &str) -> Error {
    OptError::PotentialBug { text: format!("restarted CG: no {what} available") }.into()
}
