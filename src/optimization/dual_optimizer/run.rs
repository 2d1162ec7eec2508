//! Execution helpers that run a solver on a [`DualObjective`] and return a
//! raw, not yet validated, [`RawRun`].
//!
//! One runner exists per Argmin state shape:
//! - [`run_line_search`]: nonlinear CG and L-BFGS (`IterState<Theta, Grad, ..>`).
//! - [`run_bfgs`]: dense BFGS, which also carries an inverse Hessian.
//! - [`run_nelder_mead`]: the simplex search, which carries no gradient.
//! - [`run_powell`]: wraps the crate's own direction-set search.
//!
//! Every run, successful or not, is settled against the [`EvalTracker`]:
//! - A recorded objective fault is returned as an error, whatever the
//!   solver reported. Solvers may swallow it (a line search converts it into
//!   its own exit) or never see it (absorbing mode).
//! - A recorded divergence makes the run `Failed` at the best finite point
//!   and flags it as diverged, so the finalizer never promotes it.
//! - Other solver breakdowns (line search unable to make progress, violated
//!   conditions, non-finite trial points) fall back to the best point
//!   evaluated so far with a `Failed` status carrying the solver's message.
//!   The finalizer in [`api`](super::api) may still promote that status to
//!   converged if the gradient there is small enough.
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::optimization::{
    dual_optimizer::{
        Grad, Hessian, Theta,
        adapter::{ArgMinAdapter, EvalTracker},
        powell::powell,
        traits::{DualObjective, FitOptions, FitStatus},
        types::FnEvalMap,
    },
    errors::{OptError, OptResult},
};
use argmin::core::{
    CostFunction, Error, Executor, Gradient, IterState, KV, OptimizationResult, Solver, State,
    observers::{Observe, ObserverMode},
};
use argmin_math::ArgminL2Norm;
use ndarray::Array2;

/// Solver result before validation and gradient diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRun {
    pub theta_hat: Option<Theta>,
    pub value: f64,
    pub status: FitStatus,
    pub iterations: u64,
    pub fn_evals: FnEvalMap,
    /// The dual was found to be unbounded below during the run.
    pub diverged: bool,
}

/// Observer that counts iterations and traces progress.
///
/// The counter is shared so the runner can still read it after the
/// executor has been consumed by a failing run.
#[derive(Debug, Clone, Default)]
pub struct IterationTrace {
    iters: Arc<AtomicU64>,
}

impl IterationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iterations(&self) -> u64 {
        self.iters.load(Ordering::Relaxed)
    }
}

impl<I: State> Observe<I> for IterationTrace
where
    I::Float: std::fmt::Display,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        let iter = state.get_iter();
        self.iters.store(iter, Ordering::Relaxed);
        tracing::trace!(
            iter,
            cost = %state.get_cost(),
            best_cost = %state.get_best_cost(),
            "dual optimizer iteration"
        );
        Ok(())
    }
}

/// Run nonlinear CG or L-BFGS.
///
/// # Errors
/// - Objective faults raised during the run.
/// - Any solver error when no point was evaluated at all.
pub fn run_line_search<'a, F, S>(
    theta0: Theta, opts: &FitOptions, problem: ArgMinAdapter<'a, F>, solver: S,
    tracker: &'a EvalTracker,
) -> OptResult<RawRun>
where
    F: DualObjective,
    S: Solver<ArgMinAdapter<'a, F>, IterState<Theta, Grad, (), (), (), f64>> + Send + 'static,
{
    if opts.verbose {
        log_initial_state(&theta0, &problem);
    }
    let trace = IterationTrace::new();
    let mut optimizer = Executor::new(problem, solver)
        .configure(|state| state.param(theta0))
        .add_observer(trace.clone(), ObserverMode::Always);
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, ObserverMode::Always);
    }
    if let Some(max_iter) = opts.tols.max_iter {
        optimizer = optimizer.configure(|state| state.max_iters(max_iter as u64));
    }
    collect(optimizer.run(), tracker, &trace)
}

/// Run dense BFGS, starting from the identity as inverse Hessian.
///
/// # Errors
/// Same as [`run_line_search`].
pub fn run_bfgs<'a, F, S>(
    theta0: Theta, opts: &FitOptions, problem: ArgMinAdapter<'a, F>, solver: S,
    tracker: &'a EvalTracker,
) -> OptResult<RawRun>
where
    F: DualObjective,
    S: Solver<ArgMinAdapter<'a, F>, IterState<Theta, Grad, (), Hessian, (), f64>>
        + Send
        + 'static,
{
    if opts.verbose {
        log_initial_state(&theta0, &problem);
    }
    let n = theta0.len();
    let trace = IterationTrace::new();
    let mut optimizer = Executor::new(problem, solver)
        .configure(|state| state.param(theta0).inv_hessian(Array2::eye(n)))
        .add_observer(trace.clone(), ObserverMode::Always);
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, ObserverMode::Always);
    }
    if let Some(max_iter) = opts.tols.max_iter {
        optimizer = optimizer.configure(|state| state.max_iters(max_iter as u64));
    }
    collect(optimizer.run(), tracker, &trace)
}

/// Run the Nelder–Mead simplex search. The initial simplex is part of the
/// solver, so no starting point is configured here.
///
/// The problem is switched to absorbing mode: the simplex cannot recover
/// from an evaluation error, but ranks a `+inf` vertex last.
///
/// # Errors
/// Same as [`run_line_search`].
pub fn run_nelder_mead<'a, F, S>(
    opts: &FitOptions, problem: ArgMinAdapter<'a, F>, solver: S, tracker: &'a EvalTracker,
) -> OptResult<RawRun>
where
    F: DualObjective,
    S: Solver<ArgMinAdapter<'a, F>, IterState<Theta, (), (), (), (), f64>> + Send + 'static,
{
    let trace = IterationTrace::new();
    let mut optimizer = Executor::new(problem.absorbing(), solver)
        .add_observer(trace.clone(), ObserverMode::Always);
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        optimizer = optimizer.add_observer(observer, ObserverMode::Always);
    }
    if let Some(max_iter) = opts.tols.max_iter {
        optimizer = optimizer.configure(|state| state.max_iters(max_iter as u64));
    }
    collect(optimizer.run(), tracker, &trace)
}

/// Run Powell's direction-set search.
///
/// # Errors
/// Same as [`run_line_search`].
pub fn run_powell<F: DualObjective>(
    theta0: Theta, opts: &FitOptions, problem: &ArgMinAdapter<'_, F>, tracker: &EvalTracker,
) -> OptResult<RawRun> {
    if opts.verbose {
        log_initial_state(&theta0, problem);
    }
    let mut iterations = 0_u64;
    match powell(problem, theta0, &opts.tols, &mut iterations) {
        Ok((theta_hat, value, status)) => settle(
            RawRun {
                theta_hat: Some(theta_hat),
                value,
                status,
                iterations,
                fn_evals: tracker.counts(),
                diverged: false,
            },
            tracker,
        ),
        Err(e) => recover_opt(e, tracker, iterations),
    }
}

// ---- Helper Methods ----

fn collect<O, S, I>(
    result: Result<OptimizationResult<O, S, I>, Error>, tracker: &EvalTracker,
    trace: &IterationTrace,
) -> OptResult<RawRun>
where
    I: State<Param = Theta, Float = f64>,
{
    match result {
        Ok(result) => {
            let state = result.state();
            let run = RawRun {
                theta_hat: state.get_best_param().cloned(),
                value: state.get_best_cost(),
                status: FitStatus::from_termination(state.get_termination_status()),
                iterations: state.get_iter(),
                fn_evals: tracker.counts(),
                diverged: false,
            };
            settle(run, tracker)
        }
        Err(e) => recover(e, tracker, trace.iterations()),
    }
}

/// Reconcile a run the solver reported as finished with what the tracker saw.
fn settle(mut run: RawRun, tracker: &EvalTracker) -> OptResult<RawRun> {
    if let Some(fault) = tracker.fault() {
        return Err(fault);
    }
    if let Some(divergence) = tracker.divergence() {
        let (theta, value) = tracker.best().ok_or_else(|| divergence.clone())?;
        tracing::debug!(error = %divergence, "dual is unbounded; keeping the best finite point");
        run.theta_hat = Some(theta);
        run.value = value;
        run.status = FitStatus::Failed { reason: divergence.to_string() };
        run.diverged = true;
        return Ok(run);
    }
    let finite = run.value.is_finite()
        && run.theta_hat.as_ref().is_some_and(|t| t.iter().all(|v| v.is_finite()));
    if !finite {
        if let Some((theta, value)) = tracker.best() {
            run.theta_hat = Some(theta);
            run.value = value;
            if !run.status.is_failure() {
                run.status =
                    FitStatus::Failed { reason: "solver ended at a non-finite point".to_string() };
            }
        }
    }
    Ok(run)
}

fn recover(err: Error, tracker: &EvalTracker, iterations: u64) -> OptResult<RawRun> {
    recover_opt(OptError::from(err), tracker, iterations)
}

fn recover_opt(err: OptError, tracker: &EvalTracker, iterations: u64) -> OptResult<RawRun> {
    if let Some(fault) = tracker.fault() {
        return Err(fault);
    }
    if err.is_objective_fault() {
        return Err(err);
    }
    let (err, diverged) = match tracker.divergence() {
        Some(divergence) => (divergence, true),
        None => {
            let diverged = err.is_divergence();
            (err, diverged)
        }
    };
    let Some((theta, value)) = tracker.best() else {
        return Err(err);
    };
    tracing::debug!(error = %err, "solver stopped early; falling back to best evaluated point");
    Ok(RawRun {
        theta_hat: Some(theta),
        value,
        status: FitStatus::Failed { reason: err.to_string() },
        iterations,
        fn_evals: tracker.counts(),
        diverged,
    })
}

fn log_initial_state<F: DualObjective>(theta0: &Theta, problem: &ArgMinAdapter<'_, F>) {
    let dual0 = problem.cost(theta0).ok();
    let g0n = problem.gradient(theta0).ok().map(|g| g.l2_norm());
    tracing::info!(dual = ?dual0, grad_norm = ?g0n, dim = theta0.len(), "initial state");
}
