//! High-level entry point for minimizing a [`DualObjective`].
//!
//! Dispatches on [`Algorithm`] and [`LineSearcher`], runs the chosen solver
//! through the matching runner, then validates the result and attaches the
//! gradient norm at `θ̂`.
use crate::optimization::{
    dual_optimizer::{
        OptimOutcome, Theta,
        adapter::{ArgMinAdapter, EvalTracker},
        builders::{
            build_bfgs_hager_zhang, build_bfgs_more_thuente, build_cg_hager_zhang,
            build_cg_more_thuente, build_lbfgs_hager_zhang, build_lbfgs_more_thuente,
            build_nelder_mead,
        },
        run::{RawRun, run_bfgs, run_line_search, run_nelder_mead, run_powell},
        traits::{Algorithm, DualObjective, FitOptions, LineSearcher},
        validation::validate_theta_input,
    },
    errors::{OptError, OptResult},
};
use argmin_math::ArgminL2Norm;

/// Minimize `f(θ; data)` starting at `theta0`.
///
/// # Behavior
/// - Rejects a non-finite `theta0` and validates the pair with `f.check`.
/// - Runs the solver selected by `opts.algorithm` (and `opts.line_searcher`
///   for the gradient-based strategies).
/// - Solver breakdowns do not error: they yield an outcome with
///   [`FitStatus::Failed`](super::FitStatus::Failed) at the best point seen.
/// - Computes `‖∇f(θ̂)‖` when `f` has an analytic gradient; a run whose
///   final gradient norm is within `tol_grad` is reported as converged.
///
/// # Errors
/// - `InvalidThetaInput` for a non-finite starting point.
/// - Any error from `f.check`.
/// - Solver construction errors (invalid tolerances).
/// - Objective faults raised during the run (see
///   [`OptError::is_objective_fault`]), even when the solver itself
///   swallowed them.
/// - `Divergence` / `Unbounded` when not a single finite point was seen.
///
/// # Example
/// ```
/// use maxentropy::optimization::dual_optimizer::{
///     minimize, Algorithm, DualObjective, FitOptions, Theta,
/// };
/// use maxentropy::optimization::errors::OptResult;
/// use ndarray::array;
///
/// struct Bowl;
/// impl DualObjective for Bowl {
///     type Data = ();
///     fn value(&self, theta: &Theta, _: &()) -> OptResult<f64> {
///         Ok(theta.dot(theta))
///     }
///     fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
///         Ok(())
///     }
///     fn grad(&self, theta: &Theta, _: &()) -> OptResult<Theta> {
///         Ok(theta * 2.0)
///     }
/// }
///
/// let opts = FitOptions::with_algorithm(Algorithm::BFGS);
/// let out = minimize(&Bowl, array![0.3, -0.7], &(), &opts)?;
/// assert!(out.converged());
/// # Ok::<(), maxentropy::optimization::errors::OptError>(())
/// ```
pub fn minimize<F: DualObjective>(
    f: &F, theta0: Theta, data: &F::Data, opts: &FitOptions,
) -> OptResult<OptimOutcome> {
    validate_theta_input(&theta0)?;
    f.check(&theta0, data)?;
    let tracker = EvalTracker::new();
    let problem = ArgMinAdapter::new(f, data, &tracker);

    let raw = match (opts.algorithm, opts.line_searcher) {
        (Algorithm::CG, LineSearcher::MoreThuente) => {
            let solver = build_cg_more_thuente(opts)?;
            run_line_search(theta0, opts, problem, solver, &tracker)
        }
        (Algorithm::CG, LineSearcher::HagerZhang) => {
            let solver = build_cg_hager_zhang(opts)?;
            run_line_search(theta0, opts, problem, solver, &tracker)
        }
        (Algorithm::BFGS, LineSearcher::MoreThuente) => {
            let solver = build_bfgs_more_thuente(opts)?;
            run_bfgs(theta0, opts, problem, solver, &tracker)
        }
        (Algorithm::BFGS, LineSearcher::HagerZhang) => {
            let solver = build_bfgs_hager_zhang(opts)?;
            run_bfgs(theta0, opts, problem, solver, &tracker)
        }
        (Algorithm::LBFGSB, LineSearcher::MoreThuente) => {
            let solver = build_lbfgs_more_thuente(opts)?;
            run_line_search(theta0, opts, problem, solver, &tracker)
        }
        (Algorithm::LBFGSB, LineSearcher::HagerZhang) => {
            let solver = build_lbfgs_hager_zhang(opts)?;
            run_line_search(theta0, opts, problem, solver, &tracker)
        }
        (Algorithm::Powell, _) => run_powell(theta0, opts, &problem, &tracker),
        (Algorithm::NelderMead, _) => {
            let solver = build_nelder_mead(&theta0, opts)?;
            run_nelder_mead(opts, problem, solver, &tracker)
        }
    }?;

    finalize(f, data, raw, opts)
}

fn finalize<F: DualObjective>(
    f: &F, data: &F::Data, raw: RawRun, opts: &FitOptions,
) -> OptResult<OptimOutcome> {
    let grad_norm = match raw.theta_hat.as_ref() {
        Some(theta) => match f.grad(theta, data) {
            Ok(g) => Some(g.l2_norm()),
            Err(OptError::GradientNotImplemented) => None,
            Err(e) if e.is_objective_fault() => return Err(e),
            Err(_) => None,
        },
        None => None,
    };
    let outcome = OptimOutcome::new(
        raw.theta_hat,
        raw.value,
        raw.status,
        raw.iterations,
        raw.fn_evals,
        grad_norm,
        if raw.diverged { None } else { opts.tols.tol_grad },
    )?;
    tracing::debug!(
        algorithm = ?opts.algorithm,
        status = %outcome.status,
        iterations = outcome.iterations,
        value = outcome.value,
        grad_norm = ?outcome.grad_norm,
        "dual minimization finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::dual_optimizer::{
        Cost, Grad,
        traits::{Algorithm, Tolerances},
    };
    use ndarray::{Array1, array};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Every algorithm / line-search combination on a smooth convex
    //   objective with a known minimizer.
    // - Input validation before any solver is built.
    // - Objective faults aborting a run under every strategy.
    // - Divergent and unbounded duals reported as failed outcomes.
    // -------------------------------------------------------------------------

    /// `f(θ) = log Σ exp(θᵢ) − θ·k` restricted to a two-point family, i.e. a
    /// tiny max-ent dual with minimizer `θ = log(k / (1 − k))`.
    struct Logistic;

    impl DualObjective for Logistic {
        type Data = f64;
        fn value(&self, theta: &Theta, k: &f64) -> OptResult<Cost> {
            let t = theta[0];
            Ok(t.max(0.0) + (1.0 + (-t.abs()).exp()).ln() - t * k)
        }
        fn check(&self, theta: &Theta, _: &f64) -> OptResult<()> {
            if theta.len() != 1 {
                return Err(OptError::DimensionMismatch {
                    what: "theta",
                    expected: 1,
                    found: theta.len(),
                });
            }
            Ok(())
        }
        fn grad(&self, theta: &Theta, k: &f64) -> OptResult<Grad> {
            let p = 1.0 / (1.0 + (-theta[0]).exp());
            Ok(Array1::from(vec![p - k]))
        }
    }

    const COMBOS: [(Algorithm, LineSearcher); 8] = [
        (Algorithm::CG, LineSearcher::MoreThuente),
        (Algorithm::CG, LineSearcher::HagerZhang),
        (Algorithm::BFGS, LineSearcher::MoreThuente),
        (Algorithm::BFGS, LineSearcher::HagerZhang),
        (Algorithm::LBFGSB, LineSearcher::MoreThuente),
        (Algorithm::LBFGSB, LineSearcher::HagerZhang),
        (Algorithm::Powell, LineSearcher::MoreThuente),
        (Algorithm::NelderMead, LineSearcher::MoreThuente),
    ];

    fn options(algorithm: Algorithm, ls: LineSearcher) -> FitOptions {
        let tols = Tolerances::new(Some(1e-7), Some(1e-14), Some(2000)).unwrap();
        FitOptions::new(algorithm, tols, ls, false, None).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // All dispatch paths reach the known minimizer of the logistic dual.
    //
    // Given
    // -----
    // - Target mean `k = 0.8`, so `θ* = ln 4`.
    //
    // Expect
    // ------
    // - `θ̂ ≈ ln 4` within 1e-4 and a non-failed status.
    fn every_algorithm_reaches_known_minimizer() {
        let k = 0.8;
        let target = 4.0_f64.ln();
        for (algorithm, ls) in COMBOS {
            let out = minimize(&Logistic, array![0.0], &k, &options(algorithm, ls))
                .unwrap_or_else(|e| panic!("{algorithm:?}/{ls:?} failed: {e}"));
            assert!(
                (out.theta_hat[0] - target).abs() < 1e-4,
                "{algorithm:?}/{ls:?}: theta_hat = {}",
                out.theta_hat[0]
            );
            assert!(!out.status.is_failure(), "{algorithm:?}/{ls:?}: {}", out.status);
        }
    }

    #[test]
    // Purpose
    // -------
    // Default options (CG with More–Thuente) converge from a start where the
    // gradient is large, i.e. the first CG direction is accepted by the
    // line search and the gradient tolerance stops the run.
    fn default_options_converge() {
        let out = minimize(&Logistic, array![-3.0], &0.95, &FitOptions::default()).unwrap();
        assert!(out.converged(), "status: {}", out.status);
        assert!((out.theta_hat[0] - 19.0_f64.ln()).abs() < 1e-6);
        assert!(out.grad_norm.unwrap() <= 1e-8);
    }

    #[test]
    fn non_finite_start_is_rejected() {
        let res = minimize(&Logistic, array![f64::NAN], &0.5, &FitOptions::default());
        assert!(matches!(res, Err(OptError::InvalidThetaInput { index: 0, .. })));
    }

    #[test]
    fn check_failure_is_propagated() {
        let res = minimize(&Logistic, array![0.0, 0.0], &0.5, &FitOptions::default());
        assert!(matches!(res, Err(OptError::DimensionMismatch { .. })));
    }

    /// Logistic dual that refuses to evaluate beyond `θ = 0.5`.
    struct Fenced;

    impl DualObjective for Fenced {
        type Data = f64;
        fn value(&self, theta: &Theta, k: &f64) -> OptResult<Cost> {
            if theta[0] > 0.5 {
                return Err(OptError::ModelFailure { text: "outside fence".to_string() });
            }
            Logistic.value(theta, k)
        }
        fn check(&self, theta: &Theta, k: &f64) -> OptResult<()> {
            Logistic.check(theta, k)
        }
        fn grad(&self, theta: &Theta, k: &f64) -> OptResult<Grad> {
            Logistic.grad(theta, k)
        }
    }

    #[test]
    // Purpose
    // -------
    // A fault raised by the objective mid-run aborts the fit instead of
    // being folded into a failed outcome, whichever strategy ran into it.
    // Line searches and the simplex never pass the fault on themselves.
    //
    // Given
    // -----
    // - A minimizer at `ln 4 > 0.5` that the solver must approach.
    //
    // Expect
    // ------
    // - `Err(ModelFailure)` for every algorithm / line-search pair.
    fn objective_fault_aborts_the_run() {
        for (algorithm, ls) in COMBOS {
            let res = minimize(&Fenced, array![0.0], &0.8, &options(algorithm, ls));
            assert!(
                matches!(res, Err(OptError::ModelFailure { .. })),
                "{algorithm:?}/{ls:?}: got {res:?}"
            );
        }
    }

    /// Linear dual `−θ` below a floor: the model-layer divergence guard
    /// trips once `θ > 2`.
    struct Sinking;

    impl DualObjective for Sinking {
        type Data = ();
        fn value(&self, theta: &Theta, _: &()) -> OptResult<Cost> {
            if theta[0] > 2.0 {
                return Err(OptError::Divergence { dual: -theta[0], min_dual: -2.0 });
            }
            Ok(-theta[0])
        }
        fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
            Ok(())
        }
        fn grad(&self, _: &Theta, _: &()) -> OptResult<Grad> {
            Ok(array![-1.0])
        }
    }

    #[test]
    // Purpose
    // -------
    // A dual that diverges is reported as a failed outcome at the best
    // finite point under every strategy, never as an error or a success.
    //
    // Given
    // -----
    // - `f(θ) = −θ`, raising `Divergence` past `θ = 2`.
    //
    // Expect
    // ------
    // - `Ok` with a `Failed` status and `θ̂ ≤ 2`.
    fn divergence_is_a_failed_outcome() {
        for (algorithm, ls) in COMBOS {
            let out = minimize(&Sinking, array![0.0], &(), &options(algorithm, ls))
                .unwrap_or_else(|e| panic!("{algorithm:?}/{ls:?} errored: {e}"));
            assert!(out.status.is_failure(), "{algorithm:?}/{ls:?}: {}", out.status);
            assert!(out.theta_hat[0] <= 2.0);
        }
    }
}
