//! Powell's direction-set method.
//!
//! Derivative-free minimization by successive line minimizations along a
//! set of directions, initially the coordinate axes. After each sweep the
//! net displacement becomes a candidate direction and replaces the
//! direction of largest decrease, unless Powell's test says the set would
//! lose linear independence.
//!
//! Line minimizations bracket a minimum by golden-ratio expansion and then
//! shrink the bracket by golden-section search. They never return a point
//! worse than the one they started from.
use crate::optimization::{
    dual_optimizer::{
        Cost, Theta,
        adapter::ArgMinAdapter,
        traits::{DualObjective, FitStatus, Tolerances},
    },
    errors::{OptError, OptResult},
};
use argmin::core::CostFunction;
use ndarray::Array2;

/// Relative decrease per sweep below which the search stops when no cost
/// tolerance is configured.
pub const POWELL_DEFAULT_TOL: f64 = 1e-10;

/// Iteration cap when none is configured.
pub const POWELL_DEFAULT_MAX_ITER: usize = 1000;

const GOLDEN: f64 = 1.618_033_988_749_895;
const INV_PHI: f64 = 0.618_033_988_749_895;
const MAX_BRACKET_STEPS: usize = 60;
const LINE_MAX_ITER: usize = 100;
const LINE_TOL: f64 = 1e-10;
const TINY: f64 = 1e-25;

/// Minimize `problem` from `theta0`.
///
/// `iterations` is updated after every sweep so the caller can report it
/// even when an evaluation fails midway.
///
/// # Errors
/// Any error raised by the objective.
pub fn powell<F: DualObjective>(
    problem: &ArgMinAdapter<'_, F>, theta0: Theta, tols: &Tolerances, iterations: &mut u64,
) -> OptResult<(Theta, Cost, FitStatus)> {
    let n = theta0.len();
    let tol = tols.tol_cost.unwrap_or(POWELL_DEFAULT_TOL);
    let max_iter = tols.max_iter.unwrap_or(POWELL_DEFAULT_MAX_ITER);

    let eval = |t: &Theta| -> OptResult<Cost> { problem.cost(t).map_err(OptError::from) };

    let mut directions: Array2<f64> = Array2::eye(n);
    let mut x = theta0;
    let mut fx = eval(&x)?;
    if n == 0 {
        return Ok((x, fx, FitStatus::Converged));
    }

    for iter in 0..max_iter {
        *iterations = iter as u64 + 1;
        let x_start = x.clone();
        let f_start = fx;
        let mut biggest_drop = 0.0;
        let mut biggest_idx = 0;

        for i in 0..n {
            let dir = directions.row(i).to_owned();
            let (x_new, f_new) = line_minimize(&eval, &x, &dir, fx)?;
            if fx - f_new > biggest_drop {
                biggest_drop = fx - f_new;
                biggest_idx = i;
            }
            x = x_new;
            fx = f_new;
        }

        if 2.0 * (f_start - fx) <= tol * (f_start.abs() + fx.abs()) + TINY {
            return Ok((x, fx, FitStatus::Converged));
        }

        let new_dir = &x - &x_start;
        let extrapolated = &x + &new_dir;
        let f_ext = eval(&extrapolated)?;
        if f_ext < f_start {
            let t = 2.0 * (f_start - 2.0 * fx + f_ext) * (f_start - fx - biggest_drop).powi(2)
                - biggest_drop * (f_start - f_ext).powi(2);
            if t < 0.0 {
                let (x_new, f_new) = line_minimize(&eval, &x, &new_dir, fx)?;
                x = x_new;
                fx = f_new;
                let last = directions.row(n - 1).to_owned();
                directions.row_mut(biggest_idx).assign(&last);
                directions.row_mut(n - 1).assign(&new_dir);
            }
        }
    }
    Ok((x, fx, FitStatus::MaxIterationsReached))
}

/// Minimize `α ↦ f(x + α·d)` and return the new point and value.
fn line_minimize<E>(eval: &E, x: &Theta, dir: &Theta, fx: Cost) -> OptResult<(Theta, Cost)>
where
    E: Fn(&Theta) -> OptResult<Cost>,
{
    if dir.iter().all(|&d| d == 0.0) {
        return Ok((x.clone(), fx));
    }
    let g = |alpha: f64| -> OptResult<Cost> { eval(&(x + &(dir * alpha))) };

    // Bracket: a downhill pair (a, b), then expand until the value rises.
    let (mut a, mut fa) = (0.0, fx);
    let (mut b, mut fb) = (1.0, g(1.0)?);
    if fb > fa {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut c = b + GOLDEN * (b - a);
    let mut fc = g(c)?;
    let mut steps = 0;
    while fb > fc && steps < MAX_BRACKET_STEPS {
        a = b;
        fa = fb;
        b = c;
        fb = fc;
        c = b + GOLDEN * (b - a);
        fc = g(c)?;
        steps += 1;
    }
    let mut best = if fc < fb { (c, fc) } else { (b, fb) };
    if fa < best.1 {
        best = (a, fa);
    }

    // Golden-section search on [a, c].
    let (mut lo, mut hi) = if a < c { (a, c) } else { (c, a) };
    let mut x1 = hi - INV_PHI * (hi - lo);
    let mut x2 = lo + INV_PHI * (hi - lo);
    let mut f1 = g(x1)?;
    let mut f2 = g(x2)?;
    for _ in 0..LINE_MAX_ITER {
        if (hi - lo).abs() <= LINE_TOL * (1.0 + x1.abs() + x2.abs()) {
            break;
        }
        if f1 < f2 {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - INV_PHI * (hi - lo);
            f1 = g(x1)?;
        } else {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + INV_PHI * (hi - lo);
            f2 = g(x2)?;
        }
    }
    for cand in [(x1, f1), (x2, f2)] {
        if cand.1 < best.1 {
            best = cand;
        }
    }

    if best.1 < fx {
        Ok((x + &(dir * best.0), best.1))
    } else {
        Ok((x.clone(), fx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::dual_optimizer::{Grad, adapter::EvalTracker};
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Convergence on a separable and a rotated (coupled) quadratic.
    // - Monotonicity of the line minimization.
    // -------------------------------------------------------------------------

    struct Rotated;

    impl DualObjective for Rotated {
        type Data = ();
        fn value(&self, t: &Theta, _: &()) -> OptResult<Cost> {
            let (x, y) = (t[0] - 1.0, t[1] + 0.5);
            Ok(x * x + y * y + 1.5 * x * y)
        }
        fn check(&self, _: &Theta, _: &()) -> OptResult<()> {
            Ok(())
        }
        fn grad(&self, _: &Theta, _: &()) -> OptResult<Grad> {
            Err(OptError::GradientNotImplemented)
        }
    }

    #[test]
    // Purpose
    // -------
    // Powell's method finds the minimum of a coupled quadratic, which
    // coordinate search alone approaches only slowly.
    //
    // Given
    // -----
    // - `f(x, y) = u² + v² + 1.5uv` with `u = x − 1`, `v = y + 0.5`.
    //
    // Expect
    // ------
    // - Converged status and `θ̂ ≈ (1, −0.5)`.
    fn powell_minimizes_coupled_quadratic() {
        // Arrange
        let tracker = EvalTracker::new();
        let problem = ArgMinAdapter::new(&Rotated, &(), &tracker);
        let tols = Tolerances::new(None, Some(1e-14), Some(200)).unwrap();
        let mut iters = 0;

        // Act
        let (theta, value, status) = powell(&problem, array![3.0, 3.0], &tols, &mut iters).unwrap();

        // Assert
        assert_eq!(status, FitStatus::Converged);
        assert!((theta[0] - 1.0).abs() < 1e-5, "theta = {theta}");
        assert!((theta[1] + 0.5).abs() < 1e-5, "theta = {theta}");
        assert!(value.abs() < 1e-9);
        assert!(iters >= 1);
    }

    #[test]
    fn line_minimize_never_increases_value() {
        let eval = |t: &Theta| -> OptResult<Cost> { Ok((t[0] - 2.0).powi(2)) };
        let x = array![0.0];
        let (x_new, f_new) = line_minimize(&eval, &x, &array![-1.0], 4.0).unwrap();
        assert!(f_new <= 4.0);
        assert!((x_new[0] - 2.0).abs() < 1e-6);
    }
}
