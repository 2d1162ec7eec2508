//! Adapter that exposes a [`DualObjective`] as an `argmin` problem.
//!
//! The dual is minimized directly, so `CostFunction::cost` forwards the
//! objective value and `Gradient::gradient` forwards the analytic gradient.
//! If no gradient is implemented, the cost closure is finite-differenced.
//!
//! Every evaluation is recorded in an [`EvalTracker`] owned by the caller.
//! Argmin drops its state when a solver errors out (typically a line search
//! that cannot make progress near the optimum), and the tracker is what lets
//! the runner still report the best point seen and the evaluation counts.
//! The tracker also keeps the first objective fault and the first sign of
//! divergence, because solvers may swallow an evaluation error (a line
//! search reports its own exit reason) or, in absorbing mode, never see one.
use std::cell::{Cell, RefCell};

use crate::optimization::{
    dual_optimizer::{
        finite_diff::run_fd_diff,
        traits::DualObjective,
        types::{COST_COUNT, Cost, FnEvalMap, GRADIENT_COUNT, Grad, Theta},
        validation::validate_grad,
    },
    errors::{OptError, OptResult},
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// Evaluation log shared between the adapter and the runner.
///
/// Records the lowest cost seen together with its parameter vector, counts
/// cost and gradient evaluations, and remembers the first objective fault
/// and the first divergence signal raised by an evaluation.
#[derive(Debug, Default)]
pub struct EvalTracker {
    best: RefCell<Option<(Theta, Cost)>>,
    cost_count: Cell<u64>,
    gradient_count: Cell<u64>,
    fault: RefCell<Option<OptError>>,
    divergence: RefCell<Option<OptError>>,
}

impl EvalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cost(&self, theta: &Theta, cost: Cost) {
        self.cost_count.set(self.cost_count.get() + 1);
        let mut best = self.best.borrow_mut();
        let improved = match best.as_ref() {
            Some((_, c)) => cost < *c,
            None => true,
        };
        if improved {
            *best = Some((theta.clone(), cost));
        }
    }

    pub fn record_gradient(&self) {
        self.gradient_count.set(self.gradient_count.get() + 1);
    }

    /// Remember an evaluation error. Only the first objective fault and the
    /// first divergence are kept; solver-side errors are ignored.
    pub fn record_error(&self, err: &OptError) {
        let slot = if err.is_objective_fault() {
            &self.fault
        } else if err.is_divergence() {
            &self.divergence
        } else {
            return;
        };
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(err.clone());
        }
    }

    /// Best `(θ, cost)` pair seen so far.
    pub fn best(&self) -> Option<(Theta, Cost)> {
        self.best.borrow().clone()
    }

    /// First objective fault raised by an evaluation, if any.
    pub fn fault(&self) -> Option<OptError> {
        self.fault.borrow().clone()
    }

    /// First divergence (`Divergence` / `Unbounded`) raised by an evaluation.
    pub fn divergence(&self) -> Option<OptError> {
        self.divergence.borrow().clone()
    }

    /// Evaluation counters keyed like Argmin's own.
    pub fn counts(&self) -> FnEvalMap {
        let mut map = FnEvalMap::new();
        map.insert(COST_COUNT.to_string(), self.cost_count.get());
        map.insert(GRADIENT_COUNT.to_string(), self.gradient_count.get());
        map
    }
}

/// Bridges a [`DualObjective`] to `argmin`'s `CostFunction` and `Gradient`.
///
/// In absorbing mode a failed cost evaluation is reported to the solver as
/// `+inf` instead of an error; the error itself only lands in the tracker.
/// Derivative-free solvers use this, since they treat `+inf` as "worse than
/// anything" but cannot recover from an error.
#[derive(Debug)]
pub struct ArgMinAdapter<'a, F: DualObjective> {
    pub f: &'a F,
    pub data: &'a F::Data,
    pub tracker: &'a EvalTracker,
    absorb_errors: bool,
}

impl<'a, F: DualObjective> Clone for ArgMinAdapter<'a, F> {
    fn clone(&self) -> Self {
        Self { f: self.f, data: self.data, tracker: self.tracker, absorb_errors: self.absorb_errors }
    }
}

impl<'a, F: DualObjective> CostFunction for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate the objective at `θ`.
    ///
    /// # Errors
    /// - `NonFiniteTrialPoint` if `θ` has a non-finite entry.
    /// - Propagates any `OptError` from the objective.
    /// - `NonFiniteCost` if the value is NaN or infinite.
    ///
    /// In absorbing mode none of these are returned: the cost is `+inf`.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        match self.evaluate(theta) {
            Ok(value) => {
                self.tracker.record_cost(theta, value);
                Ok(value)
            }
            Err(err) => {
                self.tracker.record_error(&err);
                if self.absorb_errors { Ok(f64::INFINITY) } else { Err(err.into()) }
            }
        }
    }
}

impl<'a, F: DualObjective> Gradient for ArgMinAdapter<'a, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate the gradient at `θ`.
    ///
    /// Behavior:
    /// - If the objective implements `grad`, validate it and return it.
    /// - Otherwise finite-difference the cost: central differences first,
    ///   falling back to forward differences if a cost evaluation failed or
    ///   the central estimate is not finite.
    ///
    /// The FD closure must return `f64`, so errors raised inside it are
    /// captured in `closure_err` (the closure returns `NaN`) and turned back
    /// into real errors afterwards. Only an error that survives the fallback
    /// is recorded in the tracker.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        self.tracker.record_gradient();
        self.differentiate(theta).map_err(|err| {
            self.tracker.record_error(&err);
            err.into()
        })
    }
}

impl<'a, F: DualObjective> ArgMinAdapter<'a, F> {
    /// Construct a new adapter over an objective, its data, and a tracker.
    pub fn new(f: &'a F, data: &'a F::Data, tracker: &'a EvalTracker) -> Self {
        Self { f, data, tracker, absorb_errors: false }
    }

    /// Switch to absorbing mode: failed cost evaluations become `+inf`.
    pub fn absorbing(mut self) -> Self {
        self.absorb_errors = true;
        self
    }

    fn evaluate(&self, theta: &Theta) -> OptResult<Cost> {
        check_trial_point(theta)?;
        let output = self.f.value(theta, self.data)?;
        if !output.is_finite() {
            return Err(OptError::NonFiniteCost { value: output });
        }
        Ok(output)
    }

    fn differentiate(&self, theta: &Theta) -> OptResult<Grad> {
        check_trial_point(theta)?;
        let dim = theta.len();
        match self.f.grad(theta, self.data) {
            Ok(g) => {
                validate_grad(&g, dim)?;
                Ok(g)
            }
            Err(OptError::GradientNotImplemented) => {
                let closure_err: RefCell<Option<Error>> = RefCell::new(None);
                let cost_func = |theta: &Theta| -> f64 {
                    match self.evaluate(theta) {
                        Ok(val) => {
                            self.tracker.record_cost(theta, val);
                            val
                        }
                        Err(e) => {
                            let mut slot = closure_err.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e.into());
                            }
                            f64::NAN
                        }
                    }
                };
                let fd_grad = theta.central_diff(&cost_func);
                if closure_err.borrow().is_none() && validate_grad(&fd_grad, dim).is_ok() {
                    return Ok(fd_grad);
                }
                run_fd_diff(theta, &cost_func, &closure_err)
            }
            Err(e) => Err(e),
        }
    }
}

// ---- Helper Methods ----

fn check_trial_point(theta: &Theta) -> OptResult<()> {
    match theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        Some((index, &value)) => Err(OptError::NonFiniteTrialPoint { index, value }),
        None => Ok(()),
    }
}
