//! dual_optimizer::finite_diff — finite-difference gradient helpers.
//!
//! Purpose
//! -------
//! Provide finite-difference gradients around a parameter vector with error
//! capture and validation, and a gradient-correctness check that compares
//! an objective's analytic gradient against a central difference.
//!
//! Key behaviors
//! -------------
//! - [`run_fd_diff`]: forward-difference gradient with error capture and
//!   post-hoc validation; used by the adapter when an objective has no
//!   analytic gradient.
//! - [`check_gradient`]: analytic vs. central-difference comparison at one
//!   point, reported as a [`GradientCheck`].
//!
//! Conventions
//! -----------
//! - Domain errors are surfaced as [`OptError`] via `OptResult<T>`; Argmin’s
//!   [`Error`] is confined to the closure boundary.
use crate::optimization::{
    dual_optimizer::{Grad, Theta, traits::DualObjective, validation::validate_grad},
    errors::{OptError, OptResult},
};
use argmin::core::Error;
use finitediff::FiniteDiff;
use std::cell::RefCell;

/// run_fd_diff — forward-difference gradient with error capture and validation.
///
/// `func` is expected to write any evaluation error into `closure_err` and
/// return `NaN`. The cell is cleared on entry and inspected afterwards.
///
/// # Errors
/// - The error captured in `closure_err`, converted into `OptError`.
/// - `OptError::GradientDimMismatch` / `OptError::InvalidGradient` from
///   [`validate_grad`].
pub fn run_fd_diff<G: Fn(&Theta) -> f64>(
    theta: &Theta, func: &G, closure_err: &RefCell<Option<Error>>,
) -> OptResult<Grad> {
    closure_err.replace(None);
    let fd_grad = theta.forward_diff(func);
    let dim = theta.len();
    if let Some(err) = closure_err.take() {
        return Err(err.into());
    }
    validate_grad(&fd_grad, dim)?;
    Ok(fd_grad)
}

/// Result of comparing an analytic gradient with a central difference.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientCheck {
    pub analytic: Grad,
    pub numeric: Grad,
    /// `max_i |analytic_i − numeric_i|`.
    pub max_abs_error: f64,
}

impl GradientCheck {
    /// Whether every coordinate agrees within `tol`.
    pub fn passes(&self, tol: f64) -> bool {
        self.max_abs_error <= tol
    }
}

/// check_gradient — compare `f.grad` with a central finite difference of
/// `f.value` at `theta`.
///
/// # Errors
/// - Any error from `f.grad` (including `GradientNotImplemented`).
/// - The first error raised by `f.value` during differencing.
/// - Validation errors if either gradient is malformed.
pub fn check_gradient<F: DualObjective>(
    f: &F, theta: &Theta, data: &F::Data,
) -> OptResult<GradientCheck> {
    let analytic = f.grad(theta, data)?;
    validate_grad(&analytic, theta.len())?;

    let closure_err: RefCell<Option<OptError>> = RefCell::new(None);
    let value = |t: &Theta| -> f64 {
        match f.value(t, data) {
            Ok(v) => v,
            Err(e) => {
                let mut slot = closure_err.borrow_mut();
                if slot.is_none() {
                    *slot = Some(e);
                }
                f64::NAN
            }
        }
    };
    let numeric = theta.central_diff(&value);
    if let Some(err) = closure_err.take() {
        return Err(err);
    }
    validate_grad(&numeric, theta.len())?;

    let max_abs_error =
        analytic.iter().zip(numeric.iter()).fold(0.0_f64, |acc, (a, n)| acc.max((a - n).abs()));
    Ok(GradientCheck { analytic, numeric, max_abs_error })
}
