//! stochastic — Robbins–Monro stochastic approximation.
//!
//! Purpose
//! -------
//! Minimize a convex objective when only noisy gradient estimates are
//! available, e.g. the importance-sampled dual gradient with a fresh sample
//! drawn at every step. Iterates follow
//!
//! `θ_{k+1} = θ_k − a_k · g_k`,  `a_k = a0 / (k + 1)^decay`,
//!
//! optionally returning the Polyak–Ruppert average of the iterates over the
//! second half of the run instead of the last iterate.
//!
//! Invariants & assumptions
//! ------------------------
//! - `decay ∈ (0.5, 1]`, so `Σ a_k = ∞` and `Σ a_k² < ∞`.
//! - The oracle receives the current iterate and the iteration index; any
//!   error it returns aborts the run.
//! - A gradient estimate with a NaN or infinite entry is an error.
use crate::optimization::{
    dual_optimizer::{
        FitStatus, Grad, Theta,
        validation::{validate_grad, verify_tol_grad},
    },
    errors::{OptError, OptResult},
};

/// Settings for [`robbins_monro`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticOptions {
    /// Number of gradient steps.
    pub iterations: usize,
    /// Initial step size `a0`.
    pub a0: f64,
    /// Step decay exponent.
    pub decay: f64,
    /// Average the iterates over the second half of the run.
    pub averaging: bool,
    /// Stop early once a gradient estimate has norm at most this value.
    pub tol_grad: Option<f64>,
}

impl StochasticOptions {
    /// Construct validated options.
    ///
    /// # Errors
    /// - [`OptError::InvalidMaxIter`] if `iterations == 0`.
    /// - [`OptError::InvalidStepSchedule`] if `a0` is not finite and positive,
    ///   or `decay` lies outside `(0.5, 1]`.
    /// - [`OptError::InvalidTolGrad`] for a non-positive or non-finite
    ///   `tol_grad`.
    pub fn new(
        iterations: usize, a0: f64, decay: f64, averaging: bool, tol_grad: Option<f64>,
    ) -> OptResult<Self> {
        if iterations == 0 {
            return Err(OptError::InvalidMaxIter {
                max_iter: iterations,
                reason: "Stochastic approximation needs at least one iteration.",
            });
        }
        if !a0.is_finite() || a0 <= 0.0 {
            return Err(OptError::InvalidStepSchedule {
                value: a0,
                reason: "Initial step size must be finite and positive.",
            });
        }
        if !(decay > 0.5 && decay <= 1.0) {
            return Err(OptError::InvalidStepSchedule {
                value: decay,
                reason: "Step decay exponent must lie in (0.5, 1].",
            });
        }
        verify_tol_grad(tol_grad)?;
        Ok(Self { iterations, a0, decay, averaging, tol_grad })
    }

    /// Step size at iteration `k` (zero-based).
    pub fn step(&self, k: usize) -> f64 {
        self.a0 / ((k + 1) as f64).powf(self.decay)
    }
}

impl Default for StochasticOptions {
    fn default() -> Self {
        Self { iterations: 200, a0: 1.0, decay: 0.75, averaging: true, tol_grad: None }
    }
}

/// Result of a stochastic-approximation run.
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticOutcome {
    pub theta_hat: Theta,
    pub iterations: usize,
    /// Norm of the last gradient estimate.
    pub grad_norm: f64,
    pub status: FitStatus,
}

/// Run Robbins–Monro from `theta0`.
///
/// # Errors
/// - Any error returned by `oracle`.
/// - `GradientDimMismatch` / `InvalidGradient` for malformed estimates.
pub fn robbins_monro<O>(
    mut oracle: O, theta0: Theta, opts: &StochasticOptions,
) -> OptResult<StochasticOutcome>
where
    O: FnMut(&Theta, usize) -> OptResult<Grad>,
{
    let dim = theta0.len();
    let mut theta = theta0;
    let mut avg = Theta::zeros(dim);
    let mut n_avg = 0_usize;
    let burn_in = opts.iterations / 2;
    let mut grad_norm = f64::INFINITY;
    let mut status = FitStatus::MaxIterationsReached;
    let mut iterations = 0;

    for k in 0..opts.iterations {
        let g = oracle(&theta, k)?;
        validate_grad(&g, dim)?;
        grad_norm = g.dot(&g).sqrt();
        iterations = k + 1;
        if opts.tol_grad.is_some_and(|tol| grad_norm <= tol) {
            status = FitStatus::Converged;
            break;
        }
        theta.scaled_add(-opts.step(k), &g);
        if opts.averaging && k >= burn_in {
            n_avg += 1;
            avg += &((&theta - &avg) / n_avg as f64);
        }
        tracing::trace!(iter = k, grad_norm, step = opts.step(k), "stochastic approximation step");
    }

    let theta_hat = if opts.averaging && n_avg > 0 && status != FitStatus::Converged {
        avg
    } else {
        theta
    };
    Ok(StochasticOutcome { theta_hat, iterations, grad_norm, status })
}
