//! maxentropy — maximum-entropy and minimum-KL-divergence models.
//!
//! Purpose
//! -------
//! Serve as the crate root for fitting exponential-family distributions
//! that satisfy linear expectation constraints, either over an explicitly
//! enumerable sample space or, by importance sampling, over one too large
//! to enumerate.
//!
//! Key behaviors
//! -------------
//! - [`maxent`]: the models ([`Model`](maxent::Model),
//!   [`BigModel`](maxent::BigModel),
//!   [`ConditionalModel`](maxent::ConditionalModel)), the
//!   [`MaxentModel`](maxent::MaxentModel) trait with the generic fit loop,
//!   and the model-layer errors.
//! - [`optimization`]: the dual minimizer (CG, BFGS, L-BFGS, Powell,
//!   Nelder–Mead on top of `argmin`), Robbins–Monro stochastic
//!   approximation, and log-domain numerics.
//! - [`version`]: an immutable [`BuildInfo`] descriptor.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerics are carried in `ndarray` arrays of `f64`.
//! - Errors are returned as `MaxentError` / `OptError`; library code does
//!   not panic on bad input.
//!
//! Conventions
//! -----------
//! - Feature matrices are (features × points).
//! - The crate emits `tracing` events and never installs a subscriber.
//!
//! Downstream usage
//! ----------------
//! ```
//! use maxentropy::maxent::prelude::*;
//! use ndarray::array;
//!
//! // Sample space {0, 1, 2, 3}, one feature f(x) = x, target mean 2.
//! let mut model = Model::new(array![[0.0, 1.0, 2.0, 3.0]], None)?;
//! let outcome = model.fit(array![2.0], &FitOptions::with_algorithm(Algorithm::BFGS))?;
//! assert!(outcome.converged());
//! assert!((model.expectations()?[0] - 2.0).abs() < 1e-6);
//! # Ok::<(), MaxentError>(())
//! ```
//!
//! Testing notes
//! -------------
//! - Unit tests live in `#[cfg(test)]` modules next to the code.
//! - Integration tests in `tests/` exercise full fits of every model
//!   variant, including random samplers.

pub mod maxent;
pub mod optimization;
pub mod version;

pub use self::version::{BuildInfo, build_info};
