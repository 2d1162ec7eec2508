//! numerical_stability — log-domain primitives shared by every model.
//!
//! Purpose
//! -------
//! Collect the max-shifted reductions that turn log-weights
//! `a_i = θ·f(x_i) + log p0(x_i) [− log q(x_i)]` into normalizing constants,
//! normalized weights, expectations, and importance-sampling diagnostics
//! without overflow or underflow.
//!
//! Key behaviors
//! -------------
//! - `log_sum_exp` / `log_mean_exp`: exact and Monte Carlo log-partition
//!   reductions.
//! - `normalized_weights` and `weighted_feature_mean`: model probabilities
//!   (or self-normalized importance weights) and the resulting feature
//!   expectations.
//! - `effective_sample_size`: `(Σw)² / Σw²` computed in log space.
//! - `validate_log_values`: the single gate that rejects NaN / `+inf`
//!   log-densities before they reach a reduction.
//!
//! Invariants & assumptions
//! ------------------------
//! - Inputs to the reductions are finite or `-inf`; `-inf` denotes zero mass.
//! - No reduction ever exponentiates an unshifted log-weight.
//!
//! Conventions
//! -----------
//! - Feature matrices are (features × samples); one column per sample.
//! - This module never logs and owns no state.
//!
//! Testing notes
//! -------------
//! - Unit tests in [`log_domain`] compare against naïve formulas on safe
//!   inputs and check extreme magnitudes, zero-mass entries, and ESS limits.

pub mod log_domain;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::log_domain::{
    MASS_TOL, effective_sample_size, entropy_from_log_pmf, log_mean_exp, log_sum_exp,
    log_weights, normalized_weights, validate_log_values, weighted_feature_mean,
};

pub mod prelude {
    pub use super::log_domain::{
        effective_sample_size, log_mean_exp, log_sum_exp, normalized_weights,
    };
}
