//! Log-density of arbitrary points under a fitted model.
//!
//! Shared by the exact and the sampled model: given features of new points
//! (m × n) and optionally their prior log-density, the model log-density is
//! `θ·f(x) + log p0(x) − log Z`.
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::{
    maxent::{
        core::block::FeatureBlock,
        errors::{MaxentError, MaxentResult},
    },
    optimization::numerical_stability::{log_weights, validate_log_values},
};

/// `θ·f(x) + log p0(x) − log_z` for every column of `fx`.
///
/// # Errors
/// - `DimensionMismatch` if `fx` does not have `theta.len()` rows or the
///   prior has the wrong length.
/// - `EmptySampleSpace`, `NonFiniteFeature`, `InvalidDensity` for
///   malformed inputs.
pub fn log_density(
    fx: ArrayView2<f64>, log_prior: Option<ArrayView1<f64>>, theta: ArrayView1<f64>, log_z: f64,
) -> MaxentResult<Array1<f64>> {
    if fx.nrows() != theta.len() {
        return Err(MaxentError::DimensionMismatch {
            what: "feature rows",
            expected: theta.len(),
            found: fx.nrows(),
        });
    }
    let points = FeatureBlock::exact(fx.to_owned(), log_prior.map(|lp| lp.to_owned()))?;
    let log_w = log_weights(points.features(), theta, points.log_prior(), None);
    validate_log_values(log_w.view(), "log-density")?;
    Ok(log_w - log_z)
}

/// `−(1/n) Σ log p(x_i)` over the columns of `fx`.
///
/// # Errors
/// As [`log_density`].
pub fn cross_entropy(
    fx: ArrayView2<f64>, log_prior: Option<ArrayView1<f64>>, theta: ArrayView1<f64>, log_z: f64,
) -> MaxentResult<f64> {
    let log_p = log_density(fx, log_prior, theta, log_z)?;
    Ok(-log_p.sum() / log_p.len() as f64)
}
