//! Log-domain reductions for exponential-family weights.
//!
//! Every quantity the dual needs is a reduction over `exp(a_i)` for
//! log-weights `a_i = θ·f(x_i) + log p0(x_i) [− log q(x_i)]`. Those values
//! routinely leave the representable range of `f64`, so the helpers here
//! always shift by the maximum before exponentiating:
//!
//! `log Σ exp(a_i) = m + log Σ exp(a_i − m)`,  `m = max_i a_i`.
//!
//! `-inf` entries denote zero mass and are allowed. NaN and `+inf` are
//! rejected by [`validate_log_values`] before any reduction runs, so the
//! reductions themselves assume `a_i ∈ ℝ ∪ {−∞}`.
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};

use crate::maxent::errors::{MaxentError, MaxentResult};

/// Relative tolerance used when comparing normalized masses to one.
pub const MASS_TOL: f64 = 1e-10;

/// Max-shifted `log Σ exp(a_i)`.
///
/// Returns `-inf` for an empty input or when every entry is `-inf`.
pub fn log_sum_exp(a: ArrayView1<f64>) -> f64 {
    let m = a.fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
    if !m.is_finite() {
        return m;
    }
    let s = a.fold(0.0, |acc, &x| acc + (x - m).exp());
    m + s.ln()
}

/// Max-shifted `log( (1/n) Σ exp(a_i) )`.
///
/// This is the log of the importance-sampling estimate `Ẑ = mean(w_i)`.
pub fn log_mean_exp(a: ArrayView1<f64>) -> f64 {
    if a.is_empty() {
        return f64::NEG_INFINITY;
    }
    log_sum_exp(a) - (a.len() as f64).ln()
}

/// Normalized weights `exp(a_i − lse)` given `lse = log_sum_exp(a)`.
///
/// The result sums to one whenever `lse` is finite.
pub fn normalized_weights(a: ArrayView1<f64>, lse: f64) -> Array1<f64> {
    a.mapv(|x| (x - lse).exp())
}

/// Effective sample size `(Σ w_i)² / Σ w_i²` computed from log-weights.
///
/// In log space this is `exp(2·lse(a) − lse(2a))`. Returns `0.0` when all
/// weights vanish.
pub fn effective_sample_size(a: ArrayView1<f64>) -> f64 {
    let lse = log_sum_exp(a);
    if !lse.is_finite() {
        return 0.0;
    }
    let doubled = a.mapv(|x| 2.0 * x);
    (2.0 * lse - log_sum_exp(doubled.view())).exp()
}

/// Feature-weighted mean `F w` for a (features × samples) matrix.
///
/// `weights` must already be normalized. Zero weights contribute nothing,
/// even where a feature value is large.
pub fn weighted_feature_mean(features: ArrayView2<f64>, weights: ArrayView1<f64>) -> Array1<f64> {
    features.dot(&weights)
}

/// Log-weights `Fᵀθ + log p0 − log q` for every column of `features`.
///
/// `log_prior` and `log_aux` are optional per-column offsets.
pub fn log_weights(
    features: ArrayView2<f64>, theta: ArrayView1<f64>, log_prior: Option<ArrayView1<f64>>,
    log_aux: Option<ArrayView1<f64>>,
) -> Array1<f64> {
    let mut a = features.t().dot(&theta);
    if let Some(lp) = log_prior {
        a += &lp;
    }
    if let Some(lq) = log_aux {
        Zip::from(&mut a).and(&lq).for_each(|ai, &q| *ai -= q);
    }
    a
}

/// Reject log-values that are NaN or `+inf`.
///
/// `-inf` (zero probability) is accepted.
///
/// # Errors
/// - [`MaxentError::InvalidDensity`] with the first offending index.
pub fn validate_log_values(a: ArrayView1<f64>, what: &'static str) -> MaxentResult<()> {
    for (index, &value) in a.iter().enumerate() {
        if value.is_nan() || value == f64::INFINITY {
            return Err(MaxentError::InvalidDensity { what, index, value });
        }
    }
    Ok(())
}

/// Shannon entropy `−Σ p_i log p_i` of a normalized pmf given in log space.
///
/// Terms with zero probability are skipped so `0·log 0` never produces NaN.
pub fn entropy_from_log_pmf(log_p: ArrayView1<f64>) -> f64 {
    log_p.fold(0.0, |acc, &lp| if lp == f64::NEG_INFINITY { acc } else { acc - lp.exp() * lp })
}
