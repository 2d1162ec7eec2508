//! Feature blocks and their per-θ evaluations.
//!
//! Purpose
//! -------
//! A [`FeatureBlock`] is one set of points the dual is summed over: either
//! a whole (small) sample space, or a Monte Carlo sample drawn from an
//! auxiliary distribution `q`. It carries the feature matrix and the
//! optional per-point offsets `log p0` (prior) and `log q` (auxiliary).
//! [`FeatureBlock::eval`] reduces the block at a given `θ` to a
//! [`BlockEval`], from which normalizers, expectations, effective sample
//! size, and entropy terms are read.
//!
//! Key behaviors
//! -------------
//! - Exact blocks: `log Z = log Σ exp(a_i)` with `a_i = θ·f_i + log p0_i`.
//! - Sampled blocks: `log w_i = a_i − log q_i`, `log Ẑ = log mean(w_i)`.
//! - Expectations are self-normalized in both cases: `Σ w̃_i f_i`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Features are finite; the matrix has at least one column.
//! - `log p0` is finite or `-inf`; `log q` is finite.
//! - A block whose weights all vanish at `θ` is reported as
//!   [`MaxentError::DegenerateSample`], never normalized by zero.
//!
//! Conventions
//! -----------
//! - Matrices are (features × points): one column per point.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::{
    maxent::errors::{MaxentError, MaxentResult},
    optimization::{
        errors::OptError,
        numerical_stability::{
            effective_sample_size, log_sum_exp, log_weights, normalized_weights,
            validate_log_values, weighted_feature_mean,
        },
    },
};

/// One set of summation points with optional prior and auxiliary offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBlock {
    features: Array2<f64>,
    log_prior: Option<Array1<f64>>,
    log_aux: Option<Array1<f64>>,
}

impl FeatureBlock {
    /// Block over an enumerated sample space.
    ///
    /// # Errors
    /// - `EmptySampleSpace` if `features` has no columns.
    /// - `NonFiniteFeature` for the first NaN / infinite feature.
    /// - `DimensionMismatch` / `InvalidDensity` for a malformed `log_prior`.
    pub fn exact(features: Array2<f64>, log_prior: Option<Array1<f64>>) -> MaxentResult<Self> {
        validate_features(features.view())?;
        if let Some(lp) = log_prior.as_ref() {
            validate_offsets(lp.view(), features.ncols(), "prior log-density")?;
        }
        Ok(Self { features, log_prior, log_aux: None })
    }

    /// Block over points drawn from an auxiliary density `q`.
    ///
    /// # Errors
    /// As [`FeatureBlock::exact`], plus `InvalidDensity` if any `log q` is
    /// not finite.
    pub fn sampled(
        features: Array2<f64>, log_aux: Array1<f64>, log_prior: Option<Array1<f64>>,
    ) -> MaxentResult<Self> {
        validate_features(features.view())?;
        validate_offsets(log_aux.view(), features.ncols(), "auxiliary log-density")?;
        if let Some((index, &value)) = log_aux.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(MaxentError::InvalidDensity { what: "auxiliary log-density", index, value });
        }
        if let Some(lp) = log_prior.as_ref() {
            validate_offsets(lp.view(), features.ncols(), "prior log-density")?;
        }
        Ok(Self { features, log_prior, log_aux: Some(log_aux) })
    }

    pub fn num_features(&self) -> usize {
        self.features.nrows()
    }

    /// Number of points (columns).
    pub fn size(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_sampled(&self) -> bool {
        self.log_aux.is_some()
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn log_prior(&self) -> Option<ArrayView1<'_, f64>> {
        self.log_prior.as_ref().map(|a| a.view())
    }

    pub fn log_aux(&self) -> Option<ArrayView1<'_, f64>> {
        self.log_aux.as_ref().map(|a| a.view())
    }

    /// Reduce the block at `theta`.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `theta.len() != num_features()`.
    /// - `Optimization(InvalidThetaInput)` if `theta` has a non-finite entry.
    /// - `Unbounded` if a log-weight overflows (`+inf`, or NaN from
    ///   `+inf − inf`) at a finite `theta`.
    /// - `DegenerateSample` if every weight is zero.
    pub fn eval(&self, theta: ArrayView1<f64>) -> MaxentResult<BlockEval> {
        if theta.len() != self.num_features() {
            return Err(MaxentError::DimensionMismatch {
                what: "parameter vector",
                expected: self.num_features(),
                found: theta.len(),
            });
        }
        if let Some((index, &value)) = theta.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(MaxentError::Optimization(OptError::InvalidThetaInput { index, value }));
        }
        let log_w = log_weights(self.features.view(), theta, self.log_prior(), self.log_aux());
        if let Some(&value) = log_w.iter().find(|a| a.is_nan() || **a == f64::INFINITY) {
            return Err(MaxentError::Unbounded { value });
        }
        let lse = log_sum_exp(log_w.view());
        if lse == f64::NEG_INFINITY {
            return Err(MaxentError::DegenerateSample { ess: 0.0, size: self.size() });
        }
        if !lse.is_finite() {
            return Err(MaxentError::Unbounded { value: lse });
        }
        let log_z = if self.is_sampled() { lse - (self.size() as f64).ln() } else { lse };
        Ok(BlockEval { log_w, lse, log_z })
    }
}

/// Reduction of a [`FeatureBlock`] at one `θ`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEval {
    /// Per-point log-weights.
    pub log_w: Array1<f64>,
    /// `log Σ exp(log_w)`.
    pub lse: f64,
    /// Log normalizing constant (exact) or its importance estimate (sampled).
    pub log_z: f64,
}

impl BlockEval {
    /// Self-normalized weights (the pmf for exact blocks).
    pub fn weights(&self) -> Array1<f64> {
        normalized_weights(self.log_w.view(), self.lse)
    }

    /// Normalized log-weights `log_w − lse` (the log-pmf for exact blocks).
    pub fn log_normalized(&self) -> Array1<f64> {
        self.log_w.mapv(|a| a - self.lse)
    }

    /// Feature expectations `Σ w̃_i f_i`.
    pub fn expectations(&self, block: &FeatureBlock) -> Array1<f64> {
        weighted_feature_mean(block.features(), self.weights().view())
    }

    /// Effective sample size `(Σ w)² / Σ w²`.
    pub fn ess(&self) -> f64 {
        effective_sample_size(self.log_w.view())
    }

    /// `log Σ w_i²`, needed to pool effective sample sizes across blocks.
    pub fn lse_squared(&self) -> f64 {
        let doubled = self.log_w.mapv(|a| 2.0 * a);
        log_sum_exp(doubled.view())
    }

    /// `E_p[θ·f + log p0]` under the self-normalized weights.
    ///
    /// Entropy follows as `log Z − E_p[θ·f + log p0]`. Zero-weight points
    /// are skipped.
    pub fn expected_log_kernel(&self, block: &FeatureBlock) -> f64 {
        let w = self.weights();
        let mut acc = 0.0;
        for (i, (&wi, &a)) in w.iter().zip(self.log_w.iter()).enumerate() {
            if wi == 0.0 {
                continue;
            }
            let log_q = block.log_aux.as_ref().map_or(0.0, |lq| lq[i]);
            acc += wi * (a + log_q);
        }
        acc
    }

    /// Entropy of the block's distribution at this `θ`.
    pub fn entropy(&self, block: &FeatureBlock) -> f64 {
        self.log_z - self.expected_log_kernel(block)
    }
}

// ---- Helper Methods ----

fn validate_features(features: ArrayView2<f64>) -> MaxentResult<()> {
    if features.ncols() == 0 {
        return Err(MaxentError::EmptySampleSpace);
    }
    for ((row, col), &value) in features.indexed_iter() {
        if !value.is_finite() {
            return Err(MaxentError::NonFiniteFeature { row, col, value });
        }
    }
    Ok(())
}

fn validate_offsets(a: ArrayView1<f64>, expected: usize, what: &'static str) -> MaxentResult<()> {
    if a.len() != expected {
        return Err(MaxentError::DimensionMismatch { what, expected, found: a.len() });
    }
    validate_log_values(a, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Construction-time validation of features and offsets.
    // - Exact-block normalizers, expectations, and entropy.
    // - Sampled-block normalizer estimate and self-normalized expectations.
    // - Degenerate (all-zero) weights.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Malformed inputs are rejected with the documented variants.
    fn construction_validates_inputs() {
        assert!(matches!(
            FeatureBlock::exact(Array2::zeros((2, 0)), None),
            Err(MaxentError::EmptySampleSpace)
        ));
        assert!(matches!(
            FeatureBlock::exact(array![[0.0, f64::NAN]], None),
            Err(MaxentError::NonFiniteFeature { row: 0, col: 1, .. })
        ));
        assert!(matches!(
            FeatureBlock::exact(array![[0.0, 1.0]], Some(array![0.0])),
            Err(MaxentError::DimensionMismatch { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            FeatureBlock::sampled(array![[0.0, 1.0]], array![0.0, f64::NEG_INFINITY], None),
            Err(MaxentError::InvalidDensity { index: 1, .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // At θ = 0 with no prior an exact block is uniform.
    //
    // Given
    // -----
    // - Sample space {0, 1, 2, 3} with f(x) = x.
    //
    // Expect
    // ------
    // - log Z = ln 4, E[f] = 1.5, entropy = ln 4.
    fn exact_block_at_zero_is_uniform() {
        let block = FeatureBlock::exact(array![[0.0, 1.0, 2.0, 3.0]], None).unwrap();
        let ev = block.eval(array![0.0].view()).unwrap();
        assert_relative_eq!(ev.log_z, 4.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(ev.expectations(&block)[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(ev.entropy(&block), 4.0_f64.ln(), epsilon = 1e-12);
        assert_relative_eq!(ev.ess(), 4.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // With a prior, log Z is relative to the prior and zero-prior points get
    // no mass (and no NaN in the entropy).
    fn exact_block_with_zero_prior_entries() {
        let lp = array![0.5_f64.ln(), 0.5_f64.ln(), f64::NEG_INFINITY];
        let block = FeatureBlock::exact(array![[1.0, 2.0, 50.0]], Some(lp)).unwrap();
        let ev = block.eval(array![0.0].view()).unwrap();

        assert_relative_eq!(ev.log_z, 0.0, epsilon = 1e-12);
        assert_eq!(ev.weights()[2], 0.0);
        assert_relative_eq!(ev.expectations(&block)[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(ev.entropy(&block), 2.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // A sampled block estimates Z by the mean weight; when the points are
    // a uniform "sample" with q = 1/4, Ẑ equals the exact Z relative to a
    // uniform base measure.
    fn sampled_block_estimates_normalizer() {
        let f = array![[0.0, 1.0, 2.0, 3.0]];
        let log_q = Array1::from_elem(4, 0.25_f64.ln());
        let block = FeatureBlock::sampled(f, log_q, None).unwrap();
        let theta = array![0.3];

        let ev = block.eval(theta.view()).unwrap();

        let exact: f64 = (0..4).map(|x| (0.3 * x as f64).exp()).sum();
        assert_relative_eq!(ev.log_z, exact.ln(), epsilon = 1e-12);
        let mean: f64 = (0..4).map(|x| x as f64 * (0.3 * x as f64).exp()).sum::<f64>() / exact;
        assert_relative_eq!(ev.expectations(&block)[0], mean, epsilon = 1e-12);
    }

    #[test]
    fn all_zero_weights_are_degenerate() {
        let lp = array![f64::NEG_INFINITY, f64::NEG_INFINITY];
        let block = FeatureBlock::exact(array![[1.0, 2.0]], Some(lp)).unwrap();
        assert!(matches!(
            block.eval(array![0.0].view()),
            Err(MaxentError::DegenerateSample { size: 2, .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // A huge but finite θ overflows the log-weights; this is reported as an
    // unbounded dual, not as a malformed density. A non-finite θ is rejected
    // as an invalid input before any weight is formed.
    //
    // Given
    // -----
    // - f = [0, 3] and θ = 1e308, so θ·f overflows to +inf.
    // - f = [0, 3] against a prior that excludes x = 1, at θ = 1e308 ⇒
    //   +inf − inf = NaN for the excluded point.
    //
    // Expect
    // ------
    // - `Unbounded` in both cases; `InvalidThetaInput` for θ = NaN.
    fn log_weight_overflow_is_unbounded() {
        let block = FeatureBlock::exact(array![[0.0, 3.0]], None).unwrap();
        assert!(matches!(block.eval(array![1e308].view()), Err(MaxentError::Unbounded { .. })));

        let lp = array![0.0, f64::NEG_INFINITY];
        let block = FeatureBlock::exact(array![[0.0, 3.0]], Some(lp)).unwrap();
        assert!(matches!(block.eval(array![1e308].view()), Err(MaxentError::Unbounded { .. })));

        assert!(matches!(
            block.eval(array![f64::NAN].view()),
            Err(MaxentError::Optimization(OptError::InvalidThetaInput { index: 0, .. }))
        ));
    }

    #[test]
    fn eval_rejects_wrong_theta_length() {
        let block = FeatureBlock::exact(array![[1.0, 2.0]], None).unwrap();
        assert!(matches!(
            block.eval(array![0.0, 1.0].view()),
            Err(MaxentError::DimensionMismatch { expected: 1, found: 2, .. })
        ));
    }
}
