//! Model — exact max-ent / min-KL model over an enumerated sample space.
//!
//! Purpose
//! -------
//! Fit `p(x) ∝ p0(x) exp(θ·f(x))` on a sample space small enough to sum
//! over. The dual and its gradient are computed exactly:
//!
//! - `a(x) = θ·f(x) + log p0(x)`
//! - `log Z = log Σ_x exp(a(x))` (max-shifted)
//! - `p(x) = exp(a(x) − log Z)`, `E[f] = F p`
//!
//! Invariants & assumptions
//! ------------------------
//! - The feature matrix is (features × sample-space size) and finite.
//! - Without a prior, the model maximizes entropy; with one, it minimizes
//!   `KL(p ‖ p0)`.
//! - The pmf of a fitted model sums to 1 up to rounding.
//!
//! Conventions
//! -----------
//! - Query methods act on the current `θ` and need a fitted (or explicitly
//!   parameterized) model.
//! - Dual and gradient at the same `θ` share one block reduction through
//!   the last-evaluation cache.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::{
    maxent::{
        core::{
            base::{BaseModel, MaxentModel},
            block::{BlockEval, FeatureBlock},
            cache::EvalCache,
        },
        errors::MaxentResult,
        models::scoring,
    },
    optimization::numerical_stability::entropy_from_log_pmf,
};

/// Exact model over an explicit feature matrix.
#[derive(Debug, Clone)]
pub struct Model {
    base: BaseModel,
    block: FeatureBlock,
    cache: EvalCache,
}

impl Model {
    /// Build from a (features × sample-space size) matrix and an optional
    /// prior log-pmf over the sample space.
    ///
    /// # Errors
    /// - `EmptySampleSpace`, `NonFiniteFeature` for a malformed matrix.
    /// - `DimensionMismatch`, `InvalidDensity` for a malformed prior.
    /// - `InvalidOption` if the matrix has no rows.
    pub fn new(features: Array2<f64>, log_prior: Option<Array1<f64>>) -> MaxentResult<Self> {
        let block = FeatureBlock::exact(features, log_prior)?;
        let base = BaseModel::new(block.num_features())?;
        Ok(Self { base, block, cache: EvalCache::new() })
    }

    /// Build by evaluating feature functions on every sample-space element.
    ///
    /// # Errors
    /// As [`Model::new`].
    ///
    /// # Example
    /// ```
    /// use maxentropy::maxent::prelude::*;
    ///
    /// let space = [0.0, 1.0, 2.0, 3.0];
    /// let identity = |x: &f64| *x;
    /// let model = Model::from_feature_fns(&space, &[&identity], None)?;
    /// assert_eq!(model.sample_space_size(), 4);
    /// # Ok::<(), maxentropy::maxent::errors::MaxentError>(())
    /// ```
    pub fn from_feature_fns<X>(
        sample_space: &[X], feature_fns: &[&dyn Fn(&X) -> f64], log_prior: Option<Array1<f64>>,
    ) -> MaxentResult<Self> {
        let features = Array2::from_shape_fn((feature_fns.len(), sample_space.len()), |(i, j)| {
            feature_fns[i](&sample_space[j])
        });
        Self::new(features, log_prior)
    }

    pub fn sample_space_size(&self) -> usize {
        self.block.size()
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.block.features()
    }

    pub fn log_prior(&self) -> Option<ArrayView1<'_, f64>> {
        self.block.log_prior()
    }

    /// Log-pmf over the sample space at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, or an evaluation error.
    pub fn log_pmf(&self) -> MaxentResult<Array1<f64>> {
        self.base.require_fitted()?;
        self.eval_at(self.base.params().view(), BlockEval::log_normalized)
    }

    /// Pmf over the sample space at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, or an evaluation error.
    pub fn pmf(&self) -> MaxentResult<Array1<f64>> {
        self.base.require_fitted()?;
        self.eval_at(self.base.params().view(), BlockEval::weights)
    }

    /// Log-pmf of arbitrary points given their features (m × n) and
    /// optionally their prior log-pmf.
    ///
    /// # Errors
    /// `NotFitted`, or a validation error for `fx` / `log_prior`.
    pub fn log_pdf_features(
        &self, fx: ArrayView2<f64>, log_prior: Option<ArrayView1<f64>>,
    ) -> MaxentResult<Array1<f64>> {
        let log_z = self.log_norm_const()?;
        scoring::log_density(fx, log_prior, self.base.params().view(), log_z)
    }

    /// # Errors
    /// As [`Model::log_pdf_features`].
    pub fn pdf_features(
        &self, fx: ArrayView2<f64>, log_prior: Option<ArrayView1<f64>>,
    ) -> MaxentResult<Array1<f64>> {
        Ok(self.log_pdf_features(fx, log_prior)?.mapv(f64::exp))
    }

    /// Average negative log-pmf of the points in `fx`.
    ///
    /// # Errors
    /// As [`Model::log_pdf_features`].
    pub fn cross_entropy(
        &self, fx: ArrayView2<f64>, log_prior: Option<ArrayView1<f64>>,
    ) -> MaxentResult<f64> {
        let log_z = self.log_norm_const()?;
        scoring::cross_entropy(fx, log_prior, self.base.params().view(), log_z)
    }

    // ---- Helper Methods ----

    fn eval_at<R>(
        &self, theta: ArrayView1<f64>, read: impl FnOnce(&BlockEval) -> R,
    ) -> MaxentResult<R> {
        self.cache.with(theta, || self.block.eval(theta).map(|e| vec![e]), |evals| read(&evals[0]))
    }
}

impl MaxentModel for Model {
    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }

    fn log_norm_const_at(&self, theta: ArrayView1<f64>) -> MaxentResult<f64> {
        self.eval_at(theta, |e| e.log_z)
    }

    fn expectations_at(&self, theta: ArrayView1<f64>) -> MaxentResult<Array1<f64>> {
        self.eval_at(theta, |e| e.expectations(&self.block))
    }

    /// Exact Shannon entropy of the fitted pmf (nats).
    fn entropy(&self) -> MaxentResult<f64> {
        Ok(entropy_from_log_pmf(self.log_pmf()?.view()))
    }
}
