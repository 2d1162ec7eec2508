//! ConditionalModel — one parameter vector shared by a family of
//! per-context distributions.
//!
//! Purpose
//! -------
//! Fit `p(x | c) ∝ p0(x | c) exp(θ·f(c, x))` for discrete contexts `c`,
//! each with its own normalizer `Z_c(θ)`. With empirical context weights
//! `w_c` (summing to one), the joint dual and gradient are
//!
//! - `dual = Σ_c w_c (log Z_c(θ) − θ·K_c) = Σ_c w_c log Z_c(θ) − θ·K`
//! - `grad = Σ_c w_c E[f | c] − K`
//!
//! where `K = Σ_c w_c K_c` is the pooled target.
//!
//! Key behaviors
//! -------------
//! - Each context is a [`FeatureBlock`]: exact over its own sample space,
//!   or importance-sampled.
//! - Built from empirical counts, the model also knows the empirical
//!   feature expectations and can fit to them directly.
//! - With a single context it coincides with [`Model`](super::model::Model)
//!   (or the sampled model on a fixed sample).
//! - Contexts of zero weight do not enter the dual, the gradient, or the
//!   entropy and are never evaluated while fitting. Per-context queries
//!   evaluate them on demand.
//!
//! Invariants & assumptions
//! ------------------------
//! - All contexts share the same feature count.
//! - Context weights are finite, non-negative, and not all zero; they are
//!   normalized on construction.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use crate::{
    maxent::{
        core::{
            base::{BaseModel, FitOutcome, MaxentModel},
            block::{BlockEval, FeatureBlock},
            cache::EvalCache,
        },
        errors::{MaxentError, MaxentResult},
    },
    optimization::dual_optimizer::FitOptions,
};

/// Conditional max-ent model over a set of contexts.
#[derive(Debug, Clone)]
pub struct ConditionalModel {
    base: BaseModel,
    contexts: Vec<FeatureBlock>,
    weights: Array1<f64>,
    /// Indices of the contexts with positive weight, in order.
    active: Vec<usize>,
    empirical: Option<Array1<f64>>,
    cache: EvalCache,
}

impl ConditionalModel {
    /// Build from per-context blocks and (unnormalized) context weights.
    ///
    /// # Errors
    /// - `EmptySampleSpace` without contexts.
    /// - `DimensionMismatch` if the weights do not match the contexts or
    ///   the contexts disagree on the feature count.
    /// - `InvalidContextWeights` for negative, non-finite, or all-zero
    ///   weights.
    pub fn new(contexts: Vec<FeatureBlock>, weights: Array1<f64>) -> MaxentResult<Self> {
        let first = contexts.first().ok_or(MaxentError::EmptySampleSpace)?;
        let num_features = first.num_features();
        if weights.len() != contexts.len() {
            return Err(MaxentError::DimensionMismatch {
                what: "context weights",
                expected: contexts.len(),
                found: weights.len(),
            });
        }
        if let Some(bad) = contexts.iter().find(|b| b.num_features() != num_features) {
            return Err(MaxentError::DimensionMismatch {
                what: "context feature rows",
                expected: num_features,
                found: bad.num_features(),
            });
        }
        let weights = normalize_weights(weights)?;
        let active = weights.iter().enumerate().filter(|&(_, &w)| w > 0.0).map(|(c, _)| c).collect();
        Ok(Self {
            base: BaseModel::new(num_features)?,
            contexts,
            weights,
            active,
            empirical: None,
            cache: EvalCache::new(),
        })
    }

    /// Build from a joint feature matrix and a table of empirical counts.
    ///
    /// - `features`: m × (C·S), column `c·S + x` holds `f(c, x)`.
    /// - `counts`: C × S, how often `(c, x)` was observed.
    /// - `log_prior`: optional `log p0(x | c)` in the same column order.
    ///
    /// Context weights are the row sums of `counts`; the empirical
    /// expectations `Σ_{c,x} counts(c, x)/N · f(c, x)` become available
    /// through [`ConditionalModel::empirical_expectations`].
    ///
    /// # Errors
    /// - `DimensionMismatch` if the column counts disagree.
    /// - `InvalidOption` for negative or non-finite counts.
    /// - `InvalidContextWeights` if every count is zero.
    /// - Block validation errors.
    pub fn from_counts(
        features: Array2<f64>, counts: ArrayView2<f64>, log_prior: Option<Array1<f64>>,
    ) -> MaxentResult<Self> {
        let (num_contexts, per_context) = counts.dim();
        if features.ncols() != num_contexts * per_context {
            return Err(MaxentError::DimensionMismatch {
                what: "joint feature columns",
                expected: num_contexts * per_context,
                found: features.ncols(),
            });
        }
        if let Some(lp) = log_prior.as_ref() {
            if lp.len() != features.ncols() {
                return Err(MaxentError::DimensionMismatch {
                    what: "prior log-density",
                    expected: features.ncols(),
                    found: lp.len(),
                });
            }
        }
        if counts.iter().any(|&n| !n.is_finite() || n < 0.0) {
            return Err(MaxentError::InvalidOption {
                name: "counts",
                reason: "Counts must be finite and non-negative.",
            });
        }

        let mut contexts = Vec::with_capacity(num_contexts);
        for c in 0..num_contexts {
            let cols = s![.., c * per_context..(c + 1) * per_context];
            let prior = log_prior
                .as_ref()
                .map(|lp| lp.slice(s![c * per_context..(c + 1) * per_context]).to_owned());
            contexts.push(FeatureBlock::exact(features.slice(cols).to_owned(), prior)?);
        }
        let weights = counts.sum_axis(ndarray::Axis(1));

        let total = counts.sum();
        let empirical = if total > 0.0 {
            let freq = Array1::from_iter(counts.iter().map(|&n| n / total));
            Some(features.dot(&freq))
        } else {
            None
        };

        let mut model = Self::new(contexts, weights)?;
        model.empirical = empirical;
        Ok(model)
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Normalized context weights.
    pub fn context_weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    /// # Errors
    /// `ContextOutOfRange` for an unknown context.
    pub fn context(&self, c: usize) -> MaxentResult<&FeatureBlock> {
        self.contexts
            .get(c)
            .ok_or(MaxentError::ContextOutOfRange { index: c, len: self.contexts.len() })
    }

    /// Empirical feature expectations, when built from counts.
    pub fn empirical_expectations(&self) -> Option<&Array1<f64>> {
        self.empirical.as_ref()
    }

    /// Pooled target `Σ_c w_c K_c` from per-context targets (C × m).
    ///
    /// # Errors
    /// `DimensionMismatch` for a wrongly shaped table.
    pub fn pooled_constraints(&self, per_context: ArrayView2<f64>) -> MaxentResult<Array1<f64>> {
        if per_context.dim() != (self.num_contexts(), self.base.num_features()) {
            let (rows, cols) = per_context.dim();
            let (what, expected, found) = if rows != self.num_contexts() {
                ("per-context target rows", self.num_contexts(), rows)
            } else {
                ("per-context target columns", self.base.num_features(), cols)
            };
            return Err(MaxentError::DimensionMismatch { what, expected, found });
        }
        Ok(per_context.t().dot(&self.weights))
    }

    /// Fit to the empirical expectations of the counts.
    ///
    /// # Errors
    /// `ConstraintsNotSet` unless built from non-empty counts, otherwise as
    /// [`MaxentModel::fit`].
    pub fn fit_empirical(&mut self, opts: &FitOptions) -> MaxentResult<FitOutcome> {
        let k = self.empirical.clone().ok_or(MaxentError::ConstraintsNotSet)?;
        self.fit(k, opts)
    }

    /// Per-context log-pmf (or normalized log-weights for sampled
    /// contexts) at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, or an evaluation error.
    pub fn log_pmf(&self) -> MaxentResult<Vec<Array1<f64>>> {
        self.base.require_fitted()?;
        self.each_context(BlockEval::log_normalized)
    }

    /// # Errors
    /// As [`ConditionalModel::log_pmf`].
    pub fn pmf(&self) -> MaxentResult<Vec<Array1<f64>>> {
        self.base.require_fitted()?;
        self.each_context(BlockEval::weights)
    }

    /// `E[f | c]` at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, `ContextOutOfRange`, or an evaluation error.
    pub fn context_expectations(&self, c: usize) -> MaxentResult<Array1<f64>> {
        self.base.require_fitted()?;
        let block = self.context(c)?;
        self.with_context(c, self.base.params().view(), |e| e.expectations(block))
    }

    /// `log Z_c` for every context at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, or an evaluation error.
    pub fn log_norm_consts(&self) -> MaxentResult<Array1<f64>> {
        self.base.require_fitted()?;
        Ok(Array1::from(self.each_context(|e| e.log_z)?))
    }

    // ---- Helper Methods ----

    /// Evaluate the positively weighted contexts, in the order of `active`.
    fn eval_at<R>(
        &self, theta: ArrayView1<f64>, read: impl FnOnce(&[BlockEval]) -> R,
    ) -> MaxentResult<R> {
        self.base.check_theta(theta)?;
        let compute = || {
            self.active
                .iter()
                .map(|&c| self.contexts[c].eval(theta))
                .collect::<MaxentResult<Vec<BlockEval>>>()
        };
        self.cache.with(theta, compute, read)
    }

    /// Read one context at `theta`: from the cache when it is weighted,
    /// otherwise by evaluating it directly.
    fn with_context<R>(
        &self, c: usize, theta: ArrayView1<f64>, read: impl FnOnce(&BlockEval) -> R,
    ) -> MaxentResult<R> {
        let block = self.context(c)?;
        match self.active.binary_search(&c) {
            Ok(slot) => self.eval_at(theta, |evals| read(&evals[slot])),
            Err(_) => Ok(read(&block.eval(theta)?)),
        }
    }

    fn each_context<R>(&self, read: impl Fn(&BlockEval) -> R) -> MaxentResult<Vec<R>> {
        let theta = self.base.params().view();
        (0..self.contexts.len()).map(|c| self.with_context(c, theta, &read)).collect()
    }

    fn active_weights(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.active.iter().map(|&c| (c, self.weights[c]))
    }
}

impl MaxentModel for ConditionalModel {
    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }

    fn log_norm_const_at(&self, theta: ArrayView1<f64>) -> MaxentResult<f64> {
        self.eval_at(theta, |evals| {
            evals.iter().zip(self.active_weights()).map(|(e, (_, w))| w * e.log_z).sum()
        })
    }

    fn expectations_at(&self, theta: ArrayView1<f64>) -> MaxentResult<Array1<f64>> {
        self.eval_at(theta, |evals| {
            let mut mu = Array1::zeros(self.base.num_features());
            for (e, (c, w)) in evals.iter().zip(self.active_weights()) {
                mu.scaled_add(w, &e.expectations(&self.contexts[c]));
            }
            mu
        })
    }

    /// Conditional entropy `Σ_c w_c H(p(· | c))`.
    fn entropy(&self) -> MaxentResult<f64> {
        self.base.require_fitted()?;
        self.eval_at(self.base.params().view(), |evals| {
            evals
                .iter()
                .zip(self.active_weights())
                .map(|(e, (c, w))| w * e.entropy(&self.contexts[c]))
                .sum()
        })
    }
}

// ---- Helper Methods ----

fn normalize_weights(weights: Array1<f64>) -> MaxentResult<Array1<f64>> {
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(MaxentError::InvalidContextWeights { reason: "weights must be finite" });
    }
    if weights.iter().any(|&w| w < 0.0) {
        return Err(MaxentError::InvalidContextWeights { reason: "weights must be non-negative" });
    }
    let total = weights.sum();
    if total <= 0.0 {
        return Err(MaxentError::InvalidContextWeights { reason: "weights sum to zero" });
    }
    Ok(weights / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        maxent::models::model::Model,
        optimization::{dual_optimizer::Algorithm, numerical_stability::MASS_TOL},
    };
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Construction checks and weight normalization.
    // - Reduction to the exact model for identical contexts.
    // - Construction from counts and fitting to empirical expectations.
    // - Per-context queries.
    // - Zero-weight contexts kept out of the dual and evaluated on demand.
    // -------------------------------------------------------------------------

    fn two_point_block() -> FeatureBlock {
        FeatureBlock::exact(array![[0.0, 1.0]], None).unwrap()
    }

    #[test]
    fn construction_rejects_bad_inputs() {
        assert!(matches!(
            ConditionalModel::new(vec![], Array1::zeros(0)),
            Err(MaxentError::EmptySampleSpace)
        ));
        assert!(matches!(
            ConditionalModel::new(vec![two_point_block()], array![0.5, 0.5]),
            Err(MaxentError::DimensionMismatch { what: "context weights", .. })
        ));
        assert!(matches!(
            ConditionalModel::new(vec![two_point_block(), two_point_block()], array![1.0, -1.0]),
            Err(MaxentError::InvalidContextWeights { .. })
        ));
        assert!(matches!(
            ConditionalModel::new(vec![two_point_block(), two_point_block()], array![0.0, 0.0]),
            Err(MaxentError::InvalidContextWeights { .. })
        ));
        let wide = FeatureBlock::exact(array![[0.0, 1.0], [1.0, 0.0]], None).unwrap();
        assert!(matches!(
            ConditionalModel::new(vec![two_point_block(), wide], array![1.0, 1.0]),
            Err(MaxentError::DimensionMismatch { what: "context feature rows", .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Two identical contexts of equal weight behave like one exact model.
    //
    // Given
    // -----
    // - Both contexts over {0, 1, 2}, f(x) = x; weights (3, 3); K = 1.4.
    //
    // Expect
    // ------
    // - Same θ̂ and entropy as `Model` on {0, 1, 2}.
    fn identical_contexts_reduce_to_exact_model() {
        // Arrange
        let block = FeatureBlock::exact(array![[0.0, 1.0, 2.0]], None).unwrap();
        let mut cond = ConditionalModel::new(vec![block.clone(), block], array![3.0, 3.0]).unwrap();
        let mut exact = Model::new(array![[0.0, 1.0, 2.0]], None).unwrap();
        let opts = FitOptions::with_algorithm(Algorithm::BFGS);

        // Act
        cond.fit(array![1.4], &opts).unwrap();
        exact.fit(array![1.4], &opts).unwrap();

        // Assert
        assert_relative_eq!(cond.context_weights()[0], 0.5);
        assert_relative_eq!(cond.params()[0], exact.params()[0], epsilon = 1e-6);
        assert_relative_eq!(cond.entropy().unwrap(), exact.entropy().unwrap(), epsilon = 1e-6);
        let pmfs = cond.pmf().unwrap();
        assert_eq!(pmfs.len(), 2);
        assert_relative_eq!(pmfs[1].sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Counts give context weights and empirical targets; fitting to them
    // reproduces the empirical expectation.
    //
    // Given
    // -----
    // - Two contexts over x ∈ {0, 1}, f(c, x) = x + c.
    // - Counts [[1, 3], [2, 2]].
    //
    // Expect
    // ------
    // - Weights (0.5, 0.5); K = (3·1 + 2·1 + 2·2)/8 = 9/8.
    // - After `fit_empirical`, E[f] = K.
    fn counts_define_weights_and_targets() {
        // Arrange
        let features = array![[0.0, 1.0, 1.0, 2.0]];
        let counts = array![[1.0, 3.0], [2.0, 2.0]];

        // Act
        let mut cond = ConditionalModel::from_counts(features, counts.view(), None).unwrap();
        let out = cond.fit_empirical(&FitOptions::with_algorithm(Algorithm::BFGS)).unwrap();

        // Assert
        assert!(out.converged(), "status = {}", out.status);
        assert_relative_eq!(cond.context_weights()[1], 0.5);
        for p in cond.pmf().unwrap() {
            assert_relative_eq!(p.sum(), 1.0, epsilon = MASS_TOL);
        }
        let k = cond.empirical_expectations().unwrap().clone();
        assert_relative_eq!(k[0], 9.0 / 8.0, epsilon = 1e-12);
        assert_relative_eq!(cond.expectations().unwrap()[0], k[0], epsilon = 1e-6);
        let mu1 = cond.context_expectations(1).unwrap();
        assert!(mu1[0] > 1.0 && mu1[0] < 2.0);
        assert!(matches!(
            cond.context_expectations(2),
            Err(MaxentError::ContextOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn pooled_constraints_weight_rows() {
        let cond =
            ConditionalModel::new(vec![two_point_block(), two_point_block()], array![1.0, 3.0])
                .unwrap();
        let k = cond.pooled_constraints(array![[0.2], [0.6]].view()).unwrap();
        assert_relative_eq!(k[0], 0.25 * 0.2 + 0.75 * 0.6, epsilon = 1e-12);
        assert!(matches!(
            cond.pooled_constraints(array![[0.2, 0.1]].view()),
            Err(MaxentError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn fit_empirical_requires_counts() {
        let mut cond = ConditionalModel::new(vec![two_point_block()], array![1.0]).unwrap();
        assert!(matches!(
            cond.fit_empirical(&FitOptions::default()),
            Err(MaxentError::ConstraintsNotSet)
        ));
    }

    #[test]
    fn log_norm_consts_per_context() {
        let shifted = FeatureBlock::exact(array![[1.0, 2.0]], None).unwrap();
        let mut cond =
            ConditionalModel::new(vec![two_point_block(), shifted], array![1.0, 1.0]).unwrap();
        cond.set_params(array![1.0]).unwrap();

        let log_z = cond.log_norm_consts().unwrap();
        assert_relative_eq!(log_z[0], (1.0 + 1.0_f64.exp()).ln(), epsilon = 1e-12);
        assert_relative_eq!(log_z[1], 1.0 + (1.0 + 1.0_f64.exp()).ln(), epsilon = 1e-12);
        assert_relative_eq!(
            cond.log_norm_const().unwrap(),
            0.5 * (log_z[0] + log_z[1]),
            epsilon = 1e-12
        );
    }

    #[test]
    // Purpose
    // -------
    // A context with zero weight contributes nothing to the fit and is never
    // evaluated by it, even when it cannot be evaluated at all. Per-context
    // queries still reach it and report its own error.
    //
    // Given
    // -----
    // - Context 0 over {0, 1}, weight 1.
    // - Context 1 with weight 0 and a prior excluding every point.
    // - K = 0.8.
    //
    // Expect
    // ------
    // - `fit` converges to θ̂ = ln 4; dual, gradient, and entropy use context 0.
    // - `pmf`, `log_pmf`, and `context_expectations(1)` return
    //   `DegenerateSample`; `context_expectations(0)` works.
    fn zero_weight_contexts_are_skipped_by_the_fit() {
        // Arrange
        let empty_prior = array![f64::NEG_INFINITY, f64::NEG_INFINITY];
        let dead = FeatureBlock::exact(array![[0.0, 1.0]], Some(empty_prior)).unwrap();
        let mut cond = ConditionalModel::new(vec![two_point_block(), dead], array![2.0, 0.0]).unwrap();

        // Act
        let out = cond.fit(array![0.8], &FitOptions::with_algorithm(Algorithm::BFGS)).unwrap();

        // Assert
        assert!(out.converged(), "status = {}", out.status);
        assert_relative_eq!(cond.params()[0], 4.0_f64.ln(), epsilon = 1e-5);
        assert_relative_eq!(
            cond.log_norm_const().unwrap(),
            (1.0 + 4.0_f64).ln(),
            epsilon = 1e-5
        );
        let h = -(0.8_f64 * 0.8_f64.ln() + 0.2 * 0.2_f64.ln());
        assert_relative_eq!(cond.entropy().unwrap(), h, epsilon = 1e-5);
        assert_relative_eq!(cond.context_expectations(0).unwrap()[0], 0.8, epsilon = 1e-5);
        assert!(matches!(cond.pmf(), Err(MaxentError::DegenerateSample { .. })));
        assert!(matches!(cond.log_pmf(), Err(MaxentError::DegenerateSample { .. })));
        assert!(matches!(
            cond.context_expectations(1),
            Err(MaxentError::DegenerateSample { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Zero-weight contexts that can be evaluated show up in the
    // per-context queries at the fitted θ.
    fn zero_weight_contexts_are_evaluated_on_demand() {
        let shifted = FeatureBlock::exact(array![[1.0, 2.0]], None).unwrap();
        let mut cond =
            ConditionalModel::new(vec![shifted, two_point_block()], array![0.0, 1.0]).unwrap();
        cond.set_params(array![1.0]).unwrap();

        let log_z = cond.log_norm_consts().unwrap();
        let pmfs = cond.pmf().unwrap();

        assert_relative_eq!(log_z[0], 1.0 + (1.0 + 1.0_f64.exp()).ln(), epsilon = 1e-12);
        assert_relative_eq!(cond.log_norm_const().unwrap(), log_z[1], epsilon = 1e-12);
        assert_eq!(pmfs.len(), 2);
        assert_relative_eq!(pmfs[0].sum(), 1.0, epsilon = 1e-12);
    }
}
