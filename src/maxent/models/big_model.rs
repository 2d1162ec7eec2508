//! BigModel — max-ent / min-KL model fitted by importance sampling.
//!
//! Purpose
//! -------
//! Fit `p(x) ∝ p0(x) exp(θ·f(x))` on a sample space too large (or
//! continuous) to enumerate. Points are drawn from an auxiliary density `q`
//! by an external [`SampleGenerator`] and reweighted:
//!
//! - `log w_i = θ·f(x_i) + log p0(x_i) − log q(x_i)` (max-shifted)
//! - `Ẑ = mean(w_i)`, `dual = log Ẑ − θ·K`
//! - `grad = Σ w_i f(x_i) / Σ w_i − K` (self-normalized)
//!
//! Key behaviors
//! -------------
//! - A resample draws `matrix_trials` batches. The estimates pool all of
//!   them; per-batch expectations give standard errors when there are two
//!   or more.
//! - External sample sets can be registered and selected, so held-out
//!   points drive `dual`/`grad`/`expectations` instead of the optimization
//!   sample.
//! - The effective sample size `(Σ w)² / Σ w²` is exposed, and an optional
//!   floor turns a collapsed estimator into `DegenerateSample`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Resampling is explicit. `fit` never draws, so the objective stays fixed
//!   across the optimizer's line searches. `fit_stochastic` draws once per
//!   step.
//! - Every drawn batch has `num_features` rows and finite `log q`.
//! - Changing the points (resample, new sample, switching sets) invalidates
//!   the evaluation cache.
use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::{
    maxent::{
        core::{
            base::{BaseModel, FitOutcome, MaxentModel},
            block::{BlockEval, FeatureBlock},
            cache::EvalCache,
            sampler::{SampleBatch, SampleGenerator},
        },
        errors::{MaxentError, MaxentResult},
        models::scoring,
    },
    optimization::{
        dual_optimizer::{FitStatus, FnEvalMap, types::GRADIENT_COUNT},
        errors::OptResult,
        numerical_stability::{log_sum_exp, normalized_weights},
        stochastic::{StochasticOptions, StochasticOutcome, robbins_monro},
    },
};

/// Pooled importance-sampling estimate at one `θ`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportanceEstimate {
    /// `log Ẑ` over all pooled points.
    pub log_z: f64,
    /// Self-normalized feature expectations.
    pub expectations: Array1<f64>,
    /// Effective sample size of the pooled weights.
    pub ess: f64,
    /// Total number of pooled points.
    pub sample_size: usize,
    /// Standard errors of the expectations across batches (two or more).
    pub expectations_std_err: Option<Array1<f64>>,
    /// Self-normalized `E[θ·f + log p0]`; entropy is `log_z` minus this.
    pub expected_log_kernel: f64,
}

/// Importance-sampled model.
pub struct BigModel {
    base: BaseModel,
    sampler: Option<Box<dyn SampleGenerator>>,
    trials: Vec<FeatureBlock>,
    matrix_trials: usize,
    externals: Vec<FeatureBlock>,
    active_external: Option<usize>,
    min_ess: Option<f64>,
    cache: EvalCache,
}

impl fmt::Debug for BigModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BigModel")
            .field("base", &self.base)
            .field("has_sampler", &self.sampler.is_some())
            .field("trials", &self.trials.len())
            .field("matrix_trials", &self.matrix_trials)
            .field("externals", &self.externals.len())
            .field("active_external", &self.active_external)
            .field("min_ess", &self.min_ess)
            .finish()
    }
}

impl BigModel {
    /// Model with `num_features` features and no sample yet.
    ///
    /// # Errors
    /// `InvalidOption` if `num_features == 0`.
    pub fn new(num_features: usize) -> MaxentResult<Self> {
        Ok(Self {
            base: BaseModel::new(num_features)?,
            sampler: None,
            trials: Vec::new(),
            matrix_trials: 1,
            externals: Vec::new(),
            active_external: None,
            min_ess: None,
            cache: EvalCache::new(),
        })
    }

    /// Install the auxiliary sampler and draw a first sample from it.
    ///
    /// # Errors
    /// Any error of [`BigModel::resample`]. The sampler stays installed.
    pub fn set_sampler<G>(&mut self, sampler: G) -> MaxentResult<()>
    where
        G: SampleGenerator + 'static,
    {
        self.sampler = Some(Box::new(sampler));
        self.resample()
    }

    pub fn has_sampler(&self) -> bool {
        self.sampler.is_some()
    }

    /// Use a fixed sample instead of (or until the next draw of) the sampler.
    ///
    /// # Errors
    /// Validation errors of the batch; `DimensionMismatch` for a wrong
    /// feature count.
    pub fn set_sample(&mut self, batch: SampleBatch) -> MaxentResult<()> {
        let block = self.checked_block(batch)?;
        self.trials = vec![block];
        self.cache.invalidate();
        Ok(())
    }

    /// Draw `matrix_trials` fresh batches from the sampler.
    ///
    /// # Errors
    /// - `NoSampler` without an installed sampler.
    /// - Sampler errors and batch validation errors. The previous sample is
    ///   kept in that case.
    pub fn resample(&mut self) -> MaxentResult<()> {
        let mut trials = Vec::with_capacity(self.matrix_trials);
        for _ in 0..self.matrix_trials {
            let batch = self.sampler.as_mut().ok_or(MaxentError::NoSampler)?.draw()?;
            trials.push(self.checked_block(batch)?);
        }
        self.trials = trials;
        self.cache.invalidate();
        tracing::trace!(
            batches = self.matrix_trials,
            sample_size = self.trials.iter().map(FeatureBlock::size).sum::<usize>(),
            "drew importance sample"
        );
        Ok(())
    }

    pub fn matrix_trials(&self) -> usize {
        self.matrix_trials
    }

    /// Number of batches drawn per resample. Takes effect at the next
    /// resample.
    ///
    /// # Errors
    /// `InvalidOption` if `n == 0`.
    pub fn set_matrix_trials(&mut self, n: usize) -> MaxentResult<()> {
        if n == 0 {
            return Err(MaxentError::InvalidOption {
                name: "matrix_trials",
                reason: "At least one batch must be drawn per resample.",
            });
        }
        self.matrix_trials = n;
        Ok(())
    }

    /// Register an external sample set and return its index.
    ///
    /// # Errors
    /// Validation errors of the batch; `DimensionMismatch` for a wrong
    /// feature count.
    pub fn add_external(&mut self, batch: SampleBatch) -> MaxentResult<usize> {
        let block = self.checked_block(batch)?;
        self.externals.push(block);
        Ok(self.externals.len() - 1)
    }

    pub fn num_externals(&self) -> usize {
        self.externals.len()
    }

    pub fn active_external(&self) -> Option<usize> {
        self.active_external
    }

    /// Select the sample set used for estimation: `Some(i)` for the i-th
    /// external set, `None` for the drawn sample.
    ///
    /// # Errors
    /// `ExternalIndexOutOfRange` for an unknown index.
    pub fn set_external(&mut self, index: Option<usize>) -> MaxentResult<()> {
        if let Some(index) = index {
            if index >= self.externals.len() {
                return Err(MaxentError::ExternalIndexOutOfRange {
                    index,
                    len: self.externals.len(),
                });
            }
        }
        if self.active_external != index {
            self.active_external = index;
            self.cache.invalidate();
        }
        Ok(())
    }

    pub fn min_ess(&self) -> Option<f64> {
        self.min_ess
    }

    /// Floor on the effective sample size for `dual`/`grad` evaluations.
    ///
    /// # Errors
    /// `InvalidOption` unless the floor is finite and non-negative.
    pub fn set_min_ess(&mut self, min_ess: Option<f64>) -> MaxentResult<()> {
        if let Some(v) = min_ess {
            if !v.is_finite() || v < 0.0 {
                return Err(MaxentError::InvalidOption {
                    name: "min_ess",
                    reason: "The effective sample size floor must be finite and non-negative.",
                });
            }
        }
        self.min_ess = min_ess;
        Ok(())
    }

    /// Number of points in the active sample set.
    ///
    /// # Errors
    /// `NoSampler` if nothing has been drawn or set.
    pub fn sample_size(&self) -> MaxentResult<usize> {
        Ok(self.active_blocks()?.iter().map(FeatureBlock::size).sum())
    }

    /// Pooled estimate on the active set at an arbitrary `θ`.
    ///
    /// The effective-sample-size floor is not applied here.
    ///
    /// # Errors
    /// `NoSampler`, `DimensionMismatch`, or a weight fault.
    pub fn estimate_at(&self, theta: ArrayView1<f64>) -> MaxentResult<ImportanceEstimate> {
        self.base.check_theta(theta)?;
        let blocks = self.active_blocks()?;
        let compute =
            || blocks.iter().map(|b| b.eval(theta)).collect::<MaxentResult<Vec<BlockEval>>>();
        self.cache.with(theta, compute, |evals| pool(blocks, evals))
    }

    /// Pooled estimate on the active set at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, or as [`BigModel::estimate_at`].
    pub fn estimate(&self) -> MaxentResult<ImportanceEstimate> {
        self.base.require_fitted()?;
        self.estimate_at(self.base.params().view())
    }

    /// Estimate on the `index`-th external set at the fitted `θ`,
    /// regardless of which set is active.
    ///
    /// # Errors
    /// `NotFitted`, `ExternalIndexOutOfRange`, or a weight fault.
    pub fn estimate_external(&self, index: usize) -> MaxentResult<ImportanceEstimate> {
        self.base.require_fitted()?;
        let block = self.externals.get(index).ok_or(MaxentError::ExternalIndexOutOfRange {
            index,
            len: self.externals.len(),
        })?;
        let eval = block.eval(self.base.params().view())?;
        Ok(pool(std::slice::from_ref(block), std::slice::from_ref(&eval)))
    }

    /// Effective sample size on the active set at the fitted `θ`.
    ///
    /// # Errors
    /// As [`BigModel::estimate`].
    pub fn effective_sample_size(&self) -> MaxentResult<f64> {
        Ok(self.estimate()?.ess)
    }

    /// Log-density of arbitrary points relative to the base measure.
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
    /// As [`BigModel::log_pdf_features`].
    pub fn pdf_features(
        &self, fx: ArrayView2<f64>, log_prior: Option<ArrayView1<f64>>,
    ) -> MaxentResult<Array1<f64>> {
        Ok(self.log_pdf_features(fx, log_prior)?.mapv(f64::exp))
    }

    /// Average negative log-density of the points in `fx`.
    ///
    /// # Errors
    /// As [`BigModel::log_pdf_features`].
    pub fn cross_entropy(
        &self, fx: ArrayView2<f64>, log_prior: Option<ArrayView1<f64>>,
    ) -> MaxentResult<f64> {
        let log_z = self.log_norm_const()?;
        scoring::cross_entropy(fx, log_prior, self.base.params().view(), log_z)
    }

    /// Fit by stochastic approximation, drawing a fresh sample before every
    /// gradient step.
    ///
    /// Binds `k` and warm-starts from the current `θ`. The run is recorded
    /// as [`BaseModel::last_outcome`] like a `fit`, with the dual on the last
    /// drawn sample as its value; `θ̂` is stored unless the outcome failed
    /// (a runaway `θ̂` or a dual that overflows there). The drawn sample of
    /// the last step stays in place.
    ///
    /// # Errors
    /// - `NoSampler` without an installed sampler.
    /// - `InvalidOption` while an external set is active.
    /// - `DimensionMismatch` / `NonFiniteConstraint` for a malformed `k`.
    /// - Sampler and estimation errors raised during the run.
    pub fn fit_stochastic(
        &mut self, k: Array1<f64>, opts: &StochasticOptions,
    ) -> MaxentResult<StochasticOutcome> {
        if self.sampler.is_none() {
            return Err(MaxentError::NoSampler);
        }
        if self.active_external.is_some() {
            return Err(MaxentError::InvalidOption {
                name: "external",
                reason: "Deselect the external sample set before stochastic fitting.",
            });
        }
        self.base.bind_constraints(k.clone())?;
        let theta0 = self.base.params().clone();
        tracing::debug!(iterations = opts.iterations, "stochastic fit of sampled model");

        let oracle = |theta: &Array1<f64>, _: usize| -> OptResult<Array1<f64>> {
            self.resample()?;
            Ok(self.grad_at(theta.view(), k.view())?)
        };
        let mut outcome = robbins_monro(oracle, theta0.clone(), opts)?;

        let fit = self.stochastic_fit_outcome(&outcome, theta0, k.view())?;
        outcome.status = fit.status.clone();
        if fit.status.is_failure() {
            tracing::warn!(
                status = %fit.status,
                iterations = outcome.iterations,
                "stochastic fit did not succeed; keeping previous parameters"
            );
        } else {
            tracing::debug!(
                status = %outcome.status,
                iterations = outcome.iterations,
                grad_norm = outcome.grad_norm,
                "stochastic fit finished"
            );
        }
        self.base.record_fit(&fit);
        Ok(outcome)
    }

    // ---- Helper Methods ----

    /// Fit record of a stochastic run: the dual at `θ̂` on the last sample,
    /// or a failure at `theta0` when that dual diverges.
    fn stochastic_fit_outcome(
        &self, run: &StochasticOutcome, theta0: Array1<f64>, k: ArrayView1<f64>,
    ) -> MaxentResult<FitOutcome> {
        let fn_evals = FnEvalMap::from([(GRADIENT_COUNT.to_string(), run.iterations as u64)]);
        match self.dual_at(run.theta_hat.view(), k) {
            Ok(value) => Ok(FitOutcome::new(
                Some(run.theta_hat.clone()),
                value,
                run.status.clone(),
                run.iterations as u64,
                fn_evals,
                Some(run.grad_norm),
                None,
            )?),
            Err(e @ (MaxentError::Divergence { .. } | MaxentError::Unbounded { .. })) => {
                Ok(FitOutcome {
                    theta_hat: theta0,
                    value: f64::NEG_INFINITY,
                    status: FitStatus::Failed { reason: e.to_string() },
                    iterations: run.iterations,
                    fn_evals,
                    grad_norm: Some(run.grad_norm),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn checked_block(&self, batch: SampleBatch) -> MaxentResult<FeatureBlock> {
        let block = batch.into_block()?;
        if block.num_features() != self.base.num_features() {
            return Err(MaxentError::DimensionMismatch {
                what: "sample feature rows",
                expected: self.base.num_features(),
                found: block.num_features(),
            });
        }
        Ok(block)
    }

    fn active_blocks(&self) -> MaxentResult<&[FeatureBlock]> {
        match self.active_external {
            Some(i) => self
                .externals
                .get(i)
                .map(std::slice::from_ref)
                .ok_or(MaxentError::ExternalIndexOutOfRange { index: i, len: self.externals.len() }),
            None if self.trials.is_empty() => Err(MaxentError::NoSampler),
            None => Ok(&self.trials),
        }
    }

    /// Estimate with the effective-sample-size floor applied.
    fn guarded_estimate_at(&self, theta: ArrayView1<f64>) -> MaxentResult<ImportanceEstimate> {
        let est = self.estimate_at(theta)?;
        if let Some(floor) = self.min_ess {
            if est.ess < floor {
                tracing::warn!(
                    ess = est.ess,
                    floor,
                    sample_size = est.sample_size,
                    "effective sample size below floor"
                );
                return Err(MaxentError::DegenerateSample { ess: est.ess, size: est.sample_size });
            }
        }
        Ok(est)
    }
}

impl MaxentModel for BigModel {
    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }

    fn log_norm_const_at(&self, theta: ArrayView1<f64>) -> MaxentResult<f64> {
        Ok(self.guarded_estimate_at(theta)?.log_z)
    }

    fn expectations_at(&self, theta: ArrayView1<f64>) -> MaxentResult<Array1<f64>> {
        Ok(self.guarded_estimate_at(theta)?.expectations)
    }

    /// Importance estimate of the entropy relative to the base measure.
    fn entropy(&self) -> MaxentResult<f64> {
        let est = self.estimate()?;
        Ok(est.log_z - est.expected_log_kernel)
    }
}

/// Pool per-batch reductions into one estimate.
///
/// With `L_t = log Σ_i w_ti`, the pooled `log Ẑ = log Σ_t exp(L_t) − log N`
/// and each batch's self-normalized quantities enter with weight
/// `exp(L_t − log Σ_s exp(L_s))`.
fn pool(blocks: &[FeatureBlock], evals: &[BlockEval]) -> ImportanceEstimate {
    let lse_t: Array1<f64> = evals.iter().map(|e| e.lse).collect();
    let lse_tot = log_sum_exp(lse_t.view());
    let sample_size: usize = blocks.iter().map(FeatureBlock::size).sum();
    let omega = normalized_weights(lse_t.view(), lse_tot);

    let per_batch: Vec<Array1<f64>> =
        evals.iter().zip(blocks).map(|(e, b)| e.expectations(b)).collect();
    let mut expectations = Array1::zeros(blocks.first().map_or(0, FeatureBlock::num_features));
    let mut expected_log_kernel = 0.0;
    for ((w, mu), (e, b)) in omega.iter().zip(&per_batch).zip(evals.iter().zip(blocks)) {
        expectations.scaled_add(*w, mu);
        expected_log_kernel += w * e.expected_log_kernel(b);
    }

    let lse2: Array1<f64> = evals.iter().map(BlockEval::lse_squared).collect();
    let ess = (2.0 * lse_tot - log_sum_exp(lse2.view())).exp();

    ImportanceEstimate {
        log_z: lse_tot - (sample_size as f64).ln(),
        expectations,
        ess,
        sample_size,
        expectations_std_err: std_err(&per_batch),
        expected_log_kernel,
    }
}

/// Standard error of the mean across batches; needs two or more.
fn std_err(per_batch: &[Array1<f64>]) -> Option<Array1<f64>> {
    let t = per_batch.len();
    if t < 2 {
        return None;
    }
    let mut mean = Array1::<f64>::zeros(per_batch[0].len());
    for mu in per_batch {
        mean += mu;
    }
    mean /= t as f64;
    let mut ss = Array1::<f64>::zeros(mean.len());
    for mu in per_batch {
        let d = mu - &mean;
        ss += &(&d * &d);
    }
    Some(ss.mapv(|s| (s / (t - 1) as f64).sqrt() / (t as f64).sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        maxent::models::model::Model,
        optimization::dual_optimizer::{Algorithm, FitOptions},
    };
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Agreement with the exact model when every point is "drawn" once
    //   from a uniform q.
    // - Sample management: missing sampler, resampling, batch pooling,
    //   external sets.
    // - The effective-sample-size floor.
    // - Recording of stochastic fits, including a runaway one.
    //
    // Random samplers are exercised in the integration tests.
    // -------------------------------------------------------------------------

    /// Each point of {0, 1, 2, 3} once, with `q` uniform.
    fn enumerated_batch() -> SampleBatch {
        SampleBatch::new(array![[0.0, 1.0, 2.0, 3.0]], Array1::from_elem(4, -(4.0_f64.ln())), None)
    }

    #[test]
    // Purpose
    // -------
    // With `q` uniform over the whole space and every point present once,
    // `Ẑ = Z` exactly, so dual and gradient coincide with the exact model.
    //
    // Given
    // -----
    // - Sample space {0, 1, 2, 3}, f(x) = x, θ = 0.4, K = 2.
    //
    // Expect
    // ------
    // - Equal duals and gradients; ESS of a uniform-θ sample equals 4 at θ = 0.
    fn enumerated_sample_matches_exact_model() {
        // Arrange
        let mut big = BigModel::new(1).unwrap();
        big.set_sample(enumerated_batch()).unwrap();
        let exact = Model::new(array![[0.0, 1.0, 2.0, 3.0]], None).unwrap();
        let theta = array![0.4];
        let k = array![2.0];

        // Act
        let d_big = big.dual_at(theta.view(), k.view()).unwrap();
        let d_exact = exact.dual_at(theta.view(), k.view()).unwrap();
        let g_big = big.grad_at(theta.view(), k.view()).unwrap();
        let g_exact = exact.grad_at(theta.view(), k.view()).unwrap();

        // Assert
        assert_relative_eq!(d_big, d_exact, epsilon = 1e-12);
        assert_relative_eq!(g_big[0], g_exact[0], epsilon = 1e-12);
        let at_zero = big.estimate_at(array![0.0].view()).unwrap();
        assert_relative_eq!(at_zero.ess, 4.0, epsilon = 1e-12);
        assert!(at_zero.expectations_std_err.is_none());
    }

    #[test]
    fn fit_on_fixed_sample_matches_exact_fit() {
        let mut big = BigModel::new(1).unwrap();
        big.set_sample(enumerated_batch()).unwrap();
        let mut exact = Model::new(array![[0.0, 1.0, 2.0, 3.0]], None).unwrap();
        let opts = FitOptions::with_algorithm(Algorithm::LBFGSB);

        big.fit(array![2.0], &opts).unwrap();
        exact.fit(array![2.0], &opts).unwrap();

        assert_relative_eq!(big.params()[0], exact.params()[0], epsilon = 1e-6);
        assert_relative_eq!(big.entropy().unwrap(), exact.entropy().unwrap(), epsilon = 1e-6);
    }

    #[test]
    fn evaluation_without_sample_fails() {
        let mut big = BigModel::new(1).unwrap();
        assert!(matches!(big.resample(), Err(MaxentError::NoSampler)));
        assert!(matches!(
            big.dual_at(array![0.0].view(), array![0.0].view()),
            Err(MaxentError::NoSampler)
        ));
        assert!(matches!(
            big.fit_stochastic(array![0.0], &StochasticOptions::default()),
            Err(MaxentError::NoSampler)
        ));
    }

    #[test]
    fn batches_with_wrong_feature_count_are_rejected() {
        let mut big = BigModel::new(2).unwrap();
        assert!(matches!(
            big.set_sample(enumerated_batch()),
            Err(MaxentError::DimensionMismatch { expected: 2, found: 1, .. })
        ));
        assert!(matches!(big.set_matrix_trials(0), Err(MaxentError::InvalidOption { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Several batches per resample are pooled, and their spread yields
    // standard errors.
    //
    // Given
    // -----
    // - A sampler alternating between the points {0, 1} and {2, 3}, both
    //   with log q = 0, three batches per resample, θ = 0.
    //
    // Expect
    // ------
    // - Pooled sample size 6, expectation (0.5·2 + 2.5) / 3.
    // - Standard error present and positive.
    fn matrix_trials_pool_batches() {
        // Arrange
        let mut big = BigModel::new(1).unwrap();
        big.set_matrix_trials(3).unwrap();
        let mut calls = 0_usize;
        let sampler = move || {
            calls += 1;
            let pts = if calls % 2 == 1 { array![[0.0, 1.0]] } else { array![[2.0, 3.0]] };
            Ok(SampleBatch::new(pts, Array1::zeros(2), None))
        };

        // Act
        big.set_sampler(sampler).unwrap();
        let est = big.estimate_at(array![0.0].view()).unwrap();

        // Assert
        assert_eq!(est.sample_size, 6);
        assert_relative_eq!(est.expectations[0], (0.5 * 2.0 + 2.5) / 3.0, epsilon = 1e-12);
        let se = est.expectations_std_err.unwrap();
        assert!(se[0] > 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Selecting an external set routes estimation to it and invalidates the
    // cached reduction.
    fn external_sets_drive_estimation_when_selected() {
        // Arrange
        let mut big = BigModel::new(1).unwrap();
        big.set_sample(enumerated_batch()).unwrap();
        let held_out = SampleBatch::new(array![[3.0, 3.0]], array![0.0, 0.0], None);
        let idx = big.add_external(held_out).unwrap();
        let theta = array![0.0];

        // Act
        let own = big.estimate_at(theta.view()).unwrap();
        big.set_external(Some(idx)).unwrap();
        let ext = big.estimate_at(theta.view()).unwrap();

        // Assert
        assert_relative_eq!(own.expectations[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(ext.expectations[0], 3.0, epsilon = 1e-12);
        assert_eq!(big.cache.computations(), 2);
        assert!(matches!(
            big.set_external(Some(5)),
            Err(MaxentError::ExternalIndexOutOfRange { index: 5, len: 1 })
        ));

        big.set_params(theta).unwrap();
        let direct = big.estimate_external(idx).unwrap();
        assert_eq!(direct.sample_size, 2);
    }

    #[test]
    // Purpose
    // -------
    // A sample whose weight concentrates on one point trips the ESS floor.
    //
    // Given
    // -----
    // - Points {0, 10} with log q = 0, θ = 2 (weights e^0 vs e^20).
    // - Floor 1.5.
    //
    // Expect
    // ------
    // - `DegenerateSample` from the dual; the unguarded estimate still works.
    fn ess_floor_reports_degenerate_sample() {
        let mut big = BigModel::new(1).unwrap();
        big.set_sample(SampleBatch::new(array![[0.0, 10.0]], array![0.0, 0.0], None)).unwrap();
        big.set_min_ess(Some(1.5)).unwrap();
        let theta = array![2.0];

        let res = big.dual_at(theta.view(), array![5.0].view());
        assert!(matches!(res, Err(MaxentError::DegenerateSample { size: 2, .. })));
        assert!(big.estimate_at(theta.view()).unwrap().ess < 1.5);
        assert!(matches!(big.set_min_ess(Some(-1.0)), Err(MaxentError::InvalidOption { .. })));
    }

    #[test]
    // Purpose
    // -------
    // A stochastic fit is recorded like a deterministic one.
    //
    // Given
    // -----
    // - The enumerated sample drawn on every step, K = 1.5, θ₀ = 0, where
    //   the estimated gradient is exactly zero.
    // - tol_grad 1e-12.
    //
    // Expect
    // ------
    // - Converged after one step; `last_outcome` carries the status and
    //   the dual ln 4; the model is fitted at θ = 0.
    fn stochastic_fit_is_recorded() {
        // Arrange
        let mut big = BigModel::new(1).unwrap();
        big.set_sampler(|| Ok(enumerated_batch())).unwrap();
        let opts = StochasticOptions::new(100, 0.5, 0.75, false, Some(1e-12)).unwrap();

        // Act
        let out = big.fit_stochastic(array![1.5], &opts).unwrap();

        // Assert
        assert_eq!(out.status, FitStatus::Converged);
        assert_eq!(out.iterations, 1);
        let recorded = big.base().last_outcome().unwrap();
        assert!(recorded.converged());
        assert_relative_eq!(recorded.value, 4.0_f64.ln(), epsilon = 1e-12);
        assert_eq!(recorded.fn_evals[GRADIENT_COUNT], 1);
        assert!(big.base().is_fitted());
        assert_eq!(big.params(), &array![0.0]);
    }

    #[test]
    // Purpose
    // -------
    // A target the sample cannot reach pushes θ without bound; the run is
    // reported as failed and its θ̂ is not stored.
    //
    // Given
    // -----
    // - Every draw is (1, 1, 1) with log q = 0, so E[f] = 1 for all θ.
    // - K = 2, 50 steps with a0 = 1e6 and no averaging.
    //
    // Expect
    // ------
    // - Status `Failed`, both returned and recorded.
    // - θ stays at 0 and the model is not fitted.
    fn runaway_stochastic_fit_is_not_persisted() {
        // Arrange
        let mut big = BigModel::new(1).unwrap();
        big.set_sampler(|| Ok(SampleBatch::new(array![[1.0, 1.0, 1.0]], Array1::zeros(3), None)))
            .unwrap();
        let opts = StochasticOptions::new(50, 1e6, 0.75, false, None).unwrap();

        // Act
        let out = big.fit_stochastic(array![2.0], &opts).unwrap();

        // Assert
        assert!(out.status.is_failure(), "status = {}", out.status);
        assert!(out.theta_hat[0] > 1e6);
        assert!(big.base().last_outcome().unwrap().status.is_failure());
        assert_eq!(big.params(), &array![0.0]);
        assert!(!big.base().is_fitted());
    }
}
