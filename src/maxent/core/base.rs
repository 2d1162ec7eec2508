//! Shared model state and the generic fitting loop.
//!
//! Purpose
//! -------
//! [`BaseModel`] holds what every max-ent model carries regardless of how
//! its normalizer is computed: the parameter vector `θ`, the bound target
//! expectations `K`, the optional Gaussian smoothing variance `σ²`, the
//! divergence guard, and fit bookkeeping. [`MaxentModel`] is the capability
//! trait the three model variants implement; the dual, its gradient, and
//! `fit` are written once against it.
//!
//! Key behaviors
//! -------------
//! - `dual(θ) = log Z(θ) − θ·K [+ ‖θ‖²/(2σ²)]`.
//! - `grad(θ) = E_θ[f] − K [+ θ/σ²]`.
//! - `fit` warm-starts from the current `θ`, minimizes the dual through
//!   [`minimize`], and only overwrites `θ` when the solver did not break
//!   down.
//!
//! Invariants & assumptions
//! ------------------------
//! - `len(θ) == len(K) == num_features` at all times.
//! - Solver breakdowns (line-search failure, divergence) are reported as
//!   [`FitStatus::Failed`]; numerical faults of the objective abort the fit
//!   with an error.
use ndarray::{Array1, ArrayView1};

use crate::{
    maxent::errors::{MaxentError, MaxentResult},
    optimization::{
        dual_optimizer::{
            DualObjective, FitOptions, FitStatus, FnEvalMap, GradientCheck, OptimOutcome, Theta,
            check_gradient, minimize, validation::validate_theta_input,
        },
        errors::{OptError, OptResult},
    },
};

/// Result of one call to [`MaxentModel::fit`].
pub type FitOutcome = OptimOutcome;

/// Lifecycle of a model's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    /// `θ` has never been fitted or set.
    Unfit,
    /// `θ` came from a successful fit or an explicit `set_params`.
    Fitted,
}

/// State shared by every max-ent model.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseModel {
    num_features: usize,
    params: Array1<f64>,
    constraints: Option<Array1<f64>>,
    sigma2: Option<f64>,
    min_dual: Option<f64>,
    state: FitState,
    last_outcome: Option<FitOutcome>,
}

impl BaseModel {
    /// Fresh, unfitted state with `θ = 0`.
    ///
    /// # Errors
    /// `InvalidOption` if `num_features == 0`.
    pub fn new(num_features: usize) -> MaxentResult<Self> {
        if num_features == 0 {
            return Err(MaxentError::InvalidOption {
                name: "num_features",
                reason: "A model needs at least one feature.",
            });
        }
        Ok(Self {
            num_features,
            params: Array1::zeros(num_features),
            constraints: None,
            sigma2: None,
            min_dual: None,
            state: FitState::Unfit,
            last_outcome: None,
        })
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn params(&self) -> &Array1<f64> {
        &self.params
    }

    /// Set `θ` explicitly; the model becomes queryable.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `theta.len() != num_features`.
    /// - `Optimization(InvalidThetaInput)` for a non-finite entry.
    pub fn set_params(&mut self, theta: Array1<f64>) -> MaxentResult<()> {
        self.check_len(theta.len(), "parameter vector")?;
        validate_theta_input(&theta)?;
        self.params = theta;
        self.state = FitState::Fitted;
        Ok(())
    }

    /// Back to `θ = 0`, unfitted, no bound constraints.
    pub fn reset(&mut self) {
        self.params.fill(0.0);
        self.constraints = None;
        self.state = FitState::Unfit;
        self.last_outcome = None;
    }

    pub fn constraints(&self) -> Option<&Array1<f64>> {
        self.constraints.as_ref()
    }

    /// Bind the target expectations `K`.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `k.len() != num_features`.
    /// - `NonFiniteConstraint` for the first NaN or infinite entry.
    pub fn bind_constraints(&mut self, k: Array1<f64>) -> MaxentResult<()> {
        self.validate_constraints(k.view())?;
        self.constraints = Some(k);
        Ok(())
    }

    pub fn smoothing(&self) -> Option<f64> {
        self.sigma2
    }

    /// Set (or clear) the Gaussian smoothing variance `σ²`.
    ///
    /// # Errors
    /// `InvalidSmoothing` unless `σ²` is finite and positive.
    pub fn set_smoothing(&mut self, sigma2: Option<f64>) -> MaxentResult<()> {
        if let Some(value) = sigma2 {
            if !value.is_finite() || value <= 0.0 {
                return Err(MaxentError::InvalidSmoothing { value });
            }
        }
        self.sigma2 = sigma2;
        Ok(())
    }

    pub fn min_dual(&self) -> Option<f64> {
        self.min_dual
    }

    /// Dual values below `min_dual` are reported as `Divergence`.
    pub fn set_min_dual(&mut self, min_dual: Option<f64>) {
        self.min_dual = min_dual;
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn is_fitted(&self) -> bool {
        self.state == FitState::Fitted
    }

    /// # Errors
    /// `NotFitted` unless the model has been fitted or parameterized.
    pub fn require_fitted(&self) -> MaxentResult<()> {
        if self.is_fitted() { Ok(()) } else { Err(MaxentError::NotFitted) }
    }

    pub fn last_outcome(&self) -> Option<&FitOutcome> {
        self.last_outcome.as_ref()
    }

    /// # Errors
    /// `DimensionMismatch` if `theta.len() != num_features`.
    pub fn check_theta(&self, theta: ArrayView1<f64>) -> MaxentResult<()> {
        self.check_len(theta.len(), "parameter vector")
    }

    /// `‖θ‖²/(2σ²)`, or zero without smoothing.
    pub fn dual_penalty(&self, theta: ArrayView1<f64>) -> f64 {
        self.sigma2.map_or(0.0, |s2| theta.dot(&theta) / (2.0 * s2))
    }

    /// Add `θ/σ²` to `g` when smoothing is active.
    pub fn add_grad_penalty(&self, theta: ArrayView1<f64>, g: &mut Array1<f64>) {
        if let Some(s2) = self.sigma2 {
            g.scaled_add(1.0 / s2, &theta);
        }
    }

    // ---- Helper Methods ----

    fn check_len(&self, found: usize, what: &'static str) -> MaxentResult<()> {
        if found != self.num_features {
            return Err(MaxentError::DimensionMismatch {
                what,
                expected: self.num_features,
                found,
            });
        }
        Ok(())
    }

    fn validate_constraints(&self, k: ArrayView1<f64>) -> MaxentResult<()> {
        self.check_len(k.len(), "target expectations")?;
        if let Some((index, &value)) = k.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(MaxentError::NonFiniteConstraint { index, value });
        }
        Ok(())
    }

    /// Store `θ̂` unless the outcome failed, and keep the outcome.
    pub(crate) fn record_fit(&mut self, outcome: &FitOutcome) {
        if !outcome.status.is_failure() {
            self.params = outcome.theta_hat.clone();
            self.state = FitState::Fitted;
        }
        self.last_outcome = Some(outcome.clone());
    }
}

/// Capability shared by exact, sampled, and conditional models.
///
/// Implementors provide the log normalizer and the feature expectations at
/// an arbitrary `θ`, plus the entropy at the current `θ`. Everything else
/// (dual, gradient, smoothing, divergence guard, fitting) is provided.
pub trait MaxentModel {
    fn base(&self) -> &BaseModel;
    fn base_mut(&mut self) -> &mut BaseModel;

    /// `log Z(θ)` (exact) or its importance estimate.
    fn log_norm_const_at(&self, theta: ArrayView1<f64>) -> MaxentResult<f64>;

    /// `E_θ[f]` (exact) or its self-normalized estimate.
    fn expectations_at(&self, theta: ArrayView1<f64>) -> MaxentResult<Array1<f64>>;

    /// Entropy of the fitted distribution.
    fn entropy(&self) -> MaxentResult<f64>;

    fn num_features(&self) -> usize {
        self.base().num_features()
    }

    /// Dual at `theta` against an explicit `k`.
    ///
    /// # Errors
    /// - `DimensionMismatch` for mismatched `theta` or `k`.
    /// - `Divergence` if the value falls below the configured `min_dual`.
    /// - `Unbounded` if the value overflows.
    /// - Any evaluation error of the implementor.
    fn dual_at(&self, theta: ArrayView1<f64>, k: ArrayView1<f64>) -> MaxentResult<f64> {
        let base = self.base();
        base.check_theta(theta)?;
        base.validate_constraints(k)?;
        let value = self.log_norm_const_at(theta)? - theta.dot(&k) + base.dual_penalty(theta);
        if !value.is_finite() {
            return Err(MaxentError::Unbounded { value });
        }
        if let Some(min_dual) = base.min_dual() {
            if value < min_dual {
                return Err(MaxentError::Divergence { dual: value, min_dual });
            }
        }
        Ok(value)
    }

    /// Gradient of [`MaxentModel::dual_at`].
    ///
    /// # Errors
    /// As [`MaxentModel::dual_at`], without the divergence check.
    fn grad_at(&self, theta: ArrayView1<f64>, k: ArrayView1<f64>) -> MaxentResult<Array1<f64>> {
        let base = self.base();
        base.check_theta(theta)?;
        base.validate_constraints(k)?;
        let mut g = self.expectations_at(theta)? - &k;
        base.add_grad_penalty(theta, &mut g);
        Ok(g)
    }

    /// Dual at `theta` against the bound `K`.
    ///
    /// # Errors
    /// `ConstraintsNotSet` before the first `fit`, otherwise as
    /// [`MaxentModel::dual_at`].
    fn dual(&self, theta: ArrayView1<f64>) -> MaxentResult<f64> {
        let k = self.base().constraints().ok_or(MaxentError::ConstraintsNotSet)?;
        self.dual_at(theta, k.view())
    }

    /// # Errors
    /// As [`MaxentModel::dual`].
    fn grad(&self, theta: ArrayView1<f64>) -> MaxentResult<Array1<f64>> {
        let k = self.base().constraints().ok_or(MaxentError::ConstraintsNotSet)?;
        self.grad_at(theta, k.view())
    }

    fn params(&self) -> &Array1<f64> {
        self.base().params()
    }

    /// # Errors
    /// As [`BaseModel::set_params`].
    fn set_params(&mut self, theta: Array1<f64>) -> MaxentResult<()> {
        self.base_mut().set_params(theta)
    }

    fn reset(&mut self) {
        self.base_mut().reset();
    }

    /// # Errors
    /// As [`BaseModel::set_smoothing`].
    fn set_smoothing(&mut self, sigma2: Option<f64>) -> MaxentResult<()> {
        self.base_mut().set_smoothing(sigma2)
    }

    fn set_min_dual(&mut self, min_dual: Option<f64>) {
        self.base_mut().set_min_dual(min_dual);
    }

    /// Feature expectations at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, or any evaluation error.
    fn expectations(&self) -> MaxentResult<Array1<f64>> {
        self.base().require_fitted()?;
        self.expectations_at(self.params().view())
    }

    /// `log Z` at the fitted `θ`.
    ///
    /// # Errors
    /// `NotFitted`, or any evaluation error.
    fn log_norm_const(&self) -> MaxentResult<f64> {
        self.base().require_fitted()?;
        self.log_norm_const_at(self.params().view())
    }

    /// `KL(p_θ ‖ p0) = θ·E_θ[f] − log Z(θ)`.
    ///
    /// Without a prior, `p0` is the uniform (counting) measure and this is
    /// `log |X| − H` for an exact model.
    ///
    /// # Errors
    /// `NotFitted`, or any evaluation error.
    fn kl_to_prior(&self) -> MaxentResult<f64> {
        self.base().require_fitted()?;
        let theta = self.params().view();
        let mu = self.expectations_at(theta)?;
        Ok(theta.dot(&mu) - self.log_norm_const_at(theta)?)
    }

    /// Compare [`MaxentModel::grad`] with a central finite difference of
    /// [`MaxentModel::dual`] at `theta`.
    ///
    /// # Errors
    /// `ConstraintsNotSet`, or the first evaluation error.
    fn check_grad(&self, theta: ArrayView1<f64>) -> MaxentResult<GradientCheck> {
        let k = self.base().constraints().ok_or(MaxentError::ConstraintsNotSet)?.clone();
        Ok(check_gradient(&DualProblem { model: self }, &theta.to_owned(), &k)?)
    }

    /// Fit `θ` so that the model expectations match `k`.
    ///
    /// Binds `k`, warm-starts from the current `θ` and minimizes the dual
    /// with the strategy in `opts`. On a [`FitStatus::Failed`] outcome the
    /// previous `θ` is kept; this includes infeasible targets, where the
    /// dual diverges or `θ` runs away. The outcome is returned and also retained as
    /// [`BaseModel::last_outcome`].
    ///
    /// # Errors
    /// - `DimensionMismatch` / `NonFiniteConstraint` for a malformed `k`.
    /// - Numerical faults of the objective (`InvalidDensity`,
    ///   `DegenerateSample`, ...).
    /// - Optimizer configuration errors wrapped in `Optimization`.
    fn fit(&mut self, k: Array1<f64>, opts: &FitOptions) -> MaxentResult<FitOutcome> {
        self.base_mut().bind_constraints(k.clone())?;
        let theta0 = self.params().clone();
        tracing::debug!(
            algorithm = ?opts.algorithm,
            num_features = self.num_features(),
            "fitting max-ent model"
        );

        let result = minimize(&DualProblem { model: &*self }, theta0.clone(), &k, opts);
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) if e.is_divergence() => diverged_at_start(theta0, e),
            Err(e) => return Err(e.into()),
        };

        if outcome.status.is_failure() {
            tracing::warn!(
                status = %outcome.status,
                iterations = outcome.iterations,
                "fit did not succeed; keeping previous parameters"
            );
        } else {
            tracing::debug!(
                status = %outcome.status,
                dual = outcome.value,
                iterations = outcome.iterations,
                grad_norm = ?outcome.grad_norm,
                "fit finished"
            );
        }
        self.base_mut().record_fit(&outcome);
        Ok(outcome)
    }
}

/// Exposes a model's dual to the optimizer. `Data` is the bound `K`.
#[derive(Debug)]
pub struct DualProblem<'a, M: ?Sized> {
    pub model: &'a M,
}

impl<'a, M: MaxentModel + ?Sized> DualObjective for DualProblem<'a, M> {
    type Data = Array1<f64>;

    fn value(&self, theta: &Theta, data: &Self::Data) -> OptResult<f64> {
        Ok(self.model.dual_at(theta.view(), data.view())?)
    }

    fn check(&self, theta: &Theta, data: &Self::Data) -> OptResult<()> {
        let base = self.model.base();
        base.check_theta(theta.view())?;
        base.validate_constraints(data.view())?;
        Ok(())
    }

    fn grad(&self, theta: &Theta, data: &Self::Data) -> OptResult<Theta> {
        Ok(self.model.grad_at(theta.view(), data.view())?)
    }
}

// ---- Helper Methods ----

fn diverged_at_start(theta0: Theta, err: OptError) -> FitOutcome {
    let value = match err {
        OptError::Divergence { dual, .. } => dual,
        _ => f64::NEG_INFINITY,
    };
    FitOutcome {
        theta_hat: theta0,
        value,
        status: FitStatus::Failed { reason: MaxentError::from(err).to_string() },
        iterations: 0,
        fn_evals: FnEvalMap::new(),
        grad_norm: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::dual_optimizer::Algorithm;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - BaseModel bookkeeping (params, constraints, smoothing).
    // - The provided dual/grad, smoothing, and divergence guard.
    // - `fit` on a closed-form model, including failure handling.
    //
    // The closed-form model is a single Bernoulli feature on {0, 1}:
    // log Z = ln(1 + e^θ), E[f] = σ(θ).
    // -------------------------------------------------------------------------

    struct Coin {
        base: BaseModel,
    }

    impl Coin {
        fn new() -> Self {
            Self { base: BaseModel::new(1).unwrap() }
        }
    }

    impl MaxentModel for Coin {
        fn base(&self) -> &BaseModel {
            &self.base
        }
        fn base_mut(&mut self) -> &mut BaseModel {
            &mut self.base
        }
        fn log_norm_const_at(&self, theta: ArrayView1<f64>) -> MaxentResult<f64> {
            Ok((1.0 + theta[0].exp()).ln())
        }
        fn expectations_at(&self, theta: ArrayView1<f64>) -> MaxentResult<Array1<f64>> {
            Ok(array![1.0 / (1.0 + (-theta[0]).exp())])
        }
        fn entropy(&self) -> MaxentResult<f64> {
            let p = self.expectations()?[0];
            Ok(-(p * p.ln() + (1.0 - p) * (1.0 - p).ln()))
        }
    }

    #[test]
    fn base_rejects_bad_inputs() {
        assert!(matches!(BaseModel::new(0), Err(MaxentError::InvalidOption { .. })));
        let mut base = BaseModel::new(2).unwrap();
        assert!(matches!(
            base.set_params(array![1.0]),
            Err(MaxentError::DimensionMismatch { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            base.bind_constraints(array![0.0, f64::NAN]),
            Err(MaxentError::NonFiniteConstraint { index: 1, .. })
        ));
        assert!(matches!(
            base.set_smoothing(Some(0.0)),
            Err(MaxentError::InvalidSmoothing { .. })
        ));
        assert!(matches!(base.require_fitted(), Err(MaxentError::NotFitted)));
    }

    #[test]
    fn set_params_makes_model_queryable_and_reset_clears() {
        let mut coin = Coin::new();
        assert!(matches!(coin.expectations(), Err(MaxentError::NotFitted)));
        coin.set_params(array![0.0]).unwrap();
        assert_relative_eq!(coin.expectations().unwrap()[0], 0.5);
        coin.reset();
        assert_eq!(coin.base().state(), FitState::Unfit);
        assert!(coin.base().constraints().is_none());
    }

    #[test]
    // Purpose
    // -------
    // The smoothing term adds `θ²/(2σ²)` to the dual and `θ/σ²` to the
    // gradient.
    //
    // Given
    // -----
    // - θ = 2, K = 0.5, σ² = 4.
    //
    // Expect
    // ------
    // - dual = ln(1 + e²) − 1 + 0.5.
    // - grad = σ(2) − 0.5 + 0.5.
    fn smoothing_penalizes_dual_and_gradient() {
        let mut coin = Coin::new();
        coin.set_smoothing(Some(4.0)).unwrap();
        let theta = array![2.0];
        let k = array![0.5];

        let d = coin.dual_at(theta.view(), k.view()).unwrap();
        let g = coin.grad_at(theta.view(), k.view()).unwrap();

        assert_relative_eq!(d, (1.0 + 2.0_f64.exp()).ln() - 1.0 + 0.5, epsilon = 1e-12);
        assert_relative_eq!(g[0], 1.0 / (1.0 + (-2.0_f64).exp()), epsilon = 1e-12);
    }

    #[test]
    fn dual_requires_bound_constraints() {
        let coin = Coin::new();
        assert!(matches!(coin.dual(array![0.0].view()), Err(MaxentError::ConstraintsNotSet)));
        assert!(matches!(coin.check_grad(array![0.0].view()), Err(MaxentError::ConstraintsNotSet)));
    }

    #[test]
    // Purpose
    // -------
    // `fit` drives the dual to its minimum and stores θ̂.
    //
    // Given
    // -----
    // - K = 0.8, BFGS.
    //
    // Expect
    // ------
    // - θ̂ = logit(0.8) = ln 4, E[f] = 0.8, status converged.
    fn fit_matches_target_expectation() {
        // Arrange
        let mut coin = Coin::new();
        let opts = FitOptions::with_algorithm(Algorithm::BFGS);

        // Act
        let out = coin.fit(array![0.8], &opts).unwrap();

        // Assert
        assert!(out.converged(), "status = {}", out.status);
        assert_relative_eq!(coin.params()[0], 4.0_f64.ln(), epsilon = 1e-5);
        assert_relative_eq!(coin.expectations().unwrap()[0], 0.8, epsilon = 1e-6);
        assert_eq!(coin.base().last_outcome(), Some(&out));
        let check = coin.check_grad(coin.params().view()).unwrap();
        assert!(check.passes(1e-6), "max error = {}", check.max_abs_error);
    }

    #[test]
    fn fit_rejects_wrong_length_targets() {
        let mut coin = Coin::new();
        let res = coin.fit(array![0.5, 0.5], &FitOptions::default());
        assert!(matches!(res, Err(MaxentError::DimensionMismatch { expected: 1, found: 2, .. })));
    }

    #[test]
    // Purpose
    // -------
    // An infeasible target (E[f] = 1 is only reached as θ → ∞) trips the
    // divergence guard; the fit reports `Failed` and keeps the old θ.
    //
    // Given
    // -----
    // - K = 1, so dual(θ) = ln(1 + e^−θ), decreasing towards 0.
    // - min_dual = 0.5, crossed near θ = 0.43.
    // - Every strategy, the simplex and direction-set ones included.
    //
    // Expect
    // ------
    // - Status `Failed`; θ unchanged; model stays unfitted.
    fn divergence_guard_reports_failure() {
        for algorithm in [
            Algorithm::NelderMead,
            Algorithm::Powell,
            Algorithm::CG,
            Algorithm::BFGS,
            Algorithm::LBFGSB,
        ] {
            // Arrange
            let mut coin = Coin::new();
            coin.set_min_dual(Some(0.5));
            let opts = FitOptions::with_algorithm(algorithm);

            // Act
            let out = coin
                .fit(array![1.0], &opts)
                .unwrap_or_else(|e| panic!("{algorithm:?} errored: {e}"));

            // Assert
            assert!(out.status.is_failure(), "{algorithm:?}: status = {}", out.status);
            assert_eq!(coin.params()[0], 0.0);
            assert!(!coin.base().is_fitted());
        }
    }

    #[test]
    // Purpose
    // -------
    // A divergent start is reported as a failed outcome at the start point,
    // not as an error.
    fn divergent_start_is_a_failed_outcome() {
        let mut coin = Coin::new();
        coin.set_min_dual(Some(5.0));

        let out = coin.fit(array![0.3], &FitOptions::default()).unwrap();

        assert!(out.status.is_failure());
        assert_eq!(out.theta_hat, array![0.0]);
        assert_relative_eq!(out.value, 2.0_f64.ln());
        assert!(coin.base().last_outcome().is_some());
        assert!(!coin.base().is_fitted());
    }
}
