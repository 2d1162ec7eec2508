//! maxent — maximum-entropy and minimum-KL models fitted by convex duality.
//!
//! Purpose
//! -------
//! Fit distributions `p(x) ∝ p0(x) exp(θ·f(x))` whose feature expectations
//! match a target vector `K`. Without a prior `p0` the fit maximizes
//! entropy; with one it minimizes `KL(p ‖ p0)`. In both cases the
//! parameters minimize the convex dual `log Z(θ) − θ·K`.
//!
//! Key behaviors
//! -------------
//! - [`core`]: feature blocks, the θ-keyed evaluation cache, the sampler
//!   contract, and [`BaseModel`] / [`MaxentModel`] with the generic `fit`.
//! - [`models`]: [`Model`] (exact), [`BigModel`] (importance-sampled),
//!   [`ConditionalModel`] (per-context normalizers).
//! - [`errors`]: [`MaxentError`] / [`MaxentResult`].
//!
//! Invariants & assumptions
//! ------------------------
//! - `len(θ) == len(K) == num_features`; mismatches are errors, never
//!   truncations.
//! - Feature values are finite. Log-densities are finite or `-inf`.
//! - Every reduction over `exp(θ·f)` is max-shifted.
//! - Sampled models never resample inside an optimizer run.
//!
//! Conventions
//! -----------
//! - Feature matrices are (features × points), one column per point.
//! - Query methods act on the current `θ` and require a fitted (or
//!   explicitly parameterized) model.
//! - Fits emit `tracing` events: start and finish at `debug`, failed fits
//!   and collapsed importance samples at `warn`.
//!
//! Downstream usage
//! ----------------
//! - Typical flow:
//!   1. Build a model from a feature matrix (or install a sampler).
//!   2. Call `fit(K, &FitOptions)` and inspect the returned outcome.
//!   3. Query `pmf`, `expectations`, `entropy`, or score new points.
//! - `use maxentropy::maxent::prelude::*;` brings in the models, the trait,
//!   the option types, and the errors.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to each module; end-to-end scenarios live in
//!   `tests/`.

pub mod core;
pub mod errors;
pub mod models;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{
    BaseModel, FeatureBlock, FitOutcome, FitState, MaxentModel, SampleBatch, SampleGenerator,
};
pub use self::errors::{MaxentError, MaxentResult};
pub use self::models::{BigModel, ConditionalModel, ImportanceEstimate, Model};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use maxentropy::maxent::prelude::*;
//
// to import the main modeling surface in a single line.

pub mod prelude {
    pub use super::{
        BaseModel, BigModel, ConditionalModel, FeatureBlock, FitOutcome, FitState,
        ImportanceEstimate, MaxentError, MaxentModel, MaxentResult, Model, SampleBatch,
        SampleGenerator,
    };
    pub use crate::optimization::dual_optimizer::{
        Algorithm, FitOptions, FitStatus, LineSearcher, Tolerances,
    };
    pub use crate::optimization::stochastic::{StochasticOptions, StochasticOutcome};
}
