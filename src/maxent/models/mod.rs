//! models — the three max-ent model variants.
//!
//! Purpose
//! -------
//! Implement [`MaxentModel`](crate::maxent::core::MaxentModel) for an exact
//! sample space ([`Model`]), an importance-sampled one ([`BigModel`]), and a
//! family of per-context distributions sharing one parameter vector
//! ([`ConditionalModel`]).
//!
//! Key behaviors
//! -------------
//! - [`model`]: exact sums, pmf / log-pmf, scoring of new points.
//! - [`big_model`]: sampler installation, explicit resampling, batch
//!   pooling, external sample sets, effective sample size, stochastic
//!   approximation fitting.
//! - [`conditional`]: per-context normalizers, construction from counts,
//!   pooled targets.
//! - [`scoring`]: log-density of arbitrary points under a fitted `θ`.
//!
//! Testing notes
//! -------------
//! - Unit tests compare the sampled and conditional models against the
//!   exact model in the cases where they must coincide.
//! - Integration tests under `tests/` add random samplers and brute-force
//!   entropy checks.

pub mod big_model;
pub mod conditional;
pub mod model;
pub mod scoring;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::big_model::{BigModel, ImportanceEstimate};
pub use self::conditional::ConditionalModel;
pub use self::model::Model;

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use maxentropy::maxent::models::prelude::*;
//
// to import the model types in a single line.

pub mod prelude {
    pub use super::big_model::{BigModel, ImportanceEstimate};
    pub use super::conditional::ConditionalModel;
    pub use super::model::Model;
}
