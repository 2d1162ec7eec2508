//! core — building blocks shared by every max-ent model.
//!
//! - [`block`]: feature blocks (exact or importance-sampled) and their
//!   per-θ reductions.
//! - [`cache`]: single-slot evaluation cache keyed by θ.
//! - [`sampler`]: the external sample-generator contract.
//! - [`base`]: [`BaseModel`](base::BaseModel) state and the
//!   [`MaxentModel`](base::MaxentModel) trait with the generic `fit` loop.
pub mod base;
pub mod block;
pub mod cache;
pub mod sampler;

pub use self::base::{BaseModel, DualProblem, FitOutcome, FitState, MaxentModel};
pub use self::block::{BlockEval, FeatureBlock};
pub use self::cache::EvalCache;
pub use self::sampler::{SampleBatch, SampleGenerator};
