//! Last-evaluation cache keyed by θ.
//!
//! Optimizers typically ask for the dual and then the gradient at the same
//! `θ`. Both are read from the same block reductions, so the reductions of
//! the most recent `θ` are kept and reused while `θ` compares equal.
//! Any change of the underlying points (resampling, switching the active
//! sample set) must call [`EvalCache::invalidate`].
use std::cell::{Cell, RefCell};

use ndarray::{Array1, ArrayView1};

use crate::maxent::{core::block::BlockEval, errors::MaxentResult};

#[derive(Debug, Clone, PartialEq)]
struct CachedEval {
    theta: Array1<f64>,
    evals: Vec<BlockEval>,
}

/// Single-slot cache of block evaluations.
#[derive(Debug, Default)]
pub struct EvalCache {
    slot: RefCell<Option<CachedEval>>,
    computations: Cell<u64>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `read` on the evaluations at `theta`, computing them with
    /// `compute` on a miss.
    ///
    /// `compute` and `read` must not touch this cache.
    ///
    /// # Errors
    /// Propagates errors from `compute`; the slot is left empty in that case.
    pub fn with<R>(
        &self, theta: ArrayView1<f64>, compute: impl FnOnce() -> MaxentResult<Vec<BlockEval>>,
        read: impl FnOnce(&[BlockEval]) -> R,
    ) -> MaxentResult<R> {
        let mut slot = self.slot.borrow_mut();
        let cached = match slot.take() {
            Some(c) if c.theta.view() == theta => c,
            _ => {
                self.computations.set(self.computations.get() + 1);
                CachedEval { theta: theta.to_owned(), evals: compute()? }
            }
        };
        let out = read(&cached.evals);
        *slot = Some(cached);
        Ok(out)
    }

    /// Drop the cached evaluations.
    pub fn invalidate(&self) {
        self.slot.replace(None);
    }

    /// Number of cache misses so far.
    pub fn computations(&self) -> u64 {
        self.computations.get()
    }
}

impl Clone for EvalCache {
    /// Clones start cold.
    fn clone(&self) -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maxent::core::block::FeatureBlock;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // Repeated reads at an equal θ compute once; a new θ or an explicit
    // invalidation recomputes.
    fn cache_is_keyed_by_theta_equality() {
        let block = FeatureBlock::exact(array![[0.0, 1.0]], None).unwrap();
        let cache = EvalCache::new();
        let t1 = array![0.2];
        let t2 = array![0.4];
        let compute = |t: &Array1<f64>| {
            let b = &block;
            let t = t.clone();
            move || b.eval(t.view()).map(|e| vec![e])
        };

        let z1 = cache.with(t1.view(), compute(&t1), |e| e[0].log_z).unwrap();
        let z1_again = cache.with(t1.view(), compute(&t1), |e| e[0].log_z).unwrap();
        assert_eq!(z1, z1_again);
        assert_eq!(cache.computations(), 1);

        cache.with(t2.view(), compute(&t2), |e| e[0].log_z).unwrap();
        assert_eq!(cache.computations(), 2);

        cache.invalidate();
        cache.with(t2.view(), compute(&t2), |e| e[0].log_z).unwrap();
        assert_eq!(cache.computations(), 3);
    }
}
