//! External sample generators for importance-sampled models.
//!
//! A generator draws points from an auxiliary distribution `q` and hands
//! back their features together with `log q` (and optionally the prior
//! `log p0`) at each point. The model never looks inside the generator; it
//! only asks for a fresh [`SampleBatch`] when told to resample.
use ndarray::{Array1, Array2};

use crate::maxent::{core::block::FeatureBlock, errors::MaxentResult};

/// One draw of `n` points: features (m × n), `log q` (n), optional `log p0` (n).
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub features: Array2<f64>,
    pub log_aux: Array1<f64>,
    pub log_prior: Option<Array1<f64>>,
}

impl SampleBatch {
    pub fn new(
        features: Array2<f64>, log_aux: Array1<f64>, log_prior: Option<Array1<f64>>,
    ) -> Self {
        Self { features, log_aux, log_prior }
    }

    /// Validate the batch and turn it into a sampled [`FeatureBlock`].
    ///
    /// # Errors
    /// Any validation error of [`FeatureBlock::sampled`].
    pub fn into_block(self) -> MaxentResult<FeatureBlock> {
        FeatureBlock::sampled(self.features, self.log_aux, self.log_prior)
    }
}

/// Source of fresh sample batches.
///
/// Closures `FnMut() -> MaxentResult<SampleBatch>` implement this trait, so
/// a sampler can be installed as
///
/// ```
/// use maxentropy::maxent::core::sampler::{SampleBatch, SampleGenerator};
/// use ndarray::{Array1, Array2};
///
/// let mut gen = || Ok(SampleBatch::new(Array2::zeros((1, 4)), Array1::zeros(4), None));
/// let batch = gen.draw()?;
/// assert_eq!(batch.features.ncols(), 4);
/// # Ok::<(), maxentropy::maxent::errors::MaxentError>(())
/// ```
pub trait SampleGenerator: Send {
    fn draw(&mut self) -> MaxentResult<SampleBatch>;
}

impl<G> SampleGenerator for G
where
    G: FnMut() -> MaxentResult<SampleBatch> + Send,
{
    fn draw(&mut self) -> MaxentResult<SampleBatch> {
        self()
    }
}
