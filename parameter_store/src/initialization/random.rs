use rand::Rng;
use rand_distr::{Distribution, Uniform};

use super::ParamGen;
use crate::{Result, StoreErr};

/// Generates values drawn from a probability distribution.
pub struct RandParamGen<R: Rng, D: Distribution<f32>> {
    rng: R,
    distribution: D,
    left: usize,
}

impl<R: Rng, D: Distribution<f32>> RandParamGen<R, D> {
    /// Creates a new `RandParamGen`.
    ///
    /// # Arguments
    /// * `rng` - The random number generator, seeded by the caller.
    /// * `distribution` - The distribution to sample from.
    /// * `len` - How many values to generate in total.
    pub fn new(rng: R, distribution: D, len: usize) -> Self {
        Self {
            rng,
            distribution,
            left: len,
        }
    }
}

impl<R: Rng> RandParamGen<R, Uniform<f32>> {
    /// Creates a new `RandParamGen` sampling uniformly from `[-range, range)`.
    ///
    /// # Returns
    /// An `InvalidDistribution` error if `range` isn't positive and finite.
    pub fn symmetric(rng: R, len: usize, range: f32) -> Result<Self> {
        let distribution = Uniform::new(-range, range)
            .map_err(|e| StoreErr::InvalidDistribution(e.to_string()))?;

        Ok(Self::new(rng, distribution, len))
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<R, D> {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.left == 0 {
            return None;
        }

        let n = n.min(self.left);
        self.left -= n;

        let sample = (0..n)
            .map(|_| self.distribution.sample(&mut self.rng))
            .collect();

        Some(sample)
    }
}
