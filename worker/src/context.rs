use rand::{SeedableRng, rngs::StdRng};

use crate::Precision;

/// The numeric execution context of a single pool thread.
///
/// Agents run their math on the thread that owns them and never spawn compute threads. Each
/// thread gets its own deterministic random stream, seeded with `base_seed * thread_index`, so
/// workers follow independent trajectories that are reproducible given the seed and the amount
/// of threads.
#[derive(Debug, Clone)]
pub struct NumericContext {
    thread_index: usize,
    seed: u64,
    precision: Precision,
    rng: StdRng,
}

impl NumericContext {
    /// Creates a new `NumericContext`.
    ///
    /// # Arguments
    /// * `base_seed` - The seed of the whole run.
    /// * `thread_index` - The 1-based index of the thread inside its pool.
    /// * `precision` - The precision returns are accumulated with.
    pub fn new(base_seed: u64, thread_index: usize, precision: Precision) -> Self {
        let seed = base_seed.wrapping_mul(thread_index as u64);

        Self {
            thread_index,
            seed,
            precision,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn thread_index(&self) -> usize {
        self.thread_index
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Computes the discounted return of every reward of a rollout.
    ///
    /// # Arguments
    /// * `rewards` - The rewards of the rollout, in order.
    /// * `bootstrap` - The estimated value of the state following the rollout.
    /// * `gamma` - The discount factor.
    ///
    /// # Returns
    /// `R_k = r_k + gamma * R_{k+1}` for every `k`, with `R_n = bootstrap`.
    pub fn returns(&self, rewards: &[f32], bootstrap: f32, gamma: f32) -> Vec<f32> {
        let mut returns = vec![0.; rewards.len()];

        match self.precision {
            Precision::Single => {
                let mut acc = bootstrap;
                for (ret, r) in returns.iter_mut().zip(rewards).rev() {
                    acc = r + gamma * acc;
                    *ret = acc;
                }
            }
            Precision::Double => {
                let mut acc = bootstrap as f64;
                for (ret, r) in returns.iter_mut().zip(rewards).rev() {
                    acc = *r as f64 + gamma as f64 * acc;
                    *ret = acc as f32;
                }
            }
        }

        returns
    }
}
