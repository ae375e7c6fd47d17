use parameter_store::{ParameterStore, StoreErr};

use crate::Result;

/// Defines how a worker's local gradient is applied to the shared parameters.
///
/// Updates are written straight into the shared buffers without locking, concurrent updates
/// from other workers may interleave with (and overwrite parts of) this one.
pub trait Optimizer {
    /// Applies `grad` to the shared parameters of `store`.
    ///
    /// # Arguments
    /// * `store` - The shared parameters to update.
    /// * `grad` - The local gradient, as long as the store.
    /// * `lr` - The current learning rate.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `grad` and the store have different sizes.
    fn apply(&self, store: &ParameterStore, grad: &[f32], lr: f32) -> Result<()>;
}

fn check_len(store: &ParameterStore, grad: &[f32]) -> Result<()> {
    if grad.len() != store.len() {
        return Err(StoreErr::SizeMismatch {
            got: grad.len(),
            expected: store.len(),
        }
        .into());
    }

    Ok(())
}

/// Plain gradient descent with element-wise clipping.
#[derive(Debug, Clone)]
pub struct Sgd {
    clip: f32,
}

impl Sgd {
    pub fn new(clip: f32) -> Self {
        Self { clip }
    }
}

impl Optimizer for Sgd {
    fn apply(&self, store: &ParameterStore, grad: &[f32], lr: f32) -> Result<()> {
        check_len(store, grad)?;
        let params = store.params();

        for (i, &g) in grad.iter().enumerate().filter(|(_, g)| **g != 0.) {
            params.add(i, -lr * g.clamp(-self.clip, self.clip));
        }

        Ok(())
    }
}

/// RMSProp whose running average of squared gradients lives in the store's shared gradient
/// buffer, so every worker contributes to the same statistics.
#[derive(Debug, Clone)]
pub struct SharedRmsProp {
    decay: f32,
    epsilon: f32,
    clip: f32,
}

impl SharedRmsProp {
    /// Creates a new `SharedRmsProp` optimizer.
    ///
    /// # Arguments
    /// * `decay` - How much of the previous average is kept on every update.
    /// * `epsilon` - Added to the average before taking its square root.
    /// * `clip` - Element-wise bound of the gradient.
    pub fn new(decay: f32, epsilon: f32, clip: f32) -> Self {
        Self {
            decay,
            epsilon,
            clip,
        }
    }
}

impl Optimizer for SharedRmsProp {
    fn apply(&self, store: &ParameterStore, grad: &[f32], lr: f32) -> Result<()> {
        check_len(store, grad)?;
        let (params, stats) = (store.params(), store.grads());

        for (i, &g) in grad.iter().enumerate().filter(|(_, g)| **g != 0.) {
            let g = g.clamp(-self.clip, self.clip);
            let avg = self.decay * stats.get(i) + (1. - self.decay) * g * g;

            stats.set(i, avg);
            params.add(i, -lr * g / (avg + self.epsilon).sqrt());
        }

        Ok(())
    }
}
