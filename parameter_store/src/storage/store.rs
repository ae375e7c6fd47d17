use std::sync::Arc;

use crate::{
    divergence,
    initialization::ParamGen,
    storage::{Result, StoreErr, WildBuffer},
};

const SAMPLE_CHUNK: usize = 4096;

/// The primary storage of the shared weights, the target weights and the shared gradient
/// statistics.
///
/// Cloning the store clones the handles, every clone points to the same three buffers. The
/// buffers are never reallocated after creation.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    nparams: usize,
    params: Arc<WildBuffer>,
    target: Arc<WildBuffer>,
    grads: Arc<WildBuffer>,
}

impl ParameterStore {
    /// Creates a new `ParameterStore`.
    ///
    /// The shared parameters are drawn from `param_gen` until it's exhausted, the target
    /// parameters start as a copy of them and the gradient accumulator starts zeroed.
    ///
    /// # Arguments
    /// * `param_gen` - A parameter generator.
    ///
    /// # Returns
    /// A new `ParameterStore` instance.
    pub fn new<PG: ParamGen>(mut param_gen: PG) -> Self {
        let mut values = Vec::new();

        while let Some(sample) = param_gen.sample(SAMPLE_CHUNK) {
            values.extend(sample);
        }

        let nparams = values.len();
        let target = WildBuffer::new(values.clone());

        Self {
            nparams,
            params: Arc::new(WildBuffer::new(values)),
            target: Arc::new(target),
            grads: Arc::new(WildBuffer::zeroed(nparams)),
        }
    }

    /// Returns the amount of parameters in each of the buffers.
    pub fn len(&self) -> usize {
        self.nparams
    }

    pub fn is_empty(&self) -> bool {
        self.nparams == 0
    }

    /// The shared parameters every worker trains.
    pub fn params(&self) -> &WildBuffer {
        &self.params
    }

    /// The target parameters used to compute stable learning targets.
    pub fn target(&self) -> &WildBuffer {
        &self.target
    }

    /// The shared gradient statistics.
    pub fn grads(&self) -> &WildBuffer {
        &self.grads
    }

    /// Overwrites both the shared and the target parameters with `weights`.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `weights` isn't the same size as the store.
    pub fn load(&self, weights: &[f32]) -> Result<()> {
        if weights.len() != self.nparams {
            return Err(StoreErr::SizeMismatch {
                got: weights.len(),
                expected: self.nparams,
            });
        }

        self.params.push(weights)?;
        self.target.push(weights)
    }

    /// Copies the current shared parameters into the target parameters.
    pub fn sync_target(&self) {
        // SAFETY: Both buffers were created with `nparams` values.
        self.target.copy_from(&self.params).unwrap();
    }

    /// Checks every buffer of the store for NaN values.
    ///
    /// # Returns
    /// A `Diverged` error naming the first buffer found to contain NaN.
    pub fn check_finite(&self) -> Result<()> {
        divergence::check("shared parameters", &self.params)?;
        divergence::check("target parameters", &self.target)?;
        divergence::check("shared gradient", &self.grads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initialization::ConstParamGen;

    fn create_test_store(nparams: usize, value: f32) -> ParameterStore {
        ParameterStore::new(ConstParamGen::new(value, nparams))
    }

    #[test]
    fn test_store_initialization() {
        const PARAMS: usize = 10_000;

        let store = create_test_store(PARAMS, 0.5);
        assert_eq!(store.len(), PARAMS);
        assert_eq!(store.params().to_vec(), vec![0.5; PARAMS]);
        assert_eq!(store.target().to_vec(), vec![0.5; PARAMS]);
        assert_eq!(store.grads().to_vec(), vec![0.; PARAMS]);
    }

    #[test]
    fn test_clones_share_buffers() {
        let store = create_test_store(4, 0.);
        let other = store.clone();

        other.params().set(2, 3.);
        assert_eq!(store.params().get(2), 3.);
    }

    #[test]
    fn test_load_overwrites_params_and_target() {
        let store = create_test_store(3, 0.);
        store.load(&[1., 2., 3.]).unwrap();

        assert_eq!(store.params().to_vec(), [1., 2., 3.]);
        assert_eq!(store.target().to_vec(), [1., 2., 3.]);
        assert!(store.load(&[1.]).is_err());
    }

    #[test]
    fn test_sync_target() {
        let store = create_test_store(2, 0.);
        store.params().push(&[5., 6.]).unwrap();
        assert_eq!(store.target().to_vec(), [0., 0.]);

        store.sync_target();
        assert_eq!(store.target().to_vec(), [5., 6.]);
    }

    #[test]
    fn test_check_finite_names_the_buffer() {
        let store = create_test_store(2, 0.);
        assert!(store.check_finite().is_ok());

        store.target().set(1, f32::NAN);
        let err = store.check_finite().unwrap_err();
        assert!(matches!(
            err,
            StoreErr::Diverged {
                buffer: "target parameters"
            }
        ));
    }
}
