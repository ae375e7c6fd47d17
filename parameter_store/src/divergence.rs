//! Detection of NaN values in shared buffers.
//!
//! A buffer is considered diverged when the sum of its values isn't equal to itself. Workers
//! share these buffers without synchronization, so once one of them is corrupted there's no way
//! to contain it: callers abort the whole process.

use crate::{Result, StoreErr, WildBuffer};

/// Whether `sum` is not self-equal.
#[allow(clippy::eq_op)]
#[inline]
pub fn sum_diverged(sum: f32) -> bool {
    sum != sum
}

/// Whether any value of `buffer` is NaN.
pub fn is_diverged(buffer: &WildBuffer) -> bool {
    sum_diverged(buffer.sum())
}

/// Whether any value of `values` is NaN.
pub fn slice_diverged(values: &[f32]) -> bool {
    sum_diverged(values.iter().sum())
}

/// Checks `buffer` for NaN values.
///
/// # Arguments
/// * `name` - How the buffer is named in the error.
/// * `buffer` - The buffer to check.
///
/// # Returns
/// A `Diverged` error if the buffer contains NaN.
pub fn check(name: &'static str, buffer: &WildBuffer) -> Result<()> {
    if is_diverged(buffer) {
        return Err(StoreErr::Diverged { buffer: name });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_buffer_never_diverges() {
        let buffer = WildBuffer::new(vec![1e30, -1e30, 0.5, -7.25]);
        assert!(!is_diverged(&buffer));
        assert!(check("params", &buffer).is_ok());
    }

    #[test]
    fn test_nan_is_always_detected() {
        for idx in 0..5 {
            let buffer = WildBuffer::new(vec![1.; 5]);
            buffer.set(idx, f32::NAN);

            assert!(is_diverged(&buffer));
            assert!(matches!(
                check("params", &buffer),
                Err(StoreErr::Diverged { buffer: "params" })
            ));
        }
    }

    #[test]
    fn test_slices() {
        assert!(!slice_diverged(&[0., 1., 2.]));
        assert!(slice_diverged(&[0., f32::NAN, 2.]));
        assert!(!slice_diverged(&[]));
    }
}
