use std::sync::atomic::{AtomicU32, Ordering};

use super::{Result, StoreErr};

/// A flat buffer of parameters shared across threads without using locks.
///
/// It embraces race conditions, workers read and update the values simultaneously. Every
/// element is stored as the bits of an `f32` inside an `AtomicU32` accessed with relaxed
/// ordering, so a racing read-modify-write may lose another worker's update but no value is
/// ever torn.
#[derive(Debug)]
pub struct WildBuffer {
    values: Box<[AtomicU32]>,
}

impl WildBuffer {
    /// Creates a new `WildBuffer` from its initial values.
    ///
    /// # Arguments
    /// * `values` - The initial state of the buffer.
    ///
    /// # Returns
    /// A new `WildBuffer` instance.
    pub fn new(values: Vec<f32>) -> Self {
        let values = values
            .into_iter()
            .map(|v| AtomicU32::new(v.to_bits()))
            .collect();

        Self { values }
    }

    /// Creates a new `WildBuffer` of `len` zeros.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0.; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reads the value at `idx`.
    ///
    /// # Panics
    /// If `idx` is out of bounds.
    #[inline]
    pub fn get(&self, idx: usize) -> f32 {
        f32::from_bits(self.values[idx].load(Ordering::Relaxed))
    }

    /// Overwrites the value at `idx`.
    ///
    /// # Panics
    /// If `idx` is out of bounds.
    #[inline]
    pub fn set(&self, idx: usize, value: f32) {
        self.values[idx].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Adds `delta` to the value at `idx`.
    ///
    /// The load and the store are independent, a concurrent update between them is lost.
    ///
    /// # Panics
    /// If `idx` is out of bounds.
    #[inline]
    pub fn add(&self, idx: usize, delta: f32) {
        self.set(idx, self.get(idx) + delta);
    }

    /// Copies the buffer into `out`.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `out` isn't the same size as this buffer.
    pub fn pull(&self, out: &mut [f32]) -> Result<()> {
        self.check_len(out.len())?;

        for (o, v) in out.iter_mut().zip(self.values.iter()) {
            *o = f32::from_bits(v.load(Ordering::Relaxed));
        }

        Ok(())
    }

    /// Overwrites the whole buffer with `src`.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `src` isn't the same size as this buffer.
    pub fn push(&self, src: &[f32]) -> Result<()> {
        self.check_len(src.len())?;

        for (v, s) in self.values.iter().zip(src) {
            v.store(s.to_bits(), Ordering::Relaxed);
        }

        Ok(())
    }

    /// Overwrites this buffer with the current values of `other`.
    pub fn copy_from(&self, other: &WildBuffer) -> Result<()> {
        self.check_len(other.len())?;

        for (dst, src) in self.values.iter().zip(other.values.iter()) {
            dst.store(src.load(Ordering::Relaxed), Ordering::Relaxed);
        }

        Ok(())
    }

    pub fn fill(&self, value: f32) {
        let bits = value.to_bits();
        self.values.iter().for_each(|v| v.store(bits, Ordering::Relaxed));
    }

    /// Sums every value in the buffer, NaN if any element is NaN.
    pub fn sum(&self) -> f32 {
        self.values
            .iter()
            .map(|v| f32::from_bits(v.load(Ordering::Relaxed)))
            .sum()
    }

    /// Takes a (possibly torn across elements) copy of the buffer.
    pub fn to_vec(&self) -> Vec<f32> {
        self.values
            .iter()
            .map(|v| f32::from_bits(v.load(Ordering::Relaxed)))
            .collect()
    }

    fn check_len(&self, got: usize) -> Result<()> {
        if got != self.len() {
            return Err(StoreErr::SizeMismatch {
                got,
                expected: self.len(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn test_push_and_pull() {
        let buffer = WildBuffer::zeroed(3);
        buffer.push(&[1., 2., 3.]).unwrap();

        let mut out = [0.; 3];
        buffer.pull(&mut out).unwrap();
        assert_eq!(out, [1., 2., 3.]);
    }

    #[test]
    fn test_size_mismatch() {
        let buffer = WildBuffer::zeroed(3);

        let err = buffer.push(&[1., 2.]).unwrap_err();
        assert!(matches!(
            err,
            StoreErr::SizeMismatch {
                got: 2,
                expected: 3
            }
        ));

        let mut out = [0.; 4];
        assert!(buffer.pull(&mut out).is_err());
    }

    #[test]
    fn test_copy_from_other_buffer() {
        let src = WildBuffer::new(vec![4., 5.]);
        let dst = WildBuffer::zeroed(2);

        dst.copy_from(&src).unwrap();
        assert_eq!(dst.to_vec(), [4., 5.]);

        src.set(0, 7.);
        assert_eq!(dst.get(0), 4.);
    }

    #[test]
    fn test_sum_propagates_nan() {
        let buffer = WildBuffer::new(vec![1., 2., 3.]);
        assert_eq!(buffer.sum(), 6.);

        buffer.set(1, f32::NAN);
        assert!(buffer.sum().is_nan());
    }

    #[test]
    fn test_concurrent_writers_never_tear_values() {
        const THREADS: usize = 4;
        const WRITES: usize = 1000;

        let buffer = Arc::new(WildBuffer::zeroed(8));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..WRITES {
                        buffer.set(i % 8, t as f32);
                    }
                })
            })
            .collect();

        handles.into_iter().for_each(|h| h.join().unwrap());

        for v in buffer.to_vec() {
            assert!((0..THREADS).any(|t| v == t as f32), "torn value {v}");
        }
    }
}
