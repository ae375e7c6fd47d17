use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

/// The value the step counter holds once training has been told to stop.
pub const SENTINEL: i64 = -1;

/// The process-wide count of completed training steps.
///
/// While non-negative the counter only moves forward. Once it's stopped it holds
/// [`SENTINEL`] forever, every later update is ignored.
#[derive(Debug, Clone, Default)]
pub struct StepCounter(Arc<AtomicI64>);

impl StepCounter {
    /// Creates a new `StepCounter` starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the current amount of steps, or [`SENTINEL`] if stopped.
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Counts one more completed step.
    ///
    /// # Returns
    /// The new amount of steps, `None` if the counter was stopped.
    pub fn increment(&self) -> Option<i64> {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |curr| {
                (curr != SENTINEL).then_some(curr + 1)
            })
            .ok()
            .map(|prev| prev + 1)
    }

    /// Moves the counter forward to `steps`, used when resuming from a checkpoint.
    ///
    /// The counter is never moved backwards nor revived once stopped.
    ///
    /// # Returns
    /// Whether the counter changed.
    pub fn advance_to(&self, steps: i64) -> bool {
        if steps < 0 {
            return false;
        }

        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |curr| {
                (curr != SENTINEL && steps > curr).then_some(steps)
            })
            .is_ok()
    }

    /// Sets the counter to [`SENTINEL`].
    pub fn stop(&self) {
        self.0.store(SENTINEL, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.get() == SENTINEL
    }
}
