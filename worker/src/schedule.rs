/// A value annealed linearly from `start` to `end` over `steps` steps, then held at `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSchedule {
    start: f32,
    end: f32,
    steps: u64,
}

impl LinearSchedule {
    pub fn new(start: f32, end: f32, steps: u64) -> Self {
        Self { start, end, steps }
    }

    /// A schedule that always returns `value`.
    pub fn constant(value: f32) -> Self {
        Self::new(value, value, 0)
    }

    /// The value at `step`.
    #[inline]
    pub fn value(&self, step: u64) -> f32 {
        if step >= self.steps {
            return self.end;
        }

        let progress = step as f32 / self.steps as f32;
        self.start + (self.end - self.start) * progress
    }
}
