use super::ParamGen;

/// Generates `len` copies of the same value.
pub struct ConstParamGen {
    value: f32,
    left: usize,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen`.
    ///
    /// # Arguments
    /// * `value` - The value to generate.
    /// * `len` - How many values to generate in total.
    pub fn new(value: f32, len: usize) -> Self {
        Self { value, left: len }
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.left == 0 {
            return None;
        }

        let n = n.min(self.left);
        self.left -= n;
        Some(vec![self.value; n])
    }
}
