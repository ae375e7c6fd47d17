//! Generators for the initial values of the shared parameters.

mod constant;
mod random;

pub use constant::ConstParamGen;
pub use random::RandParamGen;

/// Produces the initial values of a flat parameter buffer, chunk by chunk.
pub trait ParamGen {
    /// Samples the next chunk of at most `n` values.
    ///
    /// # Returns
    /// `None` once the generator produced every value it's meant to.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;
}
