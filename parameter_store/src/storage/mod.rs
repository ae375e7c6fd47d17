mod buffer;
mod error;
mod store;

pub use buffer::WildBuffer;
pub use error::{Result, StoreErr};
pub use store::ParameterStore;
