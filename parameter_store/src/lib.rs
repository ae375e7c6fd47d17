//! Shared training state for asynchronous workers.
//!
//! Everything in this crate is handed out as cheap, cloneable handles: the flat parameter
//! buffers of a [`ParameterStore`] and the global [`StepCounter`]. Workers read and write the
//! buffers without any locking.

mod counter;
pub mod divergence;
pub mod initialization;
pub mod snapshot;
mod storage;

pub use counter::{SENTINEL, StepCounter};
pub use storage::{ParameterStore, Result, StoreErr, WildBuffer};
