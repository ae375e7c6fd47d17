//! Learning agents that train the shared parameters.
//!
//! Every agent binds to the same [`Shared`] handles and trains them without any locking, one
//! agent per worker thread. The [`ValidationAgent`] evaluates the shared parameters greedily and
//! persists them as tagged snapshots.

pub mod agent;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod model;
pub mod optimizer;
pub mod schedule;
pub mod validation;

mod a3c;
mod n_step_q;
mod one_step_q;

pub use a3c::A3C;
pub use agent::{Agent, AgentKind, Learner, Shared};
pub use config::{AgentConfig, Precision};
pub use context::NumericContext;
pub use environment::{Corridor, Environment, Transition};
pub use error::{AgentErr, Result};
pub use model::PolicyNet;
pub use n_step_q::NStepQ;
pub use one_step_q::OneStepQ;
pub use validation::ValidationAgent;
