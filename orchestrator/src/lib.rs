//! Trains reinforcement learning agents on a single machine with asynchronous workers.
//!
//! Every worker thread runs its own agent against a shared set of parameters, updated without
//! locks. A control thread evaluates the parameters every few thousand global steps and saves
//! a checkpoint when the process is interrupted.

pub mod blueprint;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod logging;
pub mod master;
pub mod pool;
pub mod setup;
pub mod validator;

pub use blueprint::{Blueprint, CorridorBlueprint};
pub use checkpoint::{CheckpointManager, CheckpointRecord};
pub use config::Config;
pub use error::{OrchestratorError, Result};
pub use master::{AsyncMaster, Plan, RunSummary, resume_plan};
pub use pool::ThreadPool;
pub use setup::{InitMutex, SetupPipeline};
pub use validator::{Evaluator, Validator};
