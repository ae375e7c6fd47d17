use std::{fs, path::Path, path::PathBuf, str::FromStr};

use log::LevelFilter;
use serde::Deserialize;
use worker::{AgentConfig, AgentKind, Precision, environment::CorridorConfig};

use crate::{OrchestratorError, Result};

/// The configuration of a training run, read from a JSON file.
///
/// Every field but `runId` has a default, unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Config {
    /// Names the run directory, reusing an id resumes that run.
    pub run_id: String,
    /// A snapshot to start training from instead of random weights.
    pub pretrained_weights_path: Option<PathBuf>,
    pub seed: u64,
    pub numeric_precision: Precision,
    pub worker_thread_count: usize,
    pub total_steps: u64,
    /// Global steps between evaluation passes.
    pub validation_frequency: u64,
    pub agent_kind: AgentKind,
    pub experiments_dir: PathBuf,
    pub log_level: String,
    pub environment: CorridorConfig,
    pub agent: AgentConfig,
    pub validation_episodes: usize,
    /// Initial weights are drawn uniformly from `[-initRange, initRange)`.
    pub init_range: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_id: String::new(),
            pretrained_weights_path: None,
            seed: 1,
            numeric_precision: Precision::default(),
            worker_thread_count: 4,
            total_steps: 1_000_000,
            validation_frequency: 10_000,
            agent_kind: AgentKind::default(),
            experiments_dir: PathBuf::from("experiments"),
            log_level: "info".into(),
            environment: CorridorConfig::default(),
            agent: AgentConfig::default(),
            validation_episodes: 10,
            init_range: 0.1,
        }
    }
}

impl Config {
    /// Reads and validates the config stored at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parses and validates a JSON config.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the config can be trained with.
    ///
    /// # Returns
    /// An `InvalidConfig` error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(OrchestratorError::InvalidConfig(msg.into()));

        if self.run_id.is_empty() {
            return invalid("runId is required");
        }

        if self.run_id.contains(['/', '\\']) || self.run_id == "." || self.run_id == ".." {
            return invalid("runId must be a plain directory name");
        }

        if self.worker_thread_count == 0 {
            return invalid("workerThreadCount must be greater than 0");
        }

        if self.total_steps == 0 {
            return invalid("totalSteps must be greater than 0");
        }

        if self.validation_frequency == 0 || self.validation_frequency > i64::MAX as u64 {
            return invalid("validationFrequency must be in [1, 2^63)");
        }

        if self.validation_episodes == 0 {
            return invalid("validationEpisodes must be greater than 0");
        }

        if self.environment.length < 2 || self.environment.max_episode_steps == 0 {
            return invalid("environment needs a length of at least 2 and maxEpisodeSteps > 0");
        }

        if !(self.init_range.is_finite() && self.init_range > 0.) {
            return invalid("initRange must be positive");
        }

        self.level_filter()?;
        self.agent
            .validate()
            .map_err(|e| OrchestratorError::InvalidConfig(e.to_string()))
    }

    pub fn level_filter(&self) -> Result<LevelFilter> {
        LevelFilter::from_str(&self.log_level).map_err(|_| {
            OrchestratorError::InvalidConfig(format!("unknown logLevel {}", self.log_level))
        })
    }

    /// The directory every artifact of this run is written to.
    pub fn run_dir(&self) -> PathBuf {
        self.experiments_dir.join(&self.run_id)
    }

    pub fn weights_dir(&self) -> PathBuf {
        self.run_dir().join("weights")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.run_dir().join("logs")
    }
}
