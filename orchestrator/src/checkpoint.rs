use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::info;
use parameter_store::{ParameterStore, StepCounter, snapshot};
use serde::{Deserialize, Serialize};
use worker::validation::weights_path;

use crate::{OrchestratorError, Result};

/// The tag of the snapshot a checkpoint is paired with.
pub const LAST: &str = "last";

/// The progress persisted alongside the `last` snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub global_steps: u64,
}

/// Persists and restores the progress of a run.
///
/// A run directory holds `checkpoint.json` and one snapshot per tag under `weights/`.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
    weights_dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(run_dir: &Path) -> Self {
        Self {
            path: run_dir.join("checkpoint.json"),
            weights_dir: run_dir.join("weights"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn weights_dir(&self) -> &Path {
        &self.weights_dir
    }

    pub fn weights_path(&self, tag: &str) -> PathBuf {
        weights_path(&self.weights_dir, tag)
    }

    /// Reads the checkpoint record.
    ///
    /// # Returns
    /// `None` if the run has no checkpoint yet.
    pub fn load(&self) -> Result<Option<CheckpointRecord>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Atomically replaces the checkpoint record with `record`.
    pub fn save(&self, record: &CheckpointRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = snapshot::temp_path(&self.path);
        let mut file = File::create(&tmp)?;
        serde_json::to_writer(&mut file, record)?;
        file.flush()?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        info!("saved checkpoint at {} global steps", record.global_steps);
        Ok(())
    }

    /// Persists the current shared parameters under `tag`.
    pub fn save_weights(&self, tag: &str, store: &ParameterStore) -> Result<PathBuf> {
        let path = self.weights_path(tag);
        snapshot::save(&path, &store.params().to_vec())?;
        Ok(path)
    }

    /// Restores the last checkpoint, if any, into `store` and `counter`.
    ///
    /// The `last` snapshot is loaded into both the shared and the target parameters.
    ///
    /// # Returns
    /// The resumed amount of global steps, `None` if there was no checkpoint, or a
    /// `ResumeMissingWeights` error if the checkpoint's snapshot doesn't exist.
    pub fn resume(&self, store: &ParameterStore, counter: &StepCounter) -> Result<Option<u64>> {
        let Some(record) = self.load()? else {
            return Ok(None);
        };

        let weights_path = self.weights_path(LAST);
        let weights = snapshot::load(&weights_path).map_err(|e| {
            if e.is_not_found() {
                OrchestratorError::ResumeMissingWeights {
                    checkpoint: self.path.clone(),
                    weights: weights_path.clone(),
                }
            } else {
                e.into()
            }
        })?;

        store.load(&weights)?;
        counter.advance_to(record.global_steps as i64);

        info!(
            "resumed from {} at {} global steps",
            self.path.display(),
            record.global_steps
        );
        Ok(Some(record.global_steps))
    }
}
