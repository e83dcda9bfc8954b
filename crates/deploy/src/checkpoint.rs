//! Step checkpoints for resumable deployments.
//!
//! After every successful step the orchestrator records the step and its output in
//! `{state_dir}/checkpoint.json`. A rerun against the same plan, chain and sender skips
//! the recorded steps and reuses their outputs instead of deploying again.
//!
//! A transaction is also recorded as pending between its submission and its receipt, so
//! a rerun waits for that transaction instead of sending the step a second time.

use std::fs::File;
use std::path::{Path, PathBuf};

use alloy_core::primitives::{Address, B256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;
use crate::fs::FsHandler;
use crate::plan::{Step, StepOutput};

/// File name of the checkpoint inside a state directory.
pub const CHECKPOINT_FILENAME: &str = "checkpoint.json";

/// Lifecycle of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RunState {
    NotStarted,
    InProgress,
    Complete,
    /// The run stopped at `step`; steps recorded before it are intact.
    Aborted { step: Step, reason: String },
}

/// A step that completed, with what it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedStep {
    pub step: Step,
    pub output: StepOutput,
    /// Unix timestamp of completion.
    pub completed_at: i64,
}

/// A step whose transaction was submitted but whose receipt was not processed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStep {
    pub step: Step,
    pub tx_hash: B256,
    /// Unix timestamp of submission.
    pub submitted_at: i64,
}

/// Persistent record of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// SHA-256 of the plan this run executes.
    pub plan_hash: String,
    pub chain_id: u64,
    pub sender: Address,
    pub state: RunState,
    /// Completed steps, in execution order.
    pub steps: Vec<CompletedStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingStep>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Version of the tool that created the checkpoint.
    pub tool_version: String,
}

impl Checkpoint {
    pub fn new(plan_hash: String, chain_id: u64, sender: Address) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            plan_hash,
            chain_id,
            sender,
            state: RunState::NotStarted,
            steps: Vec::new(),
            pending: None,
            created_at: now,
            updated_at: now,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Refuse to resume a checkpoint that belongs to another plan, chain or sender.
    pub fn ensure_matches(
        &self,
        path: &Path,
        plan_hash: &str,
        chain_id: u64,
        sender: Address,
    ) -> Result<(), DeployError> {
        let mismatch = |field: &'static str, expected: String, found: String| {
            DeployError::CheckpointMismatch {
                path: path.to_path_buf(),
                field,
                expected,
                found,
            }
        };

        if self.plan_hash != plan_hash {
            return Err(mismatch("plan", plan_hash.to_string(), self.plan_hash.clone()));
        }
        if self.chain_id != chain_id {
            return Err(mismatch(
                "chain id",
                chain_id.to_string(),
                self.chain_id.to_string(),
            ));
        }
        if self.sender != sender {
            return Err(mismatch("sender", sender.to_string(), self.sender.to_string()));
        }
        Ok(())
    }

    /// Remember that `step` submitted `tx_hash` and awaits its receipt.
    pub fn set_pending(&mut self, step: Step, tx_hash: B256) {
        let now = chrono::Utc::now().timestamp();
        self.pending = Some(PendingStep {
            step,
            tx_hash,
            submitted_at: now,
        });
        self.updated_at = now;
    }

    /// Transaction submitted for `step` whose outcome is not recorded yet.
    pub fn pending_tx(&self, step: Step) -> Option<B256> {
        self.pending
            .filter(|pending| pending.step == step)
            .map(|pending| pending.tx_hash)
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
        self.updated_at = chrono::Utc::now().timestamp();
    }

    /// Record a completed step and mark the run in progress.
    pub fn record(&mut self, step: Step, output: StepOutput) {
        let now = chrono::Utc::now().timestamp();
        self.steps.push(CompletedStep {
            step,
            output,
            completed_at: now,
        });
        self.pending = None;
        self.state = RunState::InProgress;
        self.updated_at = now;
    }

    pub fn set_state(&mut self, state: RunState) {
        self.state = state;
        self.updated_at = chrono::Utc::now().timestamp();
    }

    pub fn is_complete(&self) -> bool {
        self.state == RunState::Complete
    }

    /// Save this checkpoint atomically as formatted JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize checkpoint")?;
        FsHandler::write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to write checkpoint to {}", path.display()))
    }

    /// Load a checkpoint from a file.
    ///
    /// Returns an error if the file doesn't exist, is malformed, or cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Checkpoint file does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint from {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse checkpoint JSON")
    }
}

/// A locked state directory holding the checkpoint and the final report.
///
/// Only one deployment can hold a given state directory at a time.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    _lock: File,
}

impl CheckpointStore {
    /// Open (and create if needed) a state directory, taking its lock.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        FsHandler::create_state_directory(&dir)?;
        let lock = FsHandler::lock_directory(&dir)?;
        Ok(Self { dir, _lock: lock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILENAME)
    }

    /// Load the checkpoint, if one exists.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let path = self.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }
        Checkpoint::load_from_file(&path).map(Some)
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        checkpoint.save_to_file(&self.checkpoint_path())
    }

    /// Move an existing checkpoint out of the way so the next run starts fresh.
    ///
    /// Returns where the old checkpoint was moved, if there was one.
    pub fn archive(&self) -> Result<Option<PathBuf>> {
        let path = self.checkpoint_path();
        if !path.exists() {
            return Ok(None);
        }

        let archived = self.dir.join(format!(
            "checkpoint-{}.json",
            chrono::Utc::now().timestamp_millis()
        ));
        std::fs::rename(&path, &archived).with_context(|| {
            format!(
                "Failed to archive checkpoint {} to {}",
                path.display(),
                archived.display()
            )
        })?;

        tracing::info!(archived = %archived.display(), "Previous checkpoint archived");
        Ok(Some(archived))
    }

    /// Write a JSON document next to the checkpoint.
    pub fn write_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to serialize {}", file_name))?;
        FsHandler::write_atomic(&path, json.as_bytes())?;
        Ok(path)
    }
}
