//! Error taxonomy for deployment runs.
//!
//! Library functions return [`anyhow::Result`]; a [`DeployError`] travels inside the
//! `anyhow::Error` when the failure belongs to one of the classes below, so callers can
//! recover it with `downcast_ref::<DeployError>()`.

use std::path::PathBuf;

use crate::plan::Step;

/// Boxed source error for failed external calls.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Missing or invalid configuration input.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A deployment or transaction was rejected by the chain.
    #[error("step {step} failed: {source}")]
    ExternalCall {
        step: Step,
        #[source]
        source: BoxError,
    },

    /// A step tried to consume an output that no earlier step produced.
    #[error("step {step} requires the output of {missing}, which has not been produced yet")]
    Ordering { step: Step, missing: Step },

    /// An existing checkpoint does not belong to the current run.
    #[error(
        "checkpoint at {path} was written for a different {field} (expected {expected}, found {found}); \
         rerun with --fresh to discard it"
    )]
    CheckpointMismatch {
        path: PathBuf,
        field: &'static str,
        expected: String,
        found: String,
    },
}

impl DeployError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn external(step: Step, err: anyhow::Error) -> Self {
        Self::ExternalCall {
            step,
            source: err.into(),
        }
    }

    /// Whether this error belongs to the configuration class.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::CheckpointMismatch { .. })
    }
}
