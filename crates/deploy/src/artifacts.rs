//! Contract artifacts and the factory that resolves them.

use std::path::{Path, PathBuf};

use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde_json::Value;

use crate::error::DeployError;

use crate::config::PoolKind;

/// Contract types deployed by the orchestrator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr,
)]
pub enum ContractKind {
    /// iStax reward token.
    #[strum(serialize = "iStaxToken")]
    RewardToken,
    /// Issuer / reward distributor ("chef").
    #[strum(serialize = "iStaxIssuer")]
    Issuer,
    /// Staking-duration token.
    #[strum(serialize = "stakingToken")]
    StakingToken,
    /// Insurance/coverage token.
    #[strum(serialize = "iStaxMarketToken")]
    InsuranceToken,
    /// Market pool ("sous chef").
    #[strum(serialize = "iStaxMarket")]
    Market,
}

impl ContractKind {
    /// Build artifact name, e.g. `iStaxIssuer`.
    pub fn artifact_name(&self) -> &str {
        self.as_ref()
    }

    /// Token contract backing a pool of the given kind.
    pub fn pool_token(kind: PoolKind) -> Self {
        match kind {
            PoolKind::Staking => ContractKind::StakingToken,
            PoolKind::Insurance => ContractKind::InsuranceToken,
        }
    }
}

/// A deployable contract: its kind and creation bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ContractKind,
    pub bytecode: Bytes,
}

/// Resolves a contract type to a deployable artifact.
pub trait ContractFactory {
    fn resolve(&self, kind: ContractKind) -> Result<Artifact>;
}

/// Reads compiled artifacts from a build directory.
///
/// A missing or unusable artifact is a configuration error. Looks for `<dir>/<ArtifactName>.json` and accepts both the Truffle layout
/// (`"bytecode": "0x..."`) and the Foundry layout (`"bytecode": { "object": "0x..." }`).
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    dir: PathBuf,
}

impl ArtifactDir {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(DeployError::config(format!(
                "artifact directory not found: {}",
                dir.display()
            ))
            .into());
        }
        Ok(Self { dir })
    }

    pub fn path_for(&self, kind: ContractKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.artifact_name()))
    }
}

impl ContractFactory for ArtifactDir {
    fn resolve(&self, kind: ContractKind) -> Result<Artifact> {
        let path = self.path_for(kind);
        let bytecode = read_bytecode(&path).map_err(|err| {
            DeployError::config(format!(
                "failed to load {} artifact: {:#}",
                kind.artifact_name(),
                err
            ))
        })?;

        tracing::debug!(
            contract = %kind,
            path = %path.display(),
            size = bytecode.len(),
            "Resolved contract artifact"
        );

        Ok(Artifact { kind, bytecode })
    }
}

fn read_bytecode(path: &Path) -> Result<Bytes> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;

    let raw = match &json["bytecode"] {
        Value::String(s) => s.as_str(),
        Value::Object(obj) => obj
            .get("object")
            .and_then(Value::as_str)
            .context("bytecode.object is missing or not a string")?,
        _ => anyhow::bail!("No bytecode in {}", path.display()),
    };

    let bytes = hex::decode(raw.trim_start_matches("0x"))
        .with_context(|| format!("Bytecode in {} is not valid hex", path.display()))?;

    if bytes.is_empty() {
        anyhow::bail!(
            "Bytecode in {} is empty (abstract contract or interface?)",
            path.display()
        );
    }

    Ok(Bytes::from(bytes))
}
