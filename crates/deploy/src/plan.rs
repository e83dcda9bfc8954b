//! Deployment plan: the static, ordered description of a run.
//!
//! A plan is built once from a validated [`DeploymentConfig`] and expands into an ordered
//! list of [`Step`]s. Each step declares which earlier steps it consumes, which makes the
//! wiring order explicit instead of relying on variables captured along the way.

use alloy_core::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{CoverageWindow, DeploymentConfig, IssuerSchedule, PoolKind};

/// One pool of the plan. `index` is the pool's position in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub index: usize,
    pub kind: PoolKind,
    pub name: String,
    pub symbol: String,
    pub weight: u64,
    pub coverage: CoverageWindow,
}

/// A single unit of work in a deployment run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum Step {
    #[display("deploy-reward-token")]
    DeployRewardToken,
    #[display("deploy-issuer")]
    DeployIssuer,
    #[display("deploy-pool-token[{pool}]")]
    DeployPoolToken { pool: usize },
    #[display("register-pool[{pool}]")]
    RegisterPool { pool: usize },
    #[display("deploy-market[{pool}]")]
    DeployMarket { pool: usize },
    #[display("seed-market[{pool}]")]
    SeedMarket { pool: usize },
    #[display("activate-market[{pool}]")]
    ActivateMarket { pool: usize },
}

impl Step {
    /// Steps whose outputs this step consumes.
    pub fn dependencies(&self) -> Vec<Step> {
        match *self {
            Step::DeployRewardToken | Step::DeployPoolToken { .. } => vec![],
            Step::DeployIssuer => vec![Step::DeployRewardToken],
            Step::RegisterPool { pool } => {
                vec![Step::DeployIssuer, Step::DeployPoolToken { pool }]
            }
            Step::DeployMarket { pool } => vec![
                Step::DeployIssuer,
                Step::DeployRewardToken,
                Step::DeployPoolToken { pool },
                Step::RegisterPool { pool },
            ],
            Step::SeedMarket { pool } => {
                vec![Step::DeployPoolToken { pool }, Step::DeployMarket { pool }]
            }
            Step::ActivateMarket { pool } => {
                vec![Step::DeployMarket { pool }, Step::SeedMarket { pool }]
            }
        }
    }

    /// Pool this step belongs to, if any.
    pub fn pool(&self) -> Option<usize> {
        match *self {
            Step::DeployRewardToken | Step::DeployIssuer => None,
            Step::DeployPoolToken { pool }
            | Step::RegisterPool { pool }
            | Step::DeployMarket { pool }
            | Step::SeedMarket { pool }
            | Step::ActivateMarket { pool } => Some(pool),
        }
    }

    /// Whether the step creates a contract (as opposed to sending a call).
    pub fn is_deployment(&self) -> bool {
        matches!(
            self,
            Step::DeployRewardToken
                | Step::DeployIssuer
                | Step::DeployPoolToken { .. }
                | Step::DeployMarket { .. }
        )
    }
}

/// What a completed step produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepOutput {
    /// A contract was created at `address`.
    Contract { address: Address, tx_hash: B256 },
    /// A transaction was mined.
    Transaction { tx_hash: B256 },
}

impl StepOutput {
    pub fn address(&self) -> Option<Address> {
        match self {
            StepOutput::Contract { address, .. } => Some(*address),
            StepOutput::Transaction { .. } => None,
        }
    }

    pub fn tx_hash(&self) -> B256 {
        match self {
            StepOutput::Contract { tx_hash, .. } | StepOutput::Transaction { tx_hash } => *tx_hash,
        }
    }
}

/// The complete, validated description of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub beneficiary: Address,
    pub reference_token: Address,
    pub issuer: IssuerSchedule,
    pub token_supply: U256,
    pub seed_amount: U256,
    pub with_update: bool,
    pub pools: Vec<PoolSpec>,
}

impl DeploymentPlan {
    /// Validate the configuration and build the plan from it.
    pub fn from_config(config: &DeploymentConfig) -> Result<Self> {
        config.validate()?;

        let pools = config
            .pools
            .iter()
            .enumerate()
            .map(|(index, pool)| PoolSpec {
                index,
                kind: pool.kind,
                name: pool.name.clone(),
                symbol: pool.symbol.clone(),
                weight: pool.weight,
                coverage: pool.coverage.unwrap_or(config.coverage),
            })
            .collect();

        Ok(Self {
            beneficiary: config.beneficiary,
            reference_token: config.reference_token,
            issuer: config.issuer,
            token_supply: config.token_supply,
            seed_amount: config.seed_amount,
            with_update: config.with_update,
            pools,
        })
    }

    /// The ordered list of steps for this plan.
    ///
    /// Reward token, issuer, every pool token, then register/deploy/seed/activate per pool.
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::with_capacity(2 + self.pools.len() * 5);
        steps.push(Step::DeployRewardToken);
        steps.push(Step::DeployIssuer);
        steps.extend(self.pools.iter().map(|p| Step::DeployPoolToken { pool: p.index }));

        for pool in &self.pools {
            let pool = pool.index;
            steps.push(Step::RegisterPool { pool });
            steps.push(Step::DeployMarket { pool });
            steps.push(Step::SeedMarket { pool });
            steps.push(Step::ActivateMarket { pool });
        }

        steps
    }

    pub fn pool(&self, index: usize) -> Option<&PoolSpec> {
        self.pools.get(index)
    }

    /// SHA-256 of the plan serialized as JSON.
    ///
    /// Used to tell whether a checkpoint was written for this exact plan.
    pub fn compute_hash(&self) -> Result<String> {
        let json = serde_json::to_string(self).context("Failed to serialize deployment plan")?;

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}
