//! Deployment configuration.
//!
//! Everything the migration needs (addresses, coverage window, issuer schedule, pool list)
//! lives in a single [`DeploymentConfig`] that is validated before a plan is built.

use std::collections::HashSet;
use std::path::Path;

use alloy_core::primitives::{Address, U256, address};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::DeployError;

/// The default name for the deployment configuration file.
pub const CONFIG_FILENAME: &str = "iStax.toml";

/// Beneficiary (dev) address receiving the issuer's developer share.
pub const DEFAULT_BENEFICIARY: Address = address!("7323B13669028780c6450A620064E30654a5Be2c");

/// STAX token on mainnet, bound into every market as the external reference token.
pub const DEFAULT_REFERENCE_TOKEN: Address = address!("0Da6Ed8B13214Ff28e9Ca979Dd37439e8a88F6c4");

/// Default pool weight passed to the issuer.
pub const DEFAULT_POOL_WEIGHT: u64 = 300;

/// 1 token with 18 decimals, minted to the deployer by every pool token constructor.
pub const DEFAULT_TOKEN_SUPPLY: u64 = 1_000_000_000_000_000_000;

/// Kind of token a pool is built around.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PoolKind {
    /// Staking-duration token (e.g. two weeks, one month, one year).
    Staking,
    /// Insurance/coverage token (peg protection, smart contract cover).
    Insurance,
}

/// Start/end timestamp pair during which a pool's coverage is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageWindow {
    pub start: u64,
    pub end: u64,
}

impl CoverageWindow {
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.start >= self.end {
            return Err(DeployError::config(format!(
                "coverage window must start before it ends (start = {}, end = {})",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

impl Default for CoverageWindow {
    fn default() -> Self {
        Self {
            start: 5_500_000,
            end: 5_500_050,
        }
    }
}

/// Reward schedule constants passed positionally to the issuer constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuerSchedule {
    pub reward_per_block: u64,
    pub start_block: u64,
    pub bonus_end_block: u64,
    pub end_block: u64,
    pub allocation_count: u64,
}

impl Default for IssuerSchedule {
    fn default() -> Self {
        Self {
            reward_per_block: 8,
            start_block: 1,
            bonus_end_block: 250_000,
            end_block: 250_005,
            allocation_count: 5,
        }
    }
}

impl IssuerSchedule {
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.start_block > self.bonus_end_block || self.bonus_end_block > self.end_block {
            return Err(DeployError::config(format!(
                "issuer blocks must satisfy start <= bonus end <= end (got {} / {} / {})",
                self.start_block, self.bonus_end_block, self.end_block
            )));
        }
        Ok(())
    }
}

/// One pool to deploy: its token and its share of the issuer's emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    pub kind: PoolKind,
    /// ERC-20 name of the pool token.
    pub name: String,
    /// ERC-20 symbol of the pool token. Must be unique across pools.
    pub symbol: String,
    /// Relative share of the reward emission.
    #[serde(default = "default_pool_weight")]
    pub weight: u64,
    /// Overrides the global coverage window for this pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoverageWindow>,
}

fn default_pool_weight() -> u64 {
    DEFAULT_POOL_WEIGHT
}

impl PoolConfig {
    pub fn staking(symbol: &str) -> Self {
        Self {
            kind: PoolKind::Staking,
            name: "StableX Staking Token".to_string(),
            symbol: symbol.to_string(),
            weight: DEFAULT_POOL_WEIGHT,
            coverage: None,
        }
    }

    pub fn insurance(name: &str, symbol: &str) -> Self {
        Self {
            kind: PoolKind::Insurance,
            name: name.to_string(),
            symbol: symbol.to_string(),
            weight: DEFAULT_POOL_WEIGHT,
            coverage: None,
        }
    }
}

/// Full configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Beneficiary address handed to the issuer.
    pub beneficiary: Address,
    /// External reference token bound into every market.
    pub reference_token: Address,
    /// Initial supply minted to the deployer by each pool token.
    pub token_supply: U256,
    /// Balance minted into each market and deposited to the issuer to start accrual.
    pub seed_amount: U256,
    /// `withUpdate` flag passed to the issuer when registering a pool.
    pub with_update: bool,
    /// Default coverage window for all pools.
    pub coverage: CoverageWindow,
    /// Issuer reward schedule.
    pub issuer: IssuerSchedule,
    /// Pools, in deployment order. A pool's index is its position in this list.
    pub pools: Vec<PoolConfig>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            beneficiary: DEFAULT_BENEFICIARY,
            reference_token: DEFAULT_REFERENCE_TOKEN,
            token_supply: U256::from(DEFAULT_TOKEN_SUPPLY),
            seed_amount: U256::from(1u64),
            with_update: true,
            coverage: CoverageWindow::default(),
            issuer: IssuerSchedule::default(),
            pools: vec![
                PoolConfig::staking("STAX2W"),
                PoolConfig::staking("STAX1M"),
                PoolConfig::staking("STAX1Y"),
                PoolConfig::insurance("iStax DAIUP Insurance", "iSTAXDAIUP"),
                PoolConfig::insurance("iStax DAIDOWN Insurance", "iSTAXDAIDOWN"),
                PoolConfig::insurance("iStax USDTUP Insurance", "iSTAXUSDTUP"),
                PoolConfig::insurance("iStax USDTDOWN Insurance", "iSTAXUSDTDOWN"),
                PoolConfig::insurance("iStax Swap Smart Contract Insurance", "iSTAXSWAPSC"),
                PoolConfig::insurance("iStax Staking Smart Contract Insurance", "iSTAXSTAKESC"),
            ],
        }
    }
}

impl DeploymentConfig {
    /// Check the configuration before anything touches the chain.
    pub fn validate(&self) -> Result<(), DeployError> {
        if self.beneficiary == Address::ZERO {
            return Err(DeployError::config("beneficiary address must not be zero"));
        }
        if self.reference_token == Address::ZERO {
            return Err(DeployError::config("reference token address must not be zero"));
        }
        if self.seed_amount.is_zero() {
            return Err(DeployError::config("seed amount must be greater than zero"));
        }

        self.coverage.validate()?;
        self.issuer.validate()?;

        if self.pools.is_empty() {
            return Err(DeployError::config("at least one pool must be configured"));
        }

        let mut symbols = HashSet::new();
        for (index, pool) in self.pools.iter().enumerate() {
            if pool.name.trim().is_empty() {
                return Err(DeployError::config(format!("pool {index} has an empty name")));
            }
            if pool.symbol.trim().is_empty() {
                return Err(DeployError::config(format!("pool {index} has an empty symbol")));
            }
            if !symbols.insert(pool.symbol.as_str()) {
                return Err(DeployError::config(format!(
                    "pool {index} reuses token symbol {}",
                    pool.symbol
                )));
            }
            if let Some(coverage) = &pool.coverage {
                coverage.validate()?;
            }
        }

        Ok(())
    }

    /// Number of pools of the given kind.
    pub fn count(&self, kind: PoolKind) -> usize {
        self.pools.iter().filter(|p| p.kind == kind).count()
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize deployment config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}
