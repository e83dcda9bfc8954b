//! Deployment report and operator-facing tables.

use std::collections::HashMap;
use std::fmt;

use alloy_core::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{Checkpoint, RunState};
use crate::config::PoolKind;
use crate::plan::{DeploymentPlan, Step, StepOutput};

/// File name of the report written next to the checkpoint.
pub const REPORT_FILENAME: &str = "deployment.json";

/// A deployed pool: its market, its token and what it was seeded with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Position of the pool in the plan, also its pool id at the issuer.
    pub index: usize,
    pub kind: PoolKind,
    pub symbol: String,
    pub weight: u64,
    pub market: Address,
    pub token: Address,
    pub seeded_balance: U256,
    pub activation_tx: B256,
}

/// Result of a completed deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub chain_id: u64,
    pub sender: Address,
    pub reward_token: Address,
    pub issuer: Address,
    pub pools: Vec<PoolRecord>,
    /// Steps executed by the run that produced this report.
    pub executed_steps: usize,
    /// Steps reused from an earlier, interrupted run.
    pub skipped_steps: usize,
}

impl DeploymentReport {
    /// Assemble the report from the outputs of a fully executed plan.
    pub fn from_outputs(
        plan: &DeploymentPlan,
        chain_id: u64,
        sender: Address,
        outputs: &HashMap<Step, StepOutput>,
        executed_steps: usize,
        skipped_steps: usize,
    ) -> Result<Self> {
        let address = |step: Step| {
            outputs
                .get(&step)
                .and_then(StepOutput::address)
                .with_context(|| format!("No contract recorded for {}", step))
        };
        let tx_hash = |step: Step| {
            outputs
                .get(&step)
                .map(StepOutput::tx_hash)
                .with_context(|| format!("No transaction recorded for {}", step))
        };

        let pools = plan
            .pools
            .iter()
            .map(|spec| {
                let pool = spec.index;
                // Seeding is recorded only once it is mined.
                tx_hash(Step::SeedMarket { pool })?;

                Ok(PoolRecord {
                    index: pool,
                    kind: spec.kind,
                    symbol: spec.symbol.clone(),
                    weight: spec.weight,
                    market: address(Step::DeployMarket { pool })?,
                    token: address(Step::DeployPoolToken { pool })?,
                    seeded_balance: plan.seed_amount,
                    activation_tx: tx_hash(Step::ActivateMarket { pool })?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chain_id,
            sender,
            reward_token: address(Step::DeployRewardToken)?,
            issuer: address(Step::DeployIssuer)?,
            pools,
            executed_steps,
            skipped_steps,
        })
    }

    /// Load a report written by a previous run.
    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read report from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse report JSON")
    }

    /// Table of the deployed pools.
    pub fn pools_table(&self) -> Table {
        let mut table = new_table(["#", "Symbol", "Kind", "Weight", "Market", "Token", "Seeded"]);
        for pool in &self.pools {
            table.add_row([
                pool.index.to_string(),
                pool.symbol.clone(),
                pool.kind.to_string(),
                pool.weight.to_string(),
                pool.market.to_string(),
                pool.token.to_string(),
                pool.seeded_balance.to_string(),
            ]);
        }
        table
    }
}

impl fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Chain:        {}", self.chain_id)?;
        writeln!(f, "Sender:       {}", self.sender)?;
        writeln!(f, "Reward token: {}", self.reward_token)?;
        writeln!(f, "Issuer:       {}", self.issuer)?;
        writeln!(
            f,
            "Steps:        {} executed, {} resumed",
            self.executed_steps, self.skipped_steps
        )?;
        writeln!(f)?;
        write!(f, "{}", self.pools_table())
    }
}

/// Table of a plan's steps with the steps each one consumes.
pub fn plan_table(plan: &DeploymentPlan) -> Table {
    let mut table = new_table(["#", "Step", "Pool", "Consumes"]);
    for (position, step) in plan.steps().into_iter().enumerate() {
        let pool = step
            .pool()
            .and_then(|index| plan.pool(index))
            .map(|spec| format!("{} ({})", spec.symbol, spec.kind))
            .unwrap_or_default();
        let consumes: Vec<String> = step.dependencies().iter().map(ToString::to_string).collect();

        table.add_row([
            position.to_string(),
            step.to_string(),
            pool,
            consumes.join(", "),
        ]);
    }
    table
}

/// Table of the steps a checkpoint records, with a one-line state summary above it.
pub struct CheckpointSummary<'a>(pub &'a Checkpoint);

impl fmt::Display for CheckpointSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let checkpoint = self.0;
        match &checkpoint.state {
            RunState::NotStarted => writeln!(f, "State: not started")?,
            RunState::InProgress => writeln!(f, "State: in progress")?,
            RunState::Complete => writeln!(f, "State: complete")?,
            RunState::Aborted { step, reason } => {
                writeln!(f, "State: ABORTED at {}", step)?;
                writeln!(f, "Reason: {}", reason)?;
            }
        }
        writeln!(
            f,
            "Chain: {}  Sender: {}  Plan: {}",
            checkpoint.chain_id, checkpoint.sender, checkpoint.plan_hash
        )?;
        writeln!(f)?;

        let mut table = new_table(["#", "Step", "Address", "Transaction", "Completed"]);
        for (position, completed) in checkpoint.steps.iter().enumerate() {
            let completed_at = chrono::DateTime::<chrono::Utc>::from_timestamp(completed.completed_at, 0)
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_default();
            table.add_row([
                position.to_string(),
                completed.step.to_string(),
                completed
                    .output
                    .address()
                    .map(|address| address.to_string())
                    .unwrap_or_default(),
                completed.output.tx_hash().to_string(),
                completed_at,
            ]);
        }
        write!(f, "{}", table)
    }
}

fn new_table<const N: usize>(header: [&str; N]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}
