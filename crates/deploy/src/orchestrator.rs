//! The deployment orchestrator.
//!
//! Walks the plan's steps in order against a [`ChainDeployer`], checkpointing after each
//! step. Any failure aborts the run; completed steps stay recorded so a rerun resumes
//! where the previous one stopped. A submitted transaction is checkpointed before its
//! receipt is awaited, and a rerun waits for it instead of submitting the step again.

use std::collections::HashMap;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};

use crate::abi::{ConstructorArgs, ContractCall};
use crate::artifacts::{ContractFactory, ContractKind};
use crate::chain::{ChainDeployer, TxReceipt};
use crate::checkpoint::{Checkpoint, CheckpointStore, RunState};
use crate::error::DeployError;
use crate::plan::{DeploymentPlan, PoolSpec, Step, StepOutput};
use crate::report::{DeploymentReport, REPORT_FILENAME};

/// Outputs of the steps completed so far.
type Outputs = HashMap<Step, StepOutput>;

/// The transaction a step sends.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
    Deploy {
        kind: ContractKind,
        args: ConstructorArgs,
    },
    Call {
        to: Address,
        call: ContractCall,
    },
}

/// Runs a [`DeploymentPlan`] against a chain, resolving contracts through a factory.
pub struct Orchestrator<'a, C, F> {
    chain: &'a C,
    factory: &'a F,
}

impl<'a, C, F> Orchestrator<'a, C, F>
where
    C: ChainDeployer,
    F: ContractFactory,
{
    pub fn new(chain: &'a C, factory: &'a F) -> Self {
        Self { chain, factory }
    }

    /// Execute every step of `plan` that `store`'s checkpoint does not already record.
    pub async fn run(&self, plan: &DeploymentPlan, store: &CheckpointStore) -> Result<DeploymentReport> {
        let plan_hash = plan.compute_hash()?;
        let chain_id = self
            .chain
            .chain_id()
            .await
            .context("Failed to query chain id")?;
        let sender = self.chain.sender();

        let mut checkpoint = match store.load()? {
            Some(existing) => {
                existing.ensure_matches(&store.checkpoint_path(), &plan_hash, chain_id, sender)?;
                tracing::info!(
                    completed_steps = existing.steps.len(),
                    state = ?existing.state,
                    "Resuming from checkpoint"
                );
                existing
            }
            None => Checkpoint::new(plan_hash, chain_id, sender),
        };

        let steps = plan.steps();
        let total = steps.len();
        let mut outputs: Outputs = checkpoint
            .steps
            .iter()
            .map(|completed| (completed.step, completed.output))
            .collect();
        let skipped = outputs.len();

        tracing::info!(
            chain_id,
            sender = %sender,
            pools = plan.pools.len(),
            total_steps = total,
            skipped_steps = skipped,
            "Starting deployment"
        );

        if !checkpoint.is_complete() {
            checkpoint.set_state(RunState::InProgress);
            store.save(&checkpoint)?;
        }

        let mut executed = 0;
        for (position, step) in steps.into_iter().enumerate() {
            if outputs.contains_key(&step) {
                tracing::debug!(step = %step, "Step already completed, skipping");
                continue;
            }

            tracing::info!(step = %step, progress = %format!("{}/{}", position + 1, total), "Executing step");

            let result = match check_dependencies(step, &outputs) {
                Ok(()) => match action(plan, step, &outputs) {
                    Ok(action) => self.execute(step, &action, &mut checkpoint, store).await,
                    Err(err) => Err(err),
                },
                Err(err) => Err(err.into()),
            };

            match result {
                Ok(output) => {
                    checkpoint.record(step, output);
                    store.save(&checkpoint).with_context(|| {
                        format!(
                            "Step {} completed in transaction {} but could not be checkpointed",
                            step,
                            output.tx_hash()
                        )
                    })?;
                    outputs.insert(step, output);
                    executed += 1;
                }
                Err(err) => {
                    let reason = format!("{:#}", err);
                    tracing::error!(step = %step, error = %reason, "Step failed, aborting deployment");

                    checkpoint.set_state(RunState::Aborted { step, reason });
                    if let Err(save_err) = store.save(&checkpoint) {
                        tracing::error!(
                            step = %step,
                            error = %format!("{:#}", save_err),
                            "Failed to record the aborted step in the checkpoint"
                        );
                    }

                    return Err(match err.downcast::<DeployError>() {
                        Ok(typed) => typed.into(),
                        Err(err) => DeployError::external(step, err).into(),
                    });
                }
            }
        }

        checkpoint.set_state(RunState::Complete);
        store.save(&checkpoint)?;

        let report = DeploymentReport::from_outputs(plan, chain_id, sender, &outputs, executed, skipped)?;
        let report_path = store.write_json(REPORT_FILENAME, &report)?;

        tracing::info!(
            executed_steps = executed,
            skipped_steps = skipped,
            report = %report_path.display(),
            "✓ Deployment complete!"
        );

        Ok(report)
    }

    /// Send the transaction of `step`, or settle the one a previous run left pending.
    async fn execute(
        &self,
        step: Step,
        action: &Action,
        checkpoint: &mut Checkpoint,
        store: &CheckpointStore,
    ) -> Result<StepOutput> {
        if let Some(tx_hash) = checkpoint.pending_tx(step) {
            tracing::info!(step = %step, tx_hash = %tx_hash, "Waiting for transaction submitted by a previous run");

            let receipt = self.chain.wait_for_receipt(tx_hash).await?;
            if receipt.success {
                return output_of(step, action, &receipt);
            }

            tracing::warn!(step = %step, tx_hash = %tx_hash, "Previous transaction reverted, submitting again");
            checkpoint.clear_pending();
            store.save(checkpoint)?;
        }

        let tx_hash = match action {
            Action::Deploy { kind, args } => {
                let artifact = self.factory.resolve(*kind)?;
                self.chain.submit_deployment(&artifact, args).await?
            }
            Action::Call { to, call } => self.chain.submit_call(*to, call).await?,
        };

        checkpoint.set_pending(step, tx_hash);
        store.save(checkpoint).with_context(|| {
            format!(
                "Transaction {} of step {} was submitted but could not be checkpointed",
                tx_hash, step
            )
        })?;

        let receipt = self.chain.wait_for_receipt(tx_hash).await?;
        if !receipt.success {
            checkpoint.clear_pending();
            receipt.ensure_success()?;
        }

        output_of(step, action, &receipt)
    }
}

/// Output of `step` once its transaction is mined successfully.
fn output_of(step: Step, action: &Action, receipt: &TxReceipt) -> Result<StepOutput> {
    match action {
        Action::Deploy { kind, .. } => {
            let address = receipt.deployed_address()?;
            tracing::info!(
                step = %step,
                contract = %kind,
                address = %address,
                tx_hash = %receipt.tx_hash,
                "Contract deployed"
            );
            Ok(StepOutput::Contract {
                address,
                tx_hash: receipt.tx_hash,
            })
        }
        Action::Call { to, call } => {
            tracing::info!(
                step = %step,
                to = %to,
                call = %call,
                tx_hash = %receipt.tx_hash,
                "Transaction confirmed"
            );
            Ok(StepOutput::Transaction {
                tx_hash: receipt.tx_hash,
            })
        }
    }
}

/// The transaction `step` sends, built from the plan and earlier outputs.
fn action(plan: &DeploymentPlan, step: Step, outputs: &Outputs) -> Result<Action> {
    let action = match step {
        Step::DeployRewardToken => Action::Deploy {
            kind: ContractKind::RewardToken,
            args: ConstructorArgs::Empty,
        },

        Step::DeployIssuer => Action::Deploy {
            kind: ContractKind::Issuer,
            args: ConstructorArgs::Issuer {
                reward_token: address_of(outputs, step, Step::DeployRewardToken)?,
                beneficiary: plan.beneficiary,
                schedule: plan.issuer,
            },
        },

        Step::DeployPoolToken { pool } => {
            let spec = pool_spec(plan, pool)?;
            Action::Deploy {
                kind: ContractKind::pool_token(spec.kind),
                args: ConstructorArgs::PoolToken {
                    name: spec.name.clone(),
                    symbol: spec.symbol.clone(),
                    initial_supply: plan.token_supply,
                },
            }
        }

        Step::RegisterPool { pool } => {
            let spec = pool_spec(plan, pool)?;
            Action::Call {
                to: address_of(outputs, step, Step::DeployIssuer)?,
                call: ContractCall::add_pool(
                    spec.weight,
                    address_of(outputs, step, Step::DeployPoolToken { pool })?,
                    plan.with_update,
                ),
            }
        }

        Step::DeployMarket { pool } => {
            let spec = pool_spec(plan, pool)?;
            Action::Deploy {
                kind: ContractKind::Market,
                args: ConstructorArgs::Market {
                    issuer: address_of(outputs, step, Step::DeployIssuer)?,
                    reference_token: plan.reference_token,
                    reward_token: address_of(outputs, step, Step::DeployRewardToken)?,
                    pool_token: address_of(outputs, step, Step::DeployPoolToken { pool })?,
                    coverage_start: spec.coverage.start,
                    coverage_end: spec.coverage.end,
                    pool_index: spec.index,
                },
            }
        }

        Step::SeedMarket { pool } => Action::Call {
            to: address_of(outputs, step, Step::DeployPoolToken { pool })?,
            call: ContractCall::mint(
                address_of(outputs, step, Step::DeployMarket { pool })?,
                plan.seed_amount,
            ),
        },

        Step::ActivateMarket { pool } => Action::Call {
            to: address_of(outputs, step, Step::DeployMarket { pool })?,
            call: ContractCall::deposit_to_chef(plan.seed_amount),
        },
    };
    Ok(action)
}

/// Every dependency of `step` must have produced an output already.
fn check_dependencies(step: Step, outputs: &Outputs) -> Result<(), DeployError> {
    match step.dependencies().into_iter().find(|dep| !outputs.contains_key(dep)) {
        Some(missing) => Err(DeployError::Ordering { step, missing }),
        None => Ok(()),
    }
}

/// Address produced by the deployment step `dependency`, as consumed by `step`.
fn address_of(outputs: &Outputs, step: Step, dependency: Step) -> Result<Address, DeployError> {
    outputs
        .get(&dependency)
        .and_then(StepOutput::address)
        .ok_or(DeployError::Ordering {
            step,
            missing: dependency,
        })
}

fn pool_spec(plan: &DeploymentPlan, pool: usize) -> Result<&PoolSpec> {
    plan.pool(pool)
        .with_context(|| format!("Pool {} is not part of the plan", pool))
}
