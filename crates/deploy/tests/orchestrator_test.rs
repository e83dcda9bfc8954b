//! Integration tests for the deployment orchestrator.
//!
//! These tests drive full runs against an in-memory chain that records every mined
//! transaction, and can be told to reject, revert or lose the receipt of a given one.
//! Run with: cargo test --test orchestrator_test

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use alloy_core::primitives::{Address, B256, U256, keccak256};
use anyhow::{Context, Result};
use istax_deploy::{
    Artifact, ArtifactDir, ChainDeployer, CheckpointStore, ConstructorArgs, ContractCall,
    ContractKind, DeployError, DeploymentConfig, DeploymentPlan, DryRunChain, Orchestrator,
    PlaceholderArtifacts, PoolConfig, PoolKind, REPORT_FILENAME, RunState, Step, TxReceipt,
};
use tempdir::TempDir;

const CHAIN_ID: u64 = 31337;

/// A mined transaction, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Deploy {
        kind: ContractKind,
        args: ConstructorArgs,
        address: Address,
    },
    Send {
        to: Address,
        call: ContractCall,
    },
}

/// In-memory chain recording every transaction.
struct RecordingChain {
    chain_id: u64,
    sender: Address,
    /// Salt mixed into generated addresses so two chains never collide.
    salt: u8,
    /// Zero-based submission index the chain refuses.
    reject_at: Option<usize>,
    /// Submission index mined as reverted.
    revert_at: Option<usize>,
    /// Submission index mined fine whose first receipt lookup times out.
    lose_receipt_at: Option<usize>,
    /// Directory deleted when the rejected submission arrives.
    wipe_on_reject: Option<PathBuf>,
    events: Mutex<Vec<Event>>,
    submitted: Mutex<usize>,
    receipts: Mutex<HashMap<B256, TxReceipt>>,
    lost: Mutex<HashSet<B256>>,
}

impl RecordingChain {
    fn new(salt: u8) -> Self {
        Self {
            chain_id: CHAIN_ID,
            sender: Address::repeat_byte(0xde),
            salt,
            reject_at: None,
            revert_at: None,
            lose_receipt_at: None,
            wipe_on_reject: None,
            events: Mutex::new(Vec::new()),
            submitted: Mutex::new(0),
            receipts: Mutex::new(HashMap::new()),
            lost: Mutex::new(HashSet::new()),
        }
    }

    fn rejecting_at(mut self, index: usize) -> Self {
        self.reject_at = Some(index);
        self
    }

    fn reverting_at(mut self, index: usize) -> Self {
        self.revert_at = Some(index);
        self
    }

    fn losing_receipt_at(mut self, index: usize) -> Self {
        self.lose_receipt_at = Some(index);
        self
    }

    fn wiping_on_reject(mut self, dir: PathBuf) -> Self {
        self.wipe_on_reject = Some(dir);
        self
    }

    fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Number of transactions submitted, rejected ones included.
    fn submissions(&self) -> usize {
        *self.submitted.lock().unwrap()
    }

    fn tx_hash(&self, index: usize) -> B256 {
        keccak256([self.salt, index as u8, 0x01])
    }

    /// Accept (or reject) a submission and mine it immediately.
    fn submit(&self, creates_contract: bool, event: impl FnOnce(Address) -> Event) -> Result<B256> {
        let index = {
            let mut submitted = self.submitted.lock().unwrap();
            *submitted += 1;
            *submitted - 1
        };

        if self.reject_at == Some(index) {
            if let Some(dir) = &self.wipe_on_reject {
                std::fs::remove_dir_all(dir)?;
            }
            anyhow::bail!("execution reverted (transaction {})", index);
        }

        let tx_hash = self.tx_hash(index);
        let success = self.revert_at != Some(index);
        let address = Address::from_slice(&keccak256([self.salt, index as u8])[12..]);
        if success {
            self.events.lock().unwrap().push(event(address));
        }
        if self.lose_receipt_at == Some(index) {
            self.lost.lock().unwrap().insert(tx_hash);
        }

        self.receipts.lock().unwrap().insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: Some(index as u64 + 1),
                success,
                contract_address: (creates_contract && success).then_some(address),
            },
        );
        Ok(tx_hash)
    }
}

impl ChainDeployer for RecordingChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn submit_deployment(&self, artifact: &Artifact, args: &ConstructorArgs) -> Result<B256> {
        self.submit(true, |address| Event::Deploy {
            kind: artifact.kind,
            args: args.clone(),
            address,
        })
    }

    async fn submit_call(&self, to: Address, call: &ContractCall) -> Result<B256> {
        self.submit(false, |_| Event::Send { to, call: *call })
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        if self.lost.lock().unwrap().remove(&tx_hash) {
            anyhow::bail!("Transaction {} was not confirmed after 3 receipt lookups", tx_hash);
        }
        self.receipts
            .lock()
            .unwrap()
            .get(&tx_hash)
            .copied()
            .with_context(|| format!("Unknown transaction {}", tx_hash))
    }
}

/// Contracts a constructor references, besides the configured external addresses.
fn referenced_contracts(args: &ConstructorArgs) -> Vec<Address> {
    match args {
        ConstructorArgs::Issuer { reward_token, .. } => vec![*reward_token],
        ConstructorArgs::Market {
            issuer,
            reward_token,
            pool_token,
            ..
        } => vec![*issuer, *reward_token, *pool_token],
        ConstructorArgs::Empty | ConstructorArgs::PoolToken { .. } => Vec::new(),
    }
}

/// `add` calls registering `token`.
fn registrations_of(events: &[Event], token: Address) -> usize {
    events
        .iter()
        .filter(|event| {
            matches!(event, Event::Send { call: ContractCall::AddPool { token: registered, .. }, .. } if *registered == token)
        })
        .count()
}

/// A configuration with `staking` staking pools followed by `insurance` insurance pools.
fn config_with(staking: usize, insurance: usize) -> DeploymentConfig {
    let mut config = DeploymentConfig::default();
    config.pools = (0..staking)
        .map(|i| PoolConfig::staking(&format!("STAX{i}")))
        .chain((0..insurance).map(|i| PoolConfig::insurance("iStax Insurance", &format!("iSTAX{i}"))))
        .collect();
    config
}

fn plan_with(staking: usize, insurance: usize) -> DeploymentPlan {
    DeploymentPlan::from_config(&config_with(staking, insurance)).expect("valid plan")
}

#[tokio::test]
async fn test_seven_pools_seeded_and_activated_once() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let chain = RecordingChain::new(1);
    let plan = plan_with(3, 4);

    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;

    assert_eq!(report.pools.len(), 7, "One record per planned pool");
    assert_eq!(report.executed_steps, plan.steps().len());
    assert_eq!(report.skipped_steps, 0);

    let events = chain.events();
    for (position, pool) in report.pools.iter().enumerate() {
        assert_eq!(pool.index, position, "Pool index should match plan position");
        assert_eq!(pool.seeded_balance, U256::from(1u64));
        assert_eq!(
            pool.kind,
            if position < 3 { PoolKind::Staking } else { PoolKind::Insurance }
        );

        let mints: Vec<&Event> = events
            .iter()
            .filter(|event| matches!(event, Event::Send { to, call: ContractCall::Mint { .. } } if *to == pool.token))
            .collect();
        assert_eq!(mints.len(), 1, "Pool {position} should be seeded exactly once");
        assert_eq!(
            mints[0],
            &Event::Send {
                to: pool.token,
                call: ContractCall::mint(pool.market, U256::from(1u64)),
            }
        );

        let activations = events
            .iter()
            .filter(|event| matches!(event, Event::Send { to, call: ContractCall::DepositToChef { .. } } if *to == pool.market))
            .count();
        assert_eq!(activations, 1, "Pool {position} should be activated exactly once");
    }

    assert!(temp_dir.path().join(REPORT_FILENAME).exists());
    let checkpoint = store.load()?.expect("checkpoint should exist");
    assert_eq!(checkpoint.state, RunState::Complete);

    Ok(())
}

#[tokio::test]
async fn test_contracts_are_wired_from_earlier_outputs() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let chain = RecordingChain::new(2);
    let plan = plan_with(2, 2);

    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;

    let mut deployed = HashSet::new();
    let mut registered = Vec::new();
    for event in chain.events() {
        match event {
            Event::Deploy { kind, args, address } => {
                for referenced in referenced_contracts(&args) {
                    assert!(
                        deployed.contains(&referenced),
                        "{kind} constructor references {referenced} before it exists"
                    );
                }
                deployed.insert(address);
            }
            Event::Send { to, call } => {
                assert!(deployed.contains(&to), "{call} targets {to} before it exists");
                if let ContractCall::AddPool {
                    token, with_update, ..
                } = call
                {
                    assert!(deployed.contains(&token), "Registered token must already exist");
                    assert_eq!(to, report.issuer, "Pools are registered at the issuer");
                    assert!(with_update, "withUpdate follows the plan");
                    registered.push(token);
                }
            }
        }
    }

    let tokens: Vec<Address> = report.pools.iter().map(|pool| pool.token).collect();
    assert_eq!(registered, tokens, "Each pool registers its own token, in plan order");
    assert_eq!(
        tokens.iter().collect::<HashSet<_>>().len(),
        tokens.len(),
        "Every pool gets a distinct token"
    );

    Ok(())
}

#[tokio::test]
async fn test_market_constructor_arguments() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let chain = RecordingChain::new(3);
    let plan = plan_with(1, 1);

    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;

    let markets: Vec<ConstructorArgs> = chain
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Deploy {
                kind: ContractKind::Market,
                args,
                ..
            } => Some(args),
            _ => None,
        })
        .collect();
    assert_eq!(markets.len(), 2);

    for (position, args) in markets.iter().enumerate() {
        let pool = &report.pools[position];
        let coverage = plan.pools[position].coverage;
        assert_eq!(
            args,
            &ConstructorArgs::Market {
                issuer: report.issuer,
                reference_token: plan.reference_token,
                reward_token: report.reward_token,
                pool_token: pool.token,
                coverage_start: coverage.start,
                coverage_end: coverage.end,
                pool_index: position,
            }
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_abort_then_resume_without_repeats() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let plan = plan_with(3, 4);
    let steps = plan.steps();
    let fail_at = 12;

    {
        let store = CheckpointStore::open(temp_dir.path())?;
        let chain = RecordingChain::new(4).rejecting_at(fail_at);
        let err = Orchestrator::new(&chain, &PlaceholderArtifacts)
            .run(&plan, &store)
            .await
            .expect_err("run should abort");

        match err.downcast_ref::<DeployError>() {
            Some(DeployError::ExternalCall { step, .. }) => assert_eq!(*step, steps[fail_at]),
            other => panic!("expected an external call failure, got {other:?}"),
        }

        let checkpoint = store.load()?.expect("checkpoint should exist");
        assert_eq!(checkpoint.steps.len(), fail_at, "Steps before the failure are recorded");
        let recorded: Vec<Step> = checkpoint.steps.iter().map(|c| c.step).collect();
        assert_eq!(recorded, steps[..fail_at].to_vec());
        assert!(matches!(
            &checkpoint.state,
            RunState::Aborted { step, reason } if *step == steps[fail_at] && reason.contains("execution reverted")
        ));
        assert!(!temp_dir.path().join(REPORT_FILENAME).exists());
    }

    let store = CheckpointStore::open(temp_dir.path())?;
    let chain = RecordingChain::new(5);
    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;

    assert_eq!(report.skipped_steps, fail_at);
    assert_eq!(report.executed_steps, steps.len() - fail_at);
    assert_eq!(
        chain.events().len(),
        steps.len() - fail_at,
        "Resumed run submits only the remaining steps"
    );
    assert!(
        !chain.events().iter().any(|event| matches!(
            event,
            Event::Deploy {
                kind: ContractKind::RewardToken | ContractKind::Issuer,
                ..
            }
        )),
        "Reward token and issuer must not be redeployed"
    );

    let checkpoint = store.load()?.expect("checkpoint should exist");
    assert_eq!(checkpoint.state, RunState::Complete);
    let recorded: Vec<Step> = checkpoint.steps.iter().map(|c| c.step).collect();
    assert_eq!(recorded, steps, "Every step is recorded exactly once, in order");

    Ok(())
}

#[tokio::test]
async fn test_checkpoint_from_other_plan_or_chain_is_refused() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let plan = plan_with(1, 1);

    let chain = RecordingChain::new(6).rejecting_at(3);
    assert!(
        Orchestrator::new(&chain, &PlaceholderArtifacts)
            .run(&plan, &store)
            .await
            .is_err()
    );

    let other_chain = RecordingChain::new(7).with_chain_id(1);
    let err = Orchestrator::new(&other_chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await
        .expect_err("checkpoint from another chain should be refused");
    let deploy_err = err.downcast_ref::<DeployError>().expect("typed error");
    assert!(deploy_err.is_config());
    assert!(other_chain.events().is_empty(), "Nothing is submitted on mismatch");

    let other_plan = plan_with(2, 1);
    let chain = RecordingChain::new(8);
    let err = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&other_plan, &store)
        .await
        .expect_err("checkpoint from another plan should be refused");
    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::CheckpointMismatch { field: "plan", .. })
    ));
    assert!(chain.events().is_empty());

    // A fresh run archives the old checkpoint and starts over.
    let archived = store.archive()?.expect("checkpoint should be archived");
    assert!(archived.exists());
    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&other_plan, &store)
        .await?;
    assert_eq!(report.pools.len(), 3);
    assert_eq!(report.skipped_steps, 0);

    Ok(())
}

#[tokio::test]
async fn test_dry_run_end_to_end() -> Result<()> {
    let temp_dir = TempDir::new("istax-dry-run")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let plan = DeploymentPlan::from_config(&DeploymentConfig::default())?;
    let chain = DryRunChain::new(Address::repeat_byte(0x11));

    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;

    assert_eq!(report.pools.len(), 9);
    assert_eq!(chain.transaction_count() as usize, plan.steps().len());
    assert_eq!(report.pools[8].symbol, "iSTAXSTAKESC");

    // Rerunning a completed checkpoint submits nothing.
    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;
    assert_eq!(report.executed_steps, 0);
    assert_eq!(report.skipped_steps, plan.steps().len());
    assert_eq!(chain.transaction_count() as usize, plan.steps().len());

    Ok(())
}

#[tokio::test]
async fn test_lost_receipt_is_awaited_not_resent() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let plan = plan_with(1, 1);
    let steps = plan.steps();
    let register = Step::RegisterPool { pool: 0 };
    assert_eq!(steps[4], register);

    let chain = RecordingChain::new(9).losing_receipt_at(4);
    let err = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await
        .expect_err("run should abort while the receipt is missing");
    assert!(matches!(
        err.downcast_ref::<DeployError>(),
        Some(DeployError::ExternalCall { step, .. }) if *step == register
    ));

    let checkpoint = store.load()?.expect("checkpoint should exist");
    assert_eq!(checkpoint.steps.len(), 4);
    let pending = checkpoint.pending_tx(register).expect("submitted transaction is pending");

    // The transaction was mined meanwhile; the rerun settles it instead of sending it again.
    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;

    assert_eq!(chain.submissions(), steps.len(), "No transaction is sent twice");
    let events = chain.events();
    for pool in &report.pools {
        assert_eq!(registrations_of(&events, pool.token), 1, "Pool {} is registered once", pool.index);
    }

    let checkpoint = store.load()?.expect("checkpoint should exist");
    assert_eq!(checkpoint.state, RunState::Complete);
    assert!(checkpoint.pending.is_none());
    let recorded = checkpoint
        .steps
        .iter()
        .find(|completed| completed.step == register)
        .expect("registration recorded");
    assert_eq!(recorded.output.tx_hash(), pending);

    Ok(())
}

#[tokio::test]
async fn test_lost_deployment_receipt_keeps_the_contract() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let plan = plan_with(1, 1);
    let token_step = Step::DeployPoolToken { pool: 0 };
    assert_eq!(plan.steps()[2], token_step);

    let chain = RecordingChain::new(10).losing_receipt_at(2);
    assert!(
        Orchestrator::new(&chain, &PlaceholderArtifacts)
            .run(&plan, &store)
            .await
            .is_err()
    );
    let first_token = match &chain.events()[2] {
        Event::Deploy { address, .. } => *address,
        other => panic!("expected the pool token deployment, got {other:?}"),
    };

    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;

    let token_deployments = chain
        .events()
        .iter()
        .filter(|event| matches!(event, Event::Deploy { kind: ContractKind::StakingToken, .. }))
        .count();
    assert_eq!(token_deployments, 1, "The staking token is deployed once");
    assert_eq!(report.pools[0].token, first_token);
    assert_eq!(registrations_of(&chain.events(), first_token), 1);

    Ok(())
}

#[tokio::test]
async fn test_reverted_transaction_is_sent_again_on_resume() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let plan = plan_with(1, 1);
    let steps = plan.steps();

    let chain = RecordingChain::new(11).reverting_at(4);
    let err = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await
        .expect_err("reverted registration aborts the run");
    assert!(format!("{:#}", err).contains("reverted"));

    let checkpoint = store.load()?.expect("checkpoint should exist");
    assert!(checkpoint.pending.is_none(), "A reverted transaction is settled");
    assert!(matches!(
        &checkpoint.state,
        RunState::Aborted { step, .. } if *step == steps[4]
    ));

    let report = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await?;
    assert_eq!(chain.submissions(), steps.len() + 1);
    assert_eq!(registrations_of(&chain.events(), report.pools[0].token), 1);

    Ok(())
}

#[tokio::test]
async fn test_abort_reports_the_step_error_when_checkpoint_write_fails() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let state_dir = temp_dir.path().join("state");
    let store = CheckpointStore::open(&state_dir)?;
    let plan = plan_with(1, 1);
    let steps = plan.steps();

    let chain = RecordingChain::new(12)
        .rejecting_at(3)
        .wiping_on_reject(state_dir.clone());
    let err = Orchestrator::new(&chain, &PlaceholderArtifacts)
        .run(&plan, &store)
        .await
        .expect_err("run should abort");

    assert!(!state_dir.exists());
    match err.downcast_ref::<DeployError>() {
        Some(DeployError::ExternalCall { step, source }) => {
            assert_eq!(*step, steps[3]);
            assert!(source.to_string().contains("execution reverted (transaction 3)"));
        }
        other => panic!("expected the step failure, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_missing_artifact_is_a_config_error() -> Result<()> {
    let temp_dir = TempDir::new("istax-orchestrator")?;
    let artifacts_dir = TempDir::new("istax-artifacts")?;
    let store = CheckpointStore::open(temp_dir.path())?;
    let artifacts = ArtifactDir::new(artifacts_dir.path())?;
    let plan = plan_with(1, 0);
    let chain = RecordingChain::new(13);

    let err = Orchestrator::new(&chain, &artifacts)
        .run(&plan, &store)
        .await
        .expect_err("run should stop at the first artifact");

    let deploy_err = err.downcast_ref::<DeployError>().expect("typed error");
    assert!(deploy_err.is_config(), "got {deploy_err}");
    assert!(deploy_err.to_string().contains("iStaxToken artifact"));
    assert_eq!(chain.submissions(), 0);

    let checkpoint = store.load()?.expect("checkpoint should exist");
    assert!(matches!(
        checkpoint.state,
        RunState::Aborted {
            step: Step::DeployRewardToken,
            ..
        }
    ));

    Ok(())
}
