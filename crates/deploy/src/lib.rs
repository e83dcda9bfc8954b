//! istax-deploy - Deployment library for the iStax contract suite.
//!
//! This crate turns a [`DeploymentConfig`] into an ordered [`DeploymentPlan`] and executes
//! it against a chain: reward token, issuer, then one token and one market per pool, each
//! registered at the issuer, seeded and activated. Progress is checkpointed so an
//! interrupted run resumes instead of redeploying.

pub mod abi;
pub use abi::{ConstructorArgs, ContractCall};

mod artifacts;
pub use artifacts::{Artifact, ArtifactDir, ContractFactory, ContractKind};

pub mod chain;
pub use chain::{
    ChainDeployer, DryRunChain, PlaceholderArtifacts, ReceiptPolling, RpcChain, RpcChainBuilder,
    TxReceipt,
};

mod checkpoint;
pub use checkpoint::{
    CHECKPOINT_FILENAME, Checkpoint, CheckpointStore, CompletedStep, PendingStep, RunState,
};

mod config;
pub use config::{
    CONFIG_FILENAME, CoverageWindow, DEFAULT_BENEFICIARY, DEFAULT_POOL_WEIGHT,
    DEFAULT_REFERENCE_TOKEN, DEFAULT_TOKEN_SUPPLY, DeploymentConfig, IssuerSchedule, PoolConfig,
    PoolKind,
};

mod error;
pub use error::{BoxError, DeployError};

mod fs;

mod orchestrator;
pub use orchestrator::Orchestrator;

mod plan;
pub use plan::{DeploymentPlan, PoolSpec, Step, StepOutput};

mod report;
pub use report::{CheckpointSummary, DeploymentReport, PoolRecord, REPORT_FILENAME, plan_table};

pub mod rpc;
