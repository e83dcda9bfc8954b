//! Chain deployer collaborator.
//!
//! The orchestrator needs the chain id, the sending account, transaction submission and
//! receipt lookup. Submitting and waiting are separate so the transaction hash can be
//! checkpointed before the receipt arrives. [`ChainDeployer`] has a JSON-RPC
//! implementation for real nodes and a dry-run implementation for rehearsals.

mod dry_run;
mod json_rpc;

use std::future::Future;

use alloy_core::primitives::{Address, B256};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::abi::{ConstructorArgs, ContractCall};
use crate::artifacts::Artifact;

pub use dry_run::{DryRunChain, PlaceholderArtifacts};
pub use json_rpc::{ReceiptPolling, RpcChain, RpcChainBuilder};

/// A mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    /// False when the transaction reverted.
    pub success: bool,
    /// Set for contract creations.
    pub contract_address: Option<Address>,
}

impl TxReceipt {
    pub fn ensure_success(&self) -> Result<()> {
        if !self.success {
            anyhow::bail!(
                "Transaction {} reverted in block {}",
                self.tx_hash,
                self.block_number
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "?".to_string())
            );
        }
        Ok(())
    }

    /// Address of the contract this transaction created.
    pub fn deployed_address(&self) -> Result<Address> {
        match self.contract_address {
            Some(address) if address != Address::ZERO => Ok(address),
            _ => anyhow::bail!("Receipt of {} has no contract address", self.tx_hash),
        }
    }
}

/// Instantiates contracts and sends transactions on a target chain.
pub trait ChainDeployer: Send + Sync {
    /// Chain id of the target network.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Account every transaction is sent from.
    fn sender(&self) -> Address;

    /// Submit the creation of a contract from `artifact`, returning its transaction hash.
    fn submit_deployment(
        &self,
        artifact: &Artifact,
        args: &ConstructorArgs,
    ) -> impl Future<Output = Result<B256>> + Send;

    /// Submit `call` to the contract at `to`, returning its transaction hash.
    fn submit_call(&self, to: Address, call: &ContractCall) -> impl Future<Output = Result<B256>> + Send;

    /// Wait until `tx_hash` is mined and return its receipt, reverted or not.
    ///
    /// Fails when the transaction is still unknown or pending once the implementation
    /// stops waiting.
    fn wait_for_receipt(&self, tx_hash: B256) -> impl Future<Output = Result<TxReceipt>> + Send;
}
