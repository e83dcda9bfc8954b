//! Simulated chain for rehearsing a plan without a node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_core::primitives::{Address, B256, Bytes, keccak256};
use anyhow::{Context, Result};
use tokio::sync::Mutex;

use super::{ChainDeployer, TxReceipt};
use crate::abi::{self, ConstructorArgs, ContractCall};
use crate::artifacts::{Artifact, ContractFactory, ContractKind};

/// Chain id reported by the dry-run chain unless configured otherwise.
pub const DRY_RUN_CHAIN_ID: u64 = 1337;

/// A chain that mines every deployment and call as soon as it is submitted.
///
/// Addresses are derived from the sender and a local nonce, so the same plan always
/// yields the same addresses.
#[derive(Debug)]
pub struct DryRunChain {
    chain_id: u64,
    sender: Address,
    nonce: AtomicU64,
    receipts: Mutex<HashMap<B256, TxReceipt>>,
}

impl DryRunChain {
    pub fn new(sender: Address) -> Self {
        Self::with_chain_id(sender, DRY_RUN_CHAIN_ID)
    }

    pub fn with_chain_id(sender: Address, chain_id: u64) -> Self {
        Self {
            chain_id,
            sender,
            nonce: AtomicU64::new(0),
            receipts: Mutex::new(HashMap::new()),
        }
    }

    /// Number of transactions simulated so far.
    pub fn transaction_count(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::SeqCst)
    }

    fn tx_hash(&self, nonce: u64, payload: &[u8]) -> B256 {
        let mut preimage = self.sender.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(payload);
        keccak256(preimage)
    }

    /// Simulated contract address for a creation at `nonce`.
    fn contract_address(&self, nonce: u64) -> Address {
        let mut preimage = self.sender.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        Address::from_slice(&keccak256(preimage)[12..])
    }

    async fn mine(&self, nonce: u64, payload: &[u8], contract_address: Option<Address>) -> B256 {
        let tx_hash = self.tx_hash(nonce, payload);
        let receipt = TxReceipt {
            tx_hash,
            block_number: Some(nonce + 1),
            success: true,
            contract_address,
        };
        self.receipts.lock().await.insert(tx_hash, receipt);
        tx_hash
    }
}

impl ChainDeployer for DryRunChain {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn submit_deployment(&self, artifact: &Artifact, args: &ConstructorArgs) -> Result<B256> {
        let nonce = self.next_nonce();
        let data = abi::deploy_data(&artifact.bytecode, args);
        let address = self.contract_address(nonce);

        tracing::info!(
            contract = %artifact.kind,
            address = %address,
            args = %args,
            "[dry-run] deploy"
        );

        Ok(self.mine(nonce, &data, Some(address)).await)
    }

    async fn submit_call(&self, to: Address, call: &ContractCall) -> Result<B256> {
        let nonce = self.next_nonce();

        tracing::info!(to = %to, call = %call, "[dry-run] send");

        Ok(self.mine(nonce, &call.calldata(), None).await)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        self.receipts
            .lock()
            .await
            .get(&tx_hash)
            .copied()
            .with_context(|| format!("Unknown transaction {}", tx_hash))
    }
}

/// Factory that resolves every contract to empty bytecode, for dry runs without a build.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderArtifacts;

impl ContractFactory for PlaceholderArtifacts {
    fn resolve(&self, kind: ContractKind) -> Result<Artifact> {
        Ok(Artifact {
            kind,
            bytecode: Bytes::new(),
        })
    }
}
