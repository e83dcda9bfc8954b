//! [`ChainDeployer`] over HTTP JSON-RPC.
//!
//! Transactions go through `eth_sendTransaction`, so the sender must be an account the
//! node manages (Ganache, Anvil and Hardhat nodes unlock their dev accounts).

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{ChainDeployer, TxReceipt};
use crate::abi::{self, ConstructorArgs, ContractCall};
use crate::artifacts::Artifact;
use crate::rpc;

/// Default delay between two receipt lookups.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default number of receipt lookups before giving up on a transaction.
pub const DEFAULT_POLL_ATTEMPTS: usize = 150;

/// How receipts are awaited after a transaction is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub max_attempts: usize,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// Receipt fields we care about, as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    #[serde(default, deserialize_with = "rpc::deserialize_opt_u64_from_hex")]
    block_number: Option<u64>,
    /// Absent on pre-Byzantium chains.
    #[serde(default, deserialize_with = "rpc::deserialize_opt_u64_from_hex")]
    status: Option<u64>,
    #[serde(default)]
    contract_address: Option<Address>,
}

impl From<RawReceipt> for TxReceipt {
    fn from(raw: RawReceipt) -> Self {
        TxReceipt {
            tx_hash: raw.transaction_hash,
            block_number: raw.block_number,
            success: raw.status != Some(0),
            contract_address: raw.contract_address,
        }
    }
}

/// JSON-RPC backed chain deployer.
#[derive(Debug, Clone)]
pub struct RpcChain {
    client: reqwest::Client,
    url: Url,
    sender: Address,
    polling: ReceiptPolling,
    gas_limit: Option<u64>,
}

impl RpcChain {
    async fn call<T: serde::de::DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        rpc::json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    /// Submit a transaction through `eth_sendTransaction`.
    async fn transact(&self, to: Option<Address>, data: Bytes) -> Result<B256> {
        let mut tx = serde_json::json!({
            "from": self.sender,
            "data": data,
        });
        if let Some(to) = to {
            tx["to"] = serde_json::json!(to);
        }
        if let Some(gas) = self.gas_limit {
            tx["gas"] = serde_json::json!(format!("0x{:x}", gas));
        }

        let tx_hash: B256 = self
            .call("eth_sendTransaction", vec![tx])
            .await
            .context("Failed to send transaction")?;

        tracing::debug!(tx_hash = %tx_hash, "Transaction submitted");
        Ok(tx_hash)
    }
}

impl ChainDeployer for RpcChain {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id: String = self.call("eth_chainId", vec![]).await?;
        rpc::parse_hex_u64(&chain_id)
    }

    fn sender(&self) -> Address {
        self.sender
    }

    async fn submit_deployment(&self, artifact: &Artifact, args: &ConstructorArgs) -> Result<B256> {
        let data = abi::deploy_data(&artifact.bytecode, args);

        tracing::debug!(
            contract = %artifact.kind,
            args = %args,
            data_len = data.len(),
            "Deploying contract"
        );

        self.transact(None, data)
            .await
            .with_context(|| format!("Failed to deploy {}", artifact.kind))
    }

    async fn submit_call(&self, to: Address, call: &ContractCall) -> Result<B256> {
        self.transact(Some(to), call.calldata())
            .await
            .with_context(|| format!("Call {} on {} failed", call, to))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt> {
        let fetch = || async move {
            let receipt: Option<RawReceipt> = self
                .call(
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(tx_hash)],
                )
                .await?;
            receipt.context("Transaction receipt not available yet")
        };

        let receipt = fetch
            .retry(
                ConstantBuilder::default()
                    .with_delay(self.polling.interval)
                    .with_max_times(self.polling.max_attempts.saturating_sub(1)),
            )
            .notify(|err, delay| {
                tracing::trace!(tx_hash = %tx_hash, error = %err, ?delay, "Receipt lookup failed, retrying...");
            })
            .await
            .with_context(|| {
                format!(
                    "Transaction {} was not confirmed after {} receipt lookups",
                    tx_hash, self.polling.max_attempts
                )
            })?;

        Ok(receipt.into())
    }
}

/// Builder for an [`RpcChain`].
///
/// # Example
///
/// ```no_run
/// use istax_deploy::RpcChainBuilder;
///
/// # async fn example() -> anyhow::Result<()> {
/// let chain = RpcChainBuilder::new("http://127.0.0.1:8545")
///     .gas_limit(6_000_000)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RpcChainBuilder {
    /// The RPC endpoint.
    url: String,
    /// Sending account (optional, first node account if not provided).
    sender: Option<Address>,
    /// Receipt polling settings.
    polling: ReceiptPolling,
    /// Explicit gas limit (optional, node estimates if not provided).
    gas_limit: Option<u64>,
    /// HTTP request timeout.
    request_timeout: Duration,
}

impl RpcChainBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sender: None,
            polling: ReceiptPolling::default(),
            gas_limit: None,
            request_timeout: rpc::DEFAULT_TIMEOUT,
        }
    }

    /// Set the sending account.
    ///
    /// If not set, the first account returned by `eth_accounts` is used.
    pub fn sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn polling(mut self, polling: ReceiptPolling) -> Self {
        self.polling = polling;
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the [`RpcChain`], resolving the sender from the node when needed.
    pub async fn build(self) -> Result<RpcChain> {
        let url = Url::parse(&self.url).with_context(|| format!("Invalid RPC URL: {}", self.url))?;
        let client = rpc::create_client(self.request_timeout)?;

        let sender = match self.sender {
            Some(sender) => sender,
            None => {
                let accounts: Vec<Address> =
                    rpc::json_rpc_call(&client, url.as_str(), "eth_accounts", vec![])
                        .await
                        .context("Failed to list node accounts")?;
                accounts
                    .first()
                    .copied()
                    .context("Node exposes no accounts; pass an explicit sender")?
            }
        };

        tracing::info!(rpc_url = %url, sender = %sender, "Connected to chain");

        Ok(RpcChain {
            client,
            url,
            sender,
            polling: self.polling,
            gas_limit: self.gas_limit,
        })
    }
}
