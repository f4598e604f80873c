//! Chain adapter for the settlement engine.
//!
//! Each configured chain gets one [`DeliveryInterface`] implementation. The
//! [`DeliveryService`] routes calls by chain id, signs outgoing transactions
//! through the [`AccountService`] and polls receipts until they reach the
//! requested confirmation depth.

use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use settlement_account::{AccountError, AccountService};
use settlement_types::{Log, Transaction, TransactionReceipt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("Network error: {0}")]
	Network(String),
	/// The node rejected the call during execution. `data` carries the raw
	/// revert payload when the node returned one.
	#[error("Execution reverted: {message}")]
	Reverted { data: Bytes, message: String },
	#[error("Transaction {tx_hash} not confirmed after {seconds}s")]
	Timeout { tx_hash: B256, seconds: u64 },
	#[error("No delivery implementation for chain {0}")]
	NoImplementation(u64),
	#[error("Signing failed: {0}")]
	Signing(#[from] AccountError),
}

/// Raw access to one chain.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	fn chain_id(&self) -> u64;

	/// Executes `tx` against the latest state without broadcasting it.
	async fn call(&self, tx: &Transaction) -> Result<Bytes, DeliveryError>;

	/// Fills nonce, gas and fees for `tx`. Estimation failures caused by a
	/// revert surface as [`DeliveryError::Reverted`].
	async fn prepare(&self, tx: &Transaction) -> Result<TxEip1559, DeliveryError>;

	async fn send_raw(&self, raw: Bytes) -> Result<B256, DeliveryError>;

	async fn get_receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, DeliveryError>;

	async fn get_block_number(&self) -> Result<u64, DeliveryError>;

	/// Unix timestamp of block `number`, or `None` when the node does not
	/// know the block.
	async fn get_block_timestamp(&self, number: u64) -> Result<Option<u64>, DeliveryError>;

	async fn get_logs(
		&self,
		address: Address,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<Log>, DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
	/// Not yet mined, or mined with fewer confirmations than requested.
	Pending,
	Reverted(TransactionReceipt),
	Confirmed(TransactionReceipt),
}

pub struct DeliveryService {
	providers: HashMap<u64, Arc<dyn DeliveryInterface>>,
}

impl DeliveryService {
	pub fn new(providers: HashMap<u64, Arc<dyn DeliveryInterface>>) -> Self {
		Self { providers }
	}

	pub fn chains(&self) -> Vec<u64> {
		let mut chains: Vec<u64> = self.providers.keys().copied().collect();
		chains.sort_unstable();
		chains
	}

	fn provider(&self, chain_id: u64) -> Result<&Arc<dyn DeliveryInterface>, DeliveryError> {
		self.providers
			.get(&chain_id)
			.ok_or(DeliveryError::NoImplementation(chain_id))
	}

	pub async fn call(&self, tx: &Transaction) -> Result<Bytes, DeliveryError> {
		self.provider(tx.chain_id)?.call(tx).await
	}

	/// Prepares, signs and broadcasts `tx`. Returns once the node accepted
	/// the transaction; inclusion is tracked separately.
	pub async fn submit(
		&self,
		tx: &Transaction,
		account: &AccountService,
	) -> Result<B256, DeliveryError> {
		let provider = self.provider(tx.chain_id)?;
		let unsigned = provider.prepare(tx).await?;
		let raw = account.sign_transaction(unsigned).await?;
		let hash = provider.send_raw(raw).await?;
		tracing::info!(chain_id = tx.chain_id, tx_hash = %hash, to = %tx.to, "Submitted transaction");
		Ok(hash)
	}

	pub async fn get_receipt(
		&self,
		chain_id: u64,
		hash: &B256,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		self.provider(chain_id)?.get_receipt(hash).await
	}

	pub async fn get_block_number(&self, chain_id: u64) -> Result<u64, DeliveryError> {
		self.provider(chain_id)?.get_block_number().await
	}

	pub async fn get_block_timestamp(
		&self,
		chain_id: u64,
		number: u64,
	) -> Result<Option<u64>, DeliveryError> {
		self.provider(chain_id)?.get_block_timestamp(number).await
	}

	pub async fn get_logs(
		&self,
		chain_id: u64,
		address: Address,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<Log>, DeliveryError> {
		self.provider(chain_id)?
			.get_logs(address, from_block, to_block)
			.await
	}

	/// Single non-blocking look at a transaction. The inclusion block counts
	/// as the first confirmation. Reverted receipts are reported as soon as
	/// they are included.
	pub async fn check_confirmation(
		&self,
		chain_id: u64,
		hash: &B256,
		confirmations: u64,
	) -> Result<ConfirmationStatus, DeliveryError> {
		let provider = self.provider(chain_id)?;
		let receipt = match provider.get_receipt(hash).await? {
			Some(receipt) => receipt,
			None => return Ok(ConfirmationStatus::Pending),
		};
		if !receipt.success {
			return Ok(ConfirmationStatus::Reverted(receipt));
		}

		let current = provider.get_block_number().await?;
		let depth = (current + 1).saturating_sub(receipt.block_number);
		if depth >= confirmations {
			Ok(ConfirmationStatus::Confirmed(receipt))
		} else {
			tracing::debug!(
				tx_hash = %hash,
				"Waiting for {} more confirmations",
				confirmations - depth
			);
			Ok(ConfirmationStatus::Pending)
		}
	}

	/// Polls until the transaction is confirmed or reverted. Never returns
	/// [`ConfirmationStatus::Pending`]; running out of time is
	/// [`DeliveryError::Timeout`], which says nothing about the transaction's
	/// eventual fate.
	pub async fn wait_for_confirmation(
		&self,
		chain_id: u64,
		hash: &B256,
		confirmations: u64,
		timeout: Duration,
		poll_interval: Duration,
	) -> Result<ConfirmationStatus, DeliveryError> {
		let start = tokio::time::Instant::now();
		tracing::info!(
			chain_id,
			tx_hash = %hash,
			"Waiting for {} confirmations (timeout: {}s)",
			confirmations,
			timeout.as_secs()
		);

		loop {
			match self.check_confirmation(chain_id, hash, confirmations).await? {
				ConfirmationStatus::Pending => {}
				done => return Ok(done),
			}
			if start.elapsed() >= timeout {
				return Err(DeliveryError::Timeout {
					tx_hash: *hash,
					seconds: timeout.as_secs(),
				});
			}
			tokio::time::sleep(poll_interval).await;
		}
	}
}
