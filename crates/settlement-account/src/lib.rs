//! Signing provider for the settlement engine.
//!
//! The engine never sees key material. It hands a typed-data domain and a
//! struct hash, or an unsigned transaction, to an [`AccountInterface`] and
//! gets back a signature or a raw signed transaction.

use alloy::consensus::TxEip1559;
use alloy::primitives::{keccak256, Address, Bytes, Signature, B256};
use alloy::sol_types::Eip712Domain;
use async_trait::async_trait;
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// EIP-712 digest: `keccak256(0x1901 ‖ domainSeparator ‖ structHash)`.
pub fn typed_data_digest(domain: &Eip712Domain, struct_hash: B256) -> B256 {
	let mut buf = Vec::with_capacity(66);
	buf.extend_from_slice(&[0x19, 0x01]);
	buf.extend_from_slice(domain.separator().as_slice());
	buf.extend_from_slice(struct_hash.as_slice());
	keccak256(buf)
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Signature request rejected: {0}")]
	Rejected(String),
	#[error("Unsupported network: {0}")]
	UnsupportedNetwork(u64),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs the EIP-712 digest of `struct_hash` under `domain`.
	async fn sign_typed_data(
		&self,
		domain: &Eip712Domain,
		primary_type: &str,
		struct_hash: B256,
	) -> Result<Signature, AccountError>;

	/// Signs `tx` and returns the EIP-2718 encoded envelope.
	async fn sign_transaction(&self, tx: TxEip1559) -> Result<Bytes, AccountError>;

	async fn switch_network(&self, chain_id: u64) -> Result<(), AccountError>;
}

pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.provider.address().await
	}

	pub async fn sign_typed_data(
		&self,
		domain: &Eip712Domain,
		primary_type: &str,
		struct_hash: B256,
	) -> Result<Signature, AccountError> {
		self.provider
			.sign_typed_data(domain, primary_type, struct_hash)
			.await
	}

	pub async fn sign_transaction(&self, tx: TxEip1559) -> Result<Bytes, AccountError> {
		self.provider.sign_transaction(tx).await
	}

	pub async fn switch_network(&self, chain_id: u64) -> Result<(), AccountError> {
		self.provider.switch_network(chain_id).await
	}
}
