//! Local private-key wallet.

use crate::{typed_data_digest, AccountError, AccountInterface};
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSigner;
use alloy::primitives::{Address, Bytes, Signature, B256};
use alloy::signers::{local::PrivateKeySigner, Signer};
use alloy::sol_types::Eip712Domain;
use async_trait::async_trait;
use settlement_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Wallet backed by an in-process private key.
///
/// Signing domains always carry their own chain id, so the active network
/// is informational only.
pub struct LocalWallet {
	signer: PrivateKeySigner,
	active_chain: AtomicU64,
}

impl LocalWallet {
	/// Accepts the key as hex, with or without `0x`.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self {
			signer,
			active_chain: AtomicU64::new(0),
		})
	}

	pub fn active_chain(&self) -> Option<u64> {
		match self.active_chain.load(Ordering::Relaxed) {
			0 => None,
			id => Some(id),
		}
	}
}

pub struct LocalWalletSchema;

impl ConfigSchema for LocalWalletSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("private_key", FieldType::String).with_validator(|value| {
				let key = value.as_str().unwrap_or_default();
				let digits = key.strip_prefix("0x").unwrap_or(key);
				if digits.len() != 64 {
					return Err("Private key must be 64 hex characters (32 bytes)".to_string());
				}
				if hex::decode(digits).is_err() {
					return Err("Private key must be valid hexadecimal".to_string());
				}
				Ok(())
			})],
			vec![],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	async fn address(&self) -> Result<Address, AccountError> {
		Ok(Signer::address(&self.signer))
	}

	async fn sign_typed_data(
		&self,
		domain: &Eip712Domain,
		primary_type: &str,
		struct_hash: B256,
	) -> Result<Signature, AccountError> {
		let digest = typed_data_digest(domain, struct_hash);
		tracing::debug!(primary_type, digest = %digest, "Signing typed data");

		self.signer
			.sign_hash(&digest)
			.await
			.map_err(|e| AccountError::SigningFailed(format!("Failed to sign {}: {}", primary_type, e)))
	}

	async fn sign_transaction(&self, mut tx: TxEip1559) -> Result<Bytes, AccountError> {
		let signature = TxSigner::sign_transaction(&self.signer, &mut tx)
			.await
			.map_err(|e| {
				AccountError::SigningFailed(format!("Failed to sign transaction: {}", e))
			})?;

		let envelope = TxEnvelope::from(tx.into_signed(signature));
		Ok(Bytes::from(envelope.encoded_2718()))
	}

	async fn switch_network(&self, chain_id: u64) -> Result<(), AccountError> {
		if chain_id == 0 {
			return Err(AccountError::UnsupportedNetwork(chain_id));
		}
		self.active_chain.store(chain_id, Ordering::Relaxed);
		Ok(())
	}
}

/// Builds a [`LocalWallet`] from an `[account.config]` table.
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalWalletSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".to_string()))?;

	Ok(Box::new(LocalWallet::new(private_key)?))
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::eips::eip2718::Decodable2718;
	use alloy::primitives::{address, TxKind, U256};

	const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

	fn domain() -> Eip712Domain {
		Eip712Domain::new(
			Some("P2PEscrow".into()),
			Some("1".into()),
			Some(U256::from(137u64)),
			Some(address!("3333333333333333333333333333333333333333")),
			None,
		)
	}

	#[tokio::test]
	async fn test_address_from_key() {
		let wallet = LocalWallet::new(KEY).unwrap();
		assert_eq!(wallet.address().await.unwrap(), ADDRESS);
	}

	#[tokio::test]
	async fn test_typed_data_signature_recovers_signer() {
		let wallet = LocalWallet::new(KEY).unwrap();
		let struct_hash = B256::repeat_byte(0xab);

		let signature = wallet
			.sign_typed_data(&domain(), "Bid", struct_hash)
			.await
			.unwrap();
		let digest = typed_data_digest(&domain(), struct_hash);
		assert_eq!(
			signature.recover_address_from_prehash(&digest).unwrap(),
			ADDRESS
		);
	}

	#[tokio::test]
	async fn test_signed_transaction_decodes() {
		let wallet = LocalWallet::new(KEY).unwrap();
		let tx = TxEip1559 {
			chain_id: 137,
			nonce: 3,
			gas_limit: 100_000,
			max_fee_per_gas: 2_000_000_000,
			max_priority_fee_per_gas: 1_000_000_000,
			to: TxKind::Call(address!("3333333333333333333333333333333333333333")),
			value: U256::ZERO,
			access_list: Default::default(),
			input: Bytes::from(vec![1, 2, 3]),
		};

		let raw = wallet.sign_transaction(tx).await.unwrap();
		let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
		let TxEnvelope::Eip1559(signed) = envelope else {
			panic!("expected an EIP-1559 envelope");
		};
		assert_eq!(signed.tx().nonce, 3);
		let signer = signed
			.signature()
			.recover_address_from_prehash(&signed.signature_hash())
			.unwrap();
		assert_eq!(signer, ADDRESS);
	}

	#[tokio::test]
	async fn test_switch_network_records_chain() {
		let wallet = LocalWallet::new(KEY).unwrap();
		assert_eq!(wallet.active_chain(), None);
		wallet.switch_network(137).await.unwrap();
		assert_eq!(wallet.active_chain(), Some(137));
		assert!(wallet.switch_network(0).await.is_err());
	}

	#[test]
	fn test_factory_rejects_bad_key() {
		let config: toml::Value = toml::from_str("private_key = \"0x1234\"").unwrap();
		assert!(create_account(&config).is_err());

		let config: toml::Value = toml::from_str(&format!("private_key = \"{}\"", KEY)).unwrap();
		assert!(create_account(&config).is_ok());
	}
}
