//! JSON-RPC chain access using alloy's HTTP provider.

use crate::{DeliveryError, DeliveryInterface};
use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes, TxKind, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, TransactionInput, TransactionRequest};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;
use settlement_types::{
	ConfigSchema, Field, FieldType, Log, Schema, Transaction, TransactionReceipt, ValidationError,
};

/// Gas estimates are padded by this percentage.
const GAS_HEADROOM_PERCENT: u64 = 20;

pub struct AlloyDelivery {
	provider: DynProvider,
	chain_id: u64,
}

impl AlloyDelivery {
	pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::Network(format!("Invalid RPC URL: {}", e)))?;
		let provider = ProviderBuilder::new().connect_http(url).erased();
		Ok(Self { provider, chain_id })
	}
}

fn request(tx: &Transaction) -> TransactionRequest {
	TransactionRequest::default()
		.from(tx.from)
		.to(tx.to)
		.value(tx.value)
		.input(TransactionInput::new(tx.data.clone()))
}

/// Separates execution reverts from transport failures.
fn classify(context: &str, error: RpcError<TransportErrorKind>) -> DeliveryError {
	if let Some(payload) = error.as_error_resp() {
		if let Some(data) = payload.as_revert_data() {
			return DeliveryError::Reverted {
				data,
				message: payload.message.to_string(),
			};
		}
		if payload.message.contains("revert") {
			return DeliveryError::Reverted {
				data: Bytes::new(),
				message: payload.message.to_string(),
			};
		}
	}
	DeliveryError::Network(format!("{}: {}", context, error))
}

fn convert_log(log: &alloy::rpc::types::Log) -> Log {
	Log {
		address: log.address(),
		topics: log.topics().to_vec(),
		data: log.data().data.clone(),
		block_number: log.block_number,
		transaction_hash: log.transaction_hash,
	}
}

pub struct AlloyDeliverySchema;

impl ConfigSchema for AlloyDeliverySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::Url),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	async fn call(&self, tx: &Transaction) -> Result<Bytes, DeliveryError> {
		self.provider
			.call(request(tx))
			.await
			.map_err(|e| classify("eth_call failed", e))
	}

	async fn prepare(&self, tx: &Transaction) -> Result<TxEip1559, DeliveryError> {
		let nonce = self
			.provider
			.get_transaction_count(tx.from)
			.pending()
			.await
			.map_err(|e| classify("Failed to get nonce", e))?;
		let estimate = self
			.provider
			.estimate_gas(request(tx))
			.await
			.map_err(|e| classify("Gas estimation failed", e))?;
		let fees = self
			.provider
			.estimate_eip1559_fees()
			.await
			.map_err(|e| classify("Fee estimation failed", e))?;

		Ok(TxEip1559 {
			chain_id: self.chain_id,
			nonce,
			gas_limit: estimate + estimate * GAS_HEADROOM_PERCENT / 100,
			max_fee_per_gas: fees.max_fee_per_gas,
			max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
			to: TxKind::Call(tx.to),
			value: tx.value,
			access_list: Default::default(),
			input: tx.data.clone(),
		})
	}

	async fn send_raw(&self, raw: Bytes) -> Result<B256, DeliveryError> {
		let pending = self
			.provider
			.send_raw_transaction(&raw)
			.await
			.map_err(|e| classify("Failed to send transaction", e))?;
		Ok(*pending.tx_hash())
	}

	async fn get_receipt(&self, hash: &B256) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let receipt = self
			.provider
			.get_transaction_receipt(*hash)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get receipt: {}", e)))?;

		Ok(receipt.map(|receipt| TransactionReceipt {
			hash: receipt.transaction_hash,
			block_number: receipt.block_number.unwrap_or(0),
			success: receipt.status(),
			logs: receipt.inner.logs().iter().map(convert_log).collect(),
		}))
	}

	async fn get_block_number(&self) -> Result<u64, DeliveryError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block number: {}", e)))
	}

	async fn get_block_timestamp(&self, number: u64) -> Result<Option<u64>, DeliveryError> {
		let block = self
			.provider
			.get_block_by_number(number.into())
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get block {}: {}", number, e)))?;
		Ok(block.map(|block| block.header.timestamp))
	}

	async fn get_logs(
		&self,
		address: Address,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<Log>, DeliveryError> {
		let filter = Filter::new()
			.address(address)
			.from_block(from_block)
			.to_block(to_block);
		let logs = self
			.provider
			.get_logs(&filter)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get logs: {}", e)))?;
		Ok(logs.iter().map(convert_log).collect())
	}
}

/// Creates an HTTP delivery from a table with `rpc_url` and `chain_id`.
pub fn create_http_delivery(
	config: &toml::Value,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	AlloyDeliverySchema
		.validate(config)
		.map_err(|e| DeliveryError::Network(format!("Invalid delivery config: {}", e)))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.unwrap_or_default();
	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.unwrap_or_default() as u64;

	Ok(Box::new(AlloyDelivery::new(rpc_url, chain_id)?))
}
