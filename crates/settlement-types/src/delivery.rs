use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// An unsigned contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	pub chain_id: u64,
	pub from: Address,
	pub to: Address,
	pub data: Bytes,
	#[serde(default)]
	pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub block_number: Option<u64>,
	pub transaction_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: B256,
	pub block_number: u64,
	pub success: bool,
	pub logs: Vec<Log>,
}
