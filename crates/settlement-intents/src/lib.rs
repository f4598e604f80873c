//! Signed-intent codec.
//!
//! Builds the byte encoding both parties commit to for a [`Bid`] or an order
//! intent, hashes it exactly the way the escrow contract does, asks a signing
//! provider for a signature and recovers signers from signatures. It also
//! owns the rest of the escrow ABI surface: calldata for the calls the engine
//! makes, decoding of emitted events and classification of revert data.
//!
//! [`Bid`]: settlement_types::Bid

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::Eip712Domain;
use serde::{Deserialize, Serialize};
use settlement_account::{typed_data_digest, AccountError};
use settlement_types::{AmountError, InvalidTerms};
use thiserror::Error;

pub mod calls;
pub mod codec;
pub mod contracts;
pub mod events;
pub mod revert;

pub use codec::*;
pub use events::{EscrowEvent, OrderCreated};
pub use revert::RevertReason;

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("Invalid terms: {0}")]
	InvalidTerms(#[from] InvalidTerms),
	#[error("Invalid field {field}: {message}")]
	InvalidField {
		field: &'static str,
		message: String,
	},
	#[error("Amount conversion failed: {0}")]
	Amount(#[from] AmountError),
	#[error("Signing failed: {0}")]
	Signing(#[from] AccountError),
	#[error("Malformed signature: {0}")]
	Signature(String),
	#[error("Receipt {tx_hash} carries no {event} event")]
	MissingEvent { event: &'static str, tx_hash: B256 },
	#[error("Malformed return data: {0}")]
	Decode(String),
}

/// EIP-712 domain of one escrow deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningDomain {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	pub verifying_contract: Address,
}

impl SigningDomain {
	pub fn eip712(&self) -> Eip712Domain {
		Eip712Domain::new(
			Some(self.name.clone().into()),
			Some(self.version.clone().into()),
			Some(U256::from(self.chain_id)),
			Some(self.verifying_contract),
			None,
		)
	}

	pub fn separator(&self) -> B256 {
		self.eip712().separator()
	}

	pub fn digest(&self, struct_hash: B256) -> B256 {
		typed_data_digest(&self.eip712(), struct_hash)
	}
}
