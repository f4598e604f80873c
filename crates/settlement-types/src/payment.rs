use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// A saved, reusable payment destination. Orders never reference it by
/// value; they copy it into a [`PaymentSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPaymentAccount {
	pub id: String,
	pub owner: Address,
	/// Method type code, e.g. `SEPA` or `PIX`.
	pub method_type: String,
	/// Opaque, already-decrypted details.
	pub details: String,
	pub label: String,
	pub is_default: bool,
	pub is_verified: bool,
	pub is_active: bool,
	pub created_at: Timestamp,
	pub updated_at: Timestamp,
}

/// Payment details frozen into an order when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
	pub method_type: String,
	pub details: String,
	#[serde(default)]
	pub custom_instructions: Option<String>,
	/// Human reference the buyer puts on the fiat transfer.
	pub reference_code: String,
	pub source_account_id: String,
	pub captured_at: Timestamp,
}
