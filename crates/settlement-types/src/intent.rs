use alloy::primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Timestamp;

/// The fields a taker signs to accept a bid, in contract order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderIntentTerms {
	pub bid_hash: B256,
	pub taker: Address,
	/// Base-asset amount taken from the bid.
	pub amount: Decimal,
	pub max_slippage_bps: u16,
	pub expires_at: Timestamp,
	pub nonce: u64,
}
