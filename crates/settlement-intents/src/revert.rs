//! Maps escrow revert data onto the reasons the engine reports.

use alloy::primitives::{B256, U256};
use alloy::sol_types::SolInterface;
use std::fmt;

use crate::contracts::IP2PEscrow::IP2PEscrowErrors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
	BidExpired,
	InsufficientKyc { required: u8, actual: u8 },
	InvalidSignature,
	AmountOutOfRange { amount: U256, min: U256, max: U256 },
	NonceUsed(U256),
	/// Another order already consumed the bid's remaining amount.
	InsufficientAvailable { requested: U256, available: U256 },
	InsufficientBalance { required: U256, available: U256 },
	OrderNotReleasable(B256),
	NotSeller,
	Unknown(String),
}

impl RevertReason {
	/// Classifies raw revert data. Data that is not one of the escrow's
	/// custom errors is kept verbatim as hex.
	pub fn from_revert_data(data: &[u8]) -> Self {
		match IP2PEscrowErrors::abi_decode(data) {
			Ok(IP2PEscrowErrors::BidExpired(_)) => RevertReason::BidExpired,
			Ok(IP2PEscrowErrors::InsufficientKyc(e)) => RevertReason::InsufficientKyc {
				required: e.required,
				actual: e.actual,
			},
			Ok(IP2PEscrowErrors::InvalidSignature(_)) => RevertReason::InvalidSignature,
			Ok(IP2PEscrowErrors::AmountOutOfRange(e)) => RevertReason::AmountOutOfRange {
				amount: e.amount,
				min: e.minAmount,
				max: e.maxAmount,
			},
			Ok(IP2PEscrowErrors::NonceUsed(e)) => RevertReason::NonceUsed(e.nonce),
			Ok(IP2PEscrowErrors::InsufficientAvailable(e)) => RevertReason::InsufficientAvailable {
				requested: e.requested,
				available: e.available,
			},
			Ok(IP2PEscrowErrors::InsufficientBalance(e)) => RevertReason::InsufficientBalance {
				required: e.required,
				available: e.available,
			},
			Ok(IP2PEscrowErrors::OrderNotReleasable(e)) => {
				RevertReason::OrderNotReleasable(e.orderId)
			}
			Ok(IP2PEscrowErrors::NotSeller(_)) => RevertReason::NotSeller,
			Err(_) if data.is_empty() => RevertReason::Unknown("empty revert data".to_string()),
			Err(_) => RevertReason::Unknown(format!("0x{}", alloy::primitives::hex::encode(data))),
		}
	}
}

impl fmt::Display for RevertReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RevertReason::BidExpired => write!(f, "bid has expired"),
			RevertReason::InsufficientKyc { required, actual } => {
				write!(f, "KYC level {} is below the required {}", actual, required)
			}
			RevertReason::InvalidSignature => write!(f, "signature rejected by the escrow"),
			RevertReason::AmountOutOfRange { amount, min, max } => {
				write!(f, "amount {} is outside [{}, {}]", amount, min, max)
			}
			RevertReason::NonceUsed(nonce) => write!(f, "nonce {} was already used", nonce),
			RevertReason::InsufficientAvailable {
				requested,
				available,
			} => write!(
				f,
				"bid has {} left but {} was requested; it was matched concurrently",
				available, requested
			),
			RevertReason::InsufficientBalance {
				required,
				available,
			} => write!(
				f,
				"escrow balance {} does not cover {}",
				available, required
			),
			RevertReason::OrderNotReleasable(id) => write!(f, "order {} cannot be released", id),
			RevertReason::NotSeller => write!(f, "caller is not the order's seller"),
			RevertReason::Unknown(data) => write!(f, "reverted: {}", data),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::contracts::IP2PEscrow;
	use alloy::sol_types::SolError;

	#[test]
	fn test_custom_errors_are_classified() {
		let data = IP2PEscrow::InsufficientAvailable {
			requested: U256::from(600u64),
			available: U256::from(400u64),
		}
		.abi_encode();
		assert_eq!(
			RevertReason::from_revert_data(&data),
			RevertReason::InsufficientAvailable {
				requested: U256::from(600u64),
				available: U256::from(400u64),
			}
		);

		let data = IP2PEscrow::BidExpired {}.abi_encode();
		assert_eq!(RevertReason::from_revert_data(&data), RevertReason::BidExpired);
	}

	#[test]
	fn test_unknown_data_is_preserved() {
		assert_eq!(
			RevertReason::from_revert_data(&[0xde, 0xad, 0xbe, 0xef]),
			RevertReason::Unknown("0xdeadbeef".to_string())
		);
		assert_eq!(
			RevertReason::from_revert_data(&[]),
			RevertReason::Unknown("empty revert data".to_string())
		);
	}
}
