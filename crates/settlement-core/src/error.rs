//! Engine error taxonomy and the structured outcome rendered at the boundary.

use alloy::primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement_account::AccountError;
use settlement_delivery::DeliveryError;
use settlement_intents::{CodecError, RevertReason};
use settlement_storage::StorageError;
use settlement_types::{AmountError, Ineligible, InvalidTerms, OrderStatus};
use thiserror::Error;

use crate::lifecycle::Action;

/// Target for operational alerts. Everything logged here indicates drift
/// between this codebase and the deployed escrow, never a user mistake.
pub const ALERT_TARGET: &str = "settlement::alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	Validation,
	Authorization,
	Funding,
	Transient,
	ProtocolViolation,
	NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Remediation {
	/// Amounts in base-asset units.
	Funding {
		required: Decimal,
		escrow_balance: Decimal,
		wallet_balance: Decimal,
		shortfall: Decimal,
	},
	AmountRange {
		min: Decimal,
		max: Decimal,
	},
	Retry {
		step: String,
	},
}

/// What callers outside the engine receive for any failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureOutcome {
	pub succeeded: bool,
	pub kind: ErrorKind,
	pub reason: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub remediation: Option<Remediation>,
}

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Validation failed: {0}")]
	Validation(String),
	#[error("Invalid bid terms: {0}")]
	InvalidTerms(#[from] InvalidTerms),
	#[error("Amount {amount} is below the bid minimum of {min}")]
	BelowMinimum {
		amount: Decimal,
		min: Decimal,
		max: Decimal,
	},
	#[error("Amount {amount} exceeds the bid maximum of {max}")]
	AboveMaximum {
		amount: Decimal,
		min: Decimal,
		max: Decimal,
	},
	#[error("Invalid amount: {0}")]
	Amount(#[from] AmountError),
	#[error("Not authorized: {0}")]
	Unauthorized(String),
	#[error("Not eligible: {0}")]
	Ineligible(#[from] Ineligible),
	#[error("{action} is not allowed while the order is {status}")]
	InvalidTransition { action: Action, status: OrderStatus },
	#[error(
		"Insufficient funds: {required} required, {} available ({escrow_balance} in escrow, {wallet_balance} in wallet)",
		escrow_balance + wallet_balance
	)]
	InsufficientFunds {
		required: Decimal,
		escrow_balance: Decimal,
		wallet_balance: Decimal,
	},
	/// The escrow refused the call, either in simulation or on-chain.
	#[error("Escrow rejected the transaction: {0}")]
	Rejected(RevertReason),
	#[error("Transaction {tx_hash} reverted")]
	Reverted { tx_hash: B256 },
	#[error("Timed out waiting for {step} after {seconds}s")]
	Timeout { step: &'static str, seconds: u64 },
	#[error("Transaction {tx_hash} not confirmed after {seconds}s")]
	ConfirmationTimeout { tx_hash: B256, seconds: u64 },
	#[error("Release of order {0} is already in progress")]
	ReleaseInProgress(B256),
	#[error("Bid {0} not found")]
	BidNotFound(B256),
	#[error("Order {0} not found")]
	OrderNotFound(B256),
	#[error("Payment account {0} not found")]
	PaymentAccountNotFound(String),
	#[error("Chain {0} is not configured")]
	UnsupportedChain(u64),
	#[error("Token {token} is not configured on chain {chain_id}")]
	UnknownToken { chain_id: u64, token: Address },
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Signing failed: {0}")]
	Signing(#[from] AccountError),
	#[error("Codec error: {0}")]
	Codec(CodecError),
	#[error("Delivery error: {0}")]
	Delivery(DeliveryError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Protocol invariant violated: {0}")]
	ProtocolViolation(String),
}

impl EngineError {
	/// Logs on the alert target and returns a protocol violation.
	pub fn alert(message: impl Into<String>) -> Self {
		let message = message.into();
		tracing::error!(target: ALERT_TARGET, "{}", message);
		EngineError::ProtocolViolation(message)
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			EngineError::Validation(_)
			| EngineError::InvalidTerms(_)
			| EngineError::BelowMinimum { .. }
			| EngineError::AboveMaximum { .. }
			| EngineError::Amount(_)
			| EngineError::InvalidTransition { .. }
			| EngineError::UnsupportedChain(_)
			| EngineError::UnknownToken { .. }
			| EngineError::Config(_) => ErrorKind::Validation,
			EngineError::Unauthorized(_) | EngineError::Ineligible(_) => ErrorKind::Authorization,
			EngineError::InsufficientFunds { .. } => ErrorKind::Funding,
			EngineError::Rejected(reason) => match reason {
				RevertReason::InsufficientKyc { .. } | RevertReason::NotSeller => {
					ErrorKind::Authorization
				}
				RevertReason::InsufficientBalance { .. } => ErrorKind::Funding,
				RevertReason::InsufficientAvailable { .. } => ErrorKind::Transient,
				_ => ErrorKind::Validation,
			},
			EngineError::Reverted { .. }
			| EngineError::Timeout { .. }
			| EngineError::ConfirmationTimeout { .. }
			| EngineError::ReleaseInProgress(_)
			| EngineError::Signing(_)
			| EngineError::Delivery(_)
			| EngineError::Storage(_) => ErrorKind::Transient,
			EngineError::BidNotFound(_)
			| EngineError::OrderNotFound(_)
			| EngineError::PaymentAccountNotFound(_) => ErrorKind::NotFound,
			EngineError::Codec(e) => match e {
				CodecError::Signing(_) => ErrorKind::Transient,
				CodecError::MissingEvent { .. } | CodecError::Decode(_) => {
					ErrorKind::ProtocolViolation
				}
				_ => ErrorKind::Validation,
			},
			EngineError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
		}
	}

	pub fn remediation(&self) -> Option<Remediation> {
		match self {
			EngineError::InsufficientFunds {
				required,
				escrow_balance,
				wallet_balance,
			} => Some(Remediation::Funding {
				required: *required,
				escrow_balance: *escrow_balance,
				wallet_balance: *wallet_balance,
				shortfall: (*required - *escrow_balance).max(Decimal::ZERO),
			}),
			EngineError::BelowMinimum { min, max, .. } | EngineError::AboveMaximum { min, max, .. } => {
				Some(Remediation::AmountRange {
					min: *min,
					max: *max,
				})
			}
			EngineError::Rejected(RevertReason::InsufficientAvailable { .. }) => {
				Some(Remediation::Retry {
					step: "create_order".to_string(),
				})
			}
			EngineError::Timeout { step, .. } => Some(Remediation::Retry {
				step: step.to_string(),
			}),
			EngineError::ConfirmationTimeout { .. } => Some(Remediation::Retry {
				step: "await_confirmation".to_string(),
			}),
			e if e.kind() == ErrorKind::Transient => Some(Remediation::Retry {
				step: "restart".to_string(),
			}),
			_ => None,
		}
	}

	pub fn outcome(&self) -> FailureOutcome {
		FailureOutcome {
			succeeded: false,
			kind: self.kind(),
			reason: self.to_string(),
			remediation: self.remediation(),
		}
	}
}

impl From<CodecError> for EngineError {
	fn from(error: CodecError) -> Self {
		match error {
			CodecError::MissingEvent { .. } | CodecError::Decode(_) => {
				EngineError::alert(error.to_string())
			}
			other => EngineError::Codec(other),
		}
	}
}

impl From<DeliveryError> for EngineError {
	fn from(error: DeliveryError) -> Self {
		match error {
			DeliveryError::Reverted { data, message } => {
				if data.is_empty() {
					EngineError::Rejected(RevertReason::Unknown(message))
				} else {
					EngineError::Rejected(RevertReason::from_revert_data(&data))
				}
			}
			DeliveryError::Timeout { tx_hash, seconds } => {
				EngineError::ConfirmationTimeout { tx_hash, seconds }
			}
			DeliveryError::Signing(e) => EngineError::Signing(e),
			other => EngineError::Delivery(other),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::U256;

	#[test]
	fn test_funding_outcome_reports_breakdown() {
		let error = EngineError::InsufficientFunds {
			required: Decimal::new(500, 0),
			escrow_balance: Decimal::new(100, 0),
			wallet_balance: Decimal::new(150, 0),
		};
		let outcome = error.outcome();
		assert!(!outcome.succeeded);
		assert_eq!(outcome.kind, ErrorKind::Funding);
		assert_eq!(
			outcome.remediation,
			Some(Remediation::Funding {
				required: Decimal::new(500, 0),
				escrow_balance: Decimal::new(100, 0),
				wallet_balance: Decimal::new(150, 0),
				shortfall: Decimal::new(400, 0),
			})
		);
		assert!(outcome.reason.contains("250 available"));
	}

	#[test]
	fn test_revert_reasons_map_to_kinds() {
		let matched = EngineError::Rejected(RevertReason::InsufficientAvailable {
			requested: U256::from(600u64),
			available: U256::from(400u64),
		});
		assert_eq!(matched.kind(), ErrorKind::Transient);
		assert!(matches!(matched.remediation(), Some(Remediation::Retry { .. })));

		let kyc = EngineError::Rejected(RevertReason::InsufficientKyc {
			required: 2,
			actual: 1,
		});
		assert_eq!(kyc.kind(), ErrorKind::Authorization);
		assert_eq!(
			EngineError::Rejected(RevertReason::BidExpired).kind(),
			ErrorKind::Validation
		);
	}

	#[test]
	fn test_delivery_reverts_become_rejections() {
		let error: EngineError = DeliveryError::Reverted {
			data: Default::default(),
			message: "execution reverted".to_string(),
		}
		.into();
		assert!(matches!(
			error,
			EngineError::Rejected(RevertReason::Unknown(ref m)) if m == "execution reverted"
		));
	}

	#[test]
	fn test_missing_event_is_a_protocol_violation() {
		let error: EngineError = CodecError::MissingEvent {
			event: "OrderCreated",
			tx_hash: B256::ZERO,
		}
		.into();
		assert_eq!(error.kind(), ErrorKind::ProtocolViolation);
		assert!(error.remediation().is_none());
	}

	#[test]
	fn test_outcome_serializes_without_empty_remediation() {
		let json = serde_json::to_value(EngineError::BidNotFound(B256::ZERO).outcome()).unwrap();
		assert_eq!(json["succeeded"], false);
		assert_eq!(json["kind"], "not_found");
		assert!(json.get("remediation").is_none());
	}
}
