//! Decoding of escrow events from receipts and log scans.

use alloy::primitives::{Address, B256, U256};
use alloy::sol_types::SolEvent;
use settlement_types::{Log, TransactionReceipt};

use crate::contracts::IP2PEscrow;
use crate::CodecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCreated {
	pub order_id: B256,
	pub bid_hash: B256,
	pub maker: Address,
	pub taker: Address,
	pub amount: U256,
}

/// Escrow events the engine reconciles against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowEvent {
	Created(OrderCreated),
	Released { order_id: B256, buyer: Address, amount: U256 },
	AutoReleased { order_id: B256, buyer: Address, amount: U256 },
	Cancelled { order_id: B256, seller: Address, amount: U256 },
	Disputed { order_id: B256, opened_by: Address },
}

impl EscrowEvent {
	pub fn order_id(&self) -> B256 {
		match self {
			EscrowEvent::Created(created) => created.order_id,
			EscrowEvent::Released { order_id, .. }
			| EscrowEvent::AutoReleased { order_id, .. }
			| EscrowEvent::Cancelled { order_id, .. }
			| EscrowEvent::Disputed { order_id, .. } => *order_id,
		}
	}
}

/// Decodes `log` if it is one of the order events emitted by `escrow`.
pub fn decode_escrow_log(log: &Log, escrow: Address) -> Option<EscrowEvent> {
	if log.address != escrow {
		return None;
	}
	let signature = *log.topics.first()?;
	let topics = log.topics.iter().copied();

	if signature == IP2PEscrow::OrderCreated::SIGNATURE_HASH {
		let e = decoded("OrderCreated", IP2PEscrow::OrderCreated::decode_raw_log(topics, &log.data))?;
		Some(EscrowEvent::Created(OrderCreated {
			order_id: e.orderId,
			bid_hash: e.bidHash,
			maker: e.maker,
			taker: e.taker,
			amount: e.amount,
		}))
	} else if signature == IP2PEscrow::OrderReleased::SIGNATURE_HASH {
		let e = decoded("OrderReleased", IP2PEscrow::OrderReleased::decode_raw_log(topics, &log.data))?;
		Some(EscrowEvent::Released {
			order_id: e.orderId,
			buyer: e.buyer,
			amount: e.amount,
		})
	} else if signature == IP2PEscrow::OrderAutoReleased::SIGNATURE_HASH {
		let e = decoded("OrderAutoReleased", IP2PEscrow::OrderAutoReleased::decode_raw_log(topics, &log.data))?;
		Some(EscrowEvent::AutoReleased {
			order_id: e.orderId,
			buyer: e.buyer,
			amount: e.amount,
		})
	} else if signature == IP2PEscrow::OrderCancelled::SIGNATURE_HASH {
		let e = decoded("OrderCancelled", IP2PEscrow::OrderCancelled::decode_raw_log(topics, &log.data))?;
		Some(EscrowEvent::Cancelled {
			order_id: e.orderId,
			seller: e.seller,
			amount: e.amount,
		})
	} else if signature == IP2PEscrow::OrderDisputed::SIGNATURE_HASH {
		let e = decoded("OrderDisputed", IP2PEscrow::OrderDisputed::decode_raw_log(topics, &log.data))?;
		Some(EscrowEvent::Disputed {
			order_id: e.orderId,
			opened_by: e.openedBy,
		})
	} else {
		None
	}
}

fn decoded<T>(event: &'static str, result: Result<T, alloy::sol_types::Error>) -> Option<T> {
	result
		.map_err(|e| tracing::warn!(event, error = %e, "Escrow log matches an event signature but does not decode"))
		.ok()
}

pub fn decode_escrow_logs(logs: &[Log], escrow: Address) -> Vec<EscrowEvent> {
	logs.iter()
		.filter_map(|log| decode_escrow_log(log, escrow))
		.collect()
}

/// Finds the `OrderCreated` event in a successful create-order receipt.
/// Its absence means the ABI this codec encodes against has drifted from the
/// deployed contract.
pub fn extract_order_id(
	receipt: &TransactionReceipt,
	escrow: Address,
) -> Result<OrderCreated, CodecError> {
	receipt
		.logs
		.iter()
		.find_map(|log| match decode_escrow_log(log, escrow) {
			Some(EscrowEvent::Created(created)) => Some(created),
			_ => None,
		})
		.ok_or(CodecError::MissingEvent {
			event: "OrderCreated",
			tx_hash: receipt.hash,
		})
}

/// Whether `receipt` released `order_id`.
pub fn find_release(receipt: &TransactionReceipt, escrow: Address, order_id: B256) -> bool {
	receipt.logs.iter().any(|log| {
		matches!(
			decode_escrow_log(log, escrow),
			Some(EscrowEvent::Released { order_id: id, .. }) if id == order_id
		)
	})
}

/// Encodes an event into a [`Log`]; the counterpart of [`decode_escrow_log`].
pub fn encode_log<E: SolEvent>(event: &E, escrow: Address) -> Log {
	let data = event.encode_log_data();
	Log {
		address: escrow,
		topics: data.topics().to_vec(),
		data: data.data,
		block_number: None,
		transaction_hash: None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::primitives::address;

	const ESCROW: Address = address!("3333333333333333333333333333333333333333");

	fn created() -> IP2PEscrow::OrderCreated {
		IP2PEscrow::OrderCreated {
			orderId: B256::repeat_byte(9),
			bidHash: B256::repeat_byte(1),
			maker: address!("1111111111111111111111111111111111111111"),
			taker: address!("4444444444444444444444444444444444444444"),
			amount: U256::from(500_000_000u64),
		}
	}

	#[test]
	fn test_order_created_round_trip_through_log() {
		let log = encode_log(&created(), ESCROW);
		assert_eq!(log.topics.len(), 4);
		match decode_escrow_log(&log, ESCROW) {
			Some(EscrowEvent::Created(event)) => {
				assert_eq!(event.order_id, B256::repeat_byte(9));
				assert_eq!(event.amount, U256::from(500_000_000u64));
			}
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn test_logs_from_other_contracts_are_ignored() {
		let log = encode_log(&created(), Address::repeat_byte(0x99));
		assert_eq!(decode_escrow_log(&log, ESCROW), None);
	}

	#[test]
	fn test_missing_created_event_is_an_error() {
		let receipt = TransactionReceipt {
			hash: B256::repeat_byte(7),
			block_number: 10,
			success: true,
			logs: vec![encode_log(
				&IP2PEscrow::OrderDisputed {
					orderId: B256::repeat_byte(9),
					openedBy: Address::repeat_byte(1),
				},
				ESCROW,
			)],
		};
		assert!(matches!(
			extract_order_id(&receipt, ESCROW),
			Err(CodecError::MissingEvent { event: "OrderCreated", .. })
		));
	}

	#[test]
	fn test_release_detection() {
		let receipt = TransactionReceipt {
			hash: B256::repeat_byte(7),
			block_number: 10,
			success: true,
			logs: vec![encode_log(
				&IP2PEscrow::OrderReleased {
					orderId: B256::repeat_byte(9),
					buyer: Address::repeat_byte(4),
					amount: U256::from(1u64),
				},
				ESCROW,
			)],
		};
		assert!(find_release(&receipt, ESCROW, B256::repeat_byte(9)));
		assert!(!find_release(&receipt, ESCROW, B256::repeat_byte(8)));
	}
}
