//! Order model: one matched trade backed by an escrow lock.

use alloy::primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{BidType, PaymentSnapshot, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	/// Funds escrowed, fiat outstanding. Also accepted as `open`.
	#[serde(alias = "open")]
	Locked,
	PendingPayment,
	PaymentSent,
	Completed,
	CancelRequested,
	Cancelled,
	/// Awaiting resolution outside this engine.
	Disputed,
}

impl OrderStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
	}

	pub fn as_str(self) -> &'static str {
		match self {
			OrderStatus::Locked => "locked",
			OrderStatus::PendingPayment => "pending_payment",
			OrderStatus::PaymentSent => "payment_sent",
			OrderStatus::Completed => "completed",
			OrderStatus::CancelRequested => "cancel_requested",
			OrderStatus::Cancelled => "cancelled",
			OrderStatus::Disputed => "disputed",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	/// Pays fiat, receives crypto.
	Buyer,
	/// Holds crypto in escrow, receives fiat.
	Seller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
	pub buyer: Address,
	pub seller: Address,
}

impl Roles {
	pub fn role_of(&self, who: &Address) -> Option<Role> {
		if *who == self.buyer {
			Some(Role::Buyer)
		} else if *who == self.seller {
			Some(Role::Seller)
		} else {
			None
		}
	}
}

/// Resolves buyer and seller from the bid side. A sell bid's maker holds the
/// crypto; a buy bid inverts that.
pub fn resolve_roles(bid_type: BidType, maker: Address, taker: Address) -> Roles {
	match bid_type {
		BidType::Sell => Roles {
			buyer: taker,
			seller: maker,
		},
		BidType::Buy => Roles {
			buyer: maker,
			seller: taker,
		},
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineSignal {
	PaymentOverdue,
	ConfirmationOverdue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	pub order_id: B256,
	pub bid_hash: Option<B256>,
	pub chain_id: u64,
	pub maker: Address,
	pub taker: Address,
	pub bid_type: BidType,
	pub base_asset: Address,
	pub base_decimals: u8,
	pub from_amount: Decimal,
	/// Fixed when the order opens.
	pub price: Decimal,
	pub fee_bps: u16,
	pub fiat_currency: String,
	pub status: OrderStatus,
	pub payment_snapshot: Option<PaymentSnapshot>,
	pub opened_at: Timestamp,
	pub payment_deadline: Timestamp,
	pub confirm_deadline: Option<Timestamp>,
	pub payment_sent_at: Option<Timestamp>,
	pub cancel_requested_at: Option<Timestamp>,
	pub completed_at: Option<Timestamp>,
	pub cancelled_at: Option<Timestamp>,
	pub disputed_at: Option<Timestamp>,
	pub creation_tx: Option<B256>,
	pub release_tx: Option<B256>,
	/// Rebuilt from chain events rather than written by the creating workflow.
	#[serde(default)]
	pub recovered: bool,
	pub updated_at: Timestamp,
}

impl Order {
	pub fn roles(&self) -> Roles {
		resolve_roles(self.bid_type, self.maker, self.taker)
	}

	/// Fiat owed by the buyer.
	pub fn fiat_total(&self) -> Decimal {
		self.from_amount * self.price
	}

	/// Deadline expiries. They never force a transition; they only make a
	/// dispute eligible and are shown to the parties.
	pub fn deadline_signals(&self, now: Timestamp) -> Vec<DeadlineSignal> {
		let mut signals = Vec::new();
		match self.status {
			OrderStatus::Locked | OrderStatus::PendingPayment if now > self.payment_deadline => {
				signals.push(DeadlineSignal::PaymentOverdue);
			}
			OrderStatus::PaymentSent => {
				if self.confirm_deadline.is_some_and(|deadline| now > deadline) {
					signals.push(DeadlineSignal::ConfirmationOverdue);
				}
			}
			_ => {}
		}
		signals
	}
}

/// A create-order transaction that was broadcast but whose order record has
/// not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCreation {
	pub tx_hash: B256,
	pub chain_id: u64,
	pub bid_hash: B256,
	pub taker: Address,
	pub amount: Decimal,
	#[serde(default)]
	pub payment_account_id: Option<String>,
	pub created_at: Timestamp,
}
