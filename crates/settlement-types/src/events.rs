use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::OrderStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettlementEvent {
	Bid(BidEvent),
	Order(OrderEvent),
	Funding(FundingEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BidEvent {
	Published { bid_hash: B256, maker: Address },
	Cancelled { bid_hash: B256 },
	Completed { bid_hash: B256 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
	CreationSubmitted {
		bid_hash: B256,
		tx_hash: B256,
	},
	Created {
		order_id: B256,
		bid_hash: B256,
		tx_hash: B256,
	},
	CreationDropped {
		tx_hash: B256,
		reason: String,
	},
	StatusChanged {
		order_id: B256,
		from: OrderStatus,
		to: OrderStatus,
	},
	Recovered {
		order_id: B256,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FundingEvent {
	Approved {
		chain_id: u64,
		holder: Address,
		token: Address,
		amount: U256,
		tx_hash: B256,
	},
	Deposited {
		chain_id: u64,
		holder: Address,
		token: Address,
		amount: U256,
		tx_hash: B256,
	},
}

/// Broadcast channel for engine events.
pub struct EventBus {
	sender: broadcast::Sender<SettlementEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
		self.sender.subscribe()
	}

	/// Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: SettlementEvent,
	) -> Result<(), broadcast::error::SendError<SettlementEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
