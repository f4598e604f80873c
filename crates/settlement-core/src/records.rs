//! Bid, order and pending-creation records with their secondary indexes.
//!
//! Index entries are written before the record they point at, so a crash in
//! between leaves a dangling index entry rather than an unreachable record.
//! Listings skip entries whose record is missing.

use alloy::primitives::{Address, B256};
use settlement_storage::{StorageService, Update};
use settlement_types::{address_key, Bid, Order, PendingCreation};
use std::sync::Arc;

use crate::EngineError;

const BIDS: &str = "bids";
const ORDERS: &str = "orders";
const PENDING: &str = "pending_creations";
const CURSORS: &str = "cursors";

fn hash_key(hash: &B256) -> String {
	format!("{:#x}", hash)
}

fn bids_by_maker(maker: &Address) -> String {
	format!("bids_by_maker:{}", address_key(maker))
}

fn orders_by_user(user: &Address) -> String {
	format!("orders_by_user:{}", address_key(user))
}

fn orders_by_bid(bid_hash: &B256) -> String {
	format!("orders_by_bid:{}", hash_key(bid_hash))
}

/// Typed access to the engine's records on top of a [`StorageService`].
pub struct SettlementRecordStore {
	storage: Arc<StorageService>,
}

impl SettlementRecordStore {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self { storage }
	}

	/// Stores a new bid and indexes it under its maker. Returns `false`
	/// when a bid with the same hash already exists; the stored one is left
	/// untouched.
	pub async fn insert_bid(&self, bid: &Bid) -> Result<bool, EngineError> {
		let id = hash_key(&bid.bid_hash);
		self.storage
			.add_to_index(&bids_by_maker(&bid.terms.maker), &id)
			.await?;
		Ok(self.storage.insert_new(BIDS, &id, bid).await?)
	}

	/// `None` when no bid with this hash was published here.
	pub async fn get_bid(&self, bid_hash: &B256) -> Result<Option<Bid>, EngineError> {
		Ok(self.storage.find(BIDS, &hash_key(bid_hash)).await?)
	}

	/// Compare-and-swap update of one bid, as [`Self::update_order`].
	/// A missing bid is [`EngineError::BidNotFound`].
	pub async fn update_bid<F>(&self, bid_hash: &B256, f: F) -> Result<Update<Bid>, EngineError>
	where
		F: FnMut(&Bid) -> Result<Option<Bid>, EngineError>,
	{
		match self
			.storage
			.update_with(BIDS, &hash_key(bid_hash), f)
			.await
		{
			Err(EngineError::Storage(settlement_storage::StorageError::NotFound)) => {
				Err(EngineError::BidNotFound(*bid_hash))
			}
			other => other,
		}
	}

	pub async fn bids_by_maker(&self, maker: &Address) -> Result<Vec<Bid>, EngineError> {
		let mut bids = Vec::new();
		for id in self.storage.list_index(&bids_by_maker(maker)).await? {
			if let Some(bid) = self.storage.find(BIDS, &id).await? {
				bids.push(bid);
			}
		}
		Ok(bids)
	}

	/// Stores a new order and indexes it under both parties and its bid.
	/// Returns `false` when the order was already recorded, in which case
	/// the stored record wins.
	pub async fn insert_order(&self, order: &Order) -> Result<bool, EngineError> {
		let id = hash_key(&order.order_id);
		self.storage
			.add_to_index(&orders_by_user(&order.maker), &id)
			.await?;
		self.storage
			.add_to_index(&orders_by_user(&order.taker), &id)
			.await?;
		if let Some(bid_hash) = &order.bid_hash {
			self.storage
				.add_to_index(&orders_by_bid(bid_hash), &id)
				.await?;
		}
		Ok(self.storage.insert_new(ORDERS, &id, order).await?)
	}

	pub async fn get_order(&self, order_id: &B256) -> Result<Option<Order>, EngineError> {
		Ok(self.storage.find(ORDERS, &hash_key(order_id)).await?)
	}

	/// Compare-and-swap update of one order. See
	/// [`StorageService::update_with`] for the closure contract.
	pub async fn update_order<F>(
		&self,
		order_id: &B256,
		f: F,
	) -> Result<Update<Order>, EngineError>
	where
		F: FnMut(&Order) -> Result<Option<Order>, EngineError>,
	{
		match self
			.storage
			.update_with(ORDERS, &hash_key(order_id), f)
			.await
		{
			Err(EngineError::Storage(settlement_storage::StorageError::NotFound)) => {
				Err(EngineError::OrderNotFound(*order_id))
			}
			other => other,
		}
	}

	/// Orders where `user` is either the maker or the taker.
	pub async fn orders_for_user(&self, user: &Address) -> Result<Vec<Order>, EngineError> {
		self.load_orders(&orders_by_user(user)).await
	}

	pub async fn orders_for_bid(&self, bid_hash: &B256) -> Result<Vec<Order>, EngineError> {
		self.load_orders(&orders_by_bid(bid_hash)).await
	}

	async fn load_orders(&self, index: &str) -> Result<Vec<Order>, EngineError> {
		let mut orders = Vec::new();
		for id in self.storage.list_index(index).await? {
			if let Some(order) = self.storage.find(ORDERS, &id).await? {
				orders.push(order);
			}
		}
		Ok(orders)
	}

	/// Records a submitted creation before its receipt is awaited.
	/// Overwrites any record for the same transaction.
	pub async fn save_pending(&self, pending: &PendingCreation) -> Result<(), EngineError> {
		let id = hash_key(&pending.tx_hash);
		self.storage.add_to_index(PENDING, &id).await?;
		self.storage.store(PENDING, &id, pending).await?;
		Ok(())
	}

	pub async fn get_pending(&self, tx_hash: &B256) -> Result<Option<PendingCreation>, EngineError> {
		Ok(self.storage.find(PENDING, &hash_key(tx_hash)).await?)
	}

	pub async fn pending_creations(&self) -> Result<Vec<PendingCreation>, EngineError> {
		let mut pending = Vec::new();
		for id in self.storage.list_index(PENDING).await? {
			if let Some(record) = self.storage.find(PENDING, &id).await? {
				pending.push(record);
			}
		}
		Ok(pending)
	}

	/// Removing a record that is already gone succeeds.
	pub async fn remove_pending(&self, tx_hash: &B256) -> Result<(), EngineError> {
		let id = hash_key(tx_hash);
		self.storage.remove(PENDING, &id).await?;
		self.storage.remove_from_index(PENDING, &id).await?;
		Ok(())
	}

	/// Last block whose escrow events have been reconciled.
	pub async fn cursor(&self, chain_id: u64) -> Result<Option<u64>, EngineError> {
		Ok(self.storage.find(CURSORS, &chain_id.to_string()).await?)
	}

	pub async fn set_cursor(&self, chain_id: u64, block: u64) -> Result<(), EngineError> {
		Ok(self
			.storage
			.store(CURSORS, &chain_id.to_string(), &block)
			.await?)
	}
}
