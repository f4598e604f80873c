//! Brings off-chain records back in line with the escrow.
//!
//! Two passes: pending creations are resolved from their receipts, and each
//! chain's escrow events are scanned from a stored cursor up to the last
//! sufficiently confirmed block.

use alloy::primitives::B256;
use serde::Serialize;
use settlement_delivery::ConfirmationStatus;
use settlement_intents::{events, EscrowEvent};
use settlement_types::{Order, OrderEvent, PendingCreation, SettlementEvent, Timestamp};

use super::SettlementEngine;
use crate::lifecycle::ChainObservation;
use crate::registry::ChainContext;
use crate::EngineError;

/// Blocks per `eth_getLogs` request.
const LOG_CHUNK: u64 = 2_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
	/// Orders written for pending creations that turned out confirmed.
	pub recorded: Vec<B256>,
	/// Creation transactions that reverted.
	pub dropped: Vec<B256>,
	pub still_pending: Vec<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainScan {
	pub chain_id: u64,
	pub from_block: u64,
	pub to_block: u64,
	/// Orders found on-chain that had no record.
	pub created: usize,
	/// Existing orders whose status moved.
	pub updated: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
	pub pending: ReconcileReport,
	pub chains: Vec<ChainScan>,
}

enum PendingOutcome {
	Recorded(Order),
	Dropped,
	Pending,
}

enum EventEffect {
	Created,
	Updated,
	Ignored,
}

impl SettlementEngine {
	/// Resolves every pending creation whose receipt is available.
	pub async fn reconcile_pending(&self) -> Result<ReconcileReport, EngineError> {
		let mut report = ReconcileReport::default();
		for pending in self.records.pending_creations().await? {
			match self.resolve_pending(&pending).await {
				Ok(PendingOutcome::Recorded(order)) => report.recorded.push(order.order_id),
				Ok(PendingOutcome::Dropped) => report.dropped.push(pending.tx_hash),
				Ok(PendingOutcome::Pending) => report.still_pending.push(pending.tx_hash),
				Err(e) => {
					tracing::warn!(tx_hash = %pending.tx_hash, error = %e, "Failed to reconcile pending creation");
					report.still_pending.push(pending.tx_hash);
				}
			}
		}
		Ok(report)
	}

	async fn resolve_pending(&self, pending: &PendingCreation) -> Result<PendingOutcome, EngineError> {
		let chain = self.registry.get(pending.chain_id)?;
		let status = self
			.delivery
			.check_confirmation(chain.chain_id, &pending.tx_hash, chain.confirmations)
			.await?;
		match status {
			ConfirmationStatus::Pending => Ok(PendingOutcome::Pending),
			ConfirmationStatus::Reverted(_) => {
				tracing::info!(tx_hash = %pending.tx_hash, "Pending creation reverted");
				self.records.remove_pending(&pending.tx_hash).await?;
				self.events
					.publish(SettlementEvent::Order(OrderEvent::CreationDropped {
						tx_hash: pending.tx_hash,
						reason: "reverted on-chain".to_string(),
					}))
					.ok();
				Ok(PendingOutcome::Dropped)
			}
			ConfirmationStatus::Confirmed(receipt) => {
				let created = self.escrow.extract_order_id(chain, &receipt)?;
				let bid = self.records.get_bid(&created.bid_hash).await?.ok_or_else(|| {
					EngineError::alert(format!(
						"Pending creation {} minted order {} for unknown bid {}",
						pending.tx_hash, created.order_id, created.bid_hash
					))
				})?;
				let order = self
					.record_order(
						&bid,
						&created,
						receipt.hash,
						pending.created_at,
						pending.payment_account_id.as_deref(),
						true,
					)
					.await?;
				Ok(PendingOutcome::Recorded(order))
			}
		}
	}

	/// Applies the escrow events of `chain_id` that reached the confirmation
	/// depth since the last scan. `None` when there is nothing new.
	///
	/// The cursor only advances past a chunk once every event in it was
	/// applied, so a failed scan is retried from the same block.
	pub async fn sync_chain(&self, chain_id: u64) -> Result<Option<ChainScan>, EngineError> {
		let chain = self.registry.get(chain_id)?;
		let head = self.delivery.get_block_number(chain_id).await?;
		let Some(safe) = (head + 1).checked_sub(chain.confirmations.max(1)) else {
			return Ok(None);
		};
		let from = match self.records.cursor(chain_id).await? {
			Some(cursor) => cursor + 1,
			None => chain.start_block,
		};
		if from > safe {
			return Ok(None);
		}
		self.scan_range(chain, from, safe, true).await.map(Some)
	}

	/// Applies the escrow events in `from_block..=to_block` as found. The
	/// stored cursor is left alone, so this can replay history that was
	/// already scanned.
	pub async fn reconcile_chain_events(
		&self,
		chain_id: u64,
		from_block: u64,
		to_block: u64,
	) -> Result<ChainScan, EngineError> {
		if from_block > to_block {
			return Err(EngineError::Validation(format!(
				"block range {}..={} is empty",
				from_block, to_block
			)));
		}
		let chain = self.registry.get(chain_id)?;
		self.scan_range(chain, from_block, to_block, false).await
	}

	async fn scan_range(
		&self,
		chain: &ChainContext,
		from: u64,
		to: u64,
		advance_cursor: bool,
	) -> Result<ChainScan, EngineError> {
		let chain_id = chain.chain_id;
		let mut scan = ChainScan {
			chain_id,
			from_block: from,
			to_block: to,
			created: 0,
			updated: 0,
		};
		let mut start = from;
		while start <= to {
			let end = to.min(start + LOG_CHUNK - 1);
			let logs = self
				.delivery
				.get_logs(chain_id, chain.escrow, start, end)
				.await?;
			for log in &logs {
				let Some(event) = events::decode_escrow_log(log, chain.escrow) else {
					continue;
				};
				let tx_hash = log.transaction_hash.unwrap_or_default();
				match self
					.apply_escrow_event(chain, event, tx_hash, log.block_number)
					.await?
				{
					EventEffect::Created => scan.created += 1,
					EventEffect::Updated => scan.updated += 1,
					EventEffect::Ignored => {}
				}
			}
			if advance_cursor {
				self.records.set_cursor(chain_id, end).await?;
			}
			start = end + 1;
		}

		tracing::debug!(
			chain_id,
			from_block = scan.from_block,
			to_block = scan.to_block,
			created = scan.created,
			updated = scan.updated,
			"Scanned escrow events"
		);
		Ok(scan)
	}

	/// When block `number` was mined. Falls back to the local clock when the
	/// log carries no block or the node does not know it.
	async fn block_time(&self, chain_id: u64, number: Option<u64>) -> Result<Timestamp, EngineError> {
		let timestamp = match number {
			Some(number) => self.delivery.get_block_timestamp(chain_id, number).await?,
			None => None,
		};
		Ok(timestamp.unwrap_or_else(|| {
			tracing::warn!(chain_id, block = ?number, "No block timestamp; opening order at the local time");
			self.clock.now()
		}))
	}

	async fn apply_escrow_event(
		&self,
		chain: &ChainContext,
		event: EscrowEvent,
		tx_hash: B256,
		block_number: Option<u64>,
	) -> Result<EventEffect, EngineError> {
		let order_id = event.order_id();
		let observation = match event {
			EscrowEvent::Created(created) => {
				if self.records.get_order(&created.order_id).await?.is_some() {
					return Ok(EventEffect::Ignored);
				}
				let Some(bid) = self.records.get_bid(&created.bid_hash).await? else {
					EngineError::alert(format!(
						"Escrow on chain {} created order {} for unknown bid {}",
						chain.chain_id, created.order_id, created.bid_hash
					));
					return Ok(EventEffect::Ignored);
				};
				let (opened_at, payment_account_id) = match self.records.get_pending(&tx_hash).await? {
					Some(pending) => (pending.created_at, pending.payment_account_id),
					None => (self.block_time(chain.chain_id, block_number).await?, None),
				};
				self.record_order(
					&bid,
					&created,
					tx_hash,
					opened_at,
					payment_account_id.as_deref(),
					true,
				)
				.await?;
				return Ok(EventEffect::Created);
			}
			EscrowEvent::Released { .. } => ChainObservation::Released {
				tx_hash,
				automatic: false,
			},
			EscrowEvent::AutoReleased { .. } => ChainObservation::Released {
				tx_hash,
				automatic: true,
			},
			EscrowEvent::Cancelled { .. } => ChainObservation::Cancelled { tx_hash },
			EscrowEvent::Disputed { .. } => ChainObservation::Disputed,
		};

		match self.lifecycle.observe(&order_id, observation).await {
			Ok(outcome) if outcome.changed => Ok(EventEffect::Updated),
			Ok(_) => Ok(EventEffect::Ignored),
			Err(EngineError::OrderNotFound(_)) => {
				tracing::debug!(order_id = %order_id, "Escrow event for an order without a record");
				Ok(EventEffect::Ignored)
			}
			Err(e) => Err(e),
		}
	}

	/// One reconciliation round over pending creations and every chain.
	/// Failures are logged per chain and retried on the next round.
	pub async fn sync_all(&self) -> SyncReport {
		let pending = match self.reconcile_pending().await {
			Ok(report) => report,
			Err(e) => {
				tracing::warn!(error = %e, "Pending reconciliation failed");
				ReconcileReport::default()
			}
		};
		let mut chains = Vec::new();
		for chain_id in self.registry.chain_ids() {
			match self.sync_chain(chain_id).await {
				Ok(Some(scan)) => chains.push(scan),
				Ok(None) => {}
				Err(e) => tracing::warn!(chain_id, error = %e, "Escrow event sync failed"),
			}
		}
		SyncReport { pending, chains }
	}
}
