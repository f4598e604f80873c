//! Escrow transactions: simulate, submit, await confirmation and read the
//! outcome back out of the receipt.

use alloy::primitives::{Address, Bytes, B256, U256};
use settlement_delivery::{ConfirmationStatus, DeliveryService};
use settlement_intents::{calls, events, OrderCreated, RevertReason};
use settlement_types::{Transaction, TransactionReceipt};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::ChainContext;
use crate::{Actor, EngineError};

/// Sends escrow calls through the delivery layer and interprets their
/// outcome. Holds no per-chain state.
pub struct EscrowTransactor {
	delivery: Arc<DeliveryService>,
	confirmation_timeout: Duration,
}

impl EscrowTransactor {
	pub fn new(delivery: Arc<DeliveryService>, confirmation_timeout: Duration) -> Self {
		Self {
			delivery,
			confirmation_timeout,
		}
	}

	/// A zero-value call from `from` to `to` on `chain`.
	pub fn transaction(chain: &ChainContext, from: Address, to: Address, data: Bytes) -> Transaction {
		Transaction {
			chain_id: chain.chain_id,
			from,
			to,
			data,
			value: U256::ZERO,
		}
	}

	/// Dry-runs `tx` against the latest state. A revert comes back as
	/// [`EngineError::Rejected`] carrying the escrow's reason.
	pub async fn simulate(&self, tx: &Transaction) -> Result<Bytes, EngineError> {
		Ok(self.delivery.call(tx).await?)
	}

	/// Simulates a create-order call and returns the order id it would mint.
	pub async fn simulate_create(&self, tx: &Transaction) -> Result<B256, EngineError> {
		let output = self.simulate(tx).await?;
		Ok(calls::decode_bytes32(&output)?)
	}

	/// Signs `tx` with the actor's account and broadcasts it. Returns once
	/// the node accepted it, before it is mined.
	pub async fn submit(&self, tx: &Transaction, actor: &Actor) -> Result<B256, EngineError> {
		Ok(self.delivery.submit(tx, &actor.account).await?)
	}

	/// Waits until `tx_hash` reaches the chain's confirmation depth.
	///
	/// A reverted receipt carries no reason, so `tx` is simulated again to
	/// recover one; when that succeeds the revert is reported without one.
	pub async fn await_confirmation(
		&self,
		chain: &ChainContext,
		tx_hash: B256,
		tx: &Transaction,
	) -> Result<TransactionReceipt, EngineError> {
		let status = self
			.delivery
			.wait_for_confirmation(
				chain.chain_id,
				&tx_hash,
				chain.confirmations,
				self.confirmation_timeout,
				chain.poll_interval,
			)
			.await?;

		match status {
			ConfirmationStatus::Confirmed(receipt) => Ok(receipt),
			ConfirmationStatus::Reverted(_) => {
				tracing::warn!(tx_hash = %tx_hash, "Transaction reverted on-chain");
				match self.simulate(tx).await {
					Err(EngineError::Rejected(reason)) if !matches!(reason, RevertReason::Unknown(_)) => {
						Err(EngineError::Rejected(reason))
					}
					_ => Err(EngineError::Reverted { tx_hash }),
				}
			}
			ConfirmationStatus::Pending => Err(EngineError::ConfirmationTimeout {
				tx_hash,
				seconds: self.confirmation_timeout.as_secs(),
			}),
		}
	}

	/// Simulate, submit and confirm one call made by `actor`.
	pub async fn execute(
		&self,
		chain: &ChainContext,
		actor: &Actor,
		to: Address,
		data: Bytes,
		step: &'static str,
	) -> Result<TransactionReceipt, EngineError> {
		let tx = Self::transaction(chain, actor.address, to, data);
		self.simulate(&tx).await?;
		let tx_hash = self.submit(&tx, actor).await?;
		tracing::debug!(step, tx_hash = %tx_hash, "Awaiting confirmation");
		self.await_confirmation(chain, tx_hash, &tx).await
	}

	/// The `OrderCreated` event of a confirmed create-order receipt. Its
	/// absence is raised as an alert.
	pub fn extract_order_id(
		&self,
		chain: &ChainContext,
		receipt: &TransactionReceipt,
	) -> Result<OrderCreated, EngineError> {
		Ok(events::extract_order_id(receipt, chain.escrow)?)
	}

	/// Releases `order_id` to the buyer and returns the release transaction.
	pub async fn release(
		&self,
		chain: &ChainContext,
		actor: &Actor,
		order_id: B256,
	) -> Result<B256, EngineError> {
		let receipt = self
			.execute(chain, actor, chain.escrow, calls::release(order_id), "release")
			.await?;
		if !events::find_release(&receipt, chain.escrow, order_id) {
			return Err(EngineError::alert(format!(
				"Release receipt {} carries no OrderReleased event for order {}",
				receipt.hash, order_id
			)));
		}
		Ok(receipt.hash)
	}
}
