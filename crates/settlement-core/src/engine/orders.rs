//! Taking a bid and walking the resulting order through its lifecycle.

use alloy::primitives::{Address, B256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement_delivery::ConfirmationStatus;
use settlement_intents::{calls, codec, events, EscrowEvent, OrderCreated, RevertReason};
use settlement_types::{
	from_contract_value, resolve_roles, to_contract_value, Bid, BidAvailability,
	DeadlineSignal, Order, OrderEvent, OrderIntentTerms, OrderStatus, PendingCreation,
	SettlementEvent, Timestamp,
};

use super::{InFlight, SettlementEngine};
use crate::escrow::EscrowTransactor;
use crate::lifecycle::{decide, Action, ChainObservation, Decision, TransitionOutcome};
use crate::{Actor, EngineError};

/// Bits of randomness in the low end of an intent nonce.
const NONCE_RANDOM_BITS: u32 = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	pub bid_hash: B256,
	/// Base-asset amount to take.
	pub amount: Decimal,
	#[serde(default)]
	pub max_slippage_bps: u16,
	/// Sell bids: one of the bid's linked accounts. Buy bids: one of the
	/// taker's own accounts, which receives the fiat.
	#[serde(default)]
	pub payment_account_id: Option<String>,
	#[serde(default)]
	pub country: Option<String>,
	#[serde(default)]
	pub access_token: Option<String>,
}

/// Timestamp in the high bits, randomness in the low ones, so two intents
/// of one taker never share a nonce.
fn intent_nonce(now: Timestamp) -> u64 {
	let random = uuid::Uuid::new_v4().as_u128() as u64 & ((1 << NONCE_RANDOM_BITS) - 1);
	(now << NONCE_RANDOM_BITS) | random
}

impl SettlementEngine {
	/// Takes `request.amount` of a bid: checks everything that can be
	/// checked off-chain, makes sure the seller's side is escrowed, signs
	/// the intent and creates the order on-chain.
	///
	/// Once the create transaction is broadcast a pending record exists
	/// until the order is recorded or the transaction is known to have
	/// failed. A timeout leaves it for [`Self::reconcile_pending`].
	pub async fn create_order(
		&self,
		actor: &Actor,
		request: CreateOrderRequest,
	) -> Result<Order, EngineError> {
		let bid = self.get_bid(&request.bid_hash).await?;
		let now = self.clock.now();
		match bid.availability(now) {
			BidAvailability::Active => {}
			BidAvailability::Expired => {
				return Err(EngineError::Validation("bid has expired".to_string()))
			}
			BidAvailability::Cancelled => {
				return Err(EngineError::Validation("bid was cancelled".to_string()))
			}
			BidAvailability::Completed => {
				return Err(EngineError::Validation("bid is fully taken".to_string()))
			}
		}
		if now.checked_add(bid.terms.payment_window).is_none() {
			return Err(EngineError::Validation(format!(
				"payment window of {}s leaves no representable deadline",
				bid.terms.payment_window
			)));
		}
		let chain = self.registry.get(bid.chain_id)?;
		let decimals = chain.token(&bid.terms.base_asset)?.decimals;

		if actor.address == bid.terms.maker {
			return Err(EngineError::Unauthorized(
				"a maker cannot take their own bid".to_string(),
			));
		}
		let amount = request.amount;
		if amount < bid.terms.min_amount {
			return Err(EngineError::BelowMinimum {
				amount,
				min: bid.terms.min_amount,
				max: bid.terms.max_amount,
			});
		}
		if amount > bid.terms.max_amount {
			return Err(EngineError::AboveMaximum {
				amount,
				min: bid.terms.min_amount,
				max: bid.terms.max_amount,
			});
		}
		let units = to_contract_value(&amount, u32::from(decimals))?;
		bid.visibility.admits(
			request.country.as_deref(),
			request.access_token.as_deref(),
			now,
		)?;
		if let Some(level) = actor.kyc_level {
			if level < bid.terms.kyc_level {
				return Err(EngineError::Rejected(RevertReason::InsufficientKyc {
					required: bid.terms.kyc_level,
					actual: level,
				}));
			}
		}
		let resolved = self
			.snapshotter
			.resolve(&bid, &actor.address, request.payment_account_id.as_deref())
			.await?;
		if resolved.is_none() {
			tracing::debug!(bid_hash = %bid.bid_hash, "No payment account resolves; details will be arranged out of band");
		}

		actor.account.switch_network(chain.chain_id).await?;
		let roles = resolve_roles(bid.terms.bid_type, bid.terms.maker, actor.address);
		if roles.seller == actor.address {
			self.funding
				.ensure(chain, actor, bid.terms.base_asset, units, decimals)
				.await?;
		} else {
			self.funding
				.require(chain, roles.seller, bid.terms.base_asset, units, decimals)
				.await?;
		}

		let engine = &self.config.engine;
		let intent = OrderIntentTerms {
			bid_hash: bid.bid_hash,
			taker: actor.address,
			amount,
			max_slippage_bps: request.max_slippage_bps,
			expires_at: now + engine.signature_timeout_seconds + engine.confirmation_timeout_seconds,
			nonce: intent_nonce(now),
		};
		let taker_signature = self
			.signature(
				"sign_intent",
				codec::sign_intent(&intent, decimals, &chain.domain, &actor.account),
			)
			.await?;
		let data = calls::create_order(
			codec::bid_struct(&bid.terms, decimals)?,
			bid.signature.clone(),
			codec::intent_struct(&intent, decimals)?,
			taker_signature,
		);
		let tx = EscrowTransactor::transaction(chain, actor.address, chain.escrow, data);
		let expected_id = self.escrow.simulate_create(&tx).await?;
		let tx_hash = self.escrow.submit(&tx, actor).await?;

		self.records
			.save_pending(&PendingCreation {
				tx_hash,
				chain_id: chain.chain_id,
				bid_hash: bid.bid_hash,
				taker: actor.address,
				amount,
				payment_account_id: request.payment_account_id.clone(),
				created_at: now,
			})
			.await?;
		self.events
			.publish(SettlementEvent::Order(OrderEvent::CreationSubmitted {
				bid_hash: bid.bid_hash,
				tx_hash,
			}))
			.ok();
		tracing::info!(
			bid_hash = %bid.bid_hash,
			tx_hash = %tx_hash,
			order_id = %expected_id,
			"Submitted order creation"
		);

		let receipt = match self.escrow.await_confirmation(chain, tx_hash, &tx).await {
			Ok(receipt) => receipt,
			Err(e @ (EngineError::Rejected(_) | EngineError::Reverted { .. })) => {
				self.records.remove_pending(&tx_hash).await?;
				self.events
					.publish(SettlementEvent::Order(OrderEvent::CreationDropped {
						tx_hash,
						reason: e.to_string(),
					}))
					.ok();
				return Err(e);
			}
			Err(e) => {
				tracing::warn!(tx_hash = %tx_hash, error = %e, "Order creation left pending for reconciliation");
				return Err(e);
			}
		};

		let created = self.escrow.extract_order_id(chain, &receipt)?;
		if created.bid_hash != bid.bid_hash || created.taker != actor.address {
			return Err(EngineError::alert(format!(
				"OrderCreated in {} does not match the submitted intent (bid {}, taker {})",
				tx_hash, created.bid_hash, created.taker
			)));
		}
		self.record_order(
			&bid,
			&created,
			receipt.hash,
			now,
			request.payment_account_id.as_deref(),
			false,
		)
		.await
	}

	/// Writes the order for a confirmed `OrderCreated` event. Whichever of
	/// the creating workflow and the reconciler gets here first writes it;
	/// the other gets the stored record back.
	///
	/// `opened_at` is when the order was opened, not when it is recorded;
	/// the payment deadline runs from it.
	pub(crate) async fn record_order(
		&self,
		bid: &Bid,
		created: &OrderCreated,
		tx_hash: B256,
		opened_at: Timestamp,
		payment_account_id: Option<&str>,
		recovered: bool,
	) -> Result<Order, EngineError> {
		let now = self.clock.now();
		let from_amount = from_contract_value(created.amount, u32::from(bid.base_decimals))?;
		let payment_snapshot = self
			.snapshotter
			.capture(bid, &created.taker, payment_account_id, &created.order_id, now)
			.await;

		let order = Order {
			order_id: created.order_id,
			bid_hash: Some(bid.bid_hash),
			chain_id: bid.chain_id,
			maker: bid.terms.maker,
			taker: created.taker,
			bid_type: bid.terms.bid_type,
			base_asset: bid.terms.base_asset,
			base_decimals: bid.base_decimals,
			from_amount,
			price: bid.terms.price,
			fee_bps: bid.fee_bps,
			fiat_currency: bid.fiat_currency.clone(),
			status: OrderStatus::Locked,
			payment_snapshot,
			opened_at,
			payment_deadline: opened_at.saturating_add(bid.terms.payment_window),
			confirm_deadline: None,
			payment_sent_at: None,
			cancel_requested_at: None,
			completed_at: None,
			cancelled_at: None,
			disputed_at: None,
			creation_tx: Some(tx_hash),
			release_tx: None,
			recovered,
			updated_at: now,
		};

		if !self.records.insert_order(&order).await? {
			self.records.remove_pending(&tx_hash).await?;
			return self.get_order(&order.order_id).await;
		}
		self.records.remove_pending(&tx_hash).await?;

		let event = if recovered {
			tracing::info!(order_id = %order.order_id, tx_hash = %tx_hash, "Recovered order from chain");
			OrderEvent::Recovered {
				order_id: order.order_id,
			}
		} else {
			tracing::info!(order_id = %order.order_id, bid_hash = %bid.bid_hash, amount = %from_amount, "Order locked");
			OrderEvent::Created {
				order_id: order.order_id,
				bid_hash: bid.bid_hash,
				tx_hash,
			}
		};
		self.events.publish(SettlementEvent::Order(event)).ok();

		if from_amount == bid.terms.max_amount {
			self.complete_bid(&bid.bid_hash).await?;
		}
		Ok(order)
	}

	/// The buyer declares the fiat payment sent.
	pub async fn mark_paid(
		&self,
		actor: &Actor,
		order_id: &B256,
	) -> Result<TransitionOutcome, EngineError> {
		self.lifecycle
			.apply(order_id, &actor.address, Action::MarkPaid)
			.await
	}

	/// Either party asks to unwind the trade. Funds only move back once the
	/// escrow emits `OrderCancelled`.
	pub async fn request_cancel(
		&self,
		actor: &Actor,
		order_id: &B256,
	) -> Result<TransitionOutcome, EngineError> {
		self.lifecycle
			.apply(order_id, &actor.address, Action::RequestCancel)
			.await
	}

	pub async fn open_dispute(
		&self,
		actor: &Actor,
		order_id: &B256,
	) -> Result<TransitionOutcome, EngineError> {
		self.lifecycle
			.apply(order_id, &actor.address, Action::OpenDispute)
			.await
	}

	/// The seller confirms the fiat arrived and releases the escrowed crypto
	/// to the buyer. The order completes only after the release is confirmed
	/// on-chain.
	pub async fn confirm_and_release(
		&self,
		actor: &Actor,
		order_id: &B256,
	) -> Result<TransitionOutcome, EngineError> {
		let order = self.get_order(order_id).await?;
		if decide(&order, &actor.address, Action::ConfirmRelease)? == Decision::AlreadyApplied {
			return Ok(TransitionOutcome {
				order,
				changed: false,
			});
		}
		let chain = self.registry.get(order.chain_id)?;
		let _in_flight = InFlight::acquire(&self.releases_in_flight, *order_id)
			.ok_or(EngineError::ReleaseInProgress(*order_id))?;

		actor.account.switch_network(chain.chain_id).await?;
		let tx_hash = self.escrow.release(chain, actor, *order_id).await?;
		tracing::info!(order_id = %order_id, tx_hash = %tx_hash, "Escrow released");
		self.lifecycle
			.observe(
				order_id,
				ChainObservation::Released {
					tx_hash,
					automatic: false,
				},
			)
			.await
	}

	/// Records a cancellation the escrow executed in `tx_hash`.
	pub async fn finalize_cancellation(
		&self,
		actor: &Actor,
		order_id: &B256,
		tx_hash: &B256,
	) -> Result<TransitionOutcome, EngineError> {
		let order = self.get_order(order_id).await?;
		if order.roles().role_of(&actor.address).is_none() {
			return Err(EngineError::Unauthorized(format!(
				"{} is not a party to order {}",
				actor.address, order_id
			)));
		}
		let chain = self.registry.get(order.chain_id)?;
		let receipt = match self
			.delivery
			.check_confirmation(chain.chain_id, tx_hash, chain.confirmations)
			.await?
		{
			ConfirmationStatus::Confirmed(receipt) => receipt,
			ConfirmationStatus::Reverted(_) => {
				return Err(EngineError::Reverted { tx_hash: *tx_hash })
			}
			ConfirmationStatus::Pending => {
				return Err(EngineError::Validation(format!(
					"cancellation {} is not confirmed yet",
					tx_hash
				)))
			}
		};
		let cancelled = events::decode_escrow_logs(&receipt.logs, chain.escrow)
			.into_iter()
			.any(|event| matches!(event, EscrowEvent::Cancelled { order_id: id, .. } if id == *order_id));
		if !cancelled {
			return Err(EngineError::Validation(format!(
				"transaction {} did not cancel order {}",
				tx_hash, order_id
			)));
		}
		self.lifecycle
			.observe(order_id, ChainObservation::Cancelled { tx_hash: *tx_hash })
			.await
	}

	pub async fn deadline_signals(&self, order_id: &B256) -> Result<Vec<DeadlineSignal>, EngineError> {
		Ok(self
			.get_order(order_id)
			.await?
			.deadline_signals(self.clock.now()))
	}

	pub async fn get_order(&self, order_id: &B256) -> Result<Order, EngineError> {
		self.records
			.get_order(order_id)
			.await?
			.ok_or(EngineError::OrderNotFound(*order_id))
	}

	/// Orders where `user` is maker or taker.
	pub async fn orders_for_user(&self, user: &Address) -> Result<Vec<Order>, EngineError> {
		self.records.orders_for_user(user).await
	}
}
