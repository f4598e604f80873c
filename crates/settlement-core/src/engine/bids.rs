//! Publishing and withdrawing bids.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use settlement_intents::codec;
use settlement_types::{
	Bid, BidEvent, BidStatus, BidTerms, BidVisibility, PaymentLinkage, SettlementEvent,
};

use super::SettlementEngine;
use crate::{Actor, EngineError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishBidRequest {
	pub chain_id: u64,
	#[serde(default)]
	pub bid_group_id: Option<String>,
	pub terms: BidTerms,
	pub fiat_currency: String,
	#[serde(default)]
	pub fee_bps: u16,
	pub payment: PaymentLinkage,
	#[serde(default)]
	pub visibility: BidVisibility,
	/// Maker signature produced elsewhere. When absent the actor's signing
	/// provider is asked for one.
	#[serde(default)]
	pub signature: Option<Bytes>,
}

impl SettlementEngine {
	/// Validates, signs and stores a bid. Republishing identical terms
	/// returns the stored bid.
	pub async fn publish_bid(
		&self,
		actor: &Actor,
		request: PublishBidRequest,
	) -> Result<Bid, EngineError> {
		let terms = request.terms;
		if terms.maker != actor.address {
			return Err(EngineError::Unauthorized(
				"a bid can only be published by its maker".to_string(),
			));
		}
		let chain = self.registry.get(request.chain_id)?;
		let decimals = chain.token(&terms.base_asset)?.decimals;

		terms.check()?;
		request.payment.check(terms.bid_type)?;
		request.visibility.check()?;
		let now = self.clock.now();
		if terms.expires_at <= now {
			return Err(EngineError::Validation("bid expiry is in the past".to_string()));
		}
		if request.fiat_currency.trim().is_empty() {
			return Err(EngineError::Validation("fiat currency is required".to_string()));
		}
		if request.fee_bps > 10_000 {
			return Err(EngineError::Validation(format!(
				"fee of {} bps exceeds 100%",
				request.fee_bps
			)));
		}
		if let PaymentLinkage::Accounts { accounts } = &request.payment {
			for link in accounts {
				if self
					.payment_accounts
					.get(&link.account_id, &terms.maker)
					.await?
					.is_none()
				{
					return Err(EngineError::PaymentAccountNotFound(link.account_id.clone()));
				}
			}
		}

		let bid_hash = codec::bid_hash(&terms, decimals)?;
		let signature = match request.signature {
			Some(signature) => signature,
			None => {
				actor.account.switch_network(chain.chain_id).await?;
				self.signature(
					"sign_bid",
					codec::sign_bid(&terms, decimals, &chain.domain, &actor.account),
				)
				.await?
			}
		};
		let signer = codec::verify_bid(&terms, decimals, &chain.domain, &signature)?;
		if signer != terms.maker {
			return Err(EngineError::Unauthorized(format!(
				"bid signed by {} instead of its maker",
				signer
			)));
		}

		let bid = Bid {
			bid_hash,
			chain_id: chain.chain_id,
			bid_group_id: request.bid_group_id,
			terms,
			base_decimals: decimals,
			fiat_currency: request.fiat_currency.to_uppercase(),
			fee_bps: request.fee_bps,
			signature,
			payment: request.payment,
			visibility: request.visibility,
			status: BidStatus::Active,
			created_at: now,
			updated_at: now,
		};
		if !self.records.insert_bid(&bid).await? {
			tracing::debug!(bid_hash = %bid_hash, "Bid already published");
			return self.get_bid(&bid_hash).await;
		}

		tracing::info!(bid_hash = %bid_hash, maker = %bid.terms.maker, chain_id = bid.chain_id, "Published bid");
		self.events
			.publish(SettlementEvent::Bid(BidEvent::Published {
				bid_hash,
				maker: bid.terms.maker,
			}))
			.ok();
		Ok(bid)
	}

	/// Withdraws an active bid. Orders already opened against it are not
	/// affected.
	pub async fn cancel_bid(&self, actor: &Actor, bid_hash: &B256) -> Result<Bid, EngineError> {
		let now = self.clock.now();
		let update = self
			.records
			.update_bid(bid_hash, |bid| {
				if bid.terms.maker != actor.address {
					return Err(EngineError::Unauthorized(
						"only the maker can cancel a bid".to_string(),
					));
				}
				match bid.status {
					BidStatus::Cancelled => Ok(None),
					BidStatus::Completed => Err(EngineError::Validation(
						"bid is already completed".to_string(),
					)),
					BidStatus::Active => {
						let mut next = bid.clone();
						next.status = BidStatus::Cancelled;
						next.updated_at = now;
						Ok(Some(next))
					}
				}
			})
			.await?;

		if update.is_changed() {
			tracing::info!(bid_hash = %bid_hash, "Cancelled bid");
			self.events
				.publish(SettlementEvent::Bid(BidEvent::Cancelled {
					bid_hash: *bid_hash,
				}))
				.ok();
		}
		Ok(update.into_inner())
	}

	pub async fn get_bid(&self, bid_hash: &B256) -> Result<Bid, EngineError> {
		self.records
			.get_bid(bid_hash)
			.await?
			.ok_or(EngineError::BidNotFound(*bid_hash))
	}

	pub async fn bids_by_maker(&self, maker: &Address) -> Result<Vec<Bid>, EngineError> {
		self.records.bids_by_maker(maker).await
	}

	/// Marks a bid completed once a single order consumed its full range.
	pub(crate) async fn complete_bid(&self, bid_hash: &B256) -> Result<(), EngineError> {
		let now = self.clock.now();
		let update = self
			.records
			.update_bid(bid_hash, |bid| {
				if bid.status != BidStatus::Active {
					return Ok(None);
				}
				let mut next = bid.clone();
				next.status = BidStatus::Completed;
				next.updated_at = now;
				Ok(Some(next))
			})
			.await?;
		if update.is_changed() {
			self.events
				.publish(SettlementEvent::Bid(BidEvent::Completed {
					bid_hash: *bid_hash,
				}))
				.ok();
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{actor, bid_request, engine, FakeEscrowChain, ManualClock, MAKER_KEY, NOW, TAKER_KEY};
	use std::sync::Arc;

	#[tokio::test]
	async fn test_publish_signs_and_stores() {
		let clock = Arc::new(ManualClock::new(NOW));
		let chain = FakeEscrowChain::new(clock.clone());
		let engine = engine(&chain, clock);
		let maker = actor(MAKER_KEY).await;
		let request = bid_request(&engine, &maker).await;

		let bid = engine.publish_bid(&maker, request.clone()).await.unwrap();
		assert_eq!(bid.status, BidStatus::Active);
		assert_eq!(bid.base_decimals, 6);
		assert_eq!(bid.signature.len(), 65);
		assert_eq!(
			codec::verify_bid(
				&bid.terms,
				6,
				&engine.registry().get(137).unwrap().domain,
				&bid.signature
			)
			.unwrap(),
			maker.address
		);
		assert_eq!(engine.bids_by_maker(&maker.address).await.unwrap(), vec![bid.clone()]);

		// same terms, same hash, same record
		let again = engine.publish_bid(&maker, request).await.unwrap();
		assert_eq!(again, bid);
	}

	#[tokio::test]
	async fn test_publish_rejects_foreign_or_stale_terms() {
		let clock = Arc::new(ManualClock::new(NOW));
		let chain = FakeEscrowChain::new(clock.clone());
		let engine = engine(&chain, clock);
		let maker = actor(MAKER_KEY).await;
		let taker = actor(TAKER_KEY).await;

		let request = bid_request(&engine, &maker).await;
		assert!(matches!(
			engine.publish_bid(&taker, request.clone()).await,
			Err(EngineError::Unauthorized(_))
		));

		let mut stale = request.clone();
		stale.terms.expires_at = NOW;
		assert!(matches!(
			engine.publish_bid(&maker, stale).await,
			Err(EngineError::Validation(_))
		));

		let mut unknown_token = request.clone();
		unknown_token.terms.base_asset = Address::repeat_byte(0x77);
		assert!(matches!(
			engine.publish_bid(&maker, unknown_token).await,
			Err(EngineError::UnknownToken { .. })
		));

		let mut unlinked = request.clone();
		unlinked.payment = PaymentLinkage::Accounts {
			accounts: vec![settlement_types::LinkedPaymentAccount {
				account_id: "missing".to_string(),
				custom_instructions: None,
			}],
		};
		assert!(matches!(
			engine.publish_bid(&maker, unlinked).await,
			Err(EngineError::PaymentAccountNotFound(_))
		));

		let mut endless = request.clone();
		endless.terms.payment_window = u64::MAX;
		assert!(matches!(
			engine.publish_bid(&maker, endless).await,
			Err(EngineError::InvalidTerms(
				settlement_types::InvalidTerms::PaymentWindowTooLong { .. }
			))
		));
		assert!(engine.bids_by_maker(&maker.address).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_signature_from_another_key_is_rejected() {
		let clock = Arc::new(ManualClock::new(NOW));
		let chain = FakeEscrowChain::new(clock.clone());
		let engine = engine(&chain, clock);
		let maker = actor(MAKER_KEY).await;
		let taker = actor(TAKER_KEY).await;

		let mut request = bid_request(&engine, &maker).await;
		let domain = engine.registry().get(137).unwrap().domain.clone();
		request.signature = Some(
			codec::sign_bid(&request.terms, 6, &domain, &taker.account)
				.await
				.unwrap(),
		);
		assert!(matches!(
			engine.publish_bid(&maker, request).await,
			Err(EngineError::Unauthorized(_))
		));
	}

	#[tokio::test]
	async fn test_cancel_bid() {
		let clock = Arc::new(ManualClock::new(NOW));
		let chain = FakeEscrowChain::new(clock.clone());
		let engine = engine(&chain, clock);
		let maker = actor(MAKER_KEY).await;
		let taker = actor(TAKER_KEY).await;
		let bid = engine
			.publish_bid(&maker, bid_request(&engine, &maker).await)
			.await
			.unwrap();

		assert!(matches!(
			engine.cancel_bid(&taker, &bid.bid_hash).await,
			Err(EngineError::Unauthorized(_))
		));
		let cancelled = engine.cancel_bid(&maker, &bid.bid_hash).await.unwrap();
		assert_eq!(cancelled.status, BidStatus::Cancelled);
		let again = engine.cancel_bid(&maker, &bid.bid_hash).await.unwrap();
		assert_eq!(again, cancelled);
		assert!(matches!(
			engine.cancel_bid(&maker, &B256::repeat_byte(3)).await,
			Err(EngineError::BidNotFound(_))
		));
	}
}
