//! Resolves the payment account an order uses and freezes it into the order.

use alloy::primitives::{Address, B256};
use settlement_types::{Bid, BidType, PaymentLinkage, PaymentSnapshot, Timestamp, UserPaymentAccount};
use std::sync::Arc;

use crate::payment_accounts::PaymentAccountStore;
use crate::EngineError;

/// Reference the buyer quotes on the fiat transfer.
pub fn reference_code(order_id: &B256) -> String {
	format!("P2P-{}", hex::encode_upper(&order_id[..5]))
}

/// An account chosen for an order, with the instructions attached to its
/// link on the bid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
	pub account: UserPaymentAccount,
	pub custom_instructions: Option<String>,
}

pub struct PaymentSnapshotter {
	accounts: Arc<PaymentAccountStore>,
}

impl PaymentSnapshotter {
	pub fn new(accounts: Arc<PaymentAccountStore>) -> Self {
		Self { accounts }
	}

	/// Picks the seller's receiving account.
	///
	/// On a sell bid the maker is the seller: a taker's choice must be one
	/// of the bid's linked accounts, otherwise the first linked account that
	/// still resolves is used. On a buy bid the taker is the seller and
	/// names one of their own accounts, whose method type the bid must
	/// accept. `Ok(None)` means nothing could be resolved.
	pub async fn resolve(
		&self,
		bid: &Bid,
		taker: &Address,
		chosen: Option<&str>,
	) -> Result<Option<ResolvedAccount>, EngineError> {
		match bid.terms.bid_type {
			BidType::Sell => self.resolve_linked(bid, chosen).await,
			BidType::Buy => {
				let Some(account_id) = chosen else {
					return Ok(None);
				};
				let account = self
					.accounts
					.get(account_id, taker)
					.await?
					.ok_or_else(|| EngineError::PaymentAccountNotFound(account_id.to_string()))?;
				if !bid.payment.accepts_method(&account.method_type) {
					return Err(EngineError::Validation(format!(
						"bid does not accept payment method {}",
						account.method_type
					)));
				}
				Ok(Some(ResolvedAccount {
					account,
					custom_instructions: None,
				}))
			}
		}
	}

	async fn resolve_linked(
		&self,
		bid: &Bid,
		chosen: Option<&str>,
	) -> Result<Option<ResolvedAccount>, EngineError> {
		let maker = bid.terms.maker;
		if let Some(account_id) = chosen {
			let link = bid.payment.linked_account(account_id).ok_or_else(|| {
				EngineError::Validation(format!(
					"payment account {} is not offered on this bid",
					account_id
				))
			})?;
			let account = self
				.accounts
				.get(account_id, &maker)
				.await?
				.ok_or_else(|| EngineError::PaymentAccountNotFound(account_id.to_string()))?;
			return Ok(Some(ResolvedAccount {
				account,
				custom_instructions: link.custom_instructions.clone(),
			}));
		}

		let PaymentLinkage::Accounts { accounts } = &bid.payment else {
			return Ok(None);
		};
		for link in accounts {
			if let Some(account) = self.accounts.get(&link.account_id, &maker).await? {
				return Ok(Some(ResolvedAccount {
					account,
					custom_instructions: link.custom_instructions.clone(),
				}));
			}
		}
		Ok(None)
	}

	/// Builds the snapshot for a freshly created order. The escrow lock has
	/// already happened, so resolution failures degrade to no snapshot and
	/// the details are arranged out of band.
	pub async fn capture(
		&self,
		bid: &Bid,
		taker: &Address,
		chosen: Option<&str>,
		order_id: &B256,
		now: Timestamp,
	) -> Option<PaymentSnapshot> {
		match self.resolve(bid, taker, chosen).await {
			Ok(Some(resolved)) => Some(PaymentSnapshot {
				method_type: resolved.account.method_type,
				details: resolved.account.details,
				custom_instructions: resolved.custom_instructions,
				reference_code: reference_code(order_id),
				source_account_id: resolved.account.id,
				captured_at: now,
			}),
			Ok(None) => {
				tracing::warn!(order_id = %order_id, "No payment account resolved; order has no payment snapshot");
				None
			}
			Err(e) => {
				tracing::warn!(order_id = %order_id, error = %e, "Payment account resolution failed; order has no payment snapshot");
				None
			}
		}
	}
}
