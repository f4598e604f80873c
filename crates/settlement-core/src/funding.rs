//! Escrow balance checks and auto-funding of the crypto holder.

use alloy::primitives::{Address, B256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement_intents::calls;
use settlement_types::{from_contract_value, EventBus, FundingEvent, SettlementEvent};
use std::sync::Arc;

use crate::escrow::EscrowTransactor;
use crate::registry::ChainContext;
use crate::{Actor, EngineError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FundingOutcome {
	/// The escrow balance already covered the trade.
	Sufficient { balance: U256 },
	/// The shortfall was moved from the holder's wallet into escrow.
	Funded {
		deposited: U256,
		approve_tx: Option<B256>,
		deposit_tx: B256,
	},
}

pub struct BalanceGuard {
	escrow: Arc<EscrowTransactor>,
	events: EventBus,
}

impl BalanceGuard {
	pub fn new(escrow: Arc<EscrowTransactor>, events: EventBus) -> Self {
		Self { escrow, events }
	}

	async fn read_uint(
		&self,
		chain: &ChainContext,
		to: Address,
		data: alloy::primitives::Bytes,
	) -> Result<U256, EngineError> {
		let tx = EscrowTransactor::transaction(chain, Address::ZERO, to, data);
		let output = self.escrow.simulate(&tx).await?;
		Ok(calls::decode_uint(&output)?)
	}

	pub async fn escrow_balance(
		&self,
		chain: &ChainContext,
		holder: Address,
		token: Address,
	) -> Result<U256, EngineError> {
		self.read_uint(chain, chain.escrow, calls::escrow_balance(holder, token))
			.await
	}

	pub async fn wallet_balance(
		&self,
		chain: &ChainContext,
		holder: Address,
		token: Address,
	) -> Result<U256, EngineError> {
		self.read_uint(chain, token, calls::token_balance(holder))
			.await
	}

	/// Amount the escrow may currently pull from `owner`.
	pub async fn allowance(
		&self,
		chain: &ChainContext,
		owner: Address,
		token: Address,
	) -> Result<U256, EngineError> {
		self.read_uint(chain, token, calls::allowance(owner, chain.escrow))
			.await
	}

	/// Read-only check used when the holder is not the caller and so cannot
	/// be funded on their behalf.
	pub async fn require(
		&self,
		chain: &ChainContext,
		holder: Address,
		token: Address,
		required: U256,
		decimals: u8,
	) -> Result<U256, EngineError> {
		let balance = self.escrow_balance(chain, holder, token).await?;
		if balance >= required {
			return Ok(balance);
		}
		let wallet = self.wallet_balance(chain, holder, token).await?;
		Err(insufficient(required, balance, wallet, decimals)?)
	}

	/// Makes sure `actor` holds at least `required` of `token` in escrow,
	/// depositing exactly the shortfall from their wallet when needed.
	///
	/// Nothing is sent when the wallet cannot cover the shortfall. The
	/// approval and the deposit are separate transactions; rerunning after a
	/// crash in between only deposits whatever is still missing.
	pub async fn ensure(
		&self,
		chain: &ChainContext,
		actor: &Actor,
		token: Address,
		required: U256,
		decimals: u8,
	) -> Result<FundingOutcome, EngineError> {
		let holder = actor.address;
		let balance = self.escrow_balance(chain, holder, token).await?;
		if balance >= required {
			return Ok(FundingOutcome::Sufficient { balance });
		}

		let shortfall = required - balance;
		let wallet = self.wallet_balance(chain, holder, token).await?;
		if wallet < shortfall {
			return Err(insufficient(required, balance, wallet, decimals)?);
		}

		tracing::info!(
			chain_id = chain.chain_id,
			holder = %holder,
			token = %token,
			shortfall = %shortfall,
			"Funding escrow from wallet"
		);

		let mut approve_tx = None;
		if self.allowance(chain, holder, token).await? < shortfall {
			let receipt = self
				.escrow
				.execute(
					chain,
					actor,
					token,
					calls::approve(chain.escrow, shortfall),
					"approve",
				)
				.await?;
			self.events
				.publish(SettlementEvent::Funding(FundingEvent::Approved {
					chain_id: chain.chain_id,
					holder,
					token,
					amount: shortfall,
					tx_hash: receipt.hash,
				}))
				.ok();
			approve_tx = Some(receipt.hash);
		}

		let receipt = self
			.escrow
			.execute(
				chain,
				actor,
				chain.escrow,
				calls::deposit(token, shortfall),
				"deposit",
			)
			.await?;
		self.events
			.publish(SettlementEvent::Funding(FundingEvent::Deposited {
				chain_id: chain.chain_id,
				holder,
				token,
				amount: shortfall,
				tx_hash: receipt.hash,
			}))
			.ok();

		Ok(FundingOutcome::Funded {
			deposited: shortfall,
			approve_tx,
			deposit_tx: receipt.hash,
		})
	}
}

fn insufficient(
	required: U256,
	escrow_balance: U256,
	wallet_balance: U256,
	decimals: u8,
) -> Result<EngineError, EngineError> {
	let decimals = u32::from(decimals);
	let as_decimal = |value: U256| -> Result<Decimal, EngineError> {
		Ok(from_contract_value(value, decimals)?)
	};
	Ok(EngineError::InsufficientFunds {
		required: as_decimal(required)?,
		escrow_balance: as_decimal(escrow_balance)?,
		wallet_balance: as_decimal(wallet_balance)?,
	})
}
