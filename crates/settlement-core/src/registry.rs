//! Static per-chain registry: escrow address, signing domain, finality rule
//! and tradable tokens.

use alloy::primitives::Address;
use settlement_config::{ChainConfig, Config, TokenConfig};
use settlement_intents::SigningDomain;
use std::collections::HashMap;
use std::time::Duration;

use crate::EngineError;

#[derive(Debug, Clone)]
pub struct ChainContext {
	pub chain_id: u64,
	pub name: String,
	pub escrow: Address,
	pub confirmations: u64,
	pub poll_interval: Duration,
	pub start_block: u64,
	pub domain: SigningDomain,
	tokens: HashMap<Address, TokenConfig>,
}

impl ChainContext {
	pub fn from_config(chain_id: u64, config: &ChainConfig) -> Self {
		Self {
			chain_id,
			name: config.name.clone(),
			escrow: config.escrow_address,
			confirmations: config.confirmations,
			poll_interval: config.poll_interval(),
			start_block: config.start_block,
			domain: SigningDomain {
				name: config.domain_name.clone(),
				version: config.domain_version.clone(),
				chain_id,
				verifying_contract: config.escrow_address,
			},
			tokens: config
				.tokens
				.iter()
				.map(|token| (token.address, token.clone()))
				.collect(),
		}
	}

	pub fn token(&self, address: &Address) -> Result<&TokenConfig, EngineError> {
		self.tokens.get(address).ok_or(EngineError::UnknownToken {
			chain_id: self.chain_id,
			token: *address,
		})
	}
}

#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
	chains: HashMap<u64, ChainContext>,
}

impl ChainRegistry {
	pub fn from_config(config: &Config) -> Self {
		Self {
			chains: config
				.chains
				.iter()
				.map(|(id, chain)| (*id, ChainContext::from_config(*id, chain)))
				.collect(),
		}
	}

	pub fn get(&self, chain_id: u64) -> Result<&ChainContext, EngineError> {
		self.chains
			.get(&chain_id)
			.ok_or(EngineError::UnsupportedChain(chain_id))
	}

	pub fn chain_ids(&self) -> Vec<u64> {
		let mut ids: Vec<u64> = self.chains.keys().copied().collect();
		ids.sort_unstable();
		ids
	}
}
