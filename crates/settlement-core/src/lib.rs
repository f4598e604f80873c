//! Bid/Order settlement engine.
//!
//! Wires the codec, chain adapter, signing providers and record store into
//! the workflows a P2P trade goes through: publishing a signed bid, locking
//! the crypto side in escrow while minting an order, walking the order
//! through its lifecycle and reconciling the off-chain records against the
//! escrow's events.

use alloy::primitives::Address;
use settlement_account::{AccountError, AccountInterface, AccountService};
use settlement_config::Config;
use settlement_delivery::{DeliveryError, DeliveryInterface, DeliveryService};
use settlement_storage::{StorageError, StorageInterface, StorageService};
use settlement_types::{EventBus, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;

pub mod engine;
pub mod error;
pub mod escrow;
pub mod funding;
pub mod lifecycle;
pub mod payment_accounts;
pub mod records;
pub mod registry;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::SettlementEngine;
pub use error::{EngineError, ErrorKind, FailureOutcome, Remediation};

/// Source of the current time for deadlines and expiry checks.
pub trait Clock: Send + Sync {
	fn now(&self) -> Timestamp;
}

pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Timestamp {
		chrono::Utc::now().timestamp().max(0) as Timestamp
	}
}

/// The authenticated caller of an engine operation, together with the
/// signing provider that acts for them.
#[derive(Clone)]
pub struct Actor {
	pub address: Address,
	pub account: Arc<AccountService>,
	/// Verified KYC level when the authentication context knows it. `None`
	/// leaves the check to the escrow.
	pub kyc_level: Option<u8>,
}

impl Actor {
	/// Resolves the actor's address from its signing provider.
	pub async fn from_account(account: Arc<AccountService>) -> Result<Self, AccountError> {
		let address = account.get_address().await?;
		Ok(Self {
			address,
			account,
			kyc_level: None,
		})
	}

	pub fn with_kyc_level(mut self, level: u8) -> Self {
		self.kyc_level = Some(level);
		self
	}
}

type StorageFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send>;
type AccountFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send>;
type DeliveryFactory =
	Box<dyn Fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError> + Send>;

/// Builds a [`SettlementEngine`] from configuration and implementation
/// factories.
pub struct SettlementBuilder {
	config: Config,
	storage_factories: HashMap<String, StorageFactory>,
	account_factories: HashMap<String, AccountFactory>,
	delivery_factory: Option<DeliveryFactory>,
	clock: Arc<dyn Clock>,
}

impl SettlementBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			storage_factories: HashMap::new(),
			account_factories: HashMap::new(),
			delivery_factory: None,
			clock: Arc::new(SystemClock),
		}
	}

	pub fn with_storage_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> + Send + 'static,
	{
		self.storage_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	pub fn with_account_factory<F>(mut self, name: &str, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> + Send + 'static,
	{
		self.account_factories
			.insert(name.to_string(), Box::new(factory));
		self
	}

	/// The factory is invoked once per configured chain with a table holding
	/// that chain's `rpc_url` and `chain_id`.
	pub fn with_delivery_factory<F>(mut self, factory: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError> + Send + 'static,
	{
		self.delivery_factory = Some(Box::new(factory));
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn build(self) -> Result<SettlementEngine, EngineError> {
		let storage_name = &self.config.storage.implementation;
		let storage_factory = self.storage_factories.get(storage_name).ok_or_else(|| {
			EngineError::Config(format!("Unknown storage implementation: {}", storage_name))
		})?;
		let storage = Arc::new(StorageService::new(storage_factory(
			&self.config.storage.config,
		)?));

		let account_name = &self.config.account.implementation;
		let account_factory = self.account_factories.get(account_name).ok_or_else(|| {
			EngineError::Config(format!("Unknown account implementation: {}", account_name))
		})?;
		let operator = Arc::new(AccountService::new(account_factory(
			&self.config.account.config,
		)?));

		let delivery_factory = self
			.delivery_factory
			.ok_or_else(|| EngineError::Config("Delivery factory not provided".into()))?;
		let mut providers: HashMap<u64, Arc<dyn DeliveryInterface>> = HashMap::new();
		for (chain_id, chain) in &self.config.chains {
			let mut table = toml::Table::new();
			table.insert("rpc_url".into(), toml::Value::String(chain.rpc_url.clone()));
			table.insert("chain_id".into(), toml::Value::Integer(*chain_id as i64));
			let provider = delivery_factory(&toml::Value::Table(table))?;
			if provider.chain_id() != *chain_id {
				return Err(EngineError::Config(format!(
					"Delivery for chain {} reports chain {}",
					chain_id,
					provider.chain_id()
				)));
			}
			providers.insert(*chain_id, Arc::from(provider));
		}
		let delivery = Arc::new(DeliveryService::new(providers));

		Ok(SettlementEngine::new(
			self.config,
			storage,
			delivery,
			operator,
			self.clock,
			EventBus::new(1000),
		))
	}
}
