//! The settlement engine and its workflows.

use alloy::primitives::B256;
use dashmap::DashMap;
use settlement_account::AccountService;
use settlement_config::Config;
use settlement_delivery::DeliveryService;
use settlement_storage::StorageService;
use settlement_types::EventBus;
use std::future::Future;
use std::sync::Arc;

use crate::escrow::EscrowTransactor;
use crate::funding::BalanceGuard;
use crate::lifecycle::OrderLifecycleMachine;
use crate::payment_accounts::PaymentAccountStore;
use crate::records::SettlementRecordStore;
use crate::registry::ChainRegistry;
use crate::snapshot::PaymentSnapshotter;
use crate::{Actor, Clock, EngineError};

pub mod bids;
pub mod orders;
pub mod reconcile;

pub use bids::PublishBidRequest;
pub use orders::CreateOrderRequest;
pub use reconcile::{ChainScan, ReconcileReport, SyncReport};

pub struct SettlementEngine {
	config: Config,
	registry: ChainRegistry,
	delivery: Arc<DeliveryService>,
	records: Arc<SettlementRecordStore>,
	payment_accounts: Arc<PaymentAccountStore>,
	funding: BalanceGuard,
	escrow: Arc<EscrowTransactor>,
	lifecycle: OrderLifecycleMachine,
	snapshotter: PaymentSnapshotter,
	operator: Arc<AccountService>,
	clock: Arc<dyn Clock>,
	events: EventBus,
	/// Orders with a release transaction in flight from this process.
	releases_in_flight: DashMap<B256, ()>,
}

impl SettlementEngine {
	pub(crate) fn new(
		config: Config,
		storage: Arc<StorageService>,
		delivery: Arc<DeliveryService>,
		operator: Arc<AccountService>,
		clock: Arc<dyn Clock>,
		events: EventBus,
	) -> Self {
		let registry = ChainRegistry::from_config(&config);
		let records = Arc::new(SettlementRecordStore::new(storage.clone()));
		let payment_accounts = Arc::new(PaymentAccountStore::new(storage, clock.clone()));
		let escrow = Arc::new(EscrowTransactor::new(
			delivery.clone(),
			config.engine.confirmation_timeout(),
		));
		let funding = BalanceGuard::new(escrow.clone(), events.clone());
		let lifecycle = OrderLifecycleMachine::new(
			records.clone(),
			events.clone(),
			clock.clone(),
			config.engine.confirm_window_seconds,
		);
		let snapshotter = PaymentSnapshotter::new(payment_accounts.clone());

		Self {
			config,
			registry,
			delivery,
			records,
			payment_accounts,
			funding,
			escrow,
			lifecycle,
			snapshotter,
			operator,
			clock,
			events,
			releases_in_flight: DashMap::new(),
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.events
	}

	pub fn registry(&self) -> &ChainRegistry {
		&self.registry
	}

	pub fn payment_accounts(&self) -> &PaymentAccountStore {
		&self.payment_accounts
	}

	pub fn balance_guard(&self) -> &BalanceGuard {
		&self.funding
	}

	/// The configured signing account acting as a caller.
	pub async fn operator_actor(&self) -> Result<Actor, EngineError> {
		Ok(Actor::from_account(self.operator.clone()).await?)
	}

	/// Bounds a wallet signature request by the configured timeout.
	async fn signature<T, E, F>(&self, step: &'static str, request: F) -> Result<T, EngineError>
	where
		F: Future<Output = Result<T, E>>,
		EngineError: From<E>,
	{
		let timeout = self.config.engine.signature_timeout();
		match tokio::time::timeout(timeout, request).await {
			Ok(result) => Ok(result?),
			Err(_) => Err(EngineError::Timeout {
				step,
				seconds: timeout.as_secs(),
			}),
		}
	}
}

/// Removes the in-flight marker when the release workflow ends, including
/// when its future is dropped.
struct InFlight<'a> {
	map: &'a DashMap<B256, ()>,
	order_id: B256,
}

impl<'a> InFlight<'a> {
	fn acquire(map: &'a DashMap<B256, ()>, order_id: B256) -> Option<Self> {
		match map.entry(order_id) {
			dashmap::mapref::entry::Entry::Occupied(_) => None,
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				slot.insert(());
				Some(Self { map, order_id })
			}
		}
	}
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		self.map.remove(&self.order_id);
	}
}
