//! Order lifecycle state machine.
//!
//! Party actions are decided by [`decide`], a pure function of the stored
//! order, the caller and the action. Chain observations (releases,
//! cancellations and disputes seen in escrow events) go through [`observe`].
//! Both feed [`OrderLifecycleMachine`], which applies them under
//! compare-and-swap so concurrent callers never overwrite each other's
//! timestamps.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use settlement_types::{
	EventBus, Order, OrderEvent, OrderStatus, Role, SettlementEvent, Timestamp,
};
use std::fmt;
use std::sync::Arc;

use crate::records::SettlementRecordStore;
use crate::{Clock, EngineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
	MarkPaid,
	ConfirmRelease,
	RequestCancel,
	OpenDispute,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Action::MarkPaid => "mark_paid",
			Action::ConfirmRelease => "confirm_release",
			Action::RequestCancel => "request_cancel",
			Action::OpenDispute => "open_dispute",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Apply(OrderStatus),
	/// The order is already where the action would take it.
	AlreadyApplied,
}

/// Decides whether `caller` may perform `action` on `order`.
pub fn decide(order: &Order, caller: &Address, action: Action) -> Result<Decision, EngineError> {
	let role = order.roles().role_of(caller).ok_or_else(|| {
		EngineError::Unauthorized(format!(
			"{} is not a party to order {}",
			caller, order.order_id
		))
	})?;

	match (action, role) {
		(Action::MarkPaid, Role::Seller) => {
			return Err(EngineError::Unauthorized(
				"only the buyer can mark an order paid".to_string(),
			))
		}
		(Action::ConfirmRelease, Role::Buyer) => {
			return Err(EngineError::Unauthorized(
				"only the seller can release escrowed funds".to_string(),
			))
		}
		_ => {}
	}

	let invalid = || EngineError::InvalidTransition {
		action,
		status: order.status,
	};

	use OrderStatus::*;
	match action {
		Action::MarkPaid => match order.status {
			Locked | PendingPayment => Ok(Decision::Apply(PaymentSent)),
			PaymentSent => Ok(Decision::AlreadyApplied),
			_ => Err(invalid()),
		},
		Action::ConfirmRelease => match order.status {
			PaymentSent => Ok(Decision::Apply(Completed)),
			// a cancellation request does not void a payment already sent
			CancelRequested if order.payment_sent_at.is_some() => Ok(Decision::Apply(Completed)),
			Completed => Ok(Decision::AlreadyApplied),
			_ => Err(invalid()),
		},
		Action::RequestCancel => match order.status {
			Locked | PendingPayment | PaymentSent => Ok(Decision::Apply(CancelRequested)),
			CancelRequested => Ok(Decision::AlreadyApplied),
			_ => Err(invalid()),
		},
		Action::OpenDispute => match order.status {
			Disputed => Ok(Decision::AlreadyApplied),
			status if status.is_terminal() => Err(invalid()),
			_ => Ok(Decision::Apply(Disputed)),
		},
	}
}

/// Moves `order` to `to`, stamping the matching timestamp once.
pub fn transition(order: &Order, to: OrderStatus, now: Timestamp, confirm_window: u64) -> Order {
	let mut next = order.clone();
	next.status = to;
	next.updated_at = now;
	match to {
		OrderStatus::PaymentSent => {
			let sent_at = *next.payment_sent_at.get_or_insert(now);
			next.confirm_deadline
				.get_or_insert(sent_at.saturating_add(confirm_window));
		}
		OrderStatus::CancelRequested => {
			next.cancel_requested_at.get_or_insert(now);
		}
		OrderStatus::Completed => {
			next.completed_at.get_or_insert(now);
		}
		OrderStatus::Cancelled => {
			next.cancelled_at.get_or_insert(now);
		}
		OrderStatus::Disputed => {
			next.disputed_at.get_or_insert(now);
		}
		OrderStatus::Locked | OrderStatus::PendingPayment => {}
	}
	next
}

/// A confirmed escrow event concerning an existing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainObservation {
	Released { tx_hash: B256, automatic: bool },
	Cancelled { tx_hash: B256 },
	Disputed,
}

impl ChainObservation {
	fn target(self) -> OrderStatus {
		match self {
			ChainObservation::Released { .. } => OrderStatus::Completed,
			ChainObservation::Cancelled { .. } => OrderStatus::Cancelled,
			ChainObservation::Disputed => OrderStatus::Disputed,
		}
	}
}

/// Applies a chain observation. The chain is authoritative, so guards on
/// party actions do not apply; an observation contradicting a terminal
/// status is reported and ignored.
pub fn observe(
	order: &Order,
	observation: ChainObservation,
	now: Timestamp,
	confirm_window: u64,
) -> Option<Order> {
	let target = observation.target();
	if order.status == target {
		return None;
	}
	if order.status.is_terminal() {
		EngineError::alert(format!(
			"Escrow reports order {} as {} but it is recorded as {}",
			order.order_id, target, order.status
		));
		return None;
	}

	let mut next = transition(order, target, now, confirm_window);
	if let ChainObservation::Released { tx_hash, automatic } = observation {
		next.release_tx.get_or_insert(tx_hash);
		if automatic {
			tracing::info!(order_id = %order.order_id, "Escrow auto-released order");
		}
	}
	Some(next)
}

/// Result of a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
	pub order: Order,
	/// `false` when the order already was in the requested state.
	pub changed: bool,
}

pub struct OrderLifecycleMachine {
	records: Arc<SettlementRecordStore>,
	events: EventBus,
	clock: Arc<dyn Clock>,
	confirm_window: u64,
}

impl OrderLifecycleMachine {
	pub fn new(
		records: Arc<SettlementRecordStore>,
		events: EventBus,
		clock: Arc<dyn Clock>,
		confirm_window: u64,
	) -> Self {
		Self {
			records,
			events,
			clock,
			confirm_window,
		}
	}

	/// Applies an off-chain party action. Releases move value and go through
	/// the escrow first; they are recorded with [`Self::observe`].
	pub async fn apply(
		&self,
		order_id: &B256,
		caller: &Address,
		action: Action,
	) -> Result<TransitionOutcome, EngineError> {
		if action == Action::ConfirmRelease {
			return Err(EngineError::Validation(
				"a release is recorded only after the escrow confirms it".to_string(),
			));
		}
		let now = self.clock.now();
		let window = self.confirm_window;
		let mut previous = None;
		let update = self
			.records
			.update_order(order_id, |order| {
				previous = Some(order.status);
				match decide(order, caller, action)? {
					Decision::Apply(to) => Ok(Some(transition(order, to, now, window))),
					Decision::AlreadyApplied => Ok(None),
				}
			})
			.await?;
		Ok(self.finish(previous, update))
	}

	pub async fn observe(
		&self,
		order_id: &B256,
		observation: ChainObservation,
	) -> Result<TransitionOutcome, EngineError> {
		let now = self.clock.now();
		let window = self.confirm_window;
		let mut previous = None;
		let update = self
			.records
			.update_order(order_id, |order| {
				previous = Some(order.status);
				Ok(observe(order, observation, now, window))
			})
			.await?;
		Ok(self.finish(previous, update))
	}

	fn finish(
		&self,
		previous: Option<OrderStatus>,
		update: settlement_storage::Update<Order>,
	) -> TransitionOutcome {
		let changed = update.is_changed();
		let order = update.into_inner();
		if changed {
			if let Some(from) = previous {
				tracing::info!(
					order_id = %order.order_id,
					from = %from,
					to = %order.status,
					"Order status changed"
				);
				self.events
					.publish(SettlementEvent::Order(OrderEvent::StatusChanged {
						order_id: order.order_id,
						from,
						to: order.status,
					}))
					.ok();
			}
		}
		TransitionOutcome { order, changed }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{sample_order, ManualClock};
	use settlement_storage::implementations::memory::MemoryStorage;
	use settlement_storage::StorageService;
	use settlement_types::BidType;

	const ALL: [OrderStatus; 7] = [
		OrderStatus::Locked,
		OrderStatus::PendingPayment,
		OrderStatus::PaymentSent,
		OrderStatus::Completed,
		OrderStatus::CancelRequested,
		OrderStatus::Cancelled,
		OrderStatus::Disputed,
	];

	fn order_in(status: OrderStatus) -> Order {
		let mut order = sample_order();
		order.status = status;
		order
	}

	/// Expected outcome of every allowed (state, role, action) triple;
	/// everything else must be rejected.
	fn expected(status: OrderStatus, role: Role, action: Action) -> Option<Decision> {
		use OrderStatus::*;
		match (action, role, status) {
			(Action::MarkPaid, Role::Buyer, Locked | PendingPayment) => {
				Some(Decision::Apply(PaymentSent))
			}
			(Action::MarkPaid, Role::Buyer, PaymentSent) => Some(Decision::AlreadyApplied),
			(Action::ConfirmRelease, Role::Seller, PaymentSent) => Some(Decision::Apply(Completed)),
			(Action::ConfirmRelease, Role::Seller, Completed) => Some(Decision::AlreadyApplied),
			(Action::RequestCancel, _, Locked | PendingPayment | PaymentSent) => {
				Some(Decision::Apply(CancelRequested))
			}
			(Action::RequestCancel, _, CancelRequested) => Some(Decision::AlreadyApplied),
			(Action::OpenDispute, _, Locked | PendingPayment | PaymentSent | CancelRequested) => {
				Some(Decision::Apply(Disputed))
			}
			(Action::OpenDispute, _, Disputed) => Some(Decision::AlreadyApplied),
			_ => None,
		}
	}

	#[test]
	fn test_legality_table() {
		let actions = [
			Action::MarkPaid,
			Action::ConfirmRelease,
			Action::RequestCancel,
			Action::OpenDispute,
		];
		for status in ALL {
			let order = order_in(status);
			let roles = order.roles();
			for (caller, role) in [(roles.buyer, Role::Buyer), (roles.seller, Role::Seller)] {
				for action in actions {
					let result = decide(&order, &caller, action).ok();
					assert_eq!(
						result,
						expected(status, role, action),
						"{:?} by {:?} in {:?}",
						action,
						role,
						status
					);
				}
			}
			for action in actions {
				assert!(matches!(
					decide(&order, &Address::repeat_byte(0x99), action),
					Err(EngineError::Unauthorized(_))
				));
			}
		}
	}

	#[test]
	fn test_release_after_cancel_request_needs_prior_payment() {
		let mut order = order_in(OrderStatus::CancelRequested);
		let seller = order.roles().seller;
		assert!(decide(&order, &seller, Action::ConfirmRelease).is_err());

		order.payment_sent_at = Some(10);
		assert_eq!(
			decide(&order, &seller, Action::ConfirmRelease).unwrap(),
			Decision::Apply(OrderStatus::Completed)
		);
	}

	#[test]
	fn test_roles_follow_buy_side() {
		let mut order = order_in(OrderStatus::Locked);
		order.bid_type = BidType::Buy;
		// on a buy bid the maker pays fiat
		assert!(decide(&order, &order.maker, Action::MarkPaid).is_ok());
		assert!(matches!(
			decide(&order, &order.taker, Action::MarkPaid),
			Err(EngineError::Unauthorized(_))
		));
	}

	#[test]
	fn test_transition_timestamps_are_set_once() {
		let order = order_in(OrderStatus::Locked);
		let paid = transition(&order, OrderStatus::PaymentSent, 100, 3600);
		assert_eq!(paid.payment_sent_at, Some(100));
		assert_eq!(paid.confirm_deadline, Some(3700));

		let again = transition(&paid, OrderStatus::PaymentSent, 500, 3600);
		assert_eq!(again.payment_sent_at, Some(100));
		assert_eq!(again.confirm_deadline, Some(3700));
	}

	#[test]
	fn test_observations() {
		let order = order_in(OrderStatus::Locked);
		let released = observe(
			&order,
			ChainObservation::Released {
				tx_hash: B256::repeat_byte(9),
				automatic: true,
			},
			100,
			3600,
		)
		.unwrap();
		assert_eq!(released.status, OrderStatus::Completed);
		assert_eq!(released.release_tx, Some(B256::repeat_byte(9)));
		assert_eq!(released.completed_at, Some(100));

		// repeated and contradicting observations leave the record alone
		assert!(observe(
			&released,
			ChainObservation::Released {
				tx_hash: B256::repeat_byte(9),
				automatic: false,
			},
			200,
			3600
		)
		.is_none());
		assert!(observe(
			&released,
			ChainObservation::Cancelled {
				tx_hash: B256::repeat_byte(8)
			},
			200,
			3600
		)
		.is_none());

		let disputed = observe(&order, ChainObservation::Disputed, 50, 3600).unwrap();
		assert_eq!(disputed.disputed_at, Some(50));
	}

	fn machine() -> (OrderLifecycleMachine, Arc<SettlementRecordStore>, EventBus) {
		let records = Arc::new(SettlementRecordStore::new(Arc::new(StorageService::new(
			Box::new(MemoryStorage::new()),
		))));
		let events = EventBus::new(16);
		let machine = OrderLifecycleMachine::new(
			records.clone(),
			events.clone(),
			Arc::new(ManualClock::new(1_000)),
			3600,
		);
		(machine, records, events)
	}

	#[tokio::test]
	async fn test_mark_paid_is_idempotent() {
		let (machine, records, events) = machine();
		let mut receiver = events.subscribe();
		let order = order_in(OrderStatus::Locked);
		records.insert_order(&order).await.unwrap();
		let buyer = order.roles().buyer;

		let first = machine
			.apply(&order.order_id, &buyer, Action::MarkPaid)
			.await
			.unwrap();
		let second = machine
			.apply(&order.order_id, &buyer, Action::MarkPaid)
			.await
			.unwrap();

		assert!(first.changed);
		assert!(!second.changed);
		assert_eq!(first.order, second.order);
		assert_eq!(second.order.status, OrderStatus::PaymentSent);
		assert!(matches!(
			receiver.try_recv(),
			Ok(SettlementEvent::Order(OrderEvent::StatusChanged {
				from: OrderStatus::Locked,
				to: OrderStatus::PaymentSent,
				..
			}))
		));
		assert!(receiver.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_release_cannot_be_applied_off_chain() {
		let (machine, records, _) = machine();
		let order = order_in(OrderStatus::PaymentSent);
		records.insert_order(&order).await.unwrap();
		let result = machine
			.apply(&order.order_id, &order.roles().seller, Action::ConfirmRelease)
			.await;
		assert!(matches!(result, Err(EngineError::Validation(_))));
	}

	#[tokio::test]
	async fn test_concurrent_cancel_requests() {
		let (machine, records, _) = machine();
		let machine = Arc::new(machine);
		let order = order_in(OrderStatus::Locked);
		records.insert_order(&order).await.unwrap();
		let buyer = order.roles().buyer;

		let (a, b) = tokio::join!(
			machine.apply(&order.order_id, &buyer, Action::RequestCancel),
			machine.apply(&order.order_id, &buyer, Action::RequestCancel)
		);
		let (a, b) = (a.unwrap(), b.unwrap());
		assert_eq!(u8::from(a.changed) + u8::from(b.changed), 1);

		let stored = records.get_order(&order.order_id).await.unwrap().unwrap();
		assert_eq!(stored.status, OrderStatus::CancelRequested);
		assert_eq!(stored.cancel_requested_at, Some(1_000));
	}
}
