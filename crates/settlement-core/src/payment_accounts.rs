//! Saved payment accounts.
//!
//! Details are stored as the opaque strings the owner supplied. Orders never
//! hold a reference into this store; they copy what they need at creation.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use settlement_storage::StorageService;
use settlement_types::{address_key, UserPaymentAccount};
use std::sync::Arc;

use crate::{Clock, EngineError};

const ACCOUNTS: &str = "payment_accounts";

fn by_owner(owner: &Address) -> String {
	format!("payment_accounts_by_owner:{}", address_key(owner))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPaymentAccount {
	pub method_type: String,
	pub details: String,
	#[serde(default)]
	pub label: String,
	#[serde(default)]
	pub is_default: bool,
	#[serde(default)]
	pub is_verified: bool,
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentAccountChanges {
	pub method_type: Option<String>,
	pub details: Option<String>,
	pub label: Option<String>,
	pub is_default: Option<bool>,
}

pub struct PaymentAccountStore {
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
}

impl PaymentAccountStore {
	pub fn new(storage: Arc<StorageService>, clock: Arc<dyn Clock>) -> Self {
		Self { storage, clock }
	}

	pub async fn save(
		&self,
		owner: Address,
		account: NewPaymentAccount,
	) -> Result<UserPaymentAccount, EngineError> {
		if account.method_type.trim().is_empty() {
			return Err(EngineError::Validation(
				"payment method type is required".to_string(),
			));
		}
		if account.details.trim().is_empty() {
			return Err(EngineError::Validation(
				"payment details are required".to_string(),
			));
		}

		let now = self.clock.now();
		let record = UserPaymentAccount {
			id: uuid::Uuid::new_v4().to_string(),
			owner,
			method_type: account.method_type,
			details: account.details,
			label: account.label,
			is_default: account.is_default,
			is_verified: account.is_verified,
			is_active: true,
			created_at: now,
			updated_at: now,
		};
		if record.is_default {
			self.clear_default(&owner, &record.id).await?;
		}

		self.storage
			.add_to_index(&by_owner(&owner), &record.id)
			.await?;
		self.storage.store(ACCOUNTS, &record.id, &record).await?;
		tracing::debug!(owner = %owner, account_id = %record.id, "Saved payment account");
		Ok(record)
	}

	/// Resolves an active account belonging to `owner`. Foreign, inactive
	/// and missing accounts all resolve to `None`.
	pub async fn get(
		&self,
		account_id: &str,
		owner: &Address,
	) -> Result<Option<UserPaymentAccount>, EngineError> {
		let account: Option<UserPaymentAccount> = self.storage.find(ACCOUNTS, account_id).await?;
		Ok(account.filter(|a| a.owner == *owner && a.is_active))
	}

	pub async fn update(
		&self,
		account_id: &str,
		owner: &Address,
		changes: PaymentAccountChanges,
	) -> Result<UserPaymentAccount, EngineError> {
		let now = self.clock.now();
		let updated = self
			.modify(account_id, owner, |account| {
				let mut next = account.clone();
				if let Some(method_type) = &changes.method_type {
					next.method_type = method_type.clone();
				}
				if let Some(details) = &changes.details {
					next.details = details.clone();
				}
				if let Some(label) = &changes.label {
					next.label = label.clone();
				}
				if let Some(is_default) = changes.is_default {
					next.is_default = is_default;
				}
				next.updated_at = now;
				next
			})
			.await?;

		if changes.is_default == Some(true) {
			self.clear_default(owner, account_id).await?;
		}
		Ok(updated)
	}

	/// Soft delete. Snapshots taken from the account are unaffected.
	pub async fn deactivate(&self, account_id: &str, owner: &Address) -> Result<(), EngineError> {
		let now = self.clock.now();
		self.modify(account_id, owner, |account| {
			let mut next = account.clone();
			next.is_active = false;
			next.is_default = false;
			next.updated_at = now;
			next
		})
		.await?;
		Ok(())
	}

	/// Active accounts of `owner`.
	pub async fn list_for_owner(
		&self,
		owner: &Address,
	) -> Result<Vec<UserPaymentAccount>, EngineError> {
		let mut accounts = Vec::new();
		for id in self.storage.list_index(&by_owner(owner)).await? {
			if let Some(account) = self.get(&id, owner).await? {
				accounts.push(account);
			}
		}
		Ok(accounts)
	}

	async fn modify<F>(
		&self,
		account_id: &str,
		owner: &Address,
		f: F,
	) -> Result<UserPaymentAccount, EngineError>
	where
		F: Fn(&UserPaymentAccount) -> UserPaymentAccount,
	{
		let not_found = || EngineError::PaymentAccountNotFound(account_id.to_string());
		let result = self
			.storage
			.update_with(ACCOUNTS, account_id, |account: &UserPaymentAccount| {
				if account.owner != *owner || !account.is_active {
					return Err(not_found());
				}
				Ok(Some(f(account)))
			})
			.await;
		match result {
			Ok(update) => Ok(update.into_inner()),
			Err(EngineError::Storage(settlement_storage::StorageError::NotFound)) => Err(not_found()),
			Err(e) => Err(e),
		}
	}

	async fn clear_default(&self, owner: &Address, keep: &str) -> Result<(), EngineError> {
		for account in self.list_for_owner(owner).await? {
			if account.id == keep || !account.is_default {
				continue;
			}
			self.storage
				.update_with(ACCOUNTS, &account.id, |current: &UserPaymentAccount| {
					let mut next = current.clone();
					next.is_default = false;
					Ok::<_, EngineError>(Some(next))
				})
				.await?;
		}
		Ok(())
	}
}
