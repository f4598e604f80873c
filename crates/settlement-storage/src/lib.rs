//! Storage module for the settlement engine.
//!
//! Records are JSON documents under `namespace:id` keys. Backends only need
//! to offer per-key compare-and-swap; everything the engine does
//! concurrently (status transitions, index maintenance, set-once fields) is
//! built on top of it as optimistic retry loops.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Attempts made by an optimistic update before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 16;

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	/// Concurrent writers kept winning the compare-and-swap.
	#[error("Write conflict on {0}")]
	Conflict(String),
}

/// Low-level key-value backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deleting a missing key succeeds.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Writes `new` only if the stored value equals `expected`, where `None`
	/// means the key must be absent. Returns whether the write happened.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError>;
}

/// Result of [`StorageService::update_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<T> {
	Changed(T),
	/// The closure declined to change the record; holds the current value.
	Unchanged(T),
}

impl<T> Update<T> {
	pub fn into_inner(self) -> T {
		match self {
			Update::Changed(value) | Update::Unchanged(value) => value,
		}
	}

	pub fn is_changed(&self) -> bool {
		matches!(self, Update::Changed(_))
	}
}

fn key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn index_key(name: &str) -> String {
	format!("index:{}", name)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Typed operations over a [`StorageInterface`].
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&key(namespace, id), encode(data)?)
			.await
	}

	/// Stores `data` only if nothing exists under the key yet.
	pub async fn insert_new<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<bool, StorageError> {
		self.backend
			.compare_and_swap(&key(namespace, id), None, encode(data)?)
			.await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key(namespace, id)).await?;
		decode(&bytes)
	}

	/// Like [`retrieve`](Self::retrieve), mapping a missing key to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key(namespace, id)).await
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key(namespace, id)).await
	}

	/// Read-modify-write of one record under compare-and-swap.
	///
	/// `f` sees the current value and returns the replacement, `None` to
	/// leave the record as it is, or an error to abort. It runs again
	/// whenever another writer got in between the read and the swap, so it
	/// must be free of side effects.
	pub async fn update_with<T, E, F>(
		&self,
		namespace: &str,
		id: &str,
		mut f: F,
	) -> Result<Update<T>, E>
	where
		T: Serialize + DeserializeOwned,
		E: From<StorageError>,
		F: FnMut(&T) -> Result<Option<T>, E>,
	{
		let key = key(namespace, id);
		for _ in 0..MAX_UPDATE_ATTEMPTS {
			let current_bytes = self.backend.get_bytes(&key).await?;
			let current: T = decode(&current_bytes)?;
			let next = match f(&current)? {
				Some(next) => next,
				None => return Ok(Update::Unchanged(current)),
			};
			if self
				.backend
				.compare_and_swap(&key, Some(&current_bytes), encode(&next)?)
				.await?
			{
				return Ok(Update::Changed(next));
			}
			tracing::debug!(key = %key, "Compare-and-swap lost, retrying");
		}
		Err(StorageError::Conflict(key).into())
	}

	async fn modify_index<F>(&self, name: &str, mut f: F) -> Result<(), StorageError>
	where
		F: FnMut(&mut BTreeSet<String>) -> bool,
	{
		let key = index_key(name);
		for _ in 0..MAX_UPDATE_ATTEMPTS {
			let current = match self.backend.get_bytes(&key).await {
				Ok(bytes) => Some(bytes),
				Err(StorageError::NotFound) => None,
				Err(e) => return Err(e),
			};
			let mut members: BTreeSet<String> = match &current {
				Some(bytes) => decode(bytes)?,
				None => BTreeSet::new(),
			};
			if !f(&mut members) {
				return Ok(());
			}
			if self
				.backend
				.compare_and_swap(&key, current.as_deref(), encode(&members)?)
				.await?
			{
				return Ok(());
			}
		}
		Err(StorageError::Conflict(key))
	}

	pub async fn add_to_index(&self, name: &str, member: &str) -> Result<(), StorageError> {
		self.modify_index(name, |members| members.insert(member.to_string()))
			.await
	}

	pub async fn remove_from_index(&self, name: &str, member: &str) -> Result<(), StorageError> {
		self.modify_index(name, |members| members.remove(member))
			.await
	}

	/// Members of an index in sorted order; an unknown index is empty.
	pub async fn list_index(&self, name: &str) -> Result<Vec<String>, StorageError> {
		match self.backend.get_bytes(&index_key(name)).await {
			Ok(bytes) => Ok(decode::<BTreeSet<String>>(&bytes)?.into_iter().collect()),
			Err(StorageError::NotFound) => Ok(Vec::new()),
			Err(e) => Err(e),
		}
	}
}
