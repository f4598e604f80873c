//! In-process storage for tests and ephemeral runs.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryStorage {
	entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.entries
			.get(key)
			.map(|value| value.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.entries.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.entries.contains_key(key))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError> {
		// The entry guard holds the shard lock for the whole comparison.
		match (self.entries.entry(key.to_string()), expected) {
			(Entry::Occupied(mut entry), Some(expected)) if entry.get().as_slice() == expected => {
				entry.insert(new);
				Ok(true)
			}
			(Entry::Vacant(entry), None) => {
				entry.insert(new);
				Ok(true)
			}
			_ => Ok(false),
		}
	}
}

/// Creates an empty in-memory backend. The table is accepted for symmetry
/// with the other factories and carries no settings.
pub fn create_storage(_config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	Ok(Box::new(MemoryStorage::new()))
}
