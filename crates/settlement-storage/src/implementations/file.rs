//! File-backed storage.
//!
//! One file per key under a base directory. Writes go to a temp file that is
//! renamed into place, and a process-wide lock serialises every mutation so
//! compare-and-swap is atomic with respect to this process.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use settlement_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

pub struct FileStorage {
	base_path: PathBuf,
	write_lock: Mutex<()>,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self {
			base_path,
			write_lock: Mutex::new(()),
		}
	}

	/// Keys contain `:` and `/`, neither of which is safe in a file name.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	async fn read(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(path).await {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn write(path: &Path, value: Vec<u8>) -> Result<(), StorageError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		Self::read(&self.get_file_path(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		Self::write(&self.get_file_path(key), value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Vec<u8>,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let path = self.get_file_path(key);
		let current = Self::read(&path).await?;
		if current.as_deref() != expected {
			return Ok(false);
		}
		Self::write(&path, new).await?;
		Ok(true)
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(vec![], vec![Field::new("storage_path", FieldType::String)]);
		schema.validate(config)
	}
}

/// Creates a file backend. `storage_path` defaults to `./data/storage`.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Backend(format!("Invalid storage config: {}", e)))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");
	tracing::info!(path = %storage_path, "Using file storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}
