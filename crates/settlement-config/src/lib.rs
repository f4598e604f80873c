//! Configuration for the settlement service.
//!
//! A single TOML file describes the engine timeouts, the storage and
//! signing implementations, the HTTP listener and every chain the engine
//! settles on. `${VAR}` references are resolved from the environment
//! before parsing.

use thiserror::Error;

mod loader;
mod serde_helpers;
mod types;

pub use loader::ConfigLoader;
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}
