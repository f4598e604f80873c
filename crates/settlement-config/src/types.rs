use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::serde_helpers::{deserialize_chain_map, serialize_chain_map};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	#[serde(default)]
	pub engine: EngineConfig,
	pub storage: ImplementationConfig,
	pub account: ImplementationConfig,
	#[serde(default)]
	pub api: ApiConfig,
	#[serde(
		deserialize_with = "deserialize_chain_map",
		serialize_with = "serialize_chain_map"
	)]
	pub chains: HashMap<u64, ChainConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
	#[serde(default = "default_name")]
	pub name: String,
	#[serde(default = "default_log_level")]
	pub log_level: String,
	/// Upper bound on a single wallet signature request.
	#[serde(default = "default_signature_timeout")]
	pub signature_timeout_seconds: u64,
	/// Upper bound on waiting for one transaction's confirmations.
	#[serde(default = "default_confirmation_timeout")]
	pub confirmation_timeout_seconds: u64,
	/// Seller's time to release once the buyer marks the order paid.
	#[serde(default = "default_confirm_window")]
	pub confirm_window_seconds: u64,
	#[serde(default = "default_reconcile_interval")]
	pub reconcile_interval_seconds: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			name: default_name(),
			log_level: default_log_level(),
			signature_timeout_seconds: default_signature_timeout(),
			confirmation_timeout_seconds: default_confirmation_timeout(),
			confirm_window_seconds: default_confirm_window(),
			reconcile_interval_seconds: default_reconcile_interval(),
		}
	}
}

impl EngineConfig {
	pub fn signature_timeout(&self) -> Duration {
		Duration::from_secs(self.signature_timeout_seconds)
	}

	pub fn confirmation_timeout(&self) -> Duration {
		Duration::from_secs(self.confirmation_timeout_seconds)
	}

	pub fn reconcile_interval(&self) -> Duration {
		Duration::from_secs(self.reconcile_interval_seconds)
	}
}

/// Selects an implementation by name and hands it a free-form table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationConfig {
	pub implementation: String,
	#[serde(default = "empty_table")]
	pub config: toml::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_host")]
	pub host: String,
	#[serde(default = "default_port")]
	pub port: u16,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			host: default_host(),
			port: default_port(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
	pub name: String,
	pub rpc_url: String,
	pub escrow_address: Address,
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
	#[serde(default = "default_poll_interval")]
	pub poll_interval_seconds: u64,
	/// First block the event reconciler scans when it has no cursor yet.
	#[serde(default)]
	pub start_block: u64,
	#[serde(default = "default_domain_name")]
	pub domain_name: String,
	#[serde(default = "default_domain_version")]
	pub domain_version: String,
	#[serde(default)]
	pub tokens: Vec<TokenConfig>,
}

impl ChainConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_seconds)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
	pub symbol: String,
	pub address: Address,
	pub decimals: u8,
}

fn default_name() -> String {
	"p2p-settlement".to_string()
}

fn default_log_level() -> String {
	"info".to_string()
}

fn default_signature_timeout() -> u64 {
	300
}

fn default_confirmation_timeout() -> u64 {
	900
}

fn default_confirm_window() -> u64 {
	3600
}

fn default_reconcile_interval() -> u64 {
	30
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

fn default_true() -> bool {
	true
}

fn default_host() -> String {
	"127.0.0.1".to_string()
}

fn default_port() -> u16 {
	3000
}

fn default_confirmations() -> u64 {
	1
}

fn default_poll_interval() -> u64 {
	4
}

fn default_domain_name() -> String {
	"P2PEscrow".to_string()
}

fn default_domain_version() -> String {
	"1".to_string()
}
