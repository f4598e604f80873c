//! Engine construction and the background reconciliation watcher.

use settlement_account::implementations::local;
use settlement_config::Config;
use settlement_core::{EngineError, SettlementBuilder, SettlementEngine};
use settlement_delivery::implementations::evm::alloy::create_http_delivery;
use settlement_storage::implementations::{file, memory};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Builds the engine with every implementation this binary ships.
pub fn build_engine(config: Config) -> Result<SettlementEngine, EngineError> {
	SettlementBuilder::new(config)
		.with_storage_factory("memory", memory::create_storage)
		.with_storage_factory("file", file::create_storage)
		.with_account_factory("local", local::create_account)
		.with_delivery_factory(create_http_delivery)
		.build()
}

/// Runs reconciliation rounds until the task is aborted.
pub async fn run_watcher(engine: Arc<SettlementEngine>) {
	let period = engine.config().engine.reconcile_interval();
	let mut interval = tokio::time::interval(period);
	interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
	info!(interval_seconds = period.as_secs(), "Reconciliation watcher started");

	loop {
		interval.tick().await;
		let report = engine.sync_all().await;
		let pending = &report.pending;
		let moved: usize = report.chains.iter().map(|scan| scan.created + scan.updated).sum();
		if pending.recorded.is_empty() && pending.dropped.is_empty() && moved == 0 {
			debug!(
				still_pending = pending.still_pending.len(),
				"Reconciliation round found nothing new"
			);
			continue;
		}
		info!(
			recorded = pending.recorded.len(),
			dropped = pending.dropped.len(),
			still_pending = pending.still_pending.len(),
			orders_moved = moved,
			"Reconciliation round applied changes"
		);
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use settlement_config::ConfigLoader;

	pub(crate) const OPERATOR_KEY: &str =
		"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	pub(crate) fn config(storage: &str) -> Config {
		let content = format!(
			r#"
[storage]
implementation = "{storage}"

[account]
implementation = "local"
[account.config]
private_key = "${{OPERATOR_KEY}}"

[chains.137]
name = "polygon"
rpc_url = "http://localhost:8545"
escrow_address = "0x3333333333333333333333333333333333333333"

[[chains.137.tokens]]
symbol = "USDT"
address = "0x2222222222222222222222222222222222222222"
decimals = 6
"#
		);
		ConfigLoader::new()
			.parse(
				&content,
				[("OPERATOR_KEY".to_string(), OPERATOR_KEY.to_string())],
			)
			.unwrap()
	}

	#[tokio::test]
	async fn test_builds_engine_without_connecting() {
		let engine = build_engine(config("memory")).unwrap();
		assert_eq!(engine.registry().chain_ids(), vec![137]);
		let operator = engine.operator_actor().await.unwrap();
		assert_eq!(
			operator.address.to_string(),
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
		);
	}

	#[test]
	fn test_unknown_storage_is_a_config_error() {
		assert!(matches!(
			build_engine(config("postgres")),
			Err(EngineError::Config(_))
		));
	}
}
