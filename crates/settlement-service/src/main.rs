use anyhow::{Context, Result};
use clap::Parser;
use settlement_config::{Config, ConfigLoader};
use settlement_service::cli::{Cli, Command};
use settlement_service::{server, service};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	let config = load_config(&cli).await;

	// Fall back to the configured level when neither RUST_LOG nor the flag is set.
	let log_level = cli.log_level.clone().unwrap_or_else(|| {
		config
			.as_ref()
			.map(|c| c.engine.log_level.clone())
			.unwrap_or_else(|_| "info".to_string())
	});
	setup_tracing(&log_level)?;
	let config = config?;

	match cli.command {
		Some(Command::Start) | None => start_service(config).await,
		Some(Command::Validate) => validate_config(config),
		Some(Command::Reconcile) => reconcile_once(config).await,
	}
}

async fn load_config(cli: &Cli) -> Result<Config> {
	ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {}", cli.config.display()))
}

async fn start_service(config: Config) -> Result<()> {
	info!(name = %config.engine.name, chains = config.chains.len(), "Starting settlement service");

	let api = config.api.clone();
	let engine = Arc::new(service::build_engine(config).context("Failed to build engine")?);

	let watcher_handle = tokio::spawn(service::run_watcher(engine.clone()));
	let http_handle = if api.enabled {
		let engine = engine.clone();
		Some(tokio::spawn(async move {
			if let Err(e) = server::serve(engine, &api).await {
				warn!(error = %e, "API server stopped");
			}
		}))
	} else {
		info!("HTTP API disabled");
		None
	};

	setup_shutdown_signal().await;
	info!("Shutdown signal received, stopping services...");

	// In-flight workflows are abandoned here; their pending records are
	// picked up by the next start's reconciliation.
	watcher_handle.abort();
	if let Some(handle) = http_handle {
		handle.abort();
	}

	info!("Settlement service stopped");
	Ok(())
}

fn validate_config(config: Config) -> Result<()> {
	info!("Configuration is valid");
	info!("Engine: {}", config.engine.name);
	info!("Storage: {}", config.storage.implementation);
	info!("Account: {}", config.account.implementation);
	for (chain_id, chain) in &config.chains {
		let tokens: Vec<&str> = chain.tokens.iter().map(|t| t.symbol.as_str()).collect();
		info!(
			"  Chain {} ({}): escrow {}, {} confirmations, tokens [{}]",
			chain_id,
			chain.name,
			chain.escrow_address,
			chain.confirmations,
			tokens.join(", ")
		);
	}
	Ok(())
}

async fn reconcile_once(config: Config) -> Result<()> {
	let engine = service::build_engine(config).context("Failed to build engine")?;
	let report = engine.sync_all().await;
	println!("{}", serde_json::to_string_pretty(&report)?);
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.try_init()
		.context("Failed to install tracing subscriber")?;

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
