//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "p2p-settlement")]
#[command(about = "P2P fiat/crypto settlement engine", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
	#[command(subcommand)]
	pub command: Option<Command>,

	/// Path to configuration file
	#[arg(
		short,
		long,
		value_name = "FILE",
		env = "SETTLEMENT_CONFIG",
		default_value = "config/settlement.toml"
	)]
	pub config: PathBuf,

	/// Log filter used when `RUST_LOG` is not set
	#[arg(long, env = "SETTLEMENT_LOG_LEVEL")]
	pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Start the HTTP API and the reconciliation watcher
	Start,
	/// Validate the configuration file
	Validate,
	/// Run a single reconciliation round and exit
	Reconcile,
}
