use regex::Regex;
use settlement_types::MAX_DECIMALS;
use std::env;
use std::path::Path;

use crate::{Config, ConfigError};

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "SETTLEMENT_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	/// Reads the file, substitutes `${VAR}` references, applies
	/// `<prefix>*` overrides from the process environment and validates.
	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.clone()))
			}
			Err(e) => return Err(e.into()),
		};

		self.parse(&content, env::vars())
	}

	/// Parses `content` against an explicit set of environment variables.
	pub fn parse<I>(&self, content: &str, vars: I) -> Result<Config, ConfigError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		let vars: Vec<(String, String)> = vars.into_iter().collect();
		let lookup = |name: &str| {
			vars.iter()
				.find(|(k, _)| k == name)
				.map(|(_, v)| v.clone())
		};

		let substituted = substitute_env_vars(content, lookup)?;
		let mut config: Config =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;

		self.apply_env_overrides(&mut config, &vars)?;
		validate_config(&config)?;
		Ok(config)
	}

	fn apply_env_overrides(
		&self,
		config: &mut Config,
		vars: &[(String, String)],
	) -> Result<(), ConfigError> {
		let rpc_prefix = format!("{}RPC_URL_", self.env_prefix);

		for (name, value) in vars {
			let Some(setting) = name.strip_prefix(&self.env_prefix) else {
				continue;
			};
			match setting {
				"LOG_LEVEL" => config.engine.log_level = value.clone(),
				"API_PORT" => {
					config.api.port = value.parse().map_err(|e| {
						ConfigError::ValidationError(format!("Invalid API port: {}", e))
					})?;
				}
				_ => {
					if let Some(chain_id) = name
						.strip_prefix(&rpc_prefix)
						.and_then(|id| id.parse::<u64>().ok())
					{
						if let Some(chain) = config.chains.get_mut(&chain_id) {
							tracing::debug!(chain_id, "Overriding RPC URL from environment");
							chain.rpc_url = value.clone();
						}
					}
				}
			}
		}
		Ok(())
	}
}

fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let re = Regex::new(r"\$\{([^}]+)\}")
		.map_err(|e| ConfigError::ParseError(format!("Invalid substitution pattern: {}", e)))?;

	let mut result = content.to_string();
	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];
		let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVarNotFound(var_name.to_string()))?;
		result = result.replace(full_match, &value);
	}
	Ok(result)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let invalid = |message: String| Err(ConfigError::ValidationError(message));

	if config.chains.is_empty() {
		return invalid("At least one chain must be configured".to_string());
	}

	let engine = &config.engine;
	for (name, value) in [
		("signature_timeout_seconds", engine.signature_timeout_seconds),
		("confirmation_timeout_seconds", engine.confirmation_timeout_seconds),
		("confirm_window_seconds", engine.confirm_window_seconds),
		("reconcile_interval_seconds", engine.reconcile_interval_seconds),
	] {
		if value == 0 {
			return invalid(format!("engine.{} must be greater than zero", name));
		}
	}

	for (chain_id, chain) in &config.chains {
		if *chain_id == 0 {
			return invalid("Chain ID 0 is not valid".to_string());
		}
		if !(chain.rpc_url.starts_with("http://") || chain.rpc_url.starts_with("https://")) {
			return invalid(format!(
				"chains.{}.rpc_url must start with http:// or https://",
				chain_id
			));
		}
		if chain.escrow_address.is_zero() {
			return invalid(format!("chains.{}.escrow_address must be set", chain_id));
		}
		if chain.confirmations == 0 {
			return invalid(format!("chains.{}.confirmations must be at least 1", chain_id));
		}
		if chain.poll_interval_seconds == 0 {
			return invalid(format!(
				"chains.{}.poll_interval_seconds must be greater than zero",
				chain_id
			));
		}
		for token in &chain.tokens {
			if token.address.is_zero() {
				return invalid(format!(
					"chains.{}: token {} has a zero address",
					chain_id, token.symbol
				));
			}
			if u32::from(token.decimals) > MAX_DECIMALS {
				return invalid(format!(
					"chains.{}: token {} has {} decimals, at most {} are supported",
					chain_id, token.symbol, token.decimals, MAX_DECIMALS
				));
			}
		}
	}

	Ok(())
}
