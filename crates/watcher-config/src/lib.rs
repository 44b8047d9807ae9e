// watcher-config/src/lib.rs

use regex::Regex;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

mod types;

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

/// Configuration loader with environment variable substitution
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "WATCHER_".to_string(),
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

	pub async fn load(&self) -> Result<Config, ConfigError> {
		// Load base configuration from file
		let mut config = if let Some(file_path) = &self.file_path {
			self.load_from_file(file_path).await?
		} else {
			return Err(ConfigError::FileNotFound(
				"No configuration file specified".to_string(),
			));
		};

		// Apply environment variable overrides
		self.apply_env_overrides(&mut config)?;

		// Validate configuration
		validate_config(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		let content = match tokio::fs::read_to_string(file_path).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(ConfigError::FileNotFound(file_path.to_string()))
			}
			Err(e) => return Err(e.into()),
		};

		// Substitute environment variables
		let substituted_content = substitute_env_vars(&content)?;

		match Path::new(file_path).extension().and_then(|s| s.to_str()) {
			Some("json") => serde_json::from_str(&substituted_content)
				.map_err(|e| ConfigError::ParseError(e.to_string())),
			Some("yaml") | Some("yml") => serde_yaml::from_str(&substituted_content)
				.map_err(|e| ConfigError::ParseError(e.to_string())),
			_ => from_toml(&substituted_content),
		}
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
			debug!("Overriding log level from environment");
			config.watcher.log_level = log_level;
		}

		if let Ok(rpc_url) = env::var(format!("{}RPC_URL", self.env_prefix)) {
			debug!("Overriding RPC URL from environment");
			config.network.rpc_url = rpc_url;
		}

		if let Ok(api_port) = env::var(format!("{}API_PORT", self.env_prefix)) {
			config.api.port = api_port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid API port: {}", e)))?;
		}

		Ok(())
	}
}

/// Parses a TOML document into a configuration without validating it.
pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
	toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Replaces every `${VAR_NAME}` with the value of the environment variable.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
	let mut result = content.to_string();

	let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;

	for cap in re.captures_iter(content) {
		let full_match = &cap[0];
		let var_name = &cap[1];

		let env_value =
			env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

		result = result.replace(full_match, &env_value);
	}

	Ok(result)
}

/// Checks the invariants the watcher relies on.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
	let rpc_url = &config.network.rpc_url;
	if !(rpc_url.starts_with("http://") || rpc_url.starts_with("https://")) {
		return Err(ConfigError::ValidationError(
			"RPC URL must start with http:// or https://".to_string(),
		));
	}

	if config.network.chain_id == 0 {
		return Err(ConfigError::ValidationError(
			"chain_id must be greater than zero".to_string(),
		));
	}

	let intervals = &config.intervals;
	if intervals.order_expiration_checking_interval_ms == 0
		|| intervals.event_polling_interval_ms == 0
		|| intervals.cleanup_job_interval_ms == 0
	{
		return Err(ConfigError::ValidationError(
			"Polling intervals must be greater than zero".to_string(),
		));
	}

	if intervals.block_retention_limit == 0 {
		return Err(ConfigError::ValidationError(
			"block_retention_limit must be greater than zero".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const SAMPLE: &str = r#"
[watcher]
name = "test-watcher"

[network]
rpc_url = "http://localhost:8545"
chain_id = 1337
exchange = "0x48bacb9266a570d521063ef5dd96e61686dbe788"
erc20_proxy = "0x1dc4c1cefef38a777b15aa20260a54e584b16c48"
erc721_proxy = "0x1d7022f5b17d2f8b695918fb48fa1089c9f85401"
fee_token = "0x871dd7c2b4b25e1aa18728e9d5f2af4c4e431f5c"

[intervals]
event_polling_interval_ms = 500
"#;

	#[test]
	fn test_toml_parsing_with_defaults() {
		let config = from_toml(SAMPLE).unwrap();
		assert_eq!(config.watcher.name, "test-watcher");
		assert_eq!(config.watcher.log_level, "info");
		assert_eq!(config.network.chain_id, 1337);
		assert_eq!(config.network.weth, None);
		assert_eq!(config.intervals.event_polling_interval_ms, 500);
		assert_eq!(config.intervals.order_expiration_checking_interval_ms, 50);
		assert_eq!(config.intervals.cleanup_job_interval_ms, 3_600_000);
		assert_eq!(config.api.port, 3000);
		assert!(validate_config(&config).is_ok());
	}

	#[test]
	fn test_validation_rejects_bad_rpc_url() {
		let mut config = from_toml(SAMPLE).unwrap();
		config.network.rpc_url = "ws://localhost:8546".to_string();
		assert!(matches!(
			validate_config(&config),
			Err(ConfigError::ValidationError(_))
		));
	}

	#[test]
	fn test_validation_rejects_zero_interval() {
		let mut config = from_toml(SAMPLE).unwrap();
		config.intervals.event_polling_interval_ms = 0;
		assert!(validate_config(&config).is_err());
	}

	#[test]
	fn test_env_substitution() {
		env::set_var("WATCHER_TEST_SUBSTITUTED_NAME", "from-env");
		let substituted =
			substitute_env_vars("name = \"${WATCHER_TEST_SUBSTITUTED_NAME}\"").unwrap();
		assert_eq!(substituted, "name = \"from-env\"");

		assert!(matches!(
			substitute_env_vars("${WATCHER_TEST_DEFINITELY_UNSET}"),
			Err(ConfigError::EnvVarNotFound(_))
		));
	}

	#[tokio::test]
	async fn test_load_from_file() {
		let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
		file.write_all(SAMPLE.as_bytes()).unwrap();

		let config = ConfigLoader::new()
			.with_env_prefix("WATCHER_TEST_UNUSED_PREFIX_")
			.with_file(file.path())
			.load()
			.await
			.unwrap();
		assert_eq!(config.network.chain_id, 1337);
	}

	#[tokio::test]
	async fn test_missing_file() {
		let result = ConfigLoader::new()
			.with_file("/definitely/not/here.toml")
			.load()
			.await;
		assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
	}
}
