//! Configuration types for the order watcher.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use watcher_types::Address;

/// Complete watcher configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Watcher identity and logging
	pub watcher: WatcherSettings,
	/// Chain connection and contract addresses
	pub network: NetworkConfig,
	/// Polling cadences
	#[serde(default)]
	pub intervals: IntervalsConfig,
	/// HTTP surface
	#[serde(default)]
	pub api: ApiConfig,
}

/// Watcher identity and logging
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherSettings {
	/// Watcher name/identifier
	pub name: String,
	/// Default tracing filter
	#[serde(default = "default_log_level")]
	pub log_level: String,
}

/// Chain connection and the contracts the watcher reads from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	/// HTTP JSON-RPC endpoint
	pub rpc_url: String,
	pub chain_id: u64,
	/// Exchange contract emitting Fill/Cancel/CancelUpTo
	pub exchange: Address,
	/// Proxy holding ERC20 allowances
	pub erc20_proxy: Address,
	/// Proxy holding ERC721 approvals
	pub erc721_proxy: Address,
	/// Token every order implicitly depends on for fee settlement
	pub fee_token: Address,
	/// Wrapped ether contract, hinted as ERC20
	pub weth: Option<Address>,
}

/// Polling cadences, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IntervalsConfig {
	/// How often the expiration index is checked
	pub order_expiration_checking_interval_ms: u64,
	/// Orders expiring within this margin are treated as expired
	pub expiration_margin_ms: u64,
	/// How often the latest block is polled
	pub event_polling_interval_ms: u64,
	/// How often every watched order is revalidated unconditionally
	pub cleanup_job_interval_ms: u64,
	/// Number of recent blocks kept for reorg reconciliation
	pub block_retention_limit: usize,
}

impl Default for IntervalsConfig {
	fn default() -> Self {
		Self {
			order_expiration_checking_interval_ms: 50,
			expiration_margin_ms: 0,
			event_polling_interval_ms: 200,
			cleanup_job_interval_ms: 3_600_000,
			block_retention_limit: 20,
		}
	}
}

impl IntervalsConfig {
	pub fn order_expiration_checking_interval(&self) -> Duration {
		Duration::from_millis(self.order_expiration_checking_interval_ms)
	}

	pub fn event_polling_interval(&self) -> Duration {
		Duration::from_millis(self.event_polling_interval_ms)
	}

	pub fn cleanup_job_interval(&self) -> Duration {
		Duration::from_millis(self.cleanup_job_interval_ms)
	}
}

/// HTTP surface
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
	pub enabled: bool,
	pub host: String,
	pub port: u16,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			host: "127.0.0.1".to_string(),
			port: 3000,
		}
	}
}

fn default_log_level() -> String {
	"info".to_string()
}
