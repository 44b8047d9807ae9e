//! Order watcher orchestration.
//!
//! [`OrderWatcher`] ties the event stream, the expiration index, the lazy
//! state store and the dependency index together. It is assembled through
//! [`OrderWatcherBuilder`] from the chain-facing collaborators.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use watcher_config::Config;
use watcher_events::{ChainClient, StreamError};
use watcher_order::{
	AbiAssetDataDecoder, AssetDataDecoder, EcdsaSignatureVerifier, OrderError, SignatureVerifier,
};
use watcher_state::{StateError, StateFetcher};
use watcher_types::{Address, Clock, SystemClock};

mod watcher;

pub use watcher::{OrderStateCallback, OrderWatcher, WatcherStats};

#[derive(Debug, Error)]
pub enum WatcherError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	#[error("Invalid asset data: {0}")]
	InvalidAssetData(String),
	#[error("Conflicting token type hint for {0}")]
	ConflictingHint(Address),
	#[error("Subscription already present")]
	SubscriptionAlreadyPresent,
	#[error("Subscription not found")]
	SubscriptionNotFound,
	#[error("State error: {0}")]
	State(#[from] StateError),
	#[error("Stream error: {0}")]
	Stream(#[from] StreamError),
	#[error("Internal error: {0}")]
	Internal(String),
}

impl From<OrderError> for WatcherError {
	fn from(error: OrderError) -> Self {
		match error {
			OrderError::InvalidAssetData(reason) => WatcherError::InvalidAssetData(reason),
			OrderError::InvalidSignature(reason) => WatcherError::InvalidSignature(reason),
			OrderError::ConflictingHint(address) => WatcherError::ConflictingHint(address),
			OrderError::SubscriptionAlreadyPresent => WatcherError::SubscriptionAlreadyPresent,
			OrderError::SubscriptionNotFound => WatcherError::SubscriptionNotFound,
			OrderError::State(e) => WatcherError::State(e),
		}
	}
}

/// Settings of the order watcher.
#[derive(Debug, Clone)]
pub struct OrderWatcherConfig {
	/// Token every order implicitly depends on.
	pub fee_token: Address,
	pub expiration_margin_ms: u64,
	pub expiration_checking_interval: Duration,
	pub event_polling_interval: Duration,
	/// Period of the unconditional revalidation of every order.
	pub cleanup_job_interval: Duration,
	pub block_retention_limit: usize,
}

impl Default for OrderWatcherConfig {
	fn default() -> Self {
		Self {
			fee_token: Address::ZERO,
			expiration_margin_ms: 0,
			expiration_checking_interval: Duration::from_millis(50),
			event_polling_interval: Duration::from_millis(200),
			cleanup_job_interval: Duration::from_secs(3600),
			block_retention_limit: 20,
		}
	}
}

impl From<&Config> for OrderWatcherConfig {
	fn from(config: &Config) -> Self {
		Self {
			fee_token: config.network.fee_token,
			expiration_margin_ms: config.intervals.expiration_margin_ms,
			expiration_checking_interval: config.intervals.order_expiration_checking_interval(),
			event_polling_interval: config.intervals.event_polling_interval(),
			cleanup_job_interval: config.intervals.cleanup_job_interval(),
			block_retention_limit: config.intervals.block_retention_limit,
		}
	}
}

/// Assembles an [`OrderWatcher`] from its collaborators.
///
/// The chain client and state fetcher are required; signature verification,
/// asset data decoding and the clock default to the ECDSA verifier, the ABI
/// decoder and the system clock.
pub struct OrderWatcherBuilder {
	config: OrderWatcherConfig,
	chain_client: Option<Arc<dyn ChainClient>>,
	state_fetcher: Option<Arc<dyn StateFetcher>>,
	verifier: Arc<dyn SignatureVerifier>,
	asset_decoder: Arc<dyn AssetDataDecoder>,
	clock: Arc<dyn Clock>,
	erc20_tokens: Vec<Address>,
}

impl OrderWatcherBuilder {
	pub fn new(config: OrderWatcherConfig) -> Self {
		Self {
			config,
			chain_client: None,
			state_fetcher: None,
			verifier: Arc::new(EcdsaSignatureVerifier::new()),
			asset_decoder: Arc::new(AbiAssetDataDecoder::new()),
			clock: Arc::new(SystemClock),
			erc20_tokens: Vec::new(),
		}
	}

	pub fn with_chain_client(mut self, client: Arc<dyn ChainClient>) -> Self {
		self.chain_client = Some(client);
		self
	}

	pub fn with_state_fetcher(mut self, fetcher: Arc<dyn StateFetcher>) -> Self {
		self.state_fetcher = Some(fetcher);
		self
	}

	pub fn with_signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
		self.verifier = verifier;
		self
	}

	pub fn with_asset_decoder(mut self, decoder: Arc<dyn AssetDataDecoder>) -> Self {
		self.asset_decoder = decoder;
		self
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	/// Pre-registers an ERC20 hint, e.g. for WETH.
	pub fn with_erc20_token(mut self, address: Address) -> Self {
		self.erc20_tokens.push(address);
		self
	}

	pub fn build(self) -> Result<OrderWatcher, WatcherError> {
		let chain_client = self
			.chain_client
			.ok_or_else(|| WatcherError::Config("Chain client not provided".into()))?;
		let state_fetcher = self
			.state_fetcher
			.ok_or_else(|| WatcherError::Config("State fetcher not provided".into()))?;
		if self.config.block_retention_limit == 0 {
			return Err(WatcherError::Config(
				"Block retention limit must be positive".into(),
			));
		}

		OrderWatcher::new(
			self.config,
			chain_client,
			state_fetcher,
			self.verifier,
			self.asset_decoder,
			self.clock,
			&self.erc20_tokens,
		)
	}
}

#[cfg(test)]
pub(crate) mod test_utils;
