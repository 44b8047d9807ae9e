//! Chain reads using the Alloy library.
//!
//! Every request is retried with exponential backoff before the error is
//! surfaced to the polling loop.

use crate::{ChainClient, StreamError};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Block, BlockNumberOrTag, Filter};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use watcher_types::{BlockHeader, Log, LogFilter, B256};

/// Alloy-based [`ChainClient`] over HTTP JSON-RPC.
pub struct AlloyChainClient {
	provider: DynProvider,
	backoff: ExponentialBackoff,
	max_retries: u32,
}

impl AlloyChainClient {
	/// Creates a client connected to the given HTTP RPC endpoint.
	///
	/// Retries give up after 3 attempts or 30 seconds, whichever comes first.
	pub fn new(rpc_url: &str) -> Result<Self, StreamError> {
		let url: reqwest::Url = rpc_url
			.parse()
			.map_err(|e| StreamError::Connection(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new().connect_http(url).erased();
		Ok(Self::with_provider(provider))
	}

	/// Creates a client over an existing provider.
	pub fn with_provider(provider: DynProvider) -> Self {
		let backoff = ExponentialBackoff {
			max_elapsed_time: Some(Duration::from_secs(30)),
			..Default::default()
		};

		Self {
			provider,
			backoff,
			max_retries: 3,
		}
	}

	/// Sets the maximum number of retry attempts.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;
		self
	}

	async fn with_retry<T, E, F, Fut>(&self, method: &str, request: F) -> Result<T, StreamError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: std::fmt::Display,
	{
		let mut backoff = self.backoff.clone();
		let mut attempts = 0;

		loop {
			match request().await {
				Ok(result) => return Ok(result),
				Err(e) => {
					attempts += 1;

					if attempts > self.max_retries {
						warn!(
							"{} failed after {} attempts, giving up: {}",
							method, self.max_retries, e
						);
						return Err(StreamError::Connection(format!("{}: {}", method, e)));
					}

					match backoff.next_backoff() {
						Some(delay) => {
							warn!(
								"{} failed, attempt {}/{}, retrying in {:?}: {}",
								method, attempts, self.max_retries, delay, e
							);
							tokio::time::sleep(delay).await;
						}
						None => {
							warn!(
								"{} failed, backoff exhausted after {} attempts: {}",
								method, attempts, e
							);
							return Err(StreamError::Connection(format!("{}: {}", method, e)));
						}
					}
				}
			}
		}
	}
}

fn to_header(block: Block) -> BlockHeader {
	BlockHeader {
		hash: block.header.hash,
		parent_hash: block.header.parent_hash,
		number: block.header.number,
		timestamp: block.header.timestamp,
	}
}

fn to_log(log: alloy::rpc::types::Log) -> Log {
	Log {
		address: log.address(),
		topics: log.topics().to_vec(),
		data: log.data().data.clone(),
		block_hash: log.block_hash.unwrap_or_default(),
		block_number: log.block_number.unwrap_or_default(),
		transaction_hash: log.transaction_hash,
		log_index: log.log_index.unwrap_or_default(),
	}
}

#[async_trait]
impl ChainClient for AlloyChainClient {
	async fn fetch_latest_block(&self) -> Result<Option<BlockHeader>, StreamError> {
		let block = self
			.with_retry("eth_getBlockByNumber", || async {
				self.provider
					.get_block_by_number(BlockNumberOrTag::Latest)
					.await
			})
			.await?;
		Ok(block.map(to_header))
	}

	async fn fetch_block_by_hash(&self, hash: B256) -> Result<Option<BlockHeader>, StreamError> {
		let block = self
			.with_retry("eth_getBlockByHash", || async {
				self.provider.get_block_by_hash(hash).await
			})
			.await?;
		Ok(block.map(to_header))
	}

	async fn fetch_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, StreamError> {
		let mut rpc_filter = Filter::new();
		if let Some(block_hash) = filter.block_hash {
			rpc_filter = rpc_filter.at_block_hash(block_hash);
		}
		if !filter.addresses.is_empty() {
			rpc_filter = rpc_filter.address(filter.addresses.clone());
		}
		if !filter.topics.is_empty() {
			rpc_filter = rpc_filter.event_signature(filter.topics.clone());
		}

		let logs = self
			.with_retry("eth_getLogs", || async { self.provider.get_logs(&rpc_filter).await })
			.await?;
		Ok(logs.into_iter().map(to_log).collect())
	}
}
