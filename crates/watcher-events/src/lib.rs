//! # Watcher Events Library
//!
//! This library turns a polled chain head into a reorg-aware stream of log
//! events for the order watcher.
//!
//! ## Key Components
//!
//! - [`ChainClient`] - Block and log reads consumed from the RPC layer
//! - [`BlockReconciler`] - Retained block history and reorg reconciliation
//! - [`EventWatcher`] - Polling loop publishing reconciled log batches

use async_trait::async_trait;
use thiserror::Error;
use watcher_types::{BlockHeader, Log, LogFilter, B256};

mod reconciler;
mod watcher;

pub use reconciler::BlockReconciler;
pub use watcher::{ErrorHandler, EventWatcher, EventWatcherConfig};

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur while streaming chain events.
#[derive(Debug, Error)]
pub enum StreamError {
	/// Error that occurs when the RPC endpoint cannot be reached.
	#[error("Connection error: {0}")]
	Connection(String),
	/// Error that occurs when a block referenced by hash cannot be fetched.
	#[error("Block not found: {0}")]
	BlockNotFound(B256),
	/// Error that occurs when `subscribe` is called while already streaming.
	#[error("Subscription already present")]
	SubscriptionAlreadyPresent,
	/// Error that occurs when `unsubscribe` is called while idle.
	#[error("Subscription not found")]
	SubscriptionNotFound,
}

/// Trait defining the chain reads the event watcher needs.
///
/// Implementations own their retry and timeout policy; callers treat every
/// method as possibly slow and possibly failing.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Returns the current chain head, if the node has one.
	async fn fetch_latest_block(&self) -> Result<Option<BlockHeader>, StreamError>;

	/// Returns the block with the given hash, if the node knows it.
	async fn fetch_block_by_hash(&self, hash: B256) -> Result<Option<BlockHeader>, StreamError>;

	/// Returns the logs matching the filter.
	async fn fetch_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, StreamError>;
}
