//! Lazy chain state for the order watcher.
//!
//! This crate provides read-through caches over the chain values that decide
//! whether an order is fillable: maker balances and proxy allowances, and the
//! exchange's filled, cancelled and order epoch records. Values are fetched
//! through a [`StateFetcher`] on first access and kept until explicitly
//! invalidated; there is no time-based expiry.

use async_trait::async_trait;
use thiserror::Error;
use watcher_types::{Address, AssetData, OrderHash, U256};

mod balance;
mod fill;

pub use balance::BalanceAndProxyAllowanceLazyStore;
pub use fill::OrderFilledCancelledLazyStore;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

/// Errors that can occur while reading chain state.
#[derive(Debug, Error)]
pub enum StateError {
	/// Error that occurs when the fetcher cannot reach the chain.
	#[error("Network error: {0}")]
	Network(String),
	/// Error that occurs when a contract call fails.
	#[error("Contract call failed: {0}")]
	Call(String),
	/// Error that occurs when a fetch is requested for a bundle instead of a leaf asset.
	#[error("Unsupported asset: {0}")]
	UnsupportedAsset(String),
}

/// Trait defining the chain reads behind the lazy stores.
///
/// Balance and allowance reads are only ever issued for leaf assets; the
/// stores decompose bundles themselves.
#[async_trait]
pub trait StateFetcher: Send + Sync {
	/// Balance of `owner` in units of the leaf asset.
	async fn fetch_balance(&self, owner: Address, asset: &AssetData) -> Result<U256, StateError>;

	/// Amount of the leaf asset the asset proxy may move on behalf of `owner`.
	async fn fetch_proxy_allowance(
		&self,
		owner: Address,
		asset: &AssetData,
	) -> Result<U256, StateError>;

	/// Taker asset amount already filled for the order.
	async fn fetch_filled_amount(&self, order_hash: OrderHash) -> Result<U256, StateError>;

	/// Whether the order was individually cancelled.
	async fn fetch_is_cancelled(&self, order_hash: OrderHash) -> Result<bool, StateError>;

	/// Orders of `maker` for `sender` with a salt below this epoch are cancelled.
	async fn fetch_order_epoch(&self, maker: Address, sender: Address)
		-> Result<U256, StateError>;
}

/// Both lazy stores behind one handle.
pub struct LazyStateStore {
	pub balances: BalanceAndProxyAllowanceLazyStore,
	pub fills: OrderFilledCancelledLazyStore,
}

impl LazyStateStore {
	pub fn new(fetcher: std::sync::Arc<dyn StateFetcher>) -> Self {
		Self {
			balances: BalanceAndProxyAllowanceLazyStore::new(fetcher.clone()),
			fills: OrderFilledCancelledLazyStore::new(fetcher),
		}
	}

	/// Drops every cached value.
	pub fn delete_all(&mut self) {
		self.balances.delete_all();
		self.fills.delete_all();
	}

	pub fn is_empty(&self) -> bool {
		self.balances.is_empty() && self.fills.is_empty()
	}
}
