//! Filled, cancelled and order epoch cache.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use watcher_types::{Address, OrderHash, U256};

use crate::{StateError, StateFetcher};

/// Read-through cache over the exchange's per-order and per-maker records.
pub struct OrderFilledCancelledLazyStore {
	fetcher: Arc<dyn StateFetcher>,
	filled: HashMap<OrderHash, U256>,
	cancelled: HashMap<OrderHash, bool>,
	/// Keyed by (maker, sender).
	order_epochs: HashMap<(Address, Address), U256>,
}

impl OrderFilledCancelledLazyStore {
	pub fn new(fetcher: Arc<dyn StateFetcher>) -> Self {
		Self {
			fetcher,
			filled: HashMap::new(),
			cancelled: HashMap::new(),
			order_epochs: HashMap::new(),
		}
	}

	pub async fn get_filled_amount(&mut self, order_hash: OrderHash) -> Result<U256, StateError> {
		if let Some(amount) = self.filled.get(&order_hash) {
			return Ok(*amount);
		}
		debug!(%order_hash, "Fetching filled amount");
		let amount = self.fetcher.fetch_filled_amount(order_hash).await?;
		self.filled.insert(order_hash, amount);
		Ok(amount)
	}

	pub async fn is_cancelled(&mut self, order_hash: OrderHash) -> Result<bool, StateError> {
		if let Some(cancelled) = self.cancelled.get(&order_hash) {
			return Ok(*cancelled);
		}
		debug!(%order_hash, "Fetching cancelled flag");
		let cancelled = self.fetcher.fetch_is_cancelled(order_hash).await?;
		self.cancelled.insert(order_hash, cancelled);
		Ok(cancelled)
	}

	pub async fn get_order_epoch(
		&mut self,
		maker: Address,
		sender: Address,
	) -> Result<U256, StateError> {
		if let Some(epoch) = self.order_epochs.get(&(maker, sender)) {
			return Ok(*epoch);
		}
		debug!(%maker, %sender, "Fetching order epoch");
		let epoch = self.fetcher.fetch_order_epoch(maker, sender).await?;
		self.order_epochs.insert((maker, sender), epoch);
		Ok(epoch)
	}

	pub fn delete_filled_amount(&mut self, order_hash: &OrderHash) {
		self.filled.remove(order_hash);
	}

	pub fn delete_cancelled(&mut self, order_hash: &OrderHash) {
		self.cancelled.remove(order_hash);
	}

	pub fn delete_order_epoch(&mut self, maker: Address, sender: Address) {
		self.order_epochs.remove(&(maker, sender));
	}

	pub fn delete_all(&mut self) {
		self.filled.clear();
		self.cancelled.clear();
		self.order_epochs.clear();
	}

	pub fn is_empty(&self) -> bool {
		self.filled.is_empty() && self.cancelled.is_empty() && self.order_epochs.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::CountingFetcher;

	#[tokio::test]
	async fn test_filled_amount_read_through() {
		let fetcher = Arc::new(CountingFetcher::default());
		let order_hash = OrderHash::repeat_byte(1);
		fetcher
			.filled
			.lock()
			.unwrap()
			.insert(order_hash, U256::from(5));
		let mut store = OrderFilledCancelledLazyStore::new(fetcher.clone());

		assert_eq!(store.get_filled_amount(order_hash).await.unwrap(), U256::from(5));
		assert_eq!(store.get_filled_amount(order_hash).await.unwrap(), U256::from(5));
		assert_eq!(fetcher.fetch_count(), 1);

		fetcher
			.filled
			.lock()
			.unwrap()
			.insert(order_hash, U256::from(8));
		store.delete_filled_amount(&order_hash);
		assert_eq!(store.get_filled_amount(order_hash).await.unwrap(), U256::from(8));
		assert_eq!(fetcher.fetch_count(), 2);
	}

	#[tokio::test]
	async fn test_invalidating_never_fetched_keys() {
		let fetcher = Arc::new(CountingFetcher::default());
		let mut store = OrderFilledCancelledLazyStore::new(fetcher.clone());
		let order_hash = OrderHash::repeat_byte(1);
		let maker = Address::repeat_byte(2);

		store.delete_cancelled(&order_hash);
		store.delete_order_epoch(maker, Address::ZERO);
		assert!(store.is_empty());

		assert!(!store.is_cancelled(order_hash).await.unwrap());
		store.get_order_epoch(maker, Address::ZERO).await.unwrap();
		assert_eq!(fetcher.fetch_count(), 2);
	}
}
