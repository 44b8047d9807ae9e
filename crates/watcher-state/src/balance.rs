//! Balance and proxy allowance cache.
//!
//! Values are cached per owner and leaf asset. Reads of a bundle are computed
//! from its leaves: the bundle balance is the number of whole bundle units the
//! owner holds, i.e. the minimum over leaves of `leaf_value / multiplier`.
//! A leaf listed more than once counts with the sum of its multipliers.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use watcher_types::{Address, AssetData, U256};

use crate::{StateError, StateFetcher};

#[derive(Debug, Clone, Copy)]
enum Entity {
	Balance,
	ProxyAllowance,
}

type OwnerCache = HashMap<Address, HashMap<AssetData, U256>>;

/// Read-through cache over balances and proxy allowances.
pub struct BalanceAndProxyAllowanceLazyStore {
	fetcher: Arc<dyn StateFetcher>,
	balances: OwnerCache,
	proxy_allowances: OwnerCache,
}

impl BalanceAndProxyAllowanceLazyStore {
	pub fn new(fetcher: Arc<dyn StateFetcher>) -> Self {
		Self {
			fetcher,
			balances: HashMap::new(),
			proxy_allowances: HashMap::new(),
		}
	}

	pub async fn get_balance(
		&mut self,
		owner: Address,
		asset: &AssetData,
	) -> Result<U256, StateError> {
		self.get(Entity::Balance, owner, asset).await
	}

	pub async fn get_proxy_allowance(
		&mut self,
		owner: Address,
		asset: &AssetData,
	) -> Result<U256, StateError> {
		self.get(Entity::ProxyAllowance, owner, asset).await
	}

	/// Invalidates the balance of every leaf of `asset`.
	pub fn delete_balance(&mut self, owner: Address, asset: &AssetData) {
		delete_leaves(&mut self.balances, owner, asset);
	}

	/// Invalidates the proxy allowance of every leaf of `asset`.
	pub fn delete_proxy_allowance(&mut self, owner: Address, asset: &AssetData) {
		delete_leaves(&mut self.proxy_allowances, owner, asset);
	}

	/// Invalidates the proxy allowances of `owner` for every token id of a
	/// contract.
	pub fn delete_proxy_allowances_for_token(&mut self, owner: Address, token_address: Address) {
		if let Some(cache) = self.proxy_allowances.get_mut(&owner) {
			cache.retain(|asset, _| asset.token_address() != Some(token_address));
			if cache.is_empty() {
				self.proxy_allowances.remove(&owner);
			}
		}
	}

	pub fn delete_all(&mut self) {
		self.balances.clear();
		self.proxy_allowances.clear();
	}

	pub fn is_empty(&self) -> bool {
		self.balances.is_empty() && self.proxy_allowances.is_empty()
	}

	async fn get(
		&mut self,
		entity: Entity,
		owner: Address,
		asset: &AssetData,
	) -> Result<U256, StateError> {
		// A leaf listed more than once needs the sum of its multipliers
		let mut merged: Vec<(&AssetData, U256)> = Vec::new();
		for (leaf, multiplier) in asset.leaves() {
			match merged.iter_mut().find(|(seen, _)| *seen == leaf) {
				Some((_, total)) => *total = total.saturating_add(multiplier),
				None => merged.push((leaf, multiplier)),
			}
		}

		let mut value: Option<U256> = None;
		for (leaf, multiplier) in merged {
			let leaf_value = self.get_leaf(entity, owner, leaf).await?;
			let units = if multiplier.is_zero() {
				U256::MAX
			} else {
				leaf_value / multiplier
			};
			value = Some(value.map_or(units, |current| current.min(units)));
		}
		Ok(value.unwrap_or_default())
	}

	async fn get_leaf(
		&mut self,
		entity: Entity,
		owner: Address,
		leaf: &AssetData,
	) -> Result<U256, StateError> {
		let cache = match entity {
			Entity::Balance => &self.balances,
			Entity::ProxyAllowance => &self.proxy_allowances,
		};
		if let Some(value) = cache.get(&owner).and_then(|assets| assets.get(leaf)) {
			return Ok(*value);
		}

		debug!(?entity, %owner, ?leaf, "Fetching value");
		let value = match entity {
			Entity::Balance => self.fetcher.fetch_balance(owner, leaf).await?,
			Entity::ProxyAllowance => self.fetcher.fetch_proxy_allowance(owner, leaf).await?,
		};

		let cache = match entity {
			Entity::Balance => &mut self.balances,
			Entity::ProxyAllowance => &mut self.proxy_allowances,
		};
		cache.entry(owner).or_default().insert(leaf.clone(), value);
		Ok(value)
	}
}

fn delete_leaves(cache: &mut OwnerCache, owner: Address, asset: &AssetData) {
	if let Some(assets) = cache.get_mut(&owner) {
		for (leaf, _) in asset.leaves() {
			assets.remove(leaf);
		}
		if assets.is_empty() {
			cache.remove(&owner);
		}
	}
}
