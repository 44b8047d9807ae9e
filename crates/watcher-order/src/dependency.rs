//! Reverse index from chain state to the orders depending on it.

use std::collections::{BTreeSet, HashMap, HashSet};
use watcher_types::{Address, AssetData, OrderHash, WatchedOrder, U256};

type Erc20Index = HashMap<Address, HashMap<Address, HashSet<OrderHash>>>;
type Erc721Index = HashMap<Address, HashMap<Address, HashMap<U256, HashSet<OrderHash>>>>;

/// Tracks which watched orders depend on which maker balances.
///
/// Every order depends on the leaves of its maker asset and maker fee asset,
/// on the configured fee token, and on its maker as a whole. Buckets are
/// dropped as soon as they become empty.
pub struct DependentOrderHashesTracker {
	fee_token: Address,
	/// maker -> token -> orders
	erc20: Erc20Index,
	/// maker -> contract -> token id -> orders
	erc721: Erc721Index,
	/// maker -> orders
	makers: HashMap<Address, HashSet<OrderHash>>,
}

impl DependentOrderHashesTracker {
	pub fn new(fee_token: Address) -> Self {
		Self {
			fee_token,
			erc20: HashMap::new(),
			erc721: HashMap::new(),
			makers: HashMap::new(),
		}
	}

	pub fn add_order(&mut self, order: &WatchedOrder) {
		let maker = order.maker();
		for asset in order.maker_side_assets() {
			for (leaf, _) in asset.leaves() {
				self.add_leaf(maker, leaf, order.hash);
			}
		}
		self.add_erc20(maker, self.fee_token, order.hash);
		self.makers.entry(maker).or_default().insert(order.hash);
	}

	/// Inverse of [`add_order`](Self::add_order). A no-op for unknown orders.
	pub fn remove_order(&mut self, order: &WatchedOrder) {
		let maker = order.maker();
		for asset in order.maker_side_assets() {
			for (leaf, _) in asset.leaves() {
				self.remove_leaf(maker, leaf, &order.hash);
			}
		}
		self.remove_erc20(maker, self.fee_token, &order.hash);
		if let Some(orders) = self.makers.get_mut(&maker) {
			orders.remove(&order.hash);
			if orders.is_empty() {
				self.makers.remove(&maker);
			}
		}
	}

	/// Orders of `maker` depending on any leaf of `asset`, sorted.
	pub fn get_orders_dependent_on_asset(&self, maker: Address, asset: &AssetData) -> Vec<OrderHash> {
		let mut orders = BTreeSet::new();
		for (leaf, _) in asset.leaves() {
			match leaf {
				AssetData::Erc20 { token_address } => {
					if let Some(hashes) = self.erc20.get(&maker).and_then(|t| t.get(token_address)) {
						orders.extend(hashes.iter().copied());
					}
				}
				AssetData::Erc721 {
					token_address,
					token_id,
				} => {
					if let Some(hashes) = self
						.erc721
						.get(&maker)
						.and_then(|c| c.get(token_address))
						.and_then(|ids| ids.get(token_id))
					{
						orders.extend(hashes.iter().copied());
					}
				}
				AssetData::MultiAsset { .. } => {}
			}
		}
		orders.into_iter().collect()
	}

	/// Every order of `maker`, sorted.
	pub fn get_orders_dependent_on_maker(&self, maker: Address) -> Vec<OrderHash> {
		let orders: BTreeSet<_> = self
			.makers
			.get(&maker)
			.map(|hashes| hashes.iter().copied().collect())
			.unwrap_or_default();
		orders.into_iter().collect()
	}

	/// Orders of `maker` depending on any token id of `contract`, sorted.
	pub fn get_orders_dependent_on_nft_contract(
		&self,
		maker: Address,
		contract: Address,
	) -> Vec<OrderHash> {
		let orders: BTreeSet<_> = self
			.erc721
			.get(&maker)
			.and_then(|c| c.get(&contract))
			.map(|ids| ids.values().flatten().copied().collect())
			.unwrap_or_default();
		orders.into_iter().collect()
	}

	pub fn is_empty(&self) -> bool {
		self.erc20.is_empty() && self.erc721.is_empty() && self.makers.is_empty()
	}

	fn add_leaf(&mut self, maker: Address, leaf: &AssetData, hash: OrderHash) {
		match leaf {
			AssetData::Erc20 { token_address } => self.add_erc20(maker, *token_address, hash),
			AssetData::Erc721 {
				token_address,
				token_id,
			} => {
				self.erc721
					.entry(maker)
					.or_default()
					.entry(*token_address)
					.or_default()
					.entry(*token_id)
					.or_default()
					.insert(hash);
			}
			AssetData::MultiAsset { .. } => {}
		}
	}

	fn remove_leaf(&mut self, maker: Address, leaf: &AssetData, hash: &OrderHash) {
		match leaf {
			AssetData::Erc20 { token_address } => self.remove_erc20(maker, *token_address, hash),
			AssetData::Erc721 {
				token_address,
				token_id,
			} => {
				let Some(contracts) = self.erc721.get_mut(&maker) else {
					return;
				};
				if let Some(ids) = contracts.get_mut(token_address) {
					if let Some(orders) = ids.get_mut(token_id) {
						orders.remove(hash);
						if orders.is_empty() {
							ids.remove(token_id);
						}
					}
					if ids.is_empty() {
						contracts.remove(token_address);
					}
				}
				if contracts.is_empty() {
					self.erc721.remove(&maker);
				}
			}
			AssetData::MultiAsset { .. } => {}
		}
	}

	fn add_erc20(&mut self, maker: Address, token: Address, hash: OrderHash) {
		self.erc20
			.entry(maker)
			.or_default()
			.entry(token)
			.or_default()
			.insert(hash);
	}

	fn remove_erc20(&mut self, maker: Address, token: Address, hash: &OrderHash) {
		let Some(tokens) = self.erc20.get_mut(&maker) else {
			return;
		};
		if let Some(orders) = tokens.get_mut(&token) {
			orders.remove(hash);
			if orders.is_empty() {
				tokens.remove(&token);
			}
		}
		if tokens.is_empty() {
			self.erc20.remove(&maker);
		}
	}
}
