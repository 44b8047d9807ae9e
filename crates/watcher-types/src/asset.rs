//! Decoded asset data.
//!
//! Orders reference the assets they trade through opaque asset data bytes.
//! Once decoded, an asset is either a single token (ERC20 or a specific ERC721
//! token id) or a bundle of nested assets, each with its own amount.

use serde::{Deserialize, Serialize};

use crate::{Address, U256};

/// A decoded asset descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssetData {
	/// A fungible ERC20 token.
	#[serde(rename_all = "camelCase")]
	Erc20 { token_address: Address },
	/// A single ERC721 token.
	#[serde(rename_all = "camelCase")]
	Erc721 {
		token_address: Address,
		token_id: U256,
	},
	/// An ordered bundle of nested assets. `amounts[i]` units of `nested[i]`
	/// are transferred for every unit of the bundle.
	#[serde(rename_all = "camelCase")]
	MultiAsset {
		amounts: Vec<U256>,
		nested: Vec<AssetData>,
	},
}

impl AssetData {
	/// Address of the token contract, for single-token assets.
	pub fn token_address(&self) -> Option<Address> {
		match self {
			AssetData::Erc20 { token_address } | AssetData::Erc721 { token_address, .. } => {
				Some(*token_address)
			}
			AssetData::MultiAsset { .. } => None,
		}
	}

	pub fn is_multi_asset(&self) -> bool {
		matches!(self, AssetData::MultiAsset { .. })
	}

	/// Returns every leaf asset together with the number of leaf units moved
	/// per unit of `self`.
	///
	/// A single-token asset is its own only leaf with a multiplier of one.
	/// Multipliers compound through nested bundles.
	pub fn leaves(&self) -> Vec<(&AssetData, U256)> {
		let mut leaves = Vec::new();
		self.visit_leaves(U256::from(1), &mut |leaf, multiplier| {
			leaves.push((leaf, multiplier))
		});
		leaves
	}

	fn visit_leaves<'a, F>(&'a self, multiplier: U256, visit: &mut F)
	where
		F: FnMut(&'a AssetData, U256),
	{
		match self {
			AssetData::MultiAsset { amounts, nested } => {
				for (amount, asset) in amounts.iter().zip(nested) {
					asset.visit_leaves(multiplier.saturating_mul(*amount), visit);
				}
			}
			leaf => visit(leaf, multiplier),
		}
	}
}
