//! Asset proxy data codec.
//!
//! Asset data is ABI-encoded as a call to one of the asset proxy "functions"
//! below; the 4-byte selector identifies the proxy and the arguments describe
//! the asset. Bundles nest further asset data inside `bytes[]`.

use alloy::sol;
use alloy::sol_types::{SolCall, SolInterface};
use watcher_types::{AssetData, Bytes};

use crate::OrderError;

sol! {
	interface IAssetData {
		function ERC20Token(address tokenAddress) external;
		function ERC721Token(address tokenAddress, uint256 tokenId) external;
		function MultiAsset(uint256[] amounts, bytes[] nestedAssetData) external;
	}
}

/// Nesting deeper than this is rejected.
const MAX_NESTING_DEPTH: usize = 4;

/// Decodes opaque asset data bytes.
pub trait AssetDataDecoder: Send + Sync {
	fn decode(&self, data: &[u8]) -> Result<AssetData, OrderError>;
}

/// [`AssetDataDecoder`] for the ERC20, ERC721 and MultiAsset proxies.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbiAssetDataDecoder;

impl AbiAssetDataDecoder {
	pub fn new() -> Self {
		Self
	}

	/// Encodes a decoded asset back into its proxy data.
	pub fn encode(asset: &AssetData) -> Bytes {
		match asset {
			AssetData::Erc20 { token_address } => IAssetData::ERC20TokenCall {
				tokenAddress: *token_address,
			}
			.abi_encode()
			.into(),
			AssetData::Erc721 {
				token_address,
				token_id,
			} => IAssetData::ERC721TokenCall {
				tokenAddress: *token_address,
				tokenId: *token_id,
			}
			.abi_encode()
			.into(),
			AssetData::MultiAsset { amounts, nested } => IAssetData::MultiAssetCall {
				amounts: amounts.clone(),
				nestedAssetData: nested.iter().map(Self::encode).collect(),
			}
			.abi_encode()
			.into(),
		}
	}

	fn decode_nested(data: &[u8], depth: usize) -> Result<AssetData, OrderError> {
		if data.len() < 4 {
			return Err(OrderError::InvalidAssetData(format!(
				"asset data too short: {} bytes",
				data.len()
			)));
		}

		let call = IAssetData::IAssetDataCalls::abi_decode(data)
			.map_err(|e| OrderError::InvalidAssetData(e.to_string()))?;

		match call {
			IAssetData::IAssetDataCalls::ERC20Token(call) => Ok(AssetData::Erc20 {
				token_address: call.tokenAddress,
			}),
			IAssetData::IAssetDataCalls::ERC721Token(call) => Ok(AssetData::Erc721 {
				token_address: call.tokenAddress,
				token_id: call.tokenId,
			}),
			IAssetData::IAssetDataCalls::MultiAsset(call) => {
				if depth >= MAX_NESTING_DEPTH {
					return Err(OrderError::InvalidAssetData(
						"multi-asset nesting too deep".to_string(),
					));
				}
				if call.amounts.len() != call.nestedAssetData.len() {
					return Err(OrderError::InvalidAssetData(format!(
						"multi-asset has {} amounts for {} assets",
						call.amounts.len(),
						call.nestedAssetData.len()
					)));
				}
				let nested = call
					.nestedAssetData
					.iter()
					.map(|data| Self::decode_nested(data, depth + 1))
					.collect::<Result<Vec<_>, _>>()?;
				Ok(AssetData::MultiAsset {
					amounts: call.amounts,
					nested,
				})
			}
		}
	}
}

impl AssetDataDecoder for AbiAssetDataDecoder {
	fn decode(&self, data: &[u8]) -> Result<AssetData, OrderError> {
		Self::decode_nested(data, 0)
	}
}
