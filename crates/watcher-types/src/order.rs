//! Signed order types.
//!
//! This module defines the signed order submitted by callers, its EIP-712
//! content hash, and the decoded form the watcher keeps for every order it
//! tracks.

use alloy::sol;
use alloy::sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::{Address, AssetData, Bytes, OrderHash, U256};

/// EIP-712 domain name of the exchange contract.
pub const EXCHANGE_DOMAIN_NAME: &str = "0x Protocol";
/// EIP-712 domain version of the exchange contract.
pub const EXCHANGE_DOMAIN_VERSION: &str = "3.0.0";

mod eip712 {
	use super::sol;

	sol! {
		struct Order {
			address makerAddress;
			address takerAddress;
			address feeRecipientAddress;
			address senderAddress;
			uint256 makerAssetAmount;
			uint256 takerAssetAmount;
			uint256 makerFee;
			uint256 takerFee;
			uint256 expirationTimeSeconds;
			uint256 salt;
			bytes makerAssetData;
			bytes takerAssetData;
			bytes makerFeeAssetData;
			bytes takerFeeAssetData;
		}
	}
}

/// An exchange order signed by its maker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
	/// Chain the exchange contract lives on.
	pub chain_id: u64,
	/// Exchange contract the order is bound to.
	pub exchange_address: Address,
	pub maker_address: Address,
	pub taker_address: Address,
	pub fee_recipient_address: Address,
	pub sender_address: Address,
	pub maker_asset_amount: U256,
	pub taker_asset_amount: U256,
	pub maker_fee: U256,
	pub taker_fee: U256,
	/// Unix timestamp in seconds after which the order can no longer be filled.
	pub expiration_time_seconds: U256,
	pub salt: U256,
	pub maker_asset_data: Bytes,
	pub taker_asset_data: Bytes,
	pub maker_fee_asset_data: Bytes,
	pub taker_fee_asset_data: Bytes,
	/// Maker signature over the order hash, including the trailing
	/// signature type byte.
	pub signature: Bytes,
}

impl SignedOrder {
	/// EIP-712 domain of the exchange this order is bound to.
	pub fn domain(&self) -> Eip712Domain {
		Eip712Domain::new(
			Some(Cow::Borrowed(EXCHANGE_DOMAIN_NAME)),
			Some(Cow::Borrowed(EXCHANGE_DOMAIN_VERSION)),
			Some(U256::from(self.chain_id)),
			Some(self.exchange_address),
			None,
		)
	}

	/// Computes the EIP-712 hash of the order fields.
	///
	/// The signature is not part of the hash.
	pub fn hash(&self) -> OrderHash {
		let order = eip712::Order {
			makerAddress: self.maker_address,
			takerAddress: self.taker_address,
			feeRecipientAddress: self.fee_recipient_address,
			senderAddress: self.sender_address,
			makerAssetAmount: self.maker_asset_amount,
			takerAssetAmount: self.taker_asset_amount,
			makerFee: self.maker_fee,
			takerFee: self.taker_fee,
			expirationTimeSeconds: self.expiration_time_seconds,
			salt: self.salt,
			makerAssetData: self.maker_asset_data.clone(),
			takerAssetData: self.taker_asset_data.clone(),
			makerFeeAssetData: self.maker_fee_asset_data.clone(),
			takerFeeAssetData: self.taker_fee_asset_data.clone(),
		};
		order.eip712_signing_hash(&self.domain())
	}

	/// Expiration as unix milliseconds, saturating at `u64::MAX`.
	pub fn expiration_ms(&self) -> u64 {
		let seconds: u64 = self.expiration_time_seconds.try_into().unwrap_or(u64::MAX);
		seconds.saturating_mul(1000)
	}
}

/// An order tracked by the watcher, stored once with its decoded assets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedOrder {
	pub hash: OrderHash,
	pub signed_order: SignedOrder,
	pub maker_asset: AssetData,
	pub taker_asset: AssetData,
	pub maker_fee_asset: AssetData,
	pub taker_fee_asset: AssetData,
}

impl WatchedOrder {
	pub fn maker(&self) -> Address {
		self.signed_order.maker_address
	}

	/// Assets drawn from the maker when the order is filled.
	pub fn maker_side_assets(&self) -> [&AssetData; 2] {
		[&self.maker_asset, &self.maker_fee_asset]
	}

	/// Every asset referenced by the order.
	pub fn all_assets(&self) -> [&AssetData; 4] {
		[
			&self.maker_asset,
			&self.taker_asset,
			&self.maker_fee_asset,
			&self.taker_fee_asset,
		]
	}
}
