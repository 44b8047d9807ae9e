//! Order bookkeeping for the order watcher.
//!
//! This crate holds the pieces the orchestrator combines to decide which
//! orders a chain event affects and whether they remain fillable:
//!
//! - [`DependentOrderHashesTracker`] - reverse index from maker, token and
//!   token id to the orders that depend on them
//! - [`ExpirationWatcher`] - min-ordered expiration index with a poller
//! - [`CollisionResistantAbiDecoder`] - event decoding with ERC20/ERC721 hints
//! - [`AssetDataDecoder`] - asset proxy data codec
//! - [`SignatureVerifier`] - maker signature checks
//! - [`OrderStateUtils`] - fillability computation over the lazy state store

use thiserror::Error;
use watcher_state::StateError;
use watcher_types::Address;

mod asset_data;
mod decoder;
mod dependency;
mod expiration;
mod order_state;
mod signature;

pub use asset_data::{AbiAssetDataDecoder, AssetDataDecoder};
pub use decoder::{CollisionResistantAbiDecoder, ContractEvent, DecodedLog};
pub use dependency::DependentOrderHashesTracker;
pub use expiration::ExpirationWatcher;
pub use order_state::OrderStateUtils;
pub use signature::{EcdsaSignatureVerifier, SignatureType, SignatureVerifier};

/// Errors that can occur while tracking orders.
#[derive(Debug, Error)]
pub enum OrderError {
	/// Error that occurs when asset data bytes cannot be decoded.
	#[error("Invalid asset data: {0}")]
	InvalidAssetData(String),
	/// Error that occurs when the maker signature does not verify.
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	/// Error that occurs when an address is hinted as both ERC20 and ERC721.
	#[error("Conflicting token type hint for {0}")]
	ConflictingHint(Address),
	/// Error that occurs when `subscribe` is called while already polling.
	#[error("Subscription already present")]
	SubscriptionAlreadyPresent,
	/// Error that occurs when `unsubscribe` is called while idle.
	#[error("Subscription not found")]
	SubscriptionNotFound,
	/// Error that occurs when reading chain state fails.
	#[error("State error: {0}")]
	State(#[from] StateError),
}

#[cfg(test)]
pub(crate) mod test_utils {
	use watcher_types::{AssetData, Bytes, OrderHash, SignedOrder, WatchedOrder, U256};

	use super::*;

	pub fn erc20(byte: u8) -> AssetData {
		AssetData::Erc20 {
			token_address: Address::repeat_byte(byte),
		}
	}

	pub fn erc721(byte: u8, id: u64) -> AssetData {
		AssetData::Erc721 {
			token_address: Address::repeat_byte(byte),
			token_id: U256::from(id),
		}
	}

	pub fn signed_order(maker: Address) -> SignedOrder {
		SignedOrder {
			chain_id: 1,
			exchange_address: Address::repeat_byte(0xee),
			maker_address: maker,
			taker_address: Address::ZERO,
			fee_recipient_address: Address::ZERO,
			sender_address: Address::ZERO,
			maker_asset_amount: U256::from(100),
			taker_asset_amount: U256::from(200),
			maker_fee: U256::ZERO,
			taker_fee: U256::ZERO,
			expiration_time_seconds: U256::from(2_000_000_000u64),
			salt: U256::from(1),
			maker_asset_data: Bytes::new(),
			taker_asset_data: Bytes::new(),
			maker_fee_asset_data: Bytes::new(),
			taker_fee_asset_data: Bytes::new(),
			signature: Bytes::new(),
		}
	}

	/// Builds a watched order with the given hash byte and maker-side assets.
	pub fn watched_order(
		hash: u8,
		maker: Address,
		maker_asset: AssetData,
		maker_fee_asset: AssetData,
	) -> WatchedOrder {
		WatchedOrder {
			hash: OrderHash::repeat_byte(hash),
			signed_order: signed_order(maker),
			maker_asset,
			taker_asset: erc20(0xfe),
			maker_fee_asset,
			taker_fee_asset: erc20(0xfe),
		}
	}
}
