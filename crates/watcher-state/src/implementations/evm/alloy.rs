//! Chain state reads using the Alloy library.
//!
//! This module provides the production [`StateFetcher`], reading token
//! balances and proxy approvals from the token contracts and fill records
//! from the exchange contract over HTTP JSON-RPC.

use crate::{StateError, StateFetcher};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use async_trait::async_trait;
use watcher_types::{AssetData, OrderHash};

sol! {
	#[sol(rpc)]
	interface IERC20 {
		function balanceOf(address owner) external view returns (uint256);
		function allowance(address owner, address spender) external view returns (uint256);
	}

	#[sol(rpc)]
	interface IERC721 {
		function ownerOf(uint256 tokenId) external view returns (address);
		function getApproved(uint256 tokenId) external view returns (address);
		function isApprovedForAll(address owner, address operator) external view returns (bool);
	}

	#[sol(rpc)]
	interface IExchange {
		function filled(bytes32 orderHash) external view returns (uint256);
		function cancelled(bytes32 orderHash) external view returns (bool);
		function orderEpoch(address makerAddress, address orderSenderAddress) external view returns (uint256);
	}
}

/// Contracts the fetcher reads from.
#[derive(Debug, Clone, Copy)]
pub struct StateContracts {
	pub exchange: Address,
	pub erc20_proxy: Address,
	pub erc721_proxy: Address,
}

/// Alloy-based [`StateFetcher`].
pub struct AlloyStateFetcher {
	/// The Alloy provider for blockchain interaction.
	provider: DynProvider,
	contracts: StateContracts,
}

impl AlloyStateFetcher {
	/// Creates a fetcher connected to the given HTTP RPC endpoint.
	pub fn new(rpc_url: &str, contracts: StateContracts) -> Result<Self, StateError> {
		let url: reqwest::Url = rpc_url
			.parse()
			.map_err(|e| StateError::Network(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new().connect_http(url).erased();

		Ok(Self::with_provider(provider, contracts))
	}

	/// Creates a fetcher over an existing provider.
	pub fn with_provider(provider: DynProvider, contracts: StateContracts) -> Self {
		Self {
			provider,
			contracts,
		}
	}

	fn call_error(e: impl std::fmt::Display) -> StateError {
		StateError::Call(e.to_string())
	}
}

#[async_trait]
impl StateFetcher for AlloyStateFetcher {
	async fn fetch_balance(&self, owner: Address, asset: &AssetData) -> Result<U256, StateError> {
		match asset {
			AssetData::Erc20 { token_address } => {
				let token = IERC20::new(*token_address, self.provider.clone());
				token
					.balanceOf(owner)
					.call()
					.await
					.map_err(Self::call_error)
			}
			AssetData::Erc721 {
				token_address,
				token_id,
			} => {
				let token = IERC721::new(*token_address, self.provider.clone());
				let current_owner = token
					.ownerOf(*token_id)
					.call()
					.await
					.map_err(Self::call_error)?;
				Ok(if current_owner == owner {
					U256::from(1)
				} else {
					U256::ZERO
				})
			}
			AssetData::MultiAsset { .. } => Err(StateError::UnsupportedAsset(
				"balances are fetched per leaf asset".to_string(),
			)),
		}
	}

	async fn fetch_proxy_allowance(
		&self,
		owner: Address,
		asset: &AssetData,
	) -> Result<U256, StateError> {
		match asset {
			AssetData::Erc20 { token_address } => {
				let token = IERC20::new(*token_address, self.provider.clone());
				token
					.allowance(owner, self.contracts.erc20_proxy)
					.call()
					.await
					.map_err(Self::call_error)
			}
			AssetData::Erc721 {
				token_address,
				token_id,
			} => {
				let token = IERC721::new(*token_address, self.provider.clone());
				let approved_for_all = token
					.isApprovedForAll(owner, self.contracts.erc721_proxy)
					.call()
					.await
					.map_err(Self::call_error)?;
				if approved_for_all {
					return Ok(U256::from(1));
				}
				let approved = token
					.getApproved(*token_id)
					.call()
					.await
					.map_err(Self::call_error)?;
				Ok(if approved == self.contracts.erc721_proxy {
					U256::from(1)
				} else {
					U256::ZERO
				})
			}
			AssetData::MultiAsset { .. } => Err(StateError::UnsupportedAsset(
				"allowances are fetched per leaf asset".to_string(),
			)),
		}
	}

	async fn fetch_filled_amount(&self, order_hash: OrderHash) -> Result<U256, StateError> {
		let exchange = IExchange::new(self.contracts.exchange, self.provider.clone());
		exchange
			.filled(order_hash)
			.call()
			.await
			.map_err(Self::call_error)
	}

	async fn fetch_is_cancelled(&self, order_hash: OrderHash) -> Result<bool, StateError> {
		let exchange = IExchange::new(self.contracts.exchange, self.provider.clone());
		exchange
			.cancelled(order_hash)
			.call()
			.await
			.map_err(Self::call_error)
	}

	async fn fetch_order_epoch(
		&self,
		maker: Address,
		sender: Address,
	) -> Result<U256, StateError> {
		let exchange = IExchange::new(self.contracts.exchange, self.provider.clone());
		exchange
			.orderEpoch(maker, sender)
			.call()
			.await
			.map_err(Self::call_error)
	}
}
