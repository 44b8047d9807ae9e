//! Mock collaborators for orchestrator tests.

use alloy::primitives::address;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use watcher_events::{ChainClient, StreamError};
use watcher_order::{AbiAssetDataDecoder, OrderError, SignatureVerifier};
use watcher_state::{StateError, StateFetcher};
use watcher_types::{
	Address, AssetData, BlockHeader, Bytes, Clock, Log, LogFilter, ManualClock, OrderHash,
	OrderStateChange, SignedOrder, B256, U256,
};

use crate::{OrderStateCallback, OrderWatcher, OrderWatcherBuilder, OrderWatcherConfig, WatcherError};

mod events {
	pub mod erc20 {
		alloy::sol! {
			event Transfer(address indexed from, address indexed to, uint256 value);
			event Approval(address indexed owner, address indexed spender, uint256 value);
		}
	}

	pub mod erc721 {
		alloy::sol! {
			event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
			event Approval(address indexed owner, address indexed approved, uint256 indexed tokenId);
			event ApprovalForAll(address indexed owner, address indexed operator, bool approved);
		}
	}

	pub mod weth9 {
		alloy::sol! {
			event Deposit(address indexed owner, uint256 value);
			event Withdrawal(address indexed owner, uint256 value);
		}
	}

	pub mod exchange {
		alloy::sol! {
			event Fill(
				address indexed makerAddress,
				address indexed feeRecipientAddress,
				bytes makerAssetData,
				bytes takerAssetData,
				bytes makerFeeAssetData,
				bytes takerFeeAssetData,
				bytes32 indexed orderHash,
				address takerAddress,
				address senderAddress,
				uint256 makerAssetFilledAmount,
				uint256 takerAssetFilledAmount,
				uint256 makerFeePaid,
				uint256 takerFeePaid,
				uint256 protocolFeePaid
			);
			event Cancel(
				address indexed makerAddress,
				address indexed feeRecipientAddress,
				bytes makerAssetData,
				bytes takerAssetData,
				address senderAddress,
				bytes32 indexed orderHash
			);
			event CancelUpTo(
				address indexed makerAddress,
				address indexed orderSenderAddress,
				uint256 orderEpoch
			);
		}
	}
}

pub const MAKER: Address = address!("1111111111111111111111111111111111111111");
pub const MAKER_TOKEN: Address = address!("2121212121212121212121212121212121212121");
pub const TAKER_TOKEN: Address = address!("2222222222222222222222222222222222222222");
pub const FEE_TOKEN: Address = address!("2323232323232323232323232323232323232323");
pub const NFT_TOKEN: Address = address!("2424242424242424242424242424242424242424");
pub const EXCHANGE: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");

/// Chain whose head only moves when a block is pushed or replaced.
#[derive(Default)]
pub struct MockChain {
	blocks: Mutex<Vec<(BlockHeader, Vec<Log>)>>,
	reorgs: AtomicU64,
	pub fail_latest: AtomicBool,
}

impl MockChain {
	/// Appends a block carrying `logs` and makes it the head.
	pub fn push_block(&self, logs: Vec<Log>) {
		let mut blocks = self.blocks.lock().unwrap();
		let fork = self.reorgs.load(Ordering::SeqCst);
		append(&mut blocks, fork, logs);
	}

	/// Replaces the head with a sibling block carrying `logs`.
	pub fn replace_head(&self, logs: Vec<Log>) {
		let mut blocks = self.blocks.lock().unwrap();
		blocks.pop();
		let fork = self.reorgs.fetch_add(1, Ordering::SeqCst) + 1;
		append(&mut blocks, fork, logs);
	}
}

fn append(blocks: &mut Vec<(BlockHeader, Vec<Log>)>, fork: u64, logs: Vec<Log>) {
	let number = blocks.len() as u64 + 1;
	let parent_hash = blocks
		.last()
		.map(|(header, _)| header.hash)
		.unwrap_or(B256::ZERO);
	let hash = B256::from(U256::from(number) + (U256::from(fork) << 64usize));
	let logs = logs
		.into_iter()
		.enumerate()
		.map(|(index, log)| Log {
			block_hash: hash,
			block_number: number,
			log_index: index as u64,
			..log
		})
		.collect();
	blocks.push((
		BlockHeader {
			hash,
			parent_hash,
			number,
			timestamp: number * 12,
		},
		logs,
	));
}

#[async_trait]
impl ChainClient for MockChain {
	async fn fetch_latest_block(&self) -> Result<Option<BlockHeader>, StreamError> {
		if self.fail_latest.load(Ordering::SeqCst) {
			return Err(StreamError::Connection("node unavailable".to_string()));
		}
		Ok(self
			.blocks
			.lock()
			.unwrap()
			.last()
			.map(|(header, _)| header.clone()))
	}

	async fn fetch_block_by_hash(&self, hash: B256) -> Result<Option<BlockHeader>, StreamError> {
		Ok(self
			.blocks
			.lock()
			.unwrap()
			.iter()
			.find(|(header, _)| header.hash == hash)
			.map(|(header, _)| header.clone()))
	}

	async fn fetch_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, StreamError> {
		Ok(self
			.blocks
			.lock()
			.unwrap()
			.iter()
			.flat_map(|(_, logs)| logs.iter())
			.filter(|log| filter.matches(log))
			.cloned()
			.collect())
	}
}

/// A single read served by [`MockFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch {
	Balance(Address, AssetData),
	ProxyAllowance(Address, AssetData),
	FilledAmount(OrderHash),
	Cancelled(OrderHash),
	OrderEpoch(Address, Address),
}

/// Fetcher where every owner is funded and approved unless overridden.
/// Records every successful read.
#[derive(Default)]
pub struct MockFetcher {
	pub balances: Mutex<HashMap<(Address, AssetData), U256>>,
	pub allowances: Mutex<HashMap<(Address, AssetData), U256>>,
	pub filled: Mutex<HashMap<OrderHash, U256>>,
	pub epochs: Mutex<HashMap<(Address, Address), U256>>,
	pub cancelled: Mutex<HashSet<OrderHash>>,
	pub fetches: Mutex<Vec<Fetch>>,
	pub fail: AtomicBool,
}

impl MockFetcher {
	pub fn set_balance(&self, owner: Address, token: Address, value: u64) {
		self.set_asset_balance(owner, erc20(token), value);
	}

	pub fn set_asset_balance(&self, owner: Address, asset: AssetData, value: u64) {
		self.balances
			.lock()
			.unwrap()
			.insert((owner, asset), U256::from(value));
	}

	pub fn set_allowance(&self, owner: Address, asset: AssetData, value: u64) {
		self.allowances
			.lock()
			.unwrap()
			.insert((owner, asset), U256::from(value));
	}

	pub fn set_filled(&self, order_hash: OrderHash, value: u64) {
		self.filled
			.lock()
			.unwrap()
			.insert(order_hash, U256::from(value));
	}

	pub fn set_epoch(&self, maker: Address, sender: Address, value: u64) {
		self.epochs
			.lock()
			.unwrap()
			.insert((maker, sender), U256::from(value));
	}

	pub fn cancel(&self, order_hash: OrderHash) {
		self.cancelled.lock().unwrap().insert(order_hash);
	}

	/// How many times `fetch` was served.
	pub fn fetch_count(&self, fetch: &Fetch) -> usize {
		self.fetches
			.lock()
			.unwrap()
			.iter()
			.filter(|served| *served == fetch)
			.count()
	}

	fn serve(&self, fetch: Fetch) -> Result<(), StateError> {
		if self.fail.load(Ordering::SeqCst) {
			return Err(StateError::Network("node unavailable".to_string()));
		}
		self.fetches.lock().unwrap().push(fetch);
		Ok(())
	}
}

#[async_trait]
impl StateFetcher for MockFetcher {
	async fn fetch_balance(&self, owner: Address, asset: &AssetData) -> Result<U256, StateError> {
		self.serve(Fetch::Balance(owner, asset.clone()))?;
		Ok(self
			.balances
			.lock()
			.unwrap()
			.get(&(owner, asset.clone()))
			.copied()
			.unwrap_or(U256::from(1_000)))
	}

	async fn fetch_proxy_allowance(
		&self,
		owner: Address,
		asset: &AssetData,
	) -> Result<U256, StateError> {
		self.serve(Fetch::ProxyAllowance(owner, asset.clone()))?;
		Ok(self
			.allowances
			.lock()
			.unwrap()
			.get(&(owner, asset.clone()))
			.copied()
			.unwrap_or(U256::MAX))
	}

	async fn fetch_filled_amount(&self, order_hash: OrderHash) -> Result<U256, StateError> {
		self.serve(Fetch::FilledAmount(order_hash))?;
		Ok(self
			.filled
			.lock()
			.unwrap()
			.get(&order_hash)
			.copied()
			.unwrap_or_default())
	}

	async fn fetch_is_cancelled(&self, order_hash: OrderHash) -> Result<bool, StateError> {
		self.serve(Fetch::Cancelled(order_hash))?;
		Ok(self.cancelled.lock().unwrap().contains(&order_hash))
	}

	async fn fetch_order_epoch(&self, maker: Address, sender: Address) -> Result<U256, StateError> {
		self.serve(Fetch::OrderEpoch(maker, sender))?;
		Ok(self
			.epochs
			.lock()
			.unwrap()
			.get(&(maker, sender))
			.copied()
			.unwrap_or_default())
	}
}

/// Verifier accepting any signature.
pub struct AcceptAll;

#[async_trait]
impl SignatureVerifier for AcceptAll {
	async fn verify(&self, _: OrderHash, _: Address, _: &[u8]) -> Result<(), OrderError> {
		Ok(())
	}
}

/// A watcher wired to mocks, plus handles on them.
pub struct Harness {
	pub watcher: OrderWatcher,
	pub chain: Arc<MockChain>,
	pub fetcher: Arc<MockFetcher>,
	pub clock: Arc<ManualClock>,
	pub changes: Arc<Mutex<Vec<Result<OrderStateChange, WatcherError>>>>,
}

impl Harness {
	pub fn new() -> Self {
		Self::with_config(test_config())
	}

	pub fn with_config(config: OrderWatcherConfig) -> Self {
		let chain = Arc::new(MockChain::default());
		chain.push_block(Vec::new());
		let fetcher = Arc::new(MockFetcher::default());
		let clock = Arc::new(ManualClock::new(1_000_000));
		let watcher = OrderWatcherBuilder::new(config)
			.with_chain_client(chain.clone())
			.with_state_fetcher(fetcher.clone())
			.with_signature_verifier(Arc::new(AcceptAll))
			.with_clock(clock.clone() as Arc<dyn Clock>)
			.build()
			.unwrap();
		Self {
			watcher,
			chain,
			fetcher,
			clock,
			changes: Arc::new(Mutex::new(Vec::new())),
		}
	}

	pub fn callback(&self) -> OrderStateCallback {
		let changes = self.changes.clone();
		Arc::new(move |change| changes.lock().unwrap().push(change))
	}

	pub async fn subscribe(&self) {
		self.watcher.subscribe(self.callback()).await.unwrap();
	}

	/// Successful changes delivered so far.
	pub fn delivered(&self) -> Vec<OrderStateChange> {
		self.changes
			.lock()
			.unwrap()
			.iter()
			.filter_map(|change| change.as_ref().ok().cloned())
			.collect()
	}

	pub fn errors(&self) -> usize {
		self.changes
			.lock()
			.unwrap()
			.iter()
			.filter(|change| change.is_err())
			.count()
	}
}

pub fn test_config() -> OrderWatcherConfig {
	OrderWatcherConfig {
		fee_token: FEE_TOKEN,
		expiration_margin_ms: 0,
		expiration_checking_interval: Duration::from_millis(50),
		event_polling_interval: Duration::from_millis(100),
		cleanup_job_interval: Duration::from_secs(3600),
		block_retention_limit: 10,
	}
}

pub fn erc20(token: Address) -> AssetData {
	AssetData::Erc20 {
		token_address: token,
	}
}

/// 100 units of `MAKER_TOKEN` for 200 units of `TAKER_TOKEN`, no fees.
pub fn order(salt: u64) -> SignedOrder {
	SignedOrder {
		chain_id: 1,
		exchange_address: EXCHANGE,
		maker_address: MAKER,
		taker_address: Address::ZERO,
		fee_recipient_address: Address::ZERO,
		sender_address: Address::ZERO,
		maker_asset_amount: U256::from(100),
		taker_asset_amount: U256::from(200),
		maker_fee: U256::ZERO,
		taker_fee: U256::ZERO,
		expiration_time_seconds: U256::from(2_000_000_000u64),
		salt: U256::from(salt),
		maker_asset_data: AbiAssetDataDecoder::encode(&erc20(MAKER_TOKEN)),
		taker_asset_data: AbiAssetDataDecoder::encode(&erc20(TAKER_TOKEN)),
		maker_fee_asset_data: Bytes::new(),
		taker_fee_asset_data: Bytes::new(),
		signature: Bytes::new(),
	}
}

pub fn erc721(token_id: u64) -> AssetData {
	AssetData::Erc721 {
		token_address: NFT_TOKEN,
		token_id: U256::from(token_id),
	}
}

/// One `NFT_TOKEN` id for 200 units of `TAKER_TOKEN`, no fees.
pub fn nft_order(salt: u64, token_id: u64) -> SignedOrder {
	SignedOrder {
		maker_asset_amount: U256::from(1),
		maker_asset_data: AbiAssetDataDecoder::encode(&erc721(token_id)),
		..order(salt)
	}
}

fn log_of<E: SolEvent>(address: Address, event: &E) -> Log {
	let data = event.encode_log_data();
	let topics = data.topics().to_vec();
	Log {
		address,
		topics,
		data: data.data,
		block_hash: B256::ZERO,
		block_number: 0,
		transaction_hash: None,
		log_index: 0,
	}
}

pub fn transfer(token: Address, from: Address, to: Address, value: u64) -> Log {
	log_of(
		token,
		&events::erc20::Transfer {
			from,
			to,
			value: U256::from(value),
		},
	)
}

pub fn approval(token: Address, owner: Address, spender: Address, value: u64) -> Log {
	log_of(
		token,
		&events::erc20::Approval {
			owner,
			spender,
			value: U256::from(value),
		},
	)
}

pub fn nft_transfer(from: Address, to: Address, token_id: u64) -> Log {
	log_of(
		NFT_TOKEN,
		&events::erc721::Transfer {
			from,
			to,
			tokenId: U256::from(token_id),
		},
	)
}

pub fn nft_approval(owner: Address, approved: Address, token_id: u64) -> Log {
	log_of(
		NFT_TOKEN,
		&events::erc721::Approval {
			owner,
			approved,
			tokenId: U256::from(token_id),
		},
	)
}

pub fn approval_for_all(owner: Address, operator: Address, approved: bool) -> Log {
	log_of(
		NFT_TOKEN,
		&events::erc721::ApprovalForAll {
			owner,
			operator,
			approved,
		},
	)
}

pub fn deposit(token: Address, owner: Address, value: u64) -> Log {
	log_of(
		token,
		&events::weth9::Deposit {
			owner,
			value: U256::from(value),
		},
	)
}

pub fn withdrawal(token: Address, owner: Address, value: u64) -> Log {
	log_of(
		token,
		&events::weth9::Withdrawal {
			owner,
			value: U256::from(value),
		},
	)
}

pub fn fill(order_hash: OrderHash, taker_amount: u64) -> Log {
	log_of(
		EXCHANGE,
		&events::exchange::Fill {
			makerAddress: MAKER,
			feeRecipientAddress: Address::ZERO,
			makerAssetData: AbiAssetDataDecoder::encode(&erc20(MAKER_TOKEN)),
			takerAssetData: AbiAssetDataDecoder::encode(&erc20(TAKER_TOKEN)),
			makerFeeAssetData: Bytes::new(),
			takerFeeAssetData: Bytes::new(),
			orderHash: order_hash,
			takerAddress: Address::repeat_byte(0x99),
			senderAddress: Address::ZERO,
			makerAssetFilledAmount: U256::from(taker_amount / 2),
			takerAssetFilledAmount: U256::from(taker_amount),
			makerFeePaid: U256::ZERO,
			takerFeePaid: U256::ZERO,
			protocolFeePaid: U256::ZERO,
		},
	)
}

pub fn cancel(order_hash: OrderHash) -> Log {
	log_of(
		EXCHANGE,
		&events::exchange::Cancel {
			makerAddress: MAKER,
			feeRecipientAddress: Address::ZERO,
			makerAssetData: AbiAssetDataDecoder::encode(&erc20(MAKER_TOKEN)),
			takerAssetData: AbiAssetDataDecoder::encode(&erc20(TAKER_TOKEN)),
			senderAddress: Address::ZERO,
			orderHash: order_hash,
		},
	)
}

pub fn cancel_up_to(maker: Address, sender: Address, order_epoch: u64) -> Log {
	log_of(
		EXCHANGE,
		&events::exchange::CancelUpTo {
			makerAddress: maker,
			orderSenderAddress: sender,
			orderEpoch: U256::from(order_epoch),
		},
	)
}
