//! Event decoding with ERC20/ERC721 disambiguation.
//!
//! ERC20 and ERC721 `Transfer` and `Approval` share their event signatures.
//! They differ only in whether the last argument is indexed, so a log can
//! only be attributed once the emitting contract's token standard is known.
//! Callers register that knowledge as per-address hints.

use alloy::sol_types::SolEvent;
use std::collections::HashSet;
use tracing::debug;
use watcher_types::{Address, Log, OrderHash, B256, U256};

use crate::OrderError;

mod erc20 {
	alloy::sol! {
		event Transfer(address indexed from, address indexed to, uint256 value);
		event Approval(address indexed owner, address indexed spender, uint256 value);
	}
}

mod erc721 {
	alloy::sol! {
		event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
		event Approval(address indexed owner, address indexed approved, uint256 indexed tokenId);
		event ApprovalForAll(address indexed owner, address indexed operator, bool approved);
	}
}

mod weth9 {
	alloy::sol! {
		event Deposit(address indexed owner, uint256 value);
		event Withdrawal(address indexed owner, uint256 value);
	}
}

mod exchange {
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

/// A decoded event relevant to order fillability.
///
/// `token` and `exchange` are the emitting contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEvent {
	Erc20Transfer {
		token: Address,
		from: Address,
		to: Address,
		value: U256,
	},
	Erc20Approval {
		token: Address,
		owner: Address,
		spender: Address,
		value: U256,
	},
	Erc721Transfer {
		token: Address,
		from: Address,
		to: Address,
		token_id: U256,
	},
	Erc721Approval {
		token: Address,
		owner: Address,
		approved: Address,
		token_id: U256,
	},
	ApprovalForAll {
		token: Address,
		owner: Address,
		operator: Address,
		approved: bool,
	},
	Deposit {
		token: Address,
		owner: Address,
		value: U256,
	},
	Withdrawal {
		token: Address,
		owner: Address,
		value: U256,
	},
	Fill {
		exchange: Address,
		maker: Address,
		order_hash: OrderHash,
		taker_asset_filled_amount: U256,
	},
	Cancel {
		exchange: Address,
		maker: Address,
		order_hash: OrderHash,
	},
	CancelUpTo {
		exchange: Address,
		maker: Address,
		sender: Address,
		order_epoch: U256,
	},
}

/// Result of decoding a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedLog {
	Event(ContractEvent),
	/// No schema matched.
	Raw(Log),
}

type Schema = fn(&Log) -> Option<ContractEvent>;

const ERC20_SCHEMA: &[Schema] = &[erc20_transfer, erc20_approval];
const ERC721_SCHEMA: &[Schema] = &[erc721_transfer, erc721_approval, approval_for_all];
const CATCH_ALL_SCHEMA: &[Schema] = &[deposit, withdrawal, fill, cancel, cancel_up_to];

/// Decoder for token, WETH9 and exchange events.
///
/// A log from an address hinted as ERC20 or ERC721 is first tried against
/// that standard's events; every log is then tried against the WETH9 and
/// exchange events. Hints are exclusive per address.
#[derive(Debug, Default)]
pub struct CollisionResistantAbiDecoder {
	erc20_tokens: HashSet<Address>,
	erc721_tokens: HashSet<Address>,
}

impl CollisionResistantAbiDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_erc20_token(&mut self, address: Address) -> Result<(), OrderError> {
		if self.erc721_tokens.contains(&address) {
			return Err(OrderError::ConflictingHint(address));
		}
		if self.erc20_tokens.insert(address) {
			debug!(%address, "Registered ERC20 token");
		}
		Ok(())
	}

	pub fn add_erc721_token(&mut self, address: Address) -> Result<(), OrderError> {
		if self.erc20_tokens.contains(&address) {
			return Err(OrderError::ConflictingHint(address));
		}
		if self.erc721_tokens.insert(address) {
			debug!(%address, "Registered ERC721 token");
		}
		Ok(())
	}

	pub fn decode(&self, log: &Log) -> DecodedLog {
		let hinted: &[Schema] = if self.erc20_tokens.contains(&log.address) {
			ERC20_SCHEMA
		} else if self.erc721_tokens.contains(&log.address) {
			ERC721_SCHEMA
		} else {
			&[]
		};

		hinted
			.iter()
			.chain(CATCH_ALL_SCHEMA)
			.find_map(|schema| schema(log))
			.map_or_else(|| DecodedLog::Raw(log.clone()), DecodedLog::Event)
	}

	/// Signature hashes of every event this decoder understands.
	pub fn topics() -> Vec<B256> {
		// ERC721 Transfer and Approval share the ERC20 hashes
		vec![
			erc20::Transfer::SIGNATURE_HASH,
			erc20::Approval::SIGNATURE_HASH,
			erc721::ApprovalForAll::SIGNATURE_HASH,
			weth9::Deposit::SIGNATURE_HASH,
			weth9::Withdrawal::SIGNATURE_HASH,
			exchange::Fill::SIGNATURE_HASH,
			exchange::Cancel::SIGNATURE_HASH,
			exchange::CancelUpTo::SIGNATURE_HASH,
		]
	}
}

/// Decodes `log` as `E` when both its signature and topic count match.
fn decode_event<E: SolEvent>(log: &Log, topic_count: usize) -> Option<E> {
	if log.topic0() != Some(E::SIGNATURE_HASH) || log.topics.len() != topic_count {
		return None;
	}
	E::decode_raw_log(log.topics.iter().copied(), &log.data).ok()
}

fn erc20_transfer(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<erc20::Transfer>(log, 3)?;
	Some(ContractEvent::Erc20Transfer {
		token: log.address,
		from: event.from,
		to: event.to,
		value: event.value,
	})
}

fn erc20_approval(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<erc20::Approval>(log, 3)?;
	Some(ContractEvent::Erc20Approval {
		token: log.address,
		owner: event.owner,
		spender: event.spender,
		value: event.value,
	})
}

fn erc721_transfer(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<erc721::Transfer>(log, 4)?;
	Some(ContractEvent::Erc721Transfer {
		token: log.address,
		from: event.from,
		to: event.to,
		token_id: event.tokenId,
	})
}

fn erc721_approval(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<erc721::Approval>(log, 4)?;
	Some(ContractEvent::Erc721Approval {
		token: log.address,
		owner: event.owner,
		approved: event.approved,
		token_id: event.tokenId,
	})
}

fn approval_for_all(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<erc721::ApprovalForAll>(log, 3)?;
	Some(ContractEvent::ApprovalForAll {
		token: log.address,
		owner: event.owner,
		operator: event.operator,
		approved: event.approved,
	})
}

fn deposit(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<weth9::Deposit>(log, 2)?;
	Some(ContractEvent::Deposit {
		token: log.address,
		owner: event.owner,
		value: event.value,
	})
}

fn withdrawal(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<weth9::Withdrawal>(log, 2)?;
	Some(ContractEvent::Withdrawal {
		token: log.address,
		owner: event.owner,
		value: event.value,
	})
}

fn fill(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<exchange::Fill>(log, 4)?;
	Some(ContractEvent::Fill {
		exchange: log.address,
		maker: event.makerAddress,
		order_hash: event.orderHash,
		taker_asset_filled_amount: event.takerAssetFilledAmount,
	})
}

fn cancel(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<exchange::Cancel>(log, 4)?;
	Some(ContractEvent::Cancel {
		exchange: log.address,
		maker: event.makerAddress,
		order_hash: event.orderHash,
	})
}

fn cancel_up_to(log: &Log) -> Option<ContractEvent> {
	let event = decode_event::<exchange::CancelUpTo>(log, 3)?;
	Some(ContractEvent::CancelUpTo {
		exchange: log.address,
		maker: event.makerAddress,
		sender: event.orderSenderAddress,
		order_epoch: event.orderEpoch,
	})
}
