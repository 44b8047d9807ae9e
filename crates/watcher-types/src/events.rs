//! Chain data consumed by the watcher: block headers and raw logs.

use serde::{Deserialize, Serialize};

use crate::{Address, Bytes, B256};

/// The subset of a block header needed for reorg reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
	pub hash: B256,
	pub parent_hash: B256,
	pub number: u64,
	pub timestamp: u64,
}

/// A raw, undecoded log emitted by a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
	/// Contract that emitted the log.
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub block_hash: B256,
	pub block_number: u64,
	pub transaction_hash: Option<B256>,
	pub log_index: u64,
}

impl Log {
	/// The event signature hash, if the log has any topics.
	pub fn topic0(&self) -> Option<B256> {
		self.topics.first().copied()
	}
}

/// A log that either became part of the canonical chain or left it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
	pub log: Log,
	/// True when the log's block was orphaned by a reorganization.
	pub removed: bool,
}

impl LogEvent {
	pub fn added(log: Log) -> Self {
		Self {
			log,
			removed: false,
		}
	}

	pub fn removed(log: Log) -> Self {
		Self { log, removed: true }
	}
}

/// Filter applied when fetching logs for a block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
	/// Restricts the query to a single block.
	pub block_hash: Option<B256>,
	/// Emitting contracts to match. Empty matches any contract.
	pub addresses: Vec<Address>,
	/// Accepted event signature hashes. Empty matches any event.
	pub topics: Vec<B256>,
}

impl LogFilter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_topics(mut self, topics: Vec<B256>) -> Self {
		self.topics = topics;
		self
	}

	pub fn with_addresses(mut self, addresses: Vec<Address>) -> Self {
		self.addresses = addresses;
		self
	}

	/// Copy of this filter narrowed to one block.
	pub fn at_block_hash(&self, block_hash: B256) -> Self {
		Self {
			block_hash: Some(block_hash),
			..self.clone()
		}
	}

	/// Whether a log satisfies the address and topic constraints.
	pub fn matches(&self, log: &Log) -> bool {
		if let Some(block_hash) = self.block_hash {
			if log.block_hash != block_hash {
				return false;
			}
		}
		if !self.addresses.is_empty() && !self.addresses.contains(&log.address) {
			return false;
		}
		match log.topic0() {
			Some(topic) => self.topics.is_empty() || self.topics.contains(&topic),
			None => self.topics.is_empty(),
		}
	}
}
