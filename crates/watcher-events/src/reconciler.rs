//! Reorg-aware reconciliation of polled chain heads.
//!
//! The reconciler keeps a short history of recent blocks together with the
//! logs they carried. Each new head is linked back to that history by parent
//! hash. Blocks that fell off the canonical chain are rolled back and their
//! logs re-emitted as removed, then the new blocks are applied oldest first
//! and their logs emitted as added.

use std::collections::VecDeque;
use tracing::{debug, info, warn};
use watcher_types::{truncate_hash, BlockHeader, Log, LogEvent, LogFilter, B256};

use crate::{ChainClient, StreamError};

#[derive(Debug, Clone)]
struct BlockWithLogs {
	block: BlockHeader,
	logs: Vec<Log>,
}

/// Retained block history and the reconciliation step over it.
pub struct BlockReconciler {
	filter: LogFilter,
	retention_limit: usize,
	/// Oldest block at the front.
	blocks: VecDeque<BlockWithLogs>,
}

impl BlockReconciler {
	pub fn new(filter: LogFilter, retention_limit: usize) -> Self {
		Self {
			filter,
			retention_limit: retention_limit.max(1),
			blocks: VecDeque::new(),
		}
	}

	/// The most recent retained block.
	pub fn latest(&self) -> Option<&BlockHeader> {
		self.blocks.back().map(|b| &b.block)
	}

	pub fn len(&self) -> usize {
		self.blocks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.blocks.is_empty()
	}

	/// Reconciles the retained history with a new chain head.
	///
	/// Returns every removed log followed by every added log. Within each
	/// group logs are ordered by block then log index. On error the retained
	/// history is left untouched so the next head retries the same work.
	pub async fn reconcile(
		&mut self,
		client: &dyn ChainClient,
		head: BlockHeader,
	) -> Result<Vec<LogEvent>, StreamError> {
		if self.position(&head.hash).is_some() {
			return Ok(Vec::new());
		}

		// Walk back from the head until a retained ancestor is found. Once the
		// walk passes the oldest retained height no ancestor can match.
		let mut new_blocks = vec![head];
		let mut ancestor = None;
		if let Some(oldest) = self.blocks.front().map(|b| b.block.number) {
			loop {
				let last = &new_blocks[new_blocks.len() - 1];
				let parent_hash = last.parent_hash;
				if let Some(index) = self.position(&parent_hash) {
					ancestor = Some(index);
					break;
				}
				if last.number <= oldest {
					break;
				}
				let parent = client
					.fetch_block_by_hash(parent_hash)
					.await?
					.ok_or(StreamError::BlockNotFound(parent_hash))?;
				new_blocks.push(parent);
			}
		}
		new_blocks.reverse();

		let mut applied = Vec::with_capacity(new_blocks.len());
		for block in new_blocks {
			let mut logs = client.fetch_logs(&self.filter.at_block_hash(block.hash)).await?;
			logs.sort_by_key(|log| log.log_index);
			applied.push(BlockWithLogs { block, logs });
		}

		let orphaned = self.detach_orphans(ancestor, &applied);
		let mut events = Vec::new();
		for orphan in &orphaned {
			info!(
				block = orphan.block.number,
				hash = %truncate_hash(&orphan.block.hash),
				"Rolling back orphaned block"
			);
			events.extend(orphan.logs.iter().cloned().map(LogEvent::removed));
		}
		for entry in applied {
			debug!(
				block = entry.block.number,
				hash = %truncate_hash(&entry.block.hash),
				logs = entry.logs.len(),
				"Applying block"
			);
			events.extend(entry.logs.iter().cloned().map(LogEvent::added));
			self.blocks.push_back(entry);
		}
		while self.blocks.len() > self.retention_limit {
			self.blocks.pop_front();
		}

		Ok(events)
	}

	/// Detaches the retained blocks replaced by `applied`, oldest first.
	fn detach_orphans(
		&mut self,
		ancestor: Option<usize>,
		applied: &[BlockWithLogs],
	) -> Vec<BlockWithLogs> {
		match ancestor {
			Some(index) => self.blocks.split_off(index + 1).into(),
			None if self.blocks.is_empty() => Vec::new(),
			None => {
				// No shared ancestor above the oldest retained block. Blocks at or
				// above the first new height conflict with the new chain; older
				// ones can no longer be linked and are dropped silently.
				let first_new = applied.first().map_or(u64::MAX, |b| b.block.number);
				warn!(
					first_new,
					retained = self.blocks.len(),
					"No common ancestor in retained history, resetting"
				);
				let history = std::mem::take(&mut self.blocks);
				history
					.into_iter()
					.filter(|b| b.block.number >= first_new)
					.collect()
			}
		}
	}

	fn position(&self, hash: &B256) -> Option<usize> {
		self.blocks.iter().position(|b| &b.block.hash == hash)
	}
}
