//! Primitive aliases shared across the workspace.

pub use alloy::primitives::{Address, Bytes, B256, U256};

/// EIP-712 hash identifying a signed order.
pub type OrderHash = B256;

/// Truncates a hash for display in log lines.
pub fn truncate_hash(hash: &B256) -> String {
	let hash_str = hex::encode(hash.0);
	if hash_str.len() <= 8 {
		hash_str
	} else {
		format!("{}..", &hash_str[..8])
	}
}
