//! Time sources.
//!
//! Pollers read the current time through [`Clock`] so that expiration logic
//! can be driven deterministically in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Source of the current unix time in milliseconds.
pub trait Clock: Send + Sync {
	fn now_ms(&self) -> u64;
}

/// Wall clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_ms(&self) -> u64 {
		chrono::Utc::now().timestamp_millis().max(0) as u64
	}
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
	now_ms: AtomicU64,
}

impl ManualClock {
	pub fn new(now_ms: u64) -> Self {
		Self {
			now_ms: AtomicU64::new(now_ms),
		}
	}

	pub fn set(&self, now_ms: u64) {
		self.now_ms.store(now_ms, Ordering::SeqCst);
	}

	pub fn advance(&self, by: Duration) {
		self.now_ms
			.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
	}
}

impl Clock for ManualClock {
	fn now_ms(&self) -> u64 {
		self.now_ms.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_advances() {
		let clock = ManualClock::new(1_000);
		clock.advance(Duration::from_secs(60));
		assert_eq!(clock.now_ms(), 61_000);
		clock.set(5);
		assert_eq!(clock.now_ms(), 5);
	}

	#[test]
	fn test_system_clock_is_recent() {
		// 2020-01-01 in milliseconds
		assert!(SystemClock.now_ms() > 1_577_836_800_000);
	}
}
