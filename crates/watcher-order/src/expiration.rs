//! Expiration index and poller.

use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use watcher_types::{truncate_hash, Clock, OrderHash};

use crate::OrderError;

type ExpirationQueue = PriorityQueue<OrderHash, Reverse<(u64, OrderHash)>>;

struct Subscription {
	active: Arc<AtomicBool>,
	stop_tx: mpsc::Sender<()>,
}

/// Min-ordered index of order expirations.
///
/// Orders pop by expiration time, ties broken by ascending order hash. An
/// order is due once `expiration_ms <= now_ms + margin_ms`.
pub struct ExpirationWatcher {
	queue: Arc<Mutex<ExpirationQueue>>,
	margin_ms: u64,
	polling_interval: Duration,
	clock: Arc<dyn Clock>,
	subscription: tokio::sync::Mutex<Option<Subscription>>,
}

impl ExpirationWatcher {
	pub fn new(margin_ms: u64, polling_interval: Duration, clock: Arc<dyn Clock>) -> Self {
		Self {
			queue: Arc::new(Mutex::new(PriorityQueue::new())),
			margin_ms,
			polling_interval,
			clock,
			subscription: tokio::sync::Mutex::new(None),
		}
	}

	/// Tracks an order. Re-adding an order replaces its expiration.
	pub fn add_order(&self, order_hash: OrderHash, expiration_ms: u64) {
		lock(&self.queue).push(order_hash, Reverse((expiration_ms, order_hash)));
	}

	pub fn remove_order(&self, order_hash: &OrderHash) {
		lock(&self.queue).remove(order_hash);
	}

	pub fn contains(&self, order_hash: &OrderHash) -> bool {
		lock(&self.queue).get(order_hash).is_some()
	}

	pub fn len(&self) -> usize {
		lock(&self.queue).len()
	}

	pub fn is_empty(&self) -> bool {
		lock(&self.queue).is_empty()
	}

	/// Removes and returns every order due at `now_ms`, earliest first.
	pub fn pop_due(&self, now_ms: u64) -> Vec<OrderHash> {
		pop_due(&mut lock(&self.queue), now_ms.saturating_add(self.margin_ms))
	}

	/// Starts polling for due orders. Each non-empty batch is sent to `sender`.
	pub async fn subscribe(
		&self,
		sender: mpsc::UnboundedSender<Vec<OrderHash>>,
	) -> Result<(), OrderError> {
		let mut subscription = self.subscription.lock().await;
		if subscription.is_some() {
			return Err(OrderError::SubscriptionAlreadyPresent);
		}

		let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
		let active = Arc::new(AtomicBool::new(true));
		let queue = self.queue.clone();
		let clock = self.clock.clone();
		let margin_ms = self.margin_ms;
		let flag = active.clone();
		let mut interval = tokio::time::interval(self.polling_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = interval.tick() => {
						if !flag.load(Ordering::SeqCst) {
							break;
						}
						let due = pop_due(&mut lock(&queue), clock.now_ms().saturating_add(margin_ms));
						if due.is_empty() {
							continue;
						}
						debug!(count = due.len(), "Orders expired");
						if sender.send(due).is_err() {
							break;
						}
					}
					_ = stop_rx.recv() => {
						break;
					}
				}
			}
		});

		info!(
			interval_ms = self.polling_interval.as_millis() as u64,
			"Expiration watcher started"
		);
		*subscription = Some(Subscription { active, stop_tx });
		Ok(())
	}

	pub async fn unsubscribe(&self) -> Result<(), OrderError> {
		let subscription = self
			.subscription
			.lock()
			.await
			.take()
			.ok_or(OrderError::SubscriptionNotFound)?;

		subscription.active.store(false, Ordering::SeqCst);
		let _ = subscription.stop_tx.try_send(());
		info!("Expiration watcher stopped");
		Ok(())
	}
}

fn lock(queue: &Mutex<ExpirationQueue>) -> MutexGuard<'_, ExpirationQueue> {
	queue.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pop_due(queue: &mut ExpirationQueue, deadline_ms: u64) -> Vec<OrderHash> {
	let mut due = Vec::new();
	while let Some(expiration_ms) = queue.peek().map(|(_, Reverse((ms, _)))| *ms) {
		if expiration_ms > deadline_ms {
			break;
		}
		if let Some((order_hash, _)) = queue.pop() {
			debug!(order = %truncate_hash(&order_hash), expiration_ms, "Order due");
			due.push(order_hash);
		}
	}
	due
}
