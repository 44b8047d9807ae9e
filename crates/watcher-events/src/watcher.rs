//! Polling loop feeding reconciled log batches to a subscriber.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use watcher_types::{LogEvent, LogFilter};

use crate::{BlockReconciler, ChainClient, StreamError};

/// Callback receiving reconciliation errors while streaming.
pub type ErrorHandler = Arc<dyn Fn(StreamError) + Send + Sync>;

/// Settings of the polling loop.
#[derive(Debug, Clone)]
pub struct EventWatcherConfig {
	pub polling_interval: Duration,
	pub block_retention_limit: usize,
	/// Applied to every per-block log query.
	pub filter: LogFilter,
}

impl Default for EventWatcherConfig {
	fn default() -> Self {
		Self {
			polling_interval: Duration::from_millis(200),
			block_retention_limit: 20,
			filter: LogFilter::default(),
		}
	}
}

struct Subscription {
	/// Cleared on unsubscribe so an in-flight tick never publishes.
	active: Arc<AtomicBool>,
	stop_tx: mpsc::Sender<()>,
}

/// Streams added and removed logs from a polled chain head.
///
/// Each subscription owns a fresh [`BlockReconciler`], so the retained block
/// history is discarded when streaming stops.
pub struct EventWatcher {
	client: Arc<dyn ChainClient>,
	config: EventWatcherConfig,
	subscription: Mutex<Option<Subscription>>,
}

impl EventWatcher {
	pub fn new(client: Arc<dyn ChainClient>, config: EventWatcherConfig) -> Self {
		Self {
			client,
			config,
			subscription: Mutex::new(None),
		}
	}

	/// Starts polling. Every non-empty batch of log events is sent to `sender`.
	pub async fn subscribe(
		&self,
		sender: mpsc::UnboundedSender<Vec<LogEvent>>,
		on_error: ErrorHandler,
	) -> Result<(), StreamError> {
		let mut subscription = self.subscription.lock().await;
		if subscription.is_some() {
			return Err(StreamError::SubscriptionAlreadyPresent);
		}

		let (stop_tx, stop_rx) = mpsc::channel(1);
		let active = Arc::new(AtomicBool::new(true));
		let reconciler =
			BlockReconciler::new(self.config.filter.clone(), self.config.block_retention_limit);

		tokio::spawn(Self::polling_loop(
			self.client.clone(),
			reconciler,
			self.config.polling_interval,
			sender,
			on_error,
			active.clone(),
			stop_rx,
		));

		info!(
			interval_ms = self.config.polling_interval.as_millis() as u64,
			"Event watcher started"
		);
		*subscription = Some(Subscription { active, stop_tx });
		Ok(())
	}

	/// Stops polling and discards the retained block history.
	pub async fn unsubscribe(&self) -> Result<(), StreamError> {
		let subscription = self
			.subscription
			.lock()
			.await
			.take()
			.ok_or(StreamError::SubscriptionNotFound)?;

		subscription.active.store(false, Ordering::SeqCst);
		let _ = subscription.stop_tx.try_send(());
		info!("Event watcher stopped");
		Ok(())
	}

	pub async fn is_streaming(&self) -> bool {
		self.subscription.lock().await.is_some()
	}

	async fn polling_loop(
		client: Arc<dyn ChainClient>,
		mut reconciler: BlockReconciler,
		polling_interval: Duration,
		sender: mpsc::UnboundedSender<Vec<LogEvent>>,
		on_error: ErrorHandler,
		active: Arc<AtomicBool>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		let mut interval = tokio::time::interval(polling_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					let result = Self::poll_once(client.as_ref(), &mut reconciler).await;
					if !active.load(Ordering::SeqCst) {
						break;
					}
					match result {
						Ok(events) if events.is_empty() => {}
						Ok(events) => {
							debug!(count = events.len(), "Publishing log events");
							if sender.send(events).is_err() {
								warn!("Log event receiver dropped, stopping event watcher");
								break;
							}
						}
						Err(e) => {
							warn!("Failed to reconcile chain head: {}", e);
							on_error(e);
						}
					}
				}
				_ = stop_rx.recv() => {
					break;
				}
			}
		}
	}

	async fn poll_once(
		client: &dyn ChainClient,
		reconciler: &mut BlockReconciler,
	) -> Result<Vec<LogEvent>, StreamError> {
		match client.fetch_latest_block().await? {
			Some(head) => reconciler.reconcile(client, head).await,
			None => Ok(Vec::new()),
		}
	}
}
