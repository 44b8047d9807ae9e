//! The order watcher and its event consumer.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};
use watcher_events::{ChainClient, EventWatcher, EventWatcherConfig, StreamError};
use watcher_order::{
	AssetDataDecoder, CollisionResistantAbiDecoder, ContractEvent, DecodedLog,
	DependentOrderHashesTracker, ExpirationWatcher, OrderStateUtils, SignatureVerifier,
};
use watcher_state::{LazyStateStore, StateFetcher};
use watcher_types::{
	truncate_hash, Address, AssetData, Bytes, Clock, LogEvent, LogFilter, OrderHash, OrderState,
	OrderStateChange, OrderStateError, SignedOrder, WatchedOrder,
};

use crate::{OrderWatcherConfig, WatcherError};

/// Receives every order state change, and errors raised while watching.
///
/// Invoked while the watcher lock is held; it must not block.
pub type OrderStateCallback = Arc<dyn Fn(Result<OrderStateChange, WatcherError>) + Send + Sync>;

/// Watcher statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStats {
	pub order_count: usize,
}

/// Everything guarded by the watcher lock.
struct WatcherState {
	orders: HashMap<OrderHash, WatchedOrder>,
	/// Last state delivered per order.
	snapshots: HashMap<OrderHash, OrderState>,
	dependencies: DependentOrderHashesTracker,
	decoder: CollisionResistantAbiDecoder,
	store: LazyStateStore,
	callback: Option<OrderStateCallback>,
}

struct Subscription {
	stop_tx: mpsc::Sender<()>,
}

struct Inner {
	state: Mutex<WatcherState>,
	event_watcher: EventWatcher,
	expiration_watcher: ExpirationWatcher,
	verifier: Arc<dyn SignatureVerifier>,
	asset_decoder: Arc<dyn AssetDataDecoder>,
	clock: Arc<dyn Clock>,
	order_state_utils: OrderStateUtils,
	config: OrderWatcherConfig,
	order_count: AtomicUsize,
	subscription: Mutex<Option<Subscription>>,
}

/// Incrementally tracks the fillability of a set of orders.
///
/// Orders are revalidated only when a log touches state they depend on, when
/// they expire, or during the periodic cleanup pass. Changes are delivered to
/// the callback given to [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct OrderWatcher {
	inner: Arc<Inner>,
}

impl OrderWatcher {
	pub(crate) fn new(
		config: OrderWatcherConfig,
		chain_client: Arc<dyn ChainClient>,
		state_fetcher: Arc<dyn StateFetcher>,
		verifier: Arc<dyn SignatureVerifier>,
		asset_decoder: Arc<dyn AssetDataDecoder>,
		clock: Arc<dyn Clock>,
		erc20_tokens: &[Address],
	) -> Result<Self, WatcherError> {
		let mut decoder = CollisionResistantAbiDecoder::new();
		decoder.add_erc20_token(config.fee_token)?;
		for token in erc20_tokens {
			decoder.add_erc20_token(*token)?;
		}

		let event_watcher = EventWatcher::new(
			chain_client,
			EventWatcherConfig {
				polling_interval: config.event_polling_interval,
				block_retention_limit: config.block_retention_limit,
				filter: LogFilter::new().with_topics(CollisionResistantAbiDecoder::topics()),
			},
		);
		let expiration_watcher = ExpirationWatcher::new(
			config.expiration_margin_ms,
			config.expiration_checking_interval,
			clock.clone(),
		);

		let state = WatcherState {
			orders: HashMap::new(),
			snapshots: HashMap::new(),
			dependencies: DependentOrderHashesTracker::new(config.fee_token),
			decoder,
			store: LazyStateStore::new(state_fetcher),
			callback: None,
		};

		Ok(Self {
			inner: Arc::new(Inner {
				state: Mutex::new(state),
				event_watcher,
				expiration_watcher,
				verifier,
				asset_decoder,
				clock,
				order_state_utils: OrderStateUtils::new(config.expiration_margin_ms),
				config,
				order_count: AtomicUsize::new(0),
				subscription: Mutex::new(None),
			}),
		})
	}

	/// Starts watching an order and returns its hash.
	///
	/// Adding an order that is already watched is a no-op.
	pub async fn add_order(&self, signed_order: SignedOrder) -> Result<OrderHash, WatcherError> {
		let inner = &self.inner;
		let hash = signed_order.hash();

		inner
			.verifier
			.verify(hash, signed_order.maker_address, &signed_order.signature)
			.await?;

		let maker_asset = inner.decode_asset(&signed_order.maker_asset_data)?;
		let taker_asset = inner.decode_asset(&signed_order.taker_asset_data)?;
		let maker_fee_asset = inner.decode_fee_asset(&signed_order.maker_fee_asset_data)?;
		let taker_fee_asset = inner.decode_fee_asset(&signed_order.taker_fee_asset_data)?;

		let mut state = inner.state.lock().await;
		if state.orders.contains_key(&hash) {
			return Ok(hash);
		}

		let order = WatchedOrder {
			hash,
			signed_order,
			maker_asset,
			taker_asset,
			maker_fee_asset,
			taker_fee_asset,
		};
		for asset in order.all_assets() {
			for (leaf, _) in asset.leaves() {
				match leaf {
					AssetData::Erc20 { token_address } => {
						state.decoder.add_erc20_token(*token_address)?
					}
					AssetData::Erc721 { token_address, .. } => {
						state.decoder.add_erc721_token(*token_address)?
					}
					AssetData::MultiAsset { .. } => {}
				}
			}
		}

		inner
			.expiration_watcher
			.add_order(hash, order.signed_order.expiration_ms());
		state.dependencies.add_order(&order);
		info!(
			order = %truncate_hash(&hash),
			maker = %order.maker(),
			"Watching order"
		);
		state.orders.insert(hash, order);
		inner.order_count.store(state.orders.len(), Ordering::SeqCst);

		Ok(hash)
	}

	/// Stops watching an order. Unknown hashes are ignored.
	pub async fn remove_order(&self, order_hash: OrderHash) {
		let mut state = self.inner.state.lock().await;
		self.inner.remove_order_locked(&mut state, &order_hash);
	}

	/// Starts delivering order state changes to `callback`.
	pub async fn subscribe(&self, callback: OrderStateCallback) -> Result<(), WatcherError> {
		let inner = &self.inner;
		let mut subscription = inner.subscription.lock().await;
		if subscription.is_some() {
			return Err(WatcherError::SubscriptionAlreadyPresent);
		}

		let (log_tx, log_rx) = mpsc::unbounded_channel();
		let (expired_tx, expired_rx) = mpsc::unbounded_channel();
		let (error_tx, error_rx) = mpsc::unbounded_channel::<StreamError>();
		let (stop_tx, stop_rx) = mpsc::channel(1);

		inner
			.event_watcher
			.subscribe(
				log_tx,
				Arc::new(move |e| {
					let _ = error_tx.send(e);
				}),
			)
			.await?;
		if let Err(e) = inner.expiration_watcher.subscribe(expired_tx).await {
			let _ = inner.event_watcher.unsubscribe().await;
			return Err(e.into());
		}

		{
			let mut state = inner.state.lock().await;
			inner.restore_expirations(&state);
			state.callback = Some(callback);
		}
		tokio::spawn(Inner::run(
			inner.clone(),
			log_rx,
			expired_rx,
			error_rx,
			stop_rx,
		));

		info!("Order watcher subscribed");
		*subscription = Some(Subscription { stop_tx });
		Ok(())
	}

	/// Stops all polling and drops every cached chain value.
	pub async fn unsubscribe(&self) -> Result<(), WatcherError> {
		self.inner.unsubscribe().await
	}

	/// Lock-free snapshot of the watcher's size.
	pub fn get_stats(&self) -> WatcherStats {
		WatcherStats {
			order_count: self.inner.order_count.load(Ordering::SeqCst),
		}
	}
}

impl Inner {
	fn decode_asset(&self, data: &Bytes) -> Result<AssetData, WatcherError> {
		Ok(self.asset_decoder.decode(data)?)
	}

	/// Empty fee asset data stands for the fee token.
	fn decode_fee_asset(&self, data: &Bytes) -> Result<AssetData, WatcherError> {
		if data.is_empty() {
			return Ok(AssetData::Erc20 {
				token_address: self.config.fee_token,
			});
		}
		self.decode_asset(data)
	}

	fn remove_order_locked(&self, state: &mut WatcherState, order_hash: &OrderHash) {
		let Some(order) = state.orders.remove(order_hash) else {
			return;
		};
		state.dependencies.remove_order(&order);
		state.snapshots.remove(order_hash);
		state.store.fills.delete_filled_amount(order_hash);
		state.store.fills.delete_cancelled(order_hash);
		let maker = order.maker();
		let sender = order.signed_order.sender_address;
		let epoch_in_use = state
			.dependencies
			.get_orders_dependent_on_maker(maker)
			.iter()
			.filter_map(|hash| state.orders.get(hash))
			.any(|other| other.signed_order.sender_address == sender);
		if !epoch_in_use {
			state.store.fills.delete_order_epoch(maker, sender);
		}
		self.expiration_watcher.remove_order(order_hash);
		self.order_count.store(state.orders.len(), Ordering::SeqCst);
		debug!(order = %truncate_hash(order_hash), "Stopped watching order");
	}

	/// Re-indexes watched orders whose expiration was popped but never
	/// handled, such as a batch still queued when the consumer stopped.
	fn restore_expirations(&self, state: &WatcherState) {
		for (order_hash, order) in &state.orders {
			if !self.expiration_watcher.contains(order_hash) {
				debug!(order = %truncate_hash(order_hash), "Restoring expiration entry");
				self.expiration_watcher
					.add_order(*order_hash, order.signed_order.expiration_ms());
			}
		}
	}

	async fn unsubscribe(&self) -> Result<(), WatcherError> {
		let subscription = self
			.subscription
			.lock()
			.await
			.take()
			.ok_or(WatcherError::SubscriptionNotFound)?;
		let _ = subscription.stop_tx.try_send(());

		if let Err(e) = self.event_watcher.unsubscribe().await {
			warn!("Event watcher was not streaming: {}", e);
		}
		if let Err(e) = self.expiration_watcher.unsubscribe().await {
			warn!("Expiration watcher was not polling: {}", e);
		}

		let mut state = self.state.lock().await;
		state.callback = None;
		state.store.delete_all();
		self.restore_expirations(&state);
		info!("Order watcher unsubscribed");
		Ok(())
	}

	async fn run(
		self: Arc<Self>,
		mut log_rx: mpsc::UnboundedReceiver<Vec<LogEvent>>,
		mut expired_rx: mpsc::UnboundedReceiver<Vec<OrderHash>>,
		mut error_rx: mpsc::UnboundedReceiver<StreamError>,
		mut stop_rx: mpsc::Receiver<()>,
	) {
		let period = self.config.cleanup_job_interval;
		let mut cleanup = interval_at(Instant::now() + period, period);

		loop {
			let result = tokio::select! {
				biased;
				_ = stop_rx.recv() => break,
				Some(events) = log_rx.recv() => self.handle_log_events(events).await,
				Some(expired) = expired_rx.recv() => {
					self.handle_expired_orders(expired).await;
					Ok(())
				}
				Some(e) = error_rx.recv() => {
					self.emit_error(WatcherError::Stream(e)).await;
					Ok(())
				}
				_ = cleanup.tick() => self.cleanup().await,
			};

			if let Err(e) = result {
				error!("Order watcher failed, unsubscribing: {}", e);
				self.emit_error(e).await;
				if let Err(e) = self.unsubscribe().await {
					debug!("Already unsubscribed: {}", e);
				}
				break;
			}
		}
	}

	async fn emit_error(&self, error: WatcherError) {
		let state = self.state.lock().await;
		if let Some(callback) = &state.callback {
			callback(Err(error));
		}
	}

	/// Invalidates the state touched by each log, then revalidates every
	/// dependent order once.
	async fn handle_log_events(&self, events: Vec<LogEvent>) -> Result<(), WatcherError> {
		let mut state = self.state.lock().await;
		let mut dependents = BTreeSet::new();

		for event in &events {
			match state.decoder.decode(&event.log) {
				DecodedLog::Event(contract_event) => {
					debug!(removed = event.removed, ?contract_event, "Handling log");
					dependents.extend(invalidate(&mut state, &contract_event));
				}
				DecodedLog::Raw(log) => {
					debug!(
						address = %log.address,
						block = log.block_number,
						"Ignoring undecodable log"
					);
				}
			}
		}

		for order_hash in dependents {
			self.revalidate(&mut state, &order_hash).await?;
		}
		Ok(())
	}

	async fn handle_expired_orders(&self, expired: Vec<OrderHash>) {
		let mut state = self.state.lock().await;
		for order_hash in expired {
			if !state.orders.contains_key(&order_hash) {
				continue;
			}
			info!(order = %truncate_hash(&order_hash), "Order expired");
			emit_if_changed(
				&mut state,
				order_hash,
				OrderState::Invalid(OrderStateError::OrderFillExpired),
			);
			self.remove_order_locked(&mut state, &order_hash);
		}
	}

	/// Drops the cached state of every watched order and revalidates all of
	/// them.
	async fn cleanup(&self) -> Result<(), WatcherError> {
		let mut state = self.state.lock().await;
		let order_hashes: BTreeSet<OrderHash> = state.orders.keys().copied().collect();
		info!(orders = order_hashes.len(), "Running cleanup job");

		for order_hash in &order_hashes {
			let WatcherState { orders, store, .. } = &mut *state;
			let Some(order) = orders.get(order_hash) else {
				continue;
			};
			let maker = order.maker();
			for asset in order.maker_side_assets() {
				store.balances.delete_balance(maker, asset);
				store.balances.delete_proxy_allowance(maker, asset);
			}
			store.fills.delete_filled_amount(order_hash);
			store.fills.delete_cancelled(order_hash);
			store
				.fills
				.delete_order_epoch(maker, order.signed_order.sender_address);
		}

		for order_hash in &order_hashes {
			let WatcherState { orders, store, .. } = &mut *state;
			let Some(order) = orders.get(order_hash) else {
				continue;
			};
			let order_state = self
				.order_state_utils
				.get_order_state(order, store, self.clock.now_ms())
				.await?;
			self.apply_state(&mut state, *order_hash, order_state);
		}
		Ok(())
	}

	/// Recomputes one order's state. Fetch failures are reported to the
	/// callback without aborting the batch.
	async fn revalidate(
		&self,
		state: &mut WatcherState,
		order_hash: &OrderHash,
	) -> Result<(), WatcherError> {
		let WatcherState { orders, store, .. } = &mut *state;
		let order = orders.get(order_hash).ok_or_else(|| {
			WatcherError::Internal(format!(
				"dependency index references unknown order {}",
				order_hash
			))
		})?;

		match self
			.order_state_utils
			.get_order_state(order, store, self.clock.now_ms())
			.await
		{
			Ok(order_state) => self.apply_state(state, *order_hash, order_state),
			Err(e) => {
				warn!(order = %truncate_hash(order_hash), "Failed to revalidate order: {}", e);
				if let Some(callback) = &state.callback {
					callback(Err(WatcherError::State(e)));
				}
			}
		}
		Ok(())
	}

	fn apply_state(&self, state: &mut WatcherState, order_hash: OrderHash, order_state: OrderState) {
		let permanently_invalid = order_state.is_permanently_invalid();
		emit_if_changed(state, order_hash, order_state);
		if permanently_invalid {
			self.remove_order_locked(state, &order_hash);
		}
	}
}

/// Drops the cache entries an event affects and returns the orders
/// depending on them.
fn invalidate(state: &mut WatcherState, event: &ContractEvent) -> Vec<OrderHash> {
	let WatcherState {
		orders,
		dependencies,
		store,
		..
	} = state;

	match event {
		ContractEvent::Erc20Transfer {
			token, from, to, ..
		} => {
			let asset = AssetData::Erc20 {
				token_address: *token,
			};
			store.balances.delete_balance(*from, &asset);
			store.balances.delete_balance(*to, &asset);
			store.balances.delete_proxy_allowance(*from, &asset);
			let mut hashes = dependencies.get_orders_dependent_on_asset(*from, &asset);
			hashes.extend(dependencies.get_orders_dependent_on_asset(*to, &asset));
			hashes
		}
		ContractEvent::Erc20Approval { token, owner, .. } => {
			let asset = AssetData::Erc20 {
				token_address: *token,
			};
			store.balances.delete_proxy_allowance(*owner, &asset);
			dependencies.get_orders_dependent_on_asset(*owner, &asset)
		}
		ContractEvent::Erc721Transfer {
			token,
			from,
			to,
			token_id,
		} => {
			let asset = AssetData::Erc721 {
				token_address: *token,
				token_id: *token_id,
			};
			store.balances.delete_balance(*from, &asset);
			store.balances.delete_balance(*to, &asset);
			store.balances.delete_proxy_allowance(*from, &asset);
			let mut hashes = dependencies.get_orders_dependent_on_asset(*from, &asset);
			hashes.extend(dependencies.get_orders_dependent_on_asset(*to, &asset));
			hashes
		}
		ContractEvent::Erc721Approval {
			token,
			owner,
			token_id,
			..
		} => {
			let asset = AssetData::Erc721 {
				token_address: *token,
				token_id: *token_id,
			};
			store.balances.delete_proxy_allowance(*owner, &asset);
			dependencies.get_orders_dependent_on_asset(*owner, &asset)
		}
		ContractEvent::ApprovalForAll { token, owner, .. } => {
			store
				.balances
				.delete_proxy_allowances_for_token(*owner, *token);
			dependencies.get_orders_dependent_on_nft_contract(*owner, *token)
		}
		ContractEvent::Deposit { token, owner, .. }
		| ContractEvent::Withdrawal { token, owner, .. } => {
			let asset = AssetData::Erc20 {
				token_address: *token,
			};
			store.balances.delete_balance(*owner, &asset);
			dependencies.get_orders_dependent_on_asset(*owner, &asset)
		}
		ContractEvent::Fill { order_hash, .. } => {
			store.fills.delete_filled_amount(order_hash);
			watched(orders, order_hash)
		}
		ContractEvent::Cancel { order_hash, .. } => {
			store.fills.delete_cancelled(order_hash);
			watched(orders, order_hash)
		}
		ContractEvent::CancelUpTo { maker, sender, .. } => {
			store.fills.delete_order_epoch(*maker, *sender);
			dependencies.get_orders_dependent_on_maker(*maker)
		}
	}
}

fn watched(orders: &HashMap<OrderHash, WatchedOrder>, order_hash: &OrderHash) -> Vec<OrderHash> {
	if orders.contains_key(order_hash) {
		vec![*order_hash]
	} else {
		Vec::new()
	}
}

/// Delivers `order_state` unless it equals the last delivered state.
fn emit_if_changed(state: &mut WatcherState, order_hash: OrderHash, order_state: OrderState) {
	if state.snapshots.get(&order_hash) == Some(&order_state) {
		return;
	}
	debug!(order = %truncate_hash(&order_hash), ?order_state, "Order state changed");
	state.snapshots.insert(order_hash, order_state.clone());
	if let Some(callback) = &state.callback {
		callback(Ok(OrderStateChange {
			order_hash,
			state: order_state,
		}));
	}
}
