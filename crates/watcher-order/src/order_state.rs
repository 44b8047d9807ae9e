//! Fillability computation.
//!
//! Checks run in a fixed order and the first failing check decides the
//! verdict: cancellation, expiry, remaining amount, maker funds and
//! approvals, then rounding.

use tracing::debug;
use watcher_state::{LazyStateStore, StateError};
use watcher_types::{
	truncate_hash, OrderRelevantState, OrderState, OrderStateError, WatchedOrder, U256,
};

/// Computes [`OrderState`]s from the lazy state store.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderStateUtils {
	expiration_margin_ms: u64,
}

impl OrderStateUtils {
	pub fn new(expiration_margin_ms: u64) -> Self {
		Self {
			expiration_margin_ms,
		}
	}

	pub async fn get_order_state(
		&self,
		order: &WatchedOrder,
		store: &mut LazyStateStore,
		now_ms: u64,
	) -> Result<OrderState, StateError> {
		let signed = &order.signed_order;
		let maker = signed.maker_address;

		let cancelled = store.fills.is_cancelled(order.hash).await?;
		let epoch = store
			.fills
			.get_order_epoch(maker, signed.sender_address)
			.await?;
		if cancelled || signed.salt < epoch {
			return Ok(invalid(OrderStateError::OrderCancelled));
		}

		if signed.expiration_ms() <= now_ms.saturating_add(self.expiration_margin_ms) {
			return Ok(invalid(OrderStateError::OrderFillExpired));
		}

		let filled = store.fills.get_filled_amount(order.hash).await?;
		let remaining_taker = signed.taker_asset_amount.saturating_sub(filled);
		if remaining_taker.is_zero() || signed.maker_asset_amount.is_zero() {
			return Ok(invalid(OrderStateError::OrderRemainingFillAmountZero));
		}

		let maker_balance = store.balances.get_balance(maker, &order.maker_asset).await?;
		let maker_proxy_allowance = store
			.balances
			.get_proxy_allowance(maker, &order.maker_asset)
			.await?;
		let maker_fee_balance = store
			.balances
			.get_balance(maker, &order.maker_fee_asset)
			.await?;
		let maker_fee_proxy_allowance = store
			.balances
			.get_proxy_allowance(maker, &order.maker_fee_asset)
			.await?;

		if maker_balance.is_zero() {
			return Ok(invalid(OrderStateError::InsufficientMakerBalance));
		}
		if maker_proxy_allowance.is_zero() {
			return Ok(invalid(OrderStateError::InsufficientMakerAllowance));
		}
		let has_maker_fee = !signed.maker_fee.is_zero();
		if has_maker_fee && maker_fee_balance.is_zero() {
			return Ok(invalid(OrderStateError::InsufficientMakerFeeBalance));
		}
		if has_maker_fee && maker_fee_proxy_allowance.is_zero() {
			return Ok(invalid(OrderStateError::InsufficientMakerFeeAllowance));
		}

		let transferable_maker = maker_balance.min(maker_proxy_allowance);
		let transferable_fee = maker_fee_balance.min(maker_fee_proxy_allowance);
		let fillable = fillable_amounts(order, remaining_taker, transferable_maker, transferable_fee);
		let (fillable_maker, fillable_taker) = match fillable {
			Some((maker_amount, taker_amount))
				if !taker_amount.is_zero()
					&& !is_rounding_error_floor(
						taker_amount,
						signed.taker_asset_amount,
						signed.maker_asset_amount,
					) =>
			{
				(maker_amount, taker_amount)
			}
			_ => return Ok(invalid(OrderStateError::OrderFillRoundingError)),
		};

		debug!(
			order = %truncate_hash(&order.hash),
			%fillable_maker,
			%fillable_taker,
			"Order is fillable"
		);
		Ok(OrderState::Valid(OrderRelevantState {
			maker_balance,
			maker_proxy_allowance,
			maker_fee_balance,
			maker_fee_proxy_allowance,
			filled_taker_asset_amount: filled,
			remaining_fillable_maker_asset_amount: fillable_maker,
			remaining_fillable_taker_asset_amount: fillable_taker,
		}))
	}
}

fn invalid(reason: OrderStateError) -> OrderState {
	OrderState::Invalid(reason)
}

/// Maker and taker amounts fillable right now. `None` when an intermediate
/// product overflows.
fn fillable_amounts(
	order: &WatchedOrder,
	remaining_taker: U256,
	transferable_maker: U256,
	transferable_fee: U256,
) -> Option<(U256, U256)> {
	let signed = &order.signed_order;
	let remaining_maker = partial_amount_floor(
		remaining_taker,
		signed.taker_asset_amount,
		signed.maker_asset_amount,
	)?;

	let fillable_maker = if signed.maker_fee.is_zero() {
		remaining_maker.min(transferable_maker)
	} else if order.maker_asset == order.maker_fee_asset {
		// Fee and asset drawn from the same balance
		let per_unit = signed.maker_asset_amount.checked_add(signed.maker_fee)?;
		let affordable =
			partial_amount_floor(transferable_maker, per_unit, signed.maker_asset_amount)?;
		remaining_maker.min(affordable)
	} else {
		let fee_bound =
			partial_amount_floor(transferable_fee, signed.maker_fee, signed.maker_asset_amount)?;
		remaining_maker.min(transferable_maker).min(fee_bound)
	};
	let fillable_taker = partial_amount_floor(
		fillable_maker,
		signed.maker_asset_amount,
		signed.taker_asset_amount,
	)?;
	Some((fillable_maker, fillable_taker))
}

/// `numerator * target / denominator`, rounded down. Zero when `denominator`
/// is zero, `None` when the product overflows.
fn partial_amount_floor(numerator: U256, denominator: U256, target: U256) -> Option<U256> {
	if denominator.is_zero() {
		return Some(U256::ZERO);
	}
	Some(numerator.checked_mul(target)? / denominator)
}

/// Whether flooring `numerator * target / denominator` loses 0.1% or more.
/// An overflowing product counts as a rounding error.
fn is_rounding_error_floor(numerator: U256, denominator: U256, target: U256) -> bool {
	if denominator.is_zero() || numerator.is_zero() || target.is_zero() {
		return false;
	}
	let Some(product) = numerator.checked_mul(target) else {
		return true;
	};
	let remainder = product % denominator;
	remainder
		.checked_mul(U256::from(1000))
		.map_or(true, |scaled| scaled >= product)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{erc20, watched_order};
	use std::sync::Arc;
	use watcher_state::StateFetcher;
	use watcher_types::{Address, AssetData, OrderHash};

	/// Fetcher answering every read from fixed values.
	#[derive(Default)]
	struct FixedFetcher {
		balance: U256,
		allowance: U256,
		filled: U256,
		cancelled: bool,
		epoch: U256,
	}

	#[async_trait::async_trait]
	impl StateFetcher for FixedFetcher {
		async fn fetch_balance(&self, _: Address, _: &AssetData) -> Result<U256, StateError> {
			Ok(self.balance)
		}

		async fn fetch_proxy_allowance(
			&self,
			_: Address,
			_: &AssetData,
		) -> Result<U256, StateError> {
			Ok(self.allowance)
		}

		async fn fetch_filled_amount(&self, _: OrderHash) -> Result<U256, StateError> {
			Ok(self.filled)
		}

		async fn fetch_is_cancelled(&self, _: OrderHash) -> Result<bool, StateError> {
			Ok(self.cancelled)
		}

		async fn fetch_order_epoch(&self, _: Address, _: Address) -> Result<U256, StateError> {
			Ok(self.epoch)
		}
	}

	fn funded() -> FixedFetcher {
		FixedFetcher {
			balance: U256::from(1_000),
			allowance: U256::from(1_000),
			..Default::default()
		}
	}

	async fn state_of(fetcher: FixedFetcher, order: &WatchedOrder, now_ms: u64) -> OrderState {
		let mut store = LazyStateStore::new(Arc::new(fetcher));
		OrderStateUtils::new(0)
			.get_order_state(order, &mut store, now_ms)
			.await
			.unwrap()
	}

	fn order() -> WatchedOrder {
		// 100 maker units for 200 taker units
		watched_order(0xa1, Address::repeat_byte(1), erc20(2), erc20(3))
	}

	#[tokio::test]
	async fn test_valid_order_reports_fillable_amounts() {
		let state = state_of(
			FixedFetcher {
				filled: U256::from(50),
				..funded()
			},
			&order(),
			0,
		)
		.await;

		let relevant = match state {
			OrderState::Valid(relevant) => relevant,
			other => panic!("expected a valid order, got {:?}", other),
		};
		assert_eq!(relevant.filled_taker_asset_amount, U256::from(50));
		assert_eq!(relevant.remaining_fillable_maker_asset_amount, U256::from(75));
		assert_eq!(relevant.remaining_fillable_taker_asset_amount, U256::from(150));
	}

	#[tokio::test]
	async fn test_fillable_amount_bounded_by_balance() {
		let state = state_of(
			FixedFetcher {
				balance: U256::from(10),
				..funded()
			},
			&order(),
			0,
		)
		.await;

		let relevant = match state {
			OrderState::Valid(relevant) => relevant,
			other => panic!("expected a valid order, got {:?}", other),
		};
		assert_eq!(relevant.remaining_fillable_maker_asset_amount, U256::from(10));
		assert_eq!(relevant.remaining_fillable_taker_asset_amount, U256::from(20));
	}

	#[tokio::test]
	async fn test_cancellation_precedes_other_checks() {
		let cancelled = FixedFetcher {
			cancelled: true,
			filled: U256::from(200),
			..Default::default()
		};
		assert_eq!(
			state_of(cancelled, &order(), u64::MAX).await,
			OrderState::Invalid(OrderStateError::OrderCancelled)
		);

		// Salt 1 is below epoch 2
		let below_epoch = FixedFetcher {
			epoch: U256::from(2),
			..funded()
		};
		assert_eq!(
			state_of(below_epoch, &order(), 0).await,
			OrderState::Invalid(OrderStateError::OrderCancelled)
		);
	}

	#[tokio::test]
	async fn test_expired_and_fully_filled() {
		let order = order();
		assert_eq!(
			state_of(funded(), &order, order.signed_order.expiration_ms()).await,
			OrderState::Invalid(OrderStateError::OrderFillExpired)
		);

		let filled = FixedFetcher {
			filled: U256::from(200),
			..funded()
		};
		assert_eq!(
			state_of(filled, &order, 0).await,
			OrderState::Invalid(OrderStateError::OrderRemainingFillAmountZero)
		);
	}

	#[tokio::test]
	async fn test_unfunded_maker() {
		assert_eq!(
			state_of(
				FixedFetcher {
					balance: U256::ZERO,
					..funded()
				},
				&order(),
				0
			)
			.await,
			OrderState::Invalid(OrderStateError::InsufficientMakerBalance)
		);
		assert_eq!(
			state_of(
				FixedFetcher {
					allowance: U256::ZERO,
					..funded()
				},
				&order(),
				0
			)
			.await,
			OrderState::Invalid(OrderStateError::InsufficientMakerAllowance)
		);
	}

	#[tokio::test]
	async fn test_rounding_error() {
		// 3 maker units for 7 taker units; filling 1 maker unit is 2.33 taker
		let mut order = order();
		order.signed_order.maker_asset_amount = U256::from(3);
		order.signed_order.taker_asset_amount = U256::from(7);

		let state = state_of(
			FixedFetcher {
				balance: U256::from(1),
				..funded()
			},
			&order,
			0,
		)
		.await;
		assert_eq!(
			state,
			OrderState::Invalid(OrderStateError::OrderFillRoundingError)
		);
	}

	#[tokio::test]
	async fn test_overflowing_amounts_are_rounding_errors() {
		let mut order = order();
		order.signed_order.maker_asset_amount = U256::MAX >> 1usize;
		order.signed_order.taker_asset_amount = U256::MAX;

		let state = state_of(
			FixedFetcher {
				balance: U256::MAX,
				allowance: U256::MAX,
				..Default::default()
			},
			&order,
			0,
		)
		.await;
		assert_eq!(
			state,
			OrderState::Invalid(OrderStateError::OrderFillRoundingError)
		);
	}

	#[test]
	fn test_partial_amount_floor_overflow() {
		assert_eq!(
			partial_amount_floor(U256::from(7), U256::from(2), U256::from(3)),
			Some(U256::from(10))
		);
		assert_eq!(
			partial_amount_floor(U256::from(7), U256::ZERO, U256::from(3)),
			Some(U256::ZERO)
		);
		assert_eq!(
			partial_amount_floor(U256::MAX, U256::from(2), U256::from(2)),
			None
		);
		assert!(is_rounding_error_floor(U256::MAX, U256::MAX, U256::from(2)));
	}

	#[test]
	fn test_rounding_error_floor() {
		assert!(!is_rounding_error_floor(
			U256::from(20),
			U256::from(20),
			U256::from(10)
		));
		// 1 * 3 / 7 floors 0.43 to 0
		assert!(is_rounding_error_floor(
			U256::from(1),
			U256::from(7),
			U256::from(3)
		));
		assert!(!is_rounding_error_floor(U256::ZERO, U256::from(7), U256::from(3)));
	}
}
