//! Computed fillability state of a watched order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{OrderHash, U256};

/// Chain state that makes an order fillable, as of the last revalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRelevantState {
	pub maker_balance: U256,
	pub maker_proxy_allowance: U256,
	pub maker_fee_balance: U256,
	pub maker_fee_proxy_allowance: U256,
	pub filled_taker_asset_amount: U256,
	pub remaining_fillable_maker_asset_amount: U256,
	pub remaining_fillable_taker_asset_amount: U256,
}

/// Reason an order cannot currently be filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum OrderStateError {
	#[error("order has expired")]
	OrderFillExpired,
	#[error("order has been cancelled")]
	OrderCancelled,
	#[error("order has been fully filled")]
	OrderRemainingFillAmountZero,
	#[error("maker balance is insufficient")]
	InsufficientMakerBalance,
	#[error("maker proxy allowance is insufficient")]
	InsufficientMakerAllowance,
	#[error("maker fee balance is insufficient")]
	InsufficientMakerFeeBalance,
	#[error("maker fee proxy allowance is insufficient")]
	InsufficientMakerFeeAllowance,
	#[error("remaining fill amount would incur a rounding error")]
	OrderFillRoundingError,
}

impl OrderStateError {
	/// Whether no future chain state can make the order fillable again.
	pub fn is_permanent(&self) -> bool {
		matches!(
			self,
			OrderStateError::OrderFillExpired
				| OrderStateError::OrderCancelled
				| OrderStateError::OrderRemainingFillAmountZero
		)
	}
}

/// Verdict of the last revalidation of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum OrderState {
	Valid(OrderRelevantState),
	Invalid(OrderStateError),
}

impl OrderState {
	pub fn is_valid(&self) -> bool {
		matches!(self, OrderState::Valid(_))
	}

	pub fn is_permanently_invalid(&self) -> bool {
		match self {
			OrderState::Valid(_) => false,
			OrderState::Invalid(reason) => reason.is_permanent(),
		}
	}
}

/// Notification delivered to subscribers when an order's state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStateChange {
	pub order_hash: OrderHash,
	pub state: OrderState,
}
