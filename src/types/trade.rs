use alloy::primitives::{Address, U256};
use serde::Serialize;

use super::{Category, EscrowId};

/// Trade lifecycle stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TradeStage {
    /// Escrow opened.
    Create,

    /// Counterparty agreed.
    Accept,

    /// Escrow cancelled.
    Reject,
}

/// Normalized trade lifecycle event.
///
/// Amounts mean a quantity for the fungible side of the pair and a token
/// index for the non-fungible side, see [`Category::x_kind`] and
/// [`Category::y_kind`]. Fields the originating event does not carry stay
/// zero; consumers merge `Accept`/`Reject` events into the `Create` event of
/// the same escrow and category.
#[derive(Clone, derive_more::Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub stage: TradeStage,

    #[debug("{escrow_id}")]
    #[serde(serialize_with = "super::serialize_display")]
    pub escrow_id: EscrowId,

    pub category: Category,

    #[serde(serialize_with = "super::serialize_display")]
    pub x_asset: Address,

    #[serde(serialize_with = "super::serialize_display")]
    pub y_asset: Address,

    #[debug("{x_amount}")]
    #[serde(serialize_with = "super::serialize_display")]
    pub x_amount: U256,

    #[debug("{y_amount}")]
    #[serde(serialize_with = "super::serialize_display")]
    pub y_amount: U256,

    #[serde(serialize_with = "super::serialize_display")]
    pub x_address: Address,

    #[serde(serialize_with = "super::serialize_display")]
    pub y_address: Address,
}

impl TradeEvent {
    /// Event of the given stage with every other field at its zero value.
    pub fn empty(stage: TradeStage, category: Category) -> Self {
        Self {
            stage,
            escrow_id: EscrowId::ZERO,
            category,
            x_asset: Address::ZERO,
            y_asset: Address::ZERO,
            x_amount: U256::ZERO,
            y_amount: U256::ZERO,
            x_address: Address::ZERO,
            y_address: Address::ZERO,
        }
    }
}
