mod category;
mod event;
mod log;
mod trade;

pub use category::{AssetKind, Category};
pub use event::{EventContext, LogContext};
pub use log::{LogBatch, LogRecord};
pub use trade::{TradeEvent, TradeStage};

use std::fmt::Display;

use serde::Serializer;

/// On-chain escrow index, unique within a single escrow contract.
pub type EscrowId = alloy::primitives::U256;

/// Serializes a value by its [`Display`] form, so that integers come out
/// as decimal strings and addresses as checksummed hex.
pub(crate) fn serialize_display<T: Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub(crate) fn serialize_display_opt<T: Display, S: Serializer>(
    value: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.collect_str(value),
        None => serializer.serialize_none(),
    }
}
