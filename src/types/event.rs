use alloy::primitives::{Address, TxHash};
use serde::Serialize;

/// Position of a log in chain history, as far as the log source knows it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LogContext {
    /// Contract the log was emitted by.
    #[serde(serialize_with = "super::serialize_display")]
    pub address: Address,

    pub block_number: Option<u64>,

    #[serde(serialize_with = "super::serialize_display_opt")]
    pub tx_hash: Option<TxHash>,

    pub log_index: Option<u64>,
}

/// Event along with the context of the log it was produced from.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EventContext<T> {
    pub(crate) context: LogContext,
    #[serde(flatten)]
    pub(crate) event: T,
}

impl LogContext {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }
}

impl<T> EventContext<T> {
    pub fn new(context: LogContext, event: T) -> Self {
        Self { context, event }
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn event(&self) -> &T {
        &self.event
    }

    pub fn into_event(self) -> T {
        self.event
    }
}
