use std::fmt::Display;

use alloy::{
    dyn_abi,
    primitives::{Address, B256},
    transports,
};

use crate::{
    dispatch::DispatcherState,
    registry::FieldKind,
    types::{Category, LogContext},
};

/// Malformed or inconsistent interface schema, reported at registry load.
#[derive(Debug, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("invalid JSON ABI: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid event declaration: {0}")]
    Declaration(String),

    #[error("event {event} can not be resolved: {reason}")]
    Unresolvable { event: String, reason: String },

    #[error("event {event} declared twice in {category} schema")]
    DuplicateEvent { category: Category, event: String },

    #[error("category {0} is bound more than once")]
    DuplicateCategory(Category),

    #[error("category {0} is not bound")]
    MissingCategory(Category),

    #[error("contract {address} is bound to both {first} and {second}")]
    SharedAddress {
        address: Address,
        first: Category,
        second: Category,
    },

    #[error("{category} event {event} field {field} is {found}, expected {expected}")]
    FieldType {
        category: Category,
        event: String,
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },
}

/// Reason a log payload could not be decoded against the matched event.
#[derive(Debug, thiserror::Error)]
pub enum DecodeFailure {
    #[error("{0}")]
    Abi(#[from] dyn_abi::Error),

    #[error("field {field} decoded as {found}, declared {expected}")]
    FieldType {
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("decoded {found} values, declared {expected}")]
    FieldCount { expected: usize, found: usize },

    #[error("payload of {found} bytes is not the canonical {expected} byte encoding")]
    NonCanonical { expected: usize, found: usize },
}

/// Log matched a known event but its payload failed to decode.
#[derive(Debug, thiserror::Error)]
#[error("failed to decode {event} of {category} contract {} (topic {topic}): {reason}", .context.address)]
pub struct EventDecodeError {
    pub event: String,
    pub category: Category,
    pub topic: B256,
    pub context: LogContext,
    #[source]
    pub reason: DecodeFailure,
}

/// Error of the log source collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LogSourceError {
    #[error("failed to connect log source: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unexpected empty RPC response")]
    NullResp,

    #[error("transport error: {0}")]
    Transport(String),
}

/// Item of the dispatcher error stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Decode(#[from] EventDecodeError),

    #[error("log source failed: {0}")]
    Source(#[from] LogSourceError),
}

/// Error starting the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher can not be started from {0:?} state")]
    AlreadyStarted(DispatcherState),

    #[error(transparent)]
    Connect(LogSourceError),
}

impl<E: Display> From<transports::RpcError<E>> for LogSourceError {
    fn from(value: transports::RpcError<E>) -> Self {
        match value {
            transports::RpcError::ErrorResp(ref resp) => {
                let msg = resp.message.to_ascii_lowercase();
                if (resp.code == -32600 || resp.code == -32601 || resp.code == -32602)
                    && (msg.contains("invalid") || msg.contains("not found"))
                {
                    Self::InvalidRequest(msg)
                } else {
                    Self::Transport(value.to_string())
                }
            }
            transports::RpcError::NullResp => Self::NullResp,
            _ => Self::Transport(value.to_string()),
        }
    }
}

impl LogSourceError {
    /// Wraps any source error into a connection failure.
    pub fn into_connect(self) -> Self {
        match self {
            Self::Connect(_) => self,
            other => Self::Connect(other.to_string()),
        }
    }
}
