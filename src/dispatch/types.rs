//! Dispatcher data structures.

use tokio::{sync::mpsc, task::JoinHandle};

use super::TradeRecord;
use crate::error::StreamError;

/// Lifecycle of a [`super::Dispatcher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    /// Created, not subscribed to the log source yet.
    Idle,

    /// Consuming log batches.
    Running,

    /// Cancelled or ran out of logs, can not be restarted.
    Stopped,
}

/// Receiver for trade events.
#[derive(Debug)]
pub struct TradeReceiver {
    inner: mpsc::Receiver<TradeRecord>,
}

/// Receiver for decode and log source errors.
#[derive(Debug)]
pub struct ErrorReceiver {
    inner: mpsc::Receiver<StreamError>,
}

/// Output streams of a started dispatcher along with its task handle.
#[derive(Debug)]
pub struct DispatchOutputs {
    pub trades: TradeReceiver,
    pub errors: ErrorReceiver,
    pub handle: JoinHandle<()>,
}

impl TradeReceiver {
    pub(crate) fn new(inner: mpsc::Receiver<TradeRecord>) -> Self {
        Self { inner }
    }

    /// Receives the next trade event, or `None` once the dispatcher stopped.
    pub async fn recv(&mut self) -> Option<TradeRecord> {
        self.inner.recv().await
    }
}

impl ErrorReceiver {
    pub(crate) fn new(inner: mpsc::Receiver<StreamError>) -> Self {
        Self { inner }
    }

    /// Receives the next error, or `None` once the dispatcher stopped.
    pub async fn recv(&mut self) -> Option<StreamError> {
        self.inner.recv().await
    }
}
