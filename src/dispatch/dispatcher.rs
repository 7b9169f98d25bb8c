//! Dispatcher implementation.

use std::{ops::ControlFlow, sync::Arc};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DispatchOutputs, DispatcherState, ErrorReceiver, Pipeline, TradeReceiver, TradeRecord};
use crate::{
    error::{DispatchError, LogSourceError, StreamError},
    registry::Registry,
    source::LogSource,
    types::LogBatch,
};

/// Number of log batches buffered between the log source and the dispatcher.
pub const BATCH_CHANNEL_SIZE: usize = 16;

/// Capacity of the trade and error output channels.
///
/// Tokio channels can not be unbuffered, a single slot is the closest.
pub const OUTPUT_CHANNEL_SIZE: usize = 1;

/// Drives logs of a [`LogSource`] through the [`Pipeline`] on a single task.
pub struct Dispatcher<S> {
    pipeline: Arc<Pipeline>,
    source: Option<S>,
    from_block: u64,
    state: Arc<watch::Sender<DispatcherState>>,
}

/// Publishing side of the output streams.
struct Publisher {
    trades: mpsc::Sender<TradeRecord>,
    errors: Option<mpsc::Sender<StreamError>>,
    cancel: CancellationToken,
}

impl<S: LogSource> Dispatcher<S> {
    pub fn new(registry: Arc<Registry>, source: S, from_block: u64) -> Self {
        let (state, _) = watch::channel(DispatcherState::Idle);
        Self {
            pipeline: Arc::new(Pipeline::new(registry)),
            source: Some(source),
            from_block,
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Receiver of state transitions.
    pub fn watch_state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    /// Connects the log source and spawns the dispatch task.
    ///
    /// The dispatcher stays [`DispatcherState::Idle`] if the log source can not
    /// be connected. Once `cancel` fires, the log source subscription is
    /// stopped and any in-flight publish is abandoned.
    pub async fn start(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<DispatchOutputs, DispatchError> {
        let state = self.state();
        let Some(source) = self.source.as_ref().filter(|_| state == DispatcherState::Idle) else {
            return Err(DispatchError::AlreadyStarted(state));
        };
        source.connect().await.map_err(DispatchError::Connect)?;
        let Some(source) = self.source.take() else {
            return Err(DispatchError::AlreadyStarted(state));
        };

        let filter = self.pipeline.registry().filter(self.from_block);
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_SIZE);
        let (trade_tx, trade_rx) = mpsc::channel(OUTPUT_CHANNEL_SIZE);
        let (error_tx, error_rx) = mpsc::channel(OUTPUT_CHANNEL_SIZE);

        let source_cancel = cancel.child_token();
        info!(
            from_block = filter.from_block(),
            contracts = filter.addresses().len(),
            "subscribing to escrow logs"
        );
        let source_handle = tokio::spawn(source.sync(filter, batch_tx, source_cancel.clone()));

        self.state.send_replace(DispatcherState::Running);
        let publisher = Publisher {
            trades: trade_tx,
            errors: Some(error_tx),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(run_dispatch(
            self.pipeline.clone(),
            batch_rx,
            source_handle,
            source_cancel,
            publisher,
            self.state.clone(),
        ));

        Ok(DispatchOutputs {
            trades: TradeReceiver::new(trade_rx),
            errors: ErrorReceiver::new(error_rx),
            handle,
        })
    }
}

async fn run_dispatch(
    pipeline: Arc<Pipeline>,
    mut batches: mpsc::Receiver<LogBatch>,
    source: JoinHandle<Result<(), LogSourceError>>,
    source_cancel: CancellationToken,
    mut publisher: Publisher,
    state: Arc<watch::Sender<DispatcherState>>,
) {
    let mut source_result = None;
    loop {
        let batch = tokio::select! {
            biased;
            _ = publisher.cancel.cancelled() => break,
            batch = batches.recv() => batch,
        };
        let Some(batch) = batch else {
            // Log source is done, nothing more to dispatch
            source_result = Some(source.await);
            break;
        };
        if publisher.publish_batch(&pipeline, &batch).await.is_break() {
            break;
        }
    }

    source_cancel.cancel();
    drop(batches);
    match source_result {
        Some(Ok(Ok(()))) => {}
        Some(Ok(Err(e))) => {
            _ = publisher.error(e.into()).await;
        }
        Some(Err(e)) => warn!(%e, "log source task failed"),
        None => {}
    }

    state.send_replace(DispatcherState::Stopped);
    info!("dispatcher stopped");
}

impl Publisher {
    async fn publish_batch(&mut self, pipeline: &Pipeline, batch: &LogBatch) -> ControlFlow<()> {
        if !batch.removed.is_empty() {
            warn!(removed = batch.removed.len(), "removed logs are not reverted");
        }
        for log in &batch.added {
            for outcome in pipeline.process_log(log) {
                let flow = match outcome {
                    Ok(trade) => {
                        debug!(
                            stage = ?trade.event().stage,
                            category = %trade.event().category,
                            escrow_id = %trade.event().escrow_id,
                            "trade event"
                        );
                        self.trade(trade).await
                    }
                    Err(e) => self.error(e.into()).await,
                };
                if flow.is_break() {
                    return flow;
                }
            }
        }
        ControlFlow::Continue(())
    }

    async fn trade(&mut self, trade: TradeRecord) -> ControlFlow<()> {
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return ControlFlow::Break(()),
            sent = self.trades.send(trade) => sent,
        };
        if sent.is_err() {
            // Receiver dropped, graceful shutdown
            info!("trade receiver dropped");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    async fn error(&mut self, err: StreamError) -> ControlFlow<()> {
        let Some(errors) = &self.errors else {
            warn!(%err, "dispatch error");
            return ControlFlow::Continue(());
        };
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return ControlFlow::Break(()),
            sent = errors.send(err) => sent,
        };
        if let Err(mpsc::error::SendError(err)) = sent {
            warn!(%err, "error receiver dropped, logging errors instead");
            self.errors = None;
        }
        ControlFlow::Continue(())
    }
}
