//! Log source collaborator.
//!
//! [`LogSource`] is what the dispatcher subscribes to: a check to establish
//! connectivity and a long-running `sync` pushing [`LogBatch`]es into a
//! channel until cancelled. [`RpcLogSource`] implements it on top of an
//! alloy [`Provider`] by polling `eth_getLogs`.

use std::{future::Future, time::Duration};

use alloy::{primitives::Address, providers::Provider, rpc::types::Filter};
use futures::{Stream, StreamExt, stream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{error::LogSourceError, types::LogBatch};

/// Default number of blocks requested by a single `eth_getLogs` call.
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 1000;

/// Contracts and starting block a subscription is scoped to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    addresses: Vec<Address>,
    from_block: u64,
}

/// Source of contract logs, delivered in chain order.
pub trait LogSource: Send + 'static {
    /// Establishes the subscription endpoint is reachable.
    fn connect(&self) -> impl Future<Output = Result<(), LogSourceError>> + Send;

    /// Delivers batches of logs matching the filter until `cancel` fires or
    /// the receiving side of `batches` is dropped.
    fn sync(
        self,
        filter: LogFilter,
        batches: mpsc::Sender<LogBatch>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), LogSourceError>> + Send;
}

/// Polling log source backed by an alloy [`Provider`].
///
/// Retrying is up to the provider; it is recommended to setup one with
/// [`alloy::transports::layers::RetryBackoffLayer`]. Failed polls are logged
/// and repeated after the provider's poll interval.
#[derive(Clone, Debug)]
pub struct RpcLogSource<P> {
    provider: P,
    max_block_range: u64,
}

impl LogFilter {
    pub fn new(addresses: Vec<Address>, from_block: u64) -> Self {
        Self {
            addresses,
            from_block,
        }
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn from_block(&self) -> u64 {
        self.from_block
    }
}

impl<P> RpcLogSource<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
        }
    }

    pub fn with_max_block_range(mut self, blocks: u64) -> Self {
        self.max_block_range = blocks.max(1);
        self
    }
}

impl<P> LogSource for RpcLogSource<P>
where
    P: Provider + Send + Sync + 'static,
{
    async fn connect(&self) -> Result<(), LogSourceError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| LogSourceError::from(e).into_connect())?;
        debug!(head, "log source connected");
        Ok(())
    }

    async fn sync(
        self,
        filter: LogFilter,
        batches: mpsc::Sender<LogBatch>,
        cancel: CancellationToken,
    ) -> Result<(), LogSourceError> {
        let poll_interval = self.provider.client().poll_interval();
        let stream = raw(self.provider, filter, self.max_block_range, tokio::time::sleep);
        futures::pin_mut!(stream);

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = stream.next() => next,
            };
            match next {
                None => return Ok(()),
                Some(Ok(batch)) if batch.is_empty() => continue,
                Some(Ok(batch)) => {
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        sent = batches.send(batch) => sent,
                    };
                    if sent.is_err() {
                        // Receiver dropped, graceful shutdown
                        return Ok(());
                    }
                }
                Some(Err(e)) => {
                    warn!(%e, "log polling failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }
    }
}

/// Returns stream of log batches emitted by the filtered contracts, one batch
/// per polled block range, starting from the filter's starting block.
///
/// Polls logs via the given [`Provider`] to produce strictly continuous
/// block ranges, waiting for [`Provider`]-configured interval at the chain tip.
/// A failed poll yields an error and is repeated for the same range on the
/// next item.
pub fn raw<P, S, SFut>(
    provider: P,
    filter: LogFilter,
    max_block_range: u64,
    sleep: S,
) -> impl Stream<Item = Result<LogBatch, LogSourceError>>
where
    P: Provider,
    S: Fn(Duration) -> SFut + Copy,
    SFut: Future<Output = ()>,
{
    let max_block_range = max_block_range.max(1);
    stream::unfold(
        (provider, filter.from_block),
        move |(provider, from_block)| {
            let addresses = filter.addresses.clone();
            async move {
                loop {
                    let head = match provider.get_block_number().await {
                        Ok(head) => head,
                        Err(e) => return Some((Err(e.into()), (provider, from_block))),
                    };
                    if head < from_block {
                        // Block is not available yet
                        sleep(provider.client().poll_interval()).await;
                        continue;
                    }

                    let to_block = head.min(from_block.saturating_add(max_block_range - 1));
                    let rpc_filter = Filter::new()
                        .address(addresses.clone())
                        .from_block(from_block)
                        .to_block(to_block);
                    return match provider.get_logs(&rpc_filter).await {
                        Ok(logs) => {
                            debug!(from_block, to_block, logs = logs.len(), "polled logs");
                            Some((Ok(LogBatch::from_rpc_logs(logs)), (provider, to_block + 1)))
                        }
                        Err(e) => Some((Err(e.into()), (provider, from_block))),
                    };
                }
            }
        },
    )
}
