//! Dispatcher driving logs from a [`crate::source::LogSource`] through
//! decoding and classification.
//!
//! # Architecture
//!
//! The module separates pure processing logic from async I/O:
//!
//! - [`Pipeline`] - Pure, synchronous decode + classify of raw logs
//! - [`Dispatcher`] - `Idle → Running → Stopped` state machine owning the
//!   single dispatch task
//! - [`TradeReceiver`], [`ErrorReceiver`] - the two output streams
//!
//! Trade events are published in the order their logs were received. Both
//! output channels hold a single item, so a slow consumer stalls the
//! dispatcher; cancellation interrupts a stalled publish.
//!
//! # Example
//!
//! ```ignore
//! use escrow_events::{dispatch::Dispatcher, source::RpcLogSource};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut dispatcher = Dispatcher::new(registry, RpcLogSource::new(provider), from_block);
//! let cancel = CancellationToken::new();
//! let mut outputs = dispatcher.start(cancel.clone()).await?;
//!
//! while let Some(trade) = outputs.trades.recv().await {
//!     let event = trade.event();
//!     println!("{:?} escrow {} on {}", event.stage, event.escrow_id, event.category);
//! }
//!
//! outputs.handle.await?;
//! ```

mod dispatcher;
mod pipeline;
mod types;

pub use dispatcher::{BATCH_CHANNEL_SIZE, Dispatcher, OUTPUT_CHANNEL_SIZE};
pub use pipeline::{Pipeline, TradeRecord};
pub use types::{DispatchOutputs, DispatcherState, ErrorReceiver, TradeReceiver};
