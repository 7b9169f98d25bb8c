//! Escrow swap event engine.
//!
//! # Overview
//!
//! Turns raw logs of the four escrow swap contracts into normalized trade
//! lifecycle events. Every asset pair category ([`types::Category`]) has its
//! own escrow contract and event interface:
//!
//! | Category | `x` side | `y` side |
//! |---|---|---|
//! | `FF` | fungible amount | fungible amount |
//! | `FN` | fungible amount | token index |
//! | `NF` | token index | fungible amount |
//! | `NN` | token index | token index |
//!
//! Use [`registry::Registry::load`] to bind the categories to their contract
//! addresses and event schemas, then [`dispatch::Dispatcher`] to subscribe to
//! a [`source::LogSource`] and receive [`types::TradeEvent`]s along with
//! decoding errors. [`dispatch::Pipeline`] exposes the same processing as a
//! pure function of a single log.
//!
//! See `./tests` for examples.
//!
//! # Limitations/follow-ups
//!
//! * Logs removed by chain reorganizations are reported by the log source
//!   but not reverted, consumers keep whatever they ingested.
//!
//! * `EscrowRejected` of the deployed contracts carries no escrow index, so
//!   rejections can not be correlated to a trade unless the schema declares
//!   `escrowIndex`.
//!
//! # Testing
//!
//! [`testing`] module provides synthetic escrow contract interfaces, log
//! encoders and an in-memory log source.

pub mod classify;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod source;
pub mod testing;
pub mod types;
