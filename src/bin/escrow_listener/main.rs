//! Escrow listener.
//!
//! Subscribes to the four escrow swap contracts and prints their trade
//! lifecycle events until interrupted.

mod config;
mod error;

use std::{process::exit, sync::Arc};

use alloy::{
    providers::ProviderBuilder, rpc::client::RpcClient, transports::layers::RetryBackoffLayer,
};
use clap::Parser;
use escrow_events::{
    dispatch::{DispatchOutputs, Dispatcher, TradeRecord},
    registry::Registry,
    source::RpcLogSource,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

use config::{CliConfig, EnvConfig};
use error::Result;

#[tokio::main]
async fn main() {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    // Parse environment configuration
    let env_config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to parse environment configuration: {}", e);
            exit(1);
        }
    };

    // Parse CLI arguments
    let cli_config = CliConfig::parse();

    // Set up logging
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(env_config, cli_config).await {
        error!(%e, "Escrow listener encountered an error, shutting down");
        exit(1);
    }
}

async fn run(env_config: EnvConfig, cli_config: CliConfig) -> Result<()> {
    let registry = Arc::new(Registry::load(env_config.bindings()?)?);

    let node_url = Url::parse(&env_config.node_rpc_url)?;
    let client = RpcClient::builder()
        .layer(RetryBackoffLayer::new(10, 100, 200))
        .http(node_url);
    client.set_poll_interval(env_config.poll_interval());
    let provider = ProviderBuilder::new().connect_client(client);

    let from_block = cli_config.from_block(&env_config);
    let mut dispatcher = Dispatcher::new(registry, RpcLogSource::new(provider), from_block);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping");
            }
            cancel.cancel();
        }
    });

    let DispatchOutputs {
        mut trades,
        mut errors,
        handle,
    } = dispatcher.start(cancel).await?;
    info!(from_block, "Listening for escrow events");

    let (mut trades_open, mut errors_open) = (true, true);
    while trades_open || errors_open {
        tokio::select! {
            trade = trades.recv(), if trades_open => match trade {
                Some(trade) if cli_config.json => println!("{}", json_line(&trade)?),
                Some(trade) => info!(
                    stage = ?trade.event().stage,
                    category = %trade.event().category,
                    trade_type = %trade.event().category.trade_type(),
                    escrow_id = %trade.event().escrow_id,
                    block = ?trade.context().block_number,
                    "{:?}",
                    trade.event()
                ),
                None => trades_open = false,
            },
            err = errors.recv(), if errors_open => match err {
                Some(err) => warn!(%err, "Failed to process escrow log"),
                None => errors_open = false,
            },
        }
    }

    handle.await?;
    Ok(())
}

/// Trade record as a JSON line, tagged with the token standards of the pair.
fn json_line(trade: &TradeRecord) -> Result<String> {
    let mut record = serde_json::to_value(trade)?;
    record["tradeType"] = trade.event().category.trade_type().into();
    Ok(record.to_string())
}
