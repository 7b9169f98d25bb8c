//! Configuration for the escrow listener.
//!
//! Configuration comes from two sources:
//! - Environment variables (via .env file or shell): node, contracts, ABIs
//! - CLI arguments: output and starting block overrides

use std::{fs, path::PathBuf, time::Duration};

use alloy::primitives::Address;
use clap::Parser;
use escrow_events::{
    registry::{CategoryBinding, EventSchema},
    types::Category,
};

use crate::error::Result;

/// Default poll interval of the log source.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Environment configuration (connection details, contracts).
#[derive(Debug, serde::Deserialize)]
pub struct EnvConfig {
    /// RPC URL for the node
    pub node_rpc_url: String,

    /// Block to start consuming escrow logs from
    pub from_block: u64,

    /// Fungible ↔ fungible escrow contract address
    pub ff_contract: String,

    /// Fungible ↔ non-fungible escrow contract address
    pub fn_contract: String,

    /// Non-fungible ↔ fungible escrow contract address
    pub nf_contract: String,

    /// Non-fungible ↔ non-fungible escrow contract address
    pub nn_contract: String,

    /// Paths to JSON ABI files of the escrow contracts
    pub ff_abi: PathBuf,
    pub fn_abi: PathBuf,
    pub nf_abi: PathBuf,
    pub nn_abi: PathBuf,

    /// Optional log polling interval (default: 1000ms)
    pub poll_interval_ms: Option<u64>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> std::result::Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Reads ABI files and parses contract addresses of all categories.
    pub fn bindings(&self) -> Result<Vec<CategoryBinding>> {
        let sources = [
            (Category::FF, &self.ff_contract, &self.ff_abi),
            (Category::FN, &self.fn_contract, &self.fn_abi),
            (Category::NF, &self.nf_contract, &self.nf_abi),
            (Category::NN, &self.nn_contract, &self.nn_abi),
        ];
        sources
            .into_iter()
            .map(|(category, address, abi)| -> Result<CategoryBinding> {
                let address: Address = address.parse()?;
                let json = fs::read_to_string(abi)?;
                Ok(CategoryBinding::new(
                    category,
                    address,
                    EventSchema::from_json(&json)?,
                ))
            })
            .collect()
    }
}

/// CLI arguments of the listener.
#[derive(Debug, Parser)]
#[command(name = "escrow-listener")]
#[command(about = "Streams trade lifecycle events of the escrow swap contracts")]
pub struct CliConfig {
    /// Block to start from, overrides FROM_BLOCK
    #[arg(long)]
    pub from_block: Option<u64>,

    /// Print trade events as JSON lines instead of log records
    #[arg(long)]
    pub json: bool,
}

impl CliConfig {
    pub fn from_block(&self, env: &EnvConfig) -> u64 {
        self.from_block.unwrap_or(env.from_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvConfig {
        EnvConfig {
            node_rpc_url: "http://127.0.0.1:8545".to_string(),
            from_block: 100,
            ff_contract: "0x00000000000000000000000000000000000000f1".to_string(),
            fn_contract: "0x00000000000000000000000000000000000000f2".to_string(),
            nf_contract: "0x00000000000000000000000000000000000000f3".to_string(),
            nn_contract: "not an address".to_string(),
            ff_abi: PathBuf::new(),
            fn_abi: PathBuf::new(),
            nf_abi: PathBuf::new(),
            nn_abi: PathBuf::new(),
            poll_interval_ms: None,
        }
    }

    #[test]
    fn test_from_block_override() {
        let cli = CliConfig {
            from_block: Some(7),
            json: false,
        };
        assert_eq!(cli.from_block(&env()), 7);

        let cli = CliConfig {
            from_block: None,
            json: true,
        };
        assert_eq!(cli.from_block(&env()), 100);
    }

    #[test]
    fn test_default_poll_interval() {
        assert_eq!(env().poll_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_missing_abi_file() {
        let mut env = env();
        env.nn_contract = "0x00000000000000000000000000000000000000f4".to_string();
        assert!(matches!(env.bindings(), Err(crate::error::Error::Io(_))));
    }
}
