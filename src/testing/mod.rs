//! Synthetic escrow contracts and test utilities.
//!
//! [`escrow`] declares the events of the four escrow contracts with alloy's
//! `sol!`, which is used to encode logs exactly like the deployed contracts
//! would. The same events are available as human-readable schemas for the
//! [`Registry`], bound to the fixed addresses [`FF`], [`FN`], [`NF`], [`NN`].
//!
//! [`ChannelLogSource`] is an in-memory [`LogSource`] fed by a channel.
//!

use alloy::primitives::{Address, B256, U256, address, b256};
use alloy_sol_types::SolEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    error::LogSourceError,
    registry::{CategoryBinding, EventSchema, Registry},
    source::{LogFilter, LogSource},
    types::{Category, LogBatch, LogRecord},
};

pub const FF: Address = address!("0x00000000000000000000000000000000000000f1");
pub const FN: Address = address!("0x00000000000000000000000000000000000000f2");
pub const NF: Address = address!("0x00000000000000000000000000000000000000f3");
pub const NN: Address = address!("0x00000000000000000000000000000000000000f4");

/// Escrow contract addresses in category order.
pub const ADDRESSES: [Address; 4] = [FF, FN, NF, NN];

pub const X_OWNER: Address = address!("0x0000000000000000000000000000000000000111");
pub const Y_OWNER: Address = address!("0x0000000000000000000000000000000000000222");
pub const X_ASSET: Address = address!("0x0000000000000000000000000000000000000aaa");
pub const Y_ASSET: Address = address!("0x0000000000000000000000000000000000000bbb");

const TX_HASH: B256 = b256!("0x47de82c4aa40baa30cabac4a74568488a8c74ded85a4e905f1ceaad4f29945e3");

#[allow(clippy::too_many_arguments)]
pub mod escrow {
    pub mod fungible_fungible {
        alloy::sol! {
            #[derive(Debug)]
            event EscrowCreated(uint256 escrowIndex, address xOwner, address xTokenContractAddr, uint256 xAmount, address yOwner, address yTokenContractAddr, uint256 yAmount);
            #[derive(Debug)]
            event EscrowAccepted(uint256 escrowIndex, address yOwner);
            #[derive(Debug)]
            event EscrowRejected(uint256 escrowIndex);
            #[derive(Debug)]
            event Paused(address account);
        }
    }

    pub mod fungible_nft {
        alloy::sol! {
            #[derive(Debug)]
            event EscrowCreated(uint256 escrowIndex, address xOwner, address xTokenContractAddr, uint256 xAmount, address yOwner, address yTokenContractAddr, uint256 yIndex);
        }
    }

    pub mod nft_fungible {
        alloy::sol! {
            #[derive(Debug)]
            event EscrowCreated(uint256 escrowIndex, address xOwner, address xTokenContractAddr, uint256 xIndex, address yOwner, address yTokenContractAddr, uint256 yAmount);
        }
    }

    pub mod nft_nft {
        alloy::sol! {
            #[derive(Debug)]
            event EscrowCreated(uint256 escrowIndex, address xOwner, address xTokenContractAddr, uint256 xIndex, address yOwner, address yTokenContractAddr, uint256 yIndex);
        }
    }

    /// Accepted event carrying the escrow index in a topic.
    pub mod indexed {
        alloy::sol! {
            #[derive(Debug)]
            event EscrowAccepted(uint256 indexed escrowIndex, address yOwner);
        }
    }
}

const ACCEPTED: &str = "event EscrowAccepted(uint256 escrowIndex, address yOwner)";
const REJECTED: &str = "event EscrowRejected(uint256 escrowIndex)";
const PAUSED: &str = "event Paused(address account)";

/// Human-readable event schema of the category's escrow contract.
pub fn schema(category: Category) -> EventSchema {
    let (x_amount, y_amount) = match category {
        Category::FF => ("xAmount", "yAmount"),
        Category::FN => ("xAmount", "yIndex"),
        Category::NF => ("xIndex", "yAmount"),
        Category::NN => ("xIndex", "yIndex"),
    };
    let created = format!(
        "event EscrowCreated(uint256 escrowIndex, address xOwner, address xTokenContractAddr, uint256 {x_amount}, address yOwner, address yTokenContractAddr, uint256 {y_amount})"
    );
    EventSchema::parse([created.as_str(), ACCEPTED, REJECTED, PAUSED])
        .expect("escrow schema is valid")
}

pub fn address(category: Category) -> Address {
    match category {
        Category::FF => FF,
        Category::FN => FN,
        Category::NF => NF,
        Category::NN => NN,
    }
}

/// Bindings of all four categories to the synthetic escrow contracts.
pub fn bindings() -> Vec<CategoryBinding> {
    Category::ALL
        .into_iter()
        .map(|category| CategoryBinding::new(category, address(category), schema(category)))
        .collect()
}

/// Same as [`bindings`], with the given category's schema replaced.
pub fn bindings_with(category: Category, schema: EventSchema) -> Vec<CategoryBinding> {
    let mut bindings = bindings();
    for binding in bindings.iter_mut().filter(|b| b.category == category) {
        binding.schema = schema.clone();
    }
    bindings
}

pub fn registry() -> Registry {
    Registry::load(bindings()).expect("escrow registry is valid")
}

pub fn registry_with(category: Category, schema: EventSchema) -> Registry {
    Registry::load(bindings_with(category, schema)).expect("escrow registry is valid")
}

/// Encodes `EscrowCreated` of the category's contract between [`X_OWNER`]
/// offering [`X_ASSET`] and [`Y_OWNER`] offering [`Y_ASSET`].
///
/// `x` and `y` are amounts or token indices depending on the category.
pub fn created_log(category: Category, escrow_id: u64, x: u64, y: u64) -> LogRecord {
    let (escrow_index, x, y) = (U256::from(escrow_id), U256::from(x), U256::from(y));
    let data = match category {
        Category::FF => escrow::fungible_fungible::EscrowCreated {
            escrowIndex: escrow_index,
            xOwner: X_OWNER,
            xTokenContractAddr: X_ASSET,
            xAmount: x,
            yOwner: Y_OWNER,
            yTokenContractAddr: Y_ASSET,
            yAmount: y,
        }
        .encode_log_data(),
        Category::FN => escrow::fungible_nft::EscrowCreated {
            escrowIndex: escrow_index,
            xOwner: X_OWNER,
            xTokenContractAddr: X_ASSET,
            xAmount: x,
            yOwner: Y_OWNER,
            yTokenContractAddr: Y_ASSET,
            yIndex: y,
        }
        .encode_log_data(),
        Category::NF => escrow::nft_fungible::EscrowCreated {
            escrowIndex: escrow_index,
            xOwner: X_OWNER,
            xTokenContractAddr: X_ASSET,
            xIndex: x,
            yOwner: Y_OWNER,
            yTokenContractAddr: Y_ASSET,
            yAmount: y,
        }
        .encode_log_data(),
        Category::NN => escrow::nft_nft::EscrowCreated {
            escrowIndex: escrow_index,
            xOwner: X_OWNER,
            xTokenContractAddr: X_ASSET,
            xIndex: x,
            yOwner: Y_OWNER,
            yTokenContractAddr: Y_ASSET,
            yIndex: y,
        }
        .encode_log_data(),
    };
    LogRecord::from_log_data(address(category), data).with_position(1, TX_HASH, escrow_id)
}

/// Encodes `EscrowAccepted` by [`Y_OWNER`].
pub fn accepted_log(category: Category, escrow_id: u64) -> LogRecord {
    let data = escrow::fungible_fungible::EscrowAccepted {
        escrowIndex: U256::from(escrow_id),
        yOwner: Y_OWNER,
    }
    .encode_log_data();
    LogRecord::from_log_data(address(category), data)
}

pub fn rejected_log(category: Category, escrow_id: u64) -> LogRecord {
    let data = escrow::fungible_fungible::EscrowRejected {
        escrowIndex: U256::from(escrow_id),
    }
    .encode_log_data();
    LogRecord::from_log_data(address(category), data)
}

/// Event declared by the escrow contracts that is no trade lifecycle event.
pub fn paused_log(category: Category) -> LogRecord {
    let data = escrow::fungible_fungible::Paused { account: X_OWNER }.encode_log_data();
    LogRecord::from_log_data(address(category), data)
}

/// In-memory log source forwarding batches sent to its feed.
#[derive(Debug)]
pub struct ChannelLogSource {
    feed: mpsc::Receiver<LogBatch>,
    refuse_connect: bool,
    failure: Option<String>,
    filter: Option<mpsc::UnboundedSender<LogFilter>>,
}

impl ChannelLogSource {
    /// Returns the source along with the sender feeding it.
    pub fn channel() -> (mpsc::Sender<LogBatch>, Self) {
        let (tx, rx) = mpsc::channel(16);
        let source = Self {
            feed: rx,
            refuse_connect: false,
            failure: None,
            filter: None,
        };
        (tx, source)
    }

    /// Makes [`LogSource::connect`] fail.
    pub fn refuse_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Makes [`LogSource::sync`] fail with the given message once the feed is
    /// closed.
    pub fn fail_on_close(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Reports the filter the source gets subscribed with.
    pub fn report_filter(mut self, tx: mpsc::UnboundedSender<LogFilter>) -> Self {
        self.filter = Some(tx);
        self
    }
}

impl LogSource for ChannelLogSource {
    async fn connect(&self) -> Result<(), LogSourceError> {
        if self.refuse_connect {
            return Err(LogSourceError::Connect("connection refused".to_string()));
        }
        Ok(())
    }

    async fn sync(
        mut self,
        filter: LogFilter,
        batches: mpsc::Sender<LogBatch>,
        cancel: CancellationToken,
    ) -> Result<(), LogSourceError> {
        if let Some(tx) = self.filter.take() {
            _ = tx.send(filter);
        }
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                batch = self.feed.recv() => batch,
            };
            let Some(batch) = batch else {
                return match self.failure {
                    Some(message) => Err(LogSourceError::Transport(message)),
                    None => Ok(()),
                };
            };
            let sent = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                sent = batches.send(batch) => sent,
            };
            if sent.is_err() {
                return Ok(());
            }
        }
    }
}
