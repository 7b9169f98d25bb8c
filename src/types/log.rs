use alloy::{
    primitives::{Address, B256, Bytes, LogData},
    rpc::types::Log,
};

use super::LogContext;

/// Raw log record as emitted by a contract.
#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub(crate) context: LogContext,
    pub(crate) topics: Vec<B256>,
    pub(crate) data: Bytes,
}

/// Logs delivered by a log source in one go.
///
/// `removed` holds logs dropped from the canonical chain by a reorganization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogBatch {
    pub added: Vec<LogRecord>,
    pub removed: Vec<LogRecord>,
}

impl LogRecord {
    pub fn new(address: Address, topics: Vec<B256>, data: Bytes) -> Self {
        Self {
            context: LogContext::new(address),
            topics,
            data,
        }
    }

    pub fn from_log_data(address: Address, log: LogData) -> Self {
        let (topics, data) = log.split();
        Self::new(address, topics, data)
    }

    pub fn with_position(mut self, block_number: u64, tx_hash: B256, log_index: u64) -> Self {
        self.context.block_number = Some(block_number);
        self.context.tx_hash = Some(tx_hash);
        self.context.log_index = Some(log_index);
        self
    }

    pub fn address(&self) -> Address {
        self.context.address
    }

    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn topics(&self) -> &[B256] {
        &self.topics
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl From<Log> for LogRecord {
    fn from(log: Log) -> Self {
        let context = LogContext {
            address: log.inner.address,
            block_number: log.block_number,
            tx_hash: log.transaction_hash,
            log_index: log.log_index,
        };
        let (topics, data) = log.inner.data.split();
        Self {
            context,
            topics,
            data,
        }
    }
}

impl LogBatch {
    pub fn new(added: Vec<LogRecord>) -> Self {
        Self {
            added,
            removed: Vec::new(),
        }
    }

    /// Splits RPC logs into added and removed ones, preserving their order.
    pub fn from_rpc_logs(logs: impl IntoIterator<Item = Log>) -> Self {
        let mut batch = Self::default();
        for log in logs {
            if log.removed {
                batch.removed.push(log.into());
            } else {
                batch.added.push(log.into());
            }
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
