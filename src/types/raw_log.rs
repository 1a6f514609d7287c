use crate::error::DecodeError;
use ethers::types::{Address, Bytes, Log, H256};

/// One log entry emitted by the contract, as delivered by the node.
///
/// Produced only by the log source. The pipeline never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    /// `topics[0]` identifies the event kind
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u64,
}

impl RawLog {
    /// First topic, if the log has one (anonymous events have none)
    pub fn primary_topic(&self) -> Option<H256> {
        self.topics.first().copied()
    }

    /// Stable identity of the underlying chain event: `<tx hash>:<log index>`
    pub fn event_identity(&self) -> String {
        format!("{:?}:{}", self.transaction_hash, self.log_index)
    }
}

impl TryFrom<Log> for RawLog {
    type Error = DecodeError;

    /// Pending logs carry no block number, transaction hash or log index and are rejected.
    fn try_from(log: Log) -> Result<Self, Self::Error> {
        let block_number = log
            .block_number
            .ok_or(DecodeError::MissingLogMetadata("block number"))?
            .as_u64();
        let transaction_hash = log
            .transaction_hash
            .ok_or(DecodeError::MissingLogMetadata("transaction hash"))?;
        let log_index = log
            .log_index
            .ok_or(DecodeError::MissingLogMetadata("log index"))?
            .low_u64();

        Ok(Self {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number,
            transaction_hash,
            log_index,
        })
    }
}
