// Event Classifier - Maps a log's primary topic to a known LotGame event kind
// The topic table is built from the contract schema, not from hardcoded hashes

use crate::contracts::ContractSchema;
use crate::error::SchemaError;
use crate::types::RawLog;
use ethers::types::H256;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of contract events the pipeline ingests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    LotCreated,
    LotJoined,
    LotResolved,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::LotCreated,
        EventKind::LotJoined,
        EventKind::LotResolved,
    ];

    /// Event name as declared in the contract ABI
    pub fn event_name(&self) -> &'static str {
        match self {
            EventKind::LotCreated => "LotCreated",
            EventKind::LotJoined => "LotJoined",
            EventKind::LotResolved => "LotResolved",
        }
    }

    /// Storage table holding records of this kind
    pub fn table_name(&self) -> &'static str {
        match self {
            EventKind::LotCreated => "lot_created",
            EventKind::LotJoined => "lot_joined",
            EventKind::LotResolved => "lot_resolved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event_name())
    }
}

/// Static topic-hash -> event-kind lookup
#[derive(Debug, Clone)]
pub struct EventClassifier {
    topics: HashMap<H256, EventKind>,
}

impl EventClassifier {
    pub fn new(schema: &ContractSchema) -> Result<Self, SchemaError> {
        let mut topics = HashMap::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let topic = schema.topic(kind)?;
            debug!("🔍 [Classifier] {} -> {:?}", kind, topic);
            topics.insert(topic, kind);
        }
        Ok(Self { topics })
    }

    /// Topic hashes of every known kind, for the source-side log filter
    pub fn topic_filter(&self) -> Vec<H256> {
        let mut topics: Vec<H256> = self.topics.keys().copied().collect();
        topics.sort();
        topics
    }

    /// `None` means the topic is outside the known set. The caller skips the log;
    /// this is not an error.
    pub fn classify(&self, raw: &RawLog) -> Option<EventKind> {
        let Some(topic) = raw.primary_topic() else {
            warn!(
                "⚠️ [Classifier] Log without topics at block {} (tx {:?}), skipping",
                raw.block_number, raw.transaction_hash
            );
            return None;
        };
        let kind = self.topics.get(&topic).copied();
        if kind.is_none() {
            warn!(
                "⚠️ [Classifier] Unrecognized topic {:?} at block {} (tx {:?}), skipping",
                topic, raw.block_number, raw.transaction_hash
            );
        }
        kind
    }
}
