// Per-record pipeline: Classifier -> Decoder -> Store
// Both ingestion phases push every RawLog through `Pipeline::process`, so a log
// decodes and upserts identically whichever phase delivered it.

use crate::error::StorageError;
use crate::event_classifier::EventClassifier;
use crate::event_decoder::EventDecoder;
use crate::event_store::EventStore;
use crate::types::RawLog;
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What happened to one RawLog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Stored(Uuid),
    /// Topic outside the known set; skipped
    Unrecognized,
    /// Payload rejected by the decoder; logged and skipped
    DecodeFailed,
}

/// Counters for one ingestion phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub stored: u64,
    pub unrecognized: u64,
    pub decode_failed: u64,
}

impl PipelineStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Stored(_) => self.stored += 1,
            Outcome::Unrecognized => self.unrecognized += 1,
            Outcome::DecodeFailed => self.decode_failed += 1,
        }
    }
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received={} stored={} unrecognized={} decode_failed={}",
            self.received, self.stored, self.unrecognized, self.decode_failed
        )
    }
}

pub struct Pipeline {
    classifier: EventClassifier,
    decoder: EventDecoder,
    store: Arc<dyn EventStore>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        classifier: EventClassifier,
        decoder: EventDecoder,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            classifier,
            decoder,
            store,
            stats: PipelineStats::default(),
        }
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Returns the counters accumulated so far and starts a fresh set
    pub fn take_stats(&mut self) -> PipelineStats {
        std::mem::take(&mut self.stats)
    }

    /// Route one log through classify, decode and upsert.
    ///
    /// Unrecognized topics and decode failures are record-local and come back as
    /// an `Outcome`. Only a storage failure is returned as `Err`.
    pub async fn process(&mut self, raw: RawLog) -> Result<Outcome, StorageError> {
        self.stats.received += 1;
        let outcome = self.route(&raw).await?;
        self.stats.record(outcome);
        Ok(outcome)
    }

    async fn route(&self, raw: &RawLog) -> Result<Outcome, StorageError> {
        let Some(kind) = self.classifier.classify(raw) else {
            return Ok(Outcome::Unrecognized);
        };

        let record = match self.decoder.decode(kind, raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "⚠️ [Pipeline] Skipping {} at block {} (tx {:?}, log {}): {}",
                    kind, raw.block_number, raw.transaction_hash, raw.log_index, e
                );
                debug!(
                    "[Pipeline] Rejected payload ({} bytes): 0x{}",
                    raw.data.len(),
                    hex::encode(raw.data.as_ref())
                );
                return Ok(Outcome::DecodeFailed);
            }
        };

        self.store.upsert(&record).await?;
        info!(
            "✅ [Pipeline] Stored {} {} (block {}, tx {:?}, log {})",
            kind, record.meta.id, raw.block_number, raw.transaction_hash, raw.log_index
        );
        Ok(Outcome::Stored(record.meta.id))
    }
}
