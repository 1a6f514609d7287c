//! # Persistence Gateway
//!
//! Durable, idempotent storage of decoded records keyed by their record id.
//! Writing the same id twice leaves exactly one row holding the latest values.
//!
//! Two backends:
//! - [`PgEventStore`]: one PostgreSQL table per event kind (see [`crate::database`])
//! - [`MemoryEventStore`]: in-process, for tests and dry runs

use crate::database::{self, DbPool};
use crate::error::StorageError;
use crate::event_classifier::EventKind;
use crate::event_decoder::{DecodedRecord, LotEvent};
use async_trait::async_trait;
use log::debug;
use std::sync::{Mutex, MutexGuard};

/// Write boundary of the pipeline
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert, or overwrite every field of the row with the same id.
    /// Each call is one statement: it either lands fully or not at all.
    async fn upsert(&self, record: &DecodedRecord) -> Result<(), StorageError>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgEventStore {
    pool: DbPool,
}

impl PgEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn upsert(&self, record: &DecodedRecord) -> Result<(), StorageError> {
        match &record.event {
            LotEvent::Created(event) => {
                database::upsert_lot_created(&self.pool, &record.meta, event).await?
            }
            LotEvent::Joined(event) => {
                database::upsert_lot_joined(&self.pool, &record.meta, event).await?
            }
            LotEvent::Resolved(event) => {
                database::upsert_lot_resolved(&self.pool, &record.meta, event).await?
            }
        }
        debug!(
            "💾 [Store] Upserted {} record {} into {}.{}",
            record.kind(),
            record.meta.id,
            database::SCHEMA,
            record.kind().table_name()
        );
        Ok(())
    }
}

/// In-memory store with the same replace-on-id semantics.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryEventStore {
    records: Mutex<Vec<DecodedRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<DecodedRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// All stored records in first-insert order
    pub fn records(&self) -> Vec<DecodedRecord> {
        self.lock().clone()
    }

    pub fn records_of(&self, kind: EventKind) -> Vec<DecodedRecord> {
        self.lock()
            .iter()
            .filter(|r| r.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn upsert(&self, record: &DecodedRecord) -> Result<(), StorageError> {
        let mut records = self.lock();
        match records.iter_mut().find(|r| r.meta.id == record.meta.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}
