//! # LotGame Event Indexer
//!
//! Ingests the events of one LotGame contract from an EVM chain into PostgreSQL.
//!
//! ## Overview
//!
//! Logs are acquired in two phases, a bounded historical backfill followed by an
//! unbounded live subscription. Every log, whichever phase delivered it, goes through
//! the same per-record pipeline:
//!
//! - **Classification**: `topics[0]` is matched against the event signatures of the
//!   contract schema (`LotCreated`, `LotJoined`, `LotResolved`)
//! - **Decoding**: the payload is ABI-decoded into a typed record following the schema's
//!   field layout; malformed payloads are logged and skipped
//! - **Persistence**: the record is upserted by its id, so re-delivery of the same chain
//!   event converges to one row
//!
//! ## Architecture
//!
//! ### Source Layer
//! [`log_source::LogSource`] abstracts the node. [`log_source::EthersLogSource`] uses
//! HTTP for `eth_getLogs` and WebSocket for `eth_subscribe`.
//!
//! ### Pipeline Layer
//! [`event_classifier`], [`event_decoder`] and [`pipeline`], all driven by the contract
//! schema in [`contracts`].
//!
//! ### Storage Layer
//! [`event_store::EventStore`] with a PostgreSQL backend ([`database`]) and an in-memory
//! backend.
//!
//! ### Control
//! [`orchestrator::Orchestrator`] owns the `Bootstrapping -> Backfilling -> Live ->
//! Terminated` state machine.

// Core Types
/// Common types and data structures
pub mod types;
/// Error taxonomy
pub mod error;

// Contracts (Public ABIs Only)
/// Contract interface schema
pub mod contracts;

// Pipeline
/// Topic hash -> event kind lookup
pub mod event_classifier;
/// Schema-driven payload decoding
pub mod event_decoder;
/// Shared per-record pipeline
pub mod pipeline;

// Infrastructure
/// Historical and live log acquisition
pub mod log_source;
/// PostgreSQL database integration
pub mod database;
/// Persistence gateway
pub mod event_store;
/// Ingestion state machine
pub mod orchestrator;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use contracts::ContractSchema;
pub use error::{DecodeError, IngestError, SchemaError, StorageError};
pub use event_classifier::{EventClassifier, EventKind};
pub use event_decoder::{DecodedRecord, EventDecoder, KeyScheme, LotEvent};
pub use event_store::{EventStore, MemoryEventStore, PgEventStore};
pub use log_source::{EthersLogSource, LiveSubscription, LogFilter, LogSource};
pub use orchestrator::{IngestionState, Orchestrator};
pub use pipeline::{Outcome, Pipeline, PipelineStats};
pub use settings::Settings;
