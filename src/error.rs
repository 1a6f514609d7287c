//! # Error Taxonomy
//!
//! Ingestion failures fall in two groups:
//!
//! - **Record-local**: [`DecodeError`] (and an unrecognized topic, which is not an
//!   error value at all). The pipeline logs and skips these; they never abort a batch
//!   or the live stream.
//! - **Fatal**: [`IngestError::SourceUnavailable`] and [`IngestError::Storage`]. The
//!   orchestrator stops and the process exits non-zero.

use crate::event_classifier::EventKind;
use crate::types::conversions::ConversionError;

/// Errors surfaced by the ingestion pipeline and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Node unreachable, query rejected, or the live subscription dropped
    #[error("log source unavailable: {0}")]
    SourceUnavailable(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IngestError {
    /// Whether the orchestrator must terminate on this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IngestError::Decode(_))
    }
}

/// A single payload could not be turned into a typed record
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{kind} payload has invalid length {len} bytes")]
    PayloadLength { kind: EventKind, len: usize },
    #[error("{kind} payload rejected by ABI decoder: {source}")]
    Abi {
        kind: EventKind,
        #[source]
        source: ethers::abi::Error,
    },
    #[error("{kind} expects {expected} fields, schema declares {actual}")]
    FieldCount {
        kind: EventKind,
        expected: usize,
        actual: usize,
    },
    #[error("{kind} field `{field}` is not a valid {expected}")]
    FieldType {
        kind: EventKind,
        field: String,
        expected: String,
    },
    /// Decodable, but not the canonical encoding of the decoded values (dirty padding,
    /// trailing bytes, out-of-order tail)
    #[error("{kind} payload is not canonically encoded at byte {offset}")]
    NonCanonical { kind: EventKind, offset: usize },
    #[error("log is missing {0}")]
    MissingLogMetadata(&'static str),
}

/// Write failure in the persistence gateway
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A record value does not fit its column; raised before any statement is sent
    #[error("value does not fit its column: {0}")]
    Conversion(#[from] ConversionError),
}

/// The contract interface schema could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed contract ABI: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("contract ABI does not declare event `{0}`")]
    MissingEvent(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_decode_errors_are_recoverable() {
        let decode = IngestError::from(DecodeError::MissingLogMetadata("block number"));
        assert!(!decode.is_fatal());

        let source = IngestError::SourceUnavailable("connection reset".to_string());
        assert!(source.is_fatal());

        let storage = IngestError::from(StorageError::Unavailable("closed".to_string()));
        assert!(storage.is_fatal());
    }

    #[test]
    fn test_decode_error_names_event_kind() {
        let err = DecodeError::PayloadLength {
            kind: EventKind::LotResolved,
            len: 447,
        };
        assert_eq!(
            err.to_string(),
            "LotResolved payload has invalid length 447 bytes"
        );
    }
}
