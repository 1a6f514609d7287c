// Types Module - Shared data model for the ingestion pipeline

pub mod block_range;
pub mod conversions;
pub mod raw_log;

pub use block_range::BlockRange;
pub use raw_log::RawLog;
