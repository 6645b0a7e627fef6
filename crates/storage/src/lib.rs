//! Storage Layer
//!
//! Detection records and the sink they are persisted through. The bundled
//! [`Repository`] keeps records in memory with bounded retention.

mod record;
mod repository;

pub use record::{DetectionRecord, RecordDetails, RecordMethod};
pub use repository::Repository;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
}

/// Destination for finished detection records.
///
/// Returns the id assigned to the stored record.
pub trait RecordSink: Send + Sync {
    fn persist(&self, record: DetectionRecord) -> Result<i64, StorageError>;
}
