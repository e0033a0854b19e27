// src/error.rs

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DedupeError>;

/// Error type covering configuration, comparator, and backing-store failures.
///
/// The engine never retries and never swallows: every failure surfaces to the
/// caller with its original cause preserved. Partial-batch progress is
/// observable through the sink callbacks already invoked.
#[derive(Debug, Error)]
pub enum DedupeError {
    /// A threshold is out of range, a property is declared twice, or a record
    /// references a property the configuration does not know about.
    #[error("configuration error: {0}")]
    Config(String),
    /// I/O against the index or the equivalence-class store failed.
    #[error("{context}: {source}")]
    Backing {
        context: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A comparator produced a value outside its contract or failed while
    /// comparing two values. Both offending values are kept for diagnosis.
    #[error("comparison of values '{value1}' and '{value2}' failed: {reason}")]
    Comparator {
        value1: String,
        value2: String,
        reason: String,
    },
    /// The backing index reported an inconsistency. No recovery is attempted.
    #[error("corrupt index: {0}")]
    CorruptIndex(String),
}

impl DedupeError {
    pub fn backing(
        context: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DedupeError::Backing {
            context,
            source: Box::new(source),
        }
    }
}

impl From<io::Error> for DedupeError {
    fn from(e: io::Error) -> Self {
        DedupeError::backing("index storage I/O failed", e)
    }
}

impl From<tokio_postgres::Error> for DedupeError {
    fn from(e: tokio_postgres::Error) -> Self {
        DedupeError::backing("equivalence-class database operation failed", e)
    }
}
