//! Error Types and Handling
//!
//! Error types for the PathRAG engine with structured error codes for
//! programmatic handling and detailed messages for debugging.
//!
//! Record absence is not an error in this crate: lookups return
//! `Ok(None)` at the store seam and callers decide what absence means.
//! The variants here cover the failures the engine actually produces —
//! collaborator failures, malformed input, cancellation, and the I/O and
//! serialization errors a persistent [`GraphStore`](crate::GraphStore)
//! implementation surfaces.
//!
//! # Error Categories
//!
//! Errors are organized into categories with numeric codes:
//!
//! | Range | Category | Examples |
//! |-------|----------|----------|
//! | 1xxx | I/O errors | Read, Write |
//! | 2xxx | Serialization | Serialize, Deserialize |
//! | 5xxx | Collaborator | Storage, Embedding, Completion |
//! | 7xxx | Operational | Cancelled, InvalidInput |
//!
//! # Example
//!
//! ```rust
//! use pathrag::error::{PathRagError, Result, ErrorCode};
//!
//! fn example_operation() -> Result<()> {
//!     Err(PathRagError::Embedding("provider timed out".to_string()))
//! }
//!
//! let err = example_operation().unwrap_err();
//! assert_eq!(err.error_code(), ErrorCode::EmbeddingFailed);
//! assert_eq!(err.error_code().category(), "Collaborator");
//! ```
//!
//! # Error Propagation
//!
//! Use the `?` operator to propagate errors:
//!
//! ```rust,ignore
//! fn merge_all(engine: &MergeEngine, batch: &[ExtractedEntity]) -> Result<()> {
//!     for candidate in batch {
//!         engine.merge_and_upsert_entity(candidate)?;  // Propagates Storage, etc.
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Error code categories for programmatic error handling.
///
/// Each error code belongs to a category indicated by its numeric range.
/// Use [`ErrorCode::category()`] to get the human-readable category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Failed to read from disk or network
    IoRead = 1001,
    /// Failed to write to disk or network
    IoWrite = 1002,

    /// Failed to serialize data (e.g., JSON encoding)
    SerializationFailed = 2001,

    /// Graph storage collaborator failed
    StorageFailed = 5001,
    /// Embedding collaborator failed
    EmbeddingFailed = 5002,
    /// Chat completion collaborator failed
    CompletionFailed = 5003,

    /// Operation was cancelled by the caller
    Cancelled = 7001,
    /// Input record is malformed or out of range
    InvalidInput = 7002,
}

impl ErrorCode {
    /// Get the numeric error code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a brief description of the error category
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::IoRead | ErrorCode::IoWrite => "I/O",
            ErrorCode::SerializationFailed => "Serialization",
            ErrorCode::StorageFailed | ErrorCode::EmbeddingFailed | ErrorCode::CompletionFailed => "Collaborator",
            ErrorCode::Cancelled | ErrorCode::InvalidInput => "Operational",
        }
    }
}

/// Error types for PathRAG engine operations
#[must_use]
#[derive(Error, Debug)]
pub enum PathRagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PathRagError {
    /// Get the structured error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PathRagError::Io(source) => match source.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => ErrorCode::IoRead,
                _ => ErrorCode::IoWrite,
            },
            PathRagError::Serialization(_) => ErrorCode::SerializationFailed,
            PathRagError::Storage(_) => ErrorCode::StorageFailed,
            PathRagError::Embedding(_) => ErrorCode::EmbeddingFailed,
            PathRagError::Completion(_) => ErrorCode::CompletionFailed,
            PathRagError::Cancelled => ErrorCode::Cancelled,
            PathRagError::InvalidInput(_) => ErrorCode::InvalidInput,
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Collaborator failures (storage, embedding, completion) are retryable
    /// by an outer orchestration layer; this crate performs no retries
    /// itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PathRagError::Storage(_)
                | PathRagError::Embedding(_)
                | PathRagError::Completion(_)
                | PathRagError::Io(_)
        )
    }
}

/// Convenience alias for `std::result::Result<T, PathRagError>`
pub type Result<T> = std::result::Result<T, PathRagError>;
