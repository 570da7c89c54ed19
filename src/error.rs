//! Error types for RLG operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! engine operations: storage, ingestion, retrieval, external models,
//! and CLI commands.

use thiserror::Error;

/// Result type alias for RLG operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for RLG operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (database and index persistence).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Ingestion-related errors (extraction and chunking).
    #[error("ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    /// External model errors (embedding or generation service).
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Invalid caller input (bad file type, empty question, bad filter).
    #[error("bad input: {detail}")]
    BadInput {
        /// What was wrong with the input.
        detail: String,
    },

    /// A referenced entity does not exist.
    #[error("{what} not found: {id}")]
    NotFound {
        /// Entity kind ("document", "chunk", ...).
        what: &'static str,
        /// The identifier that failed to resolve.
        id: String,
    },

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Convenience constructor for [`Error::BadInput`].
    pub fn bad_input(detail: impl Into<String>) -> Self {
        Self::BadInput {
            detail: detail.into(),
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }
}

/// Storage-specific errors for database and index operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Vector index error (dimension mismatch, corrupt file, ...).
    #[error("vector index error: {0}")]
    VectorIndex(String),
}

/// Ingestion-specific errors for extraction and chunking.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// No extractor is registered for the file extension.
    #[error("no extractor for file type: {extension}")]
    NoExtractor {
        /// The file extension with no registered extractor.
        extension: String,
    },

    /// Text extraction from the source file failed.
    #[error("extraction failed: {reason}")]
    ExtractionFailed {
        /// Reason extraction failed.
        reason: String,
    },

}

/// External model errors for embedding and generation services.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The model service is unreachable.
    #[error("model service unavailable at {host}: {hint}")]
    Unavailable {
        /// Host the service was expected at.
        host: String,
        /// Hint for the operator.
        hint: String,
    },

    /// The model returned an error or malformed response.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Embedding produced a vector of the wrong dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension the model returned.
        actual: usize,
    },
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// User cancelled operation.
    #[error("operation cancelled by user")]
    Cancelled,
}

// Implement From traits for standard library and dependency errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::bad_input("empty question");
        assert_eq!(err.to_string(), "bad input: empty question");

        let err = Error::not_found("document", "abc-123");
        assert_eq!(err.to_string(), "document not found: abc-123");

        let err = Error::Config {
            message: "weights must sum to 1.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "configuration error: weights must sum to 1.0"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Database("connection failed".to_string());
        assert!(err.to_string().contains("connection failed"));

        let err = StorageError::VectorIndex("dimension mismatch".to_string());
        assert!(err.to_string().contains("vector index"));
    }

    #[test]
    fn test_ingestion_error_display() {
        let err = IngestionError::NoExtractor {
            extension: ".pdf".to_string(),
        };
        assert_eq!(err.to_string(), "no extractor for file type: .pdf");

        let err = IngestionError::ExtractionFailed {
            reason: "corrupt stream".to_string(),
        };
        assert!(err.to_string().contains("corrupt stream"));
    }

    #[test]
    fn test_model_error_display() {
        let err = ModelError::Unavailable {
            host: "http://localhost:11434".to_string(),
            hint: "run `ollama serve`".to_string(),
        };
        assert!(err.to_string().contains("localhost:11434"));
        assert!(err.to_string().contains("ollama serve"));

        let err = ModelError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert!(err.to_string().contains("384"));
        assert!(err.to_string().contains("768"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_storage() {
        let storage_err = StorageError::Transaction("rollback".to_string());
        let err: Error = storage_err.into();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_error_from_ingestion() {
        let err: Error = IngestionError::ExtractionFailed {
            reason: "bad bytes".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Ingestion(_)));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: Error = rusqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::Database(_))));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err: serde_json::Error = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
    }
}
