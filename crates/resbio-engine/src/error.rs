//! Error types for engine collaborators

use resbio_model::{DataId, ModelError, StorageId};
use std::path::PathBuf;

/// Workflow engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No handler registered under this process name
    #[error("unknown process: {0}")]
    UnknownProcess(String),

    /// No data object with this identity
    #[error("unknown data object: {0}")]
    UnknownData(DataId),

    /// Inputs do not satisfy the process schema
    #[error("invalid inputs for {process}: missing {missing:?}")]
    InvalidInputs {
        /// Process name
        process: String,
        /// Required keys absent from the inputs
        missing: Vec<String>,
    },

    /// Status channel closed before a terminal status was observed
    #[error("status channel for {0} closed")]
    Closed(DataId),

    /// Model invariant violated
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Artifact storage failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Artifact store error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O failure on a stored path
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Affected path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Artifact name escapes the data directory
    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    /// Output key absent on the data object
    #[error("data {data} has no output {key}")]
    MissingOutput {
        /// Data object
        data: DataId,
        /// Output key
        key: String,
    },

    /// Output exists but does not reference a file
    #[error("output {key} of data {data} does not reference a file")]
    NotAFile {
        /// Data object
        data: DataId,
        /// Output key
        key: String,
    },

    /// Output exists but does not reference a storage blob
    #[error("output {key} of data {data} does not reference a storage blob")]
    NotAStorage {
        /// Data object
        data: DataId,
        /// Output key
        key: String,
    },

    /// No storage blob with this identity
    #[error("storage not found: {0}")]
    StorageNotFound(StorageId),

    /// Decompression failed
    #[error("cannot decompress {name}: {source}")]
    Decode {
        /// Artifact name
        name: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Structured content is not valid JSON
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the error means the artifact is absent
    #[inline]
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::MissingOutput { .. } | Self::StorageNotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Error reported by a process handler; turns the data object into error status
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Required input missing at run time
    #[error("missing input: {0}")]
    MissingInput(String),

    /// Input present but unusable
    #[error("invalid input {key}: {reason}")]
    InvalidInput {
        /// Input key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// Referenced data object does not exist
    #[error("referenced data object not found: {0}")]
    UnknownData(DataId),

    /// Process-level failure
    #[error("{0}")]
    Failed(String),

    /// Storage failure while running
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_classification() {
        assert!(StoreError::MissingOutput {
            data: DataId::new(),
            key: "rc".into()
        }
        .is_missing());
        assert!(StoreError::Io {
            path: PathBuf::from("x"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .is_missing());
        assert!(!StoreError::InvalidName("../x".into()).is_missing());
    }

    #[test]
    fn engine_error_display() {
        let err = EngineError::InvalidInputs {
            process: "cufflinks".into(),
            missing: vec!["alignment".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid inputs for cufflinks: missing [\"alignment\"]"
        );
    }
}
