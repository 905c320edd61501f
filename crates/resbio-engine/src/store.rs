//! Artifact storage
//!
//! Files produced by a process live under a per-data directory; structured
//! (JSON) blobs live in a separate storage area and are referenced from an
//! output by their [`StorageId`].

use crate::error::StoreError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use resbio_model::{DataId, DataObject, StorageId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Compression applied to an artifact before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Raw bytes
    #[default]
    None,
    /// gzip stream
    Gzip,
}

impl Compression {
    /// Guess from a file name (`.gz` suffix)
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(".gz") {
            Self::Gzip
        } else {
            Self::None
        }
    }

    /// Decompress bytes
    ///
    /// # Errors
    /// Returns the decoder error for corrupt gzip input.
    pub fn decode(self, bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
        match self {
            Self::None => Ok(bytes),
            Self::Gzip => {
                let mut decoded = Vec::new();
                GzDecoder::new(bytes.as_slice()).read_to_end(&mut decoded)?;
                Ok(decoded)
            }
        }
    }
}

/// Read/write access to process artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a file for a data object
    async fn write_file(&self, data: DataId, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Read a stored file
    async fn read_file(&self, data: DataId, name: &str) -> Result<Vec<u8>, StoreError>;

    /// Whether a file or directory exists for a data object
    async fn exists(&self, data: DataId, name: &str) -> bool;

    /// Store a structured blob
    async fn write_storage(&self, value: &Value) -> Result<StorageId, StoreError>;

    /// Read a structured blob
    async fn read_storage(&self, id: StorageId) -> Result<Value, StoreError>;

    /// Read the file referenced by an output key, decompressing if asked
    async fn read_output(
        &self,
        data: &DataObject,
        key: &str,
        compression: Compression,
    ) -> Result<Vec<u8>, StoreError> {
        if !data.output.contains_key(key) {
            return Err(StoreError::MissingOutput {
                data: data.id,
                key: key.to_string(),
            });
        }
        let name = data.file(key).ok_or_else(|| StoreError::NotAFile {
            data: data.id,
            key: key.to_string(),
        })?;
        let bytes = self.read_file(data.id, name).await?;
        compression.decode(bytes).map_err(|source| StoreError::Decode {
            name: name.to_string(),
            source,
        })
    }

    /// Whether an output key is present and its file or directory is stored
    async fn output_exists(&self, data: &DataObject, key: &str) -> bool {
        match data.file(key).or_else(|| data.dir(key)) {
            Some(name) => self.exists(data.id, name).await,
            None => false,
        }
    }

    /// Read the structured blob referenced by an output key
    async fn read_output_json(&self, data: &DataObject, key: &str) -> Result<Value, StoreError> {
        let value = data.output.get(key).ok_or_else(|| StoreError::MissingOutput {
            data: data.id,
            key: key.to_string(),
        })?;
        let id = value
            .as_str()
            .and_then(|s| s.parse::<StorageId>().ok())
            .ok_or_else(|| StoreError::NotAStorage {
                data: data.id,
                key: key.to_string(),
            })?;
        self.read_storage(id).await
    }
}

/// File-system artifact store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create store rooted at `root` (created lazily)
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of a data object
    #[must_use]
    pub fn data_dir(&self, data: DataId) -> PathBuf {
        self.root.join("data").join(data.to_string())
    }

    fn storage_path(&self, id: StorageId) -> PathBuf {
        self.root.join("storage").join(format!("{id}.json"))
    }

    fn artifact_path(&self, data: DataId, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name);
        let safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.data_dir(data).join(relative))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write_file(&self, data: DataId, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.artifact_path(data, name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(io_error(&path))?;
        tracing::trace!(%data, name, size = bytes.len(), "artifact written");
        Ok(())
    }

    async fn read_file(&self, data: DataId, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.artifact_path(data, name)?;
        tokio::fs::read(&path).await.map_err(io_error(&path))
    }

    async fn exists(&self, data: DataId, name: &str) -> bool {
        match self.artifact_path(data, name) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn write_storage(&self, value: &Value) -> Result<StorageId, StoreError> {
        let id = StorageId::new();
        let path = self.storage_path(id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        let bytes = serde_json::to_vec(value)?;
        tokio::fs::write(&path, bytes).await.map_err(io_error(&path))?;
        Ok(id)
    }

    async fn read_storage(&self, id: StorageId) -> Result<Value, StoreError> {
        let path = self.storage_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::StorageNotFound(id))
            }
            Err(e) => return Err(io_error(&path)(e)),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}
