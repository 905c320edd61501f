//! Harness configuration
//!
//! Loaded from TOML, then overridden by `RESBIO_FILES_DIR` and
//! `RESBIO_REFERENCE_DIR` when set.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding [`HarnessConfig::files_dir`]
pub const FILES_DIR_ENV: &str = "RESBIO_FILES_DIR";
/// Environment variable overriding [`HarnessConfig::reference_dir`]
pub const REFERENCE_DIR_ENV: &str = "RESBIO_REFERENCE_DIR";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Directory upload processes read their input files from; see
    /// [`crate::Harness::in_process`]
    pub files_dir: PathBuf,
    /// Directory holding reference outputs
    pub reference_dir: PathBuf,
    /// Stop a suite after the first failed scenario
    pub stop_on_first_failure: bool,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            files_dir: PathBuf::from("tests/files"),
            reference_dir: PathBuf::from("tests/files"),
            stop_on_first_failure: false,
            log_filter: "info".to_string(),
        }
    }
}

impl HarnessConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With input files directory
    #[inline]
    #[must_use]
    pub fn with_files_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.files_dir = dir.into();
        self
    }

    /// With reference outputs directory
    #[inline]
    #[must_use]
    pub fn with_reference_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reference_dir = dir.into();
        self
    }

    /// With suite fail-fast behavior
    #[inline]
    #[must_use]
    pub fn with_stop_on_first_failure(mut self, stop: bool) -> Self {
        self.stop_on_first_failure = stop;
        self
    }

    /// Parse TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file and apply environment overrides
    ///
    /// # Errors
    /// Fails when the file is unreadable or malformed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml_str(&text)?.with_env_overrides())
    }

    /// Apply `RESBIO_FILES_DIR` / `RESBIO_REFERENCE_DIR`
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = var(FILES_DIR_ENV) {
            self.files_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var(REFERENCE_DIR_ENV) {
            self.reference_dir = PathBuf::from(dir);
        }
        self
    }

    /// Path of a reference output
    #[inline]
    #[must_use]
    pub fn reference_path(&self, name: &str) -> PathBuf {
        self.reference_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HarnessConfig::new();
        assert_eq!(config.files_dir, PathBuf::from("tests/files"));
        assert!(!config.stop_on_first_failure);
        assert_eq!(
            config.reference_path("etc.json.gz"),
            PathBuf::from("tests/files/etc.json.gz")
        );
    }

    #[test]
    fn parse_partial_toml() {
        let config = HarnessConfig::from_toml_str(
            r#"
            reference_dir = "/data/outputs"
            stop_on_first_failure = true
            "#,
        )
        .unwrap();
        assert_eq!(config.reference_dir, PathBuf::from("/data/outputs"));
        assert_eq!(config.files_dir, PathBuf::from("tests/files"));
        assert!(config.stop_on_first_failure);
    }

    #[test]
    fn parse_rejects_wrong_types() {
        let err = HarnessConfig::from_toml_str("stop_on_first_failure = \"yes\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_replace_dirs() {
        let config = HarnessConfig::new().with_overrides(|key| {
            (key == FILES_DIR_ENV).then(|| "/uploads".to_string())
        });
        assert_eq!(config.files_dir, PathBuf::from("/uploads"));
        assert_eq!(config.reference_dir, PathBuf::from("tests/files"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resbio.toml");
        std::fs::write(&path, "log_filter = \"debug\"\n").unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.log_filter, "debug");

        let err = HarnessConfig::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
