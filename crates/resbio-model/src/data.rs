//! Data objects produced by process invocations
//!
//! A [`DataObject`] carries the processing status, the input mapping it was
//! submitted with and the output mapping the process produced. Descriptive
//! fields (`species`, `build`, `source`, `feature_type`) live in the output
//! mapping next to artifact references such as `{"file": "rc.tab.gz"}`.

use crate::error::ModelError;
use crate::ids::DataId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Processing status of a data object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
    /// Submitted, waiting for a worker
    Pending,
    /// Process is running
    Running,
    /// Finished successfully
    Done,
    /// Finished with an error
    Error,
}

impl DataStatus {
    /// Whether no further transition can happen
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Short status code as stored by the engine
    #[inline]
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Pending => "WT",
            Self::Running => "PR",
            Self::Done => "OK",
            Self::Error => "ER",
        }
    }

    /// Statuses reachable from this one
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [DataStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Error],
            Self::Running => &[Self::Done, Self::Error],
            Self::Done | Self::Error => &[],
        }
    }

    /// Validate a transition to `to`
    ///
    /// # Errors
    /// Returns [`ModelError::IllegalTransition`] when `to` is not reachable.
    pub fn validate_transition(self, to: DataStatus) -> Result<(), ModelError> {
        if self.allowed_transitions().contains(&to) {
            Ok(())
        } else {
            Err(ModelError::IllegalTransition { from: self, to })
        }
    }
}

impl fmt::Display for DataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Result of one process invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    /// Identity
    pub id: DataId,
    /// Name of the process that produced this object
    pub process: String,
    /// Processing status
    pub status: DataStatus,
    /// Inputs the process was submitted with
    pub input: Map<String, Value>,
    /// Outputs and descriptive fields
    pub output: Map<String, Value>,
    /// Error messages reported by the process
    pub error: Vec<String>,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

impl DataObject {
    /// Create a pending data object
    #[must_use]
    pub fn new(process: impl Into<String>, input: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: DataId::new(),
            process: process.into(),
            status: DataStatus::Pending,
            input,
            output: Map::new(),
            error: Vec::new(),
            created: now,
            modified: now,
        }
    }

    /// Move to a new status
    ///
    /// # Errors
    /// Returns [`ModelError::IllegalTransition`] for transitions out of a
    /// terminal status or skipping `running`.
    pub fn transition(&mut self, to: DataStatus) -> Result<(), ModelError> {
        self.status.validate_transition(to)?;
        tracing::debug!(
            data = %self.id,
            process = %self.process,
            from = %self.status,
            %to,
            "status transition"
        );
        self.status = to;
        self.modified = Utc::now();
        Ok(())
    }

    /// Look up an output field by dotted path (`rsem_index.dir`)
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.output.get(first)?;
        for segment in segments {
            current = descend(current, segment)?;
        }
        Some(current)
    }

    /// Remove an output field by dotted path, returning the removed value
    pub fn remove_field(&mut self, path: &str) -> Option<Value> {
        match path.rsplit_once('.') {
            None => self.output.remove(path),
            Some((parent, leaf)) => {
                let mut segments = parent.split('.');
                let first = segments.next()?;
                let mut current = self.output.get_mut(first)?;
                for segment in segments {
                    current = descend_mut(current, segment)?;
                }
                match current {
                    Value::Object(map) => map.remove(leaf),
                    Value::Array(items) => {
                        let idx: usize = leaf.parse().ok()?;
                        (idx < items.len()).then(|| items.remove(idx))
                    }
                    _ => None,
                }
            }
        }
    }

    /// File name referenced by an output (`{"file": ...}`)
    #[must_use]
    pub fn file(&self, key: &str) -> Option<&str> {
        self.output.get(key)?.get("file")?.as_str()
    }

    /// Directory name referenced by an output (`{"dir": ...}`)
    #[must_use]
    pub fn dir(&self, key: &str) -> Option<&str> {
        self.output.get(key)?.get("dir")?.as_str()
    }

    /// Organism species
    #[must_use]
    pub fn species(&self) -> Option<&str> {
        self.output.get("species")?.as_str()
    }

    /// Genome build
    #[must_use]
    pub fn build(&self) -> Option<&str> {
        self.output.get("build")?.as_str()
    }

    /// Source authority of annotations
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.output.get("source")?.as_str()
    }

    /// Feature type of expression values
    #[must_use]
    pub fn feature_type(&self) -> Option<&str> {
        self.output.get("feature_type")?.as_str()
    }
}

fn descend<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => items.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

fn descend_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn indexed() -> DataObject {
        let mut data = DataObject::new("index-fasta-nucl", Map::new());
        data.output.insert(
            "rsem_index".to_string(),
            json!({"dir": "rsem", "total_size": 1234}),
        );
        data.output.insert("species".to_string(), json!("Homo sapiens"));
        data.output.insert("fastq".to_string(), json!([{"file": "a.fastq.gz"}]));
        data
    }

    #[test]
    fn status_transitions() {
        assert!(DataStatus::Pending.validate_transition(DataStatus::Running).is_ok());
        assert!(DataStatus::Running.validate_transition(DataStatus::Done).is_ok());
        assert!(DataStatus::Running.validate_transition(DataStatus::Error).is_ok());
        assert!(DataStatus::Pending.validate_transition(DataStatus::Done).is_err());
        assert!(DataStatus::Done.validate_transition(DataStatus::Error).is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(DataStatus::Done.is_terminal());
        assert!(DataStatus::Error.is_terminal());
        assert!(!DataStatus::Running.is_terminal());
        assert_eq!(DataStatus::Error.code(), "ER");
    }

    #[test]
    fn transition_updates_status() {
        let mut data = DataObject::new("upload-bam", Map::new());
        data.transition(DataStatus::Running).unwrap();
        data.transition(DataStatus::Done).unwrap();
        assert_eq!(data.status, DataStatus::Done);
        assert!(data.transition(DataStatus::Running).is_err());
    }

    #[test]
    fn dotted_field_lookup() {
        let data = indexed();
        assert_eq!(data.field("rsem_index.dir"), Some(&json!("rsem")));
        assert_eq!(data.field("fastq.0.file"), Some(&json!("a.fastq.gz")));
        assert_eq!(data.field("rsem_index.missing"), None);
        assert_eq!(data.species(), Some("Homo sapiens"));
        assert_eq!(data.dir("rsem_index"), Some("rsem"));
    }

    #[test]
    fn remove_nested_field() {
        let mut data = indexed();
        assert_eq!(data.remove_field("rsem_index.total_size"), Some(json!(1234)));
        assert_eq!(data.field("rsem_index"), Some(&json!({"dir": "rsem"})));
        assert_eq!(data.remove_field("species"), Some(json!("Homo sapiens")));
        assert_eq!(data.remove_field("nothing.here"), None);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(DataStatus::Done).unwrap(), json!("done"));
    }
}
