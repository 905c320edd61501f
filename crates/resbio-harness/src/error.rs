//! Error types for the scenario harness
//!
//! Every failure a scenario can produce is a [`HarnessError`]. Failures in a
//! scenario's preparation are wrapped in [`HarnessError::Setup`] so reports
//! can tell a broken fixture apart from a broken process under test.

use resbio_engine::{EngineError, StoreError};
use resbio_model::{DataId, DataStatus};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Scenario phase a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Preparation of fixtures and upstream data
    Setup,
    /// Runs and assertions of the processes under test
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Setup => "setup",
            Self::Verify => "verify",
        })
    }
}

/// Main harness error type
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A preparation step failed
    #[error("setup step {step} failed: {source}")]
    Setup {
        /// Description of the failed step
        step: String,
        /// Underlying failure
        #[source]
        source: Box<HarnessError>,
    },

    /// A run finished with a status other than the expected one
    #[error("{process} finished {observed}, expected {expected}{}", format_errors(.errors))]
    UnexpectedStatus {
        /// Process name
        process: String,
        /// Expected terminal status
        expected: DataStatus,
        /// Observed terminal status
        observed: DataStatus,
        /// Error messages recorded on the data object
        errors: Vec<String>,
    },

    /// A run expected to fail finished successfully
    #[error("{process} was expected to fail but finished done (data {data})")]
    ExpectedFailureNotObserved {
        /// Process name
        process: String,
        /// Data object
        data: DataId,
    },

    /// An artifact or field differs from its reference
    #[error("mismatch: {0}")]
    Mismatch(Box<Mismatch>),

    /// Declared output key absent on the data object
    #[error("data {data} ({process}) has no output {key}")]
    MissingOutput {
        /// Data object
        data: DataId,
        /// Process name
        process: String,
        /// Output key
        key: String,
    },

    /// Output declared but its artifact is not stored
    #[error("output {key} of data {data} references {name}, which is not stored")]
    MissingArtifact {
        /// Data object
        data: DataId,
        /// Output key
        key: String,
        /// Referenced artifact
        name: String,
    },

    /// Reference file unreadable
    #[error("cannot read reference {path}: {source}")]
    Reference {
        /// Reference path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Reference JSON unparsable
    #[error("reference {path} is not valid JSON: {source}")]
    ReferenceJson {
        /// Reference path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Engine has produced no data objects yet
    #[error("engine has no data objects")]
    NoData,

    /// Scenario definition is invalid
    #[error("invalid scenario: {0}")]
    Scenario(#[from] ScenarioError),

    /// Workflow engine failure
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Artifact store failure
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(": {}", errors.join("; "))
    }
}

impl HarnessError {
    /// Wrap a failure as a setup failure of `step`
    #[must_use]
    pub fn setup(step: impl Into<String>, source: HarnessError) -> Self {
        match source {
            already @ Self::Setup { .. } => already,
            source => Self::Setup {
                step: step.into(),
                source: Box::new(source),
            },
        }
    }

    /// Phase the failure belongs to
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Setup { .. } => Phase::Setup,
            _ => Phase::Verify,
        }
    }

    /// Innermost failure, unwrapping setup context
    #[must_use]
    pub fn root(&self) -> &HarnessError {
        match self {
            Self::Setup { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if the failure is a reference comparison mismatch
    #[inline]
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self.root(), Self::Mismatch(_))
    }

    /// Check if the failure is an absent output or artifact
    #[inline]
    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self.root() {
            Self::MissingOutput { .. } | Self::MissingArtifact { .. } => true,
            Self::Store(e) => e.is_missing(),
            _ => false,
        }
    }

    /// Mismatch details, if this is a mismatch
    #[must_use]
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self.root() {
            Self::Mismatch(m) => Some(&**m),
            _ => None,
        }
    }
}

impl From<Mismatch> for HarnessError {
    fn from(mismatch: Mismatch) -> Self {
        Self::Mismatch(Box::new(mismatch))
    }
}

/// Difference between produced output and its reference
#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// File contents differ
    File {
        /// Data object
        data: DataId,
        /// Output key
        key: String,
        /// Reference file name
        reference: String,
        /// First differing line, 1-based
        line: usize,
        /// Reference text at that line
        expected: Option<String>,
        /// Produced text at that line
        actual: Option<String>,
        /// SHA-256 of the decompressed reference
        expected_digest: String,
        /// SHA-256 of the decompressed output
        actual_digest: String,
    },

    /// Output field differs
    Field {
        /// Data object
        data: DataId,
        /// Dotted field path
        path: String,
        /// Expected value
        expected: Value,
        /// Produced value, `None` when absent
        actual: Option<Value>,
    },

    /// Structured output differs from the reference JSON
    Json {
        /// Data object
        data: DataId,
        /// Output key
        key: String,
        /// Reference file name
        reference: String,
        /// Location of the first difference (`$.genes[3]`)
        location: String,
        /// Reference value there, `None` when absent
        expected: Option<Value>,
        /// Produced value there, `None` when absent
        actual: Option<Value>,
    },
}

fn show<T: fmt::Display>(value: Option<&T>) -> String {
    value.map_or_else(|| "<missing>".to_string(), ToString::to_string)
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File {
                data,
                key,
                reference,
                line,
                expected,
                actual,
                expected_digest,
                actual_digest,
            } => write!(
                f,
                "output {key} of {data} differs from {reference} at line {line}: \
                 expected {:?}, got {:?} (sha256 {expected_digest} vs {actual_digest})",
                expected.as_deref().unwrap_or("<eof>"),
                actual.as_deref().unwrap_or("<eof>"),
            ),
            Self::Field {
                data,
                path,
                expected,
                actual,
            } => write!(
                f,
                "field {path} of {data}: expected {expected}, got {}",
                show(actual.as_ref())
            ),
            Self::Json {
                data,
                key,
                reference,
                location,
                expected,
                actual,
            } => write!(
                f,
                "output {key} of {data} differs from {reference} at {location}: expected {}, got {}",
                show(expected.as_ref()),
                show(actual.as_ref())
            ),
        }
    }
}

/// Scenario definition error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    /// Scenario id is empty
    #[error("scenario id is empty")]
    EmptyId,

    /// Two steps bind the same name
    #[error("binding {binding} is defined twice (step {step})")]
    DuplicateBinding {
        /// Step index
        step: usize,
        /// Binding name
        binding: String,
    },

    /// A step refers to a binding no earlier step defines
    #[error("step {step} refers to unknown binding {binding}")]
    UnknownBinding {
        /// Step index
        step: usize,
        /// Binding name
        binding: String,
    },

    /// Assertions belong to verification only
    #[error("step {step} asserts during setup")]
    AssertionInSetup {
        /// Step index
        step: usize,
    },

    /// A step that must produce a binding has none
    #[error("step {step} needs a binding")]
    MissingBinding {
        /// Step index
        step: usize,
    },

    /// Dependency graph has a cycle
    #[error("steps form a dependency cycle")]
    Cycle,
}

/// Scenario registry error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Id already registered
    #[error("scenario already registered: {0}")]
    Duplicate(String),

    /// Scenario failed validation
    #[error("scenario {id} is invalid: {source}")]
    Invalid {
        /// Scenario id
        id: String,
        /// Validation failure
        #[source]
        source: ScenarioError,
    },
}
