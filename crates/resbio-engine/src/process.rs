//! Process handlers
//!
//! A [`ProcessHandler`] is the unit of work the engine runs for a process
//! name. Handlers do not touch storage directly: they return a
//! [`ProcessOutcome`] describing output fields, files and structured blobs,
//! and the engine persists it before the data object turns terminal.

use crate::error::ProcessError;
use async_trait::async_trait;
use resbio_model::{DataId, DataObject};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Input mapping submitted with a process
pub type Inputs = Map<String, Value>;

/// Encode a data object reference for an input mapping
#[inline]
#[must_use]
pub fn data_ref(id: DataId) -> Value {
    Value::String(id.to_string())
}

/// Read access to existing data objects
pub trait DataLookup: Send + Sync {
    /// Current snapshot of a data object
    fn lookup(&self, id: DataId) -> Option<DataObject>;
}

/// Everything a handler may see while running
pub struct ProcessContext {
    data_id: DataId,
    process: String,
    inputs: Inputs,
    lookup: Arc<dyn DataLookup>,
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("data_id", &self.data_id)
            .field("process", &self.process)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

impl ProcessContext {
    /// Create context
    #[must_use]
    pub fn new(
        data_id: DataId,
        process: impl Into<String>,
        inputs: Inputs,
        lookup: Arc<dyn DataLookup>,
    ) -> Self {
        Self {
            data_id,
            process: process.into(),
            inputs,
            lookup,
        }
    }

    /// Data object being produced
    #[inline]
    #[must_use]
    pub fn data_id(&self) -> DataId {
        self.data_id
    }

    /// Process name
    #[inline]
    #[must_use]
    pub fn process(&self) -> &str {
        &self.process
    }

    /// Full input mapping
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    /// Optional input
    #[inline]
    #[must_use]
    pub fn input(&self, key: &str) -> Option<&Value> {
        self.inputs.get(key)
    }

    /// Required input
    ///
    /// # Errors
    /// Returns [`ProcessError::MissingInput`] when absent.
    pub fn require(&self, key: &str) -> Result<&Value, ProcessError> {
        self.inputs
            .get(key)
            .ok_or_else(|| ProcessError::MissingInput(key.to_string()))
    }

    /// Required string input
    ///
    /// # Errors
    /// Fails when absent or not a string.
    pub fn require_str(&self, key: &str) -> Result<&str, ProcessError> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| ProcessError::InvalidInput {
                key: key.to_string(),
                reason: "expected a string".to_string(),
            })
    }

    /// Resolve a single data reference input
    ///
    /// # Errors
    /// Fails when absent, malformed or pointing at an unknown object.
    pub fn data(&self, key: &str) -> Result<DataObject, ProcessError> {
        let value = self.require(key)?;
        self.resolve(key, value)
    }

    /// Resolve a list of data reference inputs
    ///
    /// # Errors
    /// Fails when absent, not a list, or any element fails to resolve.
    pub fn data_list(&self, key: &str) -> Result<Vec<DataObject>, ProcessError> {
        let items = self
            .require(key)?
            .as_array()
            .ok_or_else(|| ProcessError::InvalidInput {
                key: key.to_string(),
                reason: "expected a list of data references".to_string(),
            })?;
        items.iter().map(|v| self.resolve(key, v)).collect()
    }

    fn resolve(&self, key: &str, value: &Value) -> Result<DataObject, ProcessError> {
        let id: DataId = value
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProcessError::InvalidInput {
                key: key.to_string(),
                reason: format!("not a data reference: {value}"),
            })?;
        self.lookup.lookup(id).ok_or(ProcessError::UnknownData(id))
    }
}

/// Files, fields and blobs produced by a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOutcome {
    /// Output fields (artifact references and scalars)
    pub output: Map<String, Value>,
    /// Files to store, by artifact name
    pub files: Vec<(String, Vec<u8>)>,
    /// Structured blobs to store, by output key
    pub storages: Vec<(String, Value)>,
    /// Additional data objects spawned by the run
    pub children: Vec<ChildData>,
}

impl ProcessOutcome {
    /// Create empty outcome
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar or structured output field
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }

    /// Store a file and reference it from an output
    #[must_use]
    pub fn file(mut self, key: impl Into<String>, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        self.output
            .insert(key.into(), serde_json::json!({ "file": name.clone() }));
        self.files.push((name, bytes));
        self
    }

    /// Store files under a directory and reference it from an output
    ///
    /// The output records the directory name and the total size of its files.
    #[must_use]
    pub fn dir(
        mut self,
        key: impl Into<String>,
        dir: impl Into<String>,
        files: Vec<(String, Vec<u8>)>,
    ) -> Self {
        let dir = dir.into();
        let total_size: usize = files.iter().map(|(_, bytes)| bytes.len()).sum();
        self.output.insert(
            key.into(),
            serde_json::json!({ "dir": dir.clone(), "total_size": total_size }),
        );
        for (name, bytes) in files {
            self.files.push((format!("{dir}/{name}"), bytes));
        }
        self
    }

    /// Store a structured blob and reference it from an output
    #[must_use]
    pub fn storage(mut self, key: impl Into<String>, value: Value) -> Self {
        self.storages.push((key.into(), value));
        self
    }

    /// Spawn an additional data object
    #[must_use]
    pub fn child(mut self, child: ChildData) -> Self {
        self.children.push(child);
        self
    }
}

/// A data object created as a side effect of another process
#[derive(Debug, Clone, PartialEq)]
pub struct ChildData {
    /// Process name recorded on the child
    pub process: String,
    /// Output fields
    pub output: Map<String, Value>,
    /// Files to store for the child
    pub files: Vec<(String, Vec<u8>)>,
}

impl ChildData {
    /// Create child of a process
    #[must_use]
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            output: Map::new(),
            files: Vec::new(),
        }
    }

    /// Set output field
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }

    /// Store a file and reference it from an output
    #[must_use]
    pub fn file(mut self, key: impl Into<String>, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        self.output
            .insert(key.into(), serde_json::json!({ "file": name.clone() }));
        self.files.push((name, bytes));
        self
    }
}

/// Work run by the engine for one process name
#[async_trait]
pub trait ProcessHandler: Send + Sync {
    /// Input keys the process schema requires
    fn required_inputs(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run the process
    async fn run(&self, ctx: &ProcessContext) -> Result<ProcessOutcome, ProcessError>;
}

/// Handler returning the same outcome on every run
#[derive(Debug, Clone, Default)]
pub struct StaticProcess {
    required: Vec<String>,
    outcome: ProcessOutcome,
}

impl StaticProcess {
    /// Create handler with a fixed outcome
    #[inline]
    #[must_use]
    pub fn new(outcome: ProcessOutcome) -> Self {
        Self {
            required: Vec::new(),
            outcome,
        }
    }

    /// Declare required input keys
    #[must_use]
    pub fn requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(keys.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl ProcessHandler for StaticProcess {
    fn required_inputs(&self) -> Vec<String> {
        self.required.clone()
    }

    async fn run(&self, _ctx: &ProcessContext) -> Result<ProcessOutcome, ProcessError> {
        Ok(self.outcome.clone())
    }
}

/// Handler backed by a synchronous closure
pub struct FnProcess<F> {
    required: Vec<String>,
    f: F,
}

impl<F> FnProcess<F>
where
    F: Fn(&ProcessContext) -> Result<ProcessOutcome, ProcessError> + Send + Sync,
{
    /// Wrap a closure
    #[inline]
    #[must_use]
    pub fn new(f: F) -> Self {
        Self {
            required: Vec::new(),
            f,
        }
    }

    /// Declare required input keys
    #[must_use]
    pub fn requires<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(keys.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl<F> ProcessHandler for FnProcess<F>
where
    F: Fn(&ProcessContext) -> Result<ProcessOutcome, ProcessError> + Send + Sync,
{
    fn required_inputs(&self) -> Vec<String> {
        self.required.clone()
    }

    async fn run(&self, ctx: &ProcessContext) -> Result<ProcessOutcome, ProcessError> {
        (self.f)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use serde_json::json;

    #[derive(Default)]
    struct MapLookup(DashMap<DataId, DataObject>);

    impl DataLookup for MapLookup {
        fn lookup(&self, id: DataId) -> Option<DataObject> {
            self.0.get(&id).map(|d| d.clone())
        }
    }

    fn context(inputs: Inputs, known: Vec<DataObject>) -> ProcessContext {
        let lookup = MapLookup::default();
        for data in known {
            lookup.0.insert(data.id, data);
        }
        ProcessContext::new(DataId::new(), "test", inputs, Arc::new(lookup))
    }

    #[test]
    fn resolves_data_references() {
        let upstream = DataObject::new("upload-bam", Map::new());
        let mut inputs = Inputs::new();
        inputs.insert("alignment".into(), data_ref(upstream.id));
        inputs.insert("exps".into(), json!([upstream.id.to_string()]));
        inputs.insert("bad".into(), json!(7));

        let ctx = context(inputs, vec![upstream.clone()]);
        assert_eq!(ctx.data("alignment").unwrap().id, upstream.id);
        assert_eq!(ctx.data_list("exps").unwrap().len(), 1);
        assert!(matches!(ctx.data("bad"), Err(ProcessError::InvalidInput { .. })));
        assert!(matches!(ctx.data("nothing"), Err(ProcessError::MissingInput(_))));
    }

    #[test]
    fn unknown_reference_is_reported() {
        let mut inputs = Inputs::new();
        inputs.insert("alignment".into(), data_ref(DataId::new()));
        let ctx = context(inputs, Vec::new());
        assert!(matches!(ctx.data("alignment"), Err(ProcessError::UnknownData(_))));
    }

    #[test]
    fn outcome_builders() {
        let outcome = ProcessOutcome::new()
            .file("rc", "rc.tab.gz", vec![1, 2])
            .dir("index", "salmon_index", vec![("a.bin".into(), vec![0; 10])])
            .field("species", json!("Homo sapiens"))
            .storage("exp_json", json!({"genes": {}}));

        assert_eq!(outcome.output["rc"], json!({"file": "rc.tab.gz"}));
        assert_eq!(outcome.output["index"], json!({"dir": "salmon_index", "total_size": 10}));
        assert_eq!(outcome.files[1].0, "salmon_index/a.bin");
        assert_eq!(outcome.storages.len(), 1);
    }

    #[tokio::test]
    async fn fn_process_runs_closure() {
        let handler = FnProcess::new(|ctx: &ProcessContext| {
            let name = ctx.require_str("name")?;
            Ok(ProcessOutcome::new().field("echo", json!(name)))
        })
        .requires(["name"]);

        assert_eq!(handler.required_inputs(), vec!["name".to_string()]);

        let mut inputs = Inputs::new();
        inputs.insert("name".into(), json!("x"));
        let outcome = handler.run(&context(inputs, Vec::new())).await.unwrap();
        assert_eq!(outcome.output["echo"], json!("x"));

        let err = handler.run(&context(Inputs::new(), Vec::new())).await.unwrap_err();
        assert!(matches!(err, ProcessError::MissingInput(_)));
    }
}
