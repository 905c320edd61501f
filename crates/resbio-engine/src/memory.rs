//! In-process reference engine
//!
//! Runs registered [`ProcessHandler`]s on the tokio runtime, one task per
//! submission. Status changes are published through a `watch` channel per
//! data object, so waiters wake exactly when the object turns terminal.

use crate::engine::WorkflowEngine;
use crate::error::{EngineError, ProcessError, StoreError};
use crate::process::{ChildData, DataLookup, Inputs, ProcessContext, ProcessHandler, ProcessOutcome};
use crate::store::ArtifactStore;
use crate::upload::UploadProcess;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use resbio_model::{DataId, DataObject, DataStatus};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinError;

struct Inner {
    processes: DashMap<String, Arc<dyn ProcessHandler>>,
    records: DashMap<DataId, watch::Sender<DataObject>>,
    order: Mutex<Vec<DataId>>,
    store: Arc<dyn ArtifactStore>,
}

/// Engine executing handlers in the current process
#[derive(Clone)]
pub struct InMemoryEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("processes", &self.processes())
            .field("data", &self.inner.records.len())
            .finish_non_exhaustive()
    }
}

impl InMemoryEngine {
    /// Create engine with no processes, storing artifacts in `store`
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                processes: DashMap::new(),
                records: DashMap::new(),
                order: Mutex::new(Vec::new()),
                store,
            }),
        }
    }

    /// Register the standard upload processes reading from `upload_dir`
    #[must_use]
    pub fn with_uploads(self, upload_dir: impl AsRef<Path>) -> Self {
        for (name, upload) in UploadProcess::catalog(upload_dir) {
            self.register(name, upload);
        }
        self
    }

    /// Register (or replace) a handler under a process name
    pub fn register(&self, name: &str, handler: impl ProcessHandler + 'static) {
        self.register_arc(name, Arc::new(handler));
    }

    /// Register a shared handler
    pub fn register_arc(&self, name: &str, handler: Arc<dyn ProcessHandler>) {
        tracing::debug!(process = name, "process registered");
        self.inner.processes.insert(name.to_string(), handler);
    }

    /// Registered process names, sorted
    #[must_use]
    pub fn processes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .processes
            .iter()
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Artifact store shared with handlers
    #[inline]
    #[must_use]
    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        Arc::clone(&self.inner.store)
    }

    /// Number of data objects created so far
    #[inline]
    #[must_use]
    pub fn data_count(&self) -> usize {
        self.inner.records.len()
    }
}

impl Inner {
    fn insert(&self, data: DataObject) -> DataId {
        let id = data.id;
        let (tx, _rx) = watch::channel(data);
        self.records.insert(id, tx);
        self.order.lock().push(id);
        id
    }

    fn update(
        &self,
        id: DataId,
        f: impl FnOnce(&mut DataObject) -> Result<(), EngineError>,
    ) -> Result<(), EngineError> {
        let tx = self.records.get(&id).ok_or(EngineError::UnknownData(id))?;
        let mut result = Ok(());
        tx.send_modify(|data| result = f(data));
        result
    }

    fn fail(&self, id: DataId, message: String) {
        tracing::warn!(data = %id, error = %message, "process failed");
        let outcome = self.update(id, |data| {
            data.error.push(message);
            data.transition(DataStatus::Error)?;
            Ok(())
        });
        if let Err(e) = outcome {
            tracing::error!(data = %id, error = %e, "cannot record process failure");
        }
    }

    async fn execute(self: Arc<Self>, id: DataId, handler: Arc<dyn ProcessHandler>) {
        let snapshot = match self.update(id, |data| Ok(data.transition(DataStatus::Running)?)) {
            Ok(()) => self.lookup(id),
            Err(e) => {
                tracing::error!(data = %id, error = %e, "cannot start process");
                return;
            }
        };
        let Some(snapshot) = snapshot else {
            return;
        };

        let lookup: Arc<dyn DataLookup> = self.clone();
        let ctx = ProcessContext::new(id, snapshot.process.clone(), snapshot.input, lookup);

        // A panicking handler must still leave the data object terminal.
        let run = tokio::spawn(async move { handler.run(&ctx).await });
        let result = match run.await {
            Ok(Ok(outcome)) => self.persist(id, outcome).await.map_err(ProcessError::from),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(ProcessError::Failed(crash_message(e))),
        };

        match result {
            Ok(output) => {
                let done = self.update(id, |data| {
                    data.output = output;
                    data.transition(DataStatus::Done)?;
                    Ok(())
                });
                match done {
                    Ok(()) => {
                        tracing::debug!(data = %id, process = %snapshot.process, "process done");
                    }
                    Err(e) => self.fail(id, e.to_string()),
                }
            }
            Err(e) => self.fail(id, e.to_string()),
        }
    }

    async fn persist(
        &self,
        id: DataId,
        outcome: ProcessOutcome,
    ) -> Result<Map<String, Value>, StoreError> {
        let ProcessOutcome {
            mut output,
            files,
            storages,
            children,
        } = outcome;

        for (name, bytes) in &files {
            self.store.write_file(id, name, bytes).await?;
        }
        for (key, value) in &storages {
            let storage = self.store.write_storage(value).await?;
            output.insert(key.clone(), Value::String(storage.to_string()));
        }
        for child in children {
            self.spawn_child(id, child).await?;
        }
        Ok(output)
    }

    async fn spawn_child(&self, parent: DataId, child: ChildData) -> Result<DataId, StoreError> {
        let mut data = DataObject::new(child.process, Map::new());
        for (name, bytes) in &child.files {
            self.store.write_file(data.id, name, bytes).await?;
        }
        data.output = child.output;
        data.status = DataStatus::Done;
        tracing::debug!(%parent, child = %data.id, process = %data.process, "child data created");
        Ok(self.insert(data))
    }
}

fn crash_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("process aborted: {err}");
    }
    let payload = err.into_panic();
    let reason = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("process panicked: {reason}")
}

impl DataLookup for Inner {
    fn lookup(&self, id: DataId) -> Option<DataObject> {
        self.records.get(&id).map(|tx| tx.borrow().clone())
    }
}

#[async_trait]
impl WorkflowEngine for InMemoryEngine {
    async fn submit(&self, process: &str, inputs: Inputs) -> Result<DataId, EngineError> {
        let handler = self
            .inner
            .processes
            .get(process)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| EngineError::UnknownProcess(process.to_string()))?;

        let missing: Vec<String> = handler
            .required_inputs()
            .into_iter()
            .filter(|key| !inputs.contains_key(key))
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::InvalidInputs {
                process: process.to_string(),
                missing,
            });
        }

        let id = self.inner.insert(DataObject::new(process, inputs));
        tracing::debug!(data = %id, process, "submitted");
        tokio::spawn(Arc::clone(&self.inner).execute(id, handler));
        Ok(id)
    }

    async fn wait_terminal(&self, id: DataId) -> Result<DataObject, EngineError> {
        let mut rx = self
            .inner
            .records
            .get(&id)
            .map(|tx| tx.subscribe())
            .ok_or(EngineError::UnknownData(id))?;
        let data = rx
            .wait_for(|data| data.status.is_terminal())
            .await
            .map_err(|_| EngineError::Closed(id))?
            .clone();
        Ok(data)
    }

    async fn get(&self, id: DataId) -> Result<DataObject, EngineError> {
        self.inner.lookup(id).ok_or(EngineError::UnknownData(id))
    }

    async fn latest(&self) -> Result<Option<DataObject>, EngineError> {
        let last = self.inner.order.lock().last().copied();
        Ok(last.and_then(|id| self.inner.lookup(id)))
    }
}
