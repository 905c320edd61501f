//! Process invocation
//!
//! [`Harness`] submits work to a [`WorkflowEngine`], waits for the terminal
//! status and checks it against the expected one. Fixture preparation and
//! assertions are layered on top in [`crate::fixtures`] and
//! [`crate::assertions`].

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::scenario::Expect;
use resbio_engine::{ArtifactStore, InMemoryEngine, Inputs, WorkflowEngine};
use resbio_model::{DataObject, DataStatus};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Runs processes and checks their outputs
#[derive(Clone)]
pub struct Harness {
    engine: Arc<dyn WorkflowEngine>,
    store: Arc<dyn ArtifactStore>,
    config: HarnessConfig,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Create harness over an engine and its artifact store
    #[must_use]
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        store: Arc<dyn ArtifactStore>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    /// Harness over an in-process engine whose uploads read from
    /// `config.files_dir`
    ///
    /// The engine is returned too, for registering the processes under test.
    #[must_use]
    pub fn in_process(
        store: Arc<dyn ArtifactStore>,
        config: HarnessConfig,
    ) -> (InMemoryEngine, Self) {
        let engine = InMemoryEngine::new(Arc::clone(&store)).with_uploads(&config.files_dir);
        let harness = Self::new(Arc::new(engine.clone()), store, config);
        (engine, harness)
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Workflow engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn WorkflowEngine> {
        &self.engine
    }

    /// Artifact store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Run a process under test, expecting it to finish `done`
    ///
    /// # Errors
    /// Fails on engine rejection or any other terminal status.
    pub async fn run_process(
        &self,
        process: &str,
        inputs: Inputs,
    ) -> Result<DataObject, HarnessError> {
        self.run_expecting(process, inputs, Expect::Done).await
    }

    /// Run a process under test, expecting the given terminal status
    ///
    /// # Errors
    /// Returns [`HarnessError::UnexpectedStatus`] when a run expected to
    /// succeed fails, and [`HarnessError::ExpectedFailureNotObserved`] when a
    /// run expected to fail succeeds.
    pub async fn run_expecting(
        &self,
        process: &str,
        inputs: Inputs,
        expect: Expect,
    ) -> Result<DataObject, HarnessError> {
        let span = info_span!("run_process", process, expect = ?expect);
        async {
            let data = self.engine.run_process(process, inputs).await?;
            info!(data = %data.id, status = %data.status, "process finished");
            check_status(process, data, expect)
        }
        .instrument(span)
        .await
    }

    /// Run a preparation process
    ///
    /// Any failure is reported as a setup failure.
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] wrapping the underlying failure.
    pub async fn prepare_process(
        &self,
        process: &str,
        inputs: Inputs,
    ) -> Result<DataObject, HarnessError> {
        self.prepare_expecting(process, inputs, Expect::Done).await
    }

    /// Run a preparation process expecting the given terminal status
    ///
    /// # Errors
    /// Returns [`HarnessError::Setup`] wrapping the underlying failure.
    pub async fn prepare_expecting(
        &self,
        process: &str,
        inputs: Inputs,
        expect: Expect,
    ) -> Result<DataObject, HarnessError> {
        let span = info_span!("prepare", process);
        self.run_expecting(process, inputs, expect)
            .instrument(span)
            .await
            .map_err(|e| HarnessError::setup(format!("run {process}"), e))
    }

    /// Most recently created data object
    ///
    /// # Errors
    /// Returns [`HarnessError::NoData`] when the engine has no data objects.
    pub async fn latest(&self) -> Result<DataObject, HarnessError> {
        self.engine.latest().await?.ok_or(HarnessError::NoData)
    }
}

fn check_status(
    process: &str,
    data: DataObject,
    expect: Expect,
) -> Result<DataObject, HarnessError> {
    match (expect, data.status) {
        (Expect::Done, DataStatus::Done) | (Expect::Error, DataStatus::Error) => Ok(data),
        (Expect::Error, DataStatus::Done) => {
            warn!(data = %data.id, "expected failure not observed");
            Err(HarnessError::ExpectedFailureNotObserved {
                process: process.to_string(),
                data: data.id,
            })
        }
        (expect, observed) => {
            warn!(data = %data.id, %observed, errors = ?data.error, "unexpected status");
            Err(HarnessError::UnexpectedStatus {
                process: process.to_string(),
                expected: expect.status(),
                observed,
                errors: data.error,
            })
        }
    }
}
