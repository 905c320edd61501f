//! Workflow engine collaborator
//!
//! The engine owns process registration, execution and data objects. Callers
//! submit work by process name and observe the resulting [`DataObject`].

use crate::error::EngineError;
use crate::process::Inputs;
use async_trait::async_trait;
use resbio_model::{DataId, DataObject};

/// Executes named processes and tracks their data objects
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Submit a unit of work, returning the identity of its data object
    async fn submit(&self, process: &str, inputs: Inputs) -> Result<DataId, EngineError>;

    /// Wait until the data object reaches a terminal status
    ///
    /// Blocks for as long as the engine takes; there is no timeout here.
    async fn wait_terminal(&self, id: DataId) -> Result<DataObject, EngineError>;

    /// Current snapshot of a data object
    async fn get(&self, id: DataId) -> Result<DataObject, EngineError>;

    /// Most recently created data object
    async fn latest(&self) -> Result<Option<DataObject>, EngineError>;

    /// Submit and wait for the terminal status
    async fn run_process(&self, process: &str, inputs: Inputs) -> Result<DataObject, EngineError> {
        let id = self.submit(process, inputs).await?;
        self.wait_terminal(id).await
    }
}
