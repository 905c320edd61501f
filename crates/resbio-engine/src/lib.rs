//! resbio engine collaborators
//!
//! The scenario harness talks to two collaborators:
//! - a [`WorkflowEngine`] that runs named processes and tracks data objects
//! - an [`ArtifactStore`] holding produced files and structured blobs
//!
//! [`InMemoryEngine`] is an in-process implementation that runs registered
//! [`ProcessHandler`]s; it ships the standard upload processes only.
//!
//! # Example
//!
//! ```rust,ignore
//! use resbio_engine::prelude::*;
//!
//! let store = Arc::new(FsArtifactStore::new("/tmp/resbio"));
//! let engine = InMemoryEngine::new(store).with_uploads("tests/files");
//! let bam = engine.run_process("upload-bam", inputs).await?;
//! assert_eq!(bam.status, DataStatus::Done);
//! ```

#![warn(unreachable_pub)]

pub mod engine;
pub mod error;
pub mod memory;
pub mod process;
pub mod store;
pub mod upload;

pub use engine::WorkflowEngine;
pub use error::{EngineError, ProcessError, StoreError};
pub use memory::InMemoryEngine;
pub use process::{
    data_ref, ChildData, DataLookup, FnProcess, Inputs, ProcessContext, ProcessHandler,
    ProcessOutcome, StaticProcess,
};
pub use store::{ArtifactStore, Compression, FsArtifactStore};
pub use upload::UploadProcess;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with engine collaborators
    pub use crate::{
        data_ref, ArtifactStore, Compression, FsArtifactStore, InMemoryEngine, Inputs,
        ProcessOutcome, WorkflowEngine,
    };
    pub use resbio_model::{DataId, DataObject, DataStatus};
    pub use std::sync::Arc;
}
