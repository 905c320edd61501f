//! resbio scenario harness
//!
//! Declarative tests for bioinformatics processes:
//! - [`fixtures`] prepare standard inputs through upload processes
//! - [`Harness`] runs a process and checks its terminal status
//! - [`assertions`] compare outputs against reference files and values
//! - [`Scenario`]s chain preparation and verification steps by binding
//! - [`ScenarioRegistry`] selects scenarios by the processes they exercise
//!
//! # Example
//!
//! ```rust,ignore
//! use resbio_harness::prelude::*;
//!
//! let registry = ScenarioRegistry::with_defaults()?;
//! let runner = ScenarioRunner::new(Harness::new(engine, store, HarnessConfig::new()));
//! let report = runner.run_tagged(&registry, "htseq-count").await;
//! println!("{}", report.generate_text());
//! ```

#![warn(unreachable_pub)]

pub mod assertions;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod registry;
pub mod runner;
pub mod scenario;
pub mod suites;

pub use config::{ConfigError, HarnessConfig};
pub use error::{HarnessError, Mismatch, Phase, RegistryError, ScenarioError};
pub use fixtures::FixtureSpec;
pub use harness::Harness;
pub use registry::ScenarioRegistry;
pub use runner::{ScenarioOutcome, ScenarioRunner, StepFailure, SuiteReport};
pub use scenario::{Action, Check, Expect, InputTemplate, InputValue, Scenario, Step};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing and running scenarios
    pub use crate::{
        Check, Expect, FixtureSpec, Harness, HarnessConfig, HarnessError, InputTemplate, Phase,
        Scenario, ScenarioRegistry, ScenarioRunner, Step, SuiteReport,
    };
    pub use resbio_engine::{Compression, Inputs};
    pub use resbio_model::{DataObject, DataStatus};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
