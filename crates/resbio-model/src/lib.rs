//! resbio model
//!
//! Domain entities shared by the engine and the scenario harness:
//! - [`DataObject`] and its [`DataStatus`] lifecycle
//! - [`Sample`], a named grouping of collections and data objects
//! - sample [`Permission`]s and the [`SampleStore`] persistence seam

#![warn(unreachable_pub)]

pub mod data;
pub mod error;
pub mod ids;
pub mod permission;
pub mod sample;
pub mod store;

pub use data::{DataObject, DataStatus};
pub use error::ModelError;
pub use ids::{CollectionId, DataId, SampleId, StorageId};
pub use permission::{AllowAll, GrantTable, Permission, PermissionPolicy};
pub use sample::{slugify, Collection, Sample};
pub use store::{InMemorySampleStore, SampleStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
