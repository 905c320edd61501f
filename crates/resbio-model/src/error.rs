//! Error types for the model crate

use crate::data::DataStatus;
use crate::ids::{CollectionId, SampleId};
use crate::permission::Permission;

/// Model error type
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Identifier could not be parsed
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Data status transition not allowed
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: DataStatus,
        /// Requested status
        to: DataStatus,
    },

    /// Sample does not exist
    #[error("sample not found: {0}")]
    SampleNotFound(SampleId),

    /// Collection does not exist
    #[error("collection not found: {0}")]
    CollectionNotFound(CollectionId),

    /// Permission policy rejected the operation
    #[error("user {user} lacks {} on sample {sample}", .permission.codename())]
    PermissionDenied {
        /// Acting user
        user: String,
        /// Missing permission
        permission: Permission,
        /// Target sample
        sample: SampleId,
    },

    /// Sample name is empty
    #[error("sample name must not be empty")]
    EmptyName,
}

impl ModelError {
    /// Check if error is a permission rejection
    #[inline]
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}
