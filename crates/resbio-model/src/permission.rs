//! Sample permissions
//!
//! Enforcement rules belong to the host framework; this crate only names the
//! permissions and consults a [`PermissionPolicy`] before each store operation.

use crate::ids::SampleId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Operations that can be granted on a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Read the sample
    View,
    /// Rename, change membership, delete
    Edit,
    /// Grant permissions to others
    Share,
    /// Download files of member data
    Download,
    /// Add data objects
    Add,
}

impl Permission {
    /// Every permission, in declaration order
    pub const ALL: [Permission; 5] = [
        Permission::View,
        Permission::Edit,
        Permission::Share,
        Permission::Download,
        Permission::Add,
    ];

    /// Codename registered with the host framework
    #[inline]
    #[must_use]
    pub fn codename(self) -> &'static str {
        match self {
            Self::View => "view_sample",
            Self::Edit => "edit_sample",
            Self::Share => "share_sample",
            Self::Download => "download_sample",
            Self::Add => "add_sample",
        }
    }

    /// Human-readable description
    #[inline]
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::View => "Can view sample",
            Self::Edit => "Can edit sample",
            Self::Share => "Can share sample",
            Self::Download => "Can download files from sample",
            Self::Add => "Can add data objects to sample",
        }
    }

    /// Parse a codename
    #[must_use]
    pub fn from_codename(codename: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.codename() == codename)
    }
}

/// Decides whether a user may perform an operation on a sample
pub trait PermissionPolicy: Send + Sync {
    /// Check a single permission
    fn allows(&self, user: &str, sample: SampleId, permission: Permission) -> bool;
}

/// Policy that grants everything
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl PermissionPolicy for AllowAll {
    fn allows(&self, _user: &str, _sample: SampleId, _permission: Permission) -> bool {
        true
    }
}

/// Explicit per-user, per-sample grants
#[derive(Debug, Default)]
pub struct GrantTable {
    grants: DashMap<(String, SampleId), BTreeSet<Permission>>,
}

impl GrantTable {
    /// Create empty grant table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a permission
    pub fn grant(&self, user: &str, sample: SampleId, permission: Permission) {
        self.grants
            .entry((user.to_string(), sample))
            .or_default()
            .insert(permission);
    }

    /// Grant every permission (owner)
    pub fn grant_all(&self, user: &str, sample: SampleId) {
        for permission in Permission::ALL {
            self.grant(user, sample, permission);
        }
    }

    /// Revoke a permission, returning whether it was held
    pub fn revoke(&self, user: &str, sample: SampleId, permission: Permission) -> bool {
        self.grants
            .get_mut(&(user.to_string(), sample))
            .is_some_and(|mut held| held.remove(&permission))
    }

    /// Permissions held by a user on a sample
    #[must_use]
    pub fn held(&self, user: &str, sample: SampleId) -> BTreeSet<Permission> {
        self.grants
            .get(&(user.to_string(), sample))
            .map(|held| held.clone())
            .unwrap_or_default()
    }
}

impl PermissionPolicy for GrantTable {
    fn allows(&self, user: &str, sample: SampleId, permission: Permission) -> bool {
        self.grants
            .get(&(user.to_string(), sample))
            .is_some_and(|held| held.contains(&permission))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codenames_and_descriptions() {
        assert_eq!(Permission::Download.codename(), "download_sample");
        assert_eq!(Permission::Add.description(), "Can add data objects to sample");
        assert_eq!(Permission::from_codename("edit_sample"), Some(Permission::Edit));
        assert_eq!(Permission::from_codename("delete_sample"), None);
    }

    #[test]
    fn grant_table_grant_and_revoke() {
        let table = GrantTable::new();
        let sample = SampleId::new();

        assert!(!table.allows("bob", sample, Permission::View));
        table.grant("bob", sample, Permission::View);
        assert!(table.allows("bob", sample, Permission::View));
        assert!(!table.allows("bob", sample, Permission::Edit));

        assert!(table.revoke("bob", sample, Permission::View));
        assert!(!table.revoke("bob", sample, Permission::View));
        assert!(table.held("bob", sample).is_empty());
    }

    #[test]
    fn grant_all_covers_every_permission() {
        let table = GrantTable::new();
        let sample = SampleId::new();
        table.grant_all("owner", sample);
        assert_eq!(table.held("owner", sample).len(), Permission::ALL.len());
    }

    #[test]
    fn allow_all_allows() {
        assert!(AllowAll.allows("anyone", SampleId::new(), Permission::Share));
    }
}
