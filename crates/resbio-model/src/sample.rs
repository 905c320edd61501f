//! Sample and collection entities

use crate::ids::{CollectionId, DataId, SampleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A collection of data objects owned by the host framework
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Identity
    pub id: CollectionId,
    /// Display name
    pub name: String,
    /// URL-safe name
    pub slug: String,
}

impl Collection {
    /// Create new collection
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: CollectionId::new(),
            slug: slugify(&name),
            name,
        }
    }
}

/// A biological sample: a named grouping of collections and data objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Identity
    pub id: SampleId,
    /// Display name
    pub name: String,
    /// URL-safe name
    pub slug: String,
    /// Free-form description
    pub description: String,
    /// User who created the sample
    pub contributor: String,
    /// Collections the sample belongs to
    pub collections: BTreeSet<CollectionId>,
    /// Data objects grouped by the sample
    pub data: BTreeSet<DataId>,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last modification time
    pub modified: DateTime<Utc>,
}

impl Sample {
    /// Create new sample with no members
    #[must_use]
    pub fn new(name: impl Into<String>, contributor: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: SampleId::new(),
            slug: slugify(&name),
            name,
            description: String::new(),
            contributor: contributor.into(),
            collections: BTreeSet::new(),
            data: BTreeSet::new(),
            created: now,
            modified: now,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whether the sample belongs to a collection
    #[inline]
    #[must_use]
    pub fn in_collection(&self, collection: CollectionId) -> bool {
        self.collections.contains(&collection)
    }

    pub(crate) fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// Lowercase, ASCII alphanumerics, single dashes between words
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
