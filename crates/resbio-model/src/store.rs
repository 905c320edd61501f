//! Sample persistence
//!
//! [`SampleStore`] is the seam to the host framework's ORM. The in-memory
//! implementation checks every operation against a [`PermissionPolicy`] and
//! applies cascade rules: deleting a collection removes it from every sample.

use crate::error::ModelError;
use crate::ids::{CollectionId, DataId, SampleId};
use crate::permission::{AllowAll, Permission, PermissionPolicy};
use crate::sample::{slugify, Collection, Sample};
use dashmap::DashMap;
use std::sync::Arc;

/// Persistence operations on samples
pub trait SampleStore: Send + Sync {
    /// Persist a new sample
    fn create(&self, user: &str, sample: Sample) -> Result<SampleId, ModelError>;

    /// Fetch a sample
    fn get(&self, user: &str, id: SampleId) -> Result<Sample, ModelError>;

    /// Samples visible to the user, oldest first
    fn list(&self, user: &str) -> Vec<Sample>;

    /// Change name (and slug)
    fn rename(&self, user: &str, id: SampleId, name: &str) -> Result<(), ModelError>;

    /// Add the sample to a collection; adding twice is a no-op
    fn add_collection(
        &self,
        user: &str,
        id: SampleId,
        collection: CollectionId,
    ) -> Result<(), ModelError>;

    /// Remove the sample from a collection, returning whether it was a member
    fn remove_collection(
        &self,
        user: &str,
        id: SampleId,
        collection: CollectionId,
    ) -> Result<bool, ModelError>;

    /// Group a data object under the sample
    fn add_data(&self, user: &str, id: SampleId, data: DataId) -> Result<(), ModelError>;

    /// Ungroup a data object, returning whether it was grouped
    fn remove_data(&self, user: &str, id: SampleId, data: DataId) -> Result<bool, ModelError>;

    /// Delete a sample and its membership rows
    fn delete(&self, user: &str, id: SampleId) -> Result<Sample, ModelError>;
}

/// Thread-safe in-memory sample store
pub struct InMemorySampleStore {
    samples: DashMap<SampleId, Sample>,
    collections: DashMap<CollectionId, Collection>,
    policy: Arc<dyn PermissionPolicy>,
}

impl std::fmt::Debug for InMemorySampleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySampleStore")
            .field("samples", &self.samples.len())
            .field("collections", &self.collections.len())
            .finish_non_exhaustive()
    }
}

impl InMemorySampleStore {
    /// Create store that allows every operation
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(Arc::new(AllowAll))
    }

    /// Create store consulting a permission policy
    #[must_use]
    pub fn with_policy(policy: Arc<dyn PermissionPolicy>) -> Self {
        Self {
            samples: DashMap::new(),
            collections: DashMap::new(),
            policy,
        }
    }

    /// Register a collection owned by the host framework
    pub fn create_collection(&self, collection: Collection) -> CollectionId {
        let id = collection.id;
        self.collections.insert(id, collection);
        id
    }

    /// Fetch a collection
    #[must_use]
    pub fn collection(&self, id: CollectionId) -> Option<Collection> {
        self.collections.get(&id).map(|c| c.clone())
    }

    /// Delete a collection and drop it from every sample
    ///
    /// # Errors
    /// Returns [`ModelError::CollectionNotFound`] for unknown collections.
    pub fn delete_collection(&self, id: CollectionId) -> Result<usize, ModelError> {
        self.collections
            .remove(&id)
            .ok_or(ModelError::CollectionNotFound(id))?;

        let mut detached = 0;
        for mut sample in self.samples.iter_mut() {
            if sample.collections.remove(&id) {
                sample.touch();
                detached += 1;
            }
        }
        tracing::debug!(collection = %id, detached, "collection deleted");
        Ok(detached)
    }

    /// Number of stored samples
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the store holds no samples
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn check(&self, user: &str, id: SampleId, permission: Permission) -> Result<(), ModelError> {
        if !self.samples.contains_key(&id) {
            return Err(ModelError::SampleNotFound(id));
        }
        if self.policy.allows(user, id, permission) {
            Ok(())
        } else {
            Err(ModelError::PermissionDenied {
                user: user.to_string(),
                permission,
                sample: id,
            })
        }
    }

    fn update<R>(
        &self,
        id: SampleId,
        f: impl FnOnce(&mut Sample) -> R,
    ) -> Result<R, ModelError> {
        let mut sample = self
            .samples
            .get_mut(&id)
            .ok_or(ModelError::SampleNotFound(id))?;
        let result = f(&mut *sample);
        sample.touch();
        Ok(result)
    }
}

impl Default for InMemorySampleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleStore for InMemorySampleStore {
    fn create(&self, user: &str, sample: Sample) -> Result<SampleId, ModelError> {
        if sample.name.trim().is_empty() {
            return Err(ModelError::EmptyName);
        }
        if let Some(missing) = sample
            .collections
            .iter()
            .find(|c| !self.collections.contains_key(*c))
        {
            return Err(ModelError::CollectionNotFound(*missing));
        }
        let id = sample.id;
        tracing::info!(sample = %id, name = %sample.name, user, "sample created");
        self.samples.insert(id, sample);
        Ok(id)
    }

    fn get(&self, user: &str, id: SampleId) -> Result<Sample, ModelError> {
        self.check(user, id, Permission::View)?;
        self.samples
            .get(&id)
            .map(|s| s.clone())
            .ok_or(ModelError::SampleNotFound(id))
    }

    fn list(&self, user: &str) -> Vec<Sample> {
        let mut visible: Vec<Sample> = self
            .samples
            .iter()
            .filter(|s| self.policy.allows(user, s.id, Permission::View))
            .map(|s| s.clone())
            .collect();
        visible.sort_by_key(|s| s.id);
        visible
    }

    fn rename(&self, user: &str, id: SampleId, name: &str) -> Result<(), ModelError> {
        if name.trim().is_empty() {
            return Err(ModelError::EmptyName);
        }
        self.check(user, id, Permission::Edit)?;
        self.update(id, |sample| {
            sample.name = name.to_string();
            sample.slug = slugify(name);
        })
    }

    fn add_collection(
        &self,
        user: &str,
        id: SampleId,
        collection: CollectionId,
    ) -> Result<(), ModelError> {
        self.check(user, id, Permission::Edit)?;
        if !self.collections.contains_key(&collection) {
            return Err(ModelError::CollectionNotFound(collection));
        }
        self.update(id, |sample| {
            sample.collections.insert(collection);
        })
    }

    fn remove_collection(
        &self,
        user: &str,
        id: SampleId,
        collection: CollectionId,
    ) -> Result<bool, ModelError> {
        self.check(user, id, Permission::Edit)?;
        self.update(id, |sample| sample.collections.remove(&collection))
    }

    fn add_data(&self, user: &str, id: SampleId, data: DataId) -> Result<(), ModelError> {
        self.check(user, id, Permission::Add)?;
        self.update(id, |sample| {
            sample.data.insert(data);
        })
    }

    fn remove_data(&self, user: &str, id: SampleId, data: DataId) -> Result<bool, ModelError> {
        self.check(user, id, Permission::Edit)?;
        self.update(id, |sample| sample.data.remove(&data))
    }

    fn delete(&self, user: &str, id: SampleId) -> Result<Sample, ModelError> {
        self.check(user, id, Permission::Edit)?;
        let (_, sample) = self
            .samples
            .remove(&id)
            .ok_or(ModelError::SampleNotFound(id))?;
        tracing::info!(sample = %id, user, "sample deleted");
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::GrantTable;

    #[test]
    fn create_and_get() {
        let store = InMemorySampleStore::new();
        let id = store.create("alice", Sample::new("Sample 1", "alice")).unwrap();
        let sample = store.get("alice", id).unwrap();
        assert_eq!(sample.name, "Sample 1");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_rejects_empty_name() {
        let store = InMemorySampleStore::new();
        let err = store.create("alice", Sample::new("  ", "alice")).unwrap_err();
        assert!(matches!(err, ModelError::EmptyName));
    }

    #[test]
    fn membership_has_set_semantics() {
        let store = InMemorySampleStore::new();
        let coll = store.create_collection(Collection::new("RNA-seq"));
        let id = store.create("alice", Sample::new("s", "alice")).unwrap();

        store.add_collection("alice", id, coll).unwrap();
        store.add_collection("alice", id, coll).unwrap();
        assert_eq!(store.get("alice", id).unwrap().collections.len(), 1);

        assert!(store.remove_collection("alice", id, coll).unwrap());
        assert!(!store.remove_collection("alice", id, coll).unwrap());
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let store = InMemorySampleStore::new();
        let id = store.create("alice", Sample::new("s", "alice")).unwrap();
        let err = store.add_collection("alice", id, CollectionId::new()).unwrap_err();
        assert!(matches!(err, ModelError::CollectionNotFound(_)));
    }

    #[test]
    fn deleting_collection_cascades() {
        let store = InMemorySampleStore::new();
        let coll = store.create_collection(Collection::new("c"));
        let a = store.create("alice", Sample::new("a", "alice")).unwrap();
        let b = store.create("alice", Sample::new("b", "alice")).unwrap();
        store.add_collection("alice", a, coll).unwrap();
        store.add_collection("alice", b, coll).unwrap();

        assert_eq!(store.delete_collection(coll).unwrap(), 2);
        assert!(!store.get("alice", a).unwrap().in_collection(coll));
        assert!(store.collection(coll).is_none());
    }

    #[test]
    fn policy_is_consulted() {
        let grants = Arc::new(GrantTable::new());
        let store = InMemorySampleStore::with_policy(grants.clone());
        let id = store.create("alice", Sample::new("s", "alice")).unwrap();

        let err = store.get("bob", id).unwrap_err();
        assert!(err.is_permission_denied());

        grants.grant("bob", id, Permission::View);
        assert!(store.get("bob", id).is_ok());
        assert!(store.rename("bob", id, "renamed").unwrap_err().is_permission_denied());
        assert!(store.add_data("bob", id, DataId::new()).unwrap_err().is_permission_denied());

        grants.grant("bob", id, Permission::Add);
        store.add_data("bob", id, DataId::new()).unwrap();
        assert_eq!(store.get("bob", id).unwrap().data.len(), 1);
        assert_eq!(store.list("bob").len(), 1);
        assert!(store.list("carol").is_empty());
    }

    #[test]
    fn delete_removes_sample() {
        let store = InMemorySampleStore::new();
        let id = store.create("alice", Sample::new("s", "alice")).unwrap();
        store.rename("alice", id, "Renamed Sample").unwrap();
        let deleted = store.delete("alice", id).unwrap();
        assert_eq!(deleted.slug, "renamed-sample");
        assert!(store.is_empty());
        assert!(matches!(
            store.get("alice", id).unwrap_err(),
            ModelError::SampleNotFound(_)
        ));
    }
}
