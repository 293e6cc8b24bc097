//! Bounded LRU caches owned by one repository instance.
//!
//! Every partition is filled lazily on a miss and cleared in bulk. Writers
//! mutate the store first and invalidate afterwards.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::CacheConfig;
use crate::events::{EventListener, RepositoryEvent};
use crate::security::PermissionCheck;
use crate::types::*;

/// A single LRU partition.
pub struct BoundedCache<K: Hash + Eq, V: Clone> {
    name: &'static str,
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let hit = self.inner.lock().get(key).cloned();
        if hit.is_some() {
            debug!(cache = self.name, "cache hit");
        }
        hit
    }

    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    pub fn remove(&self, key: &K) {
        self.inner.lock().pop(key);
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    Path(Workspace, String),
    Id(Workspace, StructureId),
}

/// Which view of a resource's entries an ACL was folded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclScope {
    /// Inherited entries plus the resource's own.
    Effective,
    /// Only what the resource inherits from its ancestors.
    InheritedOnly,
    /// What a folder passes down to its children: INHERIT entries only.
    Inheritable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AclKey {
    pub scope: AclScope,
    pub workspace: Workspace,
    pub structure_id: StructureId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionKey {
    pub include_invisible: bool,
    pub workspace: Workspace,
    pub principal: PrincipalId,
    pub structure_id: StructureId,
    pub required: PermissionSet,
}

pub struct CacheLayer {
    pub users_by_id: BoundedCache<PrincipalId, User>,
    pub users_by_name: BoundedCache<String, User>,
    pub groups_by_id: BoundedCache<PrincipalId, Group>,
    pub groups_by_name: BoundedCache<String, Group>,
    /// Transitive groups of a user.
    pub memberships: BoundedCache<PrincipalId, Vec<Group>>,
    pub projects: BoundedCache<ProjectId, Project>,
    pub resources: BoundedCache<ResourceKey, Resource>,
    pub listings: BoundedCache<(Workspace, StructureId), Vec<Resource>>,
    pub properties: BoundedCache<(Workspace, StructureId), BTreeMap<String, String>>,
    pub acls: BoundedCache<AclKey, AccessControlList>,
    pub permissions: BoundedCache<PermissionKey, PermissionCheck>,
}

impl CacheLayer {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            users_by_id: BoundedCache::new("users", config.users),
            users_by_name: BoundedCache::new("users_by_name", config.users),
            groups_by_id: BoundedCache::new("groups", config.groups),
            groups_by_name: BoundedCache::new("groups_by_name", config.groups),
            memberships: BoundedCache::new("memberships", config.memberships),
            projects: BoundedCache::new("projects", config.projects),
            resources: BoundedCache::new("resources", config.resources),
            listings: BoundedCache::new("listings", config.listings),
            properties: BoundedCache::new("properties", config.properties),
            acls: BoundedCache::new("acls", config.acls),
            permissions: BoundedCache::new("permissions", config.permissions),
        }
    }

    pub fn cache_resource(&self, resource: &Resource, workspace: Workspace) {
        self.resources.put(
            ResourceKey::Path(workspace, resource.root_path.clone()),
            resource.clone(),
        );
        self.resources
            .put(ResourceKey::Id(workspace, resource.structure_id), resource.clone());
    }

    /// Clears everything derived from resource, property, or ACE state.
    pub fn clear_resource_caches(&self) {
        self.resources.clear();
        self.listings.clear();
        self.properties.clear();
        self.clear_permission_caches();
    }

    pub fn clear_permission_caches(&self) {
        self.acls.clear();
        self.permissions.clear();
    }

    pub fn clear_principal_caches(&self) {
        self.users_by_id.clear();
        self.users_by_name.clear();
        self.groups_by_id.clear();
        self.groups_by_name.clear();
        self.memberships.clear();
        self.permissions.clear();
    }

    pub fn clear_project_caches(&self) {
        self.projects.clear();
    }

    pub fn clear_all(&self) {
        self.clear_principal_caches();
        self.clear_project_caches();
        self.clear_resource_caches();
        debug!("all caches cleared");
    }

    pub fn shutdown(&self) {
        self.clear_all();
        tracing::info!("cache layer shut down");
    }
}

impl EventListener for CacheLayer {
    fn on_event(&self, event: &RepositoryEvent) {
        if matches!(event, RepositoryEvent::ClearCaches) {
            self.clear_all();
        }
    }
}
