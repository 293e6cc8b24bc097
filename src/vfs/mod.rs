//! Resource lifecycle: reads, creation, siblings, deletion, writes, locks, and undo.
//!
//! Every mutation follows the same protocol. The target is resolved with the
//! filter the call needs and checked by the [`PermissionEngine`]. The store is
//! mutated and state bookkeeping applied. Resource caches are invalidated and
//! an event is emitted last.

mod create;
mod delete;
mod labels;
mod lock;
mod properties;
mod restore;
mod write;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheLayer, ResourceKey};
use crate::config::RepositoryConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::{EventSink, RepositoryEvent};
use crate::lock::LockCoordinator;
use crate::security::{LockCheck, PermissionCheck, PermissionEngine};
use crate::store::Store;
use crate::store::path::{is_folder_path, normalize_any, normalize_path, parent_path};
use crate::types::{
    AccessControlEntry, AccessControlList, File, PermissionSet, Property, Resource,
    ResourceFilter, StructureId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMode {
    /// Duplicate content into a fresh resource.
    #[default]
    AsNew,
    AsSibling,
    /// Copy as a sibling if the source already has siblings.
    PreserveSibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    DeleteSiblings,
    #[default]
    PreserveSiblings,
}

pub struct ResourceManager {
    config: Arc<RepositoryConfig>,
    store: Arc<dyn Store>,
    cache: Arc<CacheLayer>,
    locks: Arc<dyn LockCoordinator>,
    security: Arc<PermissionEngine>,
    events: Arc<dyn EventSink>,
}

impl ResourceManager {
    #[must_use]
    pub fn new(
        config: Arc<RepositoryConfig>,
        store: Arc<dyn Store>,
        cache: Arc<CacheLayer>,
        locks: Arc<dyn LockCoordinator>,
        security: Arc<PermissionEngine>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            locks,
            security,
            events,
        }
    }

    pub fn read_resource(
        &self,
        ctx: &RequestContext,
        path: &str,
        filter: ResourceFilter,
    ) -> Result<Resource> {
        let resource = self.resolve(ctx, path, filter)?;
        self.security
            .check_permissions(ctx, &resource, PermissionSet::READ, LockCheck::Skip, filter)?;
        Ok(resource)
    }

    pub fn read_resource_by_id(
        &self,
        ctx: &RequestContext,
        id: &StructureId,
        filter: ResourceFilter,
    ) -> Result<Resource> {
        let ws = ctx.workspace();
        let key = ResourceKey::Id(ws, *id);
        let resource = match self.cache.resources.get(&key) {
            Some(resource) => resource,
            None => {
                let resource = self
                    .store
                    .read_resource_by_id(ws, id)?
                    .ok_or_else(|| Error::not_found(format!("structure {id}")))?;
                self.cache.cache_resource(&resource, ws);
                resource
            }
        };
        self.security
            .check_permissions(ctx, &resource, PermissionSet::READ, LockCheck::Skip, filter)?;
        Ok(resource)
    }

    pub fn read_file(&self, ctx: &RequestContext, path: &str, filter: ResourceFilter) -> Result<File> {
        let resource = self.read_resource(ctx, path, filter)?;
        if resource.is_folder() {
            return Err(Error::invalid(format!("{} is a folder", resource.root_path)));
        }
        let contents = self
            .store
            .read_content(ctx.workspace(), &resource.resource_id)?
            .unwrap_or_default();
        Ok(File { resource, contents })
    }

    pub fn read_folder(
        &self,
        ctx: &RequestContext,
        path: &str,
        filter: ResourceFilter,
    ) -> Result<Resource> {
        let resource = self.read_resource(ctx, path, filter)?;
        if !resource.is_folder() {
            return Err(Error::invalid(format!("{} is not a folder", resource.root_path)));
        }
        Ok(resource)
    }

    /// Children of a folder the caller may view and that pass `filter`.
    pub fn read_child_resources(
        &self,
        ctx: &RequestContext,
        path: &str,
        filter: ResourceFilter,
        files: bool,
        folders: bool,
    ) -> Result<Vec<Resource>> {
        let folder = self.read_folder(ctx, path, filter)?;
        let ws = ctx.workspace();
        let key = (ws, folder.structure_id);
        let children = match self.cache.listings.get(&key) {
            Some(children) => children,
            None => {
                let children = self.store.read_children(ws, &folder.structure_id)?;
                self.cache.listings.put(key, children.clone());
                children
            }
        };

        let mut visible = Vec::with_capacity(children.len());
        for child in children {
            if (child.is_folder() && !folders) || (child.is_file() && !files) {
                continue;
            }
            let check = self.security.has_permissions(
                ctx,
                &child,
                PermissionSet::VIEW,
                LockCheck::Skip,
                filter,
            )?;
            if check == PermissionCheck::Allowed {
                visible.push(child);
            }
        }
        Ok(visible)
    }

    /// Every structure record sharing the resource's record, the resource itself included.
    pub fn read_siblings(
        &self,
        ctx: &RequestContext,
        path: &str,
        filter: ResourceFilter,
    ) -> Result<Vec<Resource>> {
        let resource = self.read_resource(ctx, path, filter)?;
        Ok(self
            .store
            .read_siblings(ctx.workspace(), &resource.resource_id)?
            .into_iter()
            .filter(|sibling| filter.is_valid(sibling))
            .collect())
    }

    pub fn read_properties(
        &self,
        ctx: &RequestContext,
        path: &str,
        filter: ResourceFilter,
    ) -> Result<BTreeMap<String, String>> {
        let resource = self.read_resource(ctx, path, filter)?;
        self.properties_of(ctx, &resource)
    }

    /// Reads one property. With `search`, the nearest ancestor folder defining it answers.
    pub fn read_property(
        &self,
        ctx: &RequestContext,
        path: &str,
        name: &str,
        search: bool,
    ) -> Result<Option<String>> {
        let filter = ResourceFilter::ALL;
        let resource = self.read_resource(ctx, path, filter)?;
        if let Some(value) = self.properties_of(ctx, &resource)?.remove(name) {
            return Ok(Some(value));
        }
        if !search {
            return Ok(None);
        }

        let mut current = parent_path(&resource.root_path);
        while let Some(folder_path) = current {
            if let Some(folder) = self.lookup(ctx, &folder_path)? {
                if let Some(value) = self.properties_of(ctx, &folder)?.remove(name) {
                    return Ok(Some(value));
                }
            }
            current = parent_path(&folder_path);
        }
        Ok(None)
    }

    pub fn read_access_control_entries(
        &self,
        ctx: &RequestContext,
        path: &str,
        include_inherited: bool,
    ) -> Result<Vec<AccessControlEntry>> {
        let resource = self.read_resource(ctx, path, ResourceFilter::ALL)?;
        self.security
            .read_access_control_entries(ctx, &resource, include_inherited)
    }

    pub fn read_acl(
        &self,
        ctx: &RequestContext,
        path: &str,
        inherited_only: bool,
    ) -> Result<AccessControlList> {
        let resource = self.read_resource(ctx, path, ResourceFilter::ALL)?;
        self.security.get_acl(ctx, &resource, inherited_only)
    }

    /// Effective permission bits of the caller on a resource.
    pub fn read_permissions(&self, ctx: &RequestContext, path: &str) -> Result<PermissionSet> {
        let resource = self.resolve(ctx, path, ResourceFilter::ALL)?;
        self.security.get_permissions(ctx, &resource)
    }

    /// Resolves a path in the caller's workspace. A path without a trailing
    /// slash also matches a folder of the same name.
    fn resolve(&self, ctx: &RequestContext, path: &str, filter: ResourceFilter) -> Result<Resource> {
        let root_path = normalize_any(path)?;
        let mut found = self.lookup(ctx, &root_path)?;
        if found.is_none() && !is_folder_path(&root_path) {
            found = self.lookup(ctx, &normalize_path(&root_path, true)?)?;
        }
        match found {
            Some(resource) if filter.is_valid(&resource) => Ok(resource),
            _ => Err(Error::not_found(root_path)),
        }
    }

    fn lookup(&self, ctx: &RequestContext, root_path: &str) -> Result<Option<Resource>> {
        let ws = ctx.workspace();
        let key = ResourceKey::Path(ws, root_path.to_string());
        if let Some(resource) = self.cache.resources.get(&key) {
            return Ok(Some(resource));
        }
        let resource = self.store.read_resource(ws, root_path)?;
        if let Some(resource) = &resource {
            self.cache.cache_resource(resource, ws);
        }
        Ok(resource)
    }

    fn properties_of(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
    ) -> Result<BTreeMap<String, String>> {
        let key = (ctx.workspace(), resource.structure_id);
        if let Some(properties) = self.cache.properties.get(&key) {
            return Ok(properties);
        }
        let properties = self.store.read_properties(ctx.workspace(), &resource.structure_id)?;
        self.cache.properties.put(key, properties.clone());
        Ok(properties)
    }

    /// Records the caller as the last modifier in the current project.
    fn stamp(ctx: &RequestContext, resource: &mut Resource) {
        resource.date_last_modified = Utc::now();
        resource.last_modified_by = ctx.user.id;
        resource.project_last_modified = Some(ctx.project_id());
    }

    fn finish(&self, event: RepositoryEvent) {
        self.cache.clear_resource_caches();
        self.events.emit(event);
    }

    /// Re-reads a resource from the store after a mutation.
    fn reload(&self, ctx: &RequestContext, id: &StructureId) -> Result<Resource> {
        self.store
            .read_resource_by_id(ctx.workspace(), id)?
            .ok_or_else(|| Error::not_found(format!("structure {id}")))
    }
}

/// Rejects a batch naming the same property twice.
fn check_duplicate_properties(properties: &[Property]) -> Result<()> {
    let mut seen = HashSet::with_capacity(properties.len());
    for property in properties {
        if property.name.trim().is_empty() {
            return Err(Error::invalid("property name cannot be empty"));
        }
        if !seen.insert(property.name.as_str()) {
            return Err(Error::invalid(format!(
                "property '{}' appears more than once",
                property.name
            )));
        }
    }
    Ok(())
}
