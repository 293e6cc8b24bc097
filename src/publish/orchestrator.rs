use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use super::list::{DirectPublish, PublishList, PublishListBuilder, with_retry};
use crate::cache::CacheLayer;
use crate::config::RepositoryConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::{EventSink, RepositoryEvent};
use crate::lock::LockCoordinator;
use crate::project::ProjectManager;
use crate::security::{LockCheck, PermissionCheck, PermissionEngine};
use crate::store::Store;
use crate::store::path::{normalize_any, parent_path};
use crate::types::{
    BackupProject, BackupResource, PROPERTY_INTERNAL, PermissionSet, Project, PublishHistoryId,
    PublishedResource, Resource, ResourceFilter, ResourceState, Workspace,
};

#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    pub history_id: PublishHistoryId,
    pub tag: i64,
    pub folders: Vec<String>,
    pub files: Vec<String>,
    pub deleted_folders: Vec<String>,
}

/// Promotes offline changes to the online workspace. One publish runs at a time.
pub struct Publisher {
    config: Arc<RepositoryConfig>,
    store: Arc<dyn Store>,
    cache: Arc<CacheLayer>,
    locks: Arc<dyn LockCoordinator>,
    security: Arc<PermissionEngine>,
    projects: Arc<ProjectManager>,
    events: Arc<dyn EventSink>,
    guard: Mutex<()>,
}

impl Publisher {
    #[must_use]
    pub fn new(
        config: Arc<RepositoryConfig>,
        store: Arc<dyn Store>,
        cache: Arc<CacheLayer>,
        locks: Arc<dyn LockCoordinator>,
        security: Arc<PermissionEngine>,
        projects: Arc<ProjectManager>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            store,
            cache,
            locks,
            security,
            projects,
            events,
            guard: Mutex::new(()),
        }
    }

    /// Publishes every eligible change of the caller's project.
    pub fn publish_project(&self, ctx: &RequestContext) -> Result<PublishResult> {
        self.publish(ctx, None)
    }

    /// Publishes one resource, a folder with its contents, or a file with optionally its siblings.
    pub fn publish_resource(
        &self,
        ctx: &RequestContext,
        path: &str,
        include_siblings: bool,
    ) -> Result<PublishResult> {
        let direct = DirectPublish {
            root_path: normalize_any(path)?,
            include_siblings,
        };
        self.publish(ctx, Some(direct))
    }

    /// The publish list the caller's project would produce, without publishing it.
    pub fn publish_list(&self, ctx: &RequestContext) -> Result<PublishList> {
        let project = self.projects.read_project(ctx.project_id())?;
        let builder = PublishListBuilder::new(self.store.as_ref(), self.locks.as_ref());
        with_retry(&self.cache, || builder.build(&project, None))
    }

    fn publish(&self, ctx: &RequestContext, direct: Option<DirectPublish>) -> Result<PublishResult> {
        let _guard = self.guard.lock();

        let project = self.projects.read_project(ctx.project_id())?;
        if project.is_online() {
            return Err(Error::PermissionDenied {
                path: "the online project".to_string(),
                required: PermissionSet::DIRECT_PUBLISH,
            });
        }
        if project.locked {
            return Err(Error::LockConflict(format!(
                "project '{}' is locked",
                project.name
            )));
        }

        let target = match &direct {
            Some(direct) => Some(
                self.store
                    .read_resource(Workspace::Offline, &direct.root_path)?
                    .ok_or_else(|| Error::not_found(direct.root_path.clone()))?,
            ),
            None => None,
        };
        self.authorize(ctx, &project, target.as_ref())?;

        if let Some(target) = &target {
            if let Some(parent) = parent_path(&target.root_path) {
                if self.store.read_resource(Workspace::Online, &parent)?.is_none() {
                    return Err(Error::Conflict(format!(
                        "parent folder {parent} of {} is not published",
                        target.root_path
                    )));
                }
            }
        }

        self.release_locks(ctx, &project, target.as_ref())?;
        let builder = PublishListBuilder::new(self.store.as_ref(), self.locks.as_ref());
        let list = with_retry(&self.cache, || builder.build(&project, direct.as_ref()))?;

        info!(
            project = %project.name,
            resources = list.len(),
            direct = direct.is_some(),
            "publishing"
        );
        let outcome = self.promote(ctx, &project, &list);
        self.cache.clear_resource_caches();
        let result = outcome?;

        self.events.emit(RepositoryEvent::ProjectPublished {
            project_id: project.id,
            history_id: result.history_id,
            tag: result.tag,
        });

        if project.is_temporary() && direct.is_none() {
            self.store.delete_project(project.id)?;
            self.cache.clear_project_caches();
            info!(project = %project.name, "deleted temporary project after publish");
        }
        Ok(result)
    }

    fn authorize(&self, ctx: &RequestContext, project: &Project, target: Option<&Resource>) -> Result<()> {
        if self.projects.is_manager_of_project(ctx, project)? {
            return Ok(());
        }
        if let Some(target) = target {
            let check = self.security.has_permissions(
                ctx,
                target,
                PermissionSet::DIRECT_PUBLISH,
                LockCheck::Skip,
                ResourceFilter::ALL,
            )?;
            if check == PermissionCheck::Allowed {
                return Ok(());
            }
        }
        Err(Error::PermissionDenied {
            path: target.map_or_else(
                || format!("project '{}'", project.name),
                |r| r.root_path.clone(),
            ),
            required: PermissionSet::DIRECT_PUBLISH,
        })
    }

    /// Locked resources are never published, so the publisher releases them first.
    fn release_locks(&self, ctx: &RequestContext, project: &Project, target: Option<&Resource>) -> Result<()> {
        match target {
            None => {
                let removed = self.locks.remove_all_locks_in_project(project.id)?;
                info!(project = %project.name, removed, "released project locks");
            }
            Some(target) => {
                if let Some(lock) = self.locks.get_lock(&target.root_path)? {
                    if !lock.is_inherited() && lock.is_owned_by(&ctx.user.id, ctx.project_id()) {
                        self.locks.remove_lock(&target.root_path)?;
                    }
                }
            }
        }
        self.cache.clear_permission_caches();
        Ok(())
    }

    fn promote(&self, ctx: &RequestContext, project: &Project, list: &PublishList) -> Result<PublishResult> {
        let tag = self.store.next_backup_tag()?;
        self.store.write_backup_project(&BackupProject {
            tag,
            project_id: project.id,
            project_name: project.name.clone(),
            published_by: ctx.user.id,
            published_at: Utc::now(),
        })?;

        let mut result = PublishResult {
            history_id: list.history_id,
            tag,
            folders: Vec::with_capacity(list.folders.len()),
            files: Vec::with_capacity(list.files.len()),
            deleted_folders: Vec::with_capacity(list.deleted_folders.len()),
        };

        for folder in &list.folders {
            self.publish_changed(folder, None, tag, list.history_id)?;
            result.folders.push(folder.root_path.clone());
        }
        for file in &list.files {
            if file.state.is_deleted() {
                self.publish_deleted(file, tag, list.history_id)?;
            } else {
                let content = self
                    .store
                    .read_content(Workspace::Offline, &file.resource_id)?
                    .unwrap_or_default();
                self.publish_changed(file, Some(&content), tag, list.history_id)?;
            }
            result.files.push(file.root_path.clone());
        }
        for folder in &list.deleted_folders {
            self.publish_deleted(folder, tag, list.history_id)?;
            result.deleted_folders.push(folder.root_path.clone());
        }

        info!(
            project = %project.name,
            tag,
            folders = result.folders.len(),
            files = result.files.len(),
            deleted_folders = result.deleted_folders.len(),
            "publish finished"
        );
        Ok(result)
    }

    /// Writes a new or changed resource online and resets its offline state.
    fn publish_changed(
        &self,
        resource: &Resource,
        content: Option<&[u8]>,
        tag: i64,
        history_id: PublishHistoryId,
    ) -> Result<()> {
        let online = Resource {
            state: ResourceState::Unchanged,
            ..resource.clone()
        };
        let existing = self
            .store
            .read_resource_by_id(Workspace::Online, &resource.structure_id)?;

        match (existing, content) {
            (Some(_), None) => self.store.write_resource(Workspace::Online, &online)?,
            (Some(_), Some(data)) => {
                self.store
                    .remove_resource(Workspace::Online, &resource.structure_id)?;
                self.store.create_resource(Workspace::Online, &online, Some(data))?;
            }
            (None, data) => self.store.create_resource(Workspace::Online, &online, data)?,
        }

        let mut properties = self
            .store
            .read_properties(Workspace::Offline, &resource.structure_id)?;
        properties.remove(PROPERTY_INTERNAL);
        self.store
            .remove_properties(Workspace::Online, &resource.structure_id)?;
        for (name, value) in &properties {
            self.store
                .write_property(Workspace::Online, &resource.structure_id, name, Some(value))?;
        }

        self.store.remove_aces(Workspace::Online, &resource.resource_id)?;
        for ace in self.store.read_aces(Workspace::Offline, &resource.resource_id)? {
            if !ace.is_deleted() {
                self.store.write_ace(Workspace::Online, &ace)?;
            }
        }

        self.record(resource, content.unwrap_or_default(), properties, tag, history_id)?;

        let offline = Resource {
            state: ResourceState::Unchanged,
            project_last_modified: None,
            ..resource.clone()
        };
        self.store.write_resource(Workspace::Offline, &offline)
    }

    /// Removes a deleted resource from both workspaces.
    fn publish_deleted(&self, resource: &Resource, tag: i64, history_id: PublishHistoryId) -> Result<()> {
        let content = self
            .store
            .read_content(Workspace::Offline, &resource.resource_id)?
            .unwrap_or_default();
        let mut properties = self
            .store
            .read_properties(Workspace::Offline, &resource.structure_id)?;
        properties.remove(PROPERTY_INTERNAL);
        self.record(resource, &content, properties, tag, history_id)?;

        for ws in [Workspace::Online, Workspace::Offline] {
            if self
                .store
                .read_resource_by_id(ws, &resource.structure_id)?
                .is_none()
            {
                continue;
            }
            if self.store.remove_resource(ws, &resource.structure_id)? {
                self.store.remove_aces(ws, &resource.resource_id)?;
            }
        }
        Ok(())
    }

    fn record(
        &self,
        resource: &Resource,
        content: &[u8],
        properties: std::collections::BTreeMap<String, String>,
        tag: i64,
        history_id: PublishHistoryId,
    ) -> Result<()> {
        if self.config.history.enabled {
            let backup = BackupResource {
                tag,
                structure_id: resource.structure_id,
                resource_id: resource.resource_id,
                root_path: resource.root_path.clone(),
                resource_type: resource.resource_type,
                state: resource.state,
                length: resource.length,
                contents: content.to_vec(),
                properties,
                published_at: Utc::now(),
            };
            if let Err(e) = self
                .store
                .write_backup_resource(&backup, self.config.history.max_versions)
            {
                warn!(path = %resource.root_path, error = %e, "failed to write backup version");
            }
        }
        self.store.write_publish_history(&PublishedResource {
            history_id,
            tag,
            structure_id: resource.structure_id,
            resource_id: resource.resource_id,
            root_path: resource.root_path.clone(),
            state: resource.state,
        })
    }
}
