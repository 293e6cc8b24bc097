use tracing::info;

use super::ResourceManager;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::RepositoryEvent;
use crate::security::LockCheck;
use crate::types::{
    BackupResource, ContentId, PermissionSet, Resource, ResourceFilter, ResourceState, Workspace,
};

impl ResourceManager {
    /// Discards the project's changes to a resource, resetting it to its online version.
    pub fn undo_changes(&self, ctx: &RequestContext, path: &str) -> Result<Resource> {
        let resource = self.resolve(ctx, path, ResourceFilter::ALL)?;
        self.security.check_permissions(
            ctx,
            &resource,
            PermissionSet::WRITE,
            LockCheck::Required,
            ResourceFilter::ALL,
        )?;

        let ws = ctx.workspace();
        let online = self
            .store
            .read_resource_by_id(Workspace::Online, &resource.structure_id)?
            .ok_or_else(|| {
                Error::invalid(format!("{} has never been published", resource.root_path))
            })?;
        let reset = Resource {
            state: ResourceState::Unchanged,
            project_last_modified: None,
            ..online.clone()
        };

        if resource.is_folder() {
            self.store.write_resource(ws, &reset)?;
        } else {
            // Siblings may have replaced the record, so the offline copy is rebuilt.
            let content = self.store.read_content(Workspace::Online, &online.resource_id)?;
            self.store.remove_resource(ws, &resource.structure_id)?;
            self.store.create_resource(ws, &reset, content.as_deref())?;
        }

        self.store.remove_properties(ws, &reset.structure_id)?;
        for (name, value) in self
            .store
            .read_properties(Workspace::Online, &online.structure_id)?
        {
            self.store
                .write_property(ws, &reset.structure_id, &name, Some(&value))?;
        }
        self.store.remove_aces(ws, &reset.resource_id)?;
        for ace in self.store.read_aces(Workspace::Online, &online.resource_id)? {
            self.store.write_ace(ws, &ace)?;
        }
        self.relabel(ws, &reset.resource_id);

        info!(path = %reset.root_path, "undid changes");
        self.finish(RepositoryEvent::ResourceModified {
            root_path: reset.root_path.clone(),
            project_id: ctx.project_id(),
        });
        self.reload(ctx, &reset.structure_id)
    }

    /// Restores a file's content, type, and properties from a historical
    /// version. A new resource stays new; anything else becomes changed.
    pub fn restore_resource(&self, ctx: &RequestContext, path: &str, tag: i64) -> Result<Resource> {
        let resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        if resource.is_folder() {
            return Err(Error::invalid(format!(
                "folder {} has no versions to restore",
                resource.root_path
            )));
        }
        let backup = self
            .store
            .read_backup_resource(tag, &resource.structure_id)?
            .ok_or_else(|| {
                Error::not_found(format!("version {tag} of {}", resource.root_path))
            })?;

        let ws = ctx.workspace();
        let content_id = ContentId::new();
        self.store
            .write_content(ws, &resource.resource_id, &content_id, &backup.contents)?;
        let state = if resource.state.is_new() {
            ResourceState::New
        } else {
            ResourceState::Changed
        };
        let mut restored = Resource {
            resource_type: backup.resource_type,
            content_id: Some(content_id),
            length: backup.contents.len() as i64,
            state,
            ..resource
        };
        Self::stamp(ctx, &mut restored);
        self.store.write_resource(ws, &restored)?;
        self.store.remove_properties(ws, &restored.structure_id)?;
        for (name, value) in &backup.properties {
            self.store
                .write_property(ws, &restored.structure_id, name, Some(value))?;
        }
        self.store.mark_siblings_changed(ws, &restored.resource_id)?;

        info!(path = %restored.root_path, tag, "restored version");
        self.finish(RepositoryEvent::ResourceModified {
            root_path: restored.root_path.clone(),
            project_id: ctx.project_id(),
        });
        self.reload(ctx, &restored.structure_id)
    }

    /// Historical versions of a resource, newest first.
    pub fn read_backup_versions(
        &self,
        ctx: &RequestContext,
        path: &str,
    ) -> Result<Vec<BackupResource>> {
        let resource = self.read_resource(ctx, path, ResourceFilter::ALL)?;
        self.store.read_backup_versions(&resource.structure_id)
    }
}
