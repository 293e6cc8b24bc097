use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{DeleteMode, ResourceManager};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::RepositoryEvent;
use crate::security::LockCheck;
use crate::store::path::parent_path;
use crate::types::{
    PROPERTY_INTERNAL, PermissionSet, Resource, ResourceFilter, ResourceId, ResourceState,
    Workspace,
};

impl ResourceManager {
    /// Deletes a resource, a folder with its whole subtree, or a file together
    /// with its siblings. Resources never published are removed outright; the
    /// others become deleted tombstones awaiting publication.
    pub fn delete_resource(&self, ctx: &RequestContext, path: &str, mode: DeleteMode) -> Result<()> {
        let resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        let ws = ctx.workspace();
        let mode = if resource.is_folder() {
            DeleteMode::PreserveSiblings
        } else {
            mode
        };

        let mut targets = if resource.is_folder() {
            self.store
                .read_subtree(ws, &resource.root_path)?
                .into_iter()
                .filter(|r| !r.state.is_deleted())
                .collect()
        } else {
            vec![resource.clone()]
        };
        if mode == DeleteMode::DeleteSiblings {
            for sibling in self.store.read_siblings(ws, &resource.resource_id)? {
                if sibling.structure_id != resource.structure_id && !sibling.state.is_deleted() {
                    targets.push(sibling);
                }
            }
        }

        // Nothing is touched unless every target may be deleted.
        for target in &targets {
            if let Some(lock) = self.locks.get_lock(&target.root_path)? {
                if !lock.is_owned_by(&ctx.user.id, ctx.project_id()) {
                    return Err(Error::LockConflict(format!(
                        "{} is locked by another user",
                        target.root_path
                    )));
                }
            }
            if target.structure_id != resource.structure_id {
                self.security.check_permissions(
                    ctx,
                    target,
                    PermissionSet::WRITE,
                    LockCheck::IfLocked,
                    ResourceFilter::IGNORE_EXPIRATION,
                )?;
            }
        }

        // Children before their parents.
        targets.sort_by(|a, b| b.root_path.cmp(&a.root_path));

        let mut touched: HashSet<ResourceId> = HashSet::new();
        for target in &targets {
            self.delete_one(ctx, target)?;
            touched.insert(target.resource_id);
            if let Err(e) = self.locks.remove_lock(&target.root_path) {
                warn!(path = %target.root_path, error = %e, "failed to release lock of deleted resource");
            }
        }
        for resource_id in &touched {
            self.relabel(ws, resource_id);
        }

        info!(path = %resource.root_path, count = targets.len(), "deleted resources");
        self.finish(RepositoryEvent::ResourceDeleted {
            root_path: resource.root_path,
            project_id: ctx.project_id(),
        });
        Ok(())
    }

    /// Reverts a deleted resource to changed. With `recursive`, deleted
    /// resources below a folder are reverted as well.
    pub fn undelete_resource(&self, ctx: &RequestContext, path: &str, recursive: bool) -> Result<()> {
        let resource = self.resolve(ctx, path, ResourceFilter::ALL)?;
        if !resource.state.is_deleted() {
            return Err(Error::invalid(format!("{} is not deleted", resource.root_path)));
        }
        self.security.check_permissions(
            ctx,
            &resource,
            PermissionSet::WRITE,
            LockCheck::Required,
            ResourceFilter::ALL,
        )?;
        if let Some(parent) = parent_path(&resource.root_path) {
            if self.resolve(ctx, &parent, ResourceFilter::IGNORE_EXPIRATION).is_err() {
                return Err(Error::invalid(format!(
                    "parent folder of {} is deleted",
                    resource.root_path
                )));
            }
        }

        let ws = ctx.workspace();
        let mut targets = vec![resource.clone()];
        if recursive && resource.is_folder() {
            targets.extend(
                self.store
                    .read_subtree(ws, &resource.root_path)?
                    .into_iter()
                    .filter(|r| r.structure_id != resource.structure_id && r.state.is_deleted()),
            );
        }
        // Parents before their children.
        targets.sort_by(|a, b| a.root_path.cmp(&b.root_path));

        for target in targets {
            let mut restored = Resource {
                state: ResourceState::Changed,
                ..target
            };
            Self::stamp(ctx, &mut restored);
            self.store.write_resource(ws, &restored)?;
            self.store
                .write_property(ws, &restored.structure_id, PROPERTY_INTERNAL, None)?;
            self.store.set_aces_deleted(ws, &restored.resource_id, false)?;
        }

        self.finish(RepositoryEvent::ResourceModified {
            root_path: resource.root_path,
            project_id: ctx.project_id(),
        });
        Ok(())
    }

    fn delete_one(&self, ctx: &RequestContext, target: &Resource) -> Result<()> {
        let ws = ctx.workspace();
        let published = self
            .store
            .read_resource_by_id(Workspace::Online, &target.structure_id)?
            .is_some();

        if !published || target.state.is_new() {
            let record_removed = self.store.remove_resource(ws, &target.structure_id)?;
            if record_removed {
                self.store.remove_aces(ws, &target.resource_id)?;
            } else {
                self.tombstone_aces_if_orphaned(ws, &target.resource_id)?;
            }
            debug!(path = %target.root_path, record_removed, "removed unpublished resource");
            return Ok(());
        }

        let mut tombstone = Resource {
            state: ResourceState::Deleted,
            ..target.clone()
        };
        Self::stamp(ctx, &mut tombstone);
        self.store.write_resource(ws, &tombstone)?;
        self.store.write_property(
            ws,
            &tombstone.structure_id,
            PROPERTY_INTERNAL,
            Some(&ctx.project_id().to_string()),
        )?;
        self.tombstone_aces_if_orphaned(ws, &target.resource_id)?;
        debug!(path = %target.root_path, "marked resource deleted");
        Ok(())
    }

    /// Entries are shared by all siblings and only retire with the last live one.
    fn tombstone_aces_if_orphaned(&self, ws: Workspace, resource_id: &ResourceId) -> Result<()> {
        let siblings = self.store.read_siblings(ws, resource_id)?;
        if siblings.iter().all(|s| s.state.is_deleted()) {
            self.store.set_aces_deleted(ws, resource_id, true)?;
        }
        Ok(())
    }
}
