use chrono::{DateTime, Utc};

use super::ResourceManager;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::RepositoryEvent;
use crate::security::LockCheck;
use crate::types::{
    AccessControlEntry, AceFlags, ContentId, PermissionSet, PrincipalId, Resource, ResourceFilter,
    ResourceFlags, ResourceType,
};

impl ResourceManager {
    /// Writes the mutable attributes of `resource` (type, flags, release and
    /// expiration dates) back to the repository.
    pub fn write_resource(&self, ctx: &RequestContext, resource: &Resource) -> Result<Resource> {
        let ws = ctx.workspace();
        let current = self
            .store
            .read_resource_by_id(ws, &resource.structure_id)?
            .filter(|r| ResourceFilter::IGNORE_EXPIRATION.is_valid(r))
            .ok_or_else(|| Error::not_found(resource.root_path.clone()))?;
        self.check_write(ctx, &current, PermissionSet::WRITE)?;
        if current.root_path != resource.root_path {
            return Err(Error::invalid("the root path cannot be changed by a write"));
        }
        check_type_change(&current, resource.resource_type)?;

        let mut updated = Resource {
            resource_type: resource.resource_type,
            flags: keep_label(current.flags, resource.flags),
            date_released: resource.date_released,
            date_expired: resource.date_expired,
            state: current.state.after_mutation(),
            ..current
        };
        Self::stamp(ctx, &mut updated);
        self.store.write_resource(ws, &updated)?;
        self.store.mark_siblings_changed(ws, &updated.resource_id)?;
        self.modified(ctx, &updated)
    }

    /// Replaces the content of a file. Every sibling sees the new content.
    pub fn write_file(&self, ctx: &RequestContext, path: &str, content: &[u8]) -> Result<Resource> {
        let resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        self.store_content(ctx, resource, None, content)
    }

    /// Replaces the content and type of a file.
    pub fn replace_resource(
        &self,
        ctx: &RequestContext,
        path: &str,
        resource_type: ResourceType,
        content: &[u8],
    ) -> Result<Resource> {
        let resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        check_type_change(&resource, resource_type)?;
        self.store_content(ctx, resource, Some(resource_type), content)
    }

    /// Sets the last-modified date of the shared resource record.
    pub fn touch_resource(
        &self,
        ctx: &RequestContext,
        path: &str,
        date_last_modified: DateTime<Utc>,
    ) -> Result<Resource> {
        let resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        let ws = ctx.workspace();
        let mut updated = Resource {
            state: resource.state.after_mutation(),
            ..resource
        };
        Self::stamp(ctx, &mut updated);
        updated.date_last_modified = date_last_modified;
        self.store.write_resource(ws, &updated)?;
        self.store.mark_siblings_changed(ws, &updated.resource_id)?;
        self.modified(ctx, &updated)
    }

    /// Release dates live on the structure record, so siblings keep their state.
    pub fn set_date_released(
        &self,
        ctx: &RequestContext,
        path: &str,
        date: Option<DateTime<Utc>>,
    ) -> Result<Resource> {
        let mut resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        resource.date_released = date;
        self.touch_structure(ctx, &resource)?;
        self.modified(ctx, &resource)
    }

    pub fn set_date_expired(
        &self,
        ctx: &RequestContext,
        path: &str,
        date: Option<DateTime<Utc>>,
    ) -> Result<Resource> {
        let mut resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        resource.date_expired = date;
        self.touch_structure(ctx, &resource)?;
        self.modified(ctx, &resource)
    }

    /// Replaces the resource flags. The labeled flag is managed internally and kept.
    pub fn chflags(&self, ctx: &RequestContext, path: &str, flags: ResourceFlags) -> Result<Resource> {
        let resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        let ws = ctx.workspace();
        let mut updated = Resource {
            flags: keep_label(resource.flags, flags),
            state: resource.state.after_mutation(),
            ..resource
        };
        Self::stamp(ctx, &mut updated);
        self.store.write_resource(ws, &updated)?;
        self.store.mark_siblings_changed(ws, &updated.resource_id)?;
        self.modified(ctx, &updated)
    }

    pub fn chtype(
        &self,
        ctx: &RequestContext,
        path: &str,
        resource_type: ResourceType,
    ) -> Result<Resource> {
        let resource = self.writable(ctx, path, PermissionSet::WRITE)?;
        check_type_change(&resource, resource_type)?;
        let ws = ctx.workspace();
        let mut updated = Resource {
            resource_type,
            state: resource.state.after_mutation(),
            ..resource
        };
        Self::stamp(ctx, &mut updated);
        self.store.write_resource(ws, &updated)?;
        self.store.mark_siblings_changed(ws, &updated.resource_id)?;
        self.modified(ctx, &updated)
    }

    /// Sets one principal's entry on a resource, shared by all of its siblings.
    pub fn write_access_control_entry(
        &self,
        ctx: &RequestContext,
        path: &str,
        ace: AccessControlEntry,
    ) -> Result<()> {
        let resource = self.writable(ctx, path, PermissionSet::CONTROL)?;
        let ace = AccessControlEntry {
            resource_id: resource.resource_id,
            flags: ace
                .flags
                .with(AceFlags::INHERITED, false)
                .with(AceFlags::DELETED, false),
            ..ace
        };
        let ws = ctx.workspace();
        self.store.write_ace(ws, &ace)?;
        self.touch_structure(ctx, &resource)?;
        self.store.mark_siblings_changed(ws, &resource.resource_id)?;
        self.modified(ctx, &resource).map(|_| ())
    }

    pub fn remove_access_control_entry(
        &self,
        ctx: &RequestContext,
        path: &str,
        principal: &PrincipalId,
    ) -> Result<bool> {
        let resource = self.writable(ctx, path, PermissionSet::CONTROL)?;
        let ws = ctx.workspace();
        let removed = self.store.remove_ace(ws, &resource.resource_id, principal)?;
        if removed {
            self.touch_structure(ctx, &resource)?;
            self.store.mark_siblings_changed(ws, &resource.resource_id)?;
            self.modified(ctx, &resource)?;
        }
        Ok(removed)
    }

    /// Marks the structure record modified by the caller.
    pub(super) fn touch_structure(&self, ctx: &RequestContext, resource: &Resource) -> Result<()> {
        let mut updated = Resource {
            state: resource.state.after_mutation(),
            ..resource.clone()
        };
        Self::stamp(ctx, &mut updated);
        self.store.write_resource(ctx.workspace(), &updated)
    }

    /// Resolves a resource the caller may change and holds the lock on.
    pub(super) fn writable(
        &self,
        ctx: &RequestContext,
        path: &str,
        required: PermissionSet,
    ) -> Result<Resource> {
        let resource = self.resolve(ctx, path, ResourceFilter::IGNORE_EXPIRATION)?;
        self.check_write(ctx, &resource, required)?;
        Ok(resource)
    }

    fn check_write(&self, ctx: &RequestContext, resource: &Resource, required: PermissionSet) -> Result<()> {
        self.security.check_permissions(
            ctx,
            resource,
            required,
            LockCheck::Required,
            ResourceFilter::IGNORE_EXPIRATION,
        )
    }

    fn store_content(
        &self,
        ctx: &RequestContext,
        resource: Resource,
        resource_type: Option<ResourceType>,
        content: &[u8],
    ) -> Result<Resource> {
        if resource.is_folder() {
            return Err(Error::invalid(format!("{} is a folder", resource.root_path)));
        }
        let ws = ctx.workspace();
        let content_id = ContentId::new();
        self.store
            .write_content(ws, &resource.resource_id, &content_id, content)?;

        let mut updated = Resource {
            resource_type: resource_type.unwrap_or(resource.resource_type),
            content_id: Some(content_id),
            length: content.len() as i64,
            state: resource.state.after_mutation(),
            ..resource
        };
        Self::stamp(ctx, &mut updated);
        self.store.write_resource(ws, &updated)?;
        self.store.mark_siblings_changed(ws, &updated.resource_id)?;
        self.modified(ctx, &updated)
    }

    fn modified(&self, ctx: &RequestContext, resource: &Resource) -> Result<Resource> {
        self.finish(RepositoryEvent::ResourceModified {
            root_path: resource.root_path.clone(),
            project_id: ctx.project_id(),
        });
        self.reload(ctx, &resource.structure_id)
    }
}

fn check_type_change(current: &Resource, resource_type: ResourceType) -> Result<()> {
    if current.resource_type.is_folder() != resource_type.is_folder() {
        return Err(Error::invalid(format!(
            "{} cannot change between file and folder types",
            current.root_path
        )));
    }
    Ok(())
}

fn keep_label(current: ResourceFlags, requested: ResourceFlags) -> ResourceFlags {
    requested.with(ResourceFlags::LABELED, current.has(ResourceFlags::LABELED))
}
