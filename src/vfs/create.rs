use chrono::Utc;
use tracing::{debug, info};

use super::{CopyMode, ResourceManager, check_duplicate_properties};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::RepositoryEvent;
use crate::lock::{Lock, LockMode};
use crate::security::LockCheck;
use crate::store::path::{normalize_path, parent_path};
use crate::types::{
    AccessControlEntry, AceFlags, ContentId, PROPERTY_INTERNAL, PermissionSet, Property, Resource,
    ResourceFilter, ResourceFlags, ResourceId, ResourceState, ResourceType, StructureId,
};

impl ResourceManager {
    /// Creates a file or folder. Creating over a live resource fails; creating
    /// over a deleted one revives its ids as a changed resource.
    pub fn create_resource(
        &self,
        ctx: &RequestContext,
        path: &str,
        resource_type: ResourceType,
        content: &[u8],
        properties: &[Property],
    ) -> Result<Resource> {
        self.create(ctx, path, resource_type, content, properties, false)
    }

    /// Like [`create_resource`](Self::create_resource), overwriting a live resource in place.
    pub fn import_resource(
        &self,
        ctx: &RequestContext,
        path: &str,
        resource_type: ResourceType,
        content: &[u8],
        properties: &[Property],
    ) -> Result<Resource> {
        self.create(ctx, path, resource_type, content, properties, true)
    }

    fn create(
        &self,
        ctx: &RequestContext,
        path: &str,
        resource_type: ResourceType,
        content: &[u8],
        properties: &[Property],
        import: bool,
    ) -> Result<Resource> {
        let root_path = normalize_path(path, resource_type.is_folder())?;
        check_duplicate_properties(properties)?;
        let parent = self.writable_parent(ctx, &root_path)?;
        self.check_lock_available(ctx, &root_path)?;

        let ws = ctx.workspace();
        let now = Utc::now();
        let existing = self.store.read_resource(ws, &root_path)?;
        let content_id = (!resource_type.is_folder()).then(ContentId::new);
        let length = if resource_type.is_folder() {
            0
        } else {
            content.len() as i64
        };

        let resource = match existing {
            Some(existing) if existing.state.is_deleted() || import => {
                let state = if existing.state.is_deleted() {
                    ResourceState::Changed
                } else {
                    existing.state.after_mutation()
                };
                let mut revived = Resource {
                    parent_id: Some(parent.structure_id),
                    resource_type,
                    state,
                    length,
                    content_id,
                    ..existing
                };
                Self::stamp(ctx, &mut revived);
                self.store.write_resource(ws, &revived)?;
                if let Some(content_id) = &revived.content_id {
                    self.store
                        .write_content(ws, &revived.resource_id, content_id, content)?;
                }
                self.store
                    .write_property(ws, &revived.structure_id, PROPERTY_INTERNAL, None)?;
                self.store.set_aces_deleted(ws, &revived.resource_id, false)?;
                self.store.mark_siblings_changed(ws, &revived.resource_id)?;
                debug!(path = %root_path, %state, "overwrote existing resource");
                revived
            }
            Some(_) => return Err(Error::AlreadyExists(root_path)),
            None => {
                let resource = Resource {
                    structure_id: StructureId::new(),
                    resource_id: ResourceId::new(),
                    parent_id: Some(parent.structure_id),
                    root_path: root_path.clone(),
                    resource_type,
                    flags: ResourceFlags::default(),
                    project_last_modified: Some(ctx.project_id()),
                    state: ResourceState::New,
                    date_created: now,
                    created_by: ctx.user.id,
                    date_last_modified: now,
                    last_modified_by: ctx.user.id,
                    date_released: None,
                    date_expired: None,
                    sibling_count: 1,
                    length,
                    content_id,
                };
                let data = resource.content_id.is_some().then_some(content);
                self.store.create_resource(ws, &resource, data)?;
                resource
            }
        };

        self.apply_properties(ctx, &resource, properties)?;
        self.lock_for_creator(ctx, &root_path)?;

        info!(path = %root_path, user = %ctx.user.name, "created resource");
        self.finish(RepositoryEvent::ResourceCreated {
            root_path,
            project_id: ctx.project_id(),
        });
        self.reload(ctx, &resource.structure_id)
    }

    /// Adds a second path for an existing file. Both paths share content and length.
    pub fn create_sibling(
        &self,
        ctx: &RequestContext,
        source: &str,
        path: &str,
        properties: &[Property],
    ) -> Result<Resource> {
        let source = self.read_resource(ctx, source, ResourceFilter::IGNORE_EXPIRATION)?;
        if source.is_folder() {
            return Err(Error::invalid(format!(
                "folder {} cannot have siblings",
                source.root_path
            )));
        }
        let root_path = normalize_path(path, false)?;
        check_duplicate_properties(properties)?;
        let parent = self.writable_parent(ctx, &root_path)?;
        self.check_lock_available(ctx, &root_path)?;

        let ws = ctx.workspace();
        if self.store.read_resource(ws, &root_path)?.is_some() {
            return Err(Error::AlreadyExists(root_path));
        }

        let sibling = Resource {
            structure_id: StructureId::new(),
            parent_id: Some(parent.structure_id),
            root_path: root_path.clone(),
            state: ResourceState::Keep,
            date_released: None,
            date_expired: None,
            ..source.clone()
        };
        self.store.create_sibling(ws, &sibling)?;
        self.apply_properties(ctx, &sibling, properties)?;
        self.lock_for_creator(ctx, &root_path)?;
        self.relabel(ws, &source.resource_id);

        info!(source = %source.root_path, path = %root_path, "created sibling");
        self.finish(RepositoryEvent::ResourceCreated {
            root_path,
            project_id: ctx.project_id(),
        });
        self.reload(ctx, &sibling.structure_id)
    }

    pub fn copy_resource(
        &self,
        ctx: &RequestContext,
        source: &str,
        destination: &str,
        mode: CopyMode,
    ) -> Result<Resource> {
        let source = self.read_resource(ctx, source, ResourceFilter::IGNORE_EXPIRATION)?;
        let as_sibling = match mode {
            CopyMode::AsSibling => true,
            CopyMode::PreserveSibling => source.is_file() && source.sibling_count > 1,
            CopyMode::AsNew => false,
        };

        let ws = ctx.workspace();
        let mut properties: Vec<Property> = self
            .store
            .read_properties(ws, &source.structure_id)?
            .into_iter()
            .filter(|(name, _)| name != PROPERTY_INTERNAL)
            .map(|(name, value)| Property::new(name, value))
            .collect();

        let copy = if as_sibling {
            self.create_sibling(ctx, &source.root_path, destination, &properties)?
        } else {
            let content = if source.is_file() {
                self.store
                    .read_content(ws, &source.resource_id)?
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            properties.sort_by(|a, b| a.name.cmp(&b.name));
            let copy = self.create_resource(
                ctx,
                destination,
                source.resource_type,
                &content,
                &properties,
            )?;
            self.duplicate_aces(ctx, &source.resource_id, &copy.resource_id)?;
            copy
        };

        self.finish(RepositoryEvent::ResourceCopied {
            source: source.root_path,
            destination: copy.root_path.clone(),
            project_id: ctx.project_id(),
        });
        Ok(copy)
    }

    /// Replaces the destination's entries with copies of the source's.
    pub fn copy_access_control_entries(
        &self,
        ctx: &RequestContext,
        source: &str,
        destination: &str,
    ) -> Result<()> {
        let source = self.read_resource(ctx, source, ResourceFilter::ALL)?;
        let destination = self.resolve(ctx, destination, ResourceFilter::ALL)?;
        self.security.check_permissions(
            ctx,
            &destination,
            PermissionSet::CONTROL,
            LockCheck::Required,
            ResourceFilter::ALL,
        )?;

        let ws = ctx.workspace();
        self.store.remove_aces(ws, &destination.resource_id)?;
        self.duplicate_aces(ctx, &source.resource_id, &destination.resource_id)?;
        self.touch_structure(ctx, &destination)?;
        self.store.mark_siblings_changed(ws, &destination.resource_id)?;
        self.finish(RepositoryEvent::ResourceModified {
            root_path: destination.root_path,
            project_id: ctx.project_id(),
        });
        Ok(())
    }

    fn duplicate_aces(
        &self,
        ctx: &RequestContext,
        from: &ResourceId,
        to: &ResourceId,
    ) -> Result<()> {
        let ws = ctx.workspace();
        for ace in self.store.read_aces(ws, from)? {
            if ace.is_deleted() {
                continue;
            }
            let copy = AccessControlEntry {
                resource_id: *to,
                flags: ace.flags.with(AceFlags::INHERITED, false),
                ..ace
            };
            self.store.write_ace(ws, &copy)?;
        }
        Ok(())
    }

    /// The existing, writable parent folder of `root_path`.
    fn writable_parent(&self, ctx: &RequestContext, root_path: &str) -> Result<Resource> {
        let parent_path = parent_path(root_path)
            .ok_or_else(|| Error::AlreadyExists(root_path.to_string()))?;
        let parent = self.resolve(ctx, &parent_path, ResourceFilter::IGNORE_EXPIRATION)?;
        if !parent.is_folder() {
            return Err(Error::invalid(format!("{parent_path} is not a folder")));
        }
        self.security.check_permissions(
            ctx,
            &parent,
            PermissionSet::WRITE,
            LockCheck::IfLocked,
            ResourceFilter::IGNORE_EXPIRATION,
        )?;
        Ok(parent)
    }

    fn check_lock_available(&self, ctx: &RequestContext, root_path: &str) -> Result<()> {
        match self.locks.get_lock(root_path)? {
            Some(lock) if !lock.is_owned_by(&ctx.user.id, ctx.project_id()) => Err(
                Error::LockConflict(format!("{root_path} is locked by another user")),
            ),
            _ => Ok(()),
        }
    }

    /// New resources are locked for their creator unless a folder lock of the creator covers them.
    fn lock_for_creator(&self, ctx: &RequestContext, root_path: &str) -> Result<()> {
        if let Some(lock) = self.locks.get_lock(root_path)? {
            if lock.is_inherited() && lock.is_owned_by(&ctx.user.id, ctx.project_id()) {
                return Ok(());
            }
        }
        self.locks.add_lock(Lock::new(
            root_path,
            ctx.user.id,
            ctx.project_id(),
            LockMode::Common,
        ))
    }
}
