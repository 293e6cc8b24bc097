use std::sync::Arc;

use tracing::info;

use crate::cache::CacheLayer;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::{EventSink, RepositoryEvent};
use crate::lock::LockCoordinator;
use crate::security::PrincipalManager;
use crate::store::Store;
use crate::store::path::normalize_any;
use crate::types::{NewProject, PermissionSet, Project, ProjectId};

/// Draft project administration.
pub struct ProjectManager {
    store: Arc<dyn Store>,
    cache: Arc<CacheLayer>,
    locks: Arc<dyn LockCoordinator>,
    principals: Arc<PrincipalManager>,
    events: Arc<dyn EventSink>,
}

impl ProjectManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<CacheLayer>,
        locks: Arc<dyn LockCoordinator>,
        principals: Arc<PrincipalManager>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            cache,
            locks,
            principals,
            events,
        }
    }

    pub fn read_project(&self, id: ProjectId) -> Result<Project> {
        if let Some(project) = self.cache.projects.get(&id) {
            return Ok(project);
        }
        let project = self
            .store
            .read_project(id)?
            .ok_or_else(|| Error::not_found(format!("project {id}")))?;
        self.cache.projects.put(id, project.clone());
        Ok(project)
    }

    pub fn read_project_by_name(&self, name: &str) -> Result<Project> {
        let project = self
            .store
            .read_project_by_name(name)?
            .ok_or_else(|| Error::not_found(format!("project '{name}'")))?;
        self.cache.projects.put(project.id, project.clone());
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        self.store.list_projects()
    }

    /// Creates a draft project owned by the caller. Administrators only.
    pub fn create_project(&self, ctx: &RequestContext, project: &NewProject) -> Result<Project> {
        self.require_admin(ctx)?;
        if project.name.trim().is_empty() {
            return Err(Error::invalid("project name cannot be empty"));
        }
        let created = self.store.create_project(project, &ctx.user.id)?;
        info!(project = %created.name, id = %created.id, "created project");
        self.changed(created.id);
        Ok(created)
    }

    /// Deletes a draft project and releases every lock held in it.
    pub fn delete_project(&self, ctx: &RequestContext, id: ProjectId) -> Result<()> {
        let project = self.managed_draft(ctx, id)?;
        self.locks.remove_all_locks_in_project(project.id)?;
        if !self.store.delete_project(project.id)? {
            return Err(Error::not_found(format!("project {id}")));
        }
        info!(project = %project.name, "deleted project");
        self.cache.clear_permission_caches();
        self.changed(project.id);
        Ok(())
    }

    /// Adds a path prefix to the project's view.
    pub fn copy_resource_to_project(
        &self,
        ctx: &RequestContext,
        id: ProjectId,
        root_path: &str,
    ) -> Result<()> {
        let project = self.managed_draft(ctx, id)?;
        let root_path = normalize_any(root_path)?;
        self.store.add_project_resource(project.id, &root_path)?;
        self.changed(project.id);
        Ok(())
    }

    pub fn remove_resource_from_project(
        &self,
        ctx: &RequestContext,
        id: ProjectId,
        root_path: &str,
    ) -> Result<bool> {
        let project = self.managed_draft(ctx, id)?;
        let root_path = normalize_any(root_path)?;
        let removed = self.store.remove_project_resource(project.id, &root_path)?;
        self.changed(project.id);
        Ok(removed)
    }

    /// The online project sees everything.
    #[must_use]
    pub fn is_inside_project(&self, project: &Project, root_path: &str) -> bool {
        project.is_online() || project.contains_path(root_path)
    }

    pub fn is_manager_of_project(&self, ctx: &RequestContext, project: &Project) -> Result<bool> {
        self.principals.is_manager_of_project(&ctx.user, project)
    }

    /// A locked project cannot be published until it is unlocked again.
    pub fn set_project_locked(&self, ctx: &RequestContext, id: ProjectId, locked: bool) -> Result<()> {
        let mut project = self.managed_draft(ctx, id)?;
        project.locked = locked;
        self.store.write_project(&project)?;
        self.changed(project.id);
        Ok(())
    }

    /// Releases every resource lock held in the project. Returns how many were removed.
    pub fn unlock_project(&self, ctx: &RequestContext, id: ProjectId) -> Result<usize> {
        let project = self.managed_draft(ctx, id)?;
        let removed = self.locks.remove_all_locks_in_project(project.id)?;
        info!(project = %project.name, removed, "unlocked project");
        self.cache.clear_permission_caches();
        self.changed(project.id);
        Ok(removed)
    }

    fn managed_draft(&self, ctx: &RequestContext, id: ProjectId) -> Result<Project> {
        if id.is_online() {
            return Err(Error::invalid("the online project cannot be modified"));
        }
        let project = self.read_project(id)?;
        if !self.is_manager_of_project(ctx, &project)? {
            return Err(Error::PermissionDenied {
                path: format!("project '{}'", project.name),
                required: PermissionSet::CONTROL,
            });
        }
        Ok(project)
    }

    fn require_admin(&self, ctx: &RequestContext) -> Result<()> {
        if self.principals.is_admin(&ctx.user)? {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                path: "projects".to_string(),
                required: PermissionSet::CONTROL,
            })
        }
    }

    fn changed(&self, project_id: ProjectId) {
        self.cache.clear_project_caches();
        self.events
            .emit(RepositoryEvent::ProjectModified { project_id });
    }
}
