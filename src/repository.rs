//! Wires the repository components together. Holds no business logic of its own.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::cache::CacheLayer;
use crate::config::RepositoryConfig;
use crate::context::RequestContext;
use crate::error::Result;
use crate::events::{EventBus, EventSink, RepositoryEvent};
use crate::lock::{LockCoordinator, LockManager};
use crate::project::ProjectManager;
use crate::publish::Publisher;
use crate::security::{PermissionEngine, PrincipalManager};
use crate::store::path::ROOT;
use crate::store::{Store, open_store};
use crate::types::{
    AccessControlEntry, AceFlags, PermissionSet, PrincipalId, ProjectId, Resource, ResourceFlags,
    ResourceId, ResourceState, ResourceType, StructureId, Workspace,
};
use crate::vfs::ResourceManager;

pub struct Repository {
    config: Arc<RepositoryConfig>,
    store: Arc<dyn Store>,
    cache: Arc<CacheLayer>,
    locks: Arc<dyn LockCoordinator>,
    events: Arc<EventBus>,
    principals: Arc<PrincipalManager>,
    security: Arc<PermissionEngine>,
    projects: Arc<ProjectManager>,
    resources: Arc<ResourceManager>,
    publisher: Arc<Publisher>,
}

pub struct RepositoryBuilder {
    config: RepositoryConfig,
    store: Option<Arc<dyn Store>>,
    locks: Option<Arc<dyn LockCoordinator>>,
}

impl RepositoryBuilder {
    /// Uses an already opened store instead of the one named in the config.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn lock_coordinator(mut self, locks: Arc<dyn LockCoordinator>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn build(self) -> Result<Repository> {
        let store = match self.store {
            Some(store) => {
                store.initialize()?;
                store
            }
            None => open_store(&self.config.store)?,
        };
        let locks = self
            .locks
            .unwrap_or_else(|| Arc::new(LockManager::new()));
        let config = Arc::new(self.config);

        let cache = Arc::new(CacheLayer::new(&config.cache));
        let events = Arc::new(EventBus::with_default_capacity());
        events.add_listener(cache.clone());
        let sink: Arc<dyn EventSink> = events.clone();

        let principals = Arc::new(PrincipalManager::new(
            store.clone(),
            cache.clone(),
            config.administrators_group.clone(),
        )?);
        let security = Arc::new(PermissionEngine::new(
            config.clone(),
            store.clone(),
            cache.clone(),
            locks.clone(),
            principals.clone(),
        ));
        let projects = Arc::new(ProjectManager::new(
            store.clone(),
            cache.clone(),
            locks.clone(),
            principals.clone(),
            sink.clone(),
        ));
        let resources = Arc::new(ResourceManager::new(
            config.clone(),
            store.clone(),
            cache.clone(),
            locks.clone(),
            security.clone(),
            sink.clone(),
        ));
        let publisher = Arc::new(Publisher::new(
            config.clone(),
            store.clone(),
            cache.clone(),
            locks.clone(),
            security.clone(),
            projects.clone(),
            sink,
        ));

        info!(driver = %config.store.driver, "repository opened");
        Ok(Repository {
            config,
            store,
            cache,
            locks,
            events,
            principals,
            security,
            projects,
            resources,
            publisher,
        })
    }
}

impl Repository {
    #[must_use]
    pub fn builder(config: RepositoryConfig) -> RepositoryBuilder {
        RepositoryBuilder {
            config,
            store: None,
            locks: None,
        }
    }

    pub fn open(config: RepositoryConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    #[must_use]
    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    #[must_use]
    pub fn locks(&self) -> &Arc<dyn LockCoordinator> {
        &self.locks
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn principals(&self) -> &PrincipalManager {
        &self.principals
    }

    #[must_use]
    pub fn security(&self) -> &PermissionEngine {
        &self.security
    }

    #[must_use]
    pub fn projects(&self) -> &ProjectManager {
        &self.projects
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Builds the context for a user working in a project.
    pub fn context(&self, user: &PrincipalId, project: ProjectId) -> Result<RequestContext> {
        let user = self.principals.read_user(user)?;
        let project = self.projects.read_project(project)?;
        Ok(RequestContext::new(user, project))
    }

    /// Clears every cache partition through the event bus, reaching every listener.
    pub fn clear_caches(&self) {
        self.events.emit(RepositoryEvent::ClearCaches);
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
        info!("repository shut down");
    }

    /// Creates the root folder in both workspaces, readable and writable by
    /// `users_group`. Does nothing if the root folder already exists.
    pub fn bootstrap(&self, admin: &PrincipalId, users_group: &PrincipalId) -> Result<()> {
        if self.store.read_resource(Workspace::Online, ROOT)?.is_some() {
            return Ok(());
        }
        let now = Utc::now();
        let root = Resource {
            structure_id: StructureId::new(),
            resource_id: ResourceId::new(),
            parent_id: None,
            root_path: ROOT.to_string(),
            resource_type: ResourceType::Folder,
            flags: ResourceFlags::default(),
            project_last_modified: None,
            state: ResourceState::Unchanged,
            date_created: now,
            created_by: *admin,
            date_last_modified: now,
            last_modified_by: *admin,
            date_released: None,
            date_expired: None,
            sibling_count: 1,
            length: 0,
            content_id: None,
        };
        let ace = AccessControlEntry::new(
            root.resource_id,
            *users_group,
            PermissionSet::READ
                .union(PermissionSet::WRITE)
                .union(PermissionSet::VIEW),
            PermissionSet::NONE,
            AceFlags::GROUP.with(AceFlags::INHERIT, true),
        );
        for ws in [Workspace::Online, Workspace::Offline] {
            self.store.create_resource(ws, &root, None)?;
            self.store.write_ace(ws, &ace)?;
        }
        self.cache.clear_all();
        info!("created root folder");
        Ok(())
    }
}
