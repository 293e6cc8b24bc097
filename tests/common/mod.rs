#![allow(dead_code)]

use std::sync::Arc;

use vellum::config::RepositoryConfig;
use vellum::context::RequestContext;
use vellum::lock::LockCoordinator;
use vellum::repository::Repository;
use vellum::store::SqliteStore;
use vellum::types::{Group, NewProject, Project, ProjectId, ResourceType, User};

pub const PASSWORD: &str = "correct horse battery staple";

/// A repository on a private in-memory database with three users:
/// `admin` (administrator), and `editor` and `other` (members of `Users`).
/// The `Offline` project views the whole tree and is managed by administrators.
pub struct Fixture {
    pub store: Arc<SqliteStore>,
    pub repo: Repository,
    pub admin: User,
    pub editor: User,
    pub other: User,
    pub users: Group,
    pub project: Project,
}

impl Fixture {
    pub fn new() -> Self {
        Self::build(RepositoryConfig::in_memory(), None)
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_locks(locks: Arc<dyn LockCoordinator>) -> Self {
        Self::build(RepositoryConfig::in_memory(), Some(locks))
    }

    fn build(config: RepositoryConfig, locks: Option<Arc<dyn LockCoordinator>>) -> Self {
        let store = Arc::new(SqliteStore::in_memory().expect("open in-memory store"));
        let mut builder = Repository::builder(config).store(store.clone());
        if let Some(locks) = locks {
            builder = builder.lock_coordinator(locks);
        }
        let repo = builder.build().expect("build repository");

        let principals = repo.principals();
        let admins = principals
            .create_group("Administrators", None, None)
            .expect("create admin group");
        let users = principals
            .create_group("Users", None, None)
            .expect("create users group");
        let admin = principals
            .create_user("admin", PASSWORD, None)
            .expect("create admin");
        let editor = principals
            .create_user("editor", PASSWORD, None)
            .expect("create editor");
        let other = principals
            .create_user("other", PASSWORD, None)
            .expect("create other");
        for (user, group) in [
            ("admin", "Administrators"),
            ("admin", "Users"),
            ("editor", "Users"),
            ("other", "Users"),
        ] {
            principals
                .add_user_to_group(user, group)
                .expect("add membership");
        }

        repo.bootstrap(&admin.id, &users.id).expect("bootstrap");

        let ctx = repo
            .context(&admin.id, ProjectId::ONLINE)
            .expect("admin context");
        let project = repo
            .projects()
            .create_project(
                &ctx,
                &NewProject {
                    name: "Offline".to_string(),
                    user_group_id: Some(users.id),
                    manager_group_id: Some(admins.id),
                    ..NewProject::default()
                },
            )
            .expect("create project");
        repo.projects()
            .copy_resource_to_project(&ctx, project.id, "/")
            .expect("add project view");
        let project = repo.projects().read_project(project.id).expect("reload project");

        Self {
            store,
            repo,
            admin,
            editor,
            other,
            users,
            project,
        }
    }

    pub fn offline(&self, user: &User) -> RequestContext {
        self.repo
            .context(&user.id, self.project.id)
            .expect("offline context")
    }

    pub fn online(&self, user: &User) -> RequestContext {
        self.repo
            .context(&user.id, ProjectId::ONLINE)
            .expect("online context")
    }

    pub fn mkdir(&self, ctx: &RequestContext, path: &str) {
        self.repo
            .resources()
            .create_resource(ctx, path, ResourceType::Folder, &[], &[])
            .expect("create folder");
    }

    pub fn mkfile(&self, ctx: &RequestContext, path: &str, content: &str) {
        self.repo
            .resources()
            .create_resource(ctx, path, ResourceType::Plain, content.as_bytes(), &[])
            .expect("create file");
    }

    /// Publishes the whole project as the administrator.
    pub fn publish(&self) {
        self.repo
            .publisher()
            .publish_project(&self.offline(&self.admin))
            .expect("publish project");
    }
}
