use crate::types::{Project, ProjectId, User, Workspace};

/// The verified principal and the project a call runs in.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: User,
    pub project: Project,
}

impl RequestContext {
    #[must_use]
    pub fn new(user: User, project: Project) -> Self {
        Self { user, project }
    }

    #[must_use]
    pub fn project_id(&self) -> ProjectId {
        self.project.id
    }

    #[must_use]
    pub fn workspace(&self) -> Workspace {
        Workspace::for_project(self.project.id)
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.project.is_online()
    }
}
