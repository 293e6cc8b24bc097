use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PrincipalId, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    #[default]
    Normal,
    /// Deleted after a successful publish.
    Temporary,
}

impl ProjectType {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            ProjectType::Normal => 0,
            ProjectType::Temporary => 1,
        }
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            1 => ProjectType::Temporary,
            _ => ProjectType::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<PrincipalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_group_id: Option<PrincipalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager_group_id: Option<PrincipalId>,
    pub project_type: ProjectType,
    pub locked: bool,
    pub hidden: bool,
    /// Root path prefixes forming the project's view.
    pub resources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.id.is_online()
    }

    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.project_type == ProjectType::Temporary
    }

    /// Returns true if `root_path` lies under one of the project's path prefixes.
    #[must_use]
    pub fn contains_path(&self, root_path: &str) -> bool {
        self.resources
            .iter()
            .any(|prefix| root_path.starts_with(prefix.as_str()))
    }
}

/// Fields accepted when creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub user_group_id: Option<PrincipalId>,
    pub manager_group_id: Option<PrincipalId>,
    pub project_type: ProjectType,
}
