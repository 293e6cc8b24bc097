pub mod path;
mod schema;
mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use sqlite::SqliteStore;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::types::*;

/// Persistence for structure and resource records, content, and properties.
pub trait ResourceStore: Send + Sync {
    fn read_resource(&self, ws: Workspace, root_path: &str) -> Result<Option<Resource>>;
    fn read_resource_by_id(&self, ws: Workspace, id: &StructureId) -> Result<Option<Resource>>;
    fn read_children(&self, ws: Workspace, parent: &StructureId) -> Result<Vec<Resource>>;
    fn read_siblings(&self, ws: Workspace, resource_id: &ResourceId) -> Result<Vec<Resource>>;
    /// Every resource at or below `root_path`, ordered by path.
    fn read_subtree(&self, ws: Workspace, root_path: &str) -> Result<Vec<Resource>>;
    /// Every resource whose state is not unchanged, ordered by path.
    fn read_modified_resources(&self, ws: Workspace) -> Result<Vec<Resource>>;
    fn read_content(&self, ws: Workspace, resource_id: &ResourceId) -> Result<Option<Vec<u8>>>;

    /// Upserts the resource record (and content, if given) and inserts the structure record.
    fn create_resource(&self, ws: Workspace, resource: &Resource, content: Option<&[u8]>)
    -> Result<()>;
    /// Inserts a structure record for an existing resource record.
    fn create_sibling(&self, ws: Workspace, resource: &Resource) -> Result<()>;
    /// Updates both the structure record and the shared resource record.
    fn write_resource(&self, ws: Workspace, resource: &Resource) -> Result<()>;
    fn write_content(
        &self,
        ws: Workspace,
        resource_id: &ResourceId,
        content_id: &ContentId,
        data: &[u8],
    ) -> Result<()>;
    /// Moves unchanged siblings of a resource record to changed. Returns how many moved.
    fn mark_siblings_changed(&self, ws: Workspace, resource_id: &ResourceId) -> Result<usize>;
    /// Removes a structure record and its properties. Returns true if the shared
    /// resource record and content went with it.
    fn remove_resource(&self, ws: Workspace, id: &StructureId) -> Result<bool>;

    fn read_properties(&self, ws: Workspace, id: &StructureId) -> Result<BTreeMap<String, String>>;
    fn write_property(
        &self,
        ws: Workspace,
        id: &StructureId,
        name: &str,
        value: Option<&str>,
    ) -> Result<()>;
    fn remove_properties(&self, ws: Workspace, id: &StructureId) -> Result<()>;
    fn has_property_definition(&self, name: &str) -> Result<bool>;
    fn create_property_definition(&self, name: &str) -> Result<()>;
    fn read_property_definitions(&self) -> Result<Vec<String>>;
}

/// Persistence for users, groups, memberships, access control entries, and API tokens.
pub trait PrincipalStore: Send + Sync {
    fn create_user(&self, user: &User) -> Result<()>;
    fn read_user(&self, id: &PrincipalId) -> Result<Option<User>>;
    fn read_user_by_name(&self, name: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;

    fn create_group(&self, group: &Group) -> Result<()>;
    fn read_group(&self, id: &PrincipalId) -> Result<Option<Group>>;
    fn read_group_by_name(&self, name: &str) -> Result<Option<Group>>;
    fn add_user_to_group(&self, user: &PrincipalId, group: &PrincipalId) -> Result<()>;
    fn remove_user_from_group(&self, user: &PrincipalId, group: &PrincipalId) -> Result<bool>;
    /// Direct memberships only.
    fn read_groups_of_user(&self, user: &PrincipalId) -> Result<Vec<Group>>;
    fn read_users_of_group(&self, group: &PrincipalId) -> Result<Vec<User>>;

    /// All entries for a resource record, tombstoned ones included.
    fn read_aces(&self, ws: Workspace, resource_id: &ResourceId) -> Result<Vec<AccessControlEntry>>;
    fn write_ace(&self, ws: Workspace, ace: &AccessControlEntry) -> Result<()>;
    fn remove_ace(
        &self,
        ws: Workspace,
        resource_id: &ResourceId,
        principal: &PrincipalId,
    ) -> Result<bool>;
    fn remove_aces(&self, ws: Workspace, resource_id: &ResourceId) -> Result<()>;
    fn set_aces_deleted(&self, ws: Workspace, resource_id: &ResourceId, deleted: bool) -> Result<()>;

    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;
}

pub trait ProjectStore: Send + Sync {
    fn create_project(&self, project: &NewProject, owner: &PrincipalId) -> Result<Project>;
    fn read_project(&self, id: ProjectId) -> Result<Option<Project>>;
    fn read_project_by_name(&self, name: &str) -> Result<Option<Project>>;
    fn list_projects(&self) -> Result<Vec<Project>>;
    fn write_project(&self, project: &Project) -> Result<()>;
    fn delete_project(&self, id: ProjectId) -> Result<bool>;
    fn add_project_resource(&self, id: ProjectId, root_path: &str) -> Result<()>;
    fn remove_project_resource(&self, id: ProjectId, root_path: &str) -> Result<bool>;
}

/// Versioned snapshots keyed by publish tag, plus the per-publish history.
pub trait HistoryStore: Send + Sync {
    fn next_backup_tag(&self) -> Result<i64>;
    fn write_backup_project(&self, backup: &BackupProject) -> Result<()>;
    /// Writes one version and prunes the structure's history down to `max_versions`.
    fn write_backup_resource(&self, backup: &BackupResource, max_versions: usize) -> Result<()>;
    fn read_backup_resource(&self, tag: i64, id: &StructureId) -> Result<Option<BackupResource>>;
    /// Newest first.
    fn read_backup_versions(&self, id: &StructureId) -> Result<Vec<BackupResource>>;
    fn delete_backups(&self, older_than: DateTime<Utc>) -> Result<usize>;
    fn write_publish_history(&self, entry: &PublishedResource) -> Result<()>;
    fn read_published_resources(&self, history_id: &PublishHistoryId)
    -> Result<Vec<PublishedResource>>;
}

/// Store defines the complete database interface.
pub trait Store: ResourceStore + PrincipalStore + ProjectStore + HistoryStore {
    fn initialize(&self) -> Result<()>;
}

/// Opens the store implementation registered under `config.driver`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    let store = match config.driver.as_str() {
        "sqlite" => SqliteStore::new(&config.path)?,
        "memory" => SqliteStore::in_memory()?,
        other => {
            return Err(Error::Config(format!("unknown store driver '{other}'")));
        }
    };
    store.initialize()?;
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_rejects_unknown_driver() {
        let config = StoreConfig {
            driver: "oracle".to_string(),
            path: "unused.db".into(),
        };
        assert!(matches!(open_store(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_open_store_memory() {
        let config = StoreConfig {
            driver: "memory".to_string(),
            path: "unused.db".into(),
        };
        let store = open_store(&config).unwrap();
        let online = store.read_project(ProjectId::ONLINE).unwrap().unwrap();
        assert_eq!(online.name, "Online");
    }
}
