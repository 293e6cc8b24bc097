//! Computes which offline resources a publish promotes, and in which order.

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheLayer;
use crate::error::{Error, Result};
use crate::lock::LockCoordinator;
use crate::store::Store;
use crate::store::path::is_under;
use crate::types::{
    PROPERTY_INTERNAL, Project, ProjectId, PublishHistoryId, Resource, ResourceState, Workspace,
};

/// A single resource published outside a whole-project publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectPublish {
    pub root_path: String,
    pub include_siblings: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishList {
    pub project_id: ProjectId,
    pub history_id: PublishHistoryId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct: Option<DirectPublish>,
    /// New and changed folders, parents before children.
    pub folders: Vec<Resource>,
    /// Deleted folders, children before parents.
    pub deleted_folders: Vec<Resource>,
    pub files: Vec<Resource>,
}

impl PublishList {
    #[must_use]
    pub fn new(project_id: ProjectId, direct: Option<DirectPublish>) -> Self {
        Self {
            project_id,
            history_id: PublishHistoryId::new(),
            direct,
            folders: Vec::new(),
            deleted_folders: Vec::new(),
            files: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.deleted_folders.is_empty() && self.files.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.folders.len() + self.deleted_folders.len() + self.files.len()
    }
}

pub struct PublishListBuilder<'a> {
    store: &'a dyn Store,
    locks: &'a dyn LockCoordinator,
}

impl<'a> PublishListBuilder<'a> {
    pub fn new(store: &'a dyn Store, locks: &'a dyn LockCoordinator) -> Self {
        Self { store, locks }
    }

    pub fn build(&self, project: &Project, direct: Option<&DirectPublish>) -> Result<PublishList> {
        let mut list = PublishList::new(project.id, direct.cloned());
        let modified = self.store.read_modified_resources(Workspace::Offline)?;

        let direct_resource = match direct {
            Some(direct) => Some(
                self.store
                    .read_resource(Workspace::Offline, &direct.root_path)?
                    .ok_or_else(|| Error::not_found(direct.root_path.clone()))?,
            ),
            None => None,
        };
        let direct_file = direct_resource.as_ref().filter(|r| r.is_file());

        if direct_file.is_none() {
            for folder in modified.iter().filter(|r| r.is_folder()) {
                if !self.folder_eligible(project, direct, folder)? {
                    continue;
                }
                let target = if folder.state.is_deleted() {
                    &mut list.deleted_folders
                } else {
                    &mut list.folders
                };
                push(target, folder.clone())?;
            }
        }
        list.folders.sort_by(|a, b| a.root_path.cmp(&b.root_path));
        list.deleted_folders
            .sort_by(|a, b| b.root_path.cmp(&a.root_path));

        match direct_file {
            Some(file) => {
                let mut candidates = vec![file.clone()];
                if direct.is_some_and(|d| d.include_siblings) {
                    candidates.extend(
                        self.store
                            .read_siblings(Workspace::Offline, &file.resource_id)?
                            .into_iter()
                            .filter(|s| s.structure_id != file.structure_id),
                    );
                }
                for candidate in candidates {
                    if self.file_eligible(project, &candidate)? {
                        push(&mut list.files, candidate)?;
                    }
                }
            }
            None => {
                for file in modified.iter().filter(|r| r.is_file()) {
                    let contained = match direct {
                        Some(direct) => is_under(&file.root_path, &direct.root_path),
                        None => project.contains_path(&file.root_path),
                    };
                    if contained && self.file_eligible(project, file)? {
                        push(&mut list.files, file.clone())?;
                    }
                }
            }
        }

        debug!(
            project = %project.id,
            folders = list.folders.len(),
            files = list.files.len(),
            deleted_folders = list.deleted_folders.len(),
            "built publish list"
        );
        Ok(list)
    }

    fn folder_eligible(
        &self,
        project: &Project,
        direct: Option<&DirectPublish>,
        folder: &Resource,
    ) -> Result<bool> {
        if folder.state.is_unchanged() {
            return Ok(false);
        }
        let selected = match direct {
            Some(direct) => is_under(&folder.root_path, &direct.root_path),
            None => {
                folder.project_last_modified == Some(project.id)
                    && project.contains_path(&folder.root_path)
            }
        };
        Ok(selected && self.is_unlocked(folder)?)
    }

    fn file_eligible(&self, project: &Project, file: &Resource) -> Result<bool> {
        let owned = match file.state {
            ResourceState::Deleted => {
                let deleted_by = self
                    .store
                    .read_properties(Workspace::Offline, &file.structure_id)?
                    .remove(PROPERTY_INTERNAL);
                deleted_by.as_deref() == Some(project.id.to_string().as_str())
            }
            ResourceState::New => file
                .project_last_modified
                .is_none_or(|owner| owner == project.id),
            ResourceState::Changed => file.project_last_modified == Some(project.id),
            ResourceState::Unchanged | ResourceState::Keep => false,
        };
        Ok(owned && self.is_unlocked(file)?)
    }

    fn is_unlocked(&self, resource: &Resource) -> Result<bool> {
        Ok(self.locks.get_lock(&resource.root_path)?.is_none())
    }
}

/// Runs `build`, clearing every cache and retrying once if it runs out of memory.
pub(crate) fn with_retry<T>(cache: &CacheLayer, mut build: impl FnMut() -> Result<T>) -> Result<T> {
    match build() {
        Err(Error::ResourceExhausted(reason)) => {
            warn!(%reason, "out of memory building publish list, retrying after clearing caches");
            cache.clear_all();
            build()
        }
        other => other,
    }
}

fn push(target: &mut Vec<Resource>, resource: Resource) -> Result<()> {
    target
        .try_reserve(1)
        .map_err(|e| Error::ResourceExhausted(e.to_string()))?;
    target.push(resource);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::config::CacheConfig;

    #[test]
    fn test_with_retry_retries_once() {
        let cache = CacheLayer::new(&CacheConfig::default());
        let attempts = Cell::new(0);
        let result = with_retry(&cache, || {
            attempts.set(attempts.get() + 1);
            if attempts.get() == 1 {
                Err(Error::ResourceExhausted("first".into()))
            } else {
                Ok(attempts.get())
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn test_with_retry_gives_up_after_second_failure() {
        let cache = CacheLayer::new(&CacheConfig::default());
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&cache, || {
            attempts.set(attempts.get() + 1);
            Err(Error::ResourceExhausted("again".into()))
        });
        assert!(matches!(result, Err(Error::ResourceExhausted(_))));
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn test_with_retry_passes_other_errors_through() {
        let cache = CacheLayer::new(&CacheConfig::default());
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&cache, || {
            attempts.set(attempts.get() + 1);
            Err(Error::invalid("bad"))
        });
        assert!(result.unwrap_err().is_invalid_argument());
        assert_eq!(attempts.get(), 1);
    }
}
