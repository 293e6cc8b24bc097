use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::path::{ancestors, is_folder_path};
use crate::types::{PrincipalId, ProjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    Common,
    /// Dropped when the holder's session ends.
    Temporary,
    /// Derived from a lock on an ancestor folder.
    Inherited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    pub root_path: String,
    pub user_id: PrincipalId,
    pub project_id: ProjectId,
    pub mode: LockMode,
}

impl Lock {
    #[must_use]
    pub fn new(root_path: impl Into<String>, user_id: PrincipalId, project_id: ProjectId, mode: LockMode) -> Self {
        Self {
            root_path: root_path.into(),
            user_id,
            project_id,
            mode,
        }
    }

    #[must_use]
    pub fn is_inherited(&self) -> bool {
        self.mode == LockMode::Inherited
    }

    #[must_use]
    pub fn is_owned_by(&self, user: &PrincipalId, project: ProjectId) -> bool {
        self.user_id == *user && self.project_id == project
    }
}

/// Exclusive lock state keyed by root path.
pub trait LockCoordinator: Send + Sync {
    /// The lock on `root_path`, or an inherited lock derived from a locked ancestor folder.
    fn get_lock(&self, root_path: &str) -> Result<Option<Lock>>;
    fn add_lock(&self, lock: Lock) -> Result<()>;
    /// Removes an explicit lock, returning it.
    fn remove_lock(&self, root_path: &str) -> Result<Option<Lock>>;
    fn remove_all_locks_in_project(&self, project: ProjectId) -> Result<usize>;
    /// Number of explicit locks at or below `root_path`.
    fn count_locks(&self, root_path: &str) -> Result<usize>;
}

/// In-process lock table.
#[derive(Default)]
pub struct LockManager {
    locks: RwLock<HashMap<String, Lock>>,
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockCoordinator for LockManager {
    fn get_lock(&self, root_path: &str) -> Result<Option<Lock>> {
        let locks = self.locks.read();
        if let Some(lock) = locks.get(root_path) {
            return Ok(Some(lock.clone()));
        }
        // Nearest locked ancestor wins.
        for ancestor in ancestors(root_path).iter().rev() {
            if let Some(lock) = locks.get(ancestor) {
                return Ok(Some(Lock::new(
                    root_path,
                    lock.user_id,
                    lock.project_id,
                    LockMode::Inherited,
                )));
            }
        }
        Ok(None)
    }

    fn add_lock(&self, lock: Lock) -> Result<()> {
        if lock.is_inherited() {
            return Err(Error::invalid("inherited locks cannot be added explicitly"));
        }
        let mut locks = self.locks.write();

        if let Some(existing) = locks.get(&lock.root_path) {
            if !existing.is_owned_by(&lock.user_id, lock.project_id) {
                return Err(Error::LockConflict(format!(
                    "{} is locked by another user",
                    lock.root_path
                )));
            }
        }
        for ancestor in ancestors(&lock.root_path) {
            if let Some(existing) = locks.get(&ancestor) {
                if !existing.is_owned_by(&lock.user_id, lock.project_id) {
                    return Err(Error::LockConflict(format!(
                        "{} is locked through {ancestor}",
                        lock.root_path
                    )));
                }
            }
        }
        if is_folder_path(&lock.root_path) {
            let blocked = locks.values().any(|existing| {
                existing.root_path != lock.root_path
                    && existing.root_path.starts_with(&lock.root_path)
                    && !existing.is_owned_by(&lock.user_id, lock.project_id)
            });
            if blocked {
                return Err(Error::LockConflict(format!(
                    "{} has resources locked by another user",
                    lock.root_path
                )));
            }
            // Own locks below the folder are subsumed by the new one.
            locks.retain(|path, _| path == &lock.root_path || !path.starts_with(&lock.root_path));
        }

        locks.insert(lock.root_path.clone(), lock);
        Ok(())
    }

    fn remove_lock(&self, root_path: &str) -> Result<Option<Lock>> {
        Ok(self.locks.write().remove(root_path))
    }

    fn remove_all_locks_in_project(&self, project: ProjectId) -> Result<usize> {
        let mut locks = self.locks.write();
        let before = locks.len();
        locks.retain(|_, lock| lock.project_id != project);
        Ok(before - locks.len())
    }

    fn count_locks(&self, root_path: &str) -> Result<usize> {
        Ok(self
            .locks
            .read()
            .keys()
            .filter(|path| path.starts_with(root_path))
            .count())
    }
}
