use tracing::{info, warn};

use super::ResourceManager;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::events::RepositoryEvent;
use crate::lock::{Lock, LockMode};
use crate::security::LockCheck;
use crate::store::path::normalize_any;
use crate::types::{PermissionSet, ResourceFilter};

impl ResourceManager {
    pub fn lock_resource(&self, ctx: &RequestContext, path: &str, mode: LockMode) -> Result<()> {
        if mode == LockMode::Inherited {
            return Err(Error::invalid("inherited locks cannot be requested"));
        }
        let resource = self.resolve(ctx, path, ResourceFilter::ALL)?;
        self.security.check_permissions(
            ctx,
            &resource,
            PermissionSet::WRITE,
            LockCheck::IfLocked,
            ResourceFilter::ALL,
        )?;

        self.locks.add_lock(Lock::new(
            resource.root_path.clone(),
            ctx.user.id,
            ctx.project_id(),
            mode,
        ))?;
        self.lock_changed(RepositoryEvent::ResourceLocked {
            root_path: resource.root_path,
            user_id: ctx.user.id,
            project_id: ctx.project_id(),
        });
        Ok(())
    }

    /// Releases the caller's lock. Unlocking an unlocked resource does nothing.
    pub fn unlock_resource(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let resource = self.resolve(ctx, path, ResourceFilter::ALL)?;
        let Some(lock) = self.locks.get_lock(&resource.root_path)? else {
            return Ok(());
        };
        if lock.is_inherited() {
            return Err(Error::invalid(format!(
                "{} is locked through a parent folder",
                resource.root_path
            )));
        }
        if !lock.is_owned_by(&ctx.user.id, ctx.project_id()) {
            return Err(Error::LockConflict(format!(
                "{} is locked by another user",
                resource.root_path
            )));
        }

        self.locks.remove_lock(&resource.root_path)?;
        self.lock_changed(RepositoryEvent::ResourceUnlocked {
            root_path: resource.root_path,
            project_id: ctx.project_id(),
        });
        Ok(())
    }

    /// Takes over another user's lock. If the new lock cannot be set, the
    /// previous lock is put back unchanged.
    pub fn change_lock(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let resource = self.resolve(ctx, path, ResourceFilter::ALL)?;
        let current = self
            .locks
            .get_lock(&resource.root_path)?
            .ok_or_else(|| Error::invalid(format!("{} is not locked", resource.root_path)))?;
        if current.is_inherited() {
            return Err(Error::invalid(format!(
                "{} is locked through a parent folder",
                resource.root_path
            )));
        }
        if current.is_owned_by(&ctx.user.id, ctx.project_id()) {
            return Ok(());
        }
        self.security.check_permissions(
            ctx,
            &resource,
            PermissionSet::WRITE,
            LockCheck::Skip,
            ResourceFilter::ALL,
        )?;

        let previous = self
            .locks
            .remove_lock(&resource.root_path)?
            .unwrap_or(current);
        let stolen = Lock::new(
            resource.root_path.clone(),
            ctx.user.id,
            ctx.project_id(),
            LockMode::Common,
        );
        if let Err(e) = self.locks.add_lock(stolen) {
            warn!(path = %resource.root_path, error = %e, "lock change failed, restoring previous lock");
            let restored = self.locks.add_lock(previous);
            self.cache.clear_permission_caches();
            if let Err(restore_error) = restored {
                warn!(path = %resource.root_path, error = %restore_error, "failed to restore previous lock");
            }
            return Err(e);
        }

        info!(path = %resource.root_path, user = %ctx.user.name, "lock changed");
        self.lock_changed(RepositoryEvent::ResourceLocked {
            root_path: resource.root_path,
            user_id: ctx.user.id,
            project_id: ctx.project_id(),
        });
        Ok(())
    }

    /// The lock on a path, explicit or inherited from a locked folder.
    pub fn get_lock(&self, path: &str) -> Result<Option<Lock>> {
        self.locks.get_lock(&normalize_any(path)?)
    }

    /// Explicit locks at or below a path.
    pub fn count_locks(&self, path: &str) -> Result<usize> {
        self.locks.count_locks(&normalize_any(path)?)
    }

    fn lock_changed(&self, event: RepositoryEvent) {
        self.cache.clear_permission_caches();
        self.events.emit(event);
    }
}
