//! Permission evaluation: ACL, administrator, workspace, type, lock, and filter checks.

mod acl;
mod principals;

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::cache::{CacheLayer, PermissionKey};
use crate::config::RepositoryConfig;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::lock::LockCoordinator;
use crate::store::Store;
use crate::types::{AccessControlEntry, AccessControlList, PermissionSet, Resource, ResourceFilter};

pub use acl::merge_layers;
pub use principals::PrincipalManager;

use acl::AclResolver;

/// Outcome of a permission evaluation. Only `Allowed` and `Denied` are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCheck {
    Allowed,
    Denied,
    /// The resource does not pass the caller's filter.
    Filtered,
    /// Write access needs a lock the caller does not hold.
    NotLocked,
}

/// How lock state takes part in a write or control check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCheck {
    /// The caller must hold the lock.
    Required,
    /// Only a lock held by someone else blocks.
    IfLocked,
    Skip,
}

pub struct PermissionEngine {
    config: Arc<RepositoryConfig>,
    cache: Arc<CacheLayer>,
    locks: Arc<dyn LockCoordinator>,
    principals: Arc<PrincipalManager>,
    acls: AclResolver,
}

impl PermissionEngine {
    #[must_use]
    pub fn new(
        config: Arc<RepositoryConfig>,
        store: Arc<dyn Store>,
        cache: Arc<CacheLayer>,
        locks: Arc<dyn LockCoordinator>,
        principals: Arc<PrincipalManager>,
    ) -> Self {
        Self {
            acls: AclResolver::new(store, cache.clone()),
            config,
            cache,
            locks,
            principals,
        }
    }

    #[must_use]
    pub fn principals(&self) -> &Arc<PrincipalManager> {
        &self.principals
    }

    pub fn is_admin(&self, ctx: &RequestContext) -> Result<bool> {
        self.principals.is_admin(&ctx.user)
    }

    pub fn has_permissions(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        required: PermissionSet,
        lock_check: LockCheck,
        filter: ResourceFilter,
    ) -> Result<PermissionCheck> {
        if !filter.is_valid(resource) {
            return Ok(PermissionCheck::Filtered);
        }

        let key = PermissionKey {
            include_invisible: filter.includes_invisible(),
            workspace: ctx.workspace(),
            principal: ctx.user.id,
            structure_id: resource.structure_id,
            required,
        };
        // Lock state is not part of the key, so only lock-free checks may hit.
        if lock_check == LockCheck::Skip || !requires_lock(required) {
            if let Some(hit) = self.cache.permissions.get(&key) {
                return Ok(hit);
            }
        }

        let is_admin = self.principals.is_admin(&ctx.user)?;
        let mut denied = PermissionSet::NONE;
        if ctx.is_online()
            || (!is_admin && self.config.is_executable(resource.resource_type))
        {
            denied = PermissionSet::WRITE;
        }

        if requires_lock(required) && lock_check != LockCheck::Skip {
            match self.locks.get_lock(&resource.root_path)? {
                Some(lock) if !lock.is_owned_by(&ctx.user.id, ctx.project_id()) => {
                    return Ok(PermissionCheck::NotLocked);
                }
                None if lock_check == LockCheck::Required => {
                    return Ok(PermissionCheck::NotLocked);
                }
                _ => {}
            }
        }

        let effective = if is_admin {
            PermissionSet::ALL
        } else {
            let ids = self.principals.principal_ids(&ctx.user)?;
            self.acls
                .resolve(ctx.workspace(), resource, false)?
                .permissions_for(ids.iter())
        };
        let mut effective = effective.difference(denied);
        if filter.includes_invisible() {
            effective = effective.union(PermissionSet::VIEW);
        }

        let check = if required.intersects(effective) {
            PermissionCheck::Allowed
        } else {
            PermissionCheck::Denied
        };
        debug!(
            path = %resource.root_path,
            user = %ctx.user.name,
            %required,
            %effective,
            ?check,
            "permission check"
        );
        self.cache.permissions.put(key, check);
        Ok(check)
    }

    /// Like [`has_permissions`](Self::has_permissions), mapping every
    /// non-allowed outcome to its error.
    pub fn check_permissions(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        required: PermissionSet,
        lock_check: LockCheck,
        filter: ResourceFilter,
    ) -> Result<()> {
        match self.has_permissions(ctx, resource, required, lock_check, filter)? {
            PermissionCheck::Allowed => Ok(()),
            PermissionCheck::Filtered => Err(Error::not_found(resource.root_path.clone())),
            PermissionCheck::Denied => Err(Error::PermissionDenied {
                path: resource.root_path.clone(),
                required,
            }),
            PermissionCheck::NotLocked => Err(Error::LockConflict(format!(
                "{} is not locked by {}",
                resource.root_path, ctx.user.name
            ))),
        }
    }

    /// Effective bits of the caller on `resource`, without workspace or lock restrictions.
    pub fn get_permissions(&self, ctx: &RequestContext, resource: &Resource) -> Result<PermissionSet> {
        if self.principals.is_admin(&ctx.user)? {
            return Ok(PermissionSet::ALL);
        }
        let ids = self.principals.principal_ids(&ctx.user)?;
        Ok(self
            .acls
            .resolve(ctx.workspace(), resource, false)?
            .permissions_for(ids.iter()))
    }

    pub fn get_acl(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        inherited_only: bool,
    ) -> Result<AccessControlList> {
        self.acls.resolve(ctx.workspace(), resource, inherited_only)
    }

    pub fn read_access_control_entries(
        &self,
        ctx: &RequestContext,
        resource: &Resource,
        include_inherited: bool,
    ) -> Result<Vec<AccessControlEntry>> {
        self.acls
            .entries(ctx.workspace(), resource, include_inherited)
    }
}

fn requires_lock(required: PermissionSet) -> bool {
    required.intersects(PermissionSet::WRITE.union(PermissionSet::CONTROL))
}
