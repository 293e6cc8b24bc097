use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::auth::TokenGenerator;
use crate::cache::CacheLayer;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Group, PrincipalId, Project, User};

/// Users, groups, and transitive membership. Callers are trusted: no ACL applies here.
pub struct PrincipalManager {
    store: Arc<dyn Store>,
    cache: Arc<CacheLayer>,
    hasher: TokenGenerator,
    administrators_group: String,
}

impl PrincipalManager {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<CacheLayer>,
        administrators_group: String,
    ) -> Result<Self> {
        Ok(Self {
            store,
            cache,
            hasher: TokenGenerator::new()?,
            administrators_group,
        })
    }

    #[must_use]
    pub fn administrators_group(&self) -> &str {
        &self.administrators_group
    }

    pub fn read_user(&self, id: &PrincipalId) -> Result<User> {
        if let Some(user) = self.cache.users_by_id.get(id) {
            return Ok(user);
        }
        let user = self
            .store
            .read_user(id)?
            .ok_or_else(|| Error::not_found(format!("user {id}")))?;
        self.cache.users_by_id.put(user.id, user.clone());
        Ok(user)
    }

    pub fn read_user_by_name(&self, name: &str) -> Result<User> {
        if let Some(user) = self.cache.users_by_name.get(&name.to_string()) {
            return Ok(user);
        }
        let user = self
            .store
            .read_user_by_name(name)?
            .ok_or_else(|| Error::not_found(format!("user '{name}'")))?;
        self.cache.users_by_name.put(user.name.clone(), user.clone());
        Ok(user)
    }

    pub fn read_group(&self, id: &PrincipalId) -> Result<Group> {
        if let Some(group) = self.cache.groups_by_id.get(id) {
            return Ok(group);
        }
        let group = self
            .store
            .read_group(id)?
            .ok_or_else(|| Error::not_found(format!("group {id}")))?;
        self.cache.groups_by_id.put(group.id, group.clone());
        Ok(group)
    }

    pub fn read_group_by_name(&self, name: &str) -> Result<Group> {
        if let Some(group) = self.cache.groups_by_name.get(&name.to_string()) {
            return Ok(group);
        }
        let group = self
            .store
            .read_group_by_name(name)?
            .ok_or_else(|| Error::not_found(format!("group '{name}'")))?;
        self.cache.groups_by_name.put(group.name.clone(), group.clone());
        Ok(group)
    }

    pub fn create_user(&self, name: &str, password: &str, description: Option<&str>) -> Result<User> {
        validate_principal_name(name)?;
        let user = User {
            id: PrincipalId::new(),
            name: name.to_string(),
            description: description.map(str::to_string),
            password_hash: self.hasher.hash(password)?,
            enabled: true,
            created_at: Utc::now(),
        };
        self.store.create_user(&user)?;
        info!(user = %user.name, "created user");
        Ok(user)
    }

    pub fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
        parent: Option<&str>,
    ) -> Result<Group> {
        validate_principal_name(name)?;
        let parent_id = match parent {
            Some(parent) => Some(self.read_group_by_name(parent)?.id),
            None => None,
        };
        let group = Group {
            id: PrincipalId::new(),
            name: name.to_string(),
            description: description.map(str::to_string),
            parent_id,
            created_at: Utc::now(),
        };
        self.store.create_group(&group)?;
        info!(group = %group.name, "created group");
        Ok(group)
    }

    pub fn add_user_to_group(&self, user: &str, group: &str) -> Result<()> {
        let user = self.read_user_by_name(user)?;
        let group = self.read_group_by_name(group)?;
        self.store.add_user_to_group(&user.id, &group.id)?;
        self.cache.clear_principal_caches();
        Ok(())
    }

    pub fn remove_user_from_group(&self, user: &str, group: &str) -> Result<bool> {
        let user = self.read_user_by_name(user)?;
        let group = self.read_group_by_name(group)?;
        let removed = self.store.remove_user_from_group(&user.id, &group.id)?;
        self.cache.clear_principal_caches();
        Ok(removed)
    }

    pub fn set_password(&self, name: &str, password: &str) -> Result<()> {
        let mut user = self.read_user_by_name(name)?;
        user.password_hash = self.hasher.hash(password)?;
        self.store.update_user(&user)?;
        self.cache.clear_principal_caches();
        Ok(())
    }

    /// Verifies a password through the credential hasher.
    pub fn login_user(&self, name: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .read_user_by_name(name)?
            .ok_or(Error::Unauthorized)?;
        if !user.enabled || !self.hasher.verify(password, &user.password_hash)? {
            return Err(Error::Unauthorized);
        }
        Ok(user)
    }

    pub fn verify_token(&self, raw_token: &str, token_hash: &str) -> Result<bool> {
        self.hasher.verify(raw_token, token_hash)
    }

    /// Issues an API token for a user and returns the raw token. Only its hash is stored.
    pub fn issue_token(&self, user: &User, expires_at: Option<DateTime<Utc>>) -> Result<String> {
        let (token, raw) = self.hasher.issue(user.id, expires_at)?;
        self.store.create_token(&token)?;
        info!(user = %user.name, token = %token.id, "issued token");
        Ok(raw)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.store.list_users()
    }

    /// Direct groups of the user plus every ancestor group, cached per user.
    pub fn groups_of_user(&self, user: &PrincipalId) -> Result<Vec<Group>> {
        if let Some(groups) = self.cache.memberships.get(user) {
            return Ok(groups);
        }

        let mut groups = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = self.store.read_groups_of_user(user)?;
        while let Some(group) = pending.pop() {
            if !seen.insert(group.id) {
                continue;
            }
            if let Some(parent) = group.parent_id {
                if !seen.contains(&parent) {
                    pending.push(self.read_group(&parent)?);
                }
            }
            groups.push(group);
        }
        groups.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(%user, count = groups.len(), "resolved group memberships");
        self.cache.memberships.put(*user, groups.clone());
        Ok(groups)
    }

    /// The user's own id followed by all of its transitive group ids.
    pub fn principal_ids(&self, user: &User) -> Result<Vec<PrincipalId>> {
        let mut ids = vec![user.id];
        ids.extend(self.groups_of_user(&user.id)?.into_iter().map(|g| g.id));
        Ok(ids)
    }

    pub fn user_in_group(&self, user: &User, group: &PrincipalId) -> Result<bool> {
        Ok(self
            .groups_of_user(&user.id)?
            .iter()
            .any(|g| g.id == *group))
    }

    pub fn is_admin(&self, user: &User) -> Result<bool> {
        Ok(self
            .groups_of_user(&user.id)?
            .iter()
            .any(|g| g.name == self.administrators_group))
    }

    /// Administrators, the project owner, and members of the manager group manage a project.
    pub fn is_manager_of_project(&self, user: &User, project: &Project) -> Result<bool> {
        if self.is_admin(user)? || project.owner_id == Some(user.id) {
            return Ok(true);
        }
        match project.manager_group_id {
            Some(group) => self.user_in_group(user, &group),
            None => Ok(false),
        }
    }
}

fn validate_principal_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid("principal name cannot be empty"));
    }
    if name.contains(char::is_whitespace) || name.contains('/') {
        return Err(Error::invalid(format!(
            "principal name '{name}' contains invalid characters"
        )));
    }
    Ok(())
}
