//! ACL resolution over the folder hierarchy.
//!
//! The ancestor chain is collected iteratively until a cached inheritable
//! folder ACL is found, then folded root-first through [`merge_layers`]. Only
//! entries flagged INHERIT pass from a folder to the resources below it.

use std::sync::Arc;

use tracing::trace;

use crate::cache::{AclKey, AclScope, CacheLayer, ResourceKey};
use crate::error::Result;
use crate::store::Store;
use crate::store::path::parent_path;
use crate::types::{AccessControlEntry, AccessControlList, AceFlags, Resource, Workspace};

/// Folds ACE layers, root first, onto `base`. Within a layer entries apply in
/// order; an OVERWRITE entry replaces what its principal accumulated so far.
pub fn merge_layers<'a, I>(mut base: AccessControlList, layers: I) -> AccessControlList
where
    I: IntoIterator<Item = &'a [AccessControlEntry]>,
{
    for layer in layers {
        for ace in layer {
            base.add(ace);
        }
    }
    base
}

pub(crate) struct AclResolver {
    store: Arc<dyn Store>,
    cache: Arc<CacheLayer>,
}

impl AclResolver {
    pub(crate) fn new(store: Arc<dyn Store>, cache: Arc<CacheLayer>) -> Self {
        Self { store, cache }
    }

    /// The ACL in effect on `resource`. With `inherited_only` the resource's
    /// own entries are left out.
    pub(crate) fn resolve(
        &self,
        ws: Workspace,
        resource: &Resource,
        inherited_only: bool,
    ) -> Result<AccessControlList> {
        let key = AclKey {
            scope: if inherited_only {
                AclScope::InheritedOnly
            } else {
                AclScope::Effective
            },
            workspace: ws,
            structure_id: resource.structure_id,
        };
        if let Some(acl) = self.cache.acls.get(&key) {
            return Ok(acl);
        }

        let inherited = match parent_path(&resource.root_path) {
            Some(parent) => self.inheritable_acl(ws, &parent)?,
            None => AccessControlList::new(),
        };
        let acl = if inherited_only {
            inherited
        } else {
            let own = self.store.read_aces(ws, &resource.resource_id)?;
            merge_layers(inherited, [own.as_slice()])
        };

        self.cache.acls.put(key, acl.clone());
        Ok(acl)
    }

    /// Entries set directly on the resource, followed by the INHERIT entries
    /// of each ancestor folder (root first) flagged INHERITED.
    pub(crate) fn entries(
        &self,
        ws: Workspace,
        resource: &Resource,
        include_inherited: bool,
    ) -> Result<Vec<AccessControlEntry>> {
        let mut entries: Vec<AccessControlEntry> = self
            .store
            .read_aces(ws, &resource.resource_id)?
            .into_iter()
            .filter(|ace| !ace.is_deleted())
            .collect();

        if include_inherited {
            for folder in self.ancestor_chain(ws, &resource.root_path)?.iter().rev() {
                for mut ace in inheritable(self.store.read_aces(ws, &folder.resource_id)?) {
                    ace.flags = ace.flags.with(AceFlags::INHERITED, true);
                    entries.push(ace);
                }
            }
        }
        Ok(entries)
    }

    /// The ACL the folder at `path` passes to its children, filling the cache
    /// for every folder on the way down from the nearest cached ancestor.
    fn inheritable_acl(&self, ws: Workspace, path: &str) -> Result<AccessControlList> {
        let mut pending = Vec::new();
        let mut base = AccessControlList::new();
        let mut current = Some(path.to_string());

        while let Some(folder_path) = current {
            let Some(folder) = self.folder(ws, &folder_path)? else {
                break;
            };
            let key = AclKey {
                scope: AclScope::Inheritable,
                workspace: ws,
                structure_id: folder.structure_id,
            };
            if let Some(acl) = self.cache.acls.get(&key) {
                base = acl;
                break;
            }
            current = parent_path(&folder_path);
            pending.push(folder);
        }

        trace!(path, uncached = pending.len(), "resolving inheritable folder acl");
        for folder in pending.into_iter().rev() {
            let passed = inheritable(self.store.read_aces(ws, &folder.resource_id)?);
            base = merge_layers(base, [passed.as_slice()]);
            self.cache.acls.put(
                AclKey {
                    scope: AclScope::Inheritable,
                    workspace: ws,
                    structure_id: folder.structure_id,
                },
                base.clone(),
            );
        }
        Ok(base)
    }

    /// Existing ancestor folders, nearest first.
    fn ancestor_chain(&self, ws: Workspace, path: &str) -> Result<Vec<Resource>> {
        let mut chain = Vec::new();
        let mut current = parent_path(path);
        while let Some(folder_path) = current {
            if let Some(folder) = self.folder(ws, &folder_path)? {
                chain.push(folder);
            }
            current = parent_path(&folder_path);
        }
        Ok(chain)
    }

    fn folder(&self, ws: Workspace, path: &str) -> Result<Option<Resource>> {
        let key = ResourceKey::Path(ws, path.to_string());
        if let Some(folder) = self.cache.resources.get(&key) {
            return Ok(Some(folder));
        }
        let folder = self.store.read_resource(ws, path)?;
        if let Some(folder) = &folder {
            self.cache.cache_resource(folder, ws);
        }
        Ok(folder)
    }
}

/// Live entries a folder passes down to its descendants.
fn inheritable(entries: Vec<AccessControlEntry>) -> Vec<AccessControlEntry> {
    entries
        .into_iter()
        .filter(|ace| !ace.is_deleted() && ace.flags.has(AceFlags::INHERIT))
        .collect()
}
