use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{PermissionSet, PrincipalId, ResourceId};

/// Bit flags carried by an access control entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AceFlags(u32);

impl AceFlags {
    pub const DELETED: AceFlags = AceFlags(1);
    pub const INHERIT: AceFlags = AceFlags(2);
    pub const OVERWRITE: AceFlags = AceFlags(4);
    pub const INHERITED: AceFlags = AceFlags(8);
    pub const USER: AceFlags = AceFlags(16);
    pub const GROUP: AceFlags = AceFlags(32);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn has(self, flag: AceFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[must_use]
    pub const fn with(self, flag: AceFlags, on: bool) -> AceFlags {
        if on {
            AceFlags(self.0 | flag.0)
        } else {
            AceFlags(self.0 & !flag.0)
        }
    }
}

impl From<i64> for AceFlags {
    fn from(bits: i64) -> Self {
        Self(bits as u32)
    }
}

impl From<AceFlags> for i64 {
    fn from(f: AceFlags) -> Self {
        i64::from(f.0)
    }
}

/// One principal's allowed and denied bits on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub resource_id: ResourceId,
    pub principal_id: PrincipalId,
    pub allowed: PermissionSet,
    pub denied: PermissionSet,
    pub flags: AceFlags,
}

impl AccessControlEntry {
    #[must_use]
    pub fn new(
        resource_id: ResourceId,
        principal_id: PrincipalId,
        allowed: PermissionSet,
        denied: PermissionSet,
        flags: AceFlags,
    ) -> Self {
        Self {
            resource_id,
            principal_id,
            allowed,
            denied,
            flags,
        }
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.flags.has(AceFlags::DELETED)
    }

    #[must_use]
    pub fn is_overwrite(&self) -> bool {
        self.flags.has(AceFlags::OVERWRITE)
    }

    #[must_use]
    pub fn effective(&self) -> PermissionSet {
        self.allowed.difference(self.denied)
    }
}

/// Accumulated allowed and denied bits for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PermissionPair {
    pub allowed: PermissionSet,
    pub denied: PermissionSet,
}

impl PermissionPair {
    #[must_use]
    pub fn effective(&self) -> PermissionSet {
        self.allowed.difference(self.denied)
    }
}

/// Inheritance-resolved permissions on one resource, keyed by principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlList {
    entries: HashMap<PrincipalId, PermissionPair>,
}

impl AccessControlList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one entry into the list. An OVERWRITE entry replaces what the
    /// principal accumulated so far; any other entry is unioned in.
    pub fn add(&mut self, ace: &AccessControlEntry) {
        if ace.is_deleted() {
            return;
        }
        let pair = self.entries.entry(ace.principal_id).or_default();
        if ace.is_overwrite() {
            pair.allowed = ace.allowed;
            pair.denied = ace.denied;
        } else {
            pair.allowed = pair.allowed.union(ace.allowed);
            pair.denied = pair.denied.union(ace.denied);
        }
    }

    #[must_use]
    pub fn get(&self, principal: &PrincipalId) -> Option<PermissionPair> {
        self.entries.get(principal).copied()
    }

    /// Effective bits for a principal and its groups, unioned across all ids.
    pub fn permissions_for<'a, I>(&self, principals: I) -> PermissionSet
    where
        I: IntoIterator<Item = &'a PrincipalId>,
    {
        let mut sum = PermissionPair::default();
        for id in principals {
            if let Some(pair) = self.entries.get(id) {
                sum.allowed = sum.allowed.union(pair.allowed);
                sum.denied = sum.denied.union(pair.denied);
            }
        }
        sum.effective()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn principals(&self) -> impl Iterator<Item = &PrincipalId> {
        self.entries.keys()
    }
}
