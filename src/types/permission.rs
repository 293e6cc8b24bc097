use std::fmt;

use serde::{Deserialize, Serialize};

/// PermissionSet represents a bitmask of access permissions on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u32);

impl PermissionSet {
    pub const NONE: PermissionSet = PermissionSet(0);
    pub const READ: PermissionSet = PermissionSet(1 << 0); // 1
    pub const WRITE: PermissionSet = PermissionSet(1 << 1); // 2
    pub const VIEW: PermissionSet = PermissionSet(1 << 2); // 4
    pub const CONTROL: PermissionSet = PermissionSet(1 << 3); // 8
    pub const DIRECT_PUBLISH: PermissionSet = PermissionSet(1 << 4); // 16
    pub const ALL: PermissionSet = PermissionSet(0b1_1111);

    pub const fn new(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if every bit of `required` is present.
    #[must_use]
    pub const fn has(self, required: PermissionSet) -> bool {
        self.0 & required.0 == required.0
    }

    /// Returns true if any bit of `other` is present.
    #[must_use]
    pub const fn intersects(self, other: PermissionSet) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: PermissionSet) -> PermissionSet {
        PermissionSet(self.0 | other.0)
    }

    #[must_use]
    pub const fn difference(self, other: PermissionSet) -> PermissionSet {
        PermissionSet(self.0 & !other.0)
    }

    /// Converts a permission name to its bitmask value.
    pub fn parse(s: &str) -> Option<PermissionSet> {
        match s {
            "read" => Some(Self::READ),
            "write" => Some(Self::WRITE),
            "view" => Some(Self::VIEW),
            "control" => Some(Self::CONTROL),
            "direct_publish" => Some(Self::DIRECT_PUBLISH),
            _ => None,
        }
    }

    pub fn parse_many(strs: &[&str]) -> Option<PermissionSet> {
        let mut result = PermissionSet::NONE;
        for s in strs {
            result = result.union(Self::parse(s)?);
        }
        Some(result)
    }

    #[must_use]
    pub fn to_strings(self) -> Vec<&'static str> {
        const NAMES: [(PermissionSet, &str); 5] = [
            (PermissionSet::READ, "read"),
            (PermissionSet::WRITE, "write"),
            (PermissionSet::VIEW, "view"),
            (PermissionSet::CONTROL, "control"),
            (PermissionSet::DIRECT_PUBLISH, "direct_publish"),
        ];
        NAMES
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.to_strings().join(", "))
    }
}

impl From<i64> for PermissionSet {
    fn from(bits: i64) -> Self {
        Self::new(bits as u32)
    }
}

impl From<PermissionSet> for i64 {
    fn from(p: PermissionSet) -> Self {
        i64::from(p.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_values() {
        assert_eq!(PermissionSet::READ.bits(), 1);
        assert_eq!(PermissionSet::WRITE.bits(), 2);
        assert_eq!(PermissionSet::VIEW.bits(), 4);
        assert_eq!(PermissionSet::CONTROL.bits(), 8);
        assert_eq!(PermissionSet::DIRECT_PUBLISH.bits(), 16);
    }

    #[test]
    fn test_has_and_intersects() {
        let perms = PermissionSet::READ.union(PermissionSet::VIEW);
        assert!(perms.has(PermissionSet::READ));
        assert!(!perms.has(PermissionSet::READ.union(PermissionSet::WRITE)));
        assert!(perms.intersects(PermissionSet::READ.union(PermissionSet::WRITE)));
        assert!(!perms.intersects(PermissionSet::CONTROL));
    }

    #[test]
    fn test_difference() {
        let perms = PermissionSet::ALL.difference(PermissionSet::WRITE);
        assert!(!perms.has(PermissionSet::WRITE));
        assert!(perms.has(PermissionSet::CONTROL));
    }

    #[test]
    fn test_parse_many() {
        let perms = PermissionSet::parse_many(&["read", "write"]).unwrap();
        assert_eq!(perms.bits(), 3);
        assert!(PermissionSet::parse_many(&["read", "bogus"]).is_none());
    }

    #[test]
    fn test_new_masks_unknown_bits() {
        assert_eq!(PermissionSet::new(0xff), PermissionSet::ALL);
    }

    #[test]
    fn test_display() {
        assert_eq!(PermissionSet::NONE.to_string(), "none");
        assert_eq!(
            PermissionSet::READ.union(PermissionSet::CONTROL).to_string(),
            "read, control"
        );
    }
}
