use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentId, PrincipalId, ProjectId, ResourceId, StructureId};

/// Property recording which project deleted a tombstoned resource.
pub const PROPERTY_INTERNAL: &str = "internal";

/// Lifecycle state of a structure record relative to the online workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Unchanged,
    Changed,
    New,
    Deleted,
    /// Transient marker for sibling creation. Never persisted.
    Keep,
}

impl ResourceState {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            ResourceState::Unchanged => 0,
            ResourceState::Changed => 1,
            ResourceState::New => 2,
            ResourceState::Deleted => 3,
            ResourceState::Keep => 99,
        }
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ResourceState::Unchanged),
            1 => Some(ResourceState::Changed),
            2 => Some(ResourceState::New),
            3 => Some(ResourceState::Deleted),
            99 => Some(ResourceState::Keep),
            _ => None,
        }
    }

    /// State after a mutation: untouched resources become changed, anything else keeps its state.
    #[must_use]
    pub const fn after_mutation(self) -> Self {
        match self {
            ResourceState::Unchanged => ResourceState::Changed,
            other => other,
        }
    }

    #[must_use]
    pub const fn is_unchanged(self) -> bool {
        matches!(self, ResourceState::Unchanged)
    }

    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, ResourceState::New)
    }

    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, ResourceState::Deleted)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceState::Unchanged => "unchanged",
            ResourceState::Changed => "changed",
            ResourceState::New => "new",
            ResourceState::Deleted => "deleted",
            ResourceState::Keep => "keep",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Folder,
    Plain,
    Binary,
    Image,
    XmlPage,
    Jsp,
    Pointer,
}

impl ResourceType {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            ResourceType::Folder => 0,
            ResourceType::Plain => 1,
            ResourceType::Binary => 2,
            ResourceType::Image => 3,
            ResourceType::XmlPage => 4,
            ResourceType::Jsp => 5,
            ResourceType::Pointer => 6,
        }
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ResourceType::Folder),
            1 => Some(ResourceType::Plain),
            2 => Some(ResourceType::Binary),
            3 => Some(ResourceType::Image),
            4 => Some(ResourceType::XmlPage),
            5 => Some(ResourceType::Jsp),
            6 => Some(ResourceType::Pointer),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(ResourceType::Folder),
            "plain" => Some(ResourceType::Plain),
            "binary" => Some(ResourceType::Binary),
            "image" => Some(ResourceType::Image),
            "xml_page" => Some(ResourceType::XmlPage),
            "jsp" => Some(ResourceType::Jsp),
            "pointer" => Some(ResourceType::Pointer),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_folder(self) -> bool {
        matches!(self, ResourceType::Folder)
    }
}

/// Bit flags on the shared resource record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceFlags(u32);

impl ResourceFlags {
    pub const INTERNAL: ResourceFlags = ResourceFlags(1);
    pub const LABELED: ResourceFlags = ResourceFlags(2);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn has(self, flag: ResourceFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[must_use]
    pub const fn with(self, flag: ResourceFlags, on: bool) -> ResourceFlags {
        if on {
            ResourceFlags(self.0 | flag.0)
        } else {
            ResourceFlags(self.0 & !flag.0)
        }
    }
}

impl From<i64> for ResourceFlags {
    fn from(bits: i64) -> Self {
        Self(bits as u32)
    }
}

impl From<ResourceFlags> for i64 {
    fn from(f: ResourceFlags) -> Self {
        i64::from(f.0)
    }
}

/// Joined view over one structure record and the resource record it references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub structure_id: StructureId,
    pub resource_id: ResourceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<StructureId>,
    pub root_path: String,
    pub resource_type: ResourceType,
    pub flags: ResourceFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_last_modified: Option<ProjectId>,
    pub state: ResourceState,
    pub date_created: DateTime<Utc>,
    pub created_by: PrincipalId,
    pub date_last_modified: DateTime<Utc>,
    pub last_modified_by: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_released: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_expired: Option<DateTime<Utc>>,
    pub sibling_count: u32,
    pub length: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
}

impl Resource {
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.resource_type.is_folder()
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        !self.is_folder()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        crate::store::path::resource_name(&self.root_path)
    }

    #[must_use]
    pub fn is_released_at(&self, now: DateTime<Utc>) -> bool {
        self.date_released.is_none_or(|released| released <= now)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.date_expired.is_some_and(|expired| expired <= now)
    }

    #[must_use]
    pub fn is_labeled(&self) -> bool {
        self.flags.has(ResourceFlags::LABELED)
    }
}

/// A property assignment. A `None` value removes the property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn removal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

/// A file resource together with its content bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub resource: Resource,
    pub contents: Vec<u8>,
}
