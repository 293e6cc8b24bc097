use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PrincipalId, ProjectId, PublishHistoryId, ResourceId, ResourceState, ResourceType, StructureId};

/// Snapshot header written once per publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupProject {
    pub tag: i64,
    pub project_id: ProjectId,
    pub project_name: String,
    pub published_by: PrincipalId,
    pub published_at: DateTime<Utc>,
}

/// One resource version captured at publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupResource {
    pub tag: i64,
    pub structure_id: StructureId,
    pub resource_id: ResourceId,
    pub root_path: String,
    pub resource_type: ResourceType,
    pub state: ResourceState,
    pub length: i64,
    #[serde(skip)]
    pub contents: Vec<u8>,
    pub properties: BTreeMap<String, String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedResource {
    pub history_id: PublishHistoryId,
    pub tag: i64,
    pub structure_id: StructureId,
    pub resource_id: ResourceId,
    pub root_path: String,
    pub state: ResourceState,
}
