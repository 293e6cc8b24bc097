use serde::{Deserialize, Serialize};

use crate::lock::{Lock, LockMode};
use crate::types::{
    AccessControlEntry, AceFlags, PermissionSet, PrincipalId, ProjectType, Property, Resource,
    ResourceFilter,
};
use crate::vfs::{CopyMode, DeleteMode};

/// Query parameters shared by every path-addressed endpoint.
#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: String,
    #[serde(default)]
    pub filter: Option<String>,
}

impl PathQuery {
    pub fn filter(&self, default: ResourceFilter) -> Option<ResourceFilter> {
        match self.filter.as_deref() {
            None => Some(default),
            Some(name) => parse_filter(name),
        }
    }
}

pub fn parse_filter(name: &str) -> Option<ResourceFilter> {
    match name {
        "all" => Some(ResourceFilter::ALL),
        "ignore_expiration" => Some(ResourceFilter::IGNORE_EXPIRATION),
        "default" => Some(ResourceFilter::DEFAULT),
        "only_visible" => Some(ResourceFilter::ONLY_VISIBLE),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    pub path: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_true")]
    pub files: bool,
    #[serde(default = "default_true")]
    pub folders: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub path: String,
    #[serde(default)]
    pub mode: DeleteMode,
}

#[derive(Debug, Deserialize)]
pub struct PropertyQuery {
    pub path: String,
    pub name: String,
    #[serde(default)]
    pub search: bool,
}

#[derive(Debug, Deserialize)]
pub struct AclQuery {
    pub path: String,
    #[serde(default)]
    pub inherited: bool,
}

#[derive(Debug, Deserialize)]
pub struct RemoveAceQuery {
    pub path: String,
    pub principal: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateResourceRequest {
    pub path: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Base64 encoded file content.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub import: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateSiblingRequest {
    pub source: String,
    pub path: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

#[derive(Debug, Deserialize)]
pub struct CopyResourceRequest {
    pub source: String,
    pub destination: String,
    #[serde(default)]
    pub mode: CopyMode,
}

#[derive(Debug, Deserialize)]
pub struct UndeleteRequest {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub path: String,
    pub tag: i64,
}

#[derive(Debug, Deserialize)]
pub struct AceRequest {
    /// User or group name.
    pub principal: String,
    #[serde(default)]
    pub group: bool,
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_true")]
    pub inherit: bool,
}

#[derive(Debug, Deserialize)]
pub struct LockQuery {
    pub path: String,
    #[serde(default)]
    pub temporary: bool,
}

impl LockQuery {
    pub fn mode(&self) -> LockMode {
        if self.temporary {
            LockMode::Temporary
        } else {
            LockMode::Common
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PublishRequest {
    /// Publishes a single resource instead of the whole project.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub include_siblings: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user_group: Option<String>,
    #[serde(default)]
    pub manager_group: Option<String>,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub resources: Vec<String>,
}

impl CreateProjectRequest {
    pub fn project_type(&self) -> ProjectType {
        if self.temporary {
            ProjectType::Temporary
        } else {
            ProjectType::Normal
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TokenCreatedResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AceResponse {
    pub principal_id: PrincipalId,
    pub allow: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<&'static str>,
    pub inherited: bool,
    pub overwrite: bool,
}

impl From<AccessControlEntry> for AceResponse {
    fn from(ace: AccessControlEntry) -> Self {
        Self {
            principal_id: ace.principal_id,
            allow: ace.allowed.to_strings(),
            deny: ace.denied.to_strings(),
            inherited: ace.flags.has(AceFlags::INHERITED),
            overwrite: ace.is_overwrite(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub path: String,
    pub permissions: Vec<&'static str>,
}

impl PermissionsResponse {
    pub fn new(path: String, permissions: PermissionSet) -> Self {
        Self {
            path,
            permissions: permissions.to_strings(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub lock: Option<Lock>,
    /// Explicit locks at or below the path.
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct PublishPreview {
    pub folders: Vec<Resource>,
    pub files: Vec<Resource>,
    pub deleted_folders: Vec<Resource>,
}

pub fn parse_permissions(names: &[String]) -> Option<PermissionSet> {
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    PermissionSet::parse_many(&names)
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_names() {
        assert_eq!(parse_filter("all"), Some(ResourceFilter::ALL));
        assert_eq!(parse_filter("only_visible"), Some(ResourceFilter::ONLY_VISIBLE));
        assert_eq!(parse_filter("everything"), None);
    }

    #[test]
    fn test_path_query_default_filter() {
        let q = PathQuery {
            path: "/a".into(),
            filter: None,
        };
        assert_eq!(q.filter(ResourceFilter::DEFAULT), Some(ResourceFilter::DEFAULT));
    }

    #[test]
    fn test_parse_permissions() {
        let set = parse_permissions(&["read".to_string(), "write".to_string()]).unwrap();
        assert_eq!(set, PermissionSet::READ.union(PermissionSet::WRITE));
        assert!(parse_permissions(&["fly".to_string()]).is_none());
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateResourceRequest =
            serde_json::from_str(r#"{"path":"/a/x.html","type":"plain"}"#).unwrap();
        assert!(req.content.is_none());
        assert!(req.properties.is_empty());
        assert!(!req.import);
    }
}
