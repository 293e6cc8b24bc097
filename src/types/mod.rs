mod acl;
mod filter;
mod history;
mod ids;
mod permission;
mod principal;
mod project;
mod resource;

pub use acl::{AccessControlEntry, AccessControlList, AceFlags, PermissionPair};
pub use filter::ResourceFilter;
pub use history::{BackupProject, BackupResource, PublishedResource};
pub use ids::{
    ContentId, PrincipalId, ProjectId, PublishHistoryId, ResourceId, StructureId, Workspace,
};
pub use permission::PermissionSet;
pub use principal::{Group, Token, User};
pub use project::{NewProject, Project, ProjectType};
pub use resource::{
    File, PROPERTY_INTERNAL, Property, Resource, ResourceFlags, ResourceState, ResourceType,
};
