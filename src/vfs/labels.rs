use tracing::{debug, warn};

use super::ResourceManager;
use crate::error::Result;
use crate::types::{Resource, ResourceFlags, ResourceId, Workspace};

impl ResourceManager {
    /// Recomputes the labeled flag of a resource record. Failures are logged, not raised.
    pub(super) fn relabel(&self, ws: Workspace, resource_id: &ResourceId) {
        if let Err(e) = self.try_relabel(ws, resource_id) {
            warn!(%resource_id, error = %e, "failed to update labeled flag");
        }
    }

    fn try_relabel(&self, ws: Workspace, resource_id: &ResourceId) -> Result<()> {
        let siblings = self.store.read_siblings(ws, resource_id)?;
        let Some(first) = siblings.first() else {
            return Ok(());
        };
        let labeled = is_labeled(&siblings, &self.config.labeled_sites);
        if first.is_labeled() == labeled {
            return Ok(());
        }

        let updated = Resource {
            flags: first.flags.with(ResourceFlags::LABELED, labeled),
            ..first.clone()
        };
        self.store.write_resource(ws, &updated)?;
        debug!(%resource_id, labeled, "updated labeled flag");
        Ok(())
    }
}

/// A record is labeled when its siblings span both a labeled site and the rest of the tree.
fn is_labeled(siblings: &[Resource], sites: &[String]) -> bool {
    if siblings.len() < 2 || sites.is_empty() {
        return false;
    }
    let in_site = |r: &Resource| sites.iter().any(|site| r.root_path.starts_with(site.as_str()));
    let inside = siblings.iter().filter(|r| in_site(r)).count();
    inside > 0 && inside < siblings.len()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::{PrincipalId, ResourceState, ResourceType, StructureId};

    fn at(path: &str) -> Resource {
        Resource {
            structure_id: StructureId::new(),
            resource_id: ResourceId::new(),
            parent_id: None,
            root_path: path.to_string(),
            resource_type: ResourceType::Plain,
            flags: ResourceFlags::default(),
            project_last_modified: None,
            state: ResourceState::New,
            date_created: Utc::now(),
            created_by: PrincipalId::new(),
            date_last_modified: Utc::now(),
            last_modified_by: PrincipalId::new(),
            date_released: None,
            date_expired: None,
            sibling_count: 2,
            length: 0,
            content_id: None,
        }
    }

    #[test]
    fn test_labeled_across_site_boundary() {
        let sites = vec!["/sites/".to_string()];
        assert!(is_labeled(&[at("/sites/a.html"), at("/shared/a.html")], &sites));
        assert!(!is_labeled(&[at("/sites/a.html"), at("/sites/b.html")], &sites));
        assert!(!is_labeled(&[at("/x/a.html"), at("/y/a.html")], &sites));
    }

    #[test]
    fn test_single_resource_never_labeled() {
        let sites = vec!["/sites/".to_string()];
        assert!(!is_labeled(&[at("/sites/a.html")], &sites));
        assert!(!is_labeled(&[at("/sites/a.html"), at("/b.html")], &[]));
    }
}
