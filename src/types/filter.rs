use chrono::{DateTime, Utc};

use super::Resource;

/// Selects which resources are visible to a read: deleted, expired and not-yet-released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceFilter {
    include_deleted: bool,
    require_timerange: bool,
    require_visible: bool,
}

impl ResourceFilter {
    /// Every resource, tombstones and expired ones included.
    pub const ALL: ResourceFilter = ResourceFilter {
        include_deleted: true,
        require_timerange: false,
        require_visible: false,
    };

    /// Live resources regardless of release and expiration dates.
    pub const IGNORE_EXPIRATION: ResourceFilter = ResourceFilter {
        include_deleted: false,
        require_timerange: false,
        require_visible: false,
    };

    /// Live, released and unexpired resources, whether or not the caller may view them.
    pub const DEFAULT: ResourceFilter = ResourceFilter {
        include_deleted: false,
        require_timerange: true,
        require_visible: false,
    };

    /// Like [`ResourceFilter::DEFAULT`], but the VIEW bit is actually checked.
    pub const ONLY_VISIBLE: ResourceFilter = ResourceFilter {
        include_deleted: false,
        require_timerange: true,
        require_visible: true,
    };

    #[must_use]
    pub fn is_valid(&self, resource: &Resource) -> bool {
        self.is_valid_at(resource, Utc::now())
    }

    #[must_use]
    pub fn is_valid_at(&self, resource: &Resource, now: DateTime<Utc>) -> bool {
        if !self.include_deleted && resource.state.is_deleted() {
            return false;
        }
        if self.require_timerange
            && (!resource.is_released_at(now) || resource.is_expired_at(now))
        {
            return false;
        }
        true
    }

    /// Invisible resources pass this filter, so the VIEW bit is forced on.
    #[must_use]
    pub const fn includes_invisible(&self) -> bool {
        !self.require_visible
    }

    #[must_use]
    pub const fn includes_deleted(&self) -> bool {
        self.include_deleted
    }
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}
