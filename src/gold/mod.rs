// Gold layer - consolidated Site / Party aggregates and their query projection

pub mod party_consolidator;
pub mod site_consolidator;
pub mod site_party_role;

pub use party_consolidator::{consolidate_party, PartySources};
pub use site_consolidator::{consolidate_site, site_summary, SiteSources};
pub use site_party_role::{orphaned_roles, project_site_party_roles, SitePartyRoleRelationship};

/// Outcome of consolidating one aggregate
#[derive(Debug, Clone)]
pub struct Consolidated<T> {
    pub entity: T,
    /// No persisted aggregate existed before
    pub created: bool,
    /// Anything differs from the persisted aggregate (always true when created)
    pub changed: bool,
}

impl<T> Consolidated<T> {
    /// Whether the aggregate needs saving
    pub fn needs_write(&self) -> bool {
        self.created || self.changed
    }
}
