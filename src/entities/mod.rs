// Entity Models - gold aggregates and the value objects they own
//
// Each aggregate has:
// - Stable identity that NEVER changes once assigned (site id, party id)
// - Child values compared structurally (id and timestamps ignored)
// - Setters that return a changed flag and re-stamp only on real change

pub mod reference;
pub mod address;
pub mod communication;
pub mod location;
pub mod site_identifier;
pub mod site_activity;
pub mod site_species;
pub mod group_mark;
pub mod site_party;
pub mod party_role;
pub mod site;
pub mod party;

pub use reference::ReferenceSummary;
pub use address::{Address, AddressFields};
pub use communication::{Communication, CommunicationFields};
pub use location::{Location, LocationFields};
pub use site_identifier::{SiteIdentifier, IDENTIFIER_TYPE_CPH};
pub use site_activity::SiteActivity;
pub use site_species::SiteSpecies;
pub use group_mark::GroupMark;
pub use site_party::SiteParty;
pub use party_role::{ManagedSpecies, PartyRole, PartyRoleSite};
pub use site::{Site, SiteDetails};
pub use party::{Party, PartyDetails, PartyType};

/// Fresh internal id for a value object or aggregate
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
