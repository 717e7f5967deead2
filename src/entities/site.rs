// 🏡 Site aggregate - one per holding (premises) natural key
//
// "Site id is IDENTITY (assigned once), everything else is a VALUE"
//
// Lifecycle is load → mutate → save: every setter returns whether it changed
// anything, and the site's own LastUpdatedDate moves only when at least one
// field or child actually changed.

use super::group_mark::GroupMark;
use super::location::{Location, LocationFields};
use super::party_role::PartyRoleSite;
use super::reference::ReferenceSummary;
use super::site_activity::SiteActivity;
use super::site_identifier::{SiteIdentifier, IDENTIFIER_TYPE_CPH};
use super::site_party::SiteParty;
use super::site_species::SiteSpecies;
use crate::store::Document;
use crate::temporal::{assign, assign_text, same_text, sync_collection};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const SITE_STATE_ACTIVE: &str = "Active";
pub const SITE_STATE_INACTIVE: &str = "Inactive";

/// Top-level site fields taken from the representative holding
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteDetails {
    pub name: Option<String>,
    pub premises_type: Option<ReferenceSummary>,
    pub state: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub source: Option<String>,
}

impl PartialEq for SiteDetails {
    fn eq(&self, other: &Self) -> bool {
        same_text(&self.name, &other.name)
            && self.premises_type == other.premises_type
            && same_text(&self.state, &other.state)
            && self.start_date == other.start_date
            && self.end_date == other.end_date
            && same_text(&self.source, &other.source)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub details: SiteDetails,
    pub location: Option<Location>,
    pub identifiers: Vec<SiteIdentifier>,
    pub species: Vec<SiteSpecies>,
    pub activities: Vec<SiteActivity>,
    pub group_marks: Vec<GroupMark>,
    pub parties: Vec<SiteParty>,
    pub deleted: bool,
    pub created_date: DateTime<Utc>,
    pub last_updated_date: DateTime<Utc>,
}

impl Document for Site {
    const COLLECTION: &'static str = "sites";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Site {
    /// Domain-level create, seeded with a caller-supplied site id
    pub fn create(id: &str, at: DateTime<Utc>, details: SiteDetails, identifiers: Vec<SiteIdentifier>) -> Self {
        Site {
            id: id.to_string(),
            details,
            location: None,
            identifiers,
            species: Vec::new(),
            activities: Vec::new(),
            group_marks: Vec::new(),
            parties: Vec::new(),
            deleted: false,
            created_date: at,
            last_updated_date: at,
        }
    }

    fn stamp(&mut self, at: DateTime<Utc>, changed: bool) -> bool {
        if changed {
            self.last_updated_date = at;
        }
        changed
    }

    pub fn update(&mut self, at: DateTime<Utc>, details: SiteDetails) -> bool {
        if self.details == details {
            return false;
        }

        let d = &mut self.details;
        assign_text(&mut d.name, details.name);
        assign(&mut d.premises_type, details.premises_type);
        assign_text(&mut d.state, details.state);
        assign(&mut d.start_date, details.start_date);
        assign(&mut d.end_date, details.end_date);
        assign_text(&mut d.source, details.source);
        self.stamp(at, true)
    }

    pub fn set_location(&mut self, at: DateTime<Utc>, fields: Option<LocationFields>) -> bool {
        let changed = match (self.location.as_mut(), fields) {
            (Some(existing), Some(fields)) => existing.apply_changes(at, fields),
            (None, Some(fields)) => {
                self.location = Some(Location::create(at, fields));
                true
            }
            (Some(_), None) => {
                self.location = None;
                true
            }
            (None, None) => false,
        };
        self.stamp(at, changed)
    }

    pub fn set_identifiers(&mut self, at: DateTime<Utc>, identifiers: Vec<SiteIdentifier>) -> bool {
        let changed = sync_collection(&mut self.identifiers, identifiers, at).any();
        self.stamp(at, changed)
    }

    pub fn set_species(&mut self, at: DateTime<Utc>, species: Vec<SiteSpecies>) -> bool {
        let changed = sync_collection(&mut self.species, species, at).any();
        self.stamp(at, changed)
    }

    pub fn set_activities(&mut self, at: DateTime<Utc>, activities: Vec<SiteActivity>) -> bool {
        let changed = sync_collection(&mut self.activities, activities, at).any();
        self.stamp(at, changed)
    }

    pub fn set_group_marks(&mut self, at: DateTime<Utc>, group_marks: Vec<GroupMark>) -> bool {
        let changed = sync_collection(&mut self.group_marks, group_marks, at).any();
        self.stamp(at, changed)
    }

    pub fn set_parties(&mut self, at: DateTime<Utc>, parties: Vec<SiteParty>) -> bool {
        let changed = sync_collection(&mut self.parties, parties, at).any();
        self.stamp(at, changed)
    }

    pub fn set_deleted(&mut self, at: DateTime<Utc>, deleted: bool) -> bool {
        let changed = assign(&mut self.deleted, deleted);
        self.stamp(at, changed)
    }

    /// The CPH this site was created for
    pub fn holding_identifier(&self) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|i| i.identifier_type == IDENTIFIER_TYPE_CPH)
            .map(|i| i.identifier.as_str())
    }

    pub fn has_identifier(&self, identifier: &str) -> bool {
        self.identifiers.iter().any(|i| i.identifier == identifier)
    }

    /// Summary denormalized onto party roles held at this site
    pub fn role_summary(&self) -> PartyRoleSite {
        PartyRoleSite {
            id: self.id.clone(),
            name: self.details.name.clone(),
            state: self.details.state.clone(),
            identifier: self.holding_identifier().map(str::to_string),
        }
    }
}
