// Species kept at a site (deduplicated by code)

use super::reference::ReferenceSummary;
use crate::temporal::{assign, ChangeTracked};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSpecies {
    pub id: String,
    pub species: ReferenceSummary,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for SiteSpecies {
    fn eq(&self, other: &Self) -> bool {
        self.species == other.species
    }
}

impl SiteSpecies {
    pub fn new(at: DateTime<Utc>, species: ReferenceSummary) -> Self {
        SiteSpecies {
            id: super::new_id(),
            species,
            last_updated_date: at,
        }
    }

    pub fn code(&self) -> &str {
        &self.species.code
    }

    pub fn apply_changes(&mut self, at: DateTime<Utc>, species: ReferenceSummary) -> bool {
        let changed = assign(&mut self.species, species);
        if changed {
            self.last_updated_date = at;
        }
        changed
    }
}

impl ChangeTracked for SiteSpecies {
    fn key(&self) -> String {
        self.species.code.to_uppercase()
    }

    fn last_updated_date(&self) -> DateTime<Utc> {
        self.last_updated_date
    }

    fn apply_from(&mut self, incoming: &Self, at: DateTime<Utc>) -> bool {
        self.apply_changes(at, incoming.species.clone())
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated_date = at;
    }
}
