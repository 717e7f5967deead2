// Denormalized party summary carried on a Site

use crate::temporal::{assign, assign_text, same_text, ChangeTracked};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteParty {
    pub id: String,
    /// Internal id of the gold Party
    pub party_id: String,
    pub customer_number: String,
    pub name: Option<String>,
    pub party_type: Option<String>,
    /// Role names this party holds at the site
    pub roles: Vec<String>,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for SiteParty {
    fn eq(&self, other: &Self) -> bool {
        self.party_id == other.party_id
            && self.customer_number == other.customer_number
            && same_text(&self.name, &other.name)
            && same_text(&self.party_type, &other.party_type)
            && self.roles == other.roles
    }
}

impl SiteParty {
    pub fn apply_changes(&mut self, at: DateTime<Utc>, incoming: &SiteParty) -> bool {
        let mut changed = assign(&mut self.party_id, incoming.party_id.clone());
        changed |= assign_text(&mut self.name, incoming.name.clone());
        changed |= assign_text(&mut self.party_type, incoming.party_type.clone());
        changed |= assign(&mut self.roles, incoming.roles.clone());
        if changed {
            self.last_updated_date = at;
        }
        changed
    }
}

impl ChangeTracked for SiteParty {
    fn key(&self) -> String {
        self.customer_number.clone()
    }

    fn last_updated_date(&self) -> DateTime<Utc> {
        self.last_updated_date
    }

    fn apply_from(&mut self, incoming: &Self, at: DateTime<Utc>) -> bool {
        self.apply_changes(at, incoming)
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated_date = at;
    }
}
