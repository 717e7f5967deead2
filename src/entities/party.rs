// 👤 Party aggregate - a person or organisation, keyed by customer number
//
// The customer number is the upsert key: an existing party found by customer
// number keeps its internal id forever. Roles are additive; an import only
// adds or updates roles, and removal happens through `remove_site_roles`.

use super::address::{Address, AddressFields};
use super::communication::{Communication, CommunicationFields};
use super::party_role::PartyRole;
use crate::store::Document;
use crate::temporal::{assign, assign_text, merge_collection, same_text, sync_collection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyType {
    Person,
    Organisation,
}

impl PartyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyType::Person => "Person",
            PartyType::Organisation => "Organisation",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyDetails {
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub name: Option<String>,
    pub party_type: PartyType,
    pub state: Option<String>,
}

impl PartialEq for PartyDetails {
    fn eq(&self, other: &Self) -> bool {
        same_text(&self.title, &other.title)
            && same_text(&self.first_name, &other.first_name)
            && same_text(&self.last_name, &other.last_name)
            && same_text(&self.name, &other.name)
            && self.party_type == other.party_type
            && same_text(&self.state, &other.state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: String,
    pub customer_number: String,
    pub details: PartyDetails,
    pub address: Option<Address>,
    pub communication: Option<Communication>,
    pub roles: Vec<PartyRole>,
    pub deleted: bool,
    pub created_date: DateTime<Utc>,
    pub last_updated_date: DateTime<Utc>,
}

impl Document for Party {
    const COLLECTION: &'static str = "parties";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Party {
    pub fn create(id: &str, customer_number: &str, at: DateTime<Utc>, details: PartyDetails) -> Self {
        Party {
            id: id.to_string(),
            customer_number: customer_number.to_string(),
            details,
            address: None,
            communication: None,
            roles: Vec::new(),
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

    pub fn update(&mut self, at: DateTime<Utc>, details: PartyDetails) -> bool {
        if self.details == details {
            return false;
        }

        let d = &mut self.details;
        assign_text(&mut d.title, details.title);
        assign_text(&mut d.first_name, details.first_name);
        assign_text(&mut d.last_name, details.last_name);
        assign_text(&mut d.name, details.name);
        assign(&mut d.party_type, details.party_type);
        assign_text(&mut d.state, details.state);
        self.stamp(at, true)
    }

    pub fn set_address(&mut self, at: DateTime<Utc>, fields: Option<AddressFields>) -> bool {
        let fields = fields.filter(|f| !f.is_empty());
        let changed = Address::apply_to_slot(&mut self.address, at, fields);
        self.stamp(at, changed)
    }

    pub fn set_communication(&mut self, at: DateTime<Utc>, fields: Option<CommunicationFields>) -> bool {
        let changed = Communication::apply_to_slot(&mut self.communication, at, fields);
        self.stamp(at, changed)
    }

    /// Replace the role list, pruning roles absent from `roles`
    pub fn set_roles(&mut self, at: DateTime<Utc>, roles: Vec<PartyRole>) -> bool {
        let changed = sync_collection(&mut self.roles, roles, at).any();
        self.stamp(at, changed)
    }

    /// Add or update roles; roles missing from `roles` are kept
    pub fn merge_roles(&mut self, at: DateTime<Utc>, roles: Vec<PartyRole>) -> bool {
        let changed = merge_collection(&mut self.roles, roles, at).any();
        self.stamp(at, changed)
    }

    /// Drop role instances of `role_id` tied to `site_id`. Roles at another
    /// site, or without a site, survive. Returns how many were removed.
    pub fn remove_site_roles(&mut self, at: DateTime<Utc>, role_id: &str, site_id: &str) -> usize {
        let before = self.roles.len();
        self.roles
            .retain(|r| !(r.role_id() == role_id && r.site_id() == Some(site_id)));
        let removed = before - self.roles.len();
        self.stamp(at, removed > 0);
        removed
    }

    pub fn set_deleted(&mut self, at: DateTime<Utc>, deleted: bool) -> bool {
        let changed = assign(&mut self.deleted, deleted);
        self.stamp(at, changed)
    }

    pub fn roles_at_site<'a>(&'a self, site_id: &'a str) -> impl Iterator<Item = &'a PartyRole> + 'a {
        self.roles.iter().filter(move |r| r.site_id() == Some(site_id))
    }
}
