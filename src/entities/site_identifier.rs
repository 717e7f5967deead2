// Site identifier value object - natural key ↔ identifier type pair

use crate::temporal::ChangeTracked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const IDENTIFIER_TYPE_CPH: &str = "CPH";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteIdentifier {
    pub id: String,
    pub identifier: String,
    pub identifier_type: String,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for SiteIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier && self.identifier_type == other.identifier_type
    }
}

impl SiteIdentifier {
    pub fn new(at: DateTime<Utc>, identifier: &str, identifier_type: &str) -> Self {
        SiteIdentifier {
            id: super::new_id(),
            identifier: identifier.to_string(),
            identifier_type: identifier_type.to_string(),
            last_updated_date: at,
        }
    }

    pub fn cph(at: DateTime<Utc>, cph: &str) -> Self {
        Self::new(at, cph, IDENTIFIER_TYPE_CPH)
    }

    /// Both fields form the key, so there is never anything to update in place
    pub fn apply_changes(&mut self, _at: DateTime<Utc>, identifier: &str, identifier_type: &str) -> bool {
        debug_assert!(self.identifier == identifier && self.identifier_type == identifier_type);
        false
    }
}

impl ChangeTracked for SiteIdentifier {
    fn key(&self) -> String {
        format!("{}|{}", self.identifier_type, self.identifier)
    }

    fn last_updated_date(&self) -> DateTime<Utc> {
        self.last_updated_date
    }

    fn apply_from(&mut self, incoming: &Self, at: DateTime<Utc>) -> bool {
        self.apply_changes(at, &incoming.identifier, &incoming.identifier_type)
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated_date = at;
    }
}
