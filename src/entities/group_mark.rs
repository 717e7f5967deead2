// 🐄 Group mark - a herdmark's validity window with species / production context

use super::reference::ReferenceSummary;
use crate::temporal::{assign, ChangeTracked};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMark {
    pub id: String,
    pub mark: String,
    pub herd_identifier: Option<String>,
    pub species: Option<ReferenceSummary>,
    pub production_usage: Option<ReferenceSummary>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for GroupMark {
    fn eq(&self, other: &Self) -> bool {
        self.mark == other.mark
            && self.herd_identifier == other.herd_identifier
            && self.species == other.species
            && self.production_usage == other.production_usage
            && self.start_date == other.start_date
            && self.end_date == other.end_date
    }
}

impl GroupMark {
    pub fn new(at: DateTime<Utc>, mark: &str) -> Self {
        GroupMark {
            id: super::new_id(),
            mark: mark.to_string(),
            herd_identifier: None,
            species: None,
            production_usage: None,
            start_date: None,
            end_date: None,
            last_updated_date: at,
        }
    }

    pub fn production_usage_code(&self) -> &str {
        self.production_usage.as_ref().map_or("", |p| p.code.as_str())
    }

    pub fn apply_changes(&mut self, at: DateTime<Utc>, incoming: &GroupMark) -> bool {
        let mut changed = assign(&mut self.herd_identifier, incoming.herd_identifier.clone());
        changed |= assign(&mut self.species, incoming.species.clone());
        changed |= assign(&mut self.production_usage, incoming.production_usage.clone());
        changed |= assign(&mut self.start_date, incoming.start_date);
        changed |= assign(&mut self.end_date, incoming.end_date);
        if changed {
            self.last_updated_date = at;
        }
        changed
    }
}

impl ChangeTracked for GroupMark {
    /// One entry per herdmark and production usage
    fn key(&self) -> String {
        format!("{}|{}", self.mark, self.production_usage_code())
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
