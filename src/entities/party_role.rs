// 🎭 Party role - a role a party holds, at which site, managing which species
//
// A party can hold the same role type at several sites, so a role instance
// is identified by (role id, site id), not by role id alone.

use super::reference::ReferenceSummary;
use crate::temporal::{assign, sync_collection, ChangeTracked};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Denormalized summary of the site a role applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRoleSite {
    pub id: String,
    pub name: Option<String>,
    pub state: Option<String>,
    pub identifier: Option<String>,
}

/// A species the party manages under a role, with the group mark's window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedSpecies {
    pub id: String,
    pub species: ReferenceSummary,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for ManagedSpecies {
    fn eq(&self, other: &Self) -> bool {
        self.species == other.species && self.start_date == other.start_date && self.end_date == other.end_date
    }
}

impl ManagedSpecies {
    pub fn new(
        at: DateTime<Utc>,
        species: ReferenceSummary,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        ManagedSpecies {
            id: super::new_id(),
            species,
            start_date,
            end_date,
            last_updated_date: at,
        }
    }
}

impl ChangeTracked for ManagedSpecies {
    fn key(&self) -> String {
        self.species.code.to_uppercase()
    }

    fn last_updated_date(&self) -> DateTime<Utc> {
        self.last_updated_date
    }

    fn apply_from(&mut self, incoming: &Self, at: DateTime<Utc>) -> bool {
        let mut changed = assign(&mut self.species, incoming.species.clone());
        changed |= assign(&mut self.start_date, incoming.start_date);
        changed |= assign(&mut self.end_date, incoming.end_date);
        if changed {
            self.last_updated_date = at;
        }
        changed
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated_date = at;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyRole {
    pub id: String,
    /// Role type; `role.id` is always resolved (unresolved roles are dropped upstream)
    pub role: ReferenceSummary,
    pub site: Option<PartyRoleSite>,
    pub species_managed: Vec<ManagedSpecies>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub last_updated_date: DateTime<Utc>,
}

impl PartialEq for PartyRole {
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role
            && self.site == other.site
            && self.species_managed == other.species_managed
            && self.effective_from == other.effective_from
            && self.effective_to == other.effective_to
    }
}

impl PartyRole {
    pub fn new(at: DateTime<Utc>, role: ReferenceSummary, site: Option<PartyRoleSite>) -> Self {
        PartyRole {
            id: super::new_id(),
            role,
            site,
            species_managed: Vec::new(),
            effective_from: None,
            effective_to: None,
            last_updated_date: at,
        }
    }

    pub fn role_id(&self) -> &str {
        self.role.id.as_deref().unwrap_or("")
    }

    pub fn site_id(&self) -> Option<&str> {
        self.site.as_ref().map(|s| s.id.as_str())
    }

    /// Species and effective dates only. Denormalized labels are left as
    /// first recorded: the role's code/name and the site summary (name,
    /// state) alike, so a renamed or deactivated site shows on the Site
    /// itself and not on roles already pointing at it.
    pub fn apply_changes(
        &mut self,
        at: DateTime<Utc>,
        species_managed: Vec<ManagedSpecies>,
        effective_from: Option<NaiveDate>,
        effective_to: Option<NaiveDate>,
    ) -> bool {
        let mut changed = sync_collection(&mut self.species_managed, species_managed, at).any();
        changed |= assign(&mut self.effective_from, effective_from);
        changed |= assign(&mut self.effective_to, effective_to);
        if changed {
            self.last_updated_date = at;
        }
        changed
    }
}

impl ChangeTracked for PartyRole {
    fn key(&self) -> String {
        format!("{}|{}", self.role_id(), self.site_id().unwrap_or(""))
    }

    fn last_updated_date(&self) -> DateTime<Utc> {
        self.last_updated_date
    }

    fn apply_from(&mut self, incoming: &Self, at: DateTime<Utc>) -> bool {
        self.apply_changes(
            at,
            incoming.species_managed.clone(),
            incoming.effective_from,
            incoming.effective_to,
        )
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_updated_date = at;
        for species in &mut self.species_managed {
            species.touch(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn keeper(site: &str, species: &[&str]) -> PartyRole {
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut role = PartyRole::new(
            t0,
            ReferenceSummary {
                id: Some("r-keeper".to_string()),
                code: "LIVESTOCKKEEPER".to_string(),
                name: Some("Keeper".to_string()),
            },
            Some(PartyRoleSite {
                id: site.to_string(),
                name: None,
                state: None,
                identifier: None,
            }),
        );
        role.species_managed = species
            .iter()
            .map(|code| ManagedSpecies::new(t0, ReferenceSummary::resolved(code, None), None, None))
            .collect();
        role
    }

    #[test]
    fn test_key_includes_site() {
        assert_ne!(keeper("site-1", &[]).key(), keeper("site-2", &[]).key());
        assert_eq!(keeper("site-1", &["CTT"]).key(), keeper("site-1", &[]).key());
    }

    #[test]
    fn test_update_keeps_labels() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut existing = keeper("site-1", &["CTT"]);
        let mut incoming = keeper("site-1", &["CTT", "SHP"]);
        incoming.role.name = Some("Livestock Keeper".to_string());
        if let Some(site) = incoming.site.as_mut() {
            site.name = Some("Renamed Farm".to_string());
            site.state = Some("Inactive".to_string());
        }

        assert!(existing.apply_from(&incoming, t1));
        assert_eq!(existing.role.name.as_deref(), Some("Keeper"));
        let site = existing.site.as_ref().unwrap();
        assert!(site.name.is_none());
        assert!(site.state.is_none());
        assert_eq!(existing.species_managed.len(), 2);
        assert_eq!(existing.last_updated_date, t1);
    }

    #[test]
    fn test_identical_role_is_unchanged() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut existing = keeper("site-1", &["CTT"]);
        assert!(!existing.apply_from(&keeper("site-1", &["CTT"]), t1));
        assert!(existing.last_updated_date < t1);
    }
}
