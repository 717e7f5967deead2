// 🤝 Party aggregator - one merged row per party id from party + holder extracts
//
// Pure function, no store or lookup access:
// - party-row values win whenever they are present
// - holder rows only fill fields the party rows left null/blank
// - roles are unioned; appearing in the holder extract adds one holder role
// - rows marked deleted contribute no roles and no holder registration
// - an id only present in the holder extract yields a row with just that role

use crate::formatting::{non_blank, split_list};
use crate::parser::{RawHolder, RawParty};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Source role name synthesized for parties found in the holder extract
pub const HOLDER_ROLE_NAME: &str = "CPHHOLDER";

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRole {
    pub name: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedParty {
    pub party_id: String,
    pub title: Option<String>,
    pub given_name: Option<String>,
    pub given_name2: Option<String>,
    pub family_name: Option<String>,
    pub organisation_name: Option<String>,
    pub telephone_number: Option<String>,
    pub mobile_number: Option<String>,
    pub email_address: Option<String>,
    pub saon_start_number: Option<i32>,
    pub saon_start_number_suffix: Option<String>,
    pub saon_end_number: Option<i32>,
    pub saon_end_number_suffix: Option<String>,
    pub saon_description: Option<String>,
    pub paon_start_number: Option<i32>,
    pub paon_start_number_suffix: Option<String>,
    pub paon_end_number: Option<i32>,
    pub paon_end_number_suffix: Option<String>,
    pub paon_description: Option<String>,
    pub street: Option<String>,
    pub locality: Option<String>,
    pub town: Option<String>,
    pub postcode: Option<String>,
    pub country_code: Option<String>,
    pub uk_internal_code: Option<String>,
    pub udprn: Option<String>,
    pub roles: Vec<SourceRole>,
    pub holder_cphs: Vec<String>,
    pub is_holder: bool,
    /// True only when every contributing row was a delete
    pub is_deleted: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

fn fill_text(slot: &mut Option<String>, value: &Option<String>) {
    if non_blank(slot.as_deref()).is_none() {
        if let Some(v) = non_blank(value.as_deref()) {
            *slot = Some(v);
        }
    }
}

fn fill<T: Copy>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

impl MergedParty {
    fn new(party_id: &str) -> Self {
        MergedParty {
            party_id: party_id.to_string(),
            title: None,
            given_name: None,
            given_name2: None,
            family_name: None,
            organisation_name: None,
            telephone_number: None,
            mobile_number: None,
            email_address: None,
            saon_start_number: None,
            saon_start_number_suffix: None,
            saon_end_number: None,
            saon_end_number_suffix: None,
            saon_description: None,
            paon_start_number: None,
            paon_start_number_suffix: None,
            paon_end_number: None,
            paon_end_number_suffix: None,
            paon_description: None,
            street: None,
            locality: None,
            town: None,
            postcode: None,
            country_code: None,
            uk_internal_code: None,
            udprn: None,
            roles: Vec::new(),
            holder_cphs: Vec::new(),
            is_holder: false,
            is_deleted: true,
            updated_at: None,
        }
    }

    fn add_role(&mut self, role: SourceRole) {
        let exists = self
            .roles
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(&role.name));
        if !exists {
            self.roles.push(role);
        }
    }

    fn seen(&mut self, deleted: bool, updated_at: Option<DateTime<Utc>>) {
        self.is_deleted &= deleted;
        self.updated_at = self.updated_at.max(updated_at);
    }

    fn absorb_party(&mut self, row: &RawParty) {
        fill_text(&mut self.title, &row.title);
        fill_text(&mut self.given_name, &row.given_name);
        fill_text(&mut self.given_name2, &row.given_name2);
        fill_text(&mut self.family_name, &row.family_name);
        fill_text(&mut self.organisation_name, &row.organisation_name);
        fill_text(&mut self.telephone_number, &row.telephone_number);
        fill_text(&mut self.mobile_number, &row.mobile_number);
        fill_text(&mut self.email_address, &row.email_address);
        fill(&mut self.saon_start_number, row.saon_start_number);
        fill_text(&mut self.saon_start_number_suffix, &row.saon_start_number_suffix);
        fill(&mut self.saon_end_number, row.saon_end_number);
        fill_text(&mut self.saon_end_number_suffix, &row.saon_end_number_suffix);
        fill_text(&mut self.saon_description, &row.saon_description);
        fill(&mut self.paon_start_number, row.paon_start_number);
        fill_text(&mut self.paon_start_number_suffix, &row.paon_start_number_suffix);
        fill(&mut self.paon_end_number, row.paon_end_number);
        fill_text(&mut self.paon_end_number_suffix, &row.paon_end_number_suffix);
        fill_text(&mut self.paon_description, &row.paon_description);
        fill_text(&mut self.street, &row.street);
        fill_text(&mut self.locality, &row.locality);
        fill_text(&mut self.town, &row.town);
        fill_text(&mut self.postcode, &row.postcode);
        fill_text(&mut self.country_code, &row.country_code);
        fill_text(&mut self.uk_internal_code, &row.uk_internal_code);
        fill_text(&mut self.udprn, &row.udprn);

        if !row.is_deleted() {
            for name in split_list(row.roles.as_deref()) {
                self.add_role(SourceRole {
                    name,
                    from: row.role_from_date,
                    to: row.role_to_date,
                });
            }
        }
        self.seen(row.is_deleted(), row.updated_at);
    }

    fn absorb_holder(&mut self, row: &RawHolder) {
        fill_text(&mut self.title, &row.title);
        fill_text(&mut self.given_name, &row.given_name);
        fill_text(&mut self.given_name2, &row.given_name2);
        fill_text(&mut self.family_name, &row.family_name);
        fill_text(&mut self.organisation_name, &row.organisation_name);
        fill_text(&mut self.telephone_number, &row.telephone_number);
        fill_text(&mut self.mobile_number, &row.mobile_number);
        fill_text(&mut self.email_address, &row.email_address);
        fill(&mut self.saon_start_number, row.saon_start_number);
        fill_text(&mut self.saon_start_number_suffix, &row.saon_start_number_suffix);
        fill(&mut self.saon_end_number, row.saon_end_number);
        fill_text(&mut self.saon_end_number_suffix, &row.saon_end_number_suffix);
        fill_text(&mut self.saon_description, &row.saon_description);
        fill(&mut self.paon_start_number, row.paon_start_number);
        fill_text(&mut self.paon_start_number_suffix, &row.paon_start_number_suffix);
        fill(&mut self.paon_end_number, row.paon_end_number);
        fill_text(&mut self.paon_end_number_suffix, &row.paon_end_number_suffix);
        fill_text(&mut self.paon_description, &row.paon_description);
        fill_text(&mut self.street, &row.street);
        fill_text(&mut self.locality, &row.locality);
        fill_text(&mut self.town, &row.town);
        fill_text(&mut self.postcode, &row.postcode);
        fill_text(&mut self.country_code, &row.country_code);
        fill_text(&mut self.uk_internal_code, &row.uk_internal_code);
        fill_text(&mut self.udprn, &row.udprn);

        // A deleted registration no longer makes the party a holder
        if !row.is_deleted() {
            for cph in split_list(row.cphs.as_deref()) {
                if !self.holder_cphs.contains(&cph) {
                    self.holder_cphs.push(cph);
                }
            }
            self.is_holder = true;
        }
        self.seen(row.is_deleted(), row.updated_at);
    }
}

/// Merge both extracts into exactly one row per distinct party id.
///
/// Within one extract the most recently updated row takes precedence.
/// Output is ordered by party id.
pub fn aggregate_parties(parties: &[RawParty], holders: &[RawHolder]) -> Vec<MergedParty> {
    let mut merged: BTreeMap<String, MergedParty> = BTreeMap::new();

    let mut party_rows: Vec<(String, &RawParty)> = parties
        .iter()
        .filter_map(|p| non_blank(p.party_id.as_deref()).map(|id| (id, p)))
        .collect();
    party_rows.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));

    for (id, row) in party_rows {
        merged
            .entry(id.clone())
            .or_insert_with(|| MergedParty::new(&id))
            .absorb_party(row);
    }

    let mut holder_rows: Vec<(String, &RawHolder)> = holders
        .iter()
        .filter_map(|h| non_blank(h.party_id.as_deref()).map(|id| (id, h)))
        .collect();
    holder_rows.sort_by(|a, b| b.1.updated_at.cmp(&a.1.updated_at));

    for (id, row) in holder_rows {
        merged
            .entry(id.clone())
            .or_insert_with(|| MergedParty::new(&id))
            .absorb_holder(row);
    }

    merged
        .into_values()
        .map(|mut party| {
            if party.is_holder {
                party.add_role(SourceRole {
                    name: HOLDER_ROLE_NAME.to_string(),
                    from: None,
                    to: None,
                });
            }
            party
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn party(id: &str, street: Option<&str>, roles: &str) -> RawParty {
        RawParty {
            party_id: Some(id.to_string()),
            street: street.map(str::to_string),
            roles: Some(roles.to_string()),
            ..RawParty::default()
        }
    }

    fn holder(id: &str, street: Option<&str>, cphs: &str) -> RawHolder {
        RawHolder {
            party_id: Some(id.to_string()),
            street: street.map(str::to_string),
            cphs: Some(cphs.to_string()),
            ..RawHolder::default()
        }
    }

    fn role_names(p: &MergedParty) -> Vec<&str> {
        p.roles.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_party_value_wins_over_holder() {
        let merged = aggregate_parties(
            &[party("C1", Some("High Street"), "LIVESTOCKKEEPER")],
            &[holder("C1", Some("Mill Lane"), "12/345/6789")],
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].street.as_deref(), Some("High Street"));
    }

    #[test]
    fn test_holder_fills_gaps() {
        let mut row = party("C1", Some(""), "LIVESTOCKKEEPER");
        row.postcode = None;
        let mut h = holder("C1", Some("Mill Lane"), "12/345/6789");
        h.postcode = Some("EX1 1AA".to_string());

        let merged = aggregate_parties(&[row], &[h]);
        assert_eq!(merged[0].street.as_deref(), Some("Mill Lane"));
        assert_eq!(merged[0].postcode.as_deref(), Some("EX1 1AA"));
    }

    #[test]
    fn test_roles_unioned_with_single_holder_role() {
        let merged = aggregate_parties(
            &[party("C1", None, "LIVESTOCKKEEPER, LIVESTOCKOWNER")],
            &[holder("C1", None, "12/345/6789"), holder("C1", None, "12/345/0001")],
        );
        assert_eq!(role_names(&merged[0]), vec!["LIVESTOCKKEEPER", "LIVESTOCKOWNER", HOLDER_ROLE_NAME]);
        assert_eq!(merged[0].holder_cphs, vec!["12/345/6789", "12/345/0001"]);
        assert!(merged[0].is_holder);
    }

    #[test]
    fn test_holder_only_party() {
        let merged = aggregate_parties(&[], &[holder("C9", Some("Mill Lane"), "12/345/6789")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].party_id, "C9");
        assert_eq!(role_names(&merged[0]), vec![HOLDER_ROLE_NAME]);
    }

    #[test]
    fn test_one_row_per_id_latest_party_row_first() {
        let mut older = party("C1", Some("Old Road"), "LIVESTOCKKEEPER");
        older.updated_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let mut newer = party("C1", Some("New Road"), "LIVESTOCKOWNER");
        newer.updated_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());

        let merged = aggregate_parties(&[older, newer, party("C2", None, "")], &[]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].street.as_deref(), Some("New Road"));
        assert_eq!(role_names(&merged[0]), vec!["LIVESTOCKOWNER", "LIVESTOCKKEEPER"]);
        assert!(!merged[0].is_holder);
    }

    #[test]
    fn test_deleted_rows_add_no_roles() {
        let mut gone = holder("C1", None, "12/345/6789");
        gone.change_type = Some("D".to_string());
        let mut retired = party("C1", None, "LIVESTOCKOWNER");
        retired.change_type = Some("D".to_string());

        let merged = aggregate_parties(&[party("C1", None, "LIVESTOCKKEEPER"), retired], &[gone]);
        assert_eq!(role_names(&merged[0]), vec!["LIVESTOCKKEEPER"]);
        assert!(!merged[0].is_holder);
        assert!(merged[0].holder_cphs.is_empty());
        assert!(!merged[0].is_deleted);

        let mut only = holder("C9", None, "12/345/6789");
        only.change_type = Some("D".to_string());
        let merged = aggregate_parties(&[], &[only]);
        assert!(merged[0].roles.is_empty());
        assert!(merged[0].is_deleted);
    }

    #[test]
    fn test_rows_without_id_are_ignored() {
        let mut row = party("", None, "LIVESTOCKKEEPER");
        row.party_id = None;
        assert!(aggregate_parties(&[row], &[]).is_empty());
    }
}
