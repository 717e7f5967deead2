// 🔗 Relationship correlation - bridge records between herds, parties, roles and holdings
//
// Party-role correlation: every resolved role of every live silver party,
// once per holding the party is associated with.
//
// Group-mark correlation: every live herd × each of its owner/keeper party
// ids × that party's roles at the herd's own holding. N party ids with M
// roles each give up to N×M rows; duplicates collapse on the natural key.

use crate::entities::{PartyType, ReferenceSummary, IDENTIFIER_TYPE_CPH};
use crate::silver::{natural_key_id, SilverHerd, SilverHolding, SilverParty, SilverPartyRoleRelationship};
use crate::store::Document;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteGroupMarkRelationship {
    pub id: String,
    pub holding_identifier: String,
    pub holding_identifier_type: String,
    pub herdmark: String,
    pub herd_identifier: String,
    /// Customer number of the owner/keeper
    pub party_id: String,
    pub party_type: PartyType,
    pub role_id: String,
    pub role_code: String,
    pub role_name: String,
    pub species: Option<ReferenceSummary>,
    pub production_usage: Option<ReferenceSummary>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl SiteGroupMarkRelationship {
    pub fn key_id(
        holding_identifier: &str,
        herdmark: &str,
        production_usage_id: Option<&str>,
        customer_number: &str,
        role_id: &str,
    ) -> String {
        natural_key_id(
            "site_group_mark",
            &[
                holding_identifier,
                herdmark,
                production_usage_id.unwrap_or(""),
                customer_number,
                role_id,
            ],
        )
    }

    pub fn species_code(&self) -> Option<&str> {
        self.species.as_ref().map(|s| s.code.as_str())
    }
}

impl Document for SiteGroupMarkRelationship {
    const COLLECTION: &'static str = "site_group_marks";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Holdings a party is associated with: its holder CPH list, plus the
/// boundary it was reached from
fn associated_holdings<'a>(party: &'a SilverParty, holding_identifier: &'a str) -> Vec<&'a str> {
    let mut holdings: Vec<&str> = Vec::new();
    if party.is_holder {
        holdings.extend(party.holder_cphs.iter().map(String::as_str));
    }
    if !holdings.contains(&holding_identifier) {
        holdings.push(holding_identifier);
    }
    holdings
}

pub fn correlate_party_roles(
    parties: &[SilverParty],
    holding_identifier: &str,
    source: &str,
) -> Vec<SilverPartyRoleRelationship> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut relationships = Vec::new();

    for party in parties.iter().filter(|p| !p.is_deleted) {
        for holding in associated_holdings(party, holding_identifier) {
            for role in &party.roles {
                let id = SilverPartyRoleRelationship::key_id(source, holding, &party.party_id, &role.role_id);
                if !seen.insert(id.clone()) {
                    continue;
                }
                relationships.push(SilverPartyRoleRelationship {
                    id,
                    source: source.to_string(),
                    holding_identifier: holding.to_string(),
                    holding_identifier_type: IDENTIFIER_TYPE_CPH.to_string(),
                    party_id: party.party_id.clone(),
                    party_type: party.party_type,
                    role_id: role.role_id.clone(),
                    role_code: role.role_code.clone(),
                    role_name: role.role_name.clone(),
                    effective_from: role.effective_from,
                    effective_to: role.effective_to,
                });
            }
        }
    }

    relationships
}

pub fn correlate_group_marks(
    herds: &[SilverHerd],
    relationships: &[SilverPartyRoleRelationship],
) -> Vec<SiteGroupMarkRelationship> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut rows = Vec::new();

    for herd in herds.iter().filter(|h| !h.is_deleted) {
        let production_usage_id = herd.production_usage.as_ref().and_then(|p| p.id.as_deref());

        for party_id in herd.party_ids() {
            let matching = relationships.iter().filter(|r| {
                r.party_id == party_id
                    && r.holding_identifier == herd.cph
                    && r.holding_identifier_type == IDENTIFIER_TYPE_CPH
            });

            for rel in matching {
                let id = SiteGroupMarkRelationship::key_id(
                    &herd.cph,
                    &herd.herdmark,
                    production_usage_id,
                    party_id,
                    &rel.role_id,
                );
                if !seen.insert(id.clone()) {
                    continue;
                }
                rows.push(SiteGroupMarkRelationship {
                    id,
                    holding_identifier: herd.cph.clone(),
                    holding_identifier_type: IDENTIFIER_TYPE_CPH.to_string(),
                    herdmark: herd.herdmark.clone(),
                    herd_identifier: herd.herd_identifier.clone(),
                    party_id: party_id.to_string(),
                    party_type: rel.party_type,
                    role_id: rel.role_id.clone(),
                    role_code: rel.role_code.clone(),
                    role_name: rel.role_name.clone(),
                    species: herd.species.clone(),
                    production_usage: herd.production_usage.clone(),
                    start_date: herd.start_date,
                    end_date: herd.end_date,
                });
            }
        }
    }

    rows
}

/// Fill each holding's group-mark list with the herdmarks of live herds under its CPH
pub fn attach_group_marks(holdings: &mut [SilverHolding], herds: &[SilverHerd]) {
    for holding in holdings.iter_mut() {
        let mut marks: Vec<String> = herds
            .iter()
            .filter(|h| !h.is_deleted && h.cph == holding.cph)
            .map(|h| h.herdmark.clone())
            .collect();
        marks.sort();
        marks.dedup();
        holding.group_marks = marks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AddressFields, CommunicationFields};
    use crate::silver::SilverPartyRole;

    const CPH: &str = "12/345/6789";

    fn role(id: &str) -> SilverPartyRole {
        SilverPartyRole {
            role_id: id.to_string(),
            role_code: id.to_uppercase(),
            role_name: id.to_string(),
            source_role_name: id.to_uppercase(),
            effective_from: None,
            effective_to: None,
        }
    }

    fn party(id: &str, roles: &[&str], holder_cphs: &[&str]) -> SilverParty {
        SilverParty {
            id: SilverParty::key_id(id, CPH),
            party_id: id.to_string(),
            cph: CPH.to_string(),
            party_type: PartyType::Person,
            title: None,
            first_name: None,
            second_name: None,
            last_name: None,
            organisation_name: None,
            name: None,
            address: AddressFields::default(),
            communication: CommunicationFields::default(),
            roles: roles.iter().map(|r| role(r)).collect(),
            holder_cphs: holder_cphs.iter().map(|c| c.to_string()).collect(),
            is_holder: !holder_cphs.is_empty(),
            is_deleted: false,
        }
    }

    fn herd(mark: &str, owners: &[&str], keepers: &[&str], usage_id: &str) -> SilverHerd {
        SilverHerd {
            id: SilverHerd::key_id(&format!("{}/01", CPH), mark, Some(usage_id)),
            herd_identifier: format!("{}/01", CPH),
            cph: CPH.to_string(),
            herdmark: mark.to_string(),
            species: Some(ReferenceSummary::resolved("CTT", None)),
            production_usage: Some(ReferenceSummary {
                id: Some(usage_id.to_string()),
                code: usage_id.to_uppercase(),
                name: None,
            }),
            disease_type: None,
            interval: None,
            interval_unit: None,
            movement_restriction_region: None,
            start_date: None,
            end_date: None,
            owner_party_ids: owners.iter().map(|s| s.to_string()).collect(),
            keeper_party_ids: keepers.iter().map(|s| s.to_string()).collect(),
            is_deleted: false,
            source_updated_at: None,
        }
    }

    #[test]
    fn test_party_roles_per_associated_holding() {
        let rels = correlate_party_roles(
            &[party("C1", &["r-keeper"], &[]), party("C2", &["r-holder"], &["12/345/0001", CPH])],
            CPH,
            "SAM",
        );

        let at_boundary: Vec<_> = rels.iter().filter(|r| r.holding_identifier == CPH).collect();
        assert_eq!(at_boundary.len(), 2);
        assert!(rels
            .iter()
            .any(|r| r.party_id == "C2" && r.holding_identifier == "12/345/0001"));
        assert_eq!(rels.len(), 3);
    }

    #[test]
    fn test_deleted_parties_have_no_relationships() {
        let mut gone = party("C1", &["r-keeper"], &[]);
        gone.is_deleted = true;
        assert!(correlate_party_roles(&[gone], CPH, "SAM").is_empty());
    }

    #[test]
    fn test_group_marks_are_n_by_m() {
        let rels = correlate_party_roles(
            &[party("C1", &["r-keeper", "r-owner"], &[]), party("C2", &["r-keeper"], &[])],
            CPH,
            "SAM",
        );
        // C1 listed as both owner and keeper still counts once
        let rows = correlate_group_marks(&[herd("HM1", &["C1"], &["C1", "C2"], "pu-beef")], &rels);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.herdmark == "HM1"));

        let again = correlate_group_marks(&[herd("HM1", &["C1"], &["C1", "C2"], "pu-beef")], &rels);
        assert_eq!(rows, again);
    }

    #[test]
    fn test_group_marks_skip_unknown_parties_and_deleted_herds() {
        let rels = correlate_party_roles(&[party("C1", &["r-keeper"], &[])], CPH, "SAM");
        let mut deleted = herd("HM2", &["C1"], &[], "pu-beef");
        deleted.is_deleted = true;

        let rows = correlate_group_marks(&[herd("HM1", &["C9"], &[], "pu-beef"), deleted], &rels);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_attach_group_marks() {
        let mut holdings = vec![SilverHolding {
            id: SilverHolding::key_id(CPH, None, None, None),
            cph: CPH.to_string(),
            cph_type: None,
            name: None,
            premises_type: None,
            premises_activity_type: None,
            species_code: None,
            production_usage_code: None,
            os_map_reference: None,
            easting: None,
            northing: None,
            address: AddressFields::default(),
            holding_start_date: None,
            holding_end_date: None,
            activity_start_date: None,
            activity_end_date: None,
            group_marks: Vec::new(),
            is_active: true,
            is_deleted: false,
            source_updated_at: None,
        }];

        attach_group_marks(
            &mut holdings,
            &[herd("HM2", &[], &[], "pu-beef"), herd("HM1", &[], &[], "pu-beef"), herd("HM1", &[], &[], "pu-dairy")],
        );
        assert_eq!(holdings[0].group_marks, vec!["HM1", "HM2"]);
    }
}
