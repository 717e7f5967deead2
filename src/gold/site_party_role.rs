// Site-party-role projection - "who holds what role, for which species, at which holding"
//
// Rebuilt from scratch every batch. Comparing the previous projection of a
// holding with the new one yields the (customer number, role id) pairs that
// disappeared, which drives the orphan-role cleanup on gold parties.

use crate::correlation::SiteGroupMarkRelationship;
use crate::entities::{PartyType, ReferenceSummary};
use crate::silver::{natural_key_id, SilverPartyRoleRelationship};
use crate::store::Document;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePartyRoleRelationship {
    pub id: String,
    pub holding_identifier: String,
    pub customer_number: String,
    /// Internal id of the gold Party, when one was consolidated
    pub party_id: Option<String>,
    pub party_type: PartyType,
    pub role_id: String,
    pub role_code: String,
    pub role_name: String,
    pub species: Option<ReferenceSummary>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

impl SitePartyRoleRelationship {
    pub fn key_id(holding_identifier: &str, customer_number: &str, role_id: &str, species_code: Option<&str>) -> String {
        natural_key_id(
            "site_party_role",
            &[holding_identifier, customer_number, role_id, species_code.unwrap_or("")],
        )
    }
}

impl Document for SitePartyRoleRelationship {
    const COLLECTION: &'static str = "site_party_roles";

    fn id(&self) -> &str {
        &self.id
    }
}

/// One row per party role at the holding and per species that role manages
/// there; a role managing no species still gets a row without species.
pub fn project_site_party_roles(
    relationships: &[SilverPartyRoleRelationship],
    group_marks: &[SiteGroupMarkRelationship],
    party_ids: &HashMap<String, String>,
) -> Vec<SitePartyRoleRelationship> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut rows = Vec::new();

    for rel in relationships {
        let mut species: Vec<Option<ReferenceSummary>> = Vec::new();
        for gm in group_marks.iter().filter(|gm| {
            gm.party_id == rel.party_id
                && gm.role_id == rel.role_id
                && gm.holding_identifier == rel.holding_identifier
        }) {
            let already = species
                .iter()
                .flatten()
                .any(|s| Some(s.code.as_str()) == gm.species_code());
            if gm.species.is_some() && !already {
                species.push(gm.species.clone());
            }
        }
        if species.is_empty() {
            species.push(None);
        }

        for s in species {
            let id = SitePartyRoleRelationship::key_id(
                &rel.holding_identifier,
                &rel.party_id,
                &rel.role_id,
                s.as_ref().map(|s| s.code.as_str()),
            );
            if !seen.insert(id.clone()) {
                continue;
            }
            rows.push(SitePartyRoleRelationship {
                id,
                holding_identifier: rel.holding_identifier.clone(),
                customer_number: rel.party_id.clone(),
                party_id: party_ids.get(&rel.party_id).cloned(),
                party_type: rel.party_type,
                role_id: rel.role_id.clone(),
                role_code: rel.role_code.clone(),
                role_name: rel.role_name.clone(),
                species: s,
                effective_from: rel.effective_from,
                effective_to: rel.effective_to,
            });
        }
    }

    rows
}

/// (customer number, role id) pairs present before but absent now
pub fn orphaned_roles(
    previous: &[SitePartyRoleRelationship],
    current: &[SitePartyRoleRelationship],
) -> Vec<(String, String)> {
    let still_there: HashSet<(&str, &str)> = current
        .iter()
        .map(|r| (r.customer_number.as_str(), r.role_id.as_str()))
        .collect();

    previous
        .iter()
        .map(|r| (r.customer_number.as_str(), r.role_id.as_str()))
        .filter(|pair| !still_there.contains(pair))
        .map(|(cn, role)| (cn.to_string(), role.to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::IDENTIFIER_TYPE_CPH;

    const CPH: &str = "12/345/6789";

    fn rel(cn: &str, role_id: &str) -> SilverPartyRoleRelationship {
        SilverPartyRoleRelationship {
            id: SilverPartyRoleRelationship::key_id("SAM", CPH, cn, role_id),
            source: "SAM".to_string(),
            holding_identifier: CPH.to_string(),
            holding_identifier_type: IDENTIFIER_TYPE_CPH.to_string(),
            party_id: cn.to_string(),
            party_type: PartyType::Person,
            role_id: role_id.to_string(),
            role_code: role_id.to_uppercase(),
            role_name: role_id.to_string(),
            effective_from: None,
            effective_to: None,
        }
    }

    fn mark(cn: &str, role_id: &str, herdmark: &str, species: &str) -> SiteGroupMarkRelationship {
        SiteGroupMarkRelationship {
            id: SiteGroupMarkRelationship::key_id(CPH, herdmark, None, cn, role_id),
            holding_identifier: CPH.to_string(),
            holding_identifier_type: IDENTIFIER_TYPE_CPH.to_string(),
            herdmark: herdmark.to_string(),
            herd_identifier: format!("{}/01", CPH),
            party_id: cn.to_string(),
            party_type: PartyType::Person,
            role_id: role_id.to_string(),
            role_code: String::new(),
            role_name: String::new(),
            species: Some(ReferenceSummary::resolved(species, None)),
            production_usage: None,
            start_date: None,
            end_date: None,
        }
    }

    #[test]
    fn test_projection_per_species() {
        let party_ids = HashMap::from([("C1".to_string(), "p-1".to_string())]);
        let rows = project_site_party_roles(
            &[rel("C1", "r-keeper"), rel("C2", "r-owner")],
            &[
                mark("C1", "r-keeper", "HM1", "CTT"),
                mark("C1", "r-keeper", "HM2", "CTT"),
                mark("C1", "r-keeper", "HM3", "SHP"),
            ],
            &party_ids,
        );

        assert_eq!(rows.len(), 3);
        let keeper: Vec<_> = rows.iter().filter(|r| r.customer_number == "C1").collect();
        assert_eq!(keeper.len(), 2);
        assert!(keeper.iter().all(|r| r.party_id.as_deref() == Some("p-1")));

        let owner = rows.iter().find(|r| r.customer_number == "C2").unwrap();
        assert!(owner.species.is_none());
        assert!(owner.party_id.is_none());
    }

    #[test]
    fn test_orphaned_roles() {
        let party_ids = HashMap::new();
        let previous = project_site_party_roles(&[rel("C1", "r-keeper"), rel("C1", "r-owner"), rel("C2", "r-keeper")], &[], &party_ids);
        let current = project_site_party_roles(&[rel("C1", "r-keeper")], &[], &party_ids);

        assert_eq!(
            orphaned_roles(&previous, &current),
            vec![
                ("C1".to_string(), "r-owner".to_string()),
                ("C2".to_string(), "r-keeper".to_string()),
            ]
        );
        assert!(orphaned_roles(&current, &previous).is_empty());
    }
}
