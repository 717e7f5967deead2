// Silver records - normalized, reference-resolved, still source-shaped
//
// Ids are derived from natural keys, never generated, so the same raw input
// always yields the same documents. Equality covers every field: a silver
// record equal to its persisted copy does not need to be written again.

use crate::entities::{AddressFields, CommunicationFields, PartyType, ReferenceSummary};
use crate::store::Document;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable document id: SHA-256 over the record kind and its natural-key parts
pub fn natural_key_id(kind: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    for part in parts {
        hasher.update(b"|");
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// HOLDING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverHolding {
    pub id: String,
    pub cph: String,
    pub cph_type: Option<String>,
    pub name: Option<String>,
    pub premises_type: Option<ReferenceSummary>,
    pub premises_activity_type: Option<ReferenceSummary>,
    pub species_code: Option<String>,
    pub production_usage_code: Option<String>,
    pub os_map_reference: Option<String>,
    pub easting: Option<i32>,
    pub northing: Option<i32>,
    pub address: AddressFields,
    pub holding_start_date: Option<NaiveDate>,
    pub holding_end_date: Option<NaiveDate>,
    pub activity_start_date: Option<NaiveDate>,
    pub activity_end_date: Option<NaiveDate>,
    /// Herdmarks under this CPH, filled in after correlation
    pub group_marks: Vec<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub source_updated_at: Option<DateTime<Utc>>,
}

impl SilverHolding {
    /// Natural key: one row per CPH, facility activity, species and usage
    pub fn key_id(
        cph: &str,
        activity_code: Option<&str>,
        species_code: Option<&str>,
        production_usage_code: Option<&str>,
    ) -> String {
        natural_key_id(
            "silver_holding",
            &[
                cph,
                activity_code.unwrap_or(""),
                species_code.unwrap_or(""),
                production_usage_code.unwrap_or(""),
            ],
        )
    }

    pub fn activity_code(&self) -> Option<&str> {
        self.premises_activity_type.as_ref().map(|a| a.code.as_str())
    }
}

impl Document for SilverHolding {
    const COLLECTION: &'static str = "silver_holdings";

    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// HERD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverHerd {
    pub id: String,
    /// CPHH as reported ("12/345/6789/01")
    pub herd_identifier: String,
    /// Owning premises, trimmed from the CPHH
    pub cph: String,
    pub herdmark: String,
    pub species: Option<ReferenceSummary>,
    pub production_usage: Option<ReferenceSummary>,
    pub disease_type: Option<String>,
    pub interval: Option<i32>,
    pub interval_unit: Option<String>,
    pub movement_restriction_region: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub owner_party_ids: Vec<String>,
    pub keeper_party_ids: Vec<String>,
    pub is_deleted: bool,
    pub source_updated_at: Option<DateTime<Utc>>,
}

impl SilverHerd {
    pub fn key_id(herd_identifier: &str, herdmark: &str, production_usage_code: Option<&str>) -> String {
        natural_key_id(
            "silver_herd",
            &[herd_identifier, herdmark, production_usage_code.unwrap_or("")],
        )
    }

    /// Owners then keepers, each id once
    pub fn party_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for id in self.owner_party_ids.iter().chain(&self.keeper_party_ids) {
            if !ids.contains(&id.as_str()) {
                ids.push(id);
            }
        }
        ids
    }
}

impl Document for SilverHerd {
    const COLLECTION: &'static str = "silver_herds";

    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// PARTY
// ============================================================================

/// A resolved role; unresolved role names never get this far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverPartyRole {
    pub role_id: String,
    pub role_code: String,
    pub role_name: String,
    pub source_role_name: String,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

impl SilverPartyRole {
    pub fn summary(&self) -> ReferenceSummary {
        ReferenceSummary {
            id: Some(self.role_id.clone()),
            code: self.role_code.clone(),
            name: Some(self.role_name.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverParty {
    pub id: String,
    /// Source party id, which is also the customer number
    pub party_id: String,
    /// Boundary this record was normalized for
    pub cph: String,
    pub party_type: PartyType,
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub second_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation_name: Option<String>,
    pub name: Option<String>,
    pub address: AddressFields,
    pub communication: CommunicationFields,
    pub roles: Vec<SilverPartyRole>,
    /// CPHs this party holds, when it appears in the holder extract
    pub holder_cphs: Vec<String>,
    pub is_holder: bool,
    pub is_deleted: bool,
}

impl SilverParty {
    pub fn key_id(party_id: &str, cph: &str) -> String {
        natural_key_id("silver_party", &[party_id, cph])
    }

    pub fn customer_number(&self) -> &str {
        &self.party_id
    }
}

impl Document for SilverParty {
    const COLLECTION: &'static str = "silver_parties";

    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// PARTY-ROLE RELATIONSHIP
// ============================================================================

/// (source, holding, party, role) bridge used by correlation and orphan detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverPartyRoleRelationship {
    pub id: String,
    pub source: String,
    pub holding_identifier: String,
    pub holding_identifier_type: String,
    pub party_id: String,
    pub party_type: PartyType,
    pub role_id: String,
    pub role_code: String,
    pub role_name: String,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

impl SilverPartyRoleRelationship {
    pub fn key_id(source: &str, holding_identifier: &str, party_id: &str, role_id: &str) -> String {
        natural_key_id(
            "silver_party_role",
            &[source, holding_identifier, party_id, role_id],
        )
    }
}

impl Document for SilverPartyRoleRelationship {
    const COLLECTION: &'static str = "silver_party_roles";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_id_is_stable() {
        let a = natural_key_id("silver_party", &["C100", "12/345/6789"]);
        let b = natural_key_id("silver_party", &["C100", "12/345/6789"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        assert_ne!(a, natural_key_id("silver_party", &["C100", "12/345/0000"]));
        assert_ne!(a, natural_key_id("silver_herd", &["C100", "12/345/6789"]));
        // part boundaries matter
        assert_ne!(
            natural_key_id("k", &["ab", "c"]),
            natural_key_id("k", &["a", "bc"])
        );
    }
}
