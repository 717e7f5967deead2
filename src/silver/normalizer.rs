// 🧪 Silver normalizer - raw SAM rows → silver records
//
// Rows are normalized concurrently; within a row the reference lookups are
// issued together and all complete before the record is built. Lookup misses
// keep the raw code with a null id. Rows without their key field are skipped.

use super::models::{SilverHerd, SilverHolding, SilverParty, SilverPartyRole};
use super::party_aggregator::MergedParty;
use crate::entities::{AddressFields, CommunicationFields, PartyType, ReferenceSummary};
use crate::formatting::{
    build_address_line, code_prefix, code_suffix, cphh_to_cph, non_blank, party_display_name, split_list,
    AddressSegments,
};
use crate::lookup::{resolve, tolerant, ReferenceDataLookup, ReferenceItem, ReferenceKind};
use crate::parser::{RawHerd, RawHolding};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use tracing::debug;

/// Records produced plus the number of rows dropped for lack of a key
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Normalized<T> {
    fn from_rows(rows: Vec<Option<T>>) -> Self {
        let total = rows.len();
        let records: Vec<T> = rows.into_iter().flatten().collect();
        Normalized {
            skipped: total - records.len(),
            records,
        }
    }
}

/// One record per id; the most recently updated row wins, first-seen order kept
fn latest_per_id<T>(
    records: Vec<T>,
    id: impl Fn(&T) -> &str,
    updated: impl Fn(&T) -> Option<DateTime<Utc>>,
) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<T> = Vec::new();

    for record in records {
        match index.get(id(&record)) {
            Some(&i) => {
                if updated(&record) > updated(&out[i]) {
                    out[i] = record;
                }
            }
            None => {
                index.insert(id(&record).to_string(), out.len());
                out.push(record);
            }
        }
    }
    out
}

fn summary(code: Option<String>, item: Option<ReferenceItem>) -> Option<ReferenceSummary> {
    code.map(|c| ReferenceSummary::resolved(&c, item.as_ref()))
}

async fn resolve_country<L: ReferenceDataLookup + ?Sized>(
    lookup: &L,
    code: Option<&str>,
    region_hint: Option<&str>,
) -> Option<ReferenceItem> {
    let code = non_blank(code)?;
    let hint = non_blank(region_hint);
    tolerant(
        ReferenceKind::Country,
        &code,
        lookup.find_country(&code, hint.as_deref()).await,
    )
}

/// Address fields shared by holdings and parties
struct RawAddress<'a> {
    segments: AddressSegments<'a>,
    street: Option<&'a str>,
    locality: Option<&'a str>,
    town: Option<&'a str>,
    postcode: Option<&'a str>,
    country_code: Option<&'a str>,
    udprn: Option<&'a str>,
}

fn address_fields(raw: &RawAddress<'_>, country: Option<ReferenceItem>) -> AddressFields {
    let (country_id, country_code, country_name) = match country {
        Some(item) => (Some(item.id), Some(item.code), Some(item.name)),
        None => (None, non_blank(raw.country_code), None),
    };

    AddressFields {
        uprn: non_blank(raw.udprn),
        address_line1: build_address_line(&raw.segments),
        address_line2: non_blank(raw.street),
        locality: non_blank(raw.locality),
        post_town: non_blank(raw.town),
        postcode: non_blank(raw.postcode),
        country_id,
        country_code,
        country_name,
    }
}

// ============================================================================
// HOLDINGS
// ============================================================================

async fn normalize_holding<L: ReferenceDataLookup + ?Sized>(lookup: &L, row: &RawHolding) -> Option<SilverHolding> {
    let cph = non_blank(row.cph.as_deref())?;

    let facility = row.facility_business_activity_code.as_deref();
    let activity_code = code_suffix(facility);
    let premises_type_code = code_prefix(facility);

    let (premises_type, activity, country) = futures::join!(
        resolve(lookup, ReferenceKind::PremisesType, premises_type_code.as_deref()),
        resolve(lookup, ReferenceKind::PremisesActivityType, activity_code.as_deref()),
        resolve_country(lookup, row.country_code.as_deref(), row.uk_internal_code.as_deref()),
    );

    let raw_address = RawAddress {
        segments: AddressSegments {
            saon_start_number: row.saon_start_number,
            saon_start_suffix: row.saon_start_number_suffix.as_deref(),
            saon_end_number: row.saon_end_number,
            saon_end_suffix: row.saon_end_number_suffix.as_deref(),
            saon_description: row.saon_description.as_deref(),
            paon_start_number: row.paon_start_number,
            paon_start_suffix: row.paon_start_number_suffix.as_deref(),
            paon_end_number: row.paon_end_number,
            paon_end_suffix: row.paon_end_number_suffix.as_deref(),
            paon_description: row.paon_description.as_deref(),
        },
        street: row.street.as_deref(),
        locality: row.locality.as_deref(),
        town: row.town.as_deref(),
        postcode: row.postcode.as_deref(),
        country_code: row.country_code.as_deref(),
        udprn: row.udprn.as_deref(),
    };

    let species_code = non_blank(row.animal_species_code.as_deref()).map(|c| c.to_uppercase());
    let production_usage_code = code_suffix(row.animal_production_usage_code.as_deref());
    let deleted = row.is_deleted();

    Some(SilverHolding {
        id: SilverHolding::key_id(
            &cph,
            activity_code.as_deref(),
            species_code.as_deref(),
            production_usage_code.as_deref(),
        ),
        cph,
        cph_type: non_blank(row.cph_type.as_deref()),
        name: non_blank(row.feature_name.as_deref()),
        premises_type: summary(premises_type_code, premises_type),
        premises_activity_type: summary(activity_code, activity),
        species_code,
        production_usage_code,
        os_map_reference: non_blank(row.os_map_reference.as_deref()),
        easting: row.easting,
        northing: row.northing,
        address: address_fields(&raw_address, country),
        holding_start_date: row.holding_start_date,
        holding_end_date: row.holding_end_date,
        activity_start_date: row.activity_start_date,
        activity_end_date: row.activity_end_date,
        group_marks: Vec::new(),
        is_active: row.holding_end_date.is_none() && !deleted,
        is_deleted: deleted,
        source_updated_at: row.updated_at,
    })
}

pub async fn normalize_holdings<L: ReferenceDataLookup + ?Sized>(
    lookup: &L,
    rows: &[RawHolding],
) -> Normalized<SilverHolding> {
    let results = join_all(rows.iter().map(|row| normalize_holding(lookup, row))).await;
    let mut normalized = Normalized::from_rows(results);
    normalized.records = latest_per_id(normalized.records, |h| h.id.as_str(), |h| h.source_updated_at);

    debug!(
        holdings = normalized.records.len(),
        skipped = normalized.skipped,
        "Normalized holdings"
    );
    normalized
}

// ============================================================================
// HERDS
// ============================================================================

async fn normalize_herd<L: ReferenceDataLookup + ?Sized>(lookup: &L, row: &RawHerd) -> Option<SilverHerd> {
    let herd_identifier = non_blank(row.cphh.as_deref())?;
    let herdmark = non_blank(row.herdmark.as_deref())?;

    let species_code = non_blank(row.animal_species_code.as_deref());
    let production_usage_code = code_suffix(row.animal_purpose_code.as_deref());

    let (species, production_usage) = futures::join!(
        resolve(lookup, ReferenceKind::Species, species_code.as_deref()),
        resolve(lookup, ReferenceKind::ProductionUsage, production_usage_code.as_deref()),
    );

    Some(SilverHerd {
        id: SilverHerd::key_id(&herd_identifier, &herdmark, production_usage_code.as_deref()),
        cph: cphh_to_cph(Some(&herd_identifier)),
        herd_identifier,
        herdmark,
        species: summary(species_code, species),
        production_usage: summary(production_usage_code, production_usage),
        disease_type: non_blank(row.disease_type.as_deref()),
        interval: row.interval,
        interval_unit: non_blank(row.interval_unit.as_deref()),
        movement_restriction_region: non_blank(row.movement_restriction_region.as_deref()),
        start_date: row.start_date,
        end_date: row.end_date,
        owner_party_ids: split_list(row.owner_party_ids.as_deref()),
        keeper_party_ids: split_list(row.keeper_party_ids.as_deref()),
        is_deleted: row.is_deleted(),
        source_updated_at: row.updated_at,
    })
}

pub async fn normalize_herds<L: ReferenceDataLookup + ?Sized>(lookup: &L, rows: &[RawHerd]) -> Normalized<SilverHerd> {
    let results = join_all(rows.iter().map(|row| normalize_herd(lookup, row))).await;
    let mut normalized = Normalized::from_rows(results);
    normalized.records = latest_per_id(normalized.records, |h| h.id.as_str(), |h| h.source_updated_at);

    debug!(herds = normalized.records.len(), skipped = normalized.skipped, "Normalized herds");
    normalized
}

// ============================================================================
// PARTIES
// ============================================================================

async fn normalize_party<L: ReferenceDataLookup + ?Sized>(lookup: &L, party: &MergedParty, cph: &str) -> SilverParty {
    let role_lookups = join_all(
        party
            .roles
            .iter()
            .map(|role| resolve(lookup, ReferenceKind::Role, Some(role.name.as_str()))),
    );
    let country_lookup = resolve_country(lookup, party.country_code.as_deref(), party.uk_internal_code.as_deref());
    let (resolved_roles, country) = futures::join!(role_lookups, country_lookup);

    let mut roles: Vec<SilverPartyRole> = Vec::new();
    for (source, item) in party.roles.iter().zip(resolved_roles) {
        match item {
            Some(item) => {
                if roles.iter().any(|r| r.role_id == item.id) {
                    continue;
                }
                roles.push(SilverPartyRole {
                    role_id: item.id,
                    role_code: item.code,
                    role_name: item.name,
                    source_role_name: source.name.clone(),
                    effective_from: source.from,
                    effective_to: source.to,
                });
            }
            None => debug!(party_id = %party.party_id, role = %source.name, "Dropping unresolved role"),
        }
    }

    let raw_address = RawAddress {
        segments: AddressSegments {
            saon_start_number: party.saon_start_number,
            saon_start_suffix: party.saon_start_number_suffix.as_deref(),
            saon_end_number: party.saon_end_number,
            saon_end_suffix: party.saon_end_number_suffix.as_deref(),
            saon_description: party.saon_description.as_deref(),
            paon_start_number: party.paon_start_number,
            paon_start_suffix: party.paon_start_number_suffix.as_deref(),
            paon_end_number: party.paon_end_number,
            paon_end_suffix: party.paon_end_number_suffix.as_deref(),
            paon_description: party.paon_description.as_deref(),
        },
        street: party.street.as_deref(),
        locality: party.locality.as_deref(),
        town: party.town.as_deref(),
        postcode: party.postcode.as_deref(),
        country_code: party.country_code.as_deref(),
        udprn: party.udprn.as_deref(),
    };

    let mut communication = CommunicationFields {
        email: non_blank(party.email_address.as_deref()),
        mobile: non_blank(party.mobile_number.as_deref()),
        landline: non_blank(party.telephone_number.as_deref()),
        primary_contact_flag: false,
    };
    communication.primary_contact_flag = !communication.has_no_channel();

    let party_type = if non_blank(party.organisation_name.as_deref()).is_some() {
        PartyType::Organisation
    } else {
        PartyType::Person
    };

    SilverParty {
        id: SilverParty::key_id(&party.party_id, cph),
        party_id: party.party_id.clone(),
        cph: cph.to_string(),
        party_type,
        title: non_blank(party.title.as_deref()),
        first_name: non_blank(party.given_name.as_deref()),
        second_name: non_blank(party.given_name2.as_deref()),
        last_name: non_blank(party.family_name.as_deref()),
        organisation_name: non_blank(party.organisation_name.as_deref()),
        name: party_display_name(
            party.title.as_deref(),
            party.given_name.as_deref(),
            party.given_name2.as_deref(),
            party.family_name.as_deref(),
            party.organisation_name.as_deref(),
        ),
        address: address_fields(&raw_address, country),
        communication,
        roles,
        holder_cphs: party.holder_cphs.clone(),
        is_holder: party.is_holder,
        is_deleted: party.is_deleted,
    }
}

/// Merged parties → silver parties for one boundary CPH
pub async fn normalize_parties<L: ReferenceDataLookup + ?Sized>(
    lookup: &L,
    parties: &[MergedParty],
    cph: &str,
) -> Vec<SilverParty> {
    let records = join_all(parties.iter().map(|p| normalize_party(lookup, p, cph))).await;
    debug!(parties = records.len(), cph, "Normalized parties");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::test_reference_data;
    use crate::silver::party_aggregator::aggregate_parties;
    use crate::parser::RawParty;
    use chrono::{NaiveDate, TimeZone};

    fn holding(cph: Option<&str>, facility: &str, species: &str) -> RawHolding {
        RawHolding {
            cph: cph.map(str::to_string),
            feature_name: Some("Rose Farm".to_string()),
            facility_business_activity_code: Some(facility.to_string()),
            animal_species_code: Some(species.to_string()),
            paon_start_number: Some(12),
            paon_start_number_suffix: Some("A".to_string()),
            paon_description: Some("Rose Farm".to_string()),
            street: Some("Mill Lane".to_string()),
            town: Some("Exeter".to_string()),
            postcode: Some("EX1 1AA".to_string()),
            country_code: Some("GB".to_string()),
            uk_internal_code: Some("ENGLAND".to_string()),
            ..RawHolding::default()
        }
    }

    #[tokio::test]
    async fn test_holding_resolution_and_address() {
        let lookup = test_reference_data();
        let result = normalize_holdings(&lookup, &[holding(Some("12/345/6789"), "AH-ABP", "CTT")]).await;

        assert_eq!(result.skipped, 0);
        let h = &result.records[0];
        assert_eq!(h.cph, "12/345/6789");
        assert_eq!(h.premises_type.as_ref().and_then(|p| p.id.as_deref()), Some("pt-ah"));
        let activity = h.premises_activity_type.as_ref().unwrap();
        assert_eq!(activity.id.as_deref(), Some("pa-abp"));
        assert_eq!(activity.code, "ABP");
        assert_eq!(h.address.address_line1.as_deref(), Some("12A, Rose Farm"));
        assert_eq!(h.address.address_line2.as_deref(), Some("Mill Lane"));
        // region hint wins over the bare country code
        assert_eq!(h.address.country_id.as_deref(), Some("c-eng"));
        assert!(h.is_active);
    }

    #[tokio::test]
    async fn test_unresolved_code_keeps_raw_value() {
        let lookup = test_reference_data();
        let result = normalize_holdings(&lookup, &[holding(Some("12/345/6789"), "AH-ZZZ", "CTT")]).await;

        let activity = result.records[0].premises_activity_type.as_ref().unwrap();
        assert_eq!(activity.code, "ZZZ");
        assert!(activity.id.is_none());
    }

    #[tokio::test]
    async fn test_rows_without_key_are_skipped() {
        let lookup = test_reference_data();
        let result = normalize_holdings(
            &lookup,
            &[holding(None, "AH-ABP", "CTT"), holding(Some("  "), "AH-ABP", "CTT"), holding(Some("12/345/6789"), "AH-ABP", "CTT")],
        )
        .await;
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.skipped, 2);
    }

    #[tokio::test]
    async fn test_duplicate_rows_keep_latest() {
        let lookup = test_reference_data();
        let mut older = holding(Some("12/345/6789"), "AH-ABP", "CTT");
        older.updated_at = Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        let mut newer = older.clone();
        newer.feature_name = Some("Rose Farm East".to_string());
        newer.updated_at = Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());

        let result = normalize_holdings(&lookup, &[newer, older]).await;
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].name.as_deref(), Some("Rose Farm East"));
    }

    #[tokio::test]
    async fn test_herd_trims_codes_and_keeps_party_lists() {
        let lookup = test_reference_data();
        let row = RawHerd {
            herdmark: Some("HM1".to_string()),
            cphh: Some("12/345/6789/01".to_string()),
            animal_species_code: Some("CTT".to_string()),
            animal_purpose_code: Some("CTT-BEEF".to_string()),
            start_date: NaiveDate::from_ymd_opt(2019, 5, 1),
            owner_party_ids: Some("C1, C2".to_string()),
            keeper_party_ids: Some("C2".to_string()),
            ..RawHerd::default()
        };

        let result = normalize_herds(&lookup, &[row]).await;
        let herd = &result.records[0];
        assert_eq!(herd.cph, "12/345/6789");
        assert_eq!(herd.herd_identifier, "12/345/6789/01");
        assert_eq!(herd.production_usage.as_ref().and_then(|p| p.id.as_deref()), Some("pu-beef"));
        assert_eq!(herd.species.as_ref().and_then(|s| s.id.as_deref()), Some("s-ctt"));
        assert_eq!(herd.owner_party_ids, vec!["C1", "C2"]);
        assert_eq!(herd.keeper_party_ids, vec!["C2"]);
        assert_eq!(herd.party_ids(), vec!["C1", "C2"]);
    }

    #[tokio::test]
    async fn test_unresolved_roles_are_dropped() {
        let lookup = test_reference_data();
        let merged = aggregate_parties(
            &[RawParty {
                party_id: Some("C1".to_string()),
                given_name: Some("John".to_string()),
                family_name: Some("Smith".to_string()),
                email_address: Some("john@example.com".to_string()),
                roles: Some("LIVESTOCKKEEPER,UNKNOWNROLE".to_string()),
                ..RawParty::default()
            }],
            &[],
        );

        let parties = normalize_parties(&lookup, &merged, "12/345/6789").await;
        let party = &parties[0];
        assert_eq!(party.roles.len(), 1);
        assert_eq!(party.roles[0].role_id, "r-keeper");
        assert_eq!(party.party_type, PartyType::Person);
        assert_eq!(party.name.as_deref(), Some("John Smith"));
        assert!(party.communication.primary_contact_flag);
        assert_eq!(party.id, SilverParty::key_id("C1", "12/345/6789"));
    }
}
