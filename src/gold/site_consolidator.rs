// 🏡 Site consolidation - silver holdings sharing one CPH → one Site
//
// Top-level fields come from the representative holding. Species and
// activities are the union over every live holding under the key, each
// distinct code resolved once. The representative's activity window is
// applied to every activity (see DESIGN.md, open question 2).

use super::Consolidated;
use crate::correlation::SiteGroupMarkRelationship;
use crate::deduplication::{distinct_activity_codes, distinct_species_codes, select_representative};
use crate::entities::site::{SITE_STATE_ACTIVE, SITE_STATE_INACTIVE};
use crate::entities::{
    GroupMark, LocationFields, Party, PartyRoleSite, ReferenceSummary, Site, SiteActivity, SiteDetails,
    SiteIdentifier, SiteParty, SiteSpecies,
};
use crate::lookup::{resolve, ReferenceDataLookup, ReferenceKind};
use crate::silver::SilverHolding;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;

/// Everything already computed upstream for one CPH
pub struct SiteSources<'a> {
    pub holdings: &'a [SilverHolding],
    pub group_marks: &'a [SiteGroupMarkRelationship],
    /// Gold parties consolidated for this CPH
    pub parties: &'a [Party],
    pub source: &'a str,
}

fn state_of(holding: &SilverHolding) -> &'static str {
    if holding.is_active {
        SITE_STATE_ACTIVE
    } else {
        SITE_STATE_INACTIVE
    }
}

/// Site summary for party roles, available before the Site itself is consolidated
pub fn site_summary(site_id: &str, holdings: &[SilverHolding]) -> Option<PartyRoleSite> {
    let representative = select_representative(holdings)?;
    Some(PartyRoleSite {
        id: site_id.to_string(),
        name: representative.name.clone(),
        state: Some(state_of(representative).to_string()),
        identifier: Some(representative.cph.clone()),
    })
}

fn details_from(representative: &SilverHolding, source: &str) -> SiteDetails {
    SiteDetails {
        name: representative.name.clone(),
        premises_type: representative.premises_type.clone(),
        state: Some(state_of(representative).to_string()),
        start_date: representative.holding_start_date,
        end_date: representative.holding_end_date,
        source: Some(source.to_string()),
    }
}

fn location_from(representative: &SilverHolding) -> Option<LocationFields> {
    let address = Some(representative.address.clone()).filter(|a| !a.is_empty());
    if representative.os_map_reference.is_none()
        && representative.easting.is_none()
        && representative.northing.is_none()
        && address.is_none()
    {
        return None;
    }

    Some(LocationFields {
        os_map_reference: representative.os_map_reference.clone(),
        easting: representative.easting,
        northing: representative.northing,
        address,
    })
}

/// Resolve each code once, concurrently
async fn resolve_codes<L: ReferenceDataLookup + ?Sized>(
    lookup: &L,
    kind: ReferenceKind,
    codes: &[String],
) -> Vec<ReferenceSummary> {
    let items = join_all(codes.iter().map(|code| resolve(lookup, kind, Some(code)))).await;
    codes
        .iter()
        .zip(items)
        .map(|(code, item)| ReferenceSummary::resolved(code, item.as_ref()))
        .collect()
}

/// One group mark per (herdmark, production usage); the correlation rows
/// repeat a herd once per party role
fn group_marks_from(at: DateTime<Utc>, rows: &[SiteGroupMarkRelationship]) -> Vec<GroupMark> {
    let mut marks: BTreeMap<(String, String), GroupMark> = BTreeMap::new();
    for row in rows {
        let usage = row.production_usage.as_ref().map_or("", |p| p.code.as_str());
        marks
            .entry((row.herdmark.clone(), usage.to_string()))
            .or_insert_with(|| {
                let mut mark = GroupMark::new(at, &row.herdmark);
                mark.herd_identifier = Some(row.herd_identifier.clone());
                mark.species = row.species.clone();
                mark.production_usage = row.production_usage.clone();
                mark.start_date = row.start_date;
                mark.end_date = row.end_date;
                mark
            });
    }
    marks.into_values().collect()
}

/// Live gold parties with a customer number, with the role names they hold here
fn site_parties(at: DateTime<Utc>, site_id: &str, parties: &[Party]) -> Vec<SiteParty> {
    let mut summaries: Vec<SiteParty> = parties
        .iter()
        .filter(|p| !p.deleted && !p.customer_number.trim().is_empty())
        .map(|party| {
            let mut roles: Vec<String> = party
                .roles_at_site(site_id)
                .map(|r| r.role.name.clone().unwrap_or_else(|| r.role.code.clone()))
                .collect();
            roles.sort();
            roles.dedup();

            SiteParty {
                id: crate::entities::new_id(),
                party_id: party.id.clone(),
                customer_number: party.customer_number.clone(),
                name: party.details.name.clone(),
                party_type: Some(party.details.party_type.as_str().to_string()),
                roles,
                last_updated_date: at,
            }
        })
        .collect();
    summaries.sort_by(|a, b| a.customer_number.cmp(&b.customer_number));
    summaries.dedup_by(|a, b| a.customer_number == b.customer_number);
    summaries
}

/// Create or update the Site for one CPH. `None` when there are no holdings.
pub async fn consolidate_site<L: ReferenceDataLookup + ?Sized>(
    lookup: &L,
    sources: &SiteSources<'_>,
    existing: Option<Site>,
    site_id: &str,
    at: DateTime<Utc>,
) -> Option<Consolidated<Site>> {
    let representative = select_representative(sources.holdings)?;

    let species_codes = distinct_species_codes(sources.holdings);
    let activity_codes = distinct_activity_codes(sources.holdings);
    let (species, activities) = futures::join!(
        resolve_codes(lookup, ReferenceKind::Species, &species_codes),
        resolve_codes(lookup, ReferenceKind::PremisesActivityType, &activity_codes),
    );

    let species: Vec<SiteSpecies> = species.into_iter().map(|s| SiteSpecies::new(at, s)).collect();
    let activities: Vec<SiteActivity> = activities
        .into_iter()
        .map(|a| {
            SiteActivity::new(
                at,
                a,
                representative.activity_start_date,
                representative.activity_end_date,
            )
        })
        .collect();

    let details = details_from(representative, sources.source);
    let identifiers = vec![SiteIdentifier::cph(at, &representative.cph)];
    let all_deleted = sources.holdings.iter().all(|h| h.is_deleted);

    let created = existing.is_none();
    let mut site = match existing {
        Some(site) => site,
        None => Site::create(site_id, at, details.clone(), identifiers.clone()),
    };

    let mut changed = created;
    changed |= site.update(at, details);
    changed |= site.set_identifiers(at, identifiers);
    changed |= site.set_location(at, location_from(representative));
    changed |= site.set_species(at, species);
    changed |= site.set_activities(at, activities);
    changed |= site.set_group_marks(at, group_marks_from(at, sources.group_marks));
    let parties = site_parties(at, &site.id, sources.parties);
    changed |= site.set_parties(at, parties);
    changed |= site.set_deleted(at, all_deleted);

    tracing::debug!(
        site_id = %site.id,
        cph = %representative.cph,
        created,
        changed,
        species = site.species.len(),
        activities = site.activities.len(),
        "Consolidated site"
    );

    Some(Consolidated {
        entity: site,
        created,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AddressFields, PartyDetails, PartyRole, PartyType};
    use crate::lookup::test_reference_data;
    use chrono::{NaiveDate, TimeZone};

    const CPH: &str = "12/345/6789";

    fn t(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    fn holding(name: &str, species: &str, activity: &str, active: bool, updated: i32) -> SilverHolding {
        SilverHolding {
            id: SilverHolding::key_id(CPH, Some(activity), Some(species), None),
            cph: CPH.to_string(),
            cph_type: None,
            name: Some(name.to_string()),
            premises_type: Some(ReferenceSummary::resolved("AH", None)),
            premises_activity_type: Some(ReferenceSummary::resolved(activity, None)),
            species_code: Some(species.to_string()),
            production_usage_code: None,
            os_map_reference: Some("SK123456".to_string()),
            easting: Some(412300),
            northing: Some(345600),
            address: AddressFields {
                address_line1: Some("1 Lane".to_string()),
                postcode: Some("AB1 2CD".to_string()),
                ..AddressFields::default()
            },
            holding_start_date: NaiveDate::from_ymd_opt(updated, 1, 1),
            holding_end_date: None,
            activity_start_date: NaiveDate::from_ymd_opt(updated, 2, 1),
            activity_end_date: None,
            group_marks: Vec::new(),
            is_active: active,
            is_deleted: false,
            source_updated_at: Some(t(updated)),
        }
    }

    fn sources<'a>(holdings: &'a [SilverHolding], parties: &'a [Party]) -> SiteSources<'a> {
        SiteSources {
            holdings,
            group_marks: &[],
            parties,
            source: "SAM",
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_none() {
        let lookup = test_reference_data();
        let result = consolidate_site(&lookup, &sources(&[], &[]), None, "site-1", t(2024)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_species_are_deduplicated_and_resolved_once() {
        let lookup = test_reference_data();
        let holdings = vec![
            holding("Rose Farm", "CTT", "ABP", true, 2020),
            holding("Rose Farm", "CTT", "MKT", true, 2020),
            holding("Rose Farm", "SHP", "ABP", true, 2020),
        ];

        let result = consolidate_site(&lookup, &sources(&holdings, &[]), None, "site-1", t(2024))
            .await
            .unwrap();
        let site = result.entity;

        let codes: Vec<&str> = site.species.iter().map(|s| s.code()).collect();
        assert_eq!(codes, vec!["CTT", "SHP"]);
        assert_eq!(site.species[0].species.id.as_deref(), Some("s-ctt"));
        assert_eq!(lookup.calls(ReferenceKind::Species), 2);

        assert_eq!(site.activities.len(), 2);
        assert_eq!(lookup.calls(ReferenceKind::PremisesActivityType), 2);
        assert!(result.created);
        assert_eq!(site.holding_identifier(), Some(CPH));
    }

    #[tokio::test]
    async fn test_representative_window_applies_to_every_activity() {
        let lookup = test_reference_data();
        let holdings = vec![
            holding("Old Name", "CTT", "MKT", false, 2023),
            holding("Rose Farm", "CTT", "ABP", true, 2020),
        ];

        let site = consolidate_site(&lookup, &sources(&holdings, &[]), None, "site-1", t(2024))
            .await
            .unwrap()
            .entity;

        assert_eq!(site.details.name.as_deref(), Some("Rose Farm"));
        assert_eq!(site.details.state.as_deref(), Some(SITE_STATE_ACTIVE));
        assert!(site
            .activities
            .iter()
            .all(|a| a.start_date == NaiveDate::from_ymd_opt(2020, 2, 1)));
    }

    #[tokio::test]
    async fn test_second_pass_changes_nothing() {
        let lookup = test_reference_data();
        let holdings = vec![holding("Rose Farm", "CTT", "ABP", true, 2020)];

        let first = consolidate_site(&lookup, &sources(&holdings, &[]), None, "site-1", t(2024))
            .await
            .unwrap()
            .entity;
        let second = consolidate_site(&lookup, &sources(&holdings, &[]), Some(first.clone()), "ignored", t(2025))
            .await
            .unwrap();

        assert!(!second.changed);
        assert!(!second.needs_write());
        assert_eq!(second.entity, first);
        assert_eq!(second.entity.last_updated_date, t(2024));
    }

    #[tokio::test]
    async fn test_site_parties_skip_deleted_and_blank_customer_numbers() {
        let lookup = test_reference_data();
        let holdings = vec![holding("Rose Farm", "CTT", "ABP", true, 2020)];
        let summary = site_summary("site-1", &holdings).unwrap();

        let details = PartyDetails {
            title: None,
            first_name: None,
            last_name: None,
            name: Some("Jo Bloggs".to_string()),
            party_type: PartyType::Person,
            state: None,
        };
        let mut keeper = Party::create("p-1", "C100", t(2024), details.clone());
        keeper.roles.push(PartyRole::new(
            t(2024),
            ReferenceSummary {
                id: Some("r-keeper".to_string()),
                code: "LIVESTOCKKEEPER".to_string(),
                name: Some("Keeper".to_string()),
            },
            Some(summary),
        ));
        let mut gone = Party::create("p-2", "C200", t(2024), details.clone());
        gone.deleted = true;
        let blank = Party::create("p-3", " ", t(2024), details);

        let parties = vec![keeper, gone, blank];
        let site = consolidate_site(&lookup, &sources(&holdings, &parties), None, "site-1", t(2024))
            .await
            .unwrap()
            .entity;

        assert_eq!(site.parties.len(), 1);
        assert_eq!(site.parties[0].customer_number, "C100");
        assert_eq!(site.parties[0].roles, vec!["Keeper"]);
    }
}
