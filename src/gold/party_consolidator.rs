// 👤 Party consolidation - silver parties sharing a customer number → one gold Party
//
// Create vs update is decided by customer number alone. Updates merge roles:
// matched roles keep their labels and refresh species/effective dates,
// unmatched incoming roles are appended, and roles missing from the batch
// stay where they are.

use super::Consolidated;
use crate::correlation::SiteGroupMarkRelationship;
use crate::entities::{
    new_id, ManagedSpecies, Party, PartyDetails, PartyRole, PartyRoleSite, ReferenceSummary,
};
use crate::lookup::{resolve, ReferenceDataLookup, ReferenceKind};
use crate::silver::{SilverParty, SilverPartyRole};
use crate::store::PartyDirectory;
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};

pub const PARTY_STATE_ACTIVE: &str = "Active";
pub const PARTY_STATE_INACTIVE: &str = "Inactive";

/// Per-site context shared by every party consolidated for one CPH
pub struct PartySources<'a> {
    /// Site the incoming roles are held at
    pub site: &'a PartyRoleSite,
    pub group_marks: &'a [SiteGroupMarkRelationship],
}

fn details_from(silver: &SilverParty) -> PartyDetails {
    PartyDetails {
        title: silver.title.clone(),
        first_name: silver.first_name.clone(),
        last_name: silver.last_name.clone(),
        name: silver.name.clone(),
        party_type: silver.party_type,
        state: Some(
            if silver.is_deleted {
                PARTY_STATE_INACTIVE
            } else {
                PARTY_STATE_ACTIVE
            }
            .to_string(),
        ),
    }
}

/// Species codes from the group marks this party manages, resolved once each
async fn resolve_managed_species<L: ReferenceDataLookup + ?Sized>(
    lookup: &L,
    rows: &[&SiteGroupMarkRelationship],
) -> HashMap<String, ReferenceSummary> {
    let codes: Vec<String> = rows
        .iter()
        .filter_map(|r| r.species_code())
        .map(str::to_uppercase)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let items = join_all(codes.iter().map(|code| resolve(lookup, ReferenceKind::Species, Some(code)))).await;
    codes
        .into_iter()
        .zip(items)
        .map(|(code, item)| {
            let summary = ReferenceSummary::resolved(&code, item.as_ref());
            (code, summary)
        })
        .collect()
}

fn build_role(
    at: DateTime<Utc>,
    role: &SilverPartyRole,
    customer_number: &str,
    sources: &PartySources<'_>,
    species: &HashMap<String, ReferenceSummary>,
) -> PartyRole {
    let mut managed: Vec<ManagedSpecies> = Vec::new();
    let rows = sources
        .group_marks
        .iter()
        .filter(|gm| gm.party_id == customer_number && gm.role_id == role.role_id);

    for row in rows {
        let Some(code) = row.species_code().map(str::to_uppercase) else {
            continue;
        };
        if managed.iter().any(|m| m.species.code.eq_ignore_ascii_case(&code)) {
            continue;
        }
        let summary = species
            .get(&code)
            .cloned()
            .unwrap_or_else(|| ReferenceSummary::resolved(&code, None));
        managed.push(ManagedSpecies::new(at, summary, row.start_date, row.end_date));
    }

    let mut party_role = PartyRole::new(at, role.summary(), Some(sources.site.clone()));
    party_role.species_managed = managed;
    party_role.effective_from = role.effective_from;
    party_role.effective_to = role.effective_to;
    party_role
}

/// Create or update the gold Party for one customer number.
///
/// `existing_party_ids` collects the internal ids of parties still referenced
/// by this site; the party's id is appended when missing. The pipeline
/// reports the collected ids as `UnitReport::party_ids`.
pub async fn consolidate_party<L, P>(
    lookup: &L,
    directory: &P,
    silver: &[SilverParty],
    sources: &PartySources<'_>,
    existing_party_ids: &mut Vec<String>,
    at: DateTime<Utc>,
) -> Result<Option<Consolidated<Party>>>
where
    L: ReferenceDataLookup + ?Sized,
    P: PartyDirectory + ?Sized,
{
    // Field values come from the first live record; roles from all of them
    let Some(primary) = silver.iter().find(|p| !p.is_deleted).or_else(|| silver.first()) else {
        return Ok(None);
    };
    let customer_number = primary.customer_number();
    let all_deleted = silver.iter().all(|p| p.is_deleted);

    let mut roles: Vec<&SilverPartyRole> = Vec::new();
    for role in silver.iter().filter(|p| !p.is_deleted).flat_map(|p| &p.roles) {
        if !roles.iter().any(|r| r.role_id == role.role_id) {
            roles.push(role);
        }
    }

    let managed_rows: Vec<&SiteGroupMarkRelationship> = sources
        .group_marks
        .iter()
        .filter(|gm| gm.party_id == customer_number)
        .collect();
    let species = resolve_managed_species(lookup, &managed_rows).await;
    let incoming_roles: Vec<PartyRole> = roles
        .into_iter()
        .map(|role| build_role(at, role, customer_number, sources, &species))
        .collect();

    let details = details_from(primary);
    let communication = Some(primary.communication.clone());
    let address = Some(primary.address.clone());

    let existing = directory.find_by_customer_number(customer_number).await?;
    let created = existing.is_none();

    let mut party = match existing {
        Some(party) => party,
        None => Party::create(&new_id(), customer_number, at, details.clone()),
    };

    let mut changed = created;
    changed |= party.update(at, details);
    changed |= party.set_address(at, address);
    changed |= party.set_communication(at, communication);
    if created {
        changed |= party.set_roles(at, incoming_roles);
    } else {
        changed |= party.merge_roles(at, incoming_roles);
    }
    changed |= party.set_deleted(at, all_deleted);

    if !existing_party_ids.contains(&party.id) {
        existing_party_ids.push(party.id.clone());
    }

    tracing::debug!(
        customer_number,
        party_id = %party.id,
        created,
        changed,
        roles = party.roles.len(),
        "Consolidated party"
    );

    Ok(Some(Consolidated {
        entity: party,
        created,
        changed,
    }))
}
