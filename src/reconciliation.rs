// ⚖️ Reconciliation - diff incoming records against what is persisted for one boundary
//
// Silver collections are diffed per item:
//   incoming empty      → delete everything under the boundary, no upsert
//   otherwise           → upsert new/changed records by id, delete orphans
//
// Relationship collections are replaced wholesale, but only when the set for
// the boundary actually changed. Unchanged records are never rewritten, so a
// repeated import costs zero writes.

use crate::entities::{Party, Site};
use crate::store::{Document, DocumentStore, Filter};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

// ============================================================================
// REPORTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: &'static str,
    pub upserted: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl CollectionReport {
    fn new(collection: &'static str) -> Self {
        CollectionReport {
            collection,
            ..CollectionReport::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.upserted + self.deleted
    }
}

/// Per-collection outcome of one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub collections: Vec<CollectionReport>,
}

impl ReconciliationReport {
    pub fn push(&mut self, report: CollectionReport) {
        self.collections.push(report);
    }

    pub fn writes(&self) -> usize {
        self.collections.iter().map(CollectionReport::writes).sum()
    }

    pub fn get(&self, collection: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.collection == collection)
    }

    /// "silver_holdings +1/-0 (=2), ..." for collections that were touched
    pub fn summary(&self) -> String {
        let touched: Vec<String> = self
            .collections
            .iter()
            .filter(|c| c.writes() > 0)
            .map(|c| format!("{} +{}/-{} (={})", c.collection, c.upserted, c.deleted, c.unchanged))
            .collect();

        if touched.is_empty() {
            "no changes".to_string()
        } else {
            touched.join(", ")
        }
    }
}

// ============================================================================
// PER-ITEM DIFF
// ============================================================================

/// Reconcile one collection for one boundary (e.g. every silver holding of a CPH)
pub async fn reconcile_boundary<D, S>(store: &S, boundary: &Filter, incoming: Vec<D>) -> Result<CollectionReport>
where
    D: Document + PartialEq,
    S: DocumentStore<D> + ?Sized,
{
    let mut report = CollectionReport::new(D::COLLECTION);
    let existing = store.find(boundary).await?;

    if incoming.is_empty() {
        if !existing.is_empty() {
            report.deleted = store.delete_many(boundary).await?;
        }
        return Ok(report);
    }

    let persisted: HashMap<&str, &D> = existing.iter().map(|d| (d.id(), d)).collect();
    let incoming_ids: HashSet<String> = incoming.iter().map(|d| d.id().to_string()).collect();

    let mut changed: Vec<(Filter, D)> = Vec::new();
    for item in incoming {
        if persisted.get(item.id()).is_some_and(|current| **current == item) {
            report.unchanged += 1;
        } else {
            changed.push((Filter::id(item.id()), item));
        }
    }
    if !changed.is_empty() {
        report.upserted = store.bulk_upsert(changed).await?;
    }

    for orphan in existing.iter().filter(|d| !incoming_ids.contains(d.id())) {
        report.deleted += store.delete_many(&Filter::id(orphan.id())).await?;
    }

    Ok(report)
}

// ============================================================================
// FULL REPLACEMENT
// ============================================================================

/// Delete-then-insert for a boundary, skipped when the persisted set is identical
pub async fn replace_boundary<D, S>(store: &S, boundary: &Filter, incoming: Vec<D>) -> Result<CollectionReport>
where
    D: Document + PartialEq,
    S: DocumentStore<D> + ?Sized,
{
    let mut report = CollectionReport::new(D::COLLECTION);
    let existing = store.find(boundary).await?;

    let by_id = |docs: &[D]| -> BTreeMap<String, D> {
        docs.iter().map(|d| (d.id().to_string(), d.clone())).collect()
    };
    if by_id(&existing) == by_id(&incoming) {
        report.unchanged = incoming.len();
        return Ok(report);
    }

    if !existing.is_empty() {
        report.deleted = store.delete_many(boundary).await?;
    }
    if !incoming.is_empty() {
        report.upserted = store.add_many(incoming).await?;
    }
    Ok(report)
}

// ============================================================================
// GOLD AGGREGATES
// ============================================================================

pub async fn save_site<S>(store: &S, site: Site) -> Result<usize>
where
    S: DocumentStore<Site> + ?Sized,
{
    let filter = Filter::id(&site.id);
    store.bulk_upsert(vec![(filter, site)]).await
}

/// Parties are upserted by customer number, never by internal id
pub async fn save_party<S>(store: &S, party: Party) -> Result<usize>
where
    S: DocumentStore<Party> + ?Sized,
{
    let filter = Filter::eq("customer_number", party.customer_number.as_str());
    store.bulk_upsert(vec![(filter, party)]).await
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleCleanup {
    pub parties_saved: usize,
    pub roles_removed: usize,
}

/// Remove orphaned (customer number, role id) pairs from gold parties, only
/// for role instances tied to `site_id`
pub async fn cleanup_orphan_roles<S>(
    store: &S,
    orphans: &[(String, String)],
    site_id: &str,
    at: DateTime<Utc>,
) -> Result<RoleCleanup>
where
    S: DocumentStore<Party> + ?Sized,
{
    let mut by_party: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (customer_number, role_id) in orphans {
        by_party
            .entry(customer_number.as_str())
            .or_default()
            .push(role_id.as_str());
    }

    let mut cleanup = RoleCleanup::default();
    for (customer_number, role_ids) in by_party {
        let Some(mut party) = store
            .find_one(&Filter::eq("customer_number", customer_number))
            .await?
        else {
            continue;
        };

        let count: usize = role_ids
            .iter()
            .map(|role_id| party.remove_site_roles(at, role_id, site_id))
            .sum();
        if count > 0 {
            tracing::debug!(customer_number, removed = count, site_id, "Removed orphaned roles");
            cleanup.parties_saved += save_party(store, party).await?;
            cleanup.roles_removed += count;
        }
    }
    Ok(cleanup)
}
