// 🔄 Sync pipeline - one holding identifier (CPH) per unit of work
//
// Stages, each a separate commit:
//   1. raw → silver (normalize, merge parties, correlate) and reconcile silver
//   2. replace the CPH's group-mark relationships
//   3. under the site lease, then the party leases: orphan-role cleanup,
//      parties, site, site-party-role projection. A batch without holdings
//      only retires the previous projection and its roles.
//
// Nothing is transactional across stages. A failed unit is recovered by
// reprocessing its CPH from raw input; every stage is idempotent.

use crate::config::SyncConfig;
use crate::correlation::{attach_group_marks, correlate_group_marks, correlate_party_roles, SiteGroupMarkRelationship};
use crate::entities::{new_id, Party, Site, IDENTIFIER_TYPE_CPH};
use crate::error::{PipelineError, PipelineResult};
use crate::formatting::{cphh_to_cph, split_list};
use crate::gold::{
    consolidate_party, consolidate_site, orphaned_roles, project_site_party_roles, site_summary, PartySources,
    SitePartyRoleRelationship, SiteSources,
};
use crate::lock::{party_resource, site_resource, DistributedLock, LockSet, RetryPolicy};
use crate::lookup::ReferenceDataLookup;
use crate::parser::{RawExtracts, RawHerd, RawHolder, RawHolding, RawParty};
use crate::reconciliation::{
    cleanup_orphan_roles, reconcile_boundary, replace_boundary, save_party, save_site, ReconciliationReport,
};
use crate::silver::{
    aggregate_parties, normalize_herds, normalize_holdings, normalize_parties, SilverHerd, SilverHolding,
    SilverParty, SilverPartyRoleRelationship,
};
use crate::store::{DocumentStore, Filter};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// STORE BUNDLE
// ============================================================================

/// Every collection the pipeline reads or writes
pub trait SyncStore:
    DocumentStore<SilverHolding>
    + DocumentStore<SilverHerd>
    + DocumentStore<SilverParty>
    + DocumentStore<SilverPartyRoleRelationship>
    + DocumentStore<SiteGroupMarkRelationship>
    + DocumentStore<Site>
    + DocumentStore<Party>
    + DocumentStore<SitePartyRoleRelationship>
{
}

impl<T> SyncStore for T where
    T: DocumentStore<SilverHolding>
        + DocumentStore<SilverHerd>
        + DocumentStore<SilverParty>
        + DocumentStore<SilverPartyRoleRelationship>
        + DocumentStore<SiteGroupMarkRelationship>
        + DocumentStore<Site>
        + DocumentStore<Party>
        + DocumentStore<SitePartyRoleRelationship>
{
}

// ============================================================================
// BATCHES
// ============================================================================

/// Raw rows relevant to one CPH
#[derive(Debug, Clone, Default)]
pub struct HoldingBatch {
    pub cph: String,
    pub holdings: Vec<RawHolding>,
    pub herds: Vec<RawHerd>,
    pub parties: Vec<RawParty>,
    pub holders: Vec<RawHolder>,
}

impl HoldingBatch {
    /// A CPH with nothing reported: processing it removes its silver records
    pub fn empty(cph: &str) -> Self {
        HoldingBatch {
            cph: cph.to_string(),
            ..HoldingBatch::default()
        }
    }
}

/// Split one import run into per-CPH batches.
///
/// Herds go to the CPH trimmed from their CPHH. Parties go to every CPH
/// whose herds name them as owner or keeper, and holders to every CPH they
/// hold (their parties rows follow them).
pub fn group_batches(extracts: &RawExtracts) -> Vec<HoldingBatch> {
    let mut batches: BTreeMap<String, HoldingBatch> = BTreeMap::new();
    let mut batch = |cph: &str| -> Option<String> {
        let cph = cph.trim();
        if cph.is_empty() {
            return None;
        }
        batches.entry(cph.to_string()).or_insert_with(|| HoldingBatch::empty(cph));
        Some(cph.to_string())
    };

    let mut holding_rows: Vec<(String, &RawHolding)> = Vec::new();
    for row in &extracts.holdings {
        if let Some(cph) = batch(row.cph.as_deref().unwrap_or("")) {
            holding_rows.push((cph, row));
        }
    }

    let mut party_ids: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut herd_rows: Vec<(String, &RawHerd)> = Vec::new();
    for row in &extracts.herds {
        if let Some(cph) = batch(&cphh_to_cph(row.cphh.as_deref())) {
            let ids = party_ids.entry(cph.clone()).or_default();
            ids.extend(split_list(row.owner_party_ids.as_deref()));
            ids.extend(split_list(row.keeper_party_ids.as_deref()));
            herd_rows.push((cph, row));
        }
    }

    let mut holder_rows: Vec<(String, &RawHolder)> = Vec::new();
    for row in &extracts.holders {
        for cph in split_list(row.cphs.as_deref()) {
            if let Some(cph) = batch(&cph) {
                if let Some(id) = row.party_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
                    party_ids.entry(cph.clone()).or_default().insert(id.to_string());
                }
                holder_rows.push((cph, row));
            }
        }
    }

    for (cph, row) in holding_rows {
        if let Some(b) = batches.get_mut(&cph) {
            b.holdings.push(row.clone());
        }
    }
    for (cph, row) in herd_rows {
        if let Some(b) = batches.get_mut(&cph) {
            b.herds.push(row.clone());
        }
    }
    for (cph, row) in holder_rows {
        if let Some(b) = batches.get_mut(&cph) {
            b.holders.push(row.clone());
        }
    }
    for (cph, ids) in &party_ids {
        let Some(b) = batches.get_mut(cph) else { continue };
        b.parties.extend(
            extracts
                .parties
                .iter()
                .filter(|p| p.party_id.as_deref().is_some_and(|id| ids.contains(id.trim())))
                .cloned(),
        );
    }

    batches.into_values().collect()
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct UnitReport {
    pub cph: String,
    /// Raw rows dropped for lack of a natural key
    pub skipped_rows: usize,
    pub collections: ReconciliationReport,
    pub site_id: Option<String>,
    pub site_created: bool,
    /// Gold parties still referenced by the site after this unit
    pub party_ids: Vec<String>,
    /// Site and party documents saved
    pub gold_writes: usize,
    pub roles_removed: usize,
}

impl UnitReport {
    pub fn writes(&self) -> usize {
        self.collections.writes() + self.gold_writes
    }

    pub fn summary(&self) -> String {
        let mut line = format!("{}: {}", self.cph, self.collections.summary());
        if let Some(site_id) = &self.site_id {
            let state = if self.site_created { "created" } else { "kept" };
            line.push_str(&format!("; site {} {}", site_id, state));
        }
        if self.gold_writes > 0 {
            line.push_str(&format!("; {} gold writes", self.gold_writes));
        }
        if self.roles_removed > 0 {
            line.push_str(&format!("; {} orphaned roles removed", self.roles_removed));
        }
        if self.skipped_rows > 0 {
            line.push_str(&format!("; {} rows skipped", self.skipped_rows));
        }
        line
    }
}

fn checkpoint(cancel: &CancellationToken, stage: &'static str) -> PipelineResult<()> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled { stage });
    }
    Ok(())
}

/// Silver output for one CPH, ready to persist
struct SilverBatch {
    holdings: Vec<SilverHolding>,
    herds: Vec<SilverHerd>,
    parties: Vec<SilverParty>,
    relationships: Vec<SilverPartyRoleRelationship>,
    group_marks: Vec<SiteGroupMarkRelationship>,
    skipped: usize,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct SyncPipeline<S, K, R> {
    store: Arc<S>,
    lock: Arc<K>,
    lookup: Arc<R>,
    config: SyncConfig,
    retry: RetryPolicy,
}

impl<S, K, R> SyncPipeline<S, K, R>
where
    S: SyncStore + 'static,
    K: DistributedLock + 'static,
    R: ReferenceDataLookup + 'static,
{
    pub fn new(store: Arc<S>, lock: Arc<K>, lookup: Arc<R>, config: SyncConfig) -> Self {
        let retry = RetryPolicy::from_config(&config);
        SyncPipeline {
            store,
            lock,
            lookup,
            config,
            retry,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Process every batch with bounded concurrency. One unit failing never
    /// stops the others; results come back ordered by CPH.
    pub async fn run_batches(
        &self,
        batches: Vec<HoldingBatch>,
        cancel: &CancellationToken,
    ) -> Vec<(String, PipelineResult<UnitReport>)> {
        let mut results: Vec<(String, PipelineResult<UnitReport>)> = stream::iter(batches)
            .map(|batch| async move {
                let cph = batch.cph.clone();
                let result = self.process_holding(batch, cancel).await;
                match &result {
                    Ok(report) => info!(cph = %cph, writes = report.writes(), "{}", report.summary()),
                    Err(e) if e.is_transient() => warn!(cph = %cph, error = %e, "Unit deferred, retry on a later pass"),
                    Err(e) => warn!(cph = %cph, error = %e, "Unit failed, reprocess this CPH"),
                }
                (cph, result)
            })
            .buffer_unordered(self.config.max_concurrent_units.max(1))
            .collect()
            .await;

        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Run every stage for one CPH
    pub async fn process_holding(&self, batch: HoldingBatch, cancel: &CancellationToken) -> PipelineResult<UnitReport> {
        let cph = batch.cph.trim().to_string();
        if cph.is_empty() {
            return Err(PipelineError::InvalidBoundary("blank holding identifier".to_string()));
        }
        let at = Utc::now();

        checkpoint(cancel, "silver")?;
        let silver = self.build_silver(&cph, &batch).await;

        let mut report = UnitReport {
            cph: cph.clone(),
            skipped_rows: silver.skipped,
            ..UnitReport::default()
        };

        checkpoint(cancel, "persist silver")?;
        self.persist_silver(&cph, &silver, &mut report).await?;

        checkpoint(cancel, "correlation")?;
        let boundary = Filter::eq("holding_identifier", cph.as_str());
        report
            .collections
            .push(replace_boundary(&*self.store, &boundary, silver.group_marks.clone()).await?);

        checkpoint(cancel, "gold")?;
        self.gold_stage(&cph, &silver, at, cancel, &mut report).await?;
        Ok(report)
    }

    async fn build_silver(&self, cph: &str, batch: &HoldingBatch) -> SilverBatch {
        let lookup = &*self.lookup;

        let (holdings, herds) = futures::join!(
            normalize_holdings(lookup, &batch.holdings),
            normalize_herds(lookup, &batch.herds),
        );
        let merged = aggregate_parties(&batch.parties, &batch.holders);
        let parties = normalize_parties(lookup, &merged, cph).await;

        let skipped = holdings.skipped + herds.skipped;
        let mut holdings: Vec<SilverHolding> = holdings.records.into_iter().filter(|h| h.cph == cph).collect();
        let herds: Vec<SilverHerd> = herds.records.into_iter().filter(|h| h.cph == cph).collect();

        let relationships: Vec<SilverPartyRoleRelationship> =
            correlate_party_roles(&parties, cph, &self.config.source)
                .into_iter()
                .filter(|r| r.holding_identifier == cph && r.holding_identifier_type == IDENTIFIER_TYPE_CPH)
                .collect();
        let group_marks = correlate_group_marks(&herds, &relationships);
        attach_group_marks(&mut holdings, &herds);

        debug!(
            cph,
            holdings = holdings.len(),
            herds = herds.len(),
            parties = parties.len(),
            relationships = relationships.len(),
            group_marks = group_marks.len(),
            "Built silver batch"
        );

        SilverBatch {
            holdings,
            herds,
            parties,
            relationships,
            group_marks,
            skipped,
        }
    }

    async fn persist_silver(&self, cph: &str, silver: &SilverBatch, report: &mut UnitReport) -> PipelineResult<()> {
        let store = &*self.store;
        let by_cph = Filter::eq("cph", cph);
        let by_holding = Filter::and(vec![
            Filter::eq("source", self.config.source.as_str()),
            Filter::eq("holding_identifier", cph),
        ]);

        let collections = &mut report.collections;
        collections.push(reconcile_boundary(store, &by_cph, silver.holdings.clone()).await?);
        collections.push(reconcile_boundary(store, &by_cph, silver.herds.clone()).await?);
        collections.push(reconcile_boundary(store, &by_cph, silver.parties.clone()).await?);
        collections.push(reconcile_boundary(store, &by_holding, silver.relationships.clone()).await?);
        Ok(())
    }

    /// Gold read-modify-write; every lease is released whatever the outcome.
    ///
    /// The site lease is taken before the previous projection is read, so the
    /// customer numbers it names are the ones current under the lease.
    async fn gold_stage(
        &self,
        cph: &str,
        silver: &SilverBatch,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
        report: &mut UnitReport,
    ) -> PipelineResult<()> {
        let lock = &*self.lock;
        let ttl = self.config.lock_ttl();
        let site_lease = LockSet::acquire(lock, vec![site_resource(cph)], ttl, &self.retry, cancel).await?;

        let result = self.gold_under_site_lease(cph, silver, at, cancel, report).await;

        if let Err(e) = site_lease.release(lock).await {
            warn!(cph, error = %e, "Failed to release site lease");
        }
        result
    }

    async fn gold_under_site_lease(
        &self,
        cph: &str,
        silver: &SilverBatch,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
        report: &mut UnitReport,
    ) -> PipelineResult<()> {
        let store = &*self.store;
        let lock = &*self.lock;
        let boundary = Filter::eq("holding_identifier", cph);
        let previous: Vec<SitePartyRoleRelationship> =
            DocumentStore::<SitePartyRoleRelationship>::find(store, &boundary).await?;

        if silver.holdings.is_empty() && previous.is_empty() {
            debug!(cph, "No holdings and no previous projection, gold untouched");
            return Ok(());
        }

        let resources: Vec<String> = silver
            .parties
            .iter()
            .map(|p| p.customer_number().trim())
            .chain(previous.iter().map(|r| r.customer_number.as_str()))
            .filter(|cn| !cn.is_empty())
            .map(party_resource)
            .collect();
        let party_leases =
            LockSet::acquire(lock, resources, self.config.lock_ttl(), &self.retry, cancel).await?;
        debug!(cph, leases = party_leases.resources().len(), "Party leases acquired");

        let result = if silver.holdings.is_empty() {
            self.retire_gold(cph, &previous, at, cancel, report).await
        } else {
            self.consolidate_gold(cph, silver, &previous, at, cancel, report).await
        };

        if let Err(e) = party_leases.release(lock).await {
            warn!(cph, error = %e, "Failed to release party leases");
        }
        result
    }

    /// No holdings reported: every role in the previous projection is
    /// orphaned and the projection is emptied. The Site itself is kept.
    async fn retire_gold(
        &self,
        cph: &str,
        previous: &[SitePartyRoleRelationship],
        at: DateTime<Utc>,
        cancel: &CancellationToken,
        report: &mut UnitReport,
    ) -> PipelineResult<()> {
        let store = &*self.store;

        let existing_site =
            DocumentStore::<Site>::find_one(store, &Filter::any_eq("identifiers", "identifier", cph)).await?;
        if let Some(site) = existing_site {
            let orphans = orphaned_roles(previous, &[]);
            checkpoint(cancel, "orphan roles")?;
            let cleanup = cleanup_orphan_roles(store, &orphans, &site.id, at).await?;
            report.roles_removed = cleanup.roles_removed;
            report.gold_writes += cleanup.parties_saved;
            report.site_id = Some(site.id);
        }

        let boundary = Filter::eq("holding_identifier", cph);
        report
            .collections
            .push(replace_boundary(store, &boundary, Vec::<SitePartyRoleRelationship>::new()).await?);

        debug!(cph, roles_removed = report.roles_removed, "Site party roles retired");
        Ok(())
    }

    async fn consolidate_gold(
        &self,
        cph: &str,
        silver: &SilverBatch,
        previous: &[SitePartyRoleRelationship],
        at: DateTime<Utc>,
        cancel: &CancellationToken,
        report: &mut UnitReport,
    ) -> PipelineResult<()> {
        let store = &*self.store;
        let lookup = &*self.lookup;

        let existing_site =
            DocumentStore::<Site>::find_one(store, &Filter::any_eq("identifiers", "identifier", cph)).await?;
        let site_id = existing_site.as_ref().map_or_else(new_id, |s| s.id.clone());
        let summary = site_summary(&site_id, &silver.holdings)
            .ok_or_else(|| PipelineError::InvalidBoundary(format!("no holdings for {}", cph)))?;

        // Orphans depend only on (customer number, role id), so they are
        // known before any party is consolidated
        let current_pairs = project_site_party_roles(&silver.relationships, &silver.group_marks, &HashMap::new());
        let orphans = orphaned_roles(previous, &current_pairs);
        if !orphans.is_empty() {
            checkpoint(cancel, "orphan roles")?;
            let cleanup = cleanup_orphan_roles(store, &orphans, &site_id, at).await?;
            report.roles_removed = cleanup.roles_removed;
            report.gold_writes += cleanup.parties_saved;
        }

        let mut by_customer: BTreeMap<&str, Vec<SilverParty>> = BTreeMap::new();
        for party in &silver.parties {
            let cn = party.customer_number().trim();
            if !cn.is_empty() {
                by_customer.entry(cn).or_default().push(party.clone());
            }
        }

        let sources = PartySources {
            site: &summary,
            group_marks: &silver.group_marks,
        };
        let mut existing_party_ids: Vec<String> = Vec::new();
        let mut parties: Vec<Party> = Vec::new();
        for records in by_customer.values() {
            checkpoint(cancel, "parties")?;
            let Some(outcome) =
                consolidate_party(lookup, store, records, &sources, &mut existing_party_ids, at).await?
            else {
                continue;
            };
            if outcome.needs_write() {
                report.gold_writes += save_party(store, outcome.entity.clone()).await?;
            }
            parties.push(outcome.entity);
        }

        checkpoint(cancel, "site")?;
        let site_sources = SiteSources {
            holdings: &silver.holdings,
            group_marks: &silver.group_marks,
            parties: &parties,
            source: &self.config.source,
        };
        if let Some(outcome) = consolidate_site(lookup, &site_sources, existing_site, &site_id, at).await {
            report.site_created = outcome.created;
            if outcome.needs_write() {
                report.gold_writes += save_site(store, outcome.entity).await?;
            }
        }
        report.site_id = Some(site_id);

        let party_ids: HashMap<String, String> = parties
            .iter()
            .map(|p| (p.customer_number.clone(), p.id.clone()))
            .collect();
        let projection = project_site_party_roles(&silver.relationships, &silver.group_marks, &party_ids);
        let boundary = Filter::eq("holding_identifier", cph);
        report
            .collections
            .push(replace_boundary(store, &boundary, projection).await?);

        debug!(
            cph,
            parties = parties.len(),
            tracked = existing_party_ids.len(),
            "Gold stage complete"
        );
        report.party_ids = existing_party_ids;
        Ok(())
    }
}
