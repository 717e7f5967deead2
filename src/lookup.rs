// 🔎 Reference-data lookups - country, species, role, premises type/activity, production usage
//
// One async method per reference-data kind. A miss is Ok(None); a failing
// collaborator is logged and degraded to None by `tolerant`, so resolution
// never aborts the pipeline.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

// ============================================================================
// REFERENCE ITEM
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Country,
    Species,
    Role,
    PremisesType,
    PremisesActivityType,
    ProductionUsage,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Country => "country",
            ReferenceKind::Species => "species",
            ReferenceKind::Role => "role",
            ReferenceKind::PremisesType => "premises_type",
            ReferenceKind::PremisesActivityType => "premises_activity_type",
            ReferenceKind::ProductionUsage => "production_usage",
        }
    }
}

impl FromStr for ReferenceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "country" => Ok(ReferenceKind::Country),
            "species" => Ok(ReferenceKind::Species),
            "role" => Ok(ReferenceKind::Role),
            "premises_type" => Ok(ReferenceKind::PremisesType),
            "premises_activity_type" => Ok(ReferenceKind::PremisesActivityType),
            "production_usage" => Ok(ReferenceKind::ProductionUsage),
            other => anyhow::bail!("Unknown reference kind: {}", other),
        }
    }
}

/// A resolved reference value: (id, code, name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub id: String,
    pub code: String,
    pub name: String,
}

impl ReferenceItem {
    pub fn new(id: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        ReferenceItem {
            id: id.into(),
            code: code.into(),
            name: name.into(),
        }
    }
}

// ============================================================================
// LOOKUP CAPABILITY
// ============================================================================

#[async_trait]
pub trait ReferenceDataLookup: Send + Sync {
    /// `region_hint` is the UK internal code (e.g. "WALES") when the source has one
    async fn find_country(&self, code: &str, region_hint: Option<&str>) -> Result<Option<ReferenceItem>>;
    async fn find_species(&self, code: &str) -> Result<Option<ReferenceItem>>;
    /// Roles are matched on source role name or code
    async fn find_role(&self, name: &str) -> Result<Option<ReferenceItem>>;
    async fn find_premises_type(&self, code: &str) -> Result<Option<ReferenceItem>>;
    async fn find_premises_activity_type(&self, code: &str) -> Result<Option<ReferenceItem>>;
    async fn find_production_usage(&self, code: &str) -> Result<Option<ReferenceItem>>;
}

#[async_trait]
impl<T: ReferenceDataLookup + ?Sized> ReferenceDataLookup for Arc<T> {
    async fn find_country(&self, code: &str, region_hint: Option<&str>) -> Result<Option<ReferenceItem>> {
        (**self).find_country(code, region_hint).await
    }
    async fn find_species(&self, code: &str) -> Result<Option<ReferenceItem>> {
        (**self).find_species(code).await
    }
    async fn find_role(&self, name: &str) -> Result<Option<ReferenceItem>> {
        (**self).find_role(name).await
    }
    async fn find_premises_type(&self, code: &str) -> Result<Option<ReferenceItem>> {
        (**self).find_premises_type(code).await
    }
    async fn find_premises_activity_type(&self, code: &str) -> Result<Option<ReferenceItem>> {
        (**self).find_premises_activity_type(code).await
    }
    async fn find_production_usage(&self, code: &str) -> Result<Option<ReferenceItem>> {
        (**self).find_production_usage(code).await
    }
}

/// Degrade a failed lookup to a miss, keeping the pipeline moving
pub fn tolerant(kind: ReferenceKind, code: &str, result: Result<Option<ReferenceItem>>) -> Option<ReferenceItem> {
    match result {
        Ok(item) => item,
        Err(e) => {
            tracing::warn!(kind = kind.as_str(), code, error = %e, "Reference lookup failed, leaving id unresolved");
            None
        }
    }
}

/// Dispatch by kind; blank codes never reach the collaborator
pub async fn resolve<L: ReferenceDataLookup + ?Sized>(
    lookup: &L,
    kind: ReferenceKind,
    code: Option<&str>,
) -> Option<ReferenceItem> {
    let code = code.map(str::trim).filter(|c| !c.is_empty())?;
    let result = match kind {
        ReferenceKind::Country => lookup.find_country(code, None).await,
        ReferenceKind::Species => lookup.find_species(code).await,
        ReferenceKind::Role => lookup.find_role(code).await,
        ReferenceKind::PremisesType => lookup.find_premises_type(code).await,
        ReferenceKind::PremisesActivityType => lookup.find_premises_activity_type(code).await,
        ReferenceKind::ProductionUsage => lookup.find_production_usage(code).await,
    };
    tolerant(kind, code, result)
}

// ============================================================================
// CACHED LOOKUP
// ============================================================================

type CacheKey = (ReferenceKind, String, Option<String>);

/// Wraps any lookup with a per-process cache; errors are not cached
pub struct CachedLookup<L> {
    inner: L,
    cache: Mutex<HashMap<CacheKey, Option<ReferenceItem>>>,
}

impl<L: ReferenceDataLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        CachedLookup {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn cached(&self, kind: ReferenceKind, code: &str, hint: Option<&str>) -> Result<Option<ReferenceItem>> {
        let key = (kind, code.to_uppercase(), hint.map(|h| h.to_uppercase()));
        if let Some(hit) = self.cache.lock().await.get(&key) {
            return Ok(hit.clone());
        }

        let fetched = match kind {
            ReferenceKind::Country => self.inner.find_country(code, hint).await?,
            ReferenceKind::Species => self.inner.find_species(code).await?,
            ReferenceKind::Role => self.inner.find_role(code).await?,
            ReferenceKind::PremisesType => self.inner.find_premises_type(code).await?,
            ReferenceKind::PremisesActivityType => self.inner.find_premises_activity_type(code).await?,
            ReferenceKind::ProductionUsage => self.inner.find_production_usage(code).await?,
        };

        self.cache.lock().await.insert(key, fetched.clone());
        Ok(fetched)
    }
}

#[async_trait]
impl<L: ReferenceDataLookup> ReferenceDataLookup for CachedLookup<L> {
    async fn find_country(&self, code: &str, region_hint: Option<&str>) -> Result<Option<ReferenceItem>> {
        self.cached(ReferenceKind::Country, code, region_hint).await
    }
    async fn find_species(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.cached(ReferenceKind::Species, code, None).await
    }
    async fn find_role(&self, name: &str) -> Result<Option<ReferenceItem>> {
        self.cached(ReferenceKind::Role, name, None).await
    }
    async fn find_premises_type(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.cached(ReferenceKind::PremisesType, code, None).await
    }
    async fn find_premises_activity_type(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.cached(ReferenceKind::PremisesActivityType, code, None).await
    }
    async fn find_production_usage(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.cached(ReferenceKind::ProductionUsage, code, None).await
    }
}

// ============================================================================
// IN-MEMORY REFERENCE DATA
// ============================================================================

#[derive(Debug, Deserialize)]
struct ReferenceRow {
    kind: String,
    id: String,
    code: String,
    name: String,
}

/// Reference tables held in memory; loaded from `reference_data.csv` or built in tests
#[derive(Debug, Default)]
pub struct InMemoryReferenceData {
    tables: HashMap<ReferenceKind, Vec<ReferenceItem>>,
    calls: HashMap<ReferenceKind, AtomicUsize>,
}

impl InMemoryReferenceData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add one entry
    pub fn with(mut self, kind: ReferenceKind, id: &str, code: &str, name: &str) -> Self {
        self.insert(kind, ReferenceItem::new(id, code, name));
        self
    }

    pub fn insert(&mut self, kind: ReferenceKind, item: ReferenceItem) {
        self.tables.entry(kind).or_default().push(item);
    }

    /// Load `kind,id,code,name` rows
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut data = InMemoryReferenceData::new();
        data.load_csv(path)?;
        Ok(data)
    }

    pub fn load_csv(&mut self, path: &Path) -> Result<usize> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::Fields)
            .from_path(path)
            .with_context(|| format!("Failed to open reference data {}", path.display()))?;

        let mut loaded = 0;
        for result in rdr.deserialize() {
            let row: ReferenceRow = result.context("Failed to deserialize reference row")?;
            let kind: ReferenceKind = row.kind.parse()?;
            self.insert(kind, ReferenceItem::new(row.id, row.code, row.name));
            loaded += 1;
        }
        Ok(loaded)
    }

    /// How many times a kind has been queried (cache/dedup assertions)
    pub fn calls(&self, kind: ReferenceKind) -> usize {
        self.calls.get(&kind).map_or(0, |c| c.load(Ordering::SeqCst))
    }

    fn record_call(&self, kind: ReferenceKind) {
        if let Some(counter) = self.calls.get(&kind) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn find(&self, kind: ReferenceKind, code: &str) -> Option<ReferenceItem> {
        let code = code.trim();
        self.tables.get(&kind)?.iter().find(|item| {
            item.code.eq_ignore_ascii_case(code) || item.name.eq_ignore_ascii_case(code)
        }).cloned()
    }

    /// Counters must exist before the value is shared, so `with_call_tracking` seeds them
    pub fn with_call_tracking(mut self) -> Self {
        for kind in [
            ReferenceKind::Country,
            ReferenceKind::Species,
            ReferenceKind::Role,
            ReferenceKind::PremisesType,
            ReferenceKind::PremisesActivityType,
            ReferenceKind::ProductionUsage,
        ] {
            self.calls.entry(kind).or_insert_with(|| AtomicUsize::new(0));
        }
        self
    }
}

#[async_trait]
impl ReferenceDataLookup for InMemoryReferenceData {
    async fn find_country(&self, code: &str, region_hint: Option<&str>) -> Result<Option<ReferenceItem>> {
        self.record_call(ReferenceKind::Country);
        // A UK internal code names the constituent country more precisely than "GB"
        if let Some(hint) = region_hint.map(str::trim).filter(|h| !h.is_empty()) {
            if let Some(item) = self.find(ReferenceKind::Country, hint) {
                return Ok(Some(item));
            }
        }
        Ok(self.find(ReferenceKind::Country, code))
    }

    async fn find_species(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.record_call(ReferenceKind::Species);
        Ok(self.find(ReferenceKind::Species, code))
    }

    async fn find_role(&self, name: &str) -> Result<Option<ReferenceItem>> {
        self.record_call(ReferenceKind::Role);
        Ok(self.find(ReferenceKind::Role, name))
    }

    async fn find_premises_type(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.record_call(ReferenceKind::PremisesType);
        Ok(self.find(ReferenceKind::PremisesType, code))
    }

    async fn find_premises_activity_type(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.record_call(ReferenceKind::PremisesActivityType);
        Ok(self.find(ReferenceKind::PremisesActivityType, code))
    }

    async fn find_production_usage(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.record_call(ReferenceKind::ProductionUsage);
        Ok(self.find(ReferenceKind::ProductionUsage, code))
    }
}

/// Reference data shared by the unit tests of the normalizer and consolidators
#[cfg(test)]
pub fn test_reference_data() -> InMemoryReferenceData {
    InMemoryReferenceData::new()
        .with(ReferenceKind::Country, "c-gb", "GB", "United Kingdom")
        .with(ReferenceKind::Country, "c-eng", "ENGLAND", "England")
        .with(ReferenceKind::Species, "s-ctt", "CTT", "Cattle")
        .with(ReferenceKind::Species, "s-shp", "SHP", "Sheep")
        .with(ReferenceKind::Species, "s-pig", "PIG", "Pigs")
        .with(ReferenceKind::Role, "r-keeper", "LIVESTOCKKEEPER", "Keeper")
        .with(ReferenceKind::Role, "r-owner", "LIVESTOCKOWNER", "Owner")
        .with(ReferenceKind::Role, "r-holder", "CPHHOLDER", "Holder")
        .with(ReferenceKind::PremisesType, "pt-ah", "AH", "Agricultural Holding")
        .with(ReferenceKind::PremisesActivityType, "pa-abp", "ABP", "Animal By-Products")
        .with(ReferenceKind::PremisesActivityType, "pa-mkt", "MKT", "Market")
        .with(ReferenceKind::ProductionUsage, "pu-beef", "BEEF", "Beef")
        .with(ReferenceKind::ProductionUsage, "pu-dairy", "DAIRY", "Dairy")
        .with_call_tracking()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingLookup;

    #[async_trait]
    impl ReferenceDataLookup for FailingLookup {
        async fn find_country(&self, _: &str, _: Option<&str>) -> Result<Option<ReferenceItem>> {
            anyhow::bail!("country service down")
        }
        async fn find_species(&self, _: &str) -> Result<Option<ReferenceItem>> {
            anyhow::bail!("species service down")
        }
        async fn find_role(&self, _: &str) -> Result<Option<ReferenceItem>> {
            anyhow::bail!("role service down")
        }
        async fn find_premises_type(&self, _: &str) -> Result<Option<ReferenceItem>> {
            anyhow::bail!("down")
        }
        async fn find_premises_activity_type(&self, _: &str) -> Result<Option<ReferenceItem>> {
            anyhow::bail!("down")
        }
        async fn find_production_usage(&self, _: &str) -> Result<Option<ReferenceItem>> {
            anyhow::bail!("down")
        }
    }

    #[tokio::test]
    async fn test_find_by_code_or_name() {
        let data = test_reference_data();
        let keeper = data.find_role("keeper").await.unwrap().unwrap();
        assert_eq!(keeper.id, "r-keeper");
        let owner = data.find_role("LIVESTOCKOWNER").await.unwrap().unwrap();
        assert_eq!(owner.id, "r-owner");
        assert!(data.find_role("Agent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_country_prefers_region_hint() {
        let data = test_reference_data();
        let with_hint = data.find_country("GB", Some("England")).await.unwrap().unwrap();
        assert_eq!(with_hint.id, "c-eng");
        let unknown_hint = data.find_country("GB", Some("Atlantis")).await.unwrap().unwrap();
        assert_eq!(unknown_hint.id, "c-gb");
    }

    #[tokio::test]
    async fn test_failures_degrade_to_none() {
        let resolved = resolve(&FailingLookup, ReferenceKind::Species, Some("CTT")).await;
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn test_blank_codes_never_queried() {
        let data = test_reference_data();
        assert!(resolve(&data, ReferenceKind::Species, Some("  ")).await.is_none());
        assert!(resolve(&data, ReferenceKind::Species, None).await.is_none());
        assert_eq!(data.calls(ReferenceKind::Species), 0);
    }

    #[tokio::test]
    async fn test_cache_hits_skip_inner_lookup() {
        let data = Arc::new(test_reference_data());
        let cached = CachedLookup::new(data.clone());

        for _ in 0..3 {
            assert!(cached.find_species("CTT").await.unwrap().is_some());
            assert!(cached.find_species("XXX").await.unwrap().is_none());
        }

        assert_eq!(data.calls(ReferenceKind::Species), 2);
        assert_eq!(cached.cached_entries().await, 2);
    }

    #[test]
    fn test_load_reference_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reference_data.csv");
        std::fs::write(
            &path,
            "kind,id,code,name\nspecies,s-1,CTT,Cattle\nrole,r-1,LIVESTOCKKEEPER,Keeper\n",
        )
        .unwrap();

        let data = InMemoryReferenceData::from_csv(&path).unwrap();
        assert_eq!(data.find(ReferenceKind::Species, "ctt").unwrap().id, "s-1");

        std::fs::write(&path, "kind,id,code,name\nplanet,p-1,X,Mars\n").unwrap();
        assert!(InMemoryReferenceData::from_csv(&path).is_err());
    }
}
