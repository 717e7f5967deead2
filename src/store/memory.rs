// In-memory document store with a write counter
//
// Documents are kept serialized so filters behave exactly as they do against
// SQLite. Every inserted, replaced or deleted document counts as one write.

use super::{Document, DocumentStore, Filter};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

type Collection = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<&'static str, Collection>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total documents written or deleted since creation
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .map(|c| c.get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn with_collection<T>(&self, name: &'static str, f: impl FnOnce(&mut Collection) -> Result<T>) -> Result<T> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| anyhow!("memory store mutex poisoned"))?;
        f(collections.entry(name).or_default())
    }

    fn record_writes(&self, n: usize) {
        self.writes.fetch_add(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl<D: Document> DocumentStore<D> for MemoryStore {
    async fn find(&self, filter: &Filter) -> Result<Vec<D>> {
        self.with_collection(D::COLLECTION, |docs| {
            docs.values()
                .filter(|doc| filter.matches(doc))
                .map(|doc| {
                    serde_json::from_value(doc.clone())
                        .with_context(|| format!("Failed to decode {} document", D::COLLECTION))
                })
                .collect()
        })
    }

    async fn bulk_upsert(&self, items: Vec<(Filter, D)>) -> Result<usize> {
        let written = self.with_collection(D::COLLECTION, |docs| {
            let mut written = 0;
            for (filter, item) in items {
                let value = serde_json::to_value(&item)?;
                docs.retain(|_, doc| !filter.matches(doc));
                docs.insert(item.id().to_string(), value);
                written += 1;
            }
            Ok(written)
        })?;
        self.record_writes(written);
        Ok(written)
    }

    async fn delete_many(&self, filter: &Filter) -> Result<usize> {
        let deleted = self.with_collection(D::COLLECTION, |docs| {
            let before = docs.len();
            docs.retain(|_, doc| !filter.matches(doc));
            Ok(before - docs.len())
        })?;
        self.record_writes(deleted);
        Ok(deleted)
    }

    async fn add_many(&self, items: Vec<D>) -> Result<usize> {
        let added = self.with_collection(D::COLLECTION, |docs| {
            let mut added = 0;
            for item in items {
                docs.insert(item.id().to_string(), serde_json::to_value(&item)?);
                added += 1;
            }
            Ok(added)
        })?;
        self.record_writes(added);
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        cph: String,
        text: String,
    }

    impl Document for Note {
        const COLLECTION: &'static str = "notes";

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn note(id: &str, cph: &str, text: &str) -> Note {
        Note {
            id: id.to_string(),
            cph: cph.to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_find_delete() {
        let store = MemoryStore::new();
        store
            .add_many(vec![note("n1", "A", "one"), note("n2", "A", "two"), note("n3", "B", "three")])
            .await
            .unwrap();

        let in_a = DocumentStore::<Note>::find(&store, &Filter::eq("cph", "A")).await.unwrap();
        assert_eq!(in_a.len(), 2);

        let upserted = store
            .bulk_upsert(vec![(Filter::id("n1"), note("n1", "A", "uno"))])
            .await
            .unwrap();
        assert_eq!(upserted, 1);
        let n1 = DocumentStore::<Note>::find_one(&store, &Filter::id("n1")).await.unwrap();
        assert_eq!(n1.unwrap().text, "uno");

        let deleted = DocumentStore::<Note>::delete_many(&store, &Filter::eq("cph", "A")).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count("notes"), 1);
        assert_eq!(store.writes(), 3 + 1 + 2);
    }
}
