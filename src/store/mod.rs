// 🗄️ Document store - generic per-collection persistence for silver and gold records
//
// Every persisted type is a JSON document with a string id living in a named
// collection. Queries are expressed as `Filter`s over dotted JSON paths, so the
// same filter runs against the in-memory store and the SQLite store.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::entities::Party;
use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A record persisted as a JSON document
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    fn id(&self) -> &str;
}

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document in the collection
    All,
    /// Field at a dotted path equals a value (a missing field equals null)
    Eq(String, Value),
    /// Array at `array` has an element whose `field` equals `value`
    AnyEq {
        array: String,
        field: String,
        value: Value,
    },
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn id(id: &str) -> Self {
        Filter::eq("id", id)
    }

    pub fn any_eq(array: &str, field: &str, value: impl Into<Value>) -> Self {
        Filter::AnyEq {
            array: array.to_string(),
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// Evaluate against a serialized document
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, expected) => value_at(doc, path).unwrap_or(&Value::Null) == expected,
            Filter::AnyEq { array, field, value } => match value_at(doc, array) {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| value_at(item, field).unwrap_or(&Value::Null) == value),
                _ => false,
            },
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Walk a dotted path ("details.name") through nested objects
pub fn value_at<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, segment| current.get(segment))
}

// ============================================================================
// Store trait
// ============================================================================

#[async_trait]
pub trait DocumentStore<D: Document>: Send + Sync {
    async fn find(&self, filter: &Filter) -> Result<Vec<D>>;

    async fn find_one(&self, filter: &Filter) -> Result<Option<D>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Replace whatever matches each filter with its document (insert when
    /// nothing matches). Returns the number of documents written.
    async fn bulk_upsert(&self, items: Vec<(Filter, D)>) -> Result<usize>;

    async fn delete_many(&self, filter: &Filter) -> Result<usize>;

    async fn add_many(&self, items: Vec<D>) -> Result<usize>;
}

/// Gold party lookup by its stable upsert key
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn find_by_customer_number(&self, customer_number: &str) -> Result<Option<Party>>;
}

#[async_trait]
impl<S> PartyDirectory for S
where
    S: DocumentStore<Party> + ?Sized,
{
    async fn find_by_customer_number(&self, customer_number: &str) -> Result<Option<Party>> {
        self.find_one(&Filter::eq("customer_number", customer_number)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matching() {
        let doc = json!({
            "id": "s1",
            "cph": "12/345/6789",
            "details": { "name": "Rose Farm" },
            "deleted": false,
            "identifiers": [{ "identifier": "12/345/6789", "identifier_type": "CPH" }]
        });

        assert!(Filter::All.matches(&doc));
        assert!(Filter::eq("cph", "12/345/6789").matches(&doc));
        assert!(Filter::eq("details.name", "Rose Farm").matches(&doc));
        assert!(Filter::eq("deleted", false).matches(&doc));
        assert!(Filter::eq("missing", Value::Null).matches(&doc));
        assert!(!Filter::eq("cph", "99/999/9999").matches(&doc));
        assert!(Filter::any_eq("identifiers", "identifier", "12/345/6789").matches(&doc));
        assert!(!Filter::any_eq("identifiers", "identifier", "x").matches(&doc));
        assert!(Filter::and(vec![Filter::id("s1"), Filter::eq("cph", "12/345/6789")]).matches(&doc));
        assert!(!Filter::and(vec![Filter::id("s2"), Filter::eq("cph", "12/345/6789")]).matches(&doc));
    }
}
