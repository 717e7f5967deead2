// SQLite document store - JSON documents in one table, filters via json_extract
//
// The same database also carries a lease table so several importer processes
// pointed at one file can share the gold-layer lock.

use super::{Document, DocumentStore, Filter};
use crate::lock::{DistributedLock, LockToken};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection mutex poisoned"))
    }

    /// Documents stored in a collection
    pub fn count(&self, collection: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery and concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Documents (one row per document, partitioned by collection)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            body TEXT NOT NULL,
            written_at TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )",
        [],
    )?;

    // ==========================================================================
    // Locks (named leases with owner token and expiry)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS locks (
            resource TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            expires_at INTEGER NOT NULL
        )",
        [],
    )?;

    Ok(())
}

// ============================================================================
// Filter → SQL
// ============================================================================

fn json_path(path: &str) -> String {
    format!("$.{}", path)
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Compile a filter to a WHERE fragment over the `body` column.
/// Paths and values are always bound as parameters.
fn where_clause(filter: &Filter, params: &mut Vec<SqlValue>) -> String {
    match filter {
        Filter::All => "1 = 1".to_string(),
        Filter::Eq(path, Value::Null) => {
            params.push(SqlValue::Text(json_path(path)));
            "json_extract(body, ?) IS NULL".to_string()
        }
        Filter::Eq(path, value) => {
            params.push(SqlValue::Text(json_path(path)));
            params.push(sql_value(value));
            "json_extract(body, ?) = ?".to_string()
        }
        Filter::AnyEq { array, field, value } => {
            params.push(SqlValue::Text(json_path(array)));
            params.push(SqlValue::Text(json_path(field)));
            params.push(sql_value(value));
            "EXISTS (SELECT 1 FROM json_each(body, ?) AS e WHERE json_extract(e.value, ?) = ?)".to_string()
        }
        Filter::And(filters) if filters.is_empty() => "1 = 1".to_string(),
        Filter::And(filters) => filters
            .iter()
            .map(|f| format!("({})", where_clause(f, params)))
            .collect::<Vec<_>>()
            .join(" AND "),
    }
}

fn delete_matching(conn: &Connection, collection: &str, filter: &Filter) -> Result<usize> {
    let mut params = vec![SqlValue::Text(collection.to_string())];
    let clause = where_clause(filter, &mut params);
    let sql = format!("DELETE FROM documents WHERE collection = ? AND ({})", clause);
    let deleted = conn.execute(&sql, params_from_iter(params.iter()))?;
    Ok(deleted)
}

fn insert_document<D: Document>(conn: &Connection, item: &D) -> Result<()> {
    let body = serde_json::to_string(item)?;
    conn.execute(
        "INSERT OR REPLACE INTO documents (collection, id, body, written_at) VALUES (?1, ?2, ?3, ?4)",
        params![D::COLLECTION, item.id(), body, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[async_trait]
impl<D: Document> DocumentStore<D> for SqliteStore {
    async fn find(&self, filter: &Filter) -> Result<Vec<D>> {
        let conn = self.conn()?;
        let mut params = vec![SqlValue::Text(D::COLLECTION.to_string())];
        let clause = where_clause(filter, &mut params);
        let sql = format!(
            "SELECT body FROM documents WHERE collection = ? AND ({}) ORDER BY id",
            clause
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for body in rows {
            let body = body?;
            let doc: D = serde_json::from_str(&body)
                .with_context(|| format!("Failed to decode {} document", D::COLLECTION))?;
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn bulk_upsert(&self, items: Vec<(Filter, D)>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for (filter, item) in &items {
            delete_matching(&tx, D::COLLECTION, filter)?;
            insert_document(&tx, item)?;
        }
        tx.commit().context("Failed to commit bulk upsert")?;
        Ok(items.len())
    }

    async fn delete_many(&self, filter: &Filter) -> Result<usize> {
        let conn = self.conn()?;
        delete_matching(&conn, D::COLLECTION, filter)
    }

    async fn add_many(&self, items: Vec<D>) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for item in &items {
            insert_document(&tx, item)?;
        }
        tx.commit().context("Failed to commit insert")?;
        Ok(items.len())
    }
}

// ============================================================================
// Lease-based lock
// ============================================================================

#[async_trait]
impl DistributedLock for SqliteStore {
    async fn try_acquire(&self, resource: &str, ttl: std::time::Duration) -> Result<Option<LockToken>> {
        let now = Utc::now();
        let ttl = Duration::from_std(ttl).context("Lock TTL out of range")?;
        let token = LockToken::new(resource, now + ttl);

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM locks WHERE resource = ?1 AND expires_at <= ?2",
            params![resource, now.timestamp_millis()],
        )?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO locks (resource, owner, expires_at) VALUES (?1, ?2, ?3)",
            params![resource, token.owner, token.expires_at.timestamp_millis()],
        )?;
        tx.commit()?;

        Ok((inserted == 1).then_some(token))
    }

    async fn release(&self, token: &LockToken) -> Result<bool> {
        let conn = self.conn()?;
        let released = conn.execute(
            "DELETE FROM locks WHERE resource = ?1 AND owner = ?2",
            params![token.resource, token.owner],
        )?;
        Ok(released == 1)
    }
}

impl SqliteStore {
    /// Current holder of a lock, if any (expired leases included)
    pub fn lock_owner(&self, resource: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let owner = conn
            .query_row(
                "SELECT owner FROM locks WHERE resource = ?1",
                params![resource],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Holding {
        id: String,
        cph: String,
        deleted: bool,
        marks: Vec<Mark>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Mark {
        mark: String,
    }

    impl Document for Holding {
        const COLLECTION: &'static str = "holdings";

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn holding(id: &str, cph: &str, deleted: bool, marks: &[&str]) -> Holding {
        Holding {
            id: id.to_string(),
            cph: cph.to_string(),
            deleted,
            marks: marks.iter().map(|m| Mark { mark: m.to_string() }).collect(),
        }
    }

    #[tokio::test]
    async fn test_json_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .add_many(vec![
                holding("h1", "12/345/6789", false, &["HM1"]),
                holding("h2", "12/345/6789", true, &["HM2", "HM3"]),
                holding("h3", "99/999/9999", false, &[]),
            ])
            .await
            .unwrap();

        let by_cph = DocumentStore::<Holding>::find(&store, &Filter::eq("cph", "12/345/6789")).await.unwrap();
        assert_eq!(by_cph.len(), 2);

        let live = DocumentStore::<Holding>::find(
            &store,
            &Filter::and(vec![Filter::eq("cph", "12/345/6789"), Filter::eq("deleted", false)]),
        )
        .await
        .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "h1");

        let with_mark = DocumentStore::<Holding>::find(&store, &Filter::any_eq("marks", "mark", "HM3")).await.unwrap();
        assert_eq!(with_mark.len(), 1);
        assert_eq!(with_mark[0].id, "h2");
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_filter() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_many(vec![holding("h1", "A", false, &[])]).await.unwrap();

        store
            .bulk_upsert(vec![(Filter::id("h1"), holding("h1", "A", true, &[]))])
            .await
            .unwrap();

        let found = DocumentStore::<Holding>::find_one(&store, &Filter::id("h1")).await.unwrap();
        assert!(found.unwrap().deleted);
        assert_eq!(store.count("holdings").unwrap(), 1);

        let deleted = DocumentStore::<Holding>::delete_many(&store, &Filter::All).await.unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn test_lease_lock() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ttl = std::time::Duration::from_secs(30);

        let token = store.try_acquire("site:12/345/6789", ttl).await.unwrap().unwrap();
        assert!(store.try_acquire("site:12/345/6789", ttl).await.unwrap().is_none());
        assert_eq!(store.lock_owner("site:12/345/6789").unwrap(), Some(token.owner.clone()));

        assert!(store.release(&token).await.unwrap());
        assert!(store.try_acquire("site:12/345/6789", ttl).await.unwrap().is_some());
    }
}
