//! SQLite storage engine
//!
//! One database file per logical database under the data directory, one
//! table per collection (`key TEXT PRIMARY KEY, doc TEXT NOT NULL`), with
//! JSON expression indexes for the declared secondary lookups. Transactions
//! serialize behind an owned async mutex over the connection, matching the
//! cooperative single-writer model of the store.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{CollectionSpec, DatabaseSpec, DatabaseHandle, Key, StorageEngine, TransactionHandle, TxMode};
use crate::{Error, Result};

/// Production engine: maps database names to files in a data directory.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    data_dir: PathBuf,
}

impl SqliteEngine {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.db", name))
    }
}

#[async_trait]
impl StorageEngine for SqliteEngine {
    async fn open(&self, spec: &DatabaseSpec) -> Result<Box<dyn DatabaseHandle>> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.database_path(&spec.name);

        let conn = Connection::open(&path)?;
        conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "synchronous", "normal")?;

        migrate(&conn, spec)?;
        tracing::debug!(database = %spec.name, path = %path.display(), "opened sqlite database");

        Ok(Box::new(SqliteDatabase {
            name: spec.name.clone(),
            conn: Arc::new(Mutex::new(Some(conn))),
            open: AtomicBool::new(true),
        }))
    }
}

/// Create the spec's collections and indexes, tracked by `PRAGMA
/// user_version` so the work runs once per version bump. Creation uses
/// `IF NOT EXISTS` throughout, so a re-run is a no-op, not an error.
fn migrate(conn: &Connection, spec: &DatabaseSpec) -> Result<()> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= spec.version {
        return Ok(());
    }

    for collection in &spec.collections {
        create_collection(conn, collection)?;
    }
    conn.execute_batch(&format!("PRAGMA user_version = {}", spec.version))?;

    tracing::info!(
        database = %spec.name,
        from_version = current,
        to_version = spec.version,
        "migrated database schema"
    );
    Ok(())
}

fn create_collection(conn: &Connection, collection: &CollectionSpec) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (key TEXT PRIMARY KEY, doc TEXT NOT NULL)",
            collection.name
        ),
        [],
    )?;
    for field in collection.indexes {
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{field} ON {table} (json_extract(doc, '$.{field}'))",
                table = collection.name,
                field = field,
            ),
            [],
        )?;
    }
    Ok(())
}

struct SqliteDatabase {
    name: String,
    conn: Arc<Mutex<Option<Connection>>>,
    open: AtomicBool,
}

#[async_trait]
impl DatabaseHandle for SqliteDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn begin(&self, collections: &[&str], mode: TxMode) -> Result<Box<dyn TransactionHandle>> {
        if !self.is_open() {
            return Err(Error::Engine(format!(
                "database '{}' connection is closed",
                self.name
            )));
        }

        let guard = Arc::clone(&self.conn).lock_owned().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| Error::Engine(format!("database '{}' connection is closed", self.name)))?;

        // SQLite transactions cover the whole database; the scope list still
        // bounds which collections the unit of work may touch.
        match mode {
            TxMode::ReadOnly => conn.execute_batch("BEGIN")?,
            TxMode::ReadWrite => conn.execute_batch("BEGIN IMMEDIATE")?,
        }

        Ok(Box::new(SqliteTransaction {
            guard,
            scope: collections.iter().map(|c| c.to_string()).collect(),
            finished: false,
        }))
    }

    async fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!(database = %self.name, "closing sqlite database");
        }
        let mut guard = self.conn.lock().await;
        *guard = None;
    }
}

struct SqliteTransaction {
    guard: OwnedMutexGuard<Option<Connection>>,
    scope: Vec<String>,
    finished: bool,
}

impl SqliteTransaction {
    fn conn(&self, collection: &str) -> Result<&Connection> {
        if !self.scope.iter().any(|c| c == collection) {
            return Err(Error::Engine(format!(
                "collection '{}' is not in the transaction scope",
                collection
            )));
        }
        self.guard
            .as_ref()
            .ok_or_else(|| Error::Engine("database connection is closed".to_string()))
    }
}

#[async_trait]
impl TransactionHandle for SqliteTransaction {
    fn get(&mut self, collection: &str, key: &Key) -> Result<Option<Value>> {
        let conn = self.conn(collection)?;
        let doc: Option<String> = conn
            .query_row(
                &format!("SELECT doc FROM {} WHERE key = ?1", collection),
                params![key.as_text()],
                |row| row.get(0),
            )
            .optional()?;
        match doc {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, collection: &str, key: &Key, doc: &Value) -> Result<()> {
        let conn = self.conn(collection)?;
        conn.execute(
            &format!("INSERT OR REPLACE INTO {} (key, doc) VALUES (?1, ?2)", collection),
            params![key.as_text(), serde_json::to_string(doc)?],
        )?;
        Ok(())
    }

    fn scan(&mut self, collection: &str) -> Result<Vec<Value>> {
        let conn = self.conn(collection)?;
        let mut stmt = conn.prepare(&format!("SELECT doc FROM {} ORDER BY key", collection))?;
        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        docs.into_iter()
            .map(|text| serde_json::from_str(&text).map_err(Error::from))
            .collect()
    }

    fn find(&mut self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        let conn = self.conn(collection)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT doc FROM {} WHERE json_extract(doc, '$.{}') = ?1",
            collection, field
        ))?;
        let docs = stmt
            .query_map(params![sql_value(value)], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        docs.into_iter()
            .map(|text| serde_json::from_str(&text).map_err(Error::from))
            .collect()
    }

    fn clear(&mut self, collection: &str) -> Result<()> {
        let conn = self.conn(collection)?;
        conn.execute(&format!("DELETE FROM {}", collection), [])?;
        Ok(())
    }

    fn count(&mut self, collection: &str) -> Result<u64> {
        let conn = self.conn(collection)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", collection),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn commit(&mut self) -> Result<()> {
        let conn = self
            .guard
            .as_ref()
            .ok_or_else(|| Error::Engine("database connection is closed".to_string()))?;
        conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        let conn = self
            .guard
            .as_ref()
            .ok_or_else(|| Error::Engine("database connection is closed".to_string()))?;
        conn.execute_batch("ROLLBACK")?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(conn) = self.guard.as_ref() {
                let _ = conn.execute_batch("ROLLBACK");
            }
        }
    }
}

/// Map a JSON scalar onto a SQLite value the way `json_extract` renders it
/// (booleans become 0/1 integers).
fn sql_value(value: &Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        Value::Null => Sql::Null,
        Value::Bool(b) => Sql::Integer(*b as i64),
        Value::Number(n) => n
            .as_i64()
            .map(Sql::Integer)
            .unwrap_or_else(|| Sql::Real(n.as_f64().unwrap_or(0.0))),
        Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}
