//! Embedded-engine abstraction
//!
//! The storage layers above (connection manager, executor, stores) speak to
//! a small trait surface instead of a concrete database, so the retry and
//! timeout machinery can be exercised against simulated failing engines.
//! Production uses the SQLite engine in [`sqlite`].

pub mod sqlite;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;

/// Transaction mode for a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Key of a document within a collection.
///
/// Recruits are keyed by integer id, config and metadata by string key; both
/// render to canonical text so one collection shape serves both keyspaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Canonical text rendering used as the stored primary key.
    pub fn as_text(&self) -> String {
        match self {
            Key::Int(n) => n.to_string(),
            Key::Text(s) => s.clone(),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

/// Description of one collection: name plus the document fields that get
/// secondary indexes.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub indexes: &'static [&'static str],
}

/// Description of one physical database. The schema migration creates the
/// listed collections and indexes idempotently, once per version bump.
#[derive(Debug, Clone)]
pub struct DatabaseSpec {
    pub name: String,
    pub version: u32,
    pub collections: Vec<CollectionSpec>,
}

/// Factory for database handles. One engine serves every database in the
/// process (master registry and all team stores).
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Open (creating and migrating if needed) the described database.
    async fn open(&self, spec: &DatabaseSpec) -> Result<Box<dyn DatabaseHandle>>;
}

/// A live connection to one database.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    fn name(&self) -> &str;

    /// False once the handle has been closed, locally or externally. The
    /// connection manager polls this and reopens instead of handing out a
    /// dead handle.
    fn is_open(&self) -> bool;

    /// Begin a transaction scoped to the named collections.
    async fn begin(&self, collections: &[&str], mode: TxMode) -> Result<Box<dyn TransactionHandle>>;

    /// Release the connection. Safe to call when already closed.
    async fn close(&self);
}

/// One open transaction. Data operations are synchronous (the embedded
/// engine answers in-process); commit/abort are the suspension points.
///
/// Dropping an unfinished transaction rolls it back.
#[async_trait]
pub trait TransactionHandle: Send {
    fn get(&mut self, collection: &str, key: &Key) -> Result<Option<Value>>;
    fn put(&mut self, collection: &str, key: &Key, doc: &Value) -> Result<()>;
    fn scan(&mut self, collection: &str) -> Result<Vec<Value>>;
    /// Secondary lookup on an indexed document field.
    fn find(&mut self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>>;
    fn clear(&mut self, collection: &str) -> Result<()>;
    fn count(&mut self, collection: &str) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;
    async fn abort(&mut self) -> Result<()>;
}
