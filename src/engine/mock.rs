//! Scripted in-memory engine for exercising the retry/timeout machinery.
//!
//! Data is shared across reopens (like a real database file), and failure
//! behavior is scripted per engine: fail the first N opens, hang every
//! open, fail or hang transactions.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use super::{DatabaseHandle, DatabaseSpec, Key, StorageEngine, TransactionHandle, TxMode};
use crate::{Error, Result};

type Data = Arc<Mutex<HashMap<String, BTreeMap<String, Value>>>>;

#[derive(Debug, Clone)]
pub(crate) enum TxBehavior {
    /// Transactions succeed.
    Normal,
    /// `begin` never completes.
    Hang,
    /// `commit` never completes.
    HangCommit,
    /// `begin` fails with the given message for the first `remaining` calls.
    FailBegin { message: String, remaining: u32 },
}

pub(crate) struct MockEngine {
    open_failures: AtomicU32,
    hang_opens: AtomicBool,
    opens: AtomicU32,
    tx_behavior: Arc<Mutex<TxBehavior>>,
    data: Data,
}

impl MockEngine {
    pub(crate) fn new() -> Self {
        Self {
            open_failures: AtomicU32::new(0),
            hang_opens: AtomicBool::new(false),
            opens: AtomicU32::new(0),
            tx_behavior: Arc::new(Mutex::new(TxBehavior::Normal)),
            data: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Engine whose first `n` opens fail before succeeding.
    pub(crate) fn failing_opens(n: u32) -> Self {
        let engine = Self::new();
        engine.open_failures.store(n, Ordering::SeqCst);
        engine
    }

    /// Engine whose opens never complete.
    pub(crate) fn hanging_opens() -> Self {
        let engine = Self::new();
        engine.hang_opens.store(true, Ordering::SeqCst);
        engine
    }

    pub(crate) fn set_tx_behavior(&self, behavior: TxBehavior) {
        *self.tx_behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageEngine for MockEngine {
    async fn open(&self, spec: &DatabaseSpec) -> Result<Box<dyn DatabaseHandle>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.hang_opens.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let failures_left = self.open_failures.load(Ordering::SeqCst);
        if failures_left > 0 {
            self.open_failures.store(failures_left - 1, Ordering::SeqCst);
            return Err(Error::Engine("simulated open failure".to_string()));
        }

        Ok(Box::new(MockDatabase {
            name: spec.name.clone(),
            open: AtomicBool::new(true),
            tx_behavior: Arc::clone(&self.tx_behavior),
            data: Arc::clone(&self.data),
        }))
    }
}

struct MockDatabase {
    name: String,
    open: AtomicBool,
    tx_behavior: Arc<Mutex<TxBehavior>>,
    data: Data,
}

#[async_trait]
impl DatabaseHandle for MockDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn begin(&self, _collections: &[&str], _mode: TxMode) -> Result<Box<dyn TransactionHandle>> {
        if !self.is_open() {
            return Err(Error::Engine("database connection is closed".to_string()));
        }

        let behavior = self.tx_behavior.lock().unwrap().clone();
        let hang_commit = match behavior {
            TxBehavior::Normal => false,
            TxBehavior::HangCommit => true,
            TxBehavior::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            TxBehavior::FailBegin { message, remaining } => {
                if remaining > 0 {
                    *self.tx_behavior.lock().unwrap() = TxBehavior::FailBegin {
                        message: message.clone(),
                        remaining: remaining - 1,
                    };
                    return Err(Error::Engine(message));
                }
                false
            }
        };

        Ok(Box::new(MockTransaction {
            data: Arc::clone(&self.data),
            hang_commit,
        }))
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

struct MockTransaction {
    data: Data,
    hang_commit: bool,
}

#[async_trait]
impl TransactionHandle for MockTransaction {
    fn get(&mut self, collection: &str, key: &Key) -> Result<Option<Value>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .get(collection)
            .and_then(|docs| docs.get(&key.as_text()))
            .cloned())
    }

    fn put(&mut self, collection: &str, key: &Key, doc: &Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.entry(collection.to_string())
            .or_default()
            .insert(key.as_text(), doc.clone());
        Ok(())
    }

    fn scan(&mut self, collection: &str) -> Result<Vec<Value>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    fn find(&mut self, collection: &str, field: &str, value: &Value) -> Result<Vec<Value>> {
        Ok(self
            .scan(collection)?
            .into_iter()
            .filter(|doc| doc.get(field) == Some(value))
            .collect())
    }

    fn clear(&mut self, collection: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        data.remove(collection);
        Ok(())
    }

    fn count(&mut self, collection: &str) -> Result<u64> {
        let data = self.data.lock().unwrap();
        Ok(data.get(collection).map(|docs| docs.len() as u64).unwrap_or(0))
    }

    async fn commit(&mut self) -> Result<()> {
        if self.hang_commit {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        Ok(())
    }
}
