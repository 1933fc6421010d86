//! Master registry
//!
//! The single source of truth for which teams exist, plus configuration
//! shared by all teams. Lives in its own database with a lifecycle
//! independent of any team store.
//!
//! Registry records are never replaced wholesale: partial team info arrives
//! from different call sites at different times (cookie parse vs. scrape
//! result), so every update merges onto the existing record.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::Timings;
use crate::engine::{CollectionSpec, DatabaseSpec, Key, StorageEngine, TxMode};
use crate::storage::SCHEMA_VERSION;
use crate::storage::conn::ConnectionManager;
use crate::storage::executor::TransactionExecutor;
use crate::team::{TeamInfo, TeamRecord};
use crate::{Error, Result};

/// Registry database name.
pub const MASTER_DB: &str = "master";

/// Collection names within the registry database.
pub mod collections {
    pub const TEAMS: &str = "teams";
    pub const GLOBAL_CONFIG: &str = "global_config";
}

pub struct MasterRegistry {
    conn: Arc<ConnectionManager>,
    executor: TransactionExecutor,
}

impl MasterRegistry {
    pub fn database_spec() -> DatabaseSpec {
        DatabaseSpec {
            name: MASTER_DB.to_string(),
            version: SCHEMA_VERSION,
            collections: vec![
                CollectionSpec {
                    name: collections::TEAMS,
                    indexes: &["division", "world"],
                },
                CollectionSpec {
                    name: collections::GLOBAL_CONFIG,
                    indexes: &[],
                },
            ],
        }
    }

    pub fn new(engine: Arc<dyn StorageEngine>, timings: Timings) -> Self {
        let conn = Arc::new(ConnectionManager::new(
            engine,
            Self::database_spec(),
            timings.clone(),
        ));
        let executor = TransactionExecutor::new(Arc::clone(&conn), timings);
        Self { conn, executor }
    }

    /// Insert the team if unknown (unknown fields defaulted, `first_seen` =
    /// `last_accessed` = now); otherwise merge `info` onto the existing
    /// record and bump `last_accessed`. Returns the stored record.
    pub async fn ensure_team_registered(
        &self,
        team_id: &str,
        info: Option<&TeamInfo>,
    ) -> Result<TeamRecord> {
        let now = Utc::now();
        let key = Key::from(team_id);

        self.executor
            .run(&[collections::TEAMS], TxMode::ReadWrite, |tx| {
                let mut record = match tx.get(collections::TEAMS, &key)? {
                    Some(doc) => serde_json::from_value::<TeamRecord>(doc)?,
                    None => {
                        tracing::info!(team = team_id, "registering new team");
                        TeamRecord::new(team_id, now)
                    }
                };
                if let Some(info) = info {
                    record.apply(info);
                }
                record.last_accessed = now;
                tx.put(collections::TEAMS, &key, &serde_json::to_value(&record)?)?;
                Ok(record)
            })
            .await
    }

    pub async fn get_all_teams(&self) -> Result<Vec<TeamRecord>> {
        let docs = self
            .executor
            .run(&[collections::TEAMS], TxMode::ReadOnly, |tx| {
                tx.scan(collections::TEAMS)
            })
            .await?;

        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }

    pub async fn get_team_info(&self, team_id: &str) -> Result<Option<TeamRecord>> {
        let key = Key::from(team_id);
        let doc = self
            .executor
            .run(&[collections::TEAMS], TxMode::ReadOnly, |tx| {
                tx.get(collections::TEAMS, &key)
            })
            .await?;

        doc.map(serde_json::from_value).transpose().map_err(Error::from)
    }

    /// Merge `info` onto an existing record; [`Error::TeamNotFound`] when
    /// the team was never registered.
    pub async fn update_team_info(&self, team_id: &str, info: &TeamInfo) -> Result<TeamRecord> {
        let now = Utc::now();
        let key = Key::from(team_id);

        self.executor
            .run(&[collections::TEAMS], TxMode::ReadWrite, |tx| {
                let doc = tx
                    .get(collections::TEAMS, &key)?
                    .ok_or_else(|| Error::TeamNotFound(team_id.to_string()))?;
                let mut record: TeamRecord = serde_json::from_value(doc)?;
                record.apply(info);
                record.last_accessed = now;
                tx.put(collections::TEAMS, &key, &serde_json::to_value(&record)?)?;
                Ok(record)
            })
            .await
    }

    // ========== Global Config ==========

    pub async fn save_global_config(&self, key: &str, value: Value) -> Result<()> {
        let key = Key::from(key);
        self.executor
            .run(&[collections::GLOBAL_CONFIG], TxMode::ReadWrite, |tx| {
                tx.put(collections::GLOBAL_CONFIG, &key, &value)
            })
            .await
    }

    pub async fn get_global_config(&self, key: &str) -> Result<Option<Value>> {
        let key = Key::from(key);
        self.executor
            .run(&[collections::GLOBAL_CONFIG], TxMode::ReadOnly, |tx| {
                tx.get(collections::GLOBAL_CONFIG, &key)
            })
            .await
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }
}
