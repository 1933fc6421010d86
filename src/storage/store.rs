//! Single-team store
//!
//! Typed CRUD over one team's three collections, built entirely on the
//! connection manager and transaction executor:
//! - `recruits`: whole-document upserts keyed by recruit id
//! - `config`: per-team key/value config
//! - `team_metadata`: fields whose canonical home is the team database
//!   (they must survive a master-registry rebuild)

use std::sync::Arc;

use serde_json::Value;

use crate::config::Timings;
use crate::engine::{CollectionSpec, DatabaseSpec, Key, StorageEngine, TxMode};
use crate::recruit::Recruit;
use crate::storage::SCHEMA_VERSION;
use crate::storage::conn::ConnectionManager;
use crate::storage::executor::TransactionExecutor;
use crate::{Error, Result};

/// Collection names within a team database.
pub mod collections {
    pub const RECRUITS: &str = "recruits";
    pub const CONFIG: &str = "config";
    pub const TEAM_METADATA: &str = "team_metadata";
}

/// Team metadata keys. Stored inside the team database rather than the
/// master registry so they survive a registry rebuild.
pub mod meta {
    pub const CURRENT_SEASON: &str = "currentSeason";
    pub const LAST_UPDATED: &str = "lastUpdated";
    pub const RECRUIT_COUNT: &str = "recruitCount";
    pub const WATCHLIST_COUNT: &str = "watchlistCount";
    pub const TEAM_ID: &str = "teamId";
    pub const TEAM_INFO: &str = "teamInfo";
    pub const SEASON_RECRUITING_URL: &str = "seasonRecruitingUrl";
}

/// Result of the bulk recruit clear. A final all-timeouts failure degrades
/// to `success: false` with a warning instead of an error, so bulk
/// clear-then-rescrape flows proceed rather than hang.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearOutcome {
    pub success: bool,
    pub warning: Option<String>,
}

impl ClearOutcome {
    fn cleared() -> Self {
        Self {
            success: true,
            warning: None,
        }
    }
}

pub struct TeamStore {
    team_id: String,
    conn: Arc<ConnectionManager>,
    executor: TransactionExecutor,
    timings: Timings,
}

impl TeamStore {
    /// Schema of one team database, named deterministically from the team id.
    pub fn database_spec(team_id: &str) -> DatabaseSpec {
        DatabaseSpec {
            name: format!("team_{}", sanitize(team_id)),
            version: SCHEMA_VERSION,
            collections: vec![
                CollectionSpec {
                    name: collections::RECRUITS,
                    indexes: &["pos", "signed", "watched", "division"],
                },
                CollectionSpec {
                    name: collections::CONFIG,
                    indexes: &[],
                },
                CollectionSpec {
                    name: collections::TEAM_METADATA,
                    indexes: &[],
                },
            ],
        }
    }

    pub fn new(engine: Arc<dyn StorageEngine>, team_id: impl Into<String>, timings: Timings) -> Self {
        let team_id = team_id.into();
        let conn = Arc::new(ConnectionManager::new(
            engine,
            Self::database_spec(&team_id),
            timings.clone(),
        ));
        let executor = TransactionExecutor::new(Arc::clone(&conn), timings.clone());
        Self {
            team_id,
            conn,
            executor,
            timings,
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    // ========== Recruit Operations ==========

    /// Normalize the recruit (id fallback, required-field placeholders) and
    /// upsert it by id, last-writer-wins. Malformed recruits are repaired,
    /// never rejected; the stored document is returned.
    pub async fn save_recruit(&self, recruit: Recruit) -> Result<Recruit> {
        let recruit = recruit.normalized();
        let key = recruit.key();
        let doc = serde_json::to_value(&recruit)?;

        self.executor
            .run(&[collections::RECRUITS], TxMode::ReadWrite, |tx| {
                tx.put(collections::RECRUITS, &key, &doc)
            })
            .await?;

        Ok(recruit)
    }

    /// Bulk import: normalize and upsert every recruit in one transaction.
    pub async fn save_recruits(&self, recruits: Vec<Recruit>) -> Result<Vec<Recruit>> {
        let recruits: Vec<Recruit> = recruits.into_iter().map(Recruit::normalized).collect();
        let rows: Vec<(Key, Value)> = recruits
            .iter()
            .map(|r| Ok((r.key(), serde_json::to_value(r)?)))
            .collect::<Result<_>>()?;

        self.executor
            .run(&[collections::RECRUITS], TxMode::ReadWrite, |tx| {
                for (key, doc) in &rows {
                    tx.put(collections::RECRUITS, key, doc)?;
                }
                Ok(())
            })
            .await?;

        Ok(recruits)
    }

    /// Full collection scan; `[]` when nothing has ever been written.
    pub async fn get_all_recruits(&self) -> Result<Vec<Recruit>> {
        let docs = self
            .executor
            .run(&[collections::RECRUITS], TxMode::ReadOnly, |tx| {
                tx.scan(collections::RECRUITS)
            })
            .await?;

        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }

    pub async fn get_recruit_by_id(&self, id: i64) -> Result<Option<Recruit>> {
        let key = Key::Int(id);
        let doc = self
            .executor
            .run(&[collections::RECRUITS], TxMode::ReadOnly, |tx| {
                tx.get(collections::RECRUITS, &key)
            })
            .await?;

        doc.map(serde_json::from_value).transpose().map_err(Error::from)
    }

    /// Secondary lookup on the indexed position field.
    pub async fn recruits_by_position(&self, pos: &str) -> Result<Vec<Recruit>> {
        let value = Value::String(pos.to_string());
        let docs = self
            .executor
            .run(&[collections::RECRUITS], TxMode::ReadOnly, |tx| {
                tx.find(collections::RECRUITS, "pos", &value)
            })
            .await?;

        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }

    /// Clear the recruits collection.
    ///
    /// This bypasses the generic executor retry: up to
    /// [`Timings::clear_attempts`] single attempts, and from the second
    /// attempt on the connection is forced closed and reopened first (a
    /// stuck clear is most often a stale connection). If every attempt
    /// times out the call resolves with `success: false` and a warning
    /// instead of rejecting.
    pub async fn clear_all_recruits(&self) -> Result<ClearOutcome> {
        let attempts = self.timings.clear_attempts;
        let mut last_error: Option<Error> = None;
        let mut all_timeouts = true;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.conn.invalidate().await;
            }

            match self
                .executor
                .run_once(&[collections::RECRUITS], TxMode::ReadWrite, |tx| {
                    tx.clear(collections::RECRUITS)
                })
                .await
            {
                Ok(()) => return Ok(ClearOutcome::cleared()),
                Err(err @ Error::TransactionTimeout { .. }) => {
                    tracing::warn!(team = %self.team_id, attempt, "recruit clear timed out");
                    last_error = Some(err);
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(team = %self.team_id, attempt, error = %err, "recruit clear failed");
                    all_timeouts = false;
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let last = last_error.expect("at least one attempt ran");
        if all_timeouts {
            let warning = format!(
                "could not confirm recruit cleanup for team {} after {} timed-out attempts",
                self.team_id, attempts
            );
            tracing::warn!(team = %self.team_id, "{warning}");
            Ok(ClearOutcome {
                success: false,
                warning: Some(warning),
            })
        } else {
            Err(Error::TransactionFailed {
                attempts,
                source: Box::new(last),
            })
        }
    }

    // ========== Config Operations ==========

    pub async fn save_config(&self, key: &str, value: Value) -> Result<()> {
        self.save_kv(collections::CONFIG, key, value).await
    }

    /// `None` for an absent key; a stored `null` also reads back as a
    /// no-value to callers.
    pub async fn get_config(&self, key: &str) -> Result<Option<Value>> {
        self.get_kv(collections::CONFIG, key).await
    }

    // ========== Team Metadata Operations ==========

    pub async fn save_team_metadata(&self, key: &str, value: Value) -> Result<()> {
        self.save_kv(collections::TEAM_METADATA, key, value).await
    }

    pub async fn get_team_metadata(&self, key: &str) -> Result<Option<Value>> {
        self.get_kv(collections::TEAM_METADATA, key).await
    }

    async fn save_kv(&self, collection: &'static str, key: &str, value: Value) -> Result<()> {
        let key = Key::from(key);
        self.executor
            .run(&[collection], TxMode::ReadWrite, |tx| tx.put(collection, &key, &value))
            .await
    }

    async fn get_kv(&self, collection: &'static str, key: &str) -> Result<Option<Value>> {
        let key = Key::from(key);
        self.executor
            .run(&[collection], TxMode::ReadOnly, |tx| tx.get(collection, &key))
            .await
    }

    // ========== Diagnostics ==========

    /// Trivial read against the config collection; false (never an error)
    /// on any failure. Used by diagnostics, not the hot path.
    pub async fn is_connection_healthy(&self) -> bool {
        match self
            .executor
            .run(&[collections::CONFIG], TxMode::ReadOnly, |tx| {
                tx.count(collections::CONFIG)
            })
            .await
        {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(team = %self.team_id, error = %err, "connection health probe failed");
                false
            }
        }
    }

    /// Release the store's connection; reopened transparently on next use.
    pub async fn close(&self) {
        self.conn.close().await;
    }
}

/// Team ids come from a session cookie and feed a database name; keep only
/// filename-safe characters.
fn sanitize(team_id: &str) -> String {
    team_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::{MockEngine, TxBehavior};
    use crate::engine::sqlite::SqliteEngine;

    fn sample(id: i64, name: &str) -> Recruit {
        Recruit {
            id,
            name: name.to_string(),
            pos: "QB".to_string(),
            ..Default::default()
        }
    }

    fn sqlite_store(dir: &std::path::Path) -> TeamStore {
        TeamStore::new(Arc::new(SqliteEngine::new(dir)), "12345", Timings::default())
    }

    #[tokio::test]
    async fn upsert_is_last_writer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        store.save_recruit(sample(1, "First Version")).await.unwrap();
        let second = Recruit {
            watched: true,
            ..sample(1, "Second Version")
        };
        store.save_recruit(second.clone()).await.unwrap();

        let all = store.get_all_recruits().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(store.get_recruit_by_id(1).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn malformed_recruit_is_repaired_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        let raw = Recruit {
            id: 0,
            name: String::new(),
            pos: "QB".to_string(),
            ..Default::default()
        };
        let saved = store.save_recruit(raw).await.unwrap();

        assert!(saved.id > 0);
        assert_eq!(saved.name, format!("Unknown Recruit {}", saved.id));
        assert_eq!(saved.pos, "QB");

        let fetched = store.get_recruit_by_id(saved.id).await.unwrap();
        assert_eq!(fetched, Some(saved));
    }

    #[tokio::test]
    async fn fresh_store_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        assert_eq!(store.get_all_recruits().await.unwrap(), vec![]);
        assert_eq!(store.get_recruit_by_id(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        store.save_recruit(sample(1, "A")).await.unwrap();
        store.save_recruit(sample(2, "B")).await.unwrap();

        let first = store.clear_all_recruits().await.unwrap();
        assert!(first.success);
        assert_eq!(store.get_all_recruits().await.unwrap(), vec![]);

        let second = store.clear_all_recruits().await.unwrap();
        assert!(second.success);
        assert_eq!(store.get_all_recruits().await.unwrap(), vec![]);
    }

    #[tokio::test]
    async fn bulk_save_imports_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        let saved = store
            .save_recruits(vec![sample(1, "A"), sample(2, "B"), sample(0, "")])
            .await
            .unwrap();

        assert_eq!(saved.len(), 3);
        assert!(saved[2].id > 0);
        assert_eq!(store.get_all_recruits().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn position_lookup_uses_stored_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        store.save_recruit(sample(1, "A")).await.unwrap();
        store
            .save_recruit(Recruit {
                pos: "RB".to_string(),
                ..sample(2, "B")
            })
            .await
            .unwrap();

        let qbs = store.recruits_by_position("QB").await.unwrap();
        assert_eq!(qbs.len(), 1);
        assert_eq!(qbs[0].id, 1);
    }

    #[tokio::test]
    async fn config_and_metadata_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        store.save_config("season", serde_json::json!(112)).await.unwrap();
        store
            .save_team_metadata("season", serde_json::json!("meta"))
            .await
            .unwrap();

        assert_eq!(store.get_config("season").await.unwrap(), Some(serde_json::json!(112)));
        assert_eq!(
            store.get_team_metadata("season").await.unwrap(),
            Some(serde_json::json!("meta"))
        );
        assert_eq!(store.get_config("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn null_config_value_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());

        store.save_config("flag", Value::Null).await.unwrap();
        assert_eq!(store.get_config("flag").await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn healthy_store_reports_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite_store(dir.path());
        assert!(store.is_connection_healthy().await);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_degrades_when_every_attempt_times_out() {
        let engine = Arc::new(MockEngine::new());
        engine.set_tx_behavior(TxBehavior::Hang);
        let store = TeamStore::new(
            Arc::clone(&engine) as Arc<dyn StorageEngine>,
            "12345",
            Timings::default(),
        );

        let outcome = store.clear_all_recruits().await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.warning.as_deref().is_some_and(|w| !w.is_empty()));
        // One open per attempt: the connection is forced fresh from the
        // second attempt onward.
        assert_eq!(engine.open_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_health_probe_reports_unhealthy() {
        let engine = Arc::new(MockEngine::new());
        engine.set_tx_behavior(TxBehavior::Hang);
        let store = TeamStore::new(
            Arc::clone(&engine) as Arc<dyn StorageEngine>,
            "12345",
            Timings::default(),
        );

        assert!(!store.is_connection_healthy().await);
    }
}
