//! Multi-team router
//!
//! Presents a single "current store" facade while managing N single-team
//! stores plus the master registry. The router exclusively owns which store
//! is active; stores are cached per team id for the process lifetime and
//! only their connections are released when teams switch.
//!
//! Constructed once at process start and passed by reference; teardown is
//! an explicit [`StoreRouter::shutdown`] that closes every cached
//! connection.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::config::{StoreConfig, Timings};
use crate::engine::StorageEngine;
use crate::engine::sqlite::SqliteEngine;
use crate::recruit::Recruit;
use crate::storage::registry::MasterRegistry;
use crate::storage::store::{ClearOutcome, TeamStore, meta};
use crate::team::{TeamInfo, TeamStats};
use crate::{Error, Result};

#[derive(Default)]
struct ActiveState {
    current: Option<String>,
    /// Last team ever activated; CRUD calls transparently reactivate it
    /// when nothing is currently active.
    remembered: Option<String>,
}

pub struct StoreRouter {
    engine: Arc<dyn StorageEngine>,
    timings: Timings,
    registry: MasterRegistry,
    stores: Mutex<HashMap<String, Arc<TeamStore>>>,
    active: Mutex<ActiveState>,
}

impl StoreRouter {
    pub fn new(engine: Arc<dyn StorageEngine>, timings: Timings) -> Self {
        let registry = MasterRegistry::new(Arc::clone(&engine), timings.clone());
        Self {
            engine,
            timings,
            registry,
            stores: Mutex::new(HashMap::new()),
            active: Mutex::new(ActiveState::default()),
        }
    }

    /// Router over the production SQLite engine in the configured data
    /// directory.
    pub fn open(config: &StoreConfig) -> Self {
        Self::new(
            Arc::new(SqliteEngine::new(&config.data_dir)),
            config.timings.clone(),
        )
    }

    pub fn registry(&self) -> &MasterRegistry {
        &self.registry
    }

    pub async fn active_team(&self) -> Option<String> {
        self.active.lock().await.current.clone()
    }

    /// Make `team_id` the active team: a no-op when it already is,
    /// otherwise close the previous store's connection, register the team
    /// (merging any partial info), and activate its cached-or-new store.
    pub async fn set_active_team(
        &self,
        team_id: &str,
        info: Option<&TeamInfo>,
    ) -> Result<Arc<TeamStore>> {
        let mut active = self.active.lock().await;

        if active.current.as_deref() == Some(team_id) {
            return Ok(self.store_for(team_id).await);
        }

        if let Some(previous) = active.current.take() {
            tracing::debug!(from = %previous, to = team_id, "switching active team");
            if let Some(store) = self.stores.lock().await.get(&previous).cloned() {
                store.close().await;
            }
        }

        self.registry.ensure_team_registered(team_id, info).await?;
        let store = self.store_for(team_id).await;
        active.current = Some(team_id.to_string());
        active.remembered = Some(team_id.to_string());
        Ok(store)
    }

    /// Release the active store's connection but keep the team remembered;
    /// the next CRUD call reactivates it transparently.
    pub async fn deactivate(&self) {
        let previous = {
            let mut active = self.active.lock().await;
            active.current.take()
        };
        if let Some(id) = previous {
            if let Some(store) = self.stores.lock().await.get(&id).cloned() {
                store.close().await;
            }
        }
    }

    /// Multi-team mode is permanently on; the toggle survives only for API
    /// compatibility.
    pub fn multi_team_enabled(&self) -> bool {
        true
    }

    /// Compatibility no-op; see [`StoreRouter::multi_team_enabled`].
    pub fn set_multi_team_mode(&self, _enabled: bool) -> bool {
        true
    }

    // ========== CRUD Facade ==========

    pub async fn save_recruit(&self, recruit: Recruit) -> Result<Recruit> {
        self.require_active().await?.save_recruit(recruit).await
    }

    pub async fn save_recruits(&self, recruits: Vec<Recruit>) -> Result<Vec<Recruit>> {
        self.require_active().await?.save_recruits(recruits).await
    }

    pub async fn get_all_recruits(&self) -> Result<Vec<Recruit>> {
        match self.active_store().await? {
            Some(store) => store.get_all_recruits().await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_recruit_by_id(&self, id: i64) -> Result<Option<Recruit>> {
        match self.active_store().await? {
            Some(store) => store.get_recruit_by_id(id).await,
            None => Ok(None),
        }
    }

    pub async fn recruits_by_position(&self, pos: &str) -> Result<Vec<Recruit>> {
        match self.active_store().await? {
            Some(store) => store.recruits_by_position(pos).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn clear_all_recruits(&self) -> Result<ClearOutcome> {
        self.require_active().await?.clear_all_recruits().await
    }

    pub async fn save_config(&self, key: &str, value: Value) -> Result<()> {
        self.require_active().await?.save_config(key, value).await
    }

    pub async fn get_config(&self, key: &str) -> Result<Option<Value>> {
        match self.active_store().await? {
            Some(store) => store.get_config(key).await,
            None => Ok(None),
        }
    }

    pub async fn save_team_metadata(&self, key: &str, value: Value) -> Result<()> {
        self.require_active().await?.save_team_metadata(key, value).await
    }

    pub async fn get_team_metadata(&self, key: &str) -> Result<Option<Value>> {
        match self.active_store().await? {
            Some(store) => store.get_team_metadata(key).await,
            None => Ok(None),
        }
    }

    // ========== Count Synchronization ==========

    /// Recompute and persist `recruitCount`/`watchlistCount` by scanning
    /// the active store.
    ///
    /// Not run automatically after `save_recruit`: bulk writers call this
    /// once at the end of an import or clear.
    pub async fn refresh_team_counts(&self) -> Result<(u64, u64)> {
        let store = self.require_active().await?;
        let recruits = store.get_all_recruits().await?;

        let total = recruits.len() as u64;
        let watched = recruits.iter().filter(|r| r.watched).count() as u64;

        store.save_team_metadata(meta::RECRUIT_COUNT, json!(total)).await?;
        store.save_team_metadata(meta::WATCHLIST_COUNT, json!(watched)).await?;
        store
            .save_team_metadata(meta::LAST_UPDATED, json!(Utc::now().to_rfc3339()))
            .await?;

        tracing::debug!(team = %store.team_id(), total, watched, "refreshed team counts");
        Ok((total, watched))
    }

    /// Read-only composite of the registry record, team metadata and live
    /// recruit counts for the active team.
    pub async fn get_team_stats(&self) -> Result<Option<TeamStats>> {
        let Some(store) = self.active_store().await? else {
            return Ok(None);
        };
        let Some(record) = self.registry.get_team_info(store.team_id()).await? else {
            return Ok(None);
        };

        let recruits = store.get_all_recruits().await?;
        let watchlist_count = recruits.iter().filter(|r| r.watched).count() as u64;

        Ok(Some(TeamStats {
            record,
            current_season: store.get_team_metadata(meta::CURRENT_SEASON).await?,
            last_updated: store.get_team_metadata(meta::LAST_UPDATED).await?,
            recruit_count: recruits.len() as u64,
            watchlist_count,
        }))
    }

    // ========== Lifecycle ==========

    /// Close every cached store connection and the registry. The router
    /// stays usable afterwards; connections reopen on demand, but no team
    /// is active or remembered.
    pub async fn shutdown(&self) {
        {
            let mut active = self.active.lock().await;
            active.current = None;
            active.remembered = None;
        }
        for store in self.stores.lock().await.values() {
            store.close().await;
        }
        self.registry.close().await;
        tracing::info!("storage router shut down");
    }

    // ========== Internals ==========

    async fn store_for(&self, team_id: &str) -> Arc<TeamStore> {
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(team_id) {
            return Arc::clone(store);
        }
        let store = Arc::new(TeamStore::new(
            Arc::clone(&self.engine),
            team_id,
            self.timings.clone(),
        ));
        stores.insert(team_id.to_string(), Arc::clone(&store));
        store
    }

    /// The active store, recovering the remembered team when nothing is
    /// currently active; `None` when no team was ever selected.
    async fn active_store(&self) -> Result<Option<Arc<TeamStore>>> {
        let (current, remembered) = {
            let active = self.active.lock().await;
            (active.current.clone(), active.remembered.clone())
        };

        if let Some(id) = current {
            return Ok(Some(self.store_for(&id).await));
        }

        match remembered {
            Some(id) => {
                tracing::debug!(team = %id, "no active team; recovering remembered team");
                Ok(Some(self.set_active_team(&id, None).await?))
            }
            None => Ok(None),
        }
    }

    async fn require_active(&self) -> Result<Arc<TeamStore>> {
        self.active_store().await?.ok_or(Error::NoActiveTeam)
    }
}
