//! Connection manager
//!
//! Owns the single connection to one named, versioned database: caches the
//! open handle, serializes opens, retries refused opens with exponential
//! backoff, and bounds every attempt with a wall-clock deadline.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};

use crate::config::Timings;
use crate::engine::{DatabaseHandle, DatabaseSpec, StorageEngine};
use crate::{Error, Result};

pub struct ConnectionManager {
    engine: Arc<dyn StorageEngine>,
    spec: DatabaseSpec,
    timings: Timings,
    handle: Mutex<Option<Arc<dyn DatabaseHandle>>>,
}

impl ConnectionManager {
    pub fn new(engine: Arc<dyn StorageEngine>, spec: DatabaseSpec, timings: Timings) -> Self {
        Self {
            engine,
            spec,
            timings,
            handle: Mutex::new(None),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.spec.name
    }

    /// Return the cached handle if it is still open, otherwise open a new
    /// one.
    ///
    /// The cache slot's mutex is held across the open, so there is never
    /// more than one in-flight open per database: concurrent callers queue
    /// on the lock and then find the freshly cached handle.
    pub async fn ensure(&self) -> Result<Arc<dyn DatabaseHandle>> {
        let mut slot = self.handle.lock().await;

        if let Some(handle) = slot.as_ref() {
            if handle.is_open() {
                return Ok(Arc::clone(handle));
            }
            tracing::debug!(
                database = %self.spec.name,
                "cached connection was closed externally; reopening"
            );
            *slot = None;
        }

        let mut last_error: Option<Error> = None;
        for attempt in 1..=self.timings.open_attempts {
            if attempt > 1 {
                sleep(self.timings.open_backoff(attempt - 1)).await;
            }

            match timeout(self.timings.open_timeout(), self.engine.open(&self.spec)).await {
                Ok(Ok(handle)) => {
                    let handle: Arc<dyn DatabaseHandle> = Arc::from(handle);
                    *slot = Some(Arc::clone(&handle));
                    return Ok(handle);
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        database = %self.spec.name,
                        attempt,
                        error = %err,
                        "database open failed"
                    );
                    last_error = Some(err);
                }
                Err(_) => {
                    // No answer within the deadline, as opposed to a refused
                    // open. The in-flight future is dropped here, so a late
                    // completion can never install a stale handle.
                    return Err(Error::ConnectionTimeout {
                        database: self.spec.name.clone(),
                        timeout: self.timings.open_timeout(),
                    });
                }
            }
        }

        Err(Error::Connection {
            database: self.spec.name.clone(),
            attempts: self.timings.open_attempts,
            source: Box::new(
                last_error.unwrap_or_else(|| Error::Engine("open failed".to_string())),
            ),
        })
    }

    /// Discard the cached handle so the next `ensure` opens fresh. Used when
    /// a transaction reports the connection closing underneath it.
    pub async fn invalidate(&self) {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.take() {
            tracing::debug!(database = %self.spec.name, "discarding cached connection");
            handle.close().await;
        }
    }

    /// Release the connection if open; a no-op when already closed.
    pub async fn close(&self) {
        self.invalidate().await;
    }
}
