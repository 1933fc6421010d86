//! Transaction executor
//!
//! Runs a unit of work against named collections under a connection,
//! bounding its duration and retrying transient failures. The executor
//! holds no state of its own beyond the shared connection manager.

use std::sync::Arc;

use tokio::time::{sleep, timeout};

use crate::config::Timings;
use crate::engine::{TransactionHandle, TxMode};
use crate::storage::conn::ConnectionManager;
use crate::{Error, Result};

pub struct TransactionExecutor {
    conn: Arc<ConnectionManager>,
    timings: Timings,
}

impl TransactionExecutor {
    pub fn new(conn: Arc<ConnectionManager>, timings: Timings) -> Self {
        Self { conn, timings }
    }

    /// Run `op` inside a transaction scoped to `collections`, with the
    /// generic bounded-retry policy:
    ///
    /// - each attempt has a wall-clock deadline ([`Timings::tx_timeout`])
    /// - transient engine failures retry up to [`Timings::tx_retries`] more
    ///   times with linear backoff
    /// - a failure that reports the connection closing discards the cached
    ///   connection first, so the retry opens fresh
    /// - domain errors from `op` abort the transaction and surface
    ///   immediately, unretried
    ///
    /// After exhaustion, a final timeout propagates as
    /// [`Error::TransactionTimeout`]; any other last cause is wrapped in
    /// [`Error::TransactionFailed`].
    pub async fn run<T, F>(&self, collections: &[&str], mode: TxMode, op: F) -> Result<T>
    where
        F: Fn(&mut dyn TransactionHandle) -> Result<T> + Send + Sync,
        T: Send,
    {
        let attempts = 1 + self.timings.tx_retries;
        let mut last_error: Option<Error> = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(self.timings.tx_backoff(attempt - 1)).await;
            }

            match self.run_once(collections, mode, &op).await {
                Ok(value) => return Ok(value),
                Err(err @ Error::TransactionTimeout { .. }) => {
                    tracing::warn!(
                        database = %self.conn.database_name(),
                        attempt,
                        "transaction attempt timed out"
                    );
                    last_error = Some(err);
                }
                Err(err) if err.is_retryable() => {
                    if err.is_connection_lost() {
                        tracing::warn!(
                            database = %self.conn.database_name(),
                            attempt,
                            error = %err,
                            "connection reported closed; discarding before retry"
                        );
                        self.conn.invalidate().await;
                    } else {
                        tracing::warn!(
                            database = %self.conn.database_name(),
                            attempt,
                            error = %err,
                            "transaction attempt failed"
                        );
                    }
                    last_error = Some(err);
                }
                // Aborts, domain errors and connection-open exhaustion
                // surface unchanged.
                Err(err) => return Err(err),
            }
        }

        match last_error.expect("at least one attempt ran") {
            err @ Error::TransactionTimeout { .. } => Err(err),
            err => Err(Error::TransactionFailed {
                attempts,
                source: Box::new(err),
            }),
        }
    }

    /// One bounded attempt, no retry. The recruit bulk clear drives its own
    /// reopen-between-attempts loop on top of this.
    pub(crate) async fn run_once<T, F>(&self, collections: &[&str], mode: TxMode, op: F) -> Result<T>
    where
        F: Fn(&mut dyn TransactionHandle) -> Result<T> + Send + Sync,
        T: Send,
    {
        let handle = self.conn.ensure().await?;

        let work = async {
            let mut tx = handle.begin(collections, mode).await?;
            match op(tx.as_mut()) {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(abort_err) = tx.abort().await {
                        tracing::debug!(error = %abort_err, "transaction abort failed");
                    }
                    Err(err)
                }
            }
        };

        // The race abandons a stuck transaction; dropping it rolls back and
        // releases the connection, so a late completion cannot touch state
        // the retry has moved past.
        match timeout(self.timings.tx_timeout(), work).await {
            Ok(result) => result,
            Err(_) => Err(Error::TransactionTimeout {
                timeout: self.timings.tx_timeout(),
            }),
        }
    }
}
