//! Queue - durable storage for operations awaiting replay.
//!
//! The queue holds every call that could not complete, keyed by its
//! [`OperationKey`], so the same logical operation is never stored twice.
//! Entries leave the queue only after a successful replay or an explicit
//! discard.

use serde::{Deserialize, Serialize};

use crate::storage::KeyValueStore;
use crate::transport::{Transport, TransportRequest};
use crate::{error::Result, Error, OperationKey, PendingOperation};

/// Prefix under which pending operations are stored.
pub const PENDING_PREFIX: &str = "pending:";

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Entries the pass attempted
    pub attempted: usize,
    /// Entries delivered and removed from the queue
    pub replayed: usize,
    /// Entries that failed and stay queued
    pub failed: usize,
    /// Entries that could not be read and were left untouched
    pub skipped: usize,
}

/// The durable queue of pending operations.
#[derive(Debug)]
pub struct QueueStore<S> {
    store: S,
    /// Held for the duration of a replay pass.
    replay_gate: tokio::sync::Mutex<()>,
}

fn storage_key(key: &OperationKey) -> String {
    format!("{PENDING_PREFIX}{key}")
}

impl<S: KeyValueStore> QueueStore<S> {
    /// Create a queue over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            replay_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert or overwrite the entry for `op.key`.
    pub async fn enqueue(&self, op: &PendingOperation) -> Result<()> {
        let json = serde_json::to_string(op)?;
        self.store.set(&storage_key(&op.key), json).await?;
        tracing::debug!(key = %op.key, target = %op.target, "operation queued");
        Ok(())
    }

    /// Remove the entry for `key`. Absent keys are ignored.
    pub async fn dequeue(&self, key: &OperationKey) -> Result<()> {
        self.store.delete(&storage_key(key)).await
    }

    /// Read the entry for `key`.
    pub async fn get(&self, key: &OperationKey) -> Result<Option<PendingOperation>> {
        match self.store.get(&storage_key(key)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Snapshot of every pending entry, oldest first.
    ///
    /// Entries that cannot be decoded are logged and left out.
    pub async fn list(&self) -> Result<Vec<PendingOperation>> {
        let mut ops = Vec::new();

        for storage_key in self.pending_keys().await? {
            match self.read(&storage_key).await {
                Ok(Some(op)) => ops.push(op),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %storage_key, error = %e, "skipping unreadable queue entry")
                }
            }
        }

        ops.sort_by(|a, b| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(ops)
    }

    /// Number of pending entries.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.pending_keys().await?.len())
    }

    /// Whether nothing is pending.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Attempt every pending entry once through `transport`.
    ///
    /// Delivered entries are removed unless they were re-queued while being
    /// delivered; failed ones stay for the next pass. A
    /// failure never stops the pass. Returns `None` without doing anything if
    /// another pass is already running on this queue.
    pub async fn replay_all<T: Transport + ?Sized>(
        &self,
        transport: &T,
    ) -> Result<Option<ReplayReport>> {
        let Ok(_pass) = self.replay_gate.try_lock() else {
            tracing::debug!("replay pass already running");
            return Ok(None);
        };

        let mut report = ReplayReport::default();

        for storage_key in self.pending_keys().await? {
            let op = match self.read(&storage_key).await {
                Ok(Some(op)) => op,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(key = %storage_key, error = %e, "skipping unreadable queue entry");
                    report.skipped += 1;
                    continue;
                }
            };

            report.attempted += 1;
            let request = TransportRequest::from(&op.options());

            match transport.call(&op.target, &request).await {
                Ok(response) if response.is_success() => match self.remove_delivered(&storage_key, &op).await {
                    Ok(()) => {
                        report.replayed += 1;
                        tracing::debug!(key = %op.key, target = %op.target, "replayed queued operation");
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::error!(key = %op.key, error = %e, "replayed but could not dequeue");
                    }
                },
                Ok(response) => {
                    report.failed += 1;
                    tracing::debug!(
                        key = %op.key,
                        status = response.status,
                        "replay rejected, keeping entry"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::debug!(key = %op.key, error = %e, "replay failed, keeping entry");
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            replayed = report.replayed,
            failed = report.failed,
            skipped = report.skipped,
            "replay pass finished"
        );

        Ok(Some(report))
    }

    /// Remove a delivered entry unless it was re-queued while in flight.
    ///
    /// The check and the delete are two store operations; a re-queue landing
    /// between them is still lost.
    async fn remove_delivered(&self, storage_key: &str, delivered: &PendingOperation) -> Result<()> {
        match self.read(storage_key).await? {
            Some(current) if current != *delivered => {
                tracing::debug!(key = %delivered.key, "re-queued during replay, keeping newer entry");
                Ok(())
            }
            _ => self.store.delete(storage_key).await,
        }
    }

    async fn pending_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|k| k.starts_with(PENDING_PREFIX))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn read(&self, storage_key: &str) -> Result<Option<PendingOperation>> {
        let Some(json) = self.store.get(storage_key).await? else {
            return Ok(None);
        };
        let op: PendingOperation = serde_json::from_str(&json)?;
        if storage_key.strip_prefix(PENDING_PREFIX) != Some(op.key.as_str()) {
            return Err(Error::Storage(format!(
                "entry {storage_key} holds operation {}",
                op.key
            )));
        }
        Ok(Some(op))
    }
}
