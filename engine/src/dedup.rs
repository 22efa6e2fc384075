//! In-flight deduplication.
//!
//! Concurrent calls for the same [`OperationKey`] share one execution. The
//! first caller registers the execution; later callers join it and receive a
//! clone of its outcome.
//!
//! Each execution runs on its own Tokio task, so it carries on to the end
//! even if every caller stops waiting. The entry is removed by that task
//! before any waiter sees the outcome, so a call made after settlement
//! always starts fresh.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::OperationKey;

struct InFlight<T> {
    /// Distinguishes this execution from a later one under the same key.
    id: u64,
    outcome: Shared<BoxFuture<'static, Option<T>>>,
}

/// Clears the entry of one execution when its task ends, however it ends.
struct Settle<T> {
    entries: Arc<DashMap<OperationKey, InFlight<T>>>,
    key: OperationKey,
    id: u64,
}

impl<T> Drop for Settle<T> {
    fn drop(&mut self) {
        self.entries
            .remove_if(&self.key, |_, in_flight| in_flight.id == self.id);
    }
}

/// Coalesces concurrent executions per key.
///
/// Thread-safe and can be shared across tasks via `Arc`.
pub struct Deduplicator<T> {
    entries: Arc<DashMap<OperationKey, InFlight<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for Deduplicator<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> std::fmt::Debug for Deduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduplicator")
            .field("in_flight", &self.entries.len())
            .finish()
    }
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `executor` for `key`, or join the execution already in flight.
    ///
    /// `executor` is dropped unpolled when joining. Returns `None` if the
    /// execution panicked or its runtime shut down. Must be called within a
    /// Tokio runtime.
    pub async fn run<F>(&self, key: OperationKey, executor: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let outcome = match self.entries.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(key = %key, "joining in-flight call");
                entry.get().outcome.clone()
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let settle = Settle {
                    entries: Arc::clone(&self.entries),
                    key: key.clone(),
                    id,
                };

                // Settling takes this shard's lock, so it cannot run before the insert below.
                let task = tokio::spawn(async move {
                    let _settle = settle;
                    executor.await
                });
                let shared = async move { task.await.ok() }.boxed().shared();

                entry.insert(InFlight {
                    id,
                    outcome: shared.clone(),
                });
                shared
            }
        };

        outcome.await
    }

    /// Number of executions currently in flight.
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }

    /// Whether an execution for `key` is in flight.
    pub fn is_in_flight(&self, key: &OperationKey) -> bool {
        self.entries.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    fn key(name: &str) -> OperationKey {
        OperationKey::from_raw(name)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let dedup = Arc::new(Deduplicator::<Result<u32, String>>::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<()>();
        let gate = Arc::new(tokio::sync::Mutex::new(Some(gate)));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let dedup = dedup.clone();
            let executions = executions.clone();
            let gate = gate.clone();
            handles.push(tokio::spawn(async move {
                dedup
                    .run(key("k"), async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        if let Some(gate) = gate.lock().await.take() {
                            let _ = gate.await;
                        }
                        Ok(7)
                    })
                    .await
            }));
        }

        while dedup.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        release.send(()).unwrap();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(Ok(7)));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn failure_is_shared_and_cleared() {
        let dedup = Deduplicator::<Result<(), String>>::new();
        let (a, b) = tokio::join!(
            dedup.run(key("k"), async {
                tokio::task::yield_now().await;
                Err("boom".to_string())
            }),
            dedup.run(key("k"), async { Ok(()) }),
        );

        assert_eq!(a, Some(Err("boom".to_string())));
        assert_eq!(b, Some(Err("boom".to_string())));
        assert!(!dedup.is_in_flight(&key("k")));
    }

    #[tokio::test]
    async fn settled_key_starts_fresh() {
        let dedup = Deduplicator::<u32>::new();
        assert_eq!(dedup.run(key("k"), async { 1 }).await, Some(1));
        assert_eq!(dedup.run(key("k"), async { 2 }).await, Some(2));
    }

    #[tokio::test]
    async fn different_keys_run_independently() {
        let dedup = Deduplicator::<&'static str>::new();
        let (a, b) = tokio::join!(
            dedup.run(key("a"), async { "a" }),
            dedup.run(key("b"), async { "b" }),
        );
        assert_eq!((a, b), (Some("a"), Some("b")));
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_strand_others() {
        let dedup = Arc::new(Deduplicator::<u32>::new());
        let (release, gate) = oneshot::channel::<()>();

        let first = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .run(key("k"), async move {
                        let _ = gate.await;
                        9
                    })
                    .await
            })
        };
        while dedup.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let second = {
            let dedup = dedup.clone();
            tokio::spawn(async move { dedup.run(key("k"), async { 0 }).await })
        };
        tokio::task::yield_now().await;

        first.abort();
        let _ = first.await;
        release.send(()).unwrap();

        assert_eq!(second.await.unwrap(), Some(9));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn execution_outlives_its_only_caller() {
        let dedup = Arc::new(Deduplicator::<u32>::new());
        let (release, gate) = oneshot::channel::<()>();
        let (done_tx, done) = oneshot::channel::<u32>();

        let caller = {
            let dedup = dedup.clone();
            tokio::spawn(async move {
                dedup
                    .run(key("k"), async move {
                        let _ = gate.await;
                        let _ = done_tx.send(5);
                        5
                    })
                    .await
            })
        };
        while dedup.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        assert!(dedup.is_in_flight(&key("k")));

        release.send(()).unwrap();
        assert_eq!(done.await.unwrap(), 5);
        while dedup.in_flight() > 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(dedup.run(key("k"), async { 6 }).await, Some(6));
    }

    #[tokio::test]
    async fn panicking_execution_is_cleared() {
        let dedup = Deduplicator::<u32>::new();
        let outcome = dedup
            .run(key("k"), async { panic!("executor failed") })
            .await;

        assert_eq!(outcome, None);
        assert_eq!(dedup.in_flight(), 0);
    }
}
