//! Client - the single entry point for remote calls.
//!
//! [`Client::request`] composes the pieces of the engine:
//!
//! ```text
//! request ──► offline? ──yes──► queue ──► {success:false, queued}
//!                │
//!                no
//!                ▼
//!            dedup ──► retry ──► transport
//!                │
//!        ok ◄────┴────► exhausted ──► queue (if enabled) or error
//! ```
//!
//! Queued operations are replayed when connectivity comes back, without
//! involving the original caller.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connectivity::{
    ConnectivityMonitor, ConnectivityProbe, ConnectivityState, Transition, MIN_PROBE_INTERVAL,
};
use crate::dedup::Deduplicator;
use crate::queue::{QueueStore, ReplayReport};
use crate::retry::{with_retry, RetryError, RetryPolicy};
use crate::storage::KeyValueStore;
use crate::transport::{Transport, TransportRequest, TransportResponse};
use crate::{error::Result, CallResult, Error, OperationKey, PendingOperation, RequestOptions};

/// Settings fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backoff for calls made through [`Client::request`]
    pub retry: RetryPolicy,
    /// Queue offline and exhausted calls for replay
    pub offline_storage: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            offline_storage: true,
        }
    }
}

/// How one execution ended, shared by every caller joined on it.
#[derive(Debug, Clone)]
enum Settled {
    Delivered(TransportResponse),
    Failed { error: Error, queued: bool },
}

struct Inner<T, S> {
    transport: Arc<T>,
    queue: QueueStore<S>,
    dedup: Deduplicator<Settled>,
    connectivity: ConnectivityMonitor,
    config: ClientConfig,
}

/// The resilient remote-call client.
///
/// Cheap to clone; clones share the queue, the in-flight table and the
/// connectivity state.
pub struct Client<T, S> {
    inner: Arc<Inner<T, S>>,
}

impl<T, S> Clone for Client<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport, S: KeyValueStore> Client<T, S> {
    /// Create a client from its collaborators.
    pub fn new(
        transport: T,
        store: S,
        connectivity: ConnectivityMonitor,
        config: ClientConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Arc::new(transport),
                queue: QueueStore::new(store),
                dedup: Deduplicator::new(),
                connectivity,
                config,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    pub fn queue(&self) -> &QueueStore<S> {
        &self.inner.queue
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    /// Number of calls currently executing.
    pub fn in_flight(&self) -> usize {
        self.inner.dedup.in_flight()
    }

    /// Make a remote call. Never fails; see [`CallResult`].
    pub async fn request<R: DeserializeOwned>(
        &self,
        target: &str,
        options: RequestOptions,
    ) -> CallResult<R> {
        self.request_with_cancel(target, options, CancellationToken::new())
            .await
    }

    /// Make a remote call that stops retrying once `cancel` fires.
    ///
    /// Callers that join an execution already in flight share its outcome,
    /// including a cancellation by the caller that started it. Dropping the
    /// returned future does not stop the call; only `cancel` does.
    pub async fn request_with_cancel<R: DeserializeOwned>(
        &self,
        target: &str,
        options: RequestOptions,
        cancel: CancellationToken,
    ) -> CallResult<R> {
        let offline_storage = self.inner.config.offline_storage;

        if offline_storage && !self.inner.connectivity.is_online() {
            tracing::debug!(target = %target, "offline, queueing without attempt");
            return match self.park(target, &options).await {
                Ok(()) => CallResult::queued(),
                Err(e) => CallResult::failed(e.to_string()),
            };
        }

        let key = options.key_for(target);
        let executor = {
            let client = self.clone();
            let target = target.to_string();
            async move { client.execute(&target, &options, &cancel).await }
        };

        match self.inner.dedup.run(key, executor).await {
            Some(Settled::Delivered(response)) => decode(&response),
            Some(Settled::Failed {
                error: Error::Cancelled,
                ..
            })
            | None => CallResult::failed(Error::Cancelled.to_string()),
            Some(Settled::Failed { error, queued }) => {
                let message = error.remote_message().map(str::to_string);
                let result = if queued {
                    CallResult::queued_after(error.to_string())
                } else {
                    CallResult::failed(error.to_string())
                };
                result.with_message(message)
            }
        }
    }

    /// Retry the call to the end and queue it if it never got through.
    ///
    /// Runs on the deduplicator's task, detached from every caller.
    async fn execute(
        &self,
        target: &str,
        options: &RequestOptions,
        cancel: &CancellationToken,
    ) -> Settled {
        let transport = self.inner.transport.as_ref();
        let request = TransportRequest::from(options);

        let retried = with_retry(&self.inner.config.retry, cancel, |_| {
            call_once(transport, target, &request)
        })
        .await;

        let error = match retried {
            Ok(response) => return Settled::Delivered(response),
            Err(RetryError::Cancelled) => {
                return Settled::Failed {
                    error: Error::Cancelled,
                    queued: false,
                }
            }
            Err(RetryError::Exhausted { last, .. }) => last,
        };

        let queued = self.inner.config.offline_storage && self.park(target, options).await.is_ok();
        Settled::Failed { error, queued }
    }

    async fn park(&self, target: &str, options: &RequestOptions) -> Result<()> {
        let op = PendingOperation::new(target, options, chrono::Utc::now());
        self.inner.queue.enqueue(&op).await.inspect_err(|e| {
            tracing::error!(key = %op.key, error = %e, "failed to queue operation");
        })
    }

    /// Every operation waiting for replay, oldest first.
    pub async fn pending(&self) -> Result<Vec<PendingOperation>> {
        self.inner.queue.list().await
    }

    /// Drop a queued operation without replaying it.
    pub async fn discard(&self, key: &OperationKey) -> Result<()> {
        self.inner.queue.dequeue(key).await?;
        tracing::info!(key = %key, "discarded queued operation");
        Ok(())
    }

    /// Run one replay pass now. `None` if a pass is already running.
    pub async fn replay_pending(&self) -> Result<Option<ReplayReport>> {
        self.inner
            .queue
            .replay_all(self.inner.transport.as_ref())
            .await
    }

    /// Record a connectivity observation.
    ///
    /// Going from offline to online starts exactly one replay pass in the
    /// background and returns its handle. Must be called within a Tokio
    /// runtime.
    pub fn set_connectivity(
        &self,
        state: ConnectivityState,
    ) -> Option<JoinHandle<Result<Option<ReplayReport>>>> {
        match self.inner.connectivity.set_state(state)? {
            Transition::WentOnline => {
                let client = self.clone();
                Some(tokio::spawn(async move { client.replay_pending().await }))
            }
            Transition::WentOffline => None,
        }
    }

    /// Poll `probe` every `interval` (at least [`MIN_PROBE_INTERVAL`]) and
    /// feed each result to [`set_connectivity`](Self::set_connectivity),
    /// until `cancel` fires.
    ///
    /// If the first check finds the remote reachable while the client
    /// already counts as online, one replay pass starts anyway so entries
    /// queued by an earlier run are not left waiting for a reconnect.
    pub async fn watch_probe<P: ConnectivityProbe + ?Sized>(
        &self,
        probe: &P,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval.max(MIN_PROBE_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut first_check = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let online = tokio::select! {
                _ = cancel.cancelled() => break,
                online = probe.check() => online,
            };
            let replay = self.set_connectivity(ConnectivityState::from_online(online));
            if first_check && online && replay.is_none() {
                tracing::debug!("reachable at startup, replaying leftover queue");
                let client = self.clone();
                tokio::spawn(async move { client.replay_pending().await });
            }
            first_check = false;
        }

        tracing::debug!("connectivity probe stopped");
    }
}

/// One transport exchange, with non-2xx statuses turned into errors.
async fn call_once<T: Transport + ?Sized>(
    transport: &T,
    target: &str,
    request: &TransportRequest,
) -> Result<TransportResponse> {
    let response = transport.call(target, request).await?;
    if !response.is_success() {
        return Err(Error::Status {
            status: response.status,
            message: response.error_message(),
        });
    }
    Ok(response)
}

fn decode<R: DeserializeOwned>(response: &TransportResponse) -> CallResult<R> {
    match response.body_json().and_then(serde_json::from_value) {
        Ok(data) => CallResult::ok(data),
        Err(e) => CallResult::failed(format!("invalid response body: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::TransportResult;
    use futures::future::BoxFuture;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FixedTransport {
        status: u16,
        body: Value,
        calls: AtomicUsize,
    }

    impl Transport for FixedTransport {
        fn call<'a>(
            &'a self,
            _target: &'a str,
            _request: &'a TransportRequest,
        ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(TransportResponse::json(self.status, &self.body))
            })
        }
    }

    fn client(status: u16, body: Value, config: ClientConfig) -> Client<FixedTransport, MemoryStore> {
        Client::new(
            FixedTransport {
                status,
                body,
                calls: AtomicUsize::new(0),
            },
            MemoryStore::new(),
            ConnectivityMonitor::default(),
            config,
        )
    }

    fn fast() -> ClientConfig {
        ClientConfig {
            retry: RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(4)),
            offline_storage: true,
        }
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct Shift {
        id: u32,
    }

    #[tokio::test]
    async fn decodes_typed_body() {
        let client = client(200, json!({"id": 3}), fast());
        let result: CallResult<Shift> = client.request("/shift", RequestOptions::get()).await;
        assert!(result.success);
        assert_eq!(result.into_value(), Some(Shift { id: 3 }));
    }

    #[tokio::test]
    async fn undecodable_body_is_surfaced_not_queued() {
        let client = client(200, json!({"unexpected": true}), fast());
        let result: CallResult<Shift> = client.request("/shift", RequestOptions::get()).await;

        assert!(!result.success);
        assert!(!result.is_queued());
        assert!(result.error.unwrap().starts_with("invalid response body"));
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 1);
        assert!(client.pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn non_2xx_is_retried_then_queued_with_message() {
        let client = client(422, json!({"message": "shift already open"}), fast());
        let result: CallResult<Value> = client
            .request("/attendance/clock-in", RequestOptions::post(json!({"employeeId": "E1"})))
            .await;

        assert!(result.is_queued());
        assert_eq!(result.error.as_deref(), Some("remote returned status 422"));
        assert_eq!(result.message.as_deref(), Some("shift already open"));
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.pending().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_without_storage_surfaces_error() {
        let config = ClientConfig {
            offline_storage: false,
            ..fast()
        };
        let client = client(503, json!({}), config);
        let result: CallResult<Value> = client.request("/inventory", RequestOptions::get()).await;

        assert!(!result.success);
        assert!(!result.is_queued());
        assert_eq!(result.error.as_deref(), Some("remote returned status 503"));
        assert!(client.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_without_storage_still_attempts() {
        let config = ClientConfig {
            offline_storage: false,
            ..fast()
        };
        let client = client(200, json!([]), config);
        client.set_connectivity(ConnectivityState::Offline);

        let result: CallResult<Value> = client.request("/inventory", RequestOptions::get()).await;
        assert!(result.success);
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_call_is_not_queued() {
        let config = ClientConfig {
            retry: RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(10)),
            offline_storage: true,
        };
        let client = client(500, json!({}), config);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result: CallResult<Value> = client
            .request_with_cancel("/leads", RequestOptions::post(json!({})), cancel)
            .await;

        assert_eq!(result.error.as_deref(), Some("request cancelled"));
        assert!(!result.is_queued());
        assert!(client.pending().await.unwrap().is_empty());
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn going_online_replays_once() {
        let client = client(200, json!({}), fast());
        assert!(client.set_connectivity(ConnectivityState::Offline).is_none());

        let queued: CallResult<Value> = client
            .request("/leads", RequestOptions::post(json!({"name": "Ada"})))
            .await;
        assert!(queued.is_queued());
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 0);

        let handle = client
            .set_connectivity(ConnectivityState::Online)
            .expect("replay started");
        let report = handle.await.unwrap().unwrap().unwrap();
        assert_eq!(report.replayed, 1);
        assert!(client.pending().await.unwrap().is_empty());

        assert!(client.set_connectivity(ConnectivityState::Online).is_none());
    }

    struct FlagProbe {
        online: AtomicBool,
        checks: AtomicUsize,
    }

    impl ConnectivityProbe for FlagProbe {
        fn check(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move {
                self.checks.fetch_add(1, Ordering::SeqCst);
                self.online.load(Ordering::SeqCst)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn probe_drives_state_and_respects_minimum_interval() {
        let client = client(200, json!({}), fast());
        let probe = Arc::new(FlagProbe {
            online: AtomicBool::new(false),
            checks: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();

        let task = {
            let client = client.clone();
            let probe = probe.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                client
                    .watch_probe(probe.as_ref(), Duration::from_millis(10), cancel)
                    .await
            })
        };

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(client.connectivity().state(), ConnectivityState::Offline);
        assert_eq!(probe.checks.load(Ordering::SeqCst), 1);

        probe.online.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(probe.checks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(probe.checks.load(Ordering::SeqCst), 2);
        assert_eq!(client.connectivity().state(), ConnectivityState::Online);

        cancel.cancel();
        task.await.unwrap();
    }
}
