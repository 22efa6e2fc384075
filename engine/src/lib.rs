//! # Tether Engine
//!
//! A resilient remote-call client for applications on unreliable networks.
//!
//! Every remote call goes through one non-failing entry point,
//! [`Client::request`], which resolves to a [`CallResult`] whatever happens
//! on the wire.
//!
//! ## Design Principles
//!
//! - **No concrete IO**: network, storage and connectivity signals are traits
//!   supplied by the host
//! - **Never fails**: errors are folded into [`CallResult`], never returned
//!   or panicked
//! - **Explicit instance**: a [`Client`] is constructed with its collaborators
//!   and passed around; there is no global
//!
//! ## Core Concepts
//!
//! ### Operation identity
//!
//! A call is identified by its [`OperationKey`], a SHA-256 digest of the
//! method, the target and the canonical JSON body. Equal keys are the same
//! logical operation.
//!
//! ### Deduplication
//!
//! The [`Deduplicator`] lets concurrent calls with the same key share a
//! single execution and its outcome.
//!
//! ### Retry
//!
//! [`with_retry`] runs an operation with bounded exponential backoff
//! (`min(base * 2^n, max)`, optionally jittered) and honours a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! ### Offline queue
//!
//! Calls made while offline, or whose retries run out, are stored as
//! [`PendingOperation`]s in a [`QueueStore`] over any [`KeyValueStore`].
//! When the [`ConnectivityMonitor`] sees the network come back, one replay
//! pass attempts every entry exactly once.
//!
//! ## Quick Start
//!
//! ```rust
//! use futures::future::BoxFuture;
//! use serde_json::{json, Value};
//! use tether_engine::{
//!     CallResult, Client, ClientConfig, ConnectivityMonitor, MemoryStore, RequestOptions,
//!     Transport, TransportRequest, TransportResponse, TransportResult,
//! };
//!
//! struct Echo;
//!
//! impl Transport for Echo {
//!     fn call<'a>(
//!         &'a self,
//!         _target: &'a str,
//!         request: &'a TransportRequest,
//!     ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
//!         let body = request.body.clone().unwrap_or(Value::Null);
//!         Box::pin(async move { Ok(TransportResponse::json(200, &body)) })
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let client = Client::new(
//!     Echo,
//!     MemoryStore::new(),
//!     ConnectivityMonitor::default(),
//!     ClientConfig::default(),
//! );
//!
//! let result: CallResult<Value> = client
//!     .request("/leads", RequestOptions::post(json!({"name": "Ada"})))
//!     .await;
//! assert!(result.success);
//! assert_eq!(result.value(), Some(&json!({"name": "Ada"})));
//! # });
//! ```
//!
//! ## Persistence
//!
//! [`MemoryStore`] keeps the queue for the lifetime of the process,
//! [`FileStore`] keeps it in a single JSON document on disk. Hosts may bring
//! their own [`KeyValueStore`].

pub mod api;
pub mod client;
pub mod connectivity;
pub mod dedup;
pub mod error;
pub mod key;
pub mod operation;
pub mod queue;
pub mod result;
pub mod retry;
pub mod storage;
pub mod transport;

// Re-export main types at crate root
pub use api::{InventoryItem, Lead};
pub use client::{Client, ClientConfig};
pub use connectivity::{
    ConnectivityMonitor, ConnectivityProbe, ConnectivityState, Transition, MIN_PROBE_INTERVAL,
};
pub use dedup::Deduplicator;
pub use error::Error;
pub use key::OperationKey;
pub use operation::{Method, PendingOperation, RequestOptions};
pub use queue::{QueueStore, ReplayReport, PENDING_PREFIX};
pub use result::{CallData, CallResult, QueuedMarker};
pub use retry::{with_retry, RetryError, RetryPolicy};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StoreFile, FILE_FORMAT_VERSION};
pub use transport::{
    Transport, TransportError, TransportRequest, TransportResponse, TransportResult,
};

/// Wall-clock instant in UTC
pub type Timestamp = chrono::DateTime<chrono::Utc>;
