//! Connectivity tracking.
//!
//! The [`ConnectivityMonitor`] caches the last observed [`ConnectivityState`]
//! and broadcasts changes over a `watch` channel. Observations come from the
//! host platform, or from a polling [`ConnectivityProbe`] driven by
//! [`Client::watch_probe`](crate::Client::watch_probe).

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Shortest allowed interval between probe checks.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_secs(2);

/// Whether the remote side is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn from_online(online: bool) -> Self {
        if online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// A change of [`ConnectivityState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

/// Polling substitute for platform connectivity signals.
pub trait ConnectivityProbe: Send + Sync {
    /// Check once whether the remote side is reachable.
    fn check(&self) -> BoxFuture<'_, bool>;
}

/// Owns the current [`ConnectivityState`].
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectivityState>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

impl ConnectivityMonitor {
    /// Create a monitor starting in `initial`.
    pub fn new(initial: ConnectivityState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// The last observed state.
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Record an observation. Returns the transition if the state changed.
    pub fn set_state(&self, next: ConnectivityState) -> Option<Transition> {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if !changed {
            return None;
        }

        tracing::info!(state = %next, "connectivity changed");
        Some(match next {
            ConnectivityState::Online => Transition::WentOnline,
            ConnectivityState::Offline => Transition::WentOffline,
        })
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }
}
