//! Connectivity tracking.
//!
//! The [`ConnectivityMonitor`] holds the last known [`ConnectionState`]. It is
//! fed either by the host's own online/offline signal or by a
//! [`ConnectivityProbe`] polling a health endpoint.

mod monitor;
mod probe;

pub use monitor::ConnectivityMonitor;
pub use probe::{next_state, ConnectivityProbe, ProbeConfig, DEFAULT_FAILURES_BEFORE_OFFLINE};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reachability of the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Online,
    Offline,
    /// A check failed while online; not yet confirmed offline
    Reconnecting,
}

impl ConnectionState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionState::Online)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Online => "online",
            ConnectionState::Offline => "offline",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

impl From<bool> for ConnectionState {
    fn from(online: bool) -> Self {
        if online {
            ConnectionState::Online
        } else {
            ConnectionState::Offline
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
