//! Conflict resolution between a local update and the remote record.
//!
//! Each store is configured with a [`ConflictPolicy`]. Under
//! [`ConflictPolicy::ServerWins`] the last-modified timestamps of both sides
//! decide; under [`ConflictPolicy::ClientWins`] the local write always lands.

use crate::{Record, Timestamp};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-store conflict policy for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Local update always overwrites the remote record (default)
    #[default]
    ClientWins,
    /// Remote record wins when it was modified more recently
    ServerWins,
}

/// Outcome of resolving a local update against the remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    /// Write the local record over the remote one
    WriteLocal,
    /// Remote is newer; the local update is considered satisfied
    KeepRemote,
}

/// Decide whether a local update should be written.
///
/// `remote` is the current remote record in local field naming, or `None`
/// when the remote authority has no such record. Missing or unparseable
/// timestamps count as epoch zero, and equal timestamps favour local.
pub fn resolve(
    policy: ConflictPolicy,
    local: &Record,
    remote: Option<&Record>,
    last_modified_field: &str,
) -> Resolution {
    match (policy, remote) {
        (ConflictPolicy::ClientWins, _) => Resolution::WriteLocal,
        (ConflictPolicy::ServerWins, None) => Resolution::WriteLocal,
        (ConflictPolicy::ServerWins, Some(remote)) => {
            let local_ts = last_modified(local, last_modified_field);
            let remote_ts = last_modified(remote, last_modified_field);
            if remote_ts > local_ts {
                Resolution::KeepRemote
            } else {
                Resolution::WriteLocal
            }
        }
    }
}

/// Read a record's last-modified time in milliseconds since epoch.
pub fn last_modified(record: &Record, field: &str) -> Timestamp {
    record.get(field).and_then(parse_timestamp).unwrap_or(0)
}

/// Parse a timestamp stored as epoch milliseconds or an RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|dt| u64::try_from(dt.timestamp_millis()).ok())
            .or_else(|| s.parse::<u64>().ok()),
        _ => None,
    }
}
