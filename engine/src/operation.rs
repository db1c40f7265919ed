//! Pending operations buffered for replay against the remote authority.
//!
//! Local mutations are applied optimistically and, independently, recorded as
//! pending operations. The sync engine drains them in dispatch order:
//! highest priority first, then oldest first.

use crate::{error::Result, Error, PrincipalId, Priority, Record, RecordId, StoreId, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a pending operation.
pub type OperationId = String;

/// Kind of mutation a pending operation replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(Error::UnknownOperationKind(other.to_string())),
        }
    }
}

/// What to do with an operation after a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep it queued for a later pass
    Retry,
    /// Retry budget exhausted; remove it from the queue
    Drop,
}

/// A buffered mutation awaiting confirmation by the remote authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Operation ID
    pub id: OperationId,
    /// Principal that owns the mutated record
    pub principal_id: PrincipalId,
    /// Store holding the record
    pub store: StoreId,
    /// Record the mutation applies to
    pub record_id: RecordId,
    /// Kind of mutation
    pub kind: OperationKind,
    /// Record snapshot to send (absent for deletes)
    pub payload: Option<Record>,
    /// When the operation was enqueued (milliseconds since epoch)
    pub enqueued_at: Timestamp,
    /// Failed dispatch attempts so far
    pub attempts: u32,
    /// Dispatch priority, fixed per store
    pub priority: Priority,
}

impl PendingOperation {
    /// Create a fresh operation with zero attempts.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<OperationId>,
        principal_id: impl Into<PrincipalId>,
        store: StoreId,
        record_id: impl Into<RecordId>,
        kind: OperationKind,
        payload: Option<Record>,
        enqueued_at: Timestamp,
        priority: Priority,
    ) -> Self {
        Self {
            id: id.into(),
            principal_id: principal_id.into(),
            store,
            record_id: record_id.into(),
            kind,
            payload,
            enqueued_at,
            attempts: 0,
            priority,
        }
    }

    /// Count a failed dispatch and decide whether to keep the operation.
    ///
    /// `attempts` never decreases. Once it reaches `max_retries` the
    /// operation is dropped.
    pub fn register_failure(&mut self, max_retries: u32) -> RetryDecision {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= max_retries {
            RetryDecision::Drop
        } else {
            RetryDecision::Retry
        }
    }

    /// Compare two operations in dispatch order.
    ///
    /// Priority descending, then `enqueued_at` ascending, then id ascending
    /// so the order is total.
    pub fn dispatch_cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.enqueued_at.cmp(&other.enqueued_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Sort operations into dispatch order.
pub fn sort_for_dispatch(ops: &mut [PendingOperation]) {
    ops.sort_by(PendingOperation::dispatch_cmp);
}
