//! The pending operation queue.
//!
//! Buffered mutations live in the reserved `pending_operations` table of the
//! local store's database. Entries leave the queue exactly once: when the
//! remote authority confirms them, or when their retry budget runs out and
//! they move to the `failed_operations` dead-letter table.

use crate::db;
use crate::error::{RemoteError, Result, StoreError};
use crate::store::{new_record_id, require_id, LocalStore};
use std::sync::{Arc, PoisonError, RwLock};
use stride_engine::{
    OperationKind, PendingOperation, Priority, Record, RecordId, RetryDecision,
    StoreId, StoreTable, SyncOptions, Timestamp,
};

/// A local mutation to apply and track in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert a new record; an id is assigned if missing
    Create(Record),
    /// Insert or replace a record by id
    Update(Record),
    /// Remove a record by id
    Delete(RecordId),
}

impl Mutation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Mutation::Create(_) => OperationKind::Create,
            Mutation::Update(_) => OperationKind::Update,
            Mutation::Delete(_) => OperationKind::Delete,
        }
    }
}

/// An operation that exhausted its retry budget.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedOperation {
    pub operation: PendingOperation,
    /// Error from the final dispatch attempt
    pub last_error: String,
    /// Whether the final error could never have succeeded on retry
    pub permanent: bool,
    pub failed_at: Timestamp,
}

/// Current time in milliseconds since the epoch.
pub(crate) fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// Durable, priority-ordered buffer of mutations awaiting the remote.
pub struct PendingQueue {
    store: Arc<LocalStore>,
    priorities: RwLock<StoreTable<Priority>>,
}

impl PendingQueue {
    /// Create a queue over an initialized local store, with the default
    /// per-store priorities.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            priorities: RwLock::new(SyncOptions::default().priorities()),
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Replace the per-store priority table. Already queued entries keep the
    /// priority they were stamped with.
    pub fn set_priorities(&self, priorities: StoreTable<Priority>) {
        *self.priorities.write().unwrap_or_else(PoisonError::into_inner) = priorities;
    }

    pub fn priority_for(&self, store: StoreId) -> Priority {
        self.priorities.read().unwrap_or_else(PoisonError::into_inner)[store]
    }

    fn operation(
        &self,
        principal_id: &str,
        store: StoreId,
        kind: OperationKind,
        record_id: RecordId,
        payload: Option<Record>,
        enqueued_at: Timestamp,
    ) -> PendingOperation {
        PendingOperation::new(
            uuid::Uuid::new_v4().to_string(),
            principal_id,
            store,
            record_id,
            kind,
            payload,
            enqueued_at,
            self.priority_for(store),
        )
    }

    /// Buffer a mutation that was already applied to the local store.
    pub async fn enqueue(
        &self,
        principal_id: &str,
        store: StoreId,
        kind: OperationKind,
        record_id: impl Into<RecordId>,
        payload: Option<Record>,
    ) -> Result<PendingOperation> {
        self.enqueue_at(principal_id, store, kind, record_id, payload, now_millis())
            .await
    }

    /// Like [`enqueue`](Self::enqueue) with an explicit enqueue time.
    pub async fn enqueue_at(
        &self,
        principal_id: &str,
        store: StoreId,
        kind: OperationKind,
        record_id: impl Into<RecordId>,
        payload: Option<Record>,
        enqueued_at: Timestamp,
    ) -> Result<PendingOperation> {
        let op = self.operation(principal_id, store, kind, record_id.into(), payload, enqueued_at);

        let result = async {
            let pool = self.store.pool().await?;
            db::insert_pending(&pool, &op).await?;
            Ok::<_, StoreError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    op_id = %op.id,
                    %store,
                    kind = %op.kind,
                    priority = op.priority,
                    "operation enqueued"
                );
                Ok(op)
            }
            Err(e) => {
                tracing::error!(%store, record_id = %op.record_id, error = %e, "failed to enqueue operation");
                Err(e)
            }
        }
    }

    /// Apply a mutation to the local store and enqueue it atomically.
    ///
    /// Returns the affected record id and the queued operation. If either
    /// write fails neither is kept.
    pub async fn track(
        &self,
        principal_id: &str,
        store: StoreId,
        mutation: Mutation,
    ) -> Result<(RecordId, PendingOperation)> {
        let kind = mutation.kind();

        let result = async {
            let pool = self.store.pool().await?;
            let mut tx = pool.begin().await?;

            let (record_id, payload) = match mutation {
                Mutation::Create(mut record) => {
                    let id = record.ensure_id(new_record_id)?;
                    let data = serde_json::to_string(&record)?;
                    db::insert_record(&mut *tx, store, &id, &data)
                        .await
                        .map_err(|e| StoreError::from_write(store, e))?;
                    (id, Some(record))
                }
                Mutation::Update(record) => {
                    let id = require_id(&record)?;
                    let data = serde_json::to_string(&record)?;
                    db::upsert_record(&mut *tx, store, &id, &data)
                        .await
                        .map_err(|e| StoreError::from_write(store, e))?;
                    (id, Some(record))
                }
                Mutation::Delete(id) => {
                    db::delete_record(&mut *tx, store, &id).await?;
                    (id, None)
                }
            };

            let op = self.operation(principal_id, store, kind, record_id.clone(), payload, now_millis());
            db::insert_pending(&mut *tx, &op).await?;
            tx.commit().await?;
            Ok::<_, StoreError>((record_id, op))
        }
        .await;

        result
            .inspect(|(record_id, op)| {
                tracing::debug!(op_id = %op.id, %store, %kind, %record_id, "mutation tracked")
            })
            .inspect_err(|e| tracing::warn!(%store, %kind, error = %e, "failed to track mutation"))
    }

    /// Up to `batch_size` of a principal's operations in dispatch order.
    pub async fn dequeue_batch(
        &self,
        principal_id: &str,
        batch_size: usize,
    ) -> Result<Vec<PendingOperation>> {
        self.fetch(principal_id, Some(batch_size)).await
    }

    /// Every pending operation of a principal in dispatch order.
    pub async fn pending_for(&self, principal_id: &str) -> Result<Vec<PendingOperation>> {
        self.fetch(principal_id, None).await
    }

    async fn fetch(
        &self,
        principal_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PendingOperation>> {
        let pool = self
            .store
            .pool()
            .await
            .inspect_err(|e| tracing::warn!(principal = principal_id, error = %e, "queue unavailable"))?;
        let rows = db::get_pending_for_principal(&pool, principal_id, limit)
            .await
            .inspect_err(|e| tracing::error!(principal = principal_id, error = %e, "failed to read queue"))?;

        // Undecodable rows are left in place for inspection.
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.to_pending() {
                Ok(op) => Some(op),
                Err(e) => {
                    tracing::error!(op_id = %row.id, error = %e, "skipping undecodable queue entry");
                    None
                }
            })
            .collect())
    }

    /// Number of pending operations for a principal.
    pub async fn len(&self, principal_id: &str) -> Result<u64> {
        let pool = self.store.pool().await?;
        let count = db::count_pending(&pool, principal_id).await?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self, principal_id: &str) -> Result<bool> {
        Ok(self.len(principal_id).await? == 0)
    }

    /// Retire an operation the remote authority confirmed.
    pub async fn complete(&self, op: &PendingOperation) -> Result<()> {
        let pool = self.store.pool().await?;
        db::delete_pending(&pool, &op.id)
            .await
            .inspect_err(|e| tracing::error!(op_id = %op.id, error = %e, "failed to retire operation"))?;
        tracing::debug!(op_id = %op.id, store = %op.store, "operation completed");
        Ok(())
    }

    /// Count a failed dispatch against the operation's retry budget.
    ///
    /// A retried operation is persisted with its new attempt count. A dropped
    /// one is moved to the dead-letter table in one transaction.
    pub async fn record_failure(
        &self,
        op: &mut PendingOperation,
        max_retries: u32,
        error: &RemoteError,
    ) -> Result<RetryDecision> {
        let decision = op.register_failure(max_retries);
        let pool = self.store.pool().await?;

        match decision {
            RetryDecision::Retry => {
                db::update_attempts(&pool, &op.id, op.attempts).await?;
                tracing::debug!(
                    op_id = %op.id,
                    store = %op.store,
                    attempts = op.attempts,
                    error = %error,
                    "operation will be retried"
                );
            }
            RetryDecision::Drop => {
                let mut tx = pool.begin().await?;
                db::delete_pending(&mut *tx, &op.id).await?;
                db::insert_failed(
                    &mut *tx,
                    op,
                    &error.to_string(),
                    error.is_permanent(),
                    now_millis(),
                )
                .await?;
                tx.commit().await?;
                tracing::warn!(
                    op_id = %op.id,
                    store = %op.store,
                    record_id = %op.record_id,
                    attempts = op.attempts,
                    permanent = error.is_permanent(),
                    error = %error,
                    "operation exhausted its retries and was moved to dead letters"
                );
            }
        }

        Ok(decision)
    }

    /// Operations of a principal that exhausted their retries.
    pub async fn dead_letters(&self, principal_id: &str) -> Result<Vec<FailedOperation>> {
        let pool = self.store.pool().await?;
        let rows = db::get_failed_for_principal(&pool, principal_id).await?;

        rows.into_iter()
            .map(|row| -> Result<FailedOperation> {
                let operation = row.op.to_pending().map_err(|e| match e {
                    db::DecodeError::Engine(e) => StoreError::Engine(e),
                    db::DecodeError::Payload(e) => StoreError::Serialization(e),
                })?;
                Ok(FailedOperation {
                    operation,
                    last_error: row.last_error,
                    permanent: row.permanent,
                    failed_at: row.failed_at.max(0) as Timestamp,
                })
            })
            .collect()
    }

    /// Discard a principal's dead letters, returning how many were removed.
    pub async fn clear_dead_letters(&self, principal_id: &str) -> Result<u64> {
        let pool = self.store.pool().await?;
        let removed = db::clear_failed_for_principal(&pool, principal_id).await?;
        tracing::info!(principal = principal_id, removed, "dead letters cleared");
        Ok(removed)
    }
}

impl std::fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue")
            .field("store", &self.store.url())
            .finish_non_exhaustive()
    }
}
