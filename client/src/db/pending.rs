//! Database operations for the pending and failed operation tables.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use stride_engine::{OperationKind, PendingOperation, Record, StoreId, Timestamp};

/// A stored pending operation row from the database.
#[derive(Debug)]
pub struct StoredPendingOp {
    pub id: String,
    pub principal_id: String,
    pub store: String,
    pub record_id: String,
    pub kind: String,
    pub payload: Option<String>,
    pub enqueued_at: i64,
    pub attempts: i64,
    pub priority: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredPendingOp {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredPendingOp {
            id: row.try_get("id")?,
            principal_id: row.try_get("principal_id")?,
            store: row.try_get("store")?,
            record_id: row.try_get("record_id")?,
            kind: row.try_get("kind")?,
            payload: row.try_get("payload")?,
            enqueued_at: row.try_get("enqueued_at")?,
            attempts: row.try_get("attempts")?,
            priority: row.try_get("priority")?,
        })
    }
}

/// Why a stored row could not be turned back into an operation.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Engine(#[from] stride_engine::Error),

    #[error(transparent)]
    Payload(#[from] serde_json::Error),
}

impl StoredPendingOp {
    /// Convert database row to a [`PendingOperation`].
    pub fn to_pending(&self) -> Result<PendingOperation, DecodeError> {
        let store: StoreId = self.store.parse()?;
        let kind: OperationKind = self.kind.parse()?;
        let payload = self
            .payload
            .as_deref()
            .map(serde_json::from_str::<Record>)
            .transpose()?;

        Ok(PendingOperation {
            id: self.id.clone(),
            principal_id: self.principal_id.clone(),
            store,
            record_id: self.record_id.clone(),
            kind,
            payload,
            enqueued_at: self.enqueued_at.max(0) as Timestamp,
            attempts: self.attempts.clamp(0, i64::from(u32::MAX)) as u32,
            priority: self.priority.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        })
    }
}

/// A row from the dead-letter table.
#[derive(Debug)]
pub struct StoredFailedOp {
    pub op: StoredPendingOp,
    pub last_error: String,
    pub permanent: bool,
    pub failed_at: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredFailedOp {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredFailedOp {
            op: StoredPendingOp::from_row(row)?,
            last_error: row.try_get("last_error")?,
            permanent: row.try_get("permanent")?,
            failed_at: row.try_get("failed_at")?,
        })
    }
}

fn encode_payload(op: &PendingOperation) -> Result<Option<String>, serde_json::Error> {
    op.payload.as_ref().map(serde_json::to_string).transpose()
}

/// Insert a pending operation.
pub async fn insert_pending<'e>(
    exec: impl SqliteExecutor<'e>,
    op: &PendingOperation,
) -> Result<(), sqlx::Error> {
    let payload = encode_payload(op).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO pending_operations (
            id, principal_id, store, record_id, kind,
            payload, enqueued_at, attempts, priority
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&op.id)
    .bind(&op.principal_id)
    .bind(op.store.as_str())
    .bind(&op.record_id)
    .bind(op.kind.as_str())
    .bind(payload)
    .bind(op.enqueued_at as i64)
    .bind(i64::from(op.attempts))
    .bind(i64::from(op.priority))
    .execute(exec)
    .await?;

    Ok(())
}

/// Get a principal's pending operations in dispatch order.
pub async fn get_pending_for_principal<'e>(
    exec: impl SqliteExecutor<'e>,
    principal_id: &str,
    limit: Option<usize>,
) -> Result<Vec<StoredPendingOp>, sqlx::Error> {
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1);

    sqlx::query_as::<_, StoredPendingOp>(
        r#"
        SELECT id, principal_id, store, record_id, kind,
               payload, enqueued_at, attempts, priority
        FROM pending_operations
        WHERE principal_id = ?
        ORDER BY priority DESC, enqueued_at ASC, id ASC
        LIMIT ?
        "#,
    )
    .bind(principal_id)
    .bind(limit)
    .fetch_all(exec)
    .await
}

/// Count a principal's pending operations.
pub async fn count_pending<'e>(
    exec: impl SqliteExecutor<'e>,
    principal_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM pending_operations WHERE principal_id = ?",
    )
    .bind(principal_id)
    .fetch_one(exec)
    .await
}

/// Delete a pending operation by id.
pub async fn delete_pending<'e>(
    exec: impl SqliteExecutor<'e>,
    id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pending_operations WHERE id = ?")
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// Persist the attempt counter of a pending operation.
pub async fn update_attempts<'e>(
    exec: impl SqliteExecutor<'e>,
    id: &str,
    attempts: u32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE pending_operations SET attempts = ? WHERE id = ?")
        .bind(i64::from(attempts))
        .bind(id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}

/// Record an operation in the dead-letter table.
///
/// Replaces any earlier dead letter with the same id.
pub async fn insert_failed<'e>(
    exec: impl SqliteExecutor<'e>,
    op: &PendingOperation,
    last_error: &str,
    permanent: bool,
    failed_at: Timestamp,
) -> Result<(), sqlx::Error> {
    let payload = encode_payload(op).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO failed_operations (
            id, principal_id, store, record_id, kind,
            payload, enqueued_at, attempts, priority,
            last_error, permanent, failed_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&op.id)
    .bind(&op.principal_id)
    .bind(op.store.as_str())
    .bind(&op.record_id)
    .bind(op.kind.as_str())
    .bind(payload)
    .bind(op.enqueued_at as i64)
    .bind(i64::from(op.attempts))
    .bind(i64::from(op.priority))
    .bind(last_error)
    .bind(permanent)
    .bind(failed_at as i64)
    .execute(exec)
    .await?;

    Ok(())
}

/// Get a principal's dead letters, oldest failure first.
pub async fn get_failed_for_principal<'e>(
    exec: impl SqliteExecutor<'e>,
    principal_id: &str,
) -> Result<Vec<StoredFailedOp>, sqlx::Error> {
    sqlx::query_as::<_, StoredFailedOp>(
        r#"
        SELECT id, principal_id, store, record_id, kind,
               payload, enqueued_at, attempts, priority,
               last_error, permanent, failed_at
        FROM failed_operations
        WHERE principal_id = ?
        ORDER BY failed_at ASC, id ASC
        "#,
    )
    .bind(principal_id)
    .fetch_all(exec)
    .await
}

/// Remove a principal's dead letters.
pub async fn clear_failed_for_principal<'e>(
    exec: impl SqliteExecutor<'e>,
    principal_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM failed_operations WHERE principal_id = ?")
        .bind(principal_id)
        .execute(exec)
        .await?;
    Ok(result.rows_affected())
}
