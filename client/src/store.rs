//! The SQLite-backed local record store.
//!
//! Pure CRUD over the stores declared by a [`Schema`]. Every call is its own
//! transaction scoped to one store, and every failure is logged here and
//! handed back as a [`StoreError`] so callers can degrade gracefully when
//! storage is unavailable.

use crate::db::{self, Pool};
use crate::error::{Result, StoreError};
use serde_json::Value;
use stride_engine::{Record, RecordId, Schema, StoreId, PRINCIPAL_INDEX};
use tokio::sync::RwLock;

/// URL of a private in-memory database.
pub const MEMORY_URL: &str = "sqlite::memory:";

/// Local record store.
pub struct LocalStore {
    url: String,
    schema: Schema,
    pool: RwLock<Option<Pool>>,
}

impl LocalStore {
    /// Create a store over the database at `url`. Nothing is opened until
    /// [`init`](Self::init).
    pub fn new(url: impl Into<String>, schema: Schema) -> Self {
        Self {
            url: url.into(),
            schema,
            pool: RwLock::new(None),
        }
    }

    /// Create a store over a fresh in-memory database.
    pub fn in_memory(schema: Schema) -> Self {
        Self::new(MEMORY_URL, schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the database, run migrations and declare every store.
    ///
    /// Idempotent: calling it on an open store does nothing.
    pub async fn init(&self) -> Result<()> {
        let mut guard = self.pool.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let pool = db::create_pool(&self.url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
            .inspect_err(|e| tracing::error!(url = %self.url, error = %e, "failed to open local store"))?;

        let declared = async {
            db::run_migrations(&pool).await?;
            for (_, definition) in self.schema.stores.iter() {
                db::create_store_table(&pool, definition).await?;
            }
            Ok::<_, StoreError>(())
        }
        .await;

        if let Err(e) = declared {
            tracing::error!(url = %self.url, error = %e, "failed to declare local schema");
            pool.close().await;
            return Err(e);
        }

        tracing::info!(url = %self.url, stores = StoreId::COUNT, "local store initialized");
        *guard = Some(pool);
        Ok(())
    }

    /// Whether [`init`](Self::init) succeeded and the store is not closed.
    pub async fn is_open(&self) -> bool {
        self.pool.read().await.is_some()
    }

    /// Close the database. Later calls fail with [`StoreError::Unavailable`]
    /// until the store is initialized again.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
            tracing::info!(url = %self.url, "local store closed");
        }
    }

    pub(crate) async fn pool(&self) -> Result<Pool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| StoreError::Unavailable("local store is not initialized".into()))
    }

    /// Persist a new record, assigning an id if it has none.
    ///
    /// Fails on a duplicate id or a violated uniqueness constraint.
    pub async fn add(&self, store: StoreId, mut record: Record) -> Result<RecordId> {
        let result = async {
            let id = record.ensure_id(new_record_id)?;
            let data = serde_json::to_string(&record)?;
            let pool = self.pool().await?;
            db::insert_record(&pool, store, &id, &data)
                .await
                .map_err(|e| StoreError::from_write(store, e))?;
            Ok::<_, StoreError>(id)
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, error = %e, "failed to add record"))
    }

    /// Get a record by id.
    pub async fn get(&self, store: StoreId, id: &str) -> Result<Option<Record>> {
        let result = async {
            let pool = self.pool().await?;
            let row = db::get_record(&pool, store, id).await?;
            Ok::<_, StoreError>(row.map(|r| r.to_record()).transpose()?)
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, id, error = %e, "failed to get record"))
    }

    /// Insert or replace a record by its id.
    pub async fn update(&self, store: StoreId, record: &Record) -> Result<RecordId> {
        let result = async {
            let id = require_id(record)?;
            let data = serde_json::to_string(record)?;
            let pool = self.pool().await?;
            db::upsert_record(&pool, store, &id, &data)
                .await
                .map_err(|e| StoreError::from_write(store, e))?;
            Ok::<_, StoreError>(id)
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, error = %e, "failed to update record"))
    }

    /// Delete a record. Deleting a missing id succeeds.
    pub async fn delete(&self, store: StoreId, id: &str) -> Result<()> {
        let result = async {
            let pool = self.pool().await?;
            let removed = db::delete_record(&pool, store, id).await?;
            if removed == 0 {
                tracing::debug!(%store, id, "delete of absent record");
            }
            Ok::<_, StoreError>(())
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, id, error = %e, "failed to delete record"))
    }

    /// Get every record in a store, ordered by id.
    pub async fn get_all(&self, store: StoreId) -> Result<Vec<Record>> {
        let result = async {
            let pool = self.pool().await?;
            let rows = db::get_all_records(&pool, store).await?;
            decode_rows(rows)
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, error = %e, "failed to list records"))
    }

    /// Get records by a declared index.
    ///
    /// `value` is a scalar for single-field indexes and an array with one
    /// element per field for composite ones.
    pub async fn get_by_index(
        &self,
        store: StoreId,
        index: &str,
        value: &Value,
    ) -> Result<Vec<Record>> {
        let result = async {
            let definition = self.schema.definition(store).require_index(index)?;
            let parts = definition.key_parts(value)?;
            let pool = self.pool().await?;
            let rows = db::get_records_by_index(&pool, store, definition, &parts).await?;
            decode_rows(rows)
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, index, error = %e, "index lookup failed"))
    }

    /// Get every record in a store owned by `principal`.
    pub async fn for_principal(&self, store: StoreId, principal: &str) -> Result<Vec<Record>> {
        self.get_by_index(store, PRINCIPAL_INDEX, &Value::from(principal))
            .await
    }

    /// Count records in a store.
    pub async fn count(&self, store: StoreId) -> Result<u64> {
        let result = async {
            let pool = self.pool().await?;
            let count = db::count_records(&pool, store).await?;
            Ok::<_, StoreError>(count.max(0) as u64)
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, error = %e, "failed to count records"))
    }

    /// Remove every record in a store.
    pub async fn clear(&self, store: StoreId) -> Result<()> {
        let result = async {
            let pool = self.pool().await?;
            let removed = db::clear_records(&pool, store).await?;
            tracing::debug!(%store, removed, "store cleared");
            Ok::<_, StoreError>(())
        }
        .await;

        result.inspect_err(|e| tracing::warn!(%store, error = %e, "failed to clear store"))
    }
}

/// Generate a record id.
pub(crate) fn new_record_id() -> RecordId {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn require_id(record: &Record) -> Result<RecordId> {
    record.id().map(str::to_string).ok_or_else(|| {
        StoreError::Engine(stride_engine::Error::InvalidRecord(
            "record has no id".into(),
        ))
    })
}

fn decode_rows(rows: Vec<db::StoredRecord>) -> Result<Vec<Record>> {
    rows.iter()
        .map(|row| row.to_record().map_err(StoreError::from))
        .collect()
}
