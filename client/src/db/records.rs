//! Database operations for the per-store record tables.
//!
//! Every store is a table of `(id, data)` rows where `data` is the record's
//! JSON text. Secondary indexes are SQLite expression indexes over
//! `json_extract(data, '$.field')`, so lookups use the same expression.
//! Table, index and field names come from the closed store set and validated
//! [`IndexDef`]s, which is what makes interpolating them into SQL sound.

use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};
use stride_engine::{IndexDef, Record, StoreDefinition, StoreId};

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub id: String,
    pub data: String,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            id: row.try_get("id")?,
            data: row.try_get("data")?,
        })
    }
}

impl StoredRecord {
    /// Decode the row into a [`Record`].
    pub fn to_record(&self) -> Result<Record, serde_json::Error> {
        serde_json::from_str(&self.data)
    }
}

/// A JSON scalar converted to a bindable SQLite value.
#[derive(Debug, Clone, PartialEq)]
enum SqlParam {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<&Value> for SqlParam {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlParam::Null,
            Value::Bool(b) => SqlParam::Int(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlParam::Int(i),
                None => n.as_f64().map(SqlParam::Real).unwrap_or(SqlParam::Null),
            },
            Value::String(s) => SqlParam::Text(s.clone()),
            // json_extract yields compact JSON text for arrays and objects.
            other => SqlParam::Text(other.to_string()),
        }
    }
}

fn json_path(field: &str) -> String {
    format!("json_extract(data, '$.{field}')")
}

fn index_columns(index: &IndexDef) -> String {
    index
        .fields
        .iter()
        .map(|f| json_path(f))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Create a store's table and its indexes if they do not exist yet.
pub async fn create_store_table<'e>(
    exec: impl SqliteExecutor<'e> + Copy,
    definition: &StoreDefinition,
) -> Result<(), sqlx::Error> {
    let table = definition.store.as_str();

    let sql = format!(
        r#"CREATE TABLE IF NOT EXISTS "{table}" (
            id TEXT PRIMARY KEY NOT NULL,
            data TEXT NOT NULL
        )"#
    );
    sqlx::query(&sql).execute(exec).await?;

    for index in &definition.indexes {
        let sql = format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{table}_{name}" ON "{table}" ({columns})"#,
            name = index.name,
            columns = index_columns(index),
        );
        sqlx::query(&sql).execute(exec).await?;
    }

    if let Some(unique) = &definition.unique {
        let sql = format!(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "uq_{table}_{name}" ON "{table}" ({columns})"#,
            name = unique.name,
            columns = index_columns(unique),
        );
        sqlx::query(&sql).execute(exec).await?;
    }

    Ok(())
}

/// Insert a new record; fails if the id or a unique key already exists.
pub async fn insert_record<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
    id: &str,
    data: &str,
) -> Result<(), sqlx::Error> {
    let sql = format!(r#"INSERT INTO "{}" (id, data) VALUES (?, ?)"#, store.as_str());
    sqlx::query(&sql).bind(id).bind(data).execute(exec).await?;
    Ok(())
}

/// Insert or replace a record by id.
pub async fn upsert_record<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
    id: &str,
    data: &str,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        r#"INSERT INTO "{}" (id, data) VALUES (?, ?)
           ON CONFLICT (id) DO UPDATE SET data = excluded.data"#,
        store.as_str()
    );
    sqlx::query(&sql).bind(id).bind(data).execute(exec).await?;
    Ok(())
}

/// Get a record by id.
pub async fn get_record<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
    id: &str,
) -> Result<Option<StoredRecord>, sqlx::Error> {
    let sql = format!(r#"SELECT id, data FROM "{}" WHERE id = ?"#, store.as_str());
    sqlx::query_as::<_, StoredRecord>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await
}

/// Delete a record by id, returning the number of rows removed.
pub async fn delete_record<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
    id: &str,
) -> Result<u64, sqlx::Error> {
    let sql = format!(r#"DELETE FROM "{}" WHERE id = ?"#, store.as_str());
    let result = sqlx::query(&sql).bind(id).execute(exec).await?;
    Ok(result.rows_affected())
}

/// Get all records in a store, ordered by id.
pub async fn get_all_records<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
) -> Result<Vec<StoredRecord>, sqlx::Error> {
    let sql = format!(r#"SELECT id, data FROM "{}" ORDER BY id"#, store.as_str());
    sqlx::query_as::<_, StoredRecord>(&sql).fetch_all(exec).await
}

/// Get records whose indexed fields equal `parts`, ordered by id.
pub async fn get_records_by_index<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
    index: &IndexDef,
    parts: &[&Value],
) -> Result<Vec<StoredRecord>, sqlx::Error> {
    let predicate = index
        .fields
        .iter()
        .map(|f| format!("{} = ?", json_path(f)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let sql = format!(
        r#"SELECT id, data FROM "{}" WHERE {predicate} ORDER BY id"#,
        store.as_str()
    );

    let mut query = sqlx::query_as::<_, StoredRecord>(&sql);
    for part in parts {
        query = match SqlParam::from(*part) {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Int(i) => query.bind(i),
            SqlParam::Real(f) => query.bind(f),
            SqlParam::Text(s) => query.bind(s),
        };
    }
    query.fetch_all(exec).await
}

/// Count records in a store.
pub async fn count_records<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
) -> Result<i64, sqlx::Error> {
    let sql = format!(r#"SELECT COUNT(*) FROM "{}""#, store.as_str());
    sqlx::query_scalar::<_, i64>(&sql).fetch_one(exec).await
}

/// Remove every record in a store.
pub async fn clear_records<'e>(
    exec: impl SqliteExecutor<'e>,
    store: StoreId,
) -> Result<u64, sqlx::Error> {
    let sql = format!(r#"DELETE FROM "{}""#, store.as_str());
    let result = sqlx::query(&sql).execute(exec).await?;
    Ok(result.rows_affected())
}
