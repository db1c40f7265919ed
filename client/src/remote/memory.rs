//! In-process remote authority.
//!
//! Keeps rows in memory, records every call and can be told to fail or to be
//! slow. Used by the test suites and for running the client without a backend.

use super::RemoteAuthority;
use crate::error::RemoteError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Which trait method a call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteMethod {
    Insert,
    Update,
    Delete,
    FetchOne,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub method: RemoteMethod,
    pub collection: String,
    pub id: Option<String>,
}

/// Injected failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Behave as if the network were down
    Unreachable,
    /// Answer with an HTTP error status
    Rejected { status: u16 },
}

impl Failure {
    fn to_error(&self) -> RemoteError {
        match self {
            Failure::Unreachable => RemoteError::Unreachable("injected network failure".into()),
            Failure::Rejected { status } => RemoteError::Rejected {
                status: *status,
                message: "injected rejection".into(),
            },
        }
    }
}

type CallHook = Arc<dyn Fn(usize, &RemoteCall) + Send + Sync>;

#[derive(Default)]
struct State {
    rows: HashMap<String, BTreeMap<String, Value>>,
    calls: Vec<RemoteCall>,
    failure: Option<Failure>,
    collection_failures: HashMap<String, Failure>,
    latency: Option<Duration>,
    hook: Option<CallHook>,
}

/// Remote authority backed by in-memory maps.
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail every call until cleared with `None`.
    pub fn set_failure(&self, failure: Option<Failure>) {
        self.state().failure = failure;
    }

    /// Fail every call on one collection.
    pub fn fail_collection(&self, collection: impl Into<String>, failure: Failure) {
        self.state()
            .collection_failures
            .insert(collection.into(), failure);
    }

    /// Delay every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Run `hook` on every call with its 1-based sequence number.
    ///
    /// The hook runs before injected failures are applied and must not call
    /// back into this remote.
    pub fn on_call(&self, hook: impl Fn(usize, &RemoteCall) + Send + Sync + 'static) {
        self.state().hook = Some(Arc::new(hook));
    }

    /// Put a row in place without recording a call.
    pub fn seed(&self, collection: &str, row: Value) {
        if let Some(id) = row.get("id").and_then(Value::as_str) {
            let id = id.to_string();
            self.state()
                .rows
                .entry(collection.to_string())
                .or_default()
                .insert(id, row);
        }
    }

    pub fn row(&self, collection: &str, id: &str) -> Option<Value> {
        self.state()
            .rows
            .get(collection)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    /// Rows of a collection, ordered by id.
    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.state()
            .rows
            .get(collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Record a call and apply hook, latency and injected failures.
    async fn enter(
        &self,
        method: RemoteMethod,
        collection: &str,
        id: Option<&str>,
    ) -> Result<(), RemoteError> {
        let call = RemoteCall {
            method,
            collection: collection.to_string(),
            id: id.map(str::to_string),
        };

        let (sequence, hook, latency) = {
            let mut state = self.state();
            state.calls.push(call.clone());
            (state.calls.len(), state.hook.clone(), state.latency)
        };

        if let Some(hook) = hook {
            hook(sequence, &call);
        }
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state();
        match state
            .collection_failures
            .get(collection)
            .or(state.failure.as_ref())
        {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}

fn row_id(data: &Value) -> Result<String, RemoteError> {
    data.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RemoteError::Rejected {
            status: 400,
            message: "row has no string id".into(),
        })
}

#[async_trait]
impl RemoteAuthority for MemoryRemote {
    async fn insert(&self, collection: &str, data: Value) -> Result<(), RemoteError> {
        self.enter(RemoteMethod::Insert, collection, None).await?;
        let id = row_id(&data)?;
        self.state()
            .rows
            .entry(collection.to_string())
            .or_default()
            .insert(id, data);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<(), RemoteError> {
        self.enter(RemoteMethod::Update, collection, Some(id)).await?;
        let mut state = self.state();
        let rows = state.rows.entry(collection.to_string()).or_default();

        match (rows.get_mut(id), data) {
            (Some(Value::Object(existing)), Value::Object(fields)) => existing.extend(fields),
            // A missing row is created from the update
            (None, Value::Object(mut fields)) => {
                fields
                    .entry("id")
                    .or_insert_with(|| Value::String(id.to_string()));
                rows.insert(id.to_string(), Value::Object(fields));
            }
            (_, other) => {
                return Err(RemoteError::Rejected {
                    status: 400,
                    message: format!("update body must be an object, got {other}"),
                })
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.enter(RemoteMethod::Delete, collection, Some(id)).await?;
        if let Some(rows) = self.state().rows.get_mut(collection) {
            rows.remove(id);
        }
        Ok(())
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        self.enter(RemoteMethod::FetchOne, collection, Some(id)).await?;
        Ok(self.row(collection, id))
    }
}

impl std::fmt::Debug for MemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("MemoryRemote")
            .field("collections", &state.rows.len())
            .field("calls", &state.calls.len())
            .field("failure", &state.failure)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn insert_is_idempotent() {
        let remote = MemoryRemote::new();
        let row = json!({"id": "g-1", "status": "active"});
        remote.insert("fitness_goals", row.clone()).await.unwrap();
        remote.insert("fitness_goals", row.clone()).await.unwrap();

        assert_eq!(remote.rows("fitness_goals"), vec![row]);
        assert_eq!(remote.call_count(), 2);
    }

    #[tokio::test]
    async fn update_merges_existing_rows_and_creates_missing_ones() {
        let remote = MemoryRemote::new();
        remote.seed("fitness_goals", json!({"id": "g-1", "status": "active", "title": "5k"}));

        remote
            .update("fitness_goals", "g-1", json!({"status": "done"}))
            .await
            .unwrap();
        remote
            .update("fitness_goals", "g-2", json!({"status": "done"}))
            .await
            .unwrap();

        assert_eq!(
            remote.row("fitness_goals", "g-1"),
            Some(json!({"id": "g-1", "status": "done", "title": "5k"}))
        );
        assert_eq!(
            remote.row("fitness_goals", "g-2"),
            Some(json!({"id": "g-2", "status": "done"}))
        );
    }

    #[tokio::test]
    async fn injected_failures() {
        let remote = MemoryRemote::new();
        remote.set_failure(Some(Failure::Rejected { status: 422 }));
        let err = remote.delete("body_metrics", "m-1").await.unwrap_err();
        assert!(err.is_permanent());

        remote.set_failure(None);
        remote.fail_collection("body_metrics", Failure::Unreachable);
        let err = remote.fetch_one("body_metrics", "m-1").await.unwrap_err();
        assert!(!err.is_permanent());
        assert!(remote.fetch_one("user_profiles", "p-1").await.unwrap().is_none());

        let methods: Vec<_> = remote.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(
            methods,
            vec![RemoteMethod::Delete, RemoteMethod::FetchOne, RemoteMethod::FetchOne]
        );
    }

    #[tokio::test]
    async fn hook_sees_sequence_numbers() {
        let remote = MemoryRemote::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        remote.on_call(move |n, call| sink.lock().unwrap().push((n, call.method)));

        remote.insert("daily_checkins", json!({"id": "c-1"})).await.unwrap();
        remote.delete("daily_checkins", "c-1").await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, RemoteMethod::Insert), (2, RemoteMethod::Delete)]
        );
    }
}
