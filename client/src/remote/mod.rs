//! The remote authority and the adapter that maps stores onto it.
//!
//! A [`RemoteAuthority`] speaks in remote collection names and remote-shaped
//! JSON rows. The [`RemoteAdapter`] sits in front of it and translates local
//! store ids and record field names in both directions.

mod http;
mod memory;

pub use http::RestRemote;
pub use memory::{Failure, MemoryRemote, RemoteCall, RemoteMethod};

use crate::error::RemoteError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use stride_engine::{FieldNaming, Record, StoreId, StoreTable};

/// The backend system of record.
///
/// Rows are JSON objects already translated to the remote field naming.
#[async_trait]
pub trait RemoteAuthority: Send + Sync {
    /// Insert a row. Redelivering the same row must be harmless.
    async fn insert(&self, collection: &str, data: Value) -> Result<(), RemoteError>;

    /// Overwrite the fields of the row with this id, creating the row when
    /// none matches.
    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<(), RemoteError>;

    /// Delete the row with this id. Deleting a missing row succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// Fetch the row with this id.
    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError>;
}

/// Store-aware front for a [`RemoteAuthority`].
#[derive(Clone)]
pub struct RemoteAdapter {
    remote: Arc<dyn RemoteAuthority>,
    collections: StoreTable<String>,
    naming: FieldNaming,
}

impl RemoteAdapter {
    /// Adapter with the default collection names and camelCase to
    /// snake_case field translation.
    pub fn new(remote: Arc<dyn RemoteAuthority>) -> Self {
        Self {
            remote,
            collections: StoreTable::from_fn(|store| store.remote_collection().to_string()),
            naming: FieldNaming::default(),
        }
    }

    pub fn with_collections(mut self, collections: StoreTable<String>) -> Self {
        self.collections = collections;
        self
    }

    pub fn with_naming(mut self, naming: FieldNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn collection(&self, store: StoreId) -> &str {
        &self.collections[store]
    }

    pub fn naming(&self) -> FieldNaming {
        self.naming
    }

    pub async fn create(&self, store: StoreId, record: &Record) -> Result<(), RemoteError> {
        let data = self.naming.record_to_remote(record);
        self.remote.insert(self.collection(store), data).await
    }

    pub async fn update(&self, store: StoreId, id: &str, record: &Record) -> Result<(), RemoteError> {
        let data = self.naming.record_to_remote(record);
        self.remote.update(self.collection(store), id, data).await
    }

    pub async fn delete(&self, store: StoreId, id: &str) -> Result<(), RemoteError> {
        self.remote.delete(self.collection(store), id).await
    }

    /// Fetch a record and translate it back to local field names.
    pub async fn fetch(&self, store: StoreId, id: &str) -> Result<Option<Record>, RemoteError> {
        match self.remote.fetch_one(self.collection(store), id).await? {
            Some(row) => Ok(Some(self.naming.record_from_remote(row)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for RemoteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAdapter")
            .field("collections", &self.collections)
            .field("naming", &self.naming)
            .finish_non_exhaustive()
    }
}
