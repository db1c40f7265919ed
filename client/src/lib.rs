//! # Stride Client
//!
//! The IO half of Stride's offline-first layer.
//!
//! - [`LocalStore`]: SQLite-backed record stores with secondary indexes
//! - [`PendingQueue`]: durable buffer of mutations awaiting the remote, with
//!   atomic [`track`](PendingQueue::track) and a dead-letter table
//! - [`ConnectivityMonitor`] and [`ConnectivityProbe`]: reachability state
//! - [`RemoteAdapter`] over a [`RemoteAuthority`] such as [`RestRemote`]
//! - [`SyncEngine`]: single-flight, batched draining of the queue
//!
//! Services are plain values owned by the application and shared with
//! `Arc`; nothing here is a global.
//!
//! ```no_run
//! use std::sync::Arc;
//! use stride_client::{
//!     ConnectivityMonitor, LocalStore, PendingQueue, RemoteAdapter, RestRemote, SyncEngine,
//! };
//! use stride_engine::{Record, Schema, StoreId};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(LocalStore::new("sqlite://stride.db", Schema::standard()?));
//! store.init().await?;
//!
//! let remote = RemoteAdapter::new(Arc::new(RestRemote::new("https://api.example.com")?));
//! let monitor = Arc::new(ConnectivityMonitor::from_signal(true));
//! let engine = Arc::new(SyncEngine::new(
//!     Arc::new(PendingQueue::new(store)),
//!     remote,
//!     monitor,
//! ));
//!
//! engine.set_principal("user-1");
//! engine
//!     .create_local(StoreId::Workouts, Record::new().with("date", json!("2024-03-01")))
//!     .await?;
//! let synced = engine.trigger_sync().await;
//! # let _ = synced;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod listeners;
pub mod queue;
pub mod remote;
pub mod store;
pub mod sync;

pub use config::{Config, ConfigError};
pub use connectivity::{ConnectionState, ConnectivityMonitor, ConnectivityProbe, ProbeConfig};
pub use error::{ProbeError, RemoteError, StoreError, SyncError};
pub use listeners::{ListenerId, Listeners};
pub use queue::{FailedOperation, Mutation, PendingQueue};
pub use remote::{MemoryRemote, RemoteAdapter, RemoteAuthority, RestRemote};
pub use store::LocalStore;
pub use sync::{SyncEngine, SyncProgress, SyncReport};
