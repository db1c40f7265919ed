//! # Stride Engine
//!
//! Deterministic rules for Stride's offline-first record sync.
//!
//! The application writes records locally first and records each mutation as
//! a [`PendingOperation`]. A sync engine (see the `stride-client` crate) later
//! replays those operations against the remote authority. This crate holds the
//! parts of that pipeline that need no IO, so they can be tested exhaustively.
//!
//! ## Design Principles
//!
//! - **No IO**: no files, network or clocks; timestamps are passed in
//! - **Closed store set**: every store is a [`StoreId`] and every per-store
//!   setting is a [`StoreTable`] with an entry for each store
//! - **Deterministic**: dispatch order and conflict outcomes depend only on
//!   their inputs
//!
//! ## Core Concepts
//!
//! ### Records and stores
//!
//! A [`Record`] is a JSON object with a string `id`, owned by a principal.
//! Each store has a [`StoreDefinition`] listing its secondary indexes and at
//! most one uniqueness constraint.
//!
//! ### Pending operations
//!
//! A [`PendingOperation`] is a buffered create, update or delete. Operations
//! drain by priority (descending) and then by enqueue time (ascending);
//! see [`sort_for_dispatch`]. Each failed dispatch counts against a retry
//! budget ([`PendingOperation::register_failure`]).
//!
//! ### Conflict resolution
//!
//! Updates resolve per store through a [`ConflictPolicy`]:
//! - [`ConflictPolicy::ClientWins`] - local always overwrites remote
//! - [`ConflictPolicy::ServerWins`] - a newer remote record is kept
//!
//! ## Quick Start
//!
//! ```rust
//! use stride_engine::{
//!     resolve, sort_for_dispatch, ConflictPolicy, OperationKind, PendingOperation, Record,
//!     Resolution, StoreId,
//! };
//! use serde_json::json;
//!
//! let mut ops = vec![
//!     PendingOperation::new("op-1", "u-1", StoreId::Goals, "g-1", OperationKind::Create, None, 2000, 3),
//!     PendingOperation::new("op-2", "u-1", StoreId::Profiles, "p-1", OperationKind::Update, None, 1000, 10),
//! ];
//! sort_for_dispatch(&mut ops);
//! assert_eq!(ops[0].store, StoreId::Profiles);
//!
//! let local = Record::new().with("id", json!("p-1")).with("lastUpdated", json!(1000));
//! let remote = Record::new().with("id", json!("p-1")).with("lastUpdated", json!(5000));
//! assert_eq!(
//!     resolve(ConflictPolicy::ServerWins, &local, Some(&remote), "lastUpdated"),
//!     Resolution::KeepRemote,
//! );
//! ```

pub mod conflict;
pub mod error;
pub mod naming;
pub mod operation;
pub mod options;
pub mod record;
pub mod schema;

// Re-export main types at crate root
pub use conflict::{last_modified, parse_timestamp, resolve, ConflictPolicy, Resolution};
pub use error::Error;
pub use naming::FieldNaming;
pub use operation::{sort_for_dispatch, OperationId, OperationKind, PendingOperation, RetryDecision};
pub use options::{
    StorePolicy, SyncOptions, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_SYNC_INTERVAL,
};
pub use record::{Record, ID_FIELD};
pub use schema::{
    IndexDef, Schema, StoreDefinition, StoreId, StoreTable, FAILED_OPERATIONS_TABLE,
    PENDING_OPERATIONS_TABLE, PRINCIPAL_INDEX,
};

/// Type aliases for clarity
pub type RecordId = String;
pub type PrincipalId = String;
pub type Timestamp = u64;
pub type Priority = i32;
