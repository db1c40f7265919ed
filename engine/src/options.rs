//! Sync engine options.

use crate::{error::Result, ConflictPolicy, Error, Priority, StoreId, StoreTable};
use std::time::Duration;

/// Default number of operations dispatched per batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default number of failed dispatches before an operation is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default period of the automatic sync timer.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Static per-store sync settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    /// Dispatch priority; higher drains first
    pub priority: Priority,
    /// How updates to this store resolve against the remote record
    pub conflict: ConflictPolicy,
}

impl StorePolicy {
    pub fn new(priority: Priority, conflict: ConflictPolicy) -> Self {
        Self { priority, conflict }
    }

    /// Defaults for the Stride stores.
    ///
    /// Profiles, check-ins, goals and plans are also edited from admin
    /// screens, so the remote copy wins when it is newer.
    pub fn default_for(store: StoreId) -> Self {
        match store {
            StoreId::Profiles => Self::new(10, ConflictPolicy::ServerWins),
            StoreId::Workouts => Self::new(8, ConflictPolicy::ClientWins),
            StoreId::ExerciseSets => Self::new(6, ConflictPolicy::ClientWins),
            StoreId::DailyCheckins => Self::new(5, ConflictPolicy::ServerWins),
            StoreId::BodyMetrics => Self::new(4, ConflictPolicy::ClientWins),
            StoreId::Goals => Self::new(3, ConflictPolicy::ServerWins),
            StoreId::TrainingPlans => Self::new(2, ConflictPolicy::ServerWins),
        }
    }
}

/// Options controlling how the pending queue is drained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Operations per batch
    pub batch_size: usize,
    /// Failed dispatches before an operation is dropped
    pub max_retries: u32,
    /// Period of the automatic sync timer
    pub sync_interval: Duration,
    /// Priority and conflict policy for every store
    pub stores: StoreTable<StorePolicy>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            stores: StoreTable::from_fn(StorePolicy::default_for),
        }
    }
}

impl SyncOptions {
    /// Builder-style batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder-style retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Builder-style timer period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Builder-style policy for one store.
    pub fn with_store_policy(mut self, store: StoreId, policy: StorePolicy) -> Self {
        self.stores.set(store, policy);
        self
    }

    /// Per-store priorities, as used when enqueueing.
    pub fn priorities(&self) -> StoreTable<Priority> {
        self.stores.map(|_, policy| policy.priority)
    }

    /// Check the options are usable.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidOptions("batch_size must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidOptions("max_retries must be at least 1".into()));
        }
        if self.sync_interval.is_zero() {
            return Err(Error::InvalidOptions("sync_interval must be non-zero".into()));
        }
        Ok(())
    }
}
