//! The sync engine.
//!
//! Drains a principal's pending operations into the remote authority. At most
//! one drain runs at a time; a second trigger while one is running returns
//! immediately without side effects.
//!
//! A drain takes a snapshot of the queue in dispatch order, splits it into
//! batches and dispatches every operation sequentially. Connectivity is
//! checked again before each batch; if the remote went away the remaining
//! batches stay in the queue untouched.

use crate::connectivity::{ConnectionState, ConnectivityMonitor};
use crate::error::{RemoteError, SyncError};
use crate::listeners::{ListenerId, Listeners};
use crate::queue::{Mutation, PendingQueue};
use crate::remote::RemoteAdapter;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use stride_engine::{
    resolve, sort_for_dispatch, ConflictPolicy, OperationKind, PendingOperation, PrincipalId,
    Record, RecordId, Resolution, RetryDecision, StoreId, SyncOptions,
};
use tokio::task::JoinHandle;

/// Cumulative progress of a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub processed: usize,
    pub total: usize,
}

/// Summary of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Operations in the drained snapshot
    pub total: usize,
    /// Confirmed by the remote, including updates where the remote was newer
    pub succeeded: usize,
    /// Failed and kept for a later pass
    pub retried: usize,
    /// Failed and moved to dead letters
    pub dropped: usize,
    /// Connectivity was lost before every batch was dispatched
    pub aborted: bool,
}

impl SyncReport {
    /// Whether every operation of the snapshot ended in success.
    pub fn is_success(&self) -> bool {
        !self.aborted && self.succeeded == self.total
    }
}

/// How a dispatched operation was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatched {
    Written,
    RemoteNewer,
}

/// Clears the single-flight flag when a drain ends, however it ends.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Tasks {
    auto_sync: Option<JoinHandle<()>>,
    connectivity: Option<JoinHandle<()>>,
}

/// Orchestrates draining the pending operation queue.
pub struct SyncEngine {
    queue: Arc<PendingQueue>,
    remote: RemoteAdapter,
    monitor: Arc<ConnectivityMonitor>,
    options: RwLock<SyncOptions>,
    principal: RwLock<Option<PrincipalId>>,
    syncing: AtomicBool,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    progress: Listeners<SyncProgress>,
    tasks: Mutex<Tasks>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<PendingQueue>,
        remote: RemoteAdapter,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let options = SyncOptions::default();
        queue.set_priorities(options.priorities());
        Self {
            queue,
            remote,
            monitor,
            options: RwLock::new(options),
            principal: RwLock::new(None),
            syncing: AtomicBool::new(false),
            last_sync: RwLock::new(None),
            progress: Listeners::new(),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Replace the sync options. Priorities apply to operations enqueued from
    /// now on.
    pub fn configure(&self, options: SyncOptions) -> Result<(), SyncError> {
        options.validate()?;
        self.queue.set_priorities(options.priorities());
        tracing::info!(
            batch_size = options.batch_size,
            max_retries = options.max_retries,
            interval_secs = options.sync_interval.as_secs(),
            "sync options configured"
        );
        *self.options.write().unwrap_or_else(PoisonError::into_inner) = options;
        Ok(())
    }

    pub fn options(&self) -> SyncOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind the principal whose operations are drained.
    pub fn set_principal(&self, principal: impl Into<PrincipalId>) {
        let principal = principal.into();
        tracing::info!(principal = %principal, "principal bound");
        *self.principal.write().unwrap_or_else(PoisonError::into_inner) = Some(principal);
    }

    pub fn clear_principal(&self) {
        *self.principal.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn principal(&self) -> Option<PrincipalId> {
        self.principal
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub fn remote(&self) -> &RemoteAdapter {
        &self.remote
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// When the last drain completed.
    pub fn get_last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn add_connection_listener(
        &self,
        listener: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> ListenerId {
        self.monitor.add_listener(listener)
    }

    pub fn remove_connection_listener(&self, id: ListenerId) -> bool {
        self.monitor.remove_listener(id)
    }

    pub fn add_sync_listener(
        &self,
        listener: impl Fn(&SyncProgress) + Send + Sync + 'static,
    ) -> ListenerId {
        self.progress.add(listener)
    }

    pub fn remove_sync_listener(&self, id: ListenerId) -> bool {
        self.progress.remove(id)
    }

    // ========================================================================
    // Local mutations
    // ========================================================================

    fn require_principal(&self) -> Result<PrincipalId, SyncError> {
        self.principal().ok_or(SyncError::NoPrincipal)
    }

    fn stamp_principal(&self, record: &mut Record, principal: &str) {
        let field = &self.queue.store().schema().principal_field;
        if record.get(field).is_none() {
            record.insert(field.clone(), principal.into());
        }
    }

    /// Create a record for the bound principal and queue it atomically.
    ///
    /// The principal field is filled in when the record lacks it.
    pub async fn create_local(&self, store: StoreId, mut record: Record) -> Result<RecordId, SyncError> {
        let principal = self.require_principal()?;
        self.stamp_principal(&mut record, &principal);
        let (id, _) = self
            .queue
            .track(&principal, store, Mutation::Create(record))
            .await?;
        Ok(id)
    }

    /// Insert or replace a record and queue the update atomically.
    ///
    /// Like [`create_local`](Self::create_local), fills in a missing
    /// principal field.
    pub async fn update_local(&self, store: StoreId, mut record: Record) -> Result<RecordId, SyncError> {
        let principal = self.require_principal()?;
        self.stamp_principal(&mut record, &principal);
        let (id, _) = self
            .queue
            .track(&principal, store, Mutation::Update(record))
            .await?;
        Ok(id)
    }

    /// Delete a record and queue the delete atomically.
    pub async fn delete_local(&self, store: StoreId, id: impl Into<RecordId>) -> Result<(), SyncError> {
        let principal = self.require_principal()?;
        self.queue
            .track(&principal, store, Mutation::Delete(id.into()))
            .await?;
        Ok(())
    }

    // ========================================================================
    // Draining
    // ========================================================================

    /// Drain the queue once.
    ///
    /// Returns `false` without doing anything if a drain is already running,
    /// the remote is not reachable or no principal is bound. Otherwise returns
    /// whether every drained operation succeeded.
    pub async fn trigger_sync(&self) -> bool {
        match self.sync_now().await {
            Ok(report) => report.is_success(),
            Err(e @ (SyncError::AlreadySyncing | SyncError::Offline | SyncError::NoPrincipal)) => {
                tracing::debug!(reason = %e, "sync skipped");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "sync failed");
                false
            }
        }
    }

    /// Drain the queue once and report what happened.
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        let _guard = SyncGuard::acquire(&self.syncing).ok_or(SyncError::AlreadySyncing)?;
        if !self.monitor.is_online() {
            return Err(SyncError::Offline);
        }
        let principal = self.require_principal()?;

        let report = self.drain(&principal).await?;

        if !report.aborted {
            *self.last_sync.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        }
        tracing::info!(
            principal = %principal,
            total = report.total,
            succeeded = report.succeeded,
            retried = report.retried,
            dropped = report.dropped,
            aborted = report.aborted,
            "sync finished"
        );
        Ok(report)
    }

    async fn drain(&self, principal: &str) -> Result<SyncReport, SyncError> {
        let options = self.options();
        let mut ops = self.queue.pending_for(principal).await?;
        sort_for_dispatch(&mut ops);

        let total = ops.len();
        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };
        let mut processed = 0;

        for (index, batch) in ops.chunks_mut(options.batch_size).enumerate() {
            if !self.monitor.is_online() {
                tracing::warn!(
                    principal,
                    batch = index,
                    remaining = total - processed,
                    "connection lost, leaving remaining batches queued"
                );
                report.aborted = true;
                return Ok(report);
            }

            self.emit(processed, total);
            tracing::debug!(principal, batch = index, size = batch.len(), "dispatching batch");

            for op in batch.iter_mut() {
                match self.dispatch(op, &options).await {
                    Ok(outcome) => {
                        self.queue.complete(op).await?;
                        if outcome == Dispatched::RemoteNewer {
                            tracing::debug!(op_id = %op.id, store = %op.store, "remote is newer, local update dropped");
                        }
                        report.succeeded += 1;
                    }
                    Err(e) => {
                        tracing::warn!(
                            op_id = %op.id,
                            store = %op.store,
                            kind = %op.kind,
                            attempts = op.attempts + 1,
                            error = %e,
                            "dispatch failed"
                        );
                        match self.queue.record_failure(op, options.max_retries, &e).await? {
                            RetryDecision::Retry => report.retried += 1,
                            RetryDecision::Drop => report.dropped += 1,
                        }
                    }
                }
                processed += 1;
            }
        }

        self.emit(processed, total);
        Ok(report)
    }

    async fn dispatch(
        &self,
        op: &PendingOperation,
        options: &SyncOptions,
    ) -> Result<Dispatched, RemoteError> {
        match op.kind {
            OperationKind::Create => {
                let payload = payload(op)?;
                self.remote.create(op.store, payload).await?;
            }
            OperationKind::Update => {
                let payload = payload(op)?;
                if options.stores[op.store].conflict == ConflictPolicy::ServerWins {
                    let Some(remote) = self.remote.fetch(op.store, &op.record_id).await? else {
                        self.remote.create(op.store, payload).await?;
                        return Ok(Dispatched::Written);
                    };
                    let field = &self.queue.store().schema().last_modified_field;
                    let resolution =
                        resolve(ConflictPolicy::ServerWins, payload, Some(&remote), field);
                    if resolution == Resolution::KeepRemote {
                        return Ok(Dispatched::RemoteNewer);
                    }
                }
                self.remote.update(op.store, &op.record_id, payload).await?;
            }
            OperationKind::Delete => {
                self.remote.delete(op.store, &op.record_id).await?;
            }
        }
        Ok(Dispatched::Written)
    }

    fn emit(&self, processed: usize, total: usize) {
        self.progress.notify(&SyncProgress { processed, total });
    }

    // ========================================================================
    // Background tasks
    // ========================================================================

    /// Drain on a fixed interval, by default the configured sync interval.
    ///
    /// The first drain happens one interval from now. Restarting replaces the
    /// running timer. A zero interval is rejected and leaves any running
    /// timer in place.
    pub fn start_auto_sync(self: &Arc<Self>, interval: Option<Duration>) -> Result<(), SyncError> {
        let period = interval.unwrap_or_else(|| self.options().sync_interval);
        if period.is_zero() {
            return Err(stride_engine::Error::InvalidOptions(
                "auto sync interval must be greater than zero".into(),
            )
            .into());
        }
        let engine = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(engine) = Weak::upgrade(&engine) else {
                    break;
                };
                engine.trigger_sync().await;
            }
        });

        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .auto_sync
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::info!(interval_ms = period.as_millis() as u64, "auto sync started");
        Ok(())
    }

    pub fn stop_auto_sync(&self) {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .auto_sync
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::info!("auto sync stopped");
        }
    }

    pub fn is_auto_sync_running(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .auto_sync
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Drain every time the connection comes back online.
    pub fn watch_connectivity(self: &Arc<Self>) {
        let mut states = self.monitor.subscribe();
        let engine = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                if !state.is_online() {
                    continue;
                }
                let Some(engine) = Weak::upgrade(&engine) else {
                    break;
                };
                tracing::debug!("connection restored, triggering sync");
                engine.trigger_sync().await;
            }
        });

        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connectivity
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop every background task.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in [tasks.auto_sync.take(), tasks.connectivity.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("principal", &self.principal())
            .field("syncing", &self.is_syncing())
            .field("state", &self.monitor.state())
            .finish_non_exhaustive()
    }
}

fn payload(op: &PendingOperation) -> Result<&Record, RemoteError> {
    op.payload
        .as_ref()
        .ok_or_else(|| RemoteError::MissingPayload(op.id.clone()))
}
