use super::{ConnectionState, ConnectivityMonitor};
use crate::error::ProbeError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Consecutive failed checks after which the remote counts as offline.
pub const DEFAULT_FAILURES_BEFORE_OFFLINE: u32 = 2;

/// Settings for the reachability probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// URL answered with a 2xx status while the remote is reachable
    pub url: String,
    pub interval: Duration,
    /// Per-request timeout
    pub timeout: Duration,
    pub failures_before_offline: u32,
}

impl ProbeConfig {
    pub fn new(url: impl Into<String>, interval: Duration) -> Self {
        Self {
            url: url.into(),
            interval,
            timeout: Duration::from_secs(5),
            failures_before_offline: DEFAULT_FAILURES_BEFORE_OFFLINE,
        }
    }
}

/// State after one check.
///
/// Success is always `Online`. The first failure while online is
/// `Reconnecting`; `threshold` consecutive failures are `Offline`.
pub fn next_state(
    current: ConnectionState,
    reachable: bool,
    consecutive_failures: u32,
    threshold: u32,
) -> ConnectionState {
    if reachable {
        return ConnectionState::Online;
    }
    if consecutive_failures >= threshold {
        return ConnectionState::Offline;
    }
    match current {
        ConnectionState::Online => ConnectionState::Reconnecting,
        other => other,
    }
}

/// Periodic HTTP health check feeding a [`ConnectivityMonitor`].
#[derive(Debug)]
pub struct ConnectivityProbe {
    client: reqwest::Client,
    config: ProbeConfig,
    monitor: Arc<ConnectivityMonitor>,
    failures: AtomicU32,
}

impl ConnectivityProbe {
    /// Build a probe. The interval must be non-zero.
    pub fn new(monitor: Arc<ConnectivityMonitor>, config: ProbeConfig) -> Result<Self, ProbeError> {
        if config.interval.is_zero() {
            return Err(ProbeError::ZeroInterval);
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            monitor,
            failures: AtomicU32::new(0),
        })
    }

    /// Whether the health URL currently answers with success.
    pub async fn check(&self) -> bool {
        match self.client.get(&self.config.url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(url = %self.config.url, status = %response.status(), "health check rejected");
                false
            }
            Err(e) => {
                tracing::debug!(url = %self.config.url, error = %e, "health check failed");
                false
            }
        }
    }

    /// Run one check and apply the outcome to the monitor.
    pub async fn probe_once(&self) -> ConnectionState {
        let reachable = self.check().await;
        let failures = if reachable {
            self.failures.store(0, Ordering::Relaxed);
            0
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
        };

        let next = next_state(
            self.monitor.state(),
            reachable,
            failures,
            self.config.failures_before_offline,
        );
        self.monitor.set_state(next);
        next
    }

    /// Probe on the configured interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.probe_once().await;
            }
        })
    }
}
