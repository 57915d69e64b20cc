//! Periodic reachability probe with edge-triggered notifications.
//!
//! The monitor starts `Offline`, probes once on start and then on a fixed
//! interval. Listeners hear about the current state when they subscribe and
//! after that only when the state flips.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fintrack_core::connectivity::{ConnectivityMonitor, ConnectivityMonitorConfig};
//! use fintrack_core::dispatch::DeliveryContext;
//!
//! # async fn example() -> Result<(), fintrack_core::LifecycleError> {
//! # let probe: Arc<dyn fintrack_core::ReachabilityProbe> = todo!();
//! let monitor = ConnectivityMonitor::new(
//!     probe,
//!     ConnectivityMonitorConfig::default(),
//!     DeliveryContext::Inline,
//! );
//! monitor.subscribe(|state| tracing::info!(%state, "Connectivity changed"));
//!
//! monitor.start()?;
//! // ... application runs ...
//! monitor.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use fintrack_domain::constants::{DEFAULT_PROBE_INTERVAL_SECS, DEFAULT_PROBE_TIMEOUT_SECS};
use fintrack_domain::{ConnectionState, ConnectivityConfig};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::ports::ReachabilityProbe;
use crate::dispatch::DeliveryContext;
use crate::lifecycle::{join_with_timeout, LifecycleError, LifecycleResult};

/// Configuration for the connectivity monitor.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitorConfig {
    /// Delay between scheduled probes
    pub probe_interval: Duration,
    /// Upper bound on a single probe
    pub probe_timeout: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for ConnectivityMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&ConnectivityConfig> for ConnectivityMonitorConfig {
    fn from(config: &ConnectivityConfig) -> Self {
        Self {
            probe_interval: config.probe_interval(),
            probe_timeout: config.probe_timeout(),
            ..Self::default()
        }
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

struct Registry {
    state: ConnectionState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

struct MonitorInner {
    probe: Arc<dyn ReachabilityProbe>,
    config: ConnectivityMonitorConfig,
    delivery: DeliveryContext,
    registry: Mutex<Registry>,
    // Serializes probe + transition so notifications leave in flip order.
    probe_lock: tokio::sync::Mutex<()>,
}

struct Running {
    cancellation: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the connection state and the probe loop that mutates it.
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
    running: Mutex<Option<Running>>,
}

impl ConnectivityMonitor {
    pub fn new(
        probe: Arc<dyn ReachabilityProbe>,
        config: ConnectivityMonitorConfig,
        delivery: DeliveryContext,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                probe,
                config,
                delivery,
                registry: Mutex::new(Registry {
                    state: ConnectionState::Offline,
                    listeners: Vec::new(),
                    next_id: 0,
                }),
                probe_lock: tokio::sync::Mutex::new(()),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.registry.lock().state
    }

    /// Register a listener. It is called once right away with the current
    /// state, then once per transition.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let (id, state) = {
            let mut registry = self.inner.registry.lock();
            let id = SubscriptionId(registry.next_id);
            registry.next_id += 1;
            registry.listeners.push((id, Arc::clone(&listener)));
            (id, registry.state)
        };

        self.inner.delivery.deliver(move || listener(state));
        id
    }

    /// Remove a listener. Returns `false` if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.inner.registry.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(existing, _)| *existing != id);
        registry.listeners.len() != before
    }

    /// Probe once outside the schedule and apply the result.
    pub async fn probe_now(&self) -> ConnectionState {
        self.inner.probe_and_apply().await
    }

    /// Spawn the probe loop. The first probe runs immediately.
    #[instrument(skip(self))]
    pub fn start(&self) -> LifecycleResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(LifecycleError::AlreadyRunning);
        }

        info!(
            interval_secs = self.inner.config.probe_interval.as_secs(),
            "Starting connectivity monitor"
        );

        let cancellation = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let cancel = cancellation.clone();
        let handle = tokio::spawn(async move {
            inner.probe_loop(cancel).await;
        });

        *running = Some(Running { cancellation, handle });
        Ok(())
    }

    /// Cancel the probe loop and wait for it to finish.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> LifecycleResult<()> {
        let running = self.running.lock().take();
        let Some(Running { cancellation, handle }) = running else {
            return Err(LifecycleError::NotRunning);
        };

        info!("Stopping connectivity monitor");
        cancellation.cancel();
        join_with_timeout(handle, self.inner.config.join_timeout, "connectivity_monitor").await?;
        info!("Connectivity monitor stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancellation.cancel();
        }
    }
}

impl MonitorInner {
    async fn probe_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Connectivity probe loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.probe_and_apply().await;
                }
            }
        }
    }

    async fn probe_and_apply(&self) -> ConnectionState {
        let _guard = self.probe_lock.lock().await;
        let reachable = tokio::time::timeout(self.config.probe_timeout, self.probe.is_reachable())
            .await
            .unwrap_or_else(|_| {
                debug!(
                    timeout_ms = self.config.probe_timeout.as_millis() as u64,
                    "Reachability probe timed out"
                );
                false
            });
        self.apply(ConnectionState::from_reachable(reachable))
    }

    fn apply(&self, next: ConnectionState) -> ConnectionState {
        let listeners: Vec<Listener> = {
            let mut registry = self.registry.lock();
            if registry.state == next {
                return next;
            }
            registry.state = next;
            registry.listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
        };

        info!(state = %next, listeners = listeners.len(), "Connectivity state changed");
        for listener in listeners {
            self.delivery.deliver(move || listener(next));
        }
        next
    }
}
