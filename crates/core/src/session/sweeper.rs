//! Periodic removal of expired sessions
//!
//! Other time-bounded stores can ride along on the same interval through
//! [`ExpiringStore`].

use std::sync::Arc;
use std::time::Duration;

use fintrack_domain::constants::DEFAULT_SESSION_SWEEP_SECS;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::registry::SessionRegistry;
use crate::lifecycle::{join_with_timeout, LifecycleError, LifecycleResult};

/// A store whose entries lapse after a fixed age.
pub trait ExpiringStore: Send + Sync {
    /// Drop lapsed entries and return how many were removed.
    fn sweep_expired(&self) -> usize;
}

impl ExpiringStore for SessionRegistry {
    fn sweep_expired(&self) -> usize {
        SessionRegistry::sweep_expired(self)
    }
}

/// Configuration for the session sweeper.
#[derive(Debug, Clone)]
pub struct SessionSweeperConfig {
    /// Interval between sweeps
    pub interval: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for SessionSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_SECS),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Owns the background sweep task for a [`SessionRegistry`].
pub struct SessionSweeper {
    registry: Arc<SessionRegistry>,
    companions: Vec<Arc<dyn ExpiringStore>>,
    config: SessionSweeperConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl SessionSweeper {
    pub fn new(registry: Arc<SessionRegistry>, config: SessionSweeperConfig) -> Self {
        Self {
            registry,
            companions: Vec::new(),
            config,
            cancellation: CancellationToken::new(),
            task_handle: None,
        }
    }

    /// Sweep `store` on every tick alongside the sessions.
    #[must_use]
    pub fn also_sweep(mut self, store: Arc<dyn ExpiringStore>) -> Self {
        self.companions.push(store);
        self
    }

    /// Spawn the sweep loop. The first sweep runs one interval after start.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> LifecycleResult<()> {
        if self.is_running() {
            return Err(LifecycleError::AlreadyRunning);
        }

        info!(interval_secs = self.config.interval.as_secs(), "Starting session sweeper");
        self.cancellation = CancellationToken::new();

        let registry = Arc::clone(&self.registry);
        let companions = self.companions.clone();
        let interval = self.config.interval;
        let cancel = self.cancellation.clone();
        self.task_handle = Some(tokio::spawn(async move {
            Self::sweep_loop(registry, companions, interval, cancel).await;
        }));
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> LifecycleResult<()> {
        let Some(handle) = self.task_handle.take() else {
            return Err(LifecycleError::NotRunning);
        };

        info!("Stopping session sweeper");
        self.cancellation.cancel();
        join_with_timeout(handle, self.config.join_timeout, "session_sweeper").await?;
        self.cancellation = CancellationToken::new();
        info!("Session sweeper stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn sweep_loop(
        registry: Arc<SessionRegistry>,
        companions: Vec<Arc<dyn ExpiringStore>>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Session sweep loop cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = registry.sweep_expired();
                    let lapsed: usize = companions.iter().map(|store| store.sweep_expired()).sum();
                    debug!(
                        removed,
                        lapsed,
                        remaining = registry.active_count(),
                        "Session sweep finished"
                    );
                }
            }
        }
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        if self.task_handle.is_some() {
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use fintrack_common::clock::MockClock;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeps_on_interval() {
        let clock = MockClock::new();
        let registry =
            Arc::new(SessionRegistry::with_clock(Duration::from_secs(60), Arc::new(clock.clone())));
        registry.issue(1, "alice");

        let mut sweeper = SessionSweeper::new(
            Arc::clone(&registry),
            SessionSweeperConfig { interval: Duration::from_secs(300), ..Default::default() },
        );
        sweeper.start().unwrap();

        clock.advance(Duration::from_secs(120));
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(registry.active_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(registry.active_count(), 0);

        sweeper.stop().await.unwrap();
    }

    struct CountingStore(AtomicUsize);

    impl ExpiringStore for CountingStore {
        fn sweep_expired(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test(start_paused = true)]
    async fn companion_stores_share_the_interval() {
        let store = Arc::new(CountingStore(AtomicUsize::new(0)));
        let mut sweeper = SessionSweeper::new(
            Arc::new(SessionRegistry::default()),
            SessionSweeperConfig { interval: Duration::from_secs(60), ..Default::default() },
        )
        .also_sweep(store.clone());
        sweeper.start().unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(store.0.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(store.0.load(Ordering::SeqCst), 2);

        sweeper.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_guards() {
        let registry = Arc::new(SessionRegistry::default());
        let mut sweeper = SessionSweeper::new(registry, SessionSweeperConfig::default());

        assert_eq!(sweeper.stop().await, Err(LifecycleError::NotRunning));
        sweeper.start().unwrap();
        assert_eq!(sweeper.start(), Err(LifecycleError::AlreadyRunning));
        sweeper.stop().await.unwrap();
        assert!(!sweeper.is_running());
    }
}
