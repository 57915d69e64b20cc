//! Where listener callbacks run
//!
//! The connectivity monitor and the sync engine notify listeners from their
//! own background tasks. Hosts that need callbacks on a specific thread (a UI
//! loop, for instance) pass a [`DeliveryContext::Dispatcher`] and drain the
//! jobs themselves.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

/// A callback invocation handed to a dispatcher.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes jobs on a host-chosen thread or task.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Delivery policy for listener callbacks.
#[derive(Clone, Default)]
pub enum DeliveryContext {
    /// Run on the notifying task.
    #[default]
    Inline,
    /// Hand off to a host executor.
    Dispatcher(Arc<dyn Dispatch>),
}

impl DeliveryContext {
    pub fn deliver<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self {
            Self::Inline => job(),
            Self::Dispatcher(dispatcher) => dispatcher.dispatch(Box::new(job)),
        }
    }
}

impl fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Dispatcher(_) => f.write_str("Dispatcher(..)"),
        }
    }
}

/// Dispatcher backed by an unbounded channel.
///
/// Jobs are queued until the paired [`DispatchQueue`] drains them.
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, DispatchQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, DispatchQueue { rx })
    }

    /// Convenience for building a [`DeliveryContext`] from this dispatcher.
    pub fn into_context(self) -> DeliveryContext {
        DeliveryContext::Dispatcher(Arc::new(self))
    }
}

impl Dispatch for ChannelDispatcher {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            debug!("Dispatch queue dropped; discarding listener callback");
        }
    }
}

/// Receiving half of a [`ChannelDispatcher`].
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl DispatchQueue {
    /// Run every job queued so far without waiting. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Run jobs as they arrive until every dispatcher is dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }
}
