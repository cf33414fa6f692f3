//! Realtime Refresh Listener
//!
//! Subscribes to row changes on one table and asks the [`StatsLoader`] to
//! refetch for every delivered event. The subscription is held by a guard
//! that releases it exactly once, whichever way the listener goes away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use super::error::{DashboardError, DashboardResult};
use super::loader::StatsLoader;
use crate::backend::{
    BackendContext, ChangeEvent, RealtimeSource, SubscriptionHandle, SubscriptionRequest,
};
use crate::config::RealtimeConfig;

/// What the listener subscribes to and how it reacts
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub request: SubscriptionRequest,
    /// Events arriving within this window of the first one share a refetch
    pub coalesce_window: Option<Duration>,
}

impl ListenerConfig {
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            request: SubscriptionRequest::from_config(config),
            coalesce_window: config.coalesce_window(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

/// Opens realtime subscriptions that drive a loader
pub struct RealtimeListener {
    realtime: Arc<dyn RealtimeSource>,
    config: ListenerConfig,
}

impl RealtimeListener {
    pub fn new(realtime: Arc<dyn RealtimeSource>, config: ListenerConfig) -> Self {
        Self { realtime, config }
    }

    pub fn from_context(context: &BackendContext, config: ListenerConfig) -> Self {
        Self::new(Arc::clone(&context.realtime), config)
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Subscribe and start refetching on change events.
    ///
    /// Dropping the returned guard stops the listener, cancels its
    /// in-flight refetches and releases the subscription.
    pub async fn activate(&self, loader: Arc<StatsLoader>) -> DashboardResult<ListenerGuard> {
        let request = self.config.request.clone();
        let subscription = self
            .realtime
            .subscribe(request.clone())
            .await
            .map_err(DashboardError::Subscription)?;

        let guard = SubscriptionGuard::new(Arc::clone(&self.realtime), subscription.handle);

        tracing::info!(
            channel = %request.channel,
            schema = %request.schema,
            table = %request.table,
            event = request.event.as_str(),
            "Realtime listener active"
        );

        let counters = Arc::new(Counters::default());
        let task = tokio::spawn(pump_events(
            subscription.events,
            loader,
            self.config.coalesce_window,
            Arc::clone(&counters),
        ));

        Ok(ListenerGuard {
            subscription: guard,
            task,
            counters,
        })
    }
}

/// Owns a subscription handle and releases it exactly once
pub struct SubscriptionGuard {
    realtime: Arc<dyn RealtimeSource>,
    handle: Option<SubscriptionHandle>,
}

impl SubscriptionGuard {
    pub fn new(realtime: Arc<dyn RealtimeSource>, handle: SubscriptionHandle) -> Self {
        Self {
            realtime,
            handle: Some(handle),
        }
    }

    /// `None` once released
    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        self.handle.as_ref()
    }

    /// Release now instead of at drop
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.realtime.unsubscribe(&handle);
            tracing::info!(channel = %handle.channel(), "Realtime subscription released");
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    completed: AtomicU64,
}

/// A running listener
pub struct ListenerGuard {
    subscription: SubscriptionGuard,
    task: JoinHandle<()>,
    counters: Arc<Counters>,
}

impl ListenerGuard {
    pub fn channel(&self) -> Option<&str> {
        self.subscription.handle().map(SubscriptionHandle::channel)
    }

    /// Change events delivered so far
    pub fn events_received(&self) -> u64 {
        self.counters.received.load(Ordering::SeqCst)
    }

    /// Refetches triggered by events that have run to completion
    pub fn refetches_completed(&self) -> u64 {
        self.counters.completed.load(Ordering::SeqCst)
    }

    /// False once the event stream has closed or the listener was stopped
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop listening and release the subscription
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.task.abort();
        self.subscription.release();
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Turn change events into refetches until the stream closes.
///
/// Refetches run in a `JoinSet` owned by this future, so aborting the task
/// aborts every refetch still in flight.
async fn pump_events(
    mut events: mpsc::UnboundedReceiver<ChangeEvent>,
    loader: Arc<StatsLoader>,
    coalesce_window: Option<Duration>,
    counters: Arc<Counters>,
) {
    let mut refetches = JoinSet::new();
    let mut open = true;

    while open {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                counters.received.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(kind = %event.kind, table = %event.table, "Change event received");

                if let Some(window) = coalesce_window {
                    let (merged, still_open) = drain_window(&mut events, window).await;
                    counters.received.fetch_add(merged, Ordering::SeqCst);
                    if merged > 0 {
                        tracing::debug!(merged, "Coalesced change events");
                    }
                    open = still_open;
                }

                let loader = Arc::clone(&loader);
                let counters = Arc::clone(&counters);
                refetches.spawn(async move {
                    let result = loader.refetch().await;
                    counters.completed.fetch_add(1, Ordering::SeqCst);
                    result.is_ok()
                });
            }
            Some(joined) = refetches.join_next(), if !refetches.is_empty() => {
                log_refetch(joined);
            }
        }
    }

    tracing::warn!("Realtime event stream closed, dashboard is no longer live");

    while let Some(joined) = refetches.join_next().await {
        log_refetch(joined);
    }
}

/// Swallow events until `window` has passed since the first one.
/// Returns how many were merged and whether the stream is still open.
async fn drain_window(
    events: &mut mpsc::UnboundedReceiver<ChangeEvent>,
    window: Duration,
) -> (u64, bool) {
    let deadline = Instant::now() + window;
    let mut merged = 0;

    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(_)) => merged += 1,
            Ok(None) => return (merged, false),
            Err(_) => return (merged, true),
        }
    }
}

fn log_refetch(joined: Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(true) => tracing::debug!("Realtime refetch completed"),
        // The loader already logged the failure
        Ok(false) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => tracing::error!(error = %e, "Realtime refetch task panicked"),
    }
}
