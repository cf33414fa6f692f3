//! Test utilities for the crate.
//!
//! Substitutable fakes for the backend collaborators plus a polling helper
//! for asserting on background tasks. Only compiled when running tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::backend::{
    AuthProvider, BackendContext, BackendError, BackendResult, ChangeEvent, ChangeKind,
    RealtimeSource, StatsSource, Subscription, SubscriptionHandle, SubscriptionRequest,
};
use crate::stats::{UserIdentity, UserStats};

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// An `UPDATE` on `public.earnings`
pub fn earnings_update() -> ChangeEvent {
    ChangeEvent::new(ChangeKind::Update, "public", "earnings")
}

/// Auth provider with a fixed answer
pub struct FakeAuth {
    user: Option<UserIdentity>,
    calls: AtomicUsize,
}

impl FakeAuth {
    pub fn signed_in(id: &str) -> Arc<Self> {
        Arc::new(Self {
            user: Some(UserIdentity::new(id)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self {
            user: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn current_user(&self) -> BackendResult<Option<UserIdentity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.user.clone())
    }
}

/// Stats source that records every call.
///
/// Calls consume queued gates in order and wait for the test to release
/// them; without a gate they answer immediately with the configured stats,
/// or fail when none are configured.
pub struct FakeStats {
    stats: Mutex<Option<UserStats>>,
    gates: Mutex<VecDeque<oneshot::Receiver<BackendResult<UserStats>>>>,
    calls: Mutex<Vec<UserIdentity>>,
}

impl FakeStats {
    pub fn returning(stats: UserStats) -> Arc<Self> {
        Arc::new(Self {
            stats: Mutex::new(Some(stats)),
            gates: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            stats: Mutex::new(None),
            gates: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Change the immediate answer; `None` makes calls fail
    pub fn set(&self, stats: Option<UserStats>) {
        *self.stats.lock().unwrap() = stats;
    }

    /// Hold the next call until the returned sender fires
    pub fn gate(&self) -> oneshot::Sender<BackendResult<UserStats>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<UserIdentity> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StatsSource for FakeStats {
    async fn fetch_user_stats(&self, user: &UserIdentity) -> BackendResult<UserStats> {
        self.calls.lock().unwrap().push(user.clone());

        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            return gate.await.unwrap_or(Err(BackendError::ChannelClosed));
        }

        let stats = self.stats.lock().unwrap().clone();
        stats.ok_or(BackendError::ApiError {
            status: 500,
            message: "boom".to_string(),
        })
    }
}

/// In-memory realtime source; tests push events with [`FakeRealtime::emit`]
///
/// Subscriptions on one channel share it; the channel is left when its last
/// subscription is released.
#[derive(Default)]
pub struct FakeRealtime {
    /// Channel → handle id → event stream
    channels: Mutex<HashMap<String, HashMap<String, mpsc::UnboundedSender<ChangeEvent>>>>,
    requests: Mutex<Vec<SubscriptionRequest>>,
    released: Mutex<Vec<SubscriptionHandle>>,
    left: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeRealtime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let realtime = Self::default();
        realtime.fail.store(true, Ordering::SeqCst);
        Arc::new(realtime)
    }

    /// Deliver an event to every open subscription; returns how many got it
    pub fn emit(&self, event: ChangeEvent) -> usize {
        self.channels
            .lock()
            .unwrap()
            .values()
            .flat_map(HashMap::values)
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Simulate the server dropping every subscription
    pub fn drop_all(&self) {
        self.channels.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<SubscriptionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<SubscriptionHandle> {
        self.released.lock().unwrap().clone()
    }

    /// Channels left because their last subscription was released
    pub fn left(&self) -> Vec<String> {
        self.left.lock().unwrap().clone()
    }

    /// Live subscriptions across all channels
    pub fn open_count(&self) -> usize {
        self.channels.lock().unwrap().values().map(HashMap::len).sum()
    }
}

#[async_trait]
impl RealtimeSource for FakeRealtime {
    async fn subscribe(&self, request: SubscriptionRequest) -> BackendResult<Subscription> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::JoinRejected {
                channel: request.channel,
                reason: "unauthorized".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle::new(request.channel);
        self.channels
            .lock()
            .unwrap()
            .entry(handle.channel().to_string())
            .or_default()
            .insert(handle.id().to_string(), tx);

        Ok(Subscription { handle, events: rx })
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut channels = self.channels.lock().unwrap();
        if let Some(subscribers) = channels.get_mut(handle.channel()) {
            subscribers.remove(handle.id());
            if subscribers.is_empty() {
                channels.remove(handle.channel());
                self.left.lock().unwrap().push(handle.channel().to_string());
            }
        }
        self.released.lock().unwrap().push(handle.clone());
    }
}

/// Context wired from fakes
pub fn context(
    auth: Arc<FakeAuth>,
    stats: Arc<FakeStats>,
    realtime: Arc<FakeRealtime>,
) -> BackendContext {
    BackendContext::new(auth, stats, realtime)
}
