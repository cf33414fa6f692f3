//! Backend Collaborators
//!
//! The dashboard talks to a hosted backend-as-a-service through three
//! collaborator traits, injected as a [`BackendContext`]:
//!
//! - **AuthProvider**: resolves the signed-in user (or none)
//! - **StatsSource**: fetches the aggregate `UserStats` for a user
//! - **RealtimeSource**: opens and releases row-change subscriptions
//!
//! ## Implementations
//!
//! - **client**: `SupabaseClient`, REST auth and query over reqwest
//! - **realtime**: `RealtimeClient`, Phoenix channel websocket client
//! - **messages**: Realtime wire frames
//! - **DisabledRealtime**: stand-in when live updates are off

mod client;
mod error;
mod messages;
mod realtime;
mod types;

pub use client::SupabaseClient;
pub use error::{BackendError, BackendResult};
pub use messages::{channel_topic, join_payload, websocket_url, Frame, ReplyStatus, ServerEvent};
pub use realtime::{backoff_delay, RealtimeClient, RealtimeClientConfig};
pub use types::{
    ChangeEvent, ChangeKind, EventFilter, Subscription, SubscriptionHandle, SubscriptionRequest,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::stats::{UserIdentity, UserStats};

/// Resolves the currently authenticated user
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `Ok(None)` means nobody is signed in
    async fn current_user(&self) -> BackendResult<Option<UserIdentity>>;
}

/// Fetches aggregate statistics
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_user_stats(&self, user: &UserIdentity) -> BackendResult<UserStats>;
}

/// Push subscriptions to row-level table changes
#[async_trait]
pub trait RealtimeSource: Send + Sync {
    /// Open a channel and start delivering matching change events
    async fn subscribe(&self, request: SubscriptionRequest) -> BackendResult<Subscription>;

    /// Release a subscription. Must not block; callers invoke it from `Drop`.
    fn unsubscribe(&self, handle: &SubscriptionHandle);
}

/// The collaborators a dashboard is built from
#[derive(Clone)]
pub struct BackendContext {
    pub auth: Arc<dyn AuthProvider>,
    pub stats: Arc<dyn StatsSource>,
    pub realtime: Arc<dyn RealtimeSource>,
}

impl BackendContext {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        stats: Arc<dyn StatsSource>,
        realtime: Arc<dyn RealtimeSource>,
    ) -> Self {
        Self {
            auth,
            stats,
            realtime,
        }
    }

    /// Use one Supabase client for auth and queries
    pub fn supabase(client: Arc<SupabaseClient>, realtime: Arc<dyn RealtimeSource>) -> Self {
        Self {
            auth: client.clone(),
            stats: client,
            realtime,
        }
    }
}

/// Realtime source for one-shot use; every subscription is refused
#[derive(Debug, Default)]
pub struct DisabledRealtime;

#[async_trait]
impl RealtimeSource for DisabledRealtime {
    async fn subscribe(&self, request: SubscriptionRequest) -> BackendResult<Subscription> {
        tracing::debug!(channel = %request.channel, "Realtime disabled, not subscribing");
        Err(BackendError::Unavailable)
    }

    fn unsubscribe(&self, _handle: &SubscriptionHandle) {}
}
