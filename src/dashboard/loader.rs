//! Stats Loader
//!
//! Resolves the signed-in user, fetches their stats and caches the result
//! for rendering. Every fetch is stamped with a sequence number when issued;
//! only the most recently issued fetch may update the cached state, so an
//! older response that arrives late is discarded instead of overwriting
//! newer data.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use super::error::{DashboardError, DashboardResult, LoadFailure};
use crate::backend::{AuthProvider, BackendContext, StatsSource};
use crate::stats::UserStats;

/// What the view renders from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Last successfully fetched record; kept while a refetch is in flight
    /// and when a refetch fails
    pub stats: Option<Arc<UserStats>>,
    /// A fetch is in flight
    pub loading: bool,
    /// Failure of the latest completed fetch
    pub failure: Option<LoadFailure>,
    /// Sequence number of the fetch that last updated this snapshot
    pub sequence: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Loads and caches `UserStats` for the signed-in user
pub struct StatsLoader {
    auth: Arc<dyn AuthProvider>,
    stats: Arc<dyn StatsSource>,
    /// Sequence number of the most recently issued fetch
    issued: AtomicU64,
    state: watch::Sender<StatsSnapshot>,
}

impl StatsLoader {
    pub fn new(auth: Arc<dyn AuthProvider>, stats: Arc<dyn StatsSource>) -> Self {
        let (state, _) = watch::channel(StatsSnapshot::default());
        Self {
            auth,
            stats,
            issued: AtomicU64::new(0),
            state,
        }
    }

    pub fn from_context(context: &BackendContext) -> Self {
        Self::new(Arc::clone(&context.auth), Arc::clone(&context.stats))
    }

    /// Current state
    pub fn snapshot(&self) -> StatsSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<StatsSnapshot> {
        self.state.subscribe()
    }

    /// Number of fetches issued so far
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Fetch stats for the current user.
    ///
    /// Returns this fetch's own outcome even when a newer fetch has since
    /// been issued and the result was therefore not cached.
    ///
    /// Dropping the future before it resolves abandons the fetch; if it was
    /// the latest one the loading flag is cleared.
    pub async fn fetch(&self) -> DashboardResult<Arc<UserStats>> {
        let mut in_flight = InFlight {
            loader: self,
            sequence: self.begin(),
            settled: false,
        };
        let result = self.load().await;
        in_flight.settled = true;
        self.complete(in_flight.sequence, &result);
        result
    }

    /// Repeat the fetch, replacing the cached record on success
    pub async fn refetch(&self) -> DashboardResult<Arc<UserStats>> {
        self.fetch().await
    }

    fn begin(&self) -> u64 {
        let mut sequence = 0;
        self.state.send_modify(|state| {
            sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            state.loading = true;
        });
        tracing::debug!(sequence, "Fetching user stats");
        sequence
    }

    async fn load(&self) -> DashboardResult<Arc<UserStats>> {
        let user = self
            .auth
            .current_user()
            .await
            .map_err(DashboardError::Fetch)?
            .ok_or(DashboardError::Unauthenticated)?;

        let stats = self
            .stats
            .fetch_user_stats(&user)
            .await
            .map_err(DashboardError::Fetch)?;

        tracing::debug!(user_id = %user.id, clicks = stats.clicks, "Fetched user stats");
        Ok(Arc::new(stats))
    }

    fn complete(&self, sequence: u64, result: &DashboardResult<Arc<UserStats>>) {
        let applied = self.state.send_if_modified(|state| {
            // Issuing also happens under the watch lock, so this check and
            // the write below see a consistent latest sequence.
            if sequence != self.issued.load(Ordering::SeqCst) {
                return false;
            }

            state.loading = false;
            state.sequence = sequence;
            match result {
                Ok(stats) => {
                    state.stats = Some(Arc::clone(stats));
                    state.failure = None;
                    state.updated_at = Some(Utc::now());
                }
                Err(e) => {
                    state.failure = Some(LoadFailure::from(e));
                }
            }
            true
        });

        match (applied, result) {
            (false, _) => {
                tracing::debug!(sequence, "Discarding stale stats response");
            }
            (true, Ok(_)) => {
                tracing::info!(sequence, "User stats updated");
            }
            (true, Err(DashboardError::Unauthenticated)) => {
                tracing::info!(sequence, "No authenticated user, stats not loaded");
            }
            (true, Err(e)) => {
                tracing::warn!(sequence, error = %e, "Failed to load user stats");
            }
        }
    }

    /// A fetch was dropped before it finished
    fn abandon(&self, sequence: u64) {
        let applied = self.state.send_if_modified(|state| {
            if sequence != self.issued.load(Ordering::SeqCst) || !state.loading {
                return false;
            }
            state.loading = false;
            state.sequence = sequence;
            true
        });
        if applied {
            tracing::debug!(sequence, "Stats fetch cancelled");
        }
    }
}

/// Clears the loading flag when a fetch future is dropped mid-flight
struct InFlight<'a> {
    loader: &'a StatsLoader,
    sequence: u64,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.loader.abandon(self.sequence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::stats::UserIdentity;
    use crate::test_support::{wait_until, FakeAuth, FakeStats};

    fn loader(auth: Arc<FakeAuth>, stats: Arc<FakeStats>) -> Arc<StatsLoader> {
        Arc::new(StatsLoader::new(auth, stats))
    }

    #[tokio::test]
    async fn test_initial_state_is_empty() {
        let loader = loader(FakeAuth::signed_in("u1"), FakeStats::failing());
        let snapshot = loader.snapshot();
        assert!(snapshot.stats.is_none());
        assert!(!snapshot.loading);
        assert!(snapshot.failure.is_none());
    }

    #[tokio::test]
    async fn test_fetch_caches_record() {
        let stats = FakeStats::returning(UserStats::new(1234.5, 7, 2, 0));
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());

        let fetched = loader.fetch().await.unwrap();
        assert_eq!(*fetched, UserStats::new(1234.5, 7, 2, 0));

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.stats.as_deref(), Some(&UserStats::new(1234.5, 7, 2, 0)));
        assert!(!snapshot.loading);
        assert_eq!(snapshot.sequence, 1);
        assert!(snapshot.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_unauthenticated_skips_stats_fetch() {
        let auth = FakeAuth::signed_out();
        let stats = FakeStats::returning(UserStats::default());
        let loader = loader(auth.clone(), stats.clone());

        let result = loader.fetch().await;
        assert!(matches!(result, Err(DashboardError::Unauthenticated)));
        assert_eq!(auth.calls(), 1);
        assert_eq!(stats.call_count(), 0);

        let snapshot = loader.snapshot();
        assert!(snapshot.stats.is_none());
        assert_eq!(snapshot.failure, Some(LoadFailure::Unauthenticated));
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_fetch_called_once_per_trigger_with_identity() {
        let stats = FakeStats::returning(UserStats::default());
        let loader = loader(FakeAuth::signed_in("user-42"), stats.clone());

        loader.fetch().await.unwrap();
        loader.refetch().await.unwrap();
        loader.refetch().await.unwrap();

        let calls = stats.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|u| *u == UserIdentity::new("user-42")));
        assert_eq!(loader.issued(), 3);
    }

    #[tokio::test]
    async fn test_refetch_replaces_record() {
        let stats = FakeStats::returning(UserStats::new(1.0, 1, 0, 0));
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());

        loader.fetch().await.unwrap();
        let first = loader.snapshot().stats.unwrap();

        stats.set(Some(UserStats::new(2.0, 2, 0, 0)));
        loader.refetch().await.unwrap();
        let second = loader.snapshot().stats.unwrap();

        assert_eq!(first.clicks, 1);
        assert_eq!(second.clicks, 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_record_stays_visible_during_refetch() {
        let stats = FakeStats::returning(UserStats::new(5.0, 3, 0, 0));
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());
        loader.fetch().await.unwrap();

        let gate = stats.gate();
        let pending = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.refetch().await }
        });
        wait_until(|| stats.call_count() == 2).await;

        let snapshot = loader.snapshot();
        assert!(snapshot.loading);
        assert_eq!(snapshot.stats.unwrap().clicks, 3);

        gate.send(Ok(UserStats::new(6.0, 4, 0, 0))).unwrap();
        pending.await.unwrap().unwrap();

        let snapshot = loader.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.stats.unwrap().clicks, 4);
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_record() {
        let stats = FakeStats::returning(UserStats::new(9.99, 1, 1, 1));
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());
        loader.fetch().await.unwrap();

        stats.set(None);
        let result = loader.refetch().await;
        assert!(matches!(result, Err(DashboardError::Fetch(_))));

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.stats.unwrap().earnings, 9.99);
        assert!(matches!(snapshot.failure, Some(LoadFailure::Fetch(_))));
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let stats = FakeStats::returning(UserStats::default());
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());

        let older_gate = stats.gate();
        let older = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.fetch().await }
        });
        wait_until(|| stats.call_count() == 1).await;

        let newer_gate = stats.gate();
        let newer = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.refetch().await }
        });
        wait_until(|| stats.call_count() == 2).await;

        newer_gate.send(Ok(UserStats::new(20.0, 20, 0, 0))).unwrap();
        newer.await.unwrap().unwrap();
        assert_eq!(loader.snapshot().stats.unwrap().clicks, 20);

        older_gate.send(Ok(UserStats::new(10.0, 10, 0, 0))).unwrap();
        let older_result = older.await.unwrap().unwrap();
        assert_eq!(older_result.clicks, 10);

        let snapshot = loader.snapshot();
        assert_eq!(snapshot.stats.unwrap().clicks, 20);
        assert_eq!(snapshot.sequence, 2);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn test_older_completion_does_not_clear_loading() {
        let stats = FakeStats::returning(UserStats::default());
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());

        let older_gate = stats.gate();
        let older = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.fetch().await }
        });
        wait_until(|| stats.call_count() == 1).await;

        let newer_gate = stats.gate();
        let newer = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.refetch().await }
        });
        wait_until(|| stats.call_count() == 2).await;

        older_gate.send(Err(BackendError::Timeout)).unwrap();
        assert!(older.await.unwrap().is_err());

        let snapshot = loader.snapshot();
        assert!(snapshot.loading);
        assert!(snapshot.failure.is_none());

        newer_gate.send(Ok(UserStats::new(1.0, 1, 1, 1))).unwrap();
        newer.await.unwrap().unwrap();
        assert!(!loader.snapshot().loading);
    }

    #[tokio::test]
    async fn test_watchers_are_notified() {
        let loader = loader(
            FakeAuth::signed_in("u1"),
            FakeStats::returning(UserStats::new(0.0, 1, 0, 0)),
        );
        let mut changes = loader.subscribe();

        loader.fetch().await.unwrap();

        assert!(changes.has_changed().unwrap());
        let snapshot = changes.borrow_and_update().clone();
        assert_eq!(snapshot.stats.unwrap().clicks, 1);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_clears_loading() {
        let stats = FakeStats::returning(UserStats::new(5.0, 5, 0, 0));
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());
        loader.fetch().await.unwrap();

        let _gate = stats.gate();
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(20), loader.refetch()).await;
        assert!(timed_out.is_err());

        let snapshot = loader.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.stats.unwrap().clicks, 5);
        assert!(snapshot.failure.is_none());
    }

    #[tokio::test]
    async fn test_cancelling_older_fetch_keeps_newer_loading() {
        let stats = FakeStats::returning(UserStats::default());
        let loader = loader(FakeAuth::signed_in("u1"), stats.clone());

        let _older_gate = stats.gate();
        let older = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.fetch().await }
        });
        wait_until(|| stats.call_count() == 1).await;

        let newer_gate = stats.gate();
        let newer = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move { loader.refetch().await }
        });
        wait_until(|| stats.call_count() == 2).await;

        older.abort();
        assert!(older.await.unwrap_err().is_cancelled());
        assert!(loader.snapshot().loading);

        newer_gate.send(Ok(UserStats::new(2.0, 2, 0, 0))).unwrap();
        newer.await.unwrap().unwrap();
        assert!(!loader.snapshot().loading);
    }
}
