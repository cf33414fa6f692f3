//! Dashboard View
//!
//! Composes the stats loader and the realtime listener for the lifetime of
//! one mounted dashboard, and turns the loader's snapshot into a screen.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::{DashboardResult, LoadFailure};
use super::listener::{ListenerConfig, ListenerGuard, RealtimeListener};
use super::loader::{StatsLoader, StatsSnapshot};
use crate::backend::BackendContext;
use crate::config::Config;
use crate::share::{ReferralLink, ShareLink, ShareTarget};
use crate::stats::{StatsDisplay, UserStats};

/// A dashboard that can be mounted any number of times
pub struct DashboardView {
    context: BackendContext,
    listener: ListenerConfig,
    referral_link: ReferralLink,
}

impl DashboardView {
    pub fn new(context: BackendContext, listener: ListenerConfig, referral_link: ReferralLink) -> Self {
        Self {
            context,
            listener,
            referral_link,
        }
    }

    pub fn from_config(context: BackendContext, config: &Config) -> Self {
        Self::new(
            context,
            ListenerConfig::from_config(&config.realtime),
            ReferralLink::new(config.referral.link.clone()),
        )
    }

    pub fn referral_link(&self) -> &ReferralLink {
        &self.referral_link
    }

    /// Start the initial fetch, then subscribe to changes.
    ///
    /// A failed subscription does not fail the mount; the dashboard is
    /// shown without live updates.
    pub async fn mount(&self) -> MountedDashboard {
        let loader = Arc::new(StatsLoader::from_context(&self.context));

        let initial = tokio::spawn({
            let loader = Arc::clone(&loader);
            async move {
                // Outcome lands in the loader's snapshot
                let _ = loader.fetch().await;
            }
        });

        let listener = match RealtimeListener::from_context(&self.context, self.listener.clone())
            .activate(Arc::clone(&loader))
            .await
        {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!(error = %e, "Dashboard mounted without live updates");
                None
            }
        };

        MountedDashboard {
            loader,
            initial,
            listener,
            referral_link: self.referral_link.clone(),
        }
    }
}

/// A mounted dashboard. Dropping it unmounts.
pub struct MountedDashboard {
    loader: Arc<StatsLoader>,
    initial: JoinHandle<()>,
    listener: Option<ListenerGuard>,
    referral_link: ReferralLink,
}

impl MountedDashboard {
    pub fn loader(&self) -> &Arc<StatsLoader> {
        &self.loader
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.loader.snapshot()
    }

    /// Receiver notified whenever the snapshot changes
    pub fn changes(&self) -> watch::Receiver<StatsSnapshot> {
        self.loader.subscribe()
    }

    /// Subscribed to realtime changes and the event stream is still open
    pub fn is_live(&self) -> bool {
        self.listener.as_ref().is_some_and(ListenerGuard::is_running)
    }

    pub fn listener(&self) -> Option<&ListenerGuard> {
        self.listener.as_ref()
    }

    /// Wait until at least one fetch has completed and none is in flight
    pub async fn settled(&self) -> StatsSnapshot {
        let mut changes = self.changes();
        let settled = changes
            .wait_for(|s| s.sequence > 0 && !s.loading)
            .await
            .map(|s| s.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Manual refetch
    pub async fn refresh(&self) -> DashboardResult<Arc<UserStats>> {
        self.loader.refetch().await
    }

    pub fn render(&self) -> Screen {
        Screen::from_snapshot(&self.snapshot(), &self.referral_link, self.is_live())
    }

    pub fn unmount(self) {}
}

impl Drop for MountedDashboard {
    fn drop(&mut self) {
        self.initial.abort();
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
        tracing::debug!("Dashboard unmounted");
    }
}

/// The stats, link and share panels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardPanels {
    pub title: String,
    pub stats: StatsDisplay,
    pub referral_link: String,
    pub share: Vec<ShareLink>,
    /// A refetch is in flight
    pub refreshing: bool,
    pub live: bool,
}

/// What the dashboard currently shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    Loading,
    SignInRequired,
    Error { message: String },
    Dashboard(DashboardPanels),
}

impl Screen {
    pub fn from_snapshot(snapshot: &StatsSnapshot, link: &ReferralLink, live: bool) -> Self {
        if let Some(stats) = &snapshot.stats {
            return Screen::Dashboard(DashboardPanels {
                title: "Dashboard".to_string(),
                stats: StatsDisplay::from(stats.as_ref()),
                referral_link: link.as_str().to_string(),
                share: ShareTarget::ALL.into_iter().map(ShareLink::from).collect(),
                refreshing: snapshot.loading,
                live,
            });
        }

        match &snapshot.failure {
            Some(LoadFailure::Unauthenticated) => Screen::SignInRequired,
            Some(LoadFailure::Fetch(message)) => Screen::Error {
                message: message.clone(),
            },
            None => Screen::Loading,
        }
    }
}

impl std::fmt::Display for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Screen::Loading => writeln!(f, "Loading..."),
            Screen::SignInRequired => {
                writeln!(f, "Not authenticated")?;
                writeln!(f, "Sign in to see your referral stats.")
            }
            Screen::Error { message } => {
                writeln!(f, "Something went wrong")?;
                writeln!(f, "{}", message)
            }
            Screen::Dashboard(panels) => {
                writeln!(f, "{}", panels.title)?;
                writeln!(f)?;
                writeln!(f, "Total Earnings")?;
                writeln!(f, "  {}", panels.stats.earnings)?;
                writeln!(f, "  {}", panels.stats.clicks)?;
                writeln!(f, "Referrals")?;
                writeln!(f, "  {}", panels.stats.referrals)?;
                writeln!(f, "Offers")?;
                writeln!(f, "  {}", panels.stats.offers)?;
                writeln!(f)?;
                writeln!(f, "Copy Your Referral Link 👇")?;
                writeln!(f, "  {}", panels.referral_link)?;
                writeln!(f)?;
                writeln!(f, "Share on Social Media")?;
                for link in &panels.share {
                    writeln!(f, "  {:<20} {}", link.label, link.url)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, earnings_update, wait_until, FakeAuth, FakeRealtime, FakeStats};

    fn link() -> ReferralLink {
        ReferralLink::new("ref.referralpro.com/user123")
    }

    fn view(auth: Arc<FakeAuth>, stats: Arc<FakeStats>, realtime: Arc<FakeRealtime>) -> DashboardView {
        DashboardView::new(
            context(auth, stats, realtime),
            ListenerConfig::default(),
            link(),
        )
    }

    #[test]
    fn test_render_scenario() {
        let snapshot = StatsSnapshot {
            stats: Some(Arc::new(UserStats::new(1234.5, 7, 2, 0))),
            sequence: 1,
            ..StatsSnapshot::default()
        };

        let screen = Screen::from_snapshot(&snapshot, &link(), true);
        let Screen::Dashboard(panels) = &screen else {
            panic!("Expected dashboard, got {:?}", screen);
        };
        assert_eq!(panels.stats.earnings, "$1234.50");
        assert_eq!(panels.stats.clicks, "You have 7 Clicks");
        assert_eq!(panels.stats.referrals, "2");
        assert_eq!(panels.stats.offers, "0");

        let text = screen.to_string();
        assert!(text.contains("Total Earnings"));
        assert!(text.contains("$1234.50"));
        assert!(text.contains("Copy Your Referral Link 👇"));
        assert!(text.contains("ref.referralpro.com/user123"));
        assert!(text.contains("Share on Instagram"));
    }

    #[test]
    fn test_loading_shows_no_numbers() {
        let snapshot = StatsSnapshot {
            loading: true,
            ..StatsSnapshot::default()
        };
        let screen = Screen::from_snapshot(&snapshot, &link(), false);
        assert_eq!(screen, Screen::Loading);

        let text = screen.to_string();
        assert_eq!(text.trim(), "Loading...");
        assert!(!text.chars().any(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_failure_screens() {
        let signed_out = StatsSnapshot {
            failure: Some(LoadFailure::Unauthenticated),
            sequence: 1,
            ..StatsSnapshot::default()
        };
        assert_eq!(
            Screen::from_snapshot(&signed_out, &link(), false),
            Screen::SignInRequired
        );

        let failed = StatsSnapshot {
            failure: Some(LoadFailure::Fetch("Request timeout".to_string())),
            sequence: 1,
            ..StatsSnapshot::default()
        };
        assert_eq!(
            Screen::from_snapshot(&failed, &link(), false),
            Screen::Error {
                message: "Request timeout".to_string()
            }
        );
    }

    #[test]
    fn test_cached_record_wins_over_failure() {
        let snapshot = StatsSnapshot {
            stats: Some(Arc::new(UserStats::new(1.0, 1, 0, 0))),
            failure: Some(LoadFailure::Fetch("boom".to_string())),
            loading: true,
            sequence: 2,
            ..StatsSnapshot::default()
        };
        match Screen::from_snapshot(&snapshot, &link(), true) {
            Screen::Dashboard(panels) => {
                assert!(panels.refreshing);
                assert_eq!(panels.stats.clicks, "You have 1 Click");
            }
            other => panic!("Expected dashboard, got {:?}", other),
        }
    }

    #[test]
    fn test_screen_json() {
        let json = serde_json::to_value(Screen::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["screen"], "error");
        assert_eq!(json["message"], "boom");
    }

    #[tokio::test]
    async fn test_mount_loads_and_goes_live() {
        let stats = FakeStats::returning(UserStats::new(1234.5, 7, 2, 0));
        let realtime = FakeRealtime::new();
        let view = view(FakeAuth::signed_in("u1"), stats.clone(), realtime.clone());

        let dashboard = view.mount().await;
        dashboard.settled().await;

        assert!(dashboard.is_live());
        assert_eq!(realtime.open_count(), 1);
        match dashboard.render() {
            Screen::Dashboard(panels) => assert_eq!(panels.stats.earnings, "$1234.50"),
            other => panic!("Expected dashboard, got {:?}", other),
        }

        stats.set(Some(UserStats::new(1240.0, 8, 2, 0)));
        realtime.emit(earnings_update());
        wait_until(|| dashboard.snapshot().stats.is_some_and(|s| s.clicks == 8)).await;
        assert_eq!(stats.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mount_signed_out() {
        let stats = FakeStats::returning(UserStats::default());
        let view = view(FakeAuth::signed_out(), stats.clone(), FakeRealtime::new());

        let dashboard = view.mount().await;
        dashboard.settled().await;

        assert_eq!(dashboard.render(), Screen::SignInRequired);
        assert_eq!(stats.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mount_without_realtime() {
        let view = view(
            FakeAuth::signed_in("u1"),
            FakeStats::returning(UserStats::default()),
            FakeRealtime::failing(),
        );

        let dashboard = view.mount().await;
        dashboard.settled().await;

        assert!(!dashboard.is_live());
        assert!(matches!(dashboard.render(), Screen::Dashboard(_)));
    }

    #[tokio::test]
    async fn test_unmount_releases_and_remount_resubscribes() {
        let realtime = FakeRealtime::new();
        let view = view(
            FakeAuth::signed_in("u1"),
            FakeStats::returning(UserStats::default()),
            realtime.clone(),
        );

        let first = view.mount().await;
        first.settled().await;
        first.unmount();
        assert_eq!(realtime.released().len(), 1);
        assert_eq!(realtime.open_count(), 0);

        let second = view.mount().await;
        second.settled().await;
        assert_eq!(realtime.requests().len(), 2);
        assert_eq!(realtime.open_count(), 1);

        drop(second);
        assert_eq!(realtime.released().len(), 2);
    }

    #[tokio::test]
    async fn test_late_unmount_of_old_view_keeps_new_view_live() {
        let stats = FakeStats::returning(UserStats::new(1.0, 1, 0, 0));
        let realtime = FakeRealtime::new();
        let view = view(FakeAuth::signed_in("u1"), stats.clone(), realtime.clone());

        let old = view.mount().await;
        let new = view.mount().await;
        old.settled().await;
        new.settled().await;

        old.unmount();
        assert!(realtime.left().is_empty());
        assert!(new.is_live());

        stats.set(Some(UserStats::new(2.0, 2, 0, 0)));
        assert_eq!(realtime.emit(earnings_update()), 1);
        wait_until(|| new.snapshot().stats.is_some_and(|s| s.clicks == 2)).await;
    }

    #[tokio::test]
    async fn test_unmount_aborts_initial_fetch() {
        let stats = FakeStats::returning(UserStats::default());
        let gate = stats.gate();
        let view = view(FakeAuth::signed_in("u1"), stats.clone(), FakeRealtime::new());

        let dashboard = view.mount().await;
        wait_until(|| stats.call_count() == 1).await;

        dashboard.unmount();
        wait_until(|| gate.is_closed()).await;
    }
}
