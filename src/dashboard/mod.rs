//! Referral Dashboard
//!
//! The live dashboard view and the two pieces it is built from:
//!
//! - **loader**: `StatsLoader`, fetches and caches the user's stats
//! - **listener**: `RealtimeListener`, refetches on table change events
//! - **view**: `DashboardView`, mounts both and renders a `Screen`

mod error;
mod listener;
mod loader;
mod view;

pub use error::{DashboardError, DashboardResult, LoadFailure};
pub use listener::{ListenerConfig, ListenerGuard, RealtimeListener, SubscriptionGuard};
pub use loader::{StatsLoader, StatsSnapshot};
pub use view::{DashboardPanels, DashboardView, MountedDashboard, Screen};
