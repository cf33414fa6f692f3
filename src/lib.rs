//! # Referral Dashboard
//!
//! A live referral earnings dashboard backed by a hosted
//! backend-as-a-service (auth, table queries and realtime row changes).
//!
//! ## Features
//!
//! - **Stats loading**: Resolves the signed-in user and fetches their
//!   earnings, clicks, referrals and offers
//! - **Live refresh**: Refetches whenever the earnings table changes
//! - **Ordered updates**: A late response never overwrites a newer one
//! - **Sharing**: Copy the referral link, share on social networks
//!
//! ## Modules
//!
//! - [`stats`]: The `UserStats` record and its display formatting
//! - [`backend`]: Collaborator traits plus the REST and realtime clients
//! - [`dashboard`]: Stats loader, realtime listener and the mounted view
//! - [`share`]: Referral link copy and share targets
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use referral_dashboard::backend::{BackendContext, DisabledRealtime, SupabaseClient};
//! use referral_dashboard::config::Config;
//! use referral_dashboard::dashboard::DashboardView;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let client = Arc::new(SupabaseClient::new(config.backend.clone())?);
//!     let context = BackendContext::supabase(client, Arc::new(DisabledRealtime));
//!
//!     let view = DashboardView::from_config(context, &config);
//!     let dashboard = view.mount().await;
//!     dashboard.settled().await;
//!
//!     println!("{}", dashboard.render());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod dashboard;
pub mod share;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use dashboard::{DashboardView, Screen, StatsLoader};
pub use stats::UserStats;
