//! User Statistics
//!
//! The aggregate per-user record shown on the dashboard and the helpers that
//! turn it into display text:
//!
//! - **types**: `UserStats` and `UserIdentity`
//! - **format**: Currency, count and pluralization formatting

mod format;
mod types;

pub use format::{clicks_label, format_count, format_earnings, StatsDisplay};
pub use types::{UserIdentity, UserStats};
