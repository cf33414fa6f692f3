//! UI Components
//!
//! Reusable Leptos components for the dashboard.

pub mod loading;
pub mod referral_link;
pub mod share_buttons;
pub mod sidebar;
pub mod stat_card;
pub mod toast;

pub use loading::Loading;
pub use referral_link::ReferralLinkCard;
pub use share_buttons::ShareButtons;
pub use sidebar::Sidebar;
pub use stat_card::{EarningsCard, StatCard};
pub use toast::Toast;
