//! Stats Model
//!
//! The per-user stats record, its display text, and the bookkeeping that
//! decides which fetch result may update the page.

use serde::{Deserialize, Deserializer};

/// Aggregate stats for the signed-in user
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct UserStats {
    #[serde(default, deserialize_with = "null_as_default")]
    pub earnings: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clicks: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub referrals: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub offers: u64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Authenticated user returned by the auth endpoint
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Why the latest load failed
#[derive(Clone, Debug, PartialEq)]
pub enum LoadFailure {
    Unauthenticated,
    Fetch(String),
}

/// Two decimals, `0.00` for anything that is not a positive amount
pub fn format_earnings(earnings: f64) -> String {
    if earnings.is_finite() && earnings > 0.0 {
        format!("{:.2}", earnings)
    } else {
        "0.00".to_string()
    }
}

pub fn clicks_label(clicks: u64) -> &'static str {
    if clicks == 1 {
        "Click"
    } else {
        "Clicks"
    }
}

/// Text for the stat cards
#[derive(Clone, Debug, PartialEq)]
pub struct StatsDisplay {
    pub earnings: String,
    pub clicks: String,
    pub referrals: String,
    pub offers: String,
}

impl From<&UserStats> for StatsDisplay {
    fn from(stats: &UserStats) -> Self {
        Self {
            earnings: format!("${}", format_earnings(stats.earnings)),
            clicks: format!("You have {} {}", stats.clicks, clicks_label(stats.clicks)),
            referrals: stats.referrals.to_string(),
            offers: stats.offers.to_string(),
        }
    }
}

/// Which view the dashboard page shows
#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    Loading,
    SignInRequired,
    Error(String),
    Dashboard(StatsDisplay),
}

impl Screen {
    /// A cached record always wins; failures only show without one
    pub fn select(stats: Option<&UserStats>, failure: Option<&LoadFailure>) -> Self {
        match (stats, failure) {
            (Some(stats), _) => Screen::Dashboard(StatsDisplay::from(stats)),
            (None, Some(LoadFailure::Unauthenticated)) => Screen::SignInRequired,
            (None, Some(LoadFailure::Fetch(message))) => Screen::Error(message.clone()),
            (None, None) => Screen::Loading,
        }
    }
}

/// Numbers fetches so only the most recently issued one is applied
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestSequence {
    issued: u64,
}

impl RequestSequence {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    pub fn is_latest(&self, sequence: u64) -> bool {
        sequence == self.issued
    }
}
