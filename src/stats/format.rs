//! Display formatting for user statistics

use serde::Serialize;

use super::types::UserStats;

/// Format an earnings amount with exactly two decimals, without currency sign
pub fn format_earnings(earnings: f64) -> String {
    if earnings.is_finite() && earnings > 0.0 {
        format!("{:.2}", earnings)
    } else {
        "0.00".to_string()
    }
}

/// Format a counter as a plain integer
pub fn format_count(count: u64) -> String {
    count.to_string()
}

/// Singular only for exactly one click
pub fn clicks_label(clicks: u64) -> &'static str {
    if clicks == 1 {
        "Click"
    } else {
        "Clicks"
    }
}

/// Display text for every stats panel on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsDisplay {
    /// Total earnings including currency sign, e.g. `$1234.50`
    pub earnings: String,
    /// Clicks sentence, e.g. `You have 7 Clicks`
    pub clicks: String,
    pub referrals: String,
    pub offers: String,
}

impl StatsDisplay {
    /// Build display text; an absent record renders as all zeros
    pub fn from_stats(stats: Option<&UserStats>) -> Self {
        let stats = stats.cloned().unwrap_or_default();
        Self {
            earnings: format!("${}", format_earnings(stats.earnings)),
            clicks: format!("You have {} {}", stats.clicks, clicks_label(stats.clicks)),
            referrals: format_count(stats.referrals),
            offers: format_count(stats.offers),
        }
    }
}

impl From<&UserStats> for StatsDisplay {
    fn from(stats: &UserStats) -> Self {
        Self::from_stats(Some(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earnings_two_decimals() {
        assert_eq!(format_earnings(1234.5), "1234.50");
        assert_eq!(format_earnings(0.0), "0.00");
        assert_eq!(format_earnings(3.0), "3.00");
        assert_eq!(format_earnings(9.999), "10.00");
        assert_eq!(format_earnings(f64::NAN), "0.00");
    }

    #[test]
    fn test_clicks_pluralization() {
        assert_eq!(clicks_label(0), "Clicks");
        assert_eq!(clicks_label(1), "Click");
        assert_eq!(clicks_label(2), "Clicks");
        assert_eq!(clicks_label(11), "Clicks");
    }

    #[test]
    fn test_display_scenario() {
        let stats = UserStats::new(1234.5, 7, 2, 0);
        let display = StatsDisplay::from(&stats);
        assert_eq!(display.earnings, "$1234.50");
        assert_eq!(display.clicks, "You have 7 Clicks");
        assert_eq!(display.referrals, "2");
        assert_eq!(display.offers, "0");
    }

    #[test]
    fn test_single_click_sentence() {
        let display = StatsDisplay::from(&UserStats::new(0.0, 1, 0, 0));
        assert_eq!(display.clicks, "You have 1 Click");
    }

    #[test]
    fn test_absent_record_renders_zeros() {
        let display = StatsDisplay::from_stats(None);
        assert_eq!(display.earnings, "$0.00");
        assert_eq!(display.clicks, "You have 0 Clicks");
        assert_eq!(display.referrals, "0");
        assert_eq!(display.offers, "0");
    }
}
