//! Core data types for user statistics
//!
//! - `UserStats`: Read-only aggregate snapshot for one user
//! - `UserIdentity`: The authenticated user the snapshot belongs to

use serde::{Deserialize, Deserializer, Serialize};

/// Aggregate statistics for one user
///
/// A snapshot as returned by the backend. Every field falls back to zero when
/// the backend omits it or sends `null`. Snapshots are never mutated; a
/// refetch produces a new one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserStats {
    /// Total earnings in currency units
    #[serde(default, deserialize_with = "null_as_default")]
    pub earnings: f64,
    /// Number of tracked link clicks
    #[serde(default, deserialize_with = "null_as_default")]
    pub clicks: u64,
    /// Number of referred users
    #[serde(default, deserialize_with = "null_as_default")]
    pub referrals: u64,
    /// Number of offers
    #[serde(default, deserialize_with = "null_as_default")]
    pub offers: u64,
}

impl UserStats {
    /// Create a snapshot from explicit values
    pub fn new(earnings: f64, clicks: u64, referrals: u64, offers: u64) -> Self {
        Self {
            earnings: earnings.max(0.0),
            clicks,
            referrals,
            offers,
        }
    }

    /// Check whether every counter is zero
    pub fn is_empty(&self) -> bool {
        self.earnings == 0.0 && self.clicks == 0 && self.referrals == 0 && self.offers == 0
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The currently authenticated user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserIdentity {
    /// Backend user id (a UUID for Supabase projects)
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }

    /// Builder method: set the e-mail address
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.email {
            Some(email) => write!(f, "{} <{}>", self.id, email),
            None => write!(f, "{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_zero() {
        let stats: UserStats = serde_json::from_str(r#"{"clicks": 3}"#).unwrap();
        assert_eq!(stats.clicks, 3);
        assert_eq!(stats.earnings, 0.0);
        assert_eq!(stats.referrals, 0);
        assert_eq!(stats.offers, 0);
    }

    #[test]
    fn test_null_fields_default_to_zero() {
        let json = r#"{"earnings": null, "clicks": null, "referrals": 4, "offers": null}"#;
        let stats: UserStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats, UserStats::new(0.0, 0, 4, 0));
    }

    #[test]
    fn test_extra_columns_ignored() {
        let json = r#"{"user_id": "abc", "earnings": 12.25, "clicks": 1, "referrals": 0, "offers": 2}"#;
        let stats: UserStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.earnings, 12.25);
        assert_eq!(stats.offers, 2);
    }

    #[test]
    fn test_new_clamps_negative_earnings() {
        let stats = UserStats::new(-5.0, 0, 0, 0);
        assert_eq!(stats.earnings, 0.0);
        assert!(stats.is_empty());
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(UserIdentity::new("u1").to_string(), "u1");
        assert_eq!(
            UserIdentity::new("u1").email("a@b.c").to_string(),
            "u1 <a@b.c>"
        );
    }
}
