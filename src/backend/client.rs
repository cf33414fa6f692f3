//! Supabase REST Client
//!
//! HTTP client for the hosted backend's auth (GoTrue) and query (PostgREST)
//! endpoints.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::error::{BackendError, BackendResult};
use super::{AuthProvider, StatsSource};
use crate::config::BackendConfig;
use crate::stats::{UserIdentity, UserStats};

/// Columns requested from the stats table
const STATS_COLUMNS: &str = "earnings,clicks,referrals,offers";

/// REST client for auth and stats queries
pub struct SupabaseClient {
    client: Client,
    config: BackendConfig,
}

impl SupabaseClient {
    /// Create a new client with the given configuration
    pub fn new(config: BackendConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn auth_user_url(&self) -> String {
        format!("{}/auth/v1/user", self.config.base_url())
    }

    /// PostgREST query for one user's stats row
    pub fn stats_url(&self, user: &UserIdentity) -> String {
        format!(
            "{}/rest/v1/{}?user_id=eq.{}&select={}",
            self.config.base_url(),
            self.config.stats_table,
            urlencoding::encode(&user.id),
            STATS_COLUMNS
        )
    }

    /// Attach the api key and the bearer token (user token, else anon key)
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .config
            .access_token()
            .unwrap_or(self.config.anon_key.as_str());

        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    async fn api_error(response: reqwest::Response) -> BackendError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        BackendError::ApiError {
            status: status.as_u16(),
            message: text,
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseClient {
    async fn current_user(&self) -> BackendResult<Option<UserIdentity>> {
        if self.config.access_token().is_none() {
            tracing::debug!("No access token configured, treating user as signed out");
            return Ok(None);
        }

        let response = self
            .authorize(self.client.get(self.auth_user_url()))
            .send()
            .await
            .map_err(BackendError::from_send)?;

        match response.status() {
            status if status.is_success() => {
                let user: AuthUser = response.json().await?;
                tracing::debug!(user_id = %user.id, "Resolved current user");
                Ok(Some(user.into()))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::info!("Access token rejected, user is signed out");
                Ok(None)
            }
            _ => Err(Self::api_error(response).await),
        }
    }
}

#[async_trait]
impl StatsSource for SupabaseClient {
    async fn fetch_user_stats(&self, user: &UserIdentity) -> BackendResult<UserStats> {
        let response = self
            .authorize(self.client.get(self.stats_url(user)))
            .send()
            .await
            .map_err(BackendError::from_send)?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let body = response.text().await?;
        parse_stats_rows(&body)
    }
}

/// A user without a stats row yet has all-zero stats
fn parse_stats_rows(body: &str) -> BackendResult<UserStats> {
    let rows: Vec<UserStats> = serde_json::from_str(body)?;
    Ok(rows.into_iter().next().unwrap_or_default())
}

// ============================================
// Response DTOs
// ============================================

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<AuthUser> for UserIdentity {
    fn from(user: AuthUser) -> Self {
        UserIdentity {
            id: user.id,
            email: user.email.filter(|e| !e.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new(BackendConfig {
            url: "https://demo.supabase.co/".to_string(),
            anon_key: "anon".to_string(),
            ..BackendConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(client.auth_user_url(), "https://demo.supabase.co/auth/v1/user");
        assert_eq!(
            client.stats_url(&UserIdentity::new("a b")),
            "https://demo.supabase.co/rest/v1/user_stats?user_id=eq.a%20b&select=earnings,clicks,referrals,offers"
        );
    }

    #[test]
    fn test_parse_stats_rows() {
        let stats =
            parse_stats_rows(r#"[{"earnings": 1234.5, "clicks": 7, "referrals": 2, "offers": 0}]"#)
                .unwrap();
        assert_eq!(stats, UserStats::new(1234.5, 7, 2, 0));
    }

    #[test]
    fn test_parse_empty_rows_is_zero() {
        let stats = parse_stats_rows("[]").unwrap();
        assert!(stats.is_empty());
    }

    #[test]
    fn test_parse_garbage_fails() {
        let result = parse_stats_rows(r#"{"message": "relation does not exist"}"#);
        assert!(matches!(result, Err(BackendError::Serialization(_))));
    }

    #[test]
    fn test_auth_user_conversion() {
        let user: AuthUser =
            serde_json::from_str(r#"{"id": "u-1", "email": "", "role": "authenticated"}"#).unwrap();
        let identity: UserIdentity = user.into();
        assert_eq!(identity, UserIdentity::new("u-1"));
    }

    #[tokio::test]
    async fn test_no_token_means_signed_out() {
        let user = client().current_user().await.unwrap();
        assert!(user.is_none());
    }
}
