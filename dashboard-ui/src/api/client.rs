//! HTTP API Client
//!
//! Functions for talking to the backend's auth and REST endpoints.

use gloo_net::http::{Request, RequestBuilder};

use crate::stats::{LoadFailure, UserIdentity, UserStats};

/// Default backend base URL
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";

/// Default referral link
pub const DEFAULT_REFERRAL_LINK: &str = "ref.referralpro.com/user123";

const STATS_TABLE: &str = "user_stats";

/// Connection settings, read from local storage
#[derive(Clone, Debug, PartialEq)]
pub struct BackendSettings {
    pub url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub referral_link: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            anon_key: String::new(),
            access_token: None,
            referral_link: DEFAULT_REFERRAL_LINK.to_string(),
        }
    }
}

impl BackendSettings {
    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Realtime websocket endpoint
    pub fn websocket_url(&self) -> String {
        let base = self
            .base_url()
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            base,
            String::from(js_sys::encode_uri_component(&self.anon_key))
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request
            .header("apikey", &self.anon_key)
            .header("Authorization", &format!("Bearer {}", token))
    }
}

fn storage_item(key: &str) -> Option<String> {
    let storage = web_sys::window()?.local_storage().ok()??;
    storage.get_item(key).ok()?.filter(|v| !v.is_empty())
}

/// Read settings from local storage, falling back to defaults
pub fn get_settings() -> BackendSettings {
    let defaults = BackendSettings::default();
    BackendSettings {
        url: storage_item("referral_backend_url").unwrap_or(defaults.url),
        anon_key: storage_item("referral_anon_key").unwrap_or(defaults.anon_key),
        access_token: storage_item("referral_access_token"),
        referral_link: storage_item("referral_link").unwrap_or(defaults.referral_link),
    }
}

/// Resolve the signed-in user; `None` without a valid token
pub async fn fetch_current_user(settings: &BackendSettings) -> Result<Option<UserIdentity>, String> {
    if settings.access_token.is_none() {
        return Ok(None);
    }

    let response = settings
        .authorize(Request::get(&format!("{}/auth/v1/user", settings.base_url())))
        .send()
        .await
        .map_err(|e| format!("Network error: {}", e))?;

    match response.status() {
        401 | 403 => Ok(None),
        _ if response.ok() => response
            .json::<UserIdentity>()
            .await
            .map(Some)
            .map_err(|e| format!("Parse error: {}", e)),
        status => Err(format!("Auth request failed with status {}", status)),
    }
}

/// Stats row for one user; a missing row means all zeros
pub async fn fetch_user_stats(
    settings: &BackendSettings,
    user: &UserIdentity,
) -> Result<UserStats, String> {
    let url = format!(
        "{}/rest/v1/{}?user_id=eq.{}&select=earnings,clicks,referrals,offers",
        settings.base_url(),
        STATS_TABLE,
        String::from(js_sys::encode_uri_component(&user.id))
    );

    let response = settings
        .authorize(Request::get(&url))
        .send()
        .await
        .map_err(|e| format!("Network error: {}", e))?;

    if !response.ok() {
        let body = response.text().await.unwrap_or_default();
        return Err(format!("Stats request failed ({}): {}", response.status(), body));
    }

    let rows: Vec<UserStats> = response
        .json()
        .await
        .map_err(|e| format!("Parse error: {}", e))?;

    Ok(rows.into_iter().next().unwrap_or_default())
}

/// Resolve the user, then fetch their stats
pub async fn load_user_stats(settings: &BackendSettings) -> Result<UserStats, LoadFailure> {
    let user = fetch_current_user(settings)
        .await
        .map_err(LoadFailure::Fetch)?
        .ok_or(LoadFailure::Unauthenticated)?;

    fetch_user_stats(settings, &user)
        .await
        .map_err(LoadFailure::Fetch)
}
