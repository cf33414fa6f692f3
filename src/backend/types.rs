//! Realtime subscription types shared by every realtime source

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::RealtimeConfig;

/// Which row changes a subscription wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventFilter {
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl EventFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFilter::All => "*",
            EventFilter::Insert => "INSERT",
            EventFilter::Update => "UPDATE",
            EventFilter::Delete => "DELETE",
        }
    }

    /// Parse a config value; unknown masks fall back to all events
    pub fn parse(mask: &str) -> Self {
        match mask.trim().to_ascii_uppercase().as_str() {
            "INSERT" => EventFilter::Insert,
            "UPDATE" => EventFilter::Update,
            "DELETE" => EventFilter::Delete,
            _ => EventFilter::All,
        }
    }

    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Insert => kind == ChangeKind::Insert,
            EventFilter::Update => kind == ChangeKind::Update,
            EventFilter::Delete => kind == ChangeKind::Delete,
        }
    }
}

/// What to subscribe to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub channel: String,
    pub schema: String,
    pub table: String,
    pub event: EventFilter,
}

impl SubscriptionRequest {
    /// All change events on `public.<table>` over the named channel
    pub fn table(channel: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            schema: "public".to_string(),
            table: table.into(),
            event: EventFilter::All,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self {
            channel: config.channel.clone(),
            schema: config.schema.clone(),
            table: config.table.clone(),
            event: EventFilter::parse(&config.event),
        }
    }
}

/// Identifies one live subscription so it can be released
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: String,
    channel: String,
}

impl SubscriptionHandle {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: channel.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// A live subscription: its handle plus the stream of delivered changes
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// The server reported a change we could not read
    Unknown,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
            ChangeKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// One row-level change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub schema: String,
    pub table: String,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
    /// New row (empty for deletes)
    #[serde(default)]
    pub record: serde_json::Value,
    /// Previous row (primary key only unless replica identity is full)
    #[serde(default)]
    pub old_record: serde_json::Value,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            kind,
            schema: schema.into(),
            table: table.into(),
            commit_timestamp: None,
            record: serde_json::Value::Null,
            old_record: serde_json::Value::Null,
        }
    }

    /// Best-effort read of a change payload that failed strict decoding
    pub fn lenient(data: &serde_json::Value) -> Self {
        let text = |key: &str| {
            data.get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let kind = data
            .get("type")
            .cloned()
            .and_then(|kind| serde_json::from_value(kind).ok())
            .unwrap_or(ChangeKind::Unknown);

        Self {
            kind,
            schema: text("schema"),
            table: text("table"),
            commit_timestamp: None,
            record: data.get("record").cloned().unwrap_or_default(),
            old_record: data.get("old_record").cloned().unwrap_or_default(),
        }
    }
}
