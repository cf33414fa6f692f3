//! Realtime Message Types
//!
//! Phoenix channel frames exchanged with the realtime server. Every frame is
//! a JSON envelope `{topic, event, payload, ref, join_ref}`; the `event`
//! string decides how the payload is read.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::types::{ChangeEvent, SubscriptionRequest};

/// Protocol version sent in the connection URL
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Topic used for connection-level heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

/// One Phoenix channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl Frame {
    /// Join a channel; the join ref is the frame's own ref
    pub fn join(topic: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload,
            join_ref: Some(reference.clone()),
            reference: Some(reference),
        }
    }

    pub fn leave(topic: &str, reference: String, join_ref: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference),
            join_ref,
        }
    }

    pub fn heartbeat(reference: String) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference),
            join_ref: None,
        }
    }

    /// Interpret a frame received from the server
    pub fn decode(self) -> ServerEvent {
        match self.event.as_str() {
            EVENT_REPLY => {
                let status = match self.payload.get("status").and_then(Value::as_str) {
                    Some("ok") => ReplyStatus::Ok,
                    Some("timeout") => ReplyStatus::Timeout,
                    _ => ReplyStatus::Error,
                };
                let response = self.payload.get("response").cloned().unwrap_or(Value::Null);
                ServerEvent::Reply {
                    reference: self.reference,
                    status,
                    response,
                }
            }
            EVENT_POSTGRES_CHANGES => {
                let data = self.payload.get("data").cloned().unwrap_or_default();
                match serde_json::from_value::<ChangeEvent>(data.clone()) {
                    Ok(change) => ServerEvent::Change(change),
                    Err(e) => {
                        // Still a change notification; the refetch reads the row anyway
                        tracing::warn!(topic = %self.topic, error = %e, "Unreadable postgres_changes payload");
                        ServerEvent::Change(ChangeEvent::lenient(&data))
                    }
                }
            }
            EVENT_ERROR => ServerEvent::ChannelError,
            EVENT_CLOSE => ServerEvent::ChannelClosed,
            EVENT_SYSTEM => ServerEvent::System {
                status: string_field(&self.payload, "status"),
                message: string_field(&self.payload, "message"),
            },
            _ => ServerEvent::Ignored(self.event),
        }
    }
}

fn string_field(payload: &Value, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Status carried by a `phx_reply`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
    Timeout,
}

/// Decoded server frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Reply to a join, leave or heartbeat
    Reply {
        reference: Option<String>,
        status: ReplyStatus,
        response: Value,
    },
    /// A row changed
    Change(ChangeEvent),
    /// The server crashed the channel process
    ChannelError,
    /// The server closed the channel
    ChannelClosed,
    /// Subscription status notices
    System { status: String, message: String },
    /// Frame we do not act on (presence, broadcast, ...)
    Ignored(String),
}

/// Topic name for a channel
pub fn channel_topic(channel: &str) -> String {
    format!("realtime:{}", channel)
}

/// Join payload registering interest in row changes of one table
pub fn join_payload(request: &SubscriptionRequest, access_token: Option<&str>) -> Value {
    let mut payload = json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": request.event.as_str(),
                "schema": request.schema,
                "table": request.table,
            }],
        }
    });

    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    payload
}

/// Websocket endpoint for a backend base URL
pub fn websocket_url(base_url: &str, api_key: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };

    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn={}",
        base,
        urlencoding::encode(api_key),
        PROTOCOL_VERSION
    )
}
