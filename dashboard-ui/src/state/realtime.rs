//! Realtime Channel
//!
//! Websocket subscription to row changes on the earnings table. Every
//! change triggers a stats refetch. The channel reconnects with backoff
//! until it is closed, which the dashboard page does on cleanup. A channel
//! the server errors is rejoined; one the server closes stays closed.

use leptos::*;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, MessageEvent, WebSocket};

use super::global::GlobalState;

const HEARTBEAT_MS: u32 = 30_000;
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Which table changes to listen for
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    pub channel: String,
    pub schema: String,
    pub table: String,
    pub event: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: "earnings_changes".to_string(),
            schema: "public".to_string(),
            table: "earnings".to_string(),
            event: "*".to_string(),
        }
    }
}

impl ChannelConfig {
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.channel)
    }
}

/// Decoded server frame for our topic
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    JoinReply { ok: bool, reason: String },
    HeartbeatReply,
    Change,
    /// Server crashed the channel; rejoin
    ChannelError,
    /// Server ended the subscription; stop
    ChannelClosed { reason: String },
    Other,
}

pub fn join_frame(config: &ChannelConfig, access_token: Option<&str>, reference: &str) -> String {
    let mut payload = json!({
        "config": {
            "broadcast": { "ack": false, "self": false },
            "presence": { "key": "" },
            "postgres_changes": [{
                "event": config.event,
                "schema": config.schema,
                "table": config.table,
            }],
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = Value::String(token.to_string());
    }

    json!({
        "topic": config.topic(),
        "event": "phx_join",
        "payload": payload,
        "ref": reference,
        "join_ref": reference,
    })
    .to_string()
}

pub fn heartbeat_frame(reference: &str) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference,
    })
    .to_string()
}

pub fn leave_frame(topic: &str, reference: &str, join_ref: Option<&str>) -> String {
    json!({
        "topic": topic,
        "event": "phx_leave",
        "payload": {},
        "ref": reference,
        "join_ref": join_ref,
    })
    .to_string()
}

/// Read a frame; frames for other topics are `Other`
pub fn parse_frame(
    text: &str,
    topic: &str,
    join_ref: Option<&str>,
    heartbeat_ref: Option<&str>,
) -> Incoming {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return Incoming::Other;
    };
    if frame["topic"].as_str() == Some("phoenix")
        && heartbeat_ref.is_some()
        && frame["ref"].as_str() == heartbeat_ref
    {
        return Incoming::HeartbeatReply;
    }
    if frame["topic"].as_str() != Some(topic) {
        return Incoming::Other;
    }

    match frame["event"].as_str().unwrap_or_default() {
        "phx_reply" if join_ref.is_some() && frame["ref"].as_str() == join_ref => {
            let ok = frame["payload"]["status"].as_str() == Some("ok");
            let reason = frame["payload"]["response"]["reason"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            Incoming::JoinReply { ok, reason }
        }
        "postgres_changes" => Incoming::Change,
        "phx_error" => Incoming::ChannelError,
        "phx_close" => Incoming::ChannelClosed {
            reason: "closed by server".to_string(),
        },
        "system" if frame["payload"]["status"].as_str() != Some("ok") => Incoming::ChannelClosed {
            reason: frame["payload"]["message"]
                .as_str()
                .unwrap_or("system error")
                .to_string(),
        },
        _ => Incoming::Other,
    }
}

/// Reconnect delay: 1s, 2s, 4s ... capped at 30s
pub fn backoff_ms(attempt: u32) -> u32 {
    2_u32.saturating_pow(attempt).saturating_mul(1000).min(30_000)
}

struct ChannelInner {
    url: String,
    config: ChannelConfig,
    access_token: Option<String>,
    ws: Option<WebSocket>,
    /// Bumped for every socket; handlers of older sockets stand down
    generation: u64,
    heartbeat: Option<gloo_timers::callback::Interval>,
    /// Heartbeat sent but not yet acknowledged
    heartbeat_ref: Option<String>,
    join_ref: Option<String>,
    next_ref: u64,
    attempts: u32,
    rejoin_attempts: u32,
    closed: bool,
}

impl ChannelInner {
    fn new(url: String, config: ChannelConfig, access_token: Option<String>) -> Self {
        Self {
            url,
            config,
            access_token,
            ws: None,
            generation: 0,
            heartbeat: None,
            heartbeat_ref: None,
            join_ref: None,
            next_ref: 0,
            attempts: 0,
            rejoin_attempts: 0,
            closed: false,
        }
    }

    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }

    /// Events from socket `generation` still apply
    fn is_current(&self, generation: u64) -> bool {
        !self.closed && self.generation == generation
    }

    /// Fresh join frame for the current socket
    fn join(&mut self) -> String {
        let reference = self.next_ref();
        self.join_ref = Some(reference.clone());
        join_frame(&self.config, self.access_token.as_deref(), &reference)
    }
}

/// A live subscription; call [`RealtimeChannel::close`] to release it
#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Rc<RefCell<ChannelInner>>,
}

impl RealtimeChannel {
    /// Open the websocket and join the channel
    pub fn subscribe(state: GlobalState, config: ChannelConfig) -> Self {
        let settings = state.settings.get_value();
        let channel = Self {
            inner: Rc::new(RefCell::new(ChannelInner::new(
                settings.websocket_url(),
                config,
                settings.access_token,
            ))),
        };
        connect(&channel.inner, state);
        channel
    }

    /// Leave the channel and close the socket. Safe to call twice.
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.heartbeat = None;

        if let Some(ws) = inner.ws.take() {
            if ws.ready_state() == WebSocket::OPEN {
                let reference = inner.next_ref();
                let frame = leave_frame(&inner.config.topic(), &reference, inner.join_ref.as_deref());
                let _ = ws.send_with_str(&frame);
            }
            let _ = ws.close();
        }
        web_sys::console::log_1(&format!("Left realtime channel {}", inner.config.channel).into());
    }
}

fn connect(inner: &Rc<RefCell<ChannelInner>>, state: GlobalState) {
    let url = inner.borrow().url.clone();
    match WebSocket::new(&url) {
        Ok(ws) => {
            let generation = {
                let mut inner = inner.borrow_mut();
                inner.generation += 1;
                inner.heartbeat_ref = None;
                inner.ws = Some(ws.clone());
                inner.generation
            };
            setup_handlers(inner, &ws, generation, state);
        }
        Err(e) => {
            web_sys::console::error_1(&format!("Realtime connection failed: {:?}", e).into());
            schedule_reconnect(inner, state);
        }
    }
}

fn setup_handlers(
    inner: &Rc<RefCell<ChannelInner>>,
    ws: &WebSocket,
    generation: u64,
    state: GlobalState,
) {
    // On open: join, then keep the socket alive
    let inner_clone = Rc::clone(inner);
    let ws_clone = ws.clone();
    let on_open = Closure::wrap(Box::new(move |_: JsValue| {
        let frame = {
            let mut inner = inner_clone.borrow_mut();
            if !inner.is_current(generation) {
                return;
            }
            inner.attempts = 0;
            inner.join()
        };
        if let Err(e) = ws_clone.send_with_str(&frame) {
            web_sys::console::error_1(&format!("Realtime join failed: {:?}", e).into());
        }

        let heartbeat_inner = Rc::clone(&inner_clone);
        let heartbeat_ws = ws_clone.clone();
        let heartbeat = gloo_timers::callback::Interval::new(HEARTBEAT_MS, move || {
            let mut inner = heartbeat_inner.borrow_mut();
            if inner.heartbeat_ref.is_some() {
                // The close handler takes it from here
                web_sys::console::warn_1(&"Realtime heartbeat not acknowledged".into());
                drop(inner);
                let _ = heartbeat_ws.close();
                return;
            }
            let reference = inner.next_ref();
            inner.heartbeat_ref = Some(reference.clone());
            let _ = heartbeat_ws.send_with_str(&heartbeat_frame(&reference));
        });
        inner_clone.borrow_mut().heartbeat = Some(heartbeat);
    }) as Box<dyn FnMut(JsValue)>);
    ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    on_open.forget();

    // On message
    let inner_clone = Rc::clone(inner);
    let ws_clone = ws.clone();
    let state_clone = state.clone();
    let on_message = Closure::wrap(Box::new(move |event: MessageEvent| {
        let Ok(text) = event.data().dyn_into::<js_sys::JsString>() else {
            return;
        };
        let text: String = text.into();
        let (topic, join_ref, heartbeat_ref) = {
            let inner = inner_clone.borrow();
            if !inner.is_current(generation) {
                return;
            }
            (
                inner.config.topic(),
                inner.join_ref.clone(),
                inner.heartbeat_ref.clone(),
            )
        };

        match parse_frame(&text, &topic, join_ref.as_deref(), heartbeat_ref.as_deref()) {
            Incoming::JoinReply { ok: true, .. } => {
                web_sys::console::log_1(&format!("Subscribed to {}", topic).into());
                inner_clone.borrow_mut().rejoin_attempts = 0;
                state_clone.live.set(true);
            }
            Incoming::JoinReply { ok: false, reason } => {
                web_sys::console::error_1(&format!("Realtime join rejected: {}", reason).into());
                state_clone.live.set(false);
            }
            Incoming::HeartbeatReply => inner_clone.borrow_mut().heartbeat_ref = None,
            Incoming::Change => state_clone.refetch(),
            Incoming::ChannelError => {
                web_sys::console::warn_1(&format!("Realtime channel error on {}", topic).into());
                state_clone.live.set(false);
                schedule_rejoin(&inner_clone, &ws_clone, generation);
            }
            Incoming::ChannelClosed { reason } => {
                web_sys::console::warn_1(&format!("Realtime channel closed: {}", reason).into());
                state_clone.live.set(false);
                let mut inner = inner_clone.borrow_mut();
                inner.closed = true;
                inner.heartbeat = None;
                if let Some(ws) = inner.ws.take() {
                    let _ = ws.close();
                }
            }
            Incoming::Other => {}
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    on_message.forget();

    // On close: only the current socket owns the live flag
    let inner_clone = Rc::clone(inner);
    let state_clone = state.clone();
    let on_close = Closure::wrap(Box::new(move |event: CloseEvent| {
        web_sys::console::log_1(
            &format!("Realtime closed: code={}, reason={}", event.code(), event.reason()).into(),
        );

        {
            let mut inner = inner_clone.borrow_mut();
            if !inner.is_current(generation) {
                return;
            }
            inner.heartbeat = None;
            inner.heartbeat_ref = None;
            inner.ws = None;
        }
        state_clone.live.set(false);
        schedule_reconnect(&inner_clone, state_clone.clone());
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    on_close.forget();

    // On error
    let on_error = Closure::wrap(Box::new(move |e: JsValue| {
        web_sys::console::error_1(&format!("Realtime error: {:?}", e).into());
    }) as Box<dyn FnMut(JsValue)>);
    ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));
    on_error.forget();
}

/// Join again after the server errored the channel
fn schedule_rejoin(inner: &Rc<RefCell<ChannelInner>>, ws: &WebSocket, generation: u64) {
    let attempts = inner.borrow().rejoin_attempts;
    if attempts >= MAX_RECONNECT_ATTEMPTS {
        web_sys::console::error_1(&"Max realtime rejoin attempts reached".into());
        return;
    }
    {
        let mut inner = inner.borrow_mut();
        inner.rejoin_attempts = attempts + 1;
        inner.join_ref = None;
    }

    let inner = Rc::clone(inner);
    let ws = ws.clone();
    gloo_timers::callback::Timeout::new(backoff_ms(attempts), move || {
        let frame = {
            let mut inner = inner.borrow_mut();
            if !inner.is_current(generation) || ws.ready_state() != WebSocket::OPEN {
                return;
            }
            inner.join()
        };
        web_sys::console::log_1(&format!("Realtime rejoin (attempt {})", attempts + 1).into());
        let _ = ws.send_with_str(&frame);
    })
    .forget();
}

fn schedule_reconnect(inner: &Rc<RefCell<ChannelInner>>, state: GlobalState) {
    let attempts = inner.borrow().attempts;
    if attempts >= MAX_RECONNECT_ATTEMPTS {
        web_sys::console::error_1(&"Max realtime reconnect attempts reached".into());
        return;
    }
    inner.borrow_mut().attempts = attempts + 1;

    let inner = Rc::clone(inner);
    gloo_timers::callback::Timeout::new(backoff_ms(attempts), move || {
        if inner.borrow().closed {
            return;
        }
        web_sys::console::log_1(&format!("Realtime reconnect (attempt {})", attempts + 1).into());
        connect(&inner, state);
    })
    .forget();
}
