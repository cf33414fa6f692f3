//! Realtime Client
//!
//! Websocket client for the backend's realtime service. One background task
//! owns the socket: it joins channels, forwards row changes to subscribers,
//! keeps the connection alive with heartbeats and reconnects with
//! exponential backoff, rejoining every open channel.
//!
//! Subscriptions on the same channel share one server-side join. The channel
//! is left only when its last subscriber is released.

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use super::error::{BackendError, BackendResult};
use super::messages::{
    channel_topic, join_payload, websocket_url, Frame, ReplyStatus, ServerEvent,
};
use super::types::{ChangeEvent, Subscription, SubscriptionHandle, SubscriptionRequest};
use super::RealtimeSource;
use crate::config::{BackendConfig, RealtimeConfig};

/// How long a join may wait for the server's reply
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound for the reconnect delay
const MAX_BACKOFF_MS: u64 = 30_000;

/// Configuration for the realtime client
#[derive(Debug, Clone)]
pub struct RealtimeClientConfig {
    /// Full websocket URL including api key and protocol version
    pub url: String,
    pub access_token: Option<String>,
    pub heartbeat: Duration,
    /// Limit for socket reconnects and for channel rejoins after a server error
    pub max_reconnect_attempts: u32,
}

impl RealtimeClientConfig {
    pub fn from_config(backend: &BackendConfig, realtime: &RealtimeConfig) -> Self {
        Self {
            url: websocket_url(backend.base_url(), &backend.anon_key),
            access_token: backend.access_token().map(str::to_string),
            heartbeat: realtime.heartbeat(),
            max_reconnect_attempts: realtime.max_reconnect_attempts,
        }
    }
}

/// Delay before reconnect attempt `attempt` (0-based): 1s, 2s, 4s ... 30s
pub fn backoff_delay(attempt: u32) -> Duration {
    let ms = 2_u64
        .checked_pow(attempt)
        .map(|factor| factor.saturating_mul(1000))
        .unwrap_or(MAX_BACKOFF_MS);
    Duration::from_millis(ms.min(MAX_BACKOFF_MS))
}

/// Realtime websocket client
///
/// Cheap to share behind an `Arc`; dropping the last handle shuts the
/// connection down.
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    access_token: Option<String>,
}

enum Command {
    Join {
        topic: String,
        /// Subscription handle id
        id: String,
        payload: serde_json::Value,
        events: mpsc::UnboundedSender<ChangeEvent>,
        reply: oneshot::Sender<BackendResult<()>>,
    },
    Leave {
        topic: String,
        id: String,
    },
}

impl RealtimeClient {
    /// Open the websocket and start the connection task
    pub async fn connect(config: RealtimeClientConfig) -> BackendResult<Self> {
        let (socket, _) = connect_async(config.url.as_str()).await?;
        tracing::info!("Realtime connected");

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let access_token = config.access_token.clone();

        let (sink, stream) = socket.split();
        tokio::spawn(Connection::new(config).run(sink, stream, commands_rx));

        Ok(Self {
            commands: commands_tx,
            access_token,
        })
    }
}

#[async_trait]
impl RealtimeSource for RealtimeClient {
    async fn subscribe(&self, request: SubscriptionRequest) -> BackendResult<Subscription> {
        let topic = channel_topic(&request.channel);
        let handle = SubscriptionHandle::new(request.channel.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.commands
            .send(Command::Join {
                topic: topic.clone(),
                id: handle.id().to_string(),
                payload: join_payload(&request, self.access_token.as_deref()),
                events: events_tx,
                reply: reply_tx,
            })
            .map_err(|_| BackendError::ChannelClosed)?;

        let joined = match tokio::time::timeout(JOIN_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BackendError::ChannelClosed),
            Err(_) => Err(BackendError::Timeout),
        };

        if let Err(e) = joined {
            let _ = self.commands.send(Command::Leave {
                topic,
                id: handle.id().to_string(),
            });
            return Err(e);
        }

        tracing::info!(
            channel = %request.channel,
            schema = %request.schema,
            table = %request.table,
            event = request.event.as_str(),
            subscription = %handle.id(),
            "Subscribed to realtime channel"
        );

        Ok(Subscription {
            handle,
            events: events_rx,
        })
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let command = Command::Leave {
            topic: channel_topic(handle.channel()),
            id: handle.id().to_string(),
        };
        if self.commands.send(command).is_err() {
            tracing::debug!(channel = %handle.channel(), "Realtime connection already closed");
        }
    }
}

// ============================================
// Connection task
// ============================================

struct ChannelState {
    payload: serde_json::Value,
    /// Handle id → event stream
    subscribers: HashMap<String, mpsc::UnboundedSender<ChangeEvent>>,
    /// Handles waiting for the join reply
    waiting: Vec<(String, oneshot::Sender<BackendResult<()>>)>,
    join_ref: Option<String>,
    joined: bool,
    /// Rejoins since the server last errored the channel
    rejoin_attempts: u32,
    rejoin_at: Option<Instant>,
}

impl ChannelState {
    fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            subscribers: HashMap::new(),
            waiting: Vec::new(),
            join_ref: None,
            joined: false,
            rejoin_attempts: 0,
            rejoin_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// Every client handle is gone
    Shutdown,
    /// The socket failed or went silent; try to reconnect
    Lost,
}

struct Connection {
    config: RealtimeClientConfig,
    /// Topic → channel
    channels: HashMap<String, ChannelState>,
    /// Join ref → topic, for joins awaiting a reply
    pending: HashMap<String, String>,
    /// Heartbeat sent but not yet acknowledged
    heartbeat_ref: Option<String>,
    next_ref: u64,
}

impl Connection {
    fn new(config: RealtimeClientConfig) -> Self {
        Self {
            config,
            channels: HashMap::new(),
            pending: HashMap::new(),
            heartbeat_ref: None,
            next_ref: 0,
        }
    }

    async fn run<Si, St>(
        mut self,
        sink: Si,
        stream: St,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) where
        Si: Sink<Message, Error = tungstenite::Error> + Unpin,
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        let mut outcome = self.drive(sink, stream, &mut commands).await;
        loop {
            match outcome {
                Disconnect::Shutdown => {
                    tracing::debug!("Realtime client dropped, connection closed");
                    return;
                }
                Disconnect::Lost => match self.reconnect().await {
                    Some((sink, stream)) => {
                        outcome = self.drive(sink, stream, &mut commands).await;
                    }
                    None => {
                        self.fail_all();
                        return;
                    }
                },
            }
        }
    }

    async fn drive<Si, St>(
        &mut self,
        mut sink: Si,
        mut stream: St,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Disconnect
    where
        Si: Sink<Message, Error = tungstenite::Error> + Unpin,
        St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        // Refs from the previous socket are meaningless now
        self.pending.clear();
        self.heartbeat_ref = None;
        let topics: Vec<String> = self.channels.keys().cloned().collect();
        for topic in topics {
            if let Some(channel) = self.channels.get_mut(&topic) {
                channel.joined = false;
                channel.rejoin_at = None;
            }
            if let Err(e) = self.send_join(&mut sink, &topic).await {
                tracing::warn!(topic = %topic, error = %e, "Rejoin failed");
                return Disconnect::Lost;
            }
        }

        let mut heartbeat = tokio::time::interval(self.config.heartbeat);
        heartbeat.tick().await;

        loop {
            let next_rejoin = self.next_rejoin();
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        let _ = sink.close().await;
                        return Disconnect::Shutdown;
                    };
                    if let Err(e) = self.handle_command(&mut sink, command).await {
                        tracing::warn!(error = %e, "Realtime send failed");
                        return Disconnect::Lost;
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Realtime server closed the connection");
                        return Disconnect::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Realtime receive error");
                        return Disconnect::Lost;
                    }
                    None => return Disconnect::Lost,
                },
                _ = heartbeat.tick() => {
                    if let Some(reference) = self.heartbeat_ref.take() {
                        tracing::warn!(reference = %reference, "Heartbeat not acknowledged");
                        return Disconnect::Lost;
                    }
                    let reference = self.next_ref();
                    self.heartbeat_ref = Some(reference.clone());
                    if let Err(e) = send_frame(&mut sink, &Frame::heartbeat(reference)).await {
                        tracing::warn!(error = %e, "Heartbeat failed");
                        return Disconnect::Lost;
                    }
                }
                _ = tokio::time::sleep_until(next_rejoin.unwrap_or_else(Instant::now)), if next_rejoin.is_some() => {
                    if let Err(e) = self.rejoin_due(&mut sink, Instant::now()).await {
                        tracing::warn!(error = %e, "Rejoin failed");
                        return Disconnect::Lost;
                    }
                }
            }
        }
    }

    async fn reconnect(
        &mut self,
    ) -> Option<(
        impl Sink<Message, Error = tungstenite::Error> + Unpin,
        impl Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    )> {
        for attempt in 0..self.config.max_reconnect_attempts {
            let delay = backoff_delay(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Realtime connection lost, reconnecting"
            );
            tokio::time::sleep(delay).await;

            match connect_async(self.config.url.as_str()).await {
                Ok((socket, _)) => {
                    tracing::info!(attempt = attempt + 1, "Realtime reconnected");
                    return Some(socket.split());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Realtime reconnect failed");
                }
            }
        }

        tracing::error!("Max realtime reconnect attempts reached");
        None
    }

    /// Give up: pending joins fail, event streams close
    fn fail_all(&mut self) {
        for (topic, channel) in self.channels.drain() {
            for (_, reply) in channel.waiting {
                let _ = reply.send(Err(BackendError::ChannelClosed));
            }
            tracing::debug!(
                topic = %topic,
                subscribers = channel.subscribers.len(),
                "Closing realtime channel"
            );
        }
        self.pending.clear();
    }

    async fn handle_command<S>(&mut self, sink: &mut S, command: Command) -> BackendResult<()>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        match command {
            Command::Join {
                topic,
                id,
                payload,
                events,
                reply,
            } => {
                let is_new = !self.channels.contains_key(&topic);
                let channel = self
                    .channels
                    .entry(topic.clone())
                    .or_insert_with(|| ChannelState::new(payload));
                channel.subscribers.insert(id.clone(), events);

                if channel.joined {
                    let _ = reply.send(Ok(()));
                    tracing::debug!(
                        topic = %topic,
                        subscribers = channel.subscribers.len(),
                        "Sharing joined channel"
                    );
                    return Ok(());
                }

                channel.waiting.push((id, reply));
                if is_new {
                    self.send_join(sink, &topic).await?;
                }
                Ok(())
            }
            Command::Leave { topic, id } => {
                let Some(channel) = self.channels.get_mut(&topic) else {
                    return Ok(());
                };
                channel.subscribers.remove(&id);
                channel.waiting.retain(|(waiting, _)| *waiting != id);
                if !channel.subscribers.is_empty() {
                    tracing::debug!(
                        topic = %topic,
                        subscribers = channel.subscribers.len(),
                        "Subscriber left shared channel"
                    );
                    return Ok(());
                }

                let Some(channel) = self.channels.remove(&topic) else {
                    return Ok(());
                };
                self.pending.retain(|_, pending_topic| *pending_topic != topic);

                let frame = Frame::leave(&topic, self.next_ref(), channel.join_ref);
                send_frame(sink, &frame).await?;
                tracing::info!(topic = %topic, "Left realtime channel");
                Ok(())
            }
        }
    }

    async fn send_join<S>(&mut self, sink: &mut S, topic: &str) -> BackendResult<()>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let reference = self.next_ref();
        let Some(channel) = self.channels.get_mut(topic) else {
            return Ok(());
        };
        if let Some(previous) = channel.join_ref.replace(reference.clone()) {
            self.pending.remove(&previous);
        }

        let frame = Frame::join(topic, channel.payload.clone(), reference.clone());
        self.pending.insert(reference, topic.to_string());
        send_frame(sink, &frame).await
    }

    /// Earliest scheduled channel rejoin
    fn next_rejoin(&self) -> Option<Instant> {
        self.channels
            .values()
            .filter_map(|channel| channel.rejoin_at)
            .min()
    }

    /// Rejoin every channel whose backoff has elapsed by `now`
    async fn rejoin_due<S>(&mut self, sink: &mut S, now: Instant) -> BackendResult<()>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        let due: Vec<String> = self
            .channels
            .iter_mut()
            .filter(|(_, channel)| channel.rejoin_at.is_some_and(|at| at <= now))
            .map(|(topic, channel)| {
                channel.rejoin_at = None;
                topic.clone()
            })
            .collect();

        for topic in due {
            tracing::info!(topic = %topic, "Rejoining realtime channel");
            self.send_join(sink, &topic).await?;
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable realtime frame");
                return;
            }
        };
        let topic = frame.topic.clone();
        let join_ref = frame.join_ref.clone();

        match frame.decode() {
            ServerEvent::Reply {
                reference,
                status,
                response,
            } => {
                if let Some(reference) = reference {
                    self.handle_reply(&reference, status, &response);
                }
            }
            ServerEvent::Change(change) => {
                if let Some(channel) = self.channels.get(&topic) {
                    tracing::debug!(
                        topic = %topic,
                        kind = %change.kind,
                        subscribers = channel.subscribers.len(),
                        "Row change received"
                    );
                    for (id, events) in &channel.subscribers {
                        if events.send(change.clone()).is_err() {
                            tracing::debug!(topic = %topic, subscription = %id, "Subscriber gone, change dropped");
                        }
                    }
                }
            }
            ServerEvent::ChannelError => {
                if self.is_current_join(&topic, join_ref.as_deref()) {
                    tracing::warn!(topic = %topic, "Realtime channel error");
                    self.schedule_rejoin(&topic);
                }
            }
            ServerEvent::ChannelClosed => {
                if self.is_current_join(&topic, join_ref.as_deref()) {
                    self.close_channel(&topic, "closed by server");
                }
            }
            ServerEvent::System { status, message } => {
                if status == "ok" {
                    tracing::debug!(topic = %topic, message = %message, "Realtime system notice");
                } else {
                    tracing::warn!(topic = %topic, status = %status, message = %message, "Realtime system error");
                    self.close_channel(&topic, &message);
                }
            }
            ServerEvent::Ignored(event) => {
                tracing::trace!(topic = %topic, event = %event, "Ignoring realtime frame");
            }
        }
    }

    /// Frames without a join ref apply to whatever join is current
    fn is_current_join(&self, topic: &str, join_ref: Option<&str>) -> bool {
        match (self.channels.get(topic), join_ref) {
            (Some(channel), Some(join_ref)) => channel.join_ref.as_deref() == Some(join_ref),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn handle_reply(&mut self, reference: &str, status: ReplyStatus, response: &serde_json::Value) {
        if self.heartbeat_ref.as_deref() == Some(reference) {
            self.heartbeat_ref = None;
            return;
        }

        // Leave replies have no pending join
        let Some(topic) = self.pending.remove(reference) else {
            return;
        };

        if status == ReplyStatus::Ok {
            if let Some(channel) = self.channels.get_mut(&topic) {
                channel.joined = true;
                channel.rejoin_attempts = 0;
                for (_, reply) in channel.waiting.drain(..) {
                    let _ = reply.send(Ok(()));
                }
            }
            tracing::debug!(topic = %topic, "Channel joined");
            return;
        }

        let reason = response
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(match status {
                ReplyStatus::Timeout => "timeout",
                _ => "join refused",
            })
            .to_string();
        tracing::error!(topic = %topic, reason = %reason, "Channel join rejected");

        if let Some(channel) = self.channels.remove(&topic) {
            for (_, reply) in channel.waiting {
                let _ = reply.send(Err(BackendError::JoinRejected {
                    channel: topic.trim_start_matches("realtime:").to_string(),
                    reason: reason.clone(),
                }));
            }
        }
    }

    /// The server errored the channel; rejoin after a backoff or give up
    fn schedule_rejoin(&mut self, topic: &str) {
        let max_attempts = self.config.max_reconnect_attempts;
        let Some(channel) = self.channels.get_mut(topic) else {
            return;
        };
        channel.joined = false;
        if let Some(join_ref) = channel.join_ref.take() {
            self.pending.remove(&join_ref);
        }

        if channel.rejoin_attempts >= max_attempts {
            self.close_channel(topic, "rejoin attempts exhausted");
            return;
        }

        let delay = backoff_delay(channel.rejoin_attempts);
        channel.rejoin_attempts += 1;
        channel.rejoin_at = Some(Instant::now() + delay);
        tracing::info!(
            topic = %topic,
            attempt = channel.rejoin_attempts,
            delay_ms = delay.as_millis() as u64,
            "Realtime channel rejoin scheduled"
        );
    }

    /// Drop a channel: waiting joins fail, subscriber streams end
    fn close_channel(&mut self, topic: &str, reason: &str) {
        let Some(channel) = self.channels.remove(topic) else {
            return;
        };
        self.pending.retain(|_, pending_topic| pending_topic.as_str() != topic);
        for (_, reply) in channel.waiting {
            let _ = reply.send(Err(BackendError::ChannelClosed));
        }
        tracing::warn!(
            topic = %topic,
            reason = %reason,
            subscribers = channel.subscribers.len(),
            "Realtime channel closed"
        );
    }

    fn next_ref(&mut self) -> String {
        self.next_ref += 1;
        self.next_ref.to_string()
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> BackendResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}
