//! Event socket: connection state, heartbeat, and frame handling.
//!
//! The controller pushes `{ "meta": {...}, "data": [...] }` text frames over
//! `/wss/s/{site}/events`. Each element of `data` is handed to the
//! classifier in order. The client keeps the socket alive by sending a
//! literal `ping` every heartbeat interval while connected; the controller
//! answers with a literal `pong`, which is swallowed here.
//!
//! Reconnect policy lives in [`crate::client`]; this module only reports
//! how a socket ended.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use strum::{Display, IntoStaticStr};
use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::bus::EventBus;
use crate::classify;
use crate::error::Error;
use crate::transport::USER_AGENT;

/// Liveness ping sent by the client.
pub const HEARTBEAT_PING: &str = "ping";
/// The controller's answer to [`HEARTBEAT_PING`].
pub const HEARTBEAT_ACK: &str = "pong";

pub(crate) type EventSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── ConnectionState ──────────────────────────────────────────────────

/// Where the event stream is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Fetching the CSRF token or logging in.
    Authenticating,
    /// Socket upgrade in progress.
    Connecting,
    Connected,
    /// `close()` was called and the socket is shutting down.
    Closing,
    /// A transport error occurred and a reconnect timer is pending.
    Reconnecting,
}

// ── Lifecycle ────────────────────────────────────────────────────────

/// Non-domain events describing the connection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum Lifecycle {
    #[strum(serialize = "ctrl.connecting")]
    Connecting,
    #[strum(serialize = "ctrl.authenticated")]
    Authenticated,
    #[strum(serialize = "ctrl.connected")]
    Connected,
    #[strum(serialize = "ctrl.closed")]
    Closed,
    #[strum(serialize = "ctrl.error")]
    Error,
    #[strum(serialize = "ctrl.reconnect")]
    Reconnect,
}

impl Lifecycle {
    pub fn topic(self) -> &'static str {
        self.into()
    }
}

// ── StreamState ──────────────────────────────────────────────────────

/// Connection phase plus the guards that keep reconnects single-flight.
///
/// Owned by the client behind a mutex that is never held across an await.
/// While a socket is attached the phase stays `Connected`; only detaching
/// or closing the socket moves it.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    pub phase: ConnectionState,
    /// A reconnect timer is pending.
    pub reconnecting: bool,
    /// `close()` was called; no reconnect may take effect until a fresh connect.
    pub closed: bool,
    /// Cancelled by `close()`; replaced by every fresh `connect()`.
    pub shutdown: CancellationToken,
    /// The live socket task, if any.
    pub socket: Option<SocketSlot>,
    next_socket_id: u64,
}

/// Identity and cancel handle of the live socket task.
#[derive(Debug)]
pub(crate) struct SocketSlot {
    pub id: u64,
    pub cancel: CancellationToken,
}

impl StreamState {
    /// State before the first `connect()`. Counts as closed, so a failed
    /// re-login from the REST path has nothing to reconnect.
    pub fn idle() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    /// Reset for a caller-initiated connect. Returns the new shutdown token.
    ///
    /// Cancelling the previous token stops any pending reconnect timer and
    /// socket that belonged to the earlier connect.
    pub fn begin_fresh(&mut self) -> CancellationToken {
        self.shutdown.cancel();
        self.shutdown = CancellationToken::new();
        self.closed = false;
        self.reconnecting = false;
        self.socket = None;
        self.phase = ConnectionState::Disconnected;
        self.shutdown.clone()
    }

    /// Register a freshly opened socket. Returns its id, or `None` if the
    /// stream was closed while the upgrade was in flight.
    pub fn attach_socket(&mut self, cancel: CancellationToken) -> Option<u64> {
        if self.closed {
            return None;
        }
        if let Some(old) = self.socket.take() {
            old.cancel.cancel();
        }
        self.next_socket_id += 1;
        let id = self.next_socket_id;
        self.socket = Some(SocketSlot { id, cancel });
        self.phase = ConnectionState::Connected;
        Some(id)
    }

    /// Move to `phase` unless `close()` got there first or a socket is
    /// attached. `Disconnected` reads as `Reconnecting` while a timer is
    /// pending.
    pub fn set_phase(&mut self, phase: ConnectionState) {
        if self.closed || self.socket.is_some() {
            return;
        }
        self.phase = match phase {
            ConnectionState::Disconnected if self.reconnecting => ConnectionState::Reconnecting,
            other => other,
        };
    }

    /// Forget socket `id` once its task ends. `false` if a newer socket or
    /// `close()` already took its place.
    pub fn detach_socket(&mut self, id: u64) -> bool {
        if self.socket.as_ref().is_some_and(|slot| slot.id == id) {
            self.socket = None;
            self.phase = if self.reconnecting {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            };
            return true;
        }
        if self.closed {
            self.phase = ConnectionState::Disconnected;
        }
        false
    }

    /// Claim the single reconnect slot. `false` means a reconnect is
    /// already pending or the stream was closed.
    ///
    /// A socket that is still attached keeps running until the reconnect
    /// replaces it.
    pub fn begin_reconnect(&mut self) -> bool {
        if self.reconnecting || self.closed {
            return false;
        }
        self.reconnecting = true;
        if self.socket.is_none() {
            self.phase = ConnectionState::Reconnecting;
        }
        true
    }

    /// Release the reconnect slot when the timer fires.
    ///
    /// Returns `false` if the stream was closed while the timer was pending.
    pub fn finish_reconnect(&mut self) -> bool {
        self.reconnecting = false;
        !self.closed
    }

    /// Mark closed and cancel everything hanging off the shutdown token.
    ///
    /// Returns `true` if a socket was open and is now closing.
    pub fn mark_closed(&mut self) -> bool {
        self.closed = true;
        self.reconnecting = false;
        self.shutdown.cancel();
        let socket = self.socket.take();
        if let Some(ref slot) = socket {
            slot.cancel.cancel();
        }
        self.phase = if socket.is_some() {
            ConnectionState::Closing
        } else {
            ConnectionState::Disconnected
        };
        socket.is_some()
    }

    /// Heartbeats go out only from the attached socket `id`.
    pub fn heartbeat_due(&self, id: u64) -> bool {
        self.phase == ConnectionState::Connected
            && self.socket.as_ref().is_some_and(|slot| slot.id == id)
    }
}

// ── Frame handling ───────────────────────────────────────────────────

/// What a single text frame turned into.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FrameOutcome {
    HeartbeatAck,
    /// Elements of `data` handed to the classifier; the count includes
    /// elements the classifier dropped.
    Dispatched(usize),
    /// Valid JSON without a `data` array.
    Ignored,
}

/// Parse one text frame and dispatch its `data` elements in order.
pub(crate) fn handle_text(text: &str, bus: &EventBus) -> Result<FrameOutcome, Error> {
    if text == HEARTBEAT_ACK {
        tracing::trace!("heartbeat acknowledged");
        return Ok(FrameOutcome::HeartbeatAck);
    }

    let mut parsed: Value = serde_json::from_str(text).map_err(|e| Error::MalformedMessage {
        message: e.to_string(),
        body: text.to_owned(),
    })?;

    let Some(Value::Array(elements)) = parsed.as_object_mut().and_then(|m| m.remove("data")) else {
        tracing::trace!("frame without data array");
        return Ok(FrameOutcome::Ignored);
    };

    let count = elements.len();
    for element in elements {
        classify::dispatch(bus, element);
    }
    Ok(FrameOutcome::Dispatched(count))
}

// ── Socket ───────────────────────────────────────────────────────────

/// Open the event socket, presenting the session cookie.
pub(crate) async fn open(
    url: &Url,
    cookie: Option<&str>,
    connector: Option<Connector>,
) -> Result<EventSocket, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri).with_header("User-Agent", USER_AGENT);
    if let Some(cookie_val) = cookie {
        request = request.with_header("Cookie", cookie_val);
    }

    let (socket, _response) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector).await?;

    tracing::info!("WebSocket connected");
    Ok(socket)
}

/// How a socket's read loop ended.
#[derive(Debug)]
pub(crate) enum SocketEnd {
    /// Close frame, end of stream, or local cancellation.
    Closed,
    /// Transport failure; the caller reconnects.
    Failed(Error),
}

/// Read frames until the socket ends, sending heartbeats along the way.
///
/// The heartbeat timer lives inside this loop, so it stops the moment the
/// loop returns.
pub(crate) async fn run(
    socket: EventSocket,
    id: u64,
    bus: &EventBus,
    state: &Mutex<StreamState>,
    cancel: &CancellationToken,
    heartbeat_interval: Duration,
) -> SocketEnd {
    let (mut write, mut read) = socket.split();

    let mut heartbeat =
        tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("closing WebSocket");
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not sent");
                }
                return SocketEnd::Closed;
            }
            _ = heartbeat.tick() => {
                let due = state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .heartbeat_due(id);
                if due {
                    tracing::trace!("sending heartbeat");
                    if let Err(e) = write.send(Message::text(HEARTBEAT_PING)).await {
                        return SocketEnd::Failed(e.into());
                    }
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match handle_text(&text, bus) {
                        Ok(outcome) => tracing::trace!(?outcome, "frame handled"),
                        Err(e) => {
                            tracing::debug!(error = %e, "malformed frame");
                            bus.publish(Lifecycle::Error.topic(), error_payload(&e));
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        return SocketEnd::Closed;
                    }
                    Some(Err(e)) => return SocketEnd::Failed(e.into()),
                    None => {
                        tracing::info!("WebSocket stream ended");
                        return SocketEnd::Closed;
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame -- tungstenite answers pings itself
                    }
                }
            }
        }
    }
}

/// JSON payload for `ctrl.error`.
pub(crate) fn error_payload(err: &Error) -> Value {
    serde_json::to_value(err.notice()).unwrap_or(Value::Null)
}
