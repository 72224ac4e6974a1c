// Controller client: ties the session, the event socket and the bus together.
//
// `UnifiEvents` is a cheap handle over an `Arc`-shared inner state. The
// connect sequence (token -> login -> socket) runs on the caller's task;
// the socket read loop and reconnect timers run as spawned tasks that hold
// their own handle to the inner state.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus, Subscription, SubscriptionId};
use crate::config::ControllerConfig;
use crate::error::Error;
use crate::session::{Attempt, LoginOutcome, SessionManager};
use crate::stream::{self, ConnectionState, EventSocket, Lifecycle, SocketEnd, StreamState};
use crate::transport::TransportConfig;

/// How a `connect()` call (or a reconnect cycle) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The socket is open and events are flowing.
    Connected,
    /// Login or socket open failed; the error was published as
    /// `ctrl.error` and a reconnect cycle is pending.
    ReconnectScheduled,
    /// `close()` was called while the sequence was in flight.
    Closed,
}

/// Persistent client for one UniFi controller.
///
/// Construction has no side effects; call [`connect`](Self::connect) to
/// log in and start the event stream. Clones share the same session, bus
/// and stream.
///
/// ```no_run
/// use unifi_events::{ControllerConfig, Generation, UnifiEvents};
///
/// # async fn example() -> Result<(), unifi_events::Error> {
/// let config = ControllerConfig::new("192.168.1.1", 443).with_generation(Generation::UnifiOs);
/// let client = UnifiEvents::new(config)?;
/// let mut connects = client.subscribe("wu.connected");
/// client.connect().await?;
///
/// while let Some(event) = connects.recv().await {
///     println!("{} {}", event.topic, event.payload);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UnifiEvents {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: ControllerConfig,
    pub(crate) session: SessionManager,
    transport: TransportConfig,
    bus: EventBus,
    state: Mutex<StreamState>,
}

impl UnifiEvents {
    pub fn new(config: ControllerConfig) -> Result<Self, Error> {
        let transport = TransportConfig::new(config.verify_tls, config.timeout);
        let session = SessionManager::with_transport(&config, &transport)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                session,
                transport,
                bus: EventBus::new(),
                state: Mutex::new(StreamState::idle()),
            }),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// The bus that classified and lifecycle events are published on.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Channel subscription; see [`EventBus::subscribe`].
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        self.inner.bus.subscribe(pattern)
    }

    /// Callback subscription; see [`EventBus::on`].
    pub fn on<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.inner.bus.on(pattern, handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.with_state(|s| s.phase)
    }

    // ── Stream lifecycle ─────────────────────────────────────────────

    /// Acquire a token, log in and open the event socket.
    ///
    /// Starts a fresh generation: a previous `close()` is forgotten and any
    /// socket or reconnect timer from an earlier `connect()` is cancelled.
    pub async fn connect(&self) -> Result<ConnectOutcome, Error> {
        let shutdown = self.inner.with_state(StreamState::begin_fresh);
        self.inner.run_connect(Attempt::First, &shutdown).await
    }

    /// Stop the stream. Idempotent.
    ///
    /// Cancels a pending reconnect, closes the socket if one is open
    /// (`ctrl.closed` follows once it shuts down), and forgets the CSRF
    /// token and logged-in flag.
    pub fn close(&self) {
        let had_socket = self.inner.with_state(StreamState::mark_closed);
        self.inner.session.clear();
        info!(had_socket, "event stream closed by caller");
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Log in once. See [`Attempt`] for how failures are handled.
    pub async fn login(&self, attempt: Attempt) -> Result<LoginOutcome, Error> {
        self.inner.login(attempt).await
    }

    /// Re-login if the controller no longer recognizes the session.
    ///
    /// Resolves once the check, and the login it may trigger, completes.
    /// Failures are logged and published, never returned.
    pub async fn ensure_logged_in(&self) {
        self.inner.ensure_logged_in().await;
    }

    pub async fn logout(&self) -> Result<(), Error> {
        self.inner.session.logout().await
    }
}

impl std::fmt::Debug for UnifiEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiEvents")
            .field("host", &self.inner.config.host)
            .field("site", &self.inner.config.site)
            .field("generation", &self.inner.config.generation)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn with_state<R>(&self, f: impl FnOnce(&mut StreamState) -> R) -> R {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn set_phase(&self, phase: ConnectionState) {
        self.with_state(|s| s.set_phase(phase));
    }

    fn publish_error(&self, err: &Error) {
        self.bus
            .publish(Lifecycle::Error.topic(), stream::error_payload(err));
    }

    /// Token -> login -> socket.
    async fn run_connect(
        self: &Arc<Self>,
        attempt: Attempt,
        shutdown: &CancellationToken,
    ) -> Result<ConnectOutcome, Error> {
        if shutdown.is_cancelled() {
            return Ok(ConnectOutcome::Closed);
        }

        debug!(?attempt, host = %self.config.host, "connect sequence starting");
        self.bus.publish(Lifecycle::Connecting.topic(), Value::Null);
        self.set_phase(ConnectionState::Authenticating);

        if let Err(e) = self.session.acquire_token().await {
            warn!(error = %e, "token acquisition failed");
            self.publish_error(&e);
            self.set_phase(ConnectionState::Disconnected);
            return Err(e);
        }

        if self.login(attempt).await? == LoginOutcome::ReconnectScheduled {
            return Ok(ConnectOutcome::ReconnectScheduled);
        }
        if shutdown.is_cancelled() {
            return Ok(ConnectOutcome::Closed);
        }
        self.bus.publish(Lifecycle::Authenticated.topic(), Value::Null);

        self.listen(shutdown).await
    }

    /// Open the socket and hand it to a read-loop task.
    async fn listen(self: &Arc<Self>, shutdown: &CancellationToken) -> Result<ConnectOutcome, Error> {
        let url = self.config.events_url()?;
        let connector = self.transport.websocket_connector()?;
        self.set_phase(ConnectionState::Connecting);

        let cookie = self.session.cookie_header();
        let opened = tokio::select! {
            () = shutdown.cancelled() => return Ok(ConnectOutcome::Closed),
            opened = stream::open(&url, cookie.as_deref(), connector) => opened,
        };

        let mut socket = match opened {
            Ok(socket) => socket,
            Err(e) => {
                warn!(error = %e, "event socket failed to open");
                self.publish_error(&e);
                self.schedule_reconnect();
                return Ok(if self.with_state(|s| s.closed) {
                    ConnectOutcome::Closed
                } else {
                    ConnectOutcome::ReconnectScheduled
                });
            }
        };

        let cancel = shutdown.child_token();
        let Some(id) = self.with_state(|s| s.attach_socket(cancel.clone())) else {
            debug!("closed during socket upgrade");
            if let Err(e) = socket.close(None).await {
                debug!(error = %e, "close frame not sent");
            }
            return Ok(ConnectOutcome::Closed);
        };

        self.bus
            .publish(Lifecycle::Connected.topic(), json!({ "url": url.as_str() }));
        tokio::spawn(Arc::clone(self).drive_socket(socket, id, cancel));
        Ok(ConnectOutcome::Connected)
    }

    /// Read loop for socket `id`; decides what its end means.
    async fn drive_socket(self: Arc<Self>, socket: EventSocket, id: u64, cancel: CancellationToken) {
        let end = stream::run(
            socket,
            id,
            &self.bus,
            &self.state,
            &cancel,
            self.config.reconnect.heartbeat_interval,
        )
        .await;
        let (current, closed) = self.with_state(|s| (s.detach_socket(id), s.closed));

        match end {
            SocketEnd::Closed if current || closed => {
                info!("event stream closed");
                self.bus.publish(Lifecycle::Closed.topic(), Value::Null);
            }
            SocketEnd::Closed => debug!(id, "superseded socket closed"),
            SocketEnd::Failed(e) => {
                warn!(error = %e, "event stream failed");
                self.publish_error(&e);
                if current {
                    self.schedule_reconnect();
                }
            }
        }
    }

    /// Start the reconnect timer unless one is pending or the stream is
    /// closed. Returns whether a timer was started.
    fn schedule_reconnect(self: &Arc<Self>) -> bool {
        let shutdown = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.begin_reconnect() {
                debug!(
                    reconnecting = state.reconnecting,
                    closed = state.closed,
                    "reconnect not scheduled"
                );
                return false;
            }
            state.shutdown.clone()
        };

        let delay = self.config.reconnect.delay;
        info!(?delay, "reconnect scheduled");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!("pending reconnect cancelled");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            let proceed = inner.with_state(|s| !shutdown.is_cancelled() && s.finish_reconnect());
            if !proceed {
                debug!("stream closed while reconnect was pending");
                return;
            }

            inner.bus.publish(Lifecycle::Reconnect.topic(), Value::Null);
            match inner.run_connect(Attempt::Retry, &shutdown).await {
                Ok(outcome) => debug!(?outcome, "reconnect cycle finished"),
                Err(e) => warn!(error = %e, "reconnect cycle failed"),
            }
        });
        true
    }

    async fn login(self: &Arc<Self>, attempt: Attempt) -> Result<LoginOutcome, Error> {
        let Err(e) = self.session.login().await else {
            return Ok(LoginOutcome::LoggedIn);
        };

        warn!(error = %e, ?attempt, "login failed");
        self.publish_error(&e);
        if attempt == Attempt::First && self.schedule_reconnect() {
            return Ok(LoginOutcome::ReconnectScheduled);
        }
        self.set_phase(ConnectionState::Disconnected);
        Err(e)
    }

    async fn ensure_logged_in(self: &Arc<Self>) {
        let Err(e) = self.session.self_check().await else {
            return;
        };
        debug!(error = %e, "session check failed, logging in again");

        if let Err(e) = self.session.acquire_token().await {
            debug!(error = %e, "no CSRF token before re-login");
        }
        match self.login(Attempt::First).await {
            Ok(outcome) => debug!(?outcome, "re-login finished"),
            Err(e) => debug!(error = %e, "re-login failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_is_idle() {
        let client = UnifiEvents::new(ControllerConfig::default()).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.session().is_logged_in());
    }

    #[test]
    fn close_before_connect_is_harmless() {
        let client = UnifiEvents::new(ControllerConfig::default()).unwrap();
        client.close();
        client.close();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_refused_before_first_connect() {
        let client = UnifiEvents::new(ControllerConfig::default()).unwrap();
        assert!(!client.inner.schedule_reconnect());
    }

    #[tokio::test]
    async fn duplicate_reconnect_requests_are_no_ops() {
        let client = UnifiEvents::new(ControllerConfig::default()).unwrap();
        client.inner.with_state(StreamState::begin_fresh);

        assert!(client.inner.schedule_reconnect());
        assert!(!client.inner.schedule_reconnect());
        assert!(!client.inner.schedule_reconnect());
        assert_eq!(client.state(), ConnectionState::Reconnecting);

        client.close();
    }
}
