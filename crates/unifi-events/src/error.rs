use serde::Serialize;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Top-level error type for the `unifi-events` crate.
///
/// Covers every failure mode of the connection lifecycle: token probe,
/// login, REST transport, WebSocket transport, and malformed stream frames.
/// Lifecycle failures are additionally published on the event bus as
/// `ctrl.error` with an [`ErrorNotice`] payload.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// The CSRF probe failed or the controller sent no token header.
    #[error("No CSRF token: {reason}")]
    NoToken { reason: String },

    /// Login rejected (wrong credentials, account locked, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── REST ────────────────────────────────────────────────────────
    /// Non-success HTTP status from a REST call. The body is kept verbatim.
    #[error("Request failed (HTTP {status}): {body}")]
    Request { status: u16, body: String },

    /// A successful response body was not JSON, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed or dropped mid-stream.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// A stream frame could not be parsed as JSON.
    #[error("Malformed stream message: {message}")]
    MalformedMessage { message: String, body: String },
}

impl Error {
    /// Returns `true` if re-authentication might resolve this error.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Request { status, .. } => *status == 401,
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Classify the error for lifecycle notifications.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoToken { .. } => ErrorKind::Token,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::WebSocketConnect(_) => ErrorKind::Stream,
            Self::MalformedMessage { .. } => ErrorKind::MalformedMessage,
            Self::Transport(_) | Self::Request { .. } | Self::Deserialization { .. } => {
                ErrorKind::Request
            }
            Self::InvalidUrl(_) | Self::Tls(_) => ErrorKind::Config,
        }
    }

    /// Build the payload published alongside `ctrl.error`.
    pub fn notice(&self) -> ErrorNotice {
        ErrorNotice {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocketConnect(err.to_string())
    }
}

/// Coarse error category, serialized in snake_case into lifecycle payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Token,
    Authentication,
    Stream,
    MalformedMessage,
    Request,
    Config,
}

/// Payload of a `ctrl.error` lifecycle event.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
}
