//! CLI error types with miette diagnostics.
//!
//! Maps library errors into user-facing errors with actionable help text
//! and a stable process exit code.

use miette::Diagnostic;
use thiserror::Error;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {url}")]
    #[diagnostic(
        code(unifi_events::connection_failed),
        help(
            "Check that the controller is running and reachable.\n\
             Self-signed certificate? Try --insecure (-k)."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("TLS setup failed: {message}")]
    #[diagnostic(code(unifi_events::tls))]
    Tls { message: String },

    #[error("Event stream failed: {message}")]
    #[diagnostic(
        code(unifi_events::stream),
        help("Run with -vv to see the connection lifecycle.")
    )]
    Stream { message: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(unifi_events::timeout),
        help("Increase the timeout with --timeout or check controller responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Could not obtain a CSRF token: {reason}")]
    #[diagnostic(
        code(unifi_events::no_token),
        help(
            "Only UniFi OS consoles hand out CSRF tokens.\n\
             For a classic controller, drop --unifi-os."
        )
    )]
    NoToken { reason: String },

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(unifi_events::auth_failed),
        help("Check the username and password (UNIFI_EVENTS_PASSWORD) for this controller.")
    )]
    AuthFailed { message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(unifi_events::no_credentials),
        help("Set UNIFI_EVENTS_PASSWORD, pass --password, or add `password` to the profile.")
    )]
    NoCredentials { profile: String },

    // ── API ──────────────────────────────────────────────────────────
    #[error("Controller returned HTTP {status}")]
    #[diagnostic(code(unifi_events::api_error), help("Response body: {body}"))]
    Api { status: u16, body: String },

    #[error("Unexpected response body: {message}")]
    #[diagnostic(code(unifi_events::decode))]
    Decode { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(unifi_events::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(unifi_events::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(unifi_events::no_config),
        help(
            "Pass --host, set UNIFI_EVENTS_HOST, or add a profile to\n\
             {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(unifi_events::config))]
    Config(Box<figment::Error>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(unifi_events::json), help("Pass a JSON document to --data."))]
    Json(#[from] serde_json::Error),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Tls { .. } | Self::Stream { .. } => {
                exit_code::CONNECTION
            }
            Self::NoToken { .. } | Self::AuthFailed { .. } | Self::NoCredentials { .. } => {
                exit_code::AUTH
            }
            Self::Timeout => exit_code::TIMEOUT,
            Self::Api { status, .. } => match status {
                401 => exit_code::AUTH,
                403 => exit_code::PERMISSION,
                404 => exit_code::NOT_FOUND,
                409 => exit_code::CONFLICT,
                _ => exit_code::GENERAL,
            },
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── unifi_events::Error → CliError mapping ───────────────────────────

impl From<unifi_events::Error> for CliError {
    fn from(err: unifi_events::Error) -> Self {
        use unifi_events::Error;

        match err {
            Error::NoToken { reason } => Self::NoToken { reason },
            Error::Authentication { message } => Self::AuthFailed { message },
            Error::Transport(e) if e.is_timeout() => Self::Timeout,
            Error::Transport(e) => Self::ConnectionFailed {
                url: e.url().map(ToString::to_string).unwrap_or_default(),
                source: Box::new(e),
            },
            Error::InvalidUrl(e) => Self::Validation {
                field: "host".into(),
                reason: e.to_string(),
            },
            Error::Tls(message) => Self::Tls { message },
            Error::Request { status, body } => Self::Api { status, body },
            Error::Deserialization { message, .. } => Self::Decode { message },
            Error::WebSocketConnect(message) | Error::MalformedMessage { message, .. } => {
                Self::Stream { message }
            }
        }
    }
}
