//! Persistent client for UniFi network controllers.
//!
//! One [`UnifiEvents`] instance owns a cookie session with the controller,
//! exposes authenticated REST verbs, and keeps a WebSocket event stream
//! alive. Raw controller events (`EVT_WU_Connected`, ...) are classified into
//! dotted topics (`wu.connected`) and published on an [`EventBus`] that
//! supports `*` and `**` wildcards. Connection lifecycle is published on the
//! same bus under `ctrl.*`.
//!
//! Both controller generations are supported: classic controllers
//! (`/api/login`, port 8443) and UniFi OS consoles, which route the network
//! application through `/proxy/network` and require a CSRF token.

pub mod bus;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod stream;
pub mod transport;

pub use bus::{BusEvent, EventBus, Pattern, Subscription, SubscriptionId};
pub use classify::Classification;
pub use client::{ConnectOutcome, UnifiEvents};
pub use config::{ControllerConfig, Generation, ReconnectConfig, Scheme};
pub use error::{Error, ErrorKind, ErrorNotice};
pub use session::{Attempt, LoginOutcome, SessionManager};
pub use stream::{ConnectionState, Lifecycle};
