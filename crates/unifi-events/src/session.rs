// Session management: CSRF token, cookie login, and liveness checks.
//
// The login endpoint sets a session cookie in the shared jar; every later
// request (REST and the socket upgrade) presents it. UniFi OS additionally
// requires an `X-CSRF-Token` header, fetched once from an unauthenticated
// probe of the controller root and rotated via `X-Updated-CSRF-Token`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use crate::config::{ControllerConfig, Generation};
use crate::error::Error;
use crate::transport::TransportConfig;

const CSRF_HEADER: &str = "x-csrf-token";
const UPDATED_CSRF_HEADER: &str = "x-updated-csrf-token";

/// Which login this is within a connect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Initial connect or transparent re-login. Failure schedules one reconnect.
    First,
    /// Login issued by a reconnect cycle. Failure is surfaced, never rescheduled.
    Retry,
}

/// Outcome of a login that did not return an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn,
    /// A first-attempt login failed; the error was published and a
    /// reconnect cycle has been scheduled instead of propagating it.
    ReconnectScheduled,
}

/// Cookie session and CSRF state for one controller.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Url,
    generation: Generation,
    username: String,
    password: SecretString,
    probe_timeout: Duration,
    cookie_jar: Arc<Jar>,
    /// Empty until fetched. Only UniFi OS needs one.
    csrf_token: Mutex<String>,
    logged_in: AtomicBool,
}

impl SessionManager {
    pub fn new(config: &ControllerConfig) -> Result<Self, Error> {
        let transport = TransportConfig::new(config.verify_tls, config.timeout);
        Self::with_transport(config, &transport)
    }

    pub fn with_transport(
        config: &ControllerConfig,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url: config.base_url()?,
            generation: config.generation,
            username: config.username.clone(),
            password: config.password.clone(),
            probe_timeout: config.probe_timeout,
            cookie_jar: Arc::clone(&transport.cookie_jar),
            csrf_token: Mutex::new(String::new()),
            logged_in: AtomicBool::new(false),
        })
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The controller root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::Acquire)
    }

    // ── CSRF token ───────────────────────────────────────────────────

    /// The cached CSRF token, if one has been fetched.
    pub fn csrf_token(&self) -> Option<String> {
        let token = self
            .csrf_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (!token.is_empty()).then(|| token.clone())
    }

    fn set_csrf_token(&self, token: &str) {
        debug!("storing CSRF token");
        token.clone_into(
            &mut self
                .csrf_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    /// Pick up a rotated token from any controller response.
    pub(crate) fn update_csrf_from_response(&self, headers: &HeaderMap) {
        if let Some(token) = headers
            .get(UPDATED_CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
        {
            trace!("CSRF token rotated");
            self.set_csrf_token(token);
        }
    }

    /// Attach the cached CSRF token, when there is one.
    pub(crate) fn apply_csrf(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.csrf_token() {
            Some(token) => builder.header(CSRF_HEADER, token),
            None => builder,
        }
    }

    /// Fetch the CSRF token from the controller root.
    ///
    /// No-op on classic controllers and when a token is already cached.
    pub async fn acquire_token(&self) -> Result<(), Error> {
        if !self.generation.requires_csrf() || self.csrf_token().is_some() {
            return Ok(());
        }

        debug!(url = %self.base_url, "probing for CSRF token");

        let resp = self
            .http
            .get(self.base_url.clone())
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| Error::NoToken {
                reason: e.to_string(),
            })?;

        let token = resp
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::NoToken {
                reason: format!("HTTP {} without an X-CSRF-Token header", resp.status()),
            })?;

        self.set_csrf_token(token);
        Ok(())
    }

    // ── Login / logout ───────────────────────────────────────────────

    /// Post credentials to the generation's login endpoint.
    ///
    /// The session cookie lands in the shared jar. A CSRF token returned
    /// with the login response replaces the probed one.
    pub async fn login(&self) -> Result<(), Error> {
        let url = self.base_url.join(self.generation.login_path())?;
        debug!("logging in at {}", url);

        let body = json!({
            "username": self.username,
            "password": self.password.expose_secret(),
        });

        let resp = self
            .apply_csrf(self.http.post(url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.logged_in.store(false, Ordering::Release);
                Error::Authentication {
                    message: format!("login request failed: {e}"),
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            self.logged_in.store(false, Ordering::Release);
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {body}"),
            });
        }

        if let Some(token) = resp
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
        {
            self.set_csrf_token(token);
        }
        self.update_csrf_from_response(resp.headers());

        self.logged_in.store(true, Ordering::Release);
        debug!("login successful");
        Ok(())
    }

    /// End the current session on the controller.
    pub async fn logout(&self) -> Result<(), Error> {
        let url = self.base_url.join(self.generation.logout_path())?;
        debug!("logging out at {}", url);

        let resp = self.apply_csrf(self.http.post(url)).send().await?;
        self.logged_in.store(false, Ordering::Release);

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Request {
                status: status.as_u16(),
                body,
            });
        }
        debug!("logout complete");
        Ok(())
    }

    /// Ask the controller who we are. Any failure means the session lapsed.
    pub async fn self_check(&self) -> Result<(), Error> {
        let url = self.base_url.join(self.generation.self_check_path())?;
        trace!("session check at {}", url);

        let resp = self.apply_csrf(self.http.get(url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            self.logged_in.store(false, Ordering::Release);
            return Err(Error::Authentication {
                message: format!("session check failed (HTTP {status})"),
            });
        }
        self.update_csrf_from_response(resp.headers());
        Ok(())
    }

    // ── Cookies ──────────────────────────────────────────────────────

    /// Render the session cookies for the controller origin as a `Cookie`
    /// header value (e.g. `"TOKEN=abc123"`).
    pub fn cookie_header(&self) -> Option<String> {
        let cookies = self.cookie_jar.cookies(&self.base_url)?;
        cookies.to_str().ok().map(String::from)
    }

    /// Forget the CSRF token and logged-in flag.
    ///
    /// The cookie jar has no removal API; a stale cookie is simply
    /// replaced by the next successful login.
    pub fn clear(&self) {
        self.csrf_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.logged_in.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url.as_str())
            .field("generation", &self.generation)
            .field("username", &self.username)
            .field("has_csrf_token", &self.csrf_token().is_some())
            .field("logged_in", &self.is_logged_in())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::Scheme;

    async fn setup(generation: Generation) -> (MockServer, SessionManager) {
        let server = MockServer::start().await;
        let addr = server.address();
        let config = ControllerConfig::new(addr.ip().to_string(), addr.port())
            .with_scheme(Scheme::Http)
            .with_generation(generation)
            .with_credentials("admin", SecretString::from("hunter2".to_string()));
        let session = SessionManager::new(&config).unwrap();
        (server, session)
    }

    #[tokio::test]
    async fn classic_skips_token_probe() {
        let (server, session) = setup(Generation::Classic).await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        session.acquire_token().await.unwrap();
        assert!(session.csrf_token().is_none());
    }

    #[tokio::test]
    async fn unifi_os_probe_caches_token() {
        let (server, session) = setup(Generation::UnifiOs).await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-CSRF-Token", "tok1"))
            .expect(1)
            .mount(&server)
            .await;

        session.acquire_token().await.unwrap();
        // Cached: a second call must not probe again.
        session.acquire_token().await.unwrap();
        assert_eq!(session.csrf_token().as_deref(), Some("tok1"));
    }

    #[tokio::test]
    async fn missing_token_header_is_an_error() {
        let (server, session) = setup(Generation::UnifiOs).await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = session.acquire_token().await;
        assert!(
            matches!(result, Err(Error::NoToken { .. })),
            "expected NoToken, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn login_posts_credentials_and_sends_token() {
        let (server, session) = setup(Generation::UnifiOs).await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-CSRF-Token", "tok1"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(header("x-csrf-token", "tok1"))
            .and(body_json(json!({ "username": "admin", "password": "hunter2" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "TOKEN=abc123; Path=/")
                    .insert_header("X-Updated-CSRF-Token", "tok2"),
            )
            .expect(1)
            .mount(&server)
            .await;

        session.acquire_token().await.unwrap();
        session.login().await.unwrap();

        assert!(session.is_logged_in());
        assert_eq!(session.csrf_token().as_deref(), Some("tok2"));
        assert_eq!(session.cookie_header().as_deref(), Some("TOKEN=abc123"));
    }

    #[tokio::test]
    async fn rejected_login_is_authentication_error() {
        let (server, session) = setup(Generation::Classic).await;

        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(400).set_body_string("api.err.Invalid"))
            .mount(&server)
            .await;

        let result = session.login().await;
        assert!(
            matches!(result, Err(Error::Authentication { ref message }) if message.contains("api.err.Invalid")),
            "expected Authentication error, got: {result:?}"
        );
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn self_check_uses_generation_path() {
        let (server, session) = setup(Generation::UnifiOs).await;

        Mock::given(method("GET"))
            .and(path("/api/users/self"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        assert!(session.self_check().await.is_err());
    }

    #[tokio::test]
    async fn logout_clears_logged_in_flag() {
        let (server, session) = setup(Generation::Classic).await;

        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/logout"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        session.login().await.unwrap();
        session.logout().await.unwrap();
        assert!(!session.is_logged_in());
    }

    #[tokio::test]
    async fn clear_forgets_token() {
        let (server, session) = setup(Generation::UnifiOs).await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).insert_header("X-CSRF-Token", "tok1"))
            .mount(&server)
            .await;

        session.acquire_token().await.unwrap();
        session.clear();
        assert!(session.csrf_token().is_none());
    }
}
