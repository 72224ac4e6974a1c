// Transport construction for the REST client and the event socket.
//
// Both share the same TLS policy: verify against webpki roots, or accept
// anything when the controller runs a self-signed certificate.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_tungstenite::Connector;

use crate::error::Error;

/// Client identifier sent as `User-Agent` on every request and on the
/// socket upgrade.
pub const USER_AGENT: &str = concat!("unifi-events/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub verify_tls: bool,
    pub timeout: Duration,
    pub cookie_jar: Arc<Jar>,
}

impl TransportConfig {
    pub fn new(verify_tls: bool, timeout: Duration) -> Self {
        Self {
            verify_tls,
            timeout,
            cookie_jar: Arc::new(Jar::default()),
        }
    }

    /// Build a `reqwest::Client` that stores session cookies in `cookie_jar`.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&self.cookie_jar));

        if !self.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// TLS connector for the event socket.
    ///
    /// `None` lets tokio-tungstenite use its default (webpki roots).
    pub fn websocket_connector(&self) -> Result<Option<Connector>, Error> {
        if self.verify_tls {
            return Ok(None);
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(format!("failed to configure TLS: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth();

        Ok(Some(Connector::Rustls(Arc::new(config))))
    }
}

/// Certificate verifier for self-signed controllers.
///
/// Skips chain validation but still checks handshake signatures so the
/// session keys belong to the presented certificate.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
