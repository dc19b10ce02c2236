//! HTTP client calling the invalidation endpoint of other gateway nodes.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request};
use http_body_util::Empty;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};
use service_auth_sdk::{PeerError, PeerInvalidationClient, ServiceInstance};

/// Path of the invalidation endpoint, relative to a peer's base URL.
pub const INVALIDATE_PATH: &str = "/auth/invalidate";

/// Calls `DELETE {base_url}/auth/invalidate/{token}` on a peer.
///
/// Peers with a secure port are reached over HTTPS, the others over plain HTTP.
pub struct HttpPeerClient {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
}

impl HttpPeerClient {
    /// Trusts the platform certificate store. Unreadable certificates are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`rustls::Error`] when the crypto provider supports no safe protocol version.
    pub fn new() -> Result<Self, rustls::Error> {
        let native = rustls_native_certs::load_native_certs();
        for error in &native.errors {
            tracing::warn!(error = %error, "platform certificate could not be loaded");
        }
        let mut roots = RootCertStore::empty();
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        tracing::debug!(added, ignored, "peer client trust store loaded");

        let tls = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { client })
    }

    #[must_use]
    pub fn invalidation_url(peer: &ServiceInstance, token: &str) -> String {
        format!(
            "{}{INVALIDATE_PATH}/{}",
            peer.base_url(),
            urlencoding::encode(token)
        )
    }
}

#[async_trait]
impl PeerInvalidationClient for HttpPeerClient {
    async fn invalidate(&self, peer: &ServiceInstance, token: &str) -> Result<(), PeerError> {
        let request = Request::builder()
            .method(Method::DELETE)
            .uri(Self::invalidation_url(peer, token))
            .body(Empty::<Bytes>::new())
            .map_err(|e| PeerError::Unreachable(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| PeerError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PeerError::Status(status.as_u16()))
        }
    }
}
