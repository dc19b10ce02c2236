use http::HeaderMap;
use http::header::{AUTHORIZATION, HeaderName};

use crate::certificate::PeerCertificate;
use crate::cookies;

/// Evidence an inbound request carries, as seen after TLS termination.
///
/// Built by the reverse-proxy layer for each request and handed to the credential
/// broker. Nothing in here is validated yet.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    headers: HeaderMap,
    peer_certificates: Vec<PeerCertificate>,
    path: Option<String>,
}

impl InboundRequest {
    #[must_use]
    pub fn builder() -> InboundRequestBuilder {
        InboundRequestBuilder::default()
    }

    /// Build from the parts of an `http::Request`; certificates must be attached separately.
    #[must_use]
    pub fn from_parts(parts: &http::request::Parts) -> Self {
        Self {
            headers: parts.headers.clone(),
            peer_certificates: Vec::new(),
            path: Some(parts.uri.path().to_owned()),
        }
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of a header, if present and valid ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        cookies::find_cookie(&self.headers, name)
    }

    /// Token from an `Authorization: Bearer ...` header, without the scheme.
    ///
    /// The scheme name is matched case-insensitively.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.headers.get(AUTHORIZATION)?.to_str().ok()?.trim_start();
        let (scheme, token) = value.split_once(|c: char| c.is_ascii_whitespace())?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }

    /// Leaf certificate of the client chain; the rest of the chain is ignored.
    #[must_use]
    pub fn peer_certificate(&self) -> Option<&PeerCertificate> {
        self.peer_certificates.first()
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Attach the client chain extracted by the transport layer.
    #[must_use]
    pub fn with_peer_certificates(mut self, chain: Vec<PeerCertificate>) -> Self {
        self.peer_certificates = chain;
        self
    }
}

#[derive(Default)]
pub struct InboundRequestBuilder {
    headers: HeaderMap,
    peer_certificates: Vec<PeerCertificate>,
    path: Option<String>,
}

impl InboundRequestBuilder {
    /// Append a header. Invalid names or values are silently skipped.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    #[must_use]
    pub fn cookie(self, name: &str, value: &str) -> Self {
        self.header(http::header::COOKIE.as_str(), &format!("{name}={value}"))
    }

    #[must_use]
    pub fn peer_certificate(mut self, cert: PeerCertificate) -> Self {
        self.peer_certificates.push(cert);
        self
    }

    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_owned());
        self
    }

    #[must_use]
    pub fn build(self) -> InboundRequest {
        InboundRequest {
            headers: self.headers,
            peer_certificates: self.peer_certificates,
            path: self.path,
        }
    }
}
