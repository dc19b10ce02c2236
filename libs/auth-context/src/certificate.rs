use base64::Engine;
use bytes::Bytes;
use sha2::{Digest, Sha256};

/// A client certificate presented during the TLS handshake, kept in DER form.
///
/// The transport layer terminates TLS and attaches the peer chain to the request;
/// only the leaf certificate is used for authentication.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerCertificate {
    der: Bytes,
}

impl PeerCertificate {
    #[must_use]
    pub fn from_der(der: impl Into<Bytes>) -> Self {
        Self { der: der.into() }
    }

    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Standard base64 encoding of the DER bytes.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// Hex-encoded SHA-256 of the DER bytes.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.der))
    }
}

impl std::fmt::Debug for PeerCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerCertificate")
            .field("fingerprint", &self.fingerprint())
            .field("len", &self.der.len())
            .finish()
    }
}
