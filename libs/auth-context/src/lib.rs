#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Request-scoped carriers shared by the gateway authentication modules.
//!
//! - [`InboundRequest`] - the evidence a client presented (headers, cookies, peer certificates)
//! - [`OutboundRequest`] - the request about to be forwarded to a backend instance
//! - [`PeerCertificate`] - a DER-encoded client certificate attached by the transport layer
pub mod certificate;
pub mod cookies;
pub mod inbound;
pub mod outbound;

pub use certificate::PeerCertificate;
pub use inbound::{InboundRequest, InboundRequestBuilder};
pub use outbound::OutboundRequest;
