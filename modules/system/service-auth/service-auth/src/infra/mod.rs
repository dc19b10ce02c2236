//! Infrastructure adapters.

pub mod http_peer_client;

pub use http_peer_client::HttpPeerClient;
