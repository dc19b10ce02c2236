//! Domain layer for southbound service authentication.

pub mod broker;
pub mod cache;
pub mod command_service;
pub mod error;
pub mod local_client;
pub mod peers;
pub mod resolvers;
pub mod schemes;
pub mod service;
pub mod token_service;

pub use broker::CredentialBroker;
pub use command_service::CommandService;
pub use error::{CredentialError, DomainError, TokenError};
pub use local_client::ServiceAuthLocalClient;
pub use peers::PeerNotifier;
pub use schemes::SchemeFactory;
pub use service::Service;
pub use token_service::TokenService;
