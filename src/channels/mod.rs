//! Mailbox gateways and their credentials.

pub mod auth;
pub mod email;
pub mod gmail;

pub use auth::{AuthProvider, OAuthTokenProvider, StaticTokenProvider, TokenStore};
pub use email::{EmailConfig, ImapGateway};
pub use gmail::GmailGateway;
