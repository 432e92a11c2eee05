//! OAuth 2.0 client-credentials endpoints.
//!
//! ## Supported Standards
//! - RFC 6749 §4.4: Client Credentials Grant
//! - RFC 6749 §2.3.1: `client_secret_basic` and `client_secret_post`
//! - RFC 8414: Authorization Server Metadata
//! - RFC 7517 / RFC 8037: JWKS with an Ed25519 key

pub mod credentials;
pub mod handlers;
mod types;

pub use credentials::ClientCredentials;
pub use types::TokenForm;
