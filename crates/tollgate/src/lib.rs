//! Tollgate
//!
//! A minimal OAuth 2.0 authorization server for the client-credentials grant.
//! Registered machine clients exchange their id and secret for a short-lived,
//! Ed25519-signed JWT access token.
//!
//! # Features
//!
//! - **Client credentials**: `POST /connect/token` with `client_secret_post`
//!   or `client_secret_basic`
//! - **Signed tokens**: EdDSA JWTs, public key published as a JWKS
//! - **Pluggable registry**: in-memory or JSON-file backed [`ClientStore`]
//! - **Idempotent bootstrap**: a well-known client is ensured at startup
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tollgate::issuer::TokenRequest;
//! use tollgate::registry::MemoryClientStore;
//! use tollgate::{Config, KeyManager, TokenIssuer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let keys = Arc::new(KeyManager::generate(&config.issuer)?);
//!     let store = Arc::new(MemoryClientStore::new());
//!     tollgate::bootstrap::ensure_client(store.as_ref(), &config.bootstrap).await;
//!
//!     let issuer = TokenIssuer::new(store, keys, config.issuer_settings());
//!     let request = TokenRequest::client_credentials("postman", "postman-secret", None);
//!     let token = issuer.issue(&request).await?;
//!     println!("{}", token.access_token);
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod issuer;
pub mod keys;
pub mod registry;
pub mod server;

pub use config::Config;
pub use error::{IssueError, OAuthError, RegistryError};
pub use issuer::TokenIssuer;
pub use keys::KeyManager;
pub use registry::ClientStore;
pub use server::AuthServer;
