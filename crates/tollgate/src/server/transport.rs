//! HTTP transport.
//!
//! Builds the axum router and the state shared by every handler.

use std::sync::Arc;

use axum::{
    Json, Router,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::oauth::handlers;
use crate::issuer::{IssuerSettings, TokenIssuer};
use crate::keys::KeyManager;
use crate::registry::ClientStore;

/// Token endpoint path, relative to the issuer.
pub const TOKEN_PATH: &str = "/connect/token";

/// JWKS path, relative to the issuer.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Authorization server metadata path (RFC 8414).
pub const METADATA_PATH: &str = "/.well-known/oauth-authorization-server";

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub token_issuer: TokenIssuer,
    pub keys: Arc<KeyManager>,
}

impl HttpState {
    #[must_use]
    pub fn new(
        store: Arc<dyn ClientStore>,
        keys: Arc<KeyManager>,
        settings: IssuerSettings,
    ) -> Self {
        Self {
            token_issuer: TokenIssuer::new(store, Arc::clone(&keys), settings),
            keys,
        }
    }
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState")
            .field("token_issuer", &self.token_issuer)
            .finish()
    }
}

/// Create the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(METADATA_PATH, get(handlers::handle_auth_server_metadata))
        .route(JWKS_PATH, get(handlers::handle_jwks))
        .route(TOKEN_PATH, post(handlers::handle_token))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "tollgate",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
