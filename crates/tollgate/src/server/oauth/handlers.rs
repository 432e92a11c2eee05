//! OAuth 2.0 endpoint handlers.
//!
//! Implements:
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7517: JSON Web Key Set
//! - RFC 6749 §4.4: Client Credentials token endpoint

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::credentials;
use super::types::{ErrorBody, TokenForm};
use crate::error::{IssueError, OAuthError};
use crate::issuer::{TokenRequest, TokenResponse};
use crate::server::transport::{HttpState, JWKS_PATH, TOKEN_PATH};

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
pub async fn handle_auth_server_metadata(
    State(state): State<Arc<HttpState>>,
) -> impl IntoResponse {
    let issuer = state.keys.issuer();
    let scopes: Vec<&String> = state
        .token_issuer
        .settings()
        .registered_scopes
        .iter()
        .collect();

    Json(serde_json::json!({
        "issuer": issuer,
        "token_endpoint": format!("{issuer}{TOKEN_PATH}"),
        "jwks_uri": format!("{issuer}{JWKS_PATH}"),
        "scopes_supported": scopes,
        "response_types_supported": [],
        "grant_types_supported": ["client_credentials"],
        "token_endpoint_auth_methods_supported": ["client_secret_basic", "client_secret_post"],
        "token_endpoint_auth_signing_alg_values_supported": ["EdDSA"]
    }))
}

// ─── JWKS ────────────────────────────────────────────────────────────────────

/// `GET /.well-known/jwks.json`
///
/// Publishes the verification key so resource servers can check tokens.
pub async fn handle_jwks(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "keys": [state.keys.jwk()] }))
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// `POST /connect/token`
///
/// Client credentials grant. Credentials may come from the form body or an
/// `Authorization: Basic` header, never both.
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Response {
    let request = match token_request(&headers, form) {
        Ok(request) => request,
        Err(e) => {
            tracing::info!(error = %e.code, "Malformed token request");
            return token_error(&e);
        }
    };

    match state.token_issuer.issue(&request).await {
        Ok(response) => token_success(&response),
        Err(IssueError::Rejected(e)) => token_error(&e),
        Err(IssueError::Backend(_)) => temporarily_unavailable(),
        Err(IssueError::Signing(_) | IssueError::LifetimeOverflow(_)) => server_error(),
    }
}

/// Turn the raw HTTP input into a [`TokenRequest`], rejecting anything
/// incomplete before the issuer sees it.
fn token_request(
    headers: &HeaderMap,
    form: Result<Form<TokenForm>, FormRejection>,
) -> Result<TokenRequest, OAuthError> {
    let Form(form) = form.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected token request body");
        OAuthError::invalid_request(
            "Body must be application/x-www-form-urlencoded with unique fields",
        )
    })?;

    let grant_type = form
        .grant_type
        .filter(|g| !g.trim().is_empty())
        .ok_or_else(|| OAuthError::invalid_request("Missing grant_type"))?;

    let basic = credentials::basic_credentials(headers)?;
    let creds = credentials::resolve(
        basic,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    )?;

    Ok(TokenRequest {
        grant_type,
        client_id: creds.client_id,
        client_secret: creds.client_secret,
        scope: form.scope,
    })
}

/// Build a token response with required OAuth 2.0 cache headers (RFC 6749 §5.1).
fn token_success(token: &TokenResponse) -> Response {
    no_store(Json(token).into_response())
}

fn token_error(err: &OAuthError) -> Response {
    no_store((StatusCode::BAD_REQUEST, Json(ErrorBody::from(err))).into_response())
}

/// Registry outage. Carries no detail about the backend.
fn temporarily_unavailable() -> Response {
    let body = Json(ErrorBody::bare("temporarily_unavailable"));
    no_store((StatusCode::SERVICE_UNAVAILABLE, body).into_response())
}

fn server_error() -> Response {
    let body = Json(ErrorBody::bare("server_error"));
    no_store((StatusCode::INTERNAL_SERVER_ERROR, body).into_response())
}

fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
