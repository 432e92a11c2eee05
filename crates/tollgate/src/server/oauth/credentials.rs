//! Client authentication sources (RFC 6749 §2.3.1).
//!
//! Credentials arrive either as an `Authorization: Basic` header
//! (`client_secret_basic`) or in the form body (`client_secret_post`).
//! Exactly one source may carry the secret. Header credentials are
//! form-urlencoded before base64, so both halves are decoded after the split.

use std::fmt;

use axum::http::{HeaderMap, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::OAuthError;

/// A client id and secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Extract Basic credentials from the request headers.
///
/// Returns `Ok(None)` when there is no `Authorization` header or it uses a
/// different scheme. A Basic header that does not decode to `id:secret` is
/// `invalid_request`. The id and secret are form-urldecoded, so `%3A` yields
/// a literal colon and `+` a space.
pub fn basic_credentials(headers: &HeaderMap) -> Result<Option<ClientCredentials>, OAuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| OAuthError::invalid_request("Authorization header is not valid ASCII"))?;

    let Some((scheme, encoded)) = value.trim().split_once(' ') else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Ok(None);
    }

    let malformed = || OAuthError::invalid_request("Malformed Basic authorization header");

    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (client_id, client_secret) = decoded.split_once(':').ok_or_else(malformed)?;
    let client_id = form_decode(client_id);
    if client_id.is_empty() {
        return Err(malformed());
    }

    Ok(Some(ClientCredentials {
        client_id,
        client_secret: form_decode(client_secret),
    }))
}

/// Decode one `application/x-www-form-urlencoded` component.
///
/// A raw `&` is kept literally rather than splitting the value.
fn form_decode(component: &str) -> String {
    let escaped = component.replace('&', "%26");
    url::form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

/// Pick the single credential source for this request.
pub fn resolve(
    basic: Option<ClientCredentials>,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<ClientCredentials, OAuthError> {
    if let Some(basic) = basic {
        if form_client_secret.is_some() {
            return Err(OAuthError::invalid_request(
                "Client credentials supplied by more than one method",
            ));
        }
        if form_client_id.is_some_and(|id| id != basic.client_id) {
            return Err(OAuthError::invalid_request(
                "client_id does not match the Authorization header",
            ));
        }
        if basic.client_secret.is_empty() {
            return Err(OAuthError::invalid_request("Missing client_secret"));
        }
        return Ok(basic);
    }

    let client_id = form_client_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| OAuthError::invalid_request("Missing client_id"))?;
    let client_secret = form_client_secret
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| OAuthError::invalid_request("Missing client_secret"))?;

    Ok(ClientCredentials {
        client_id: client_id.to_owned(),
        client_secret: client_secret.to_owned(),
    })
}
