use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::OAuthError;

/// Form body of `POST /connect/token`.
///
/// Every field is optional so that missing values surface as
/// `invalid_request` instead of an extractor rejection.
#[derive(Default, Deserialize)]
pub struct TokenForm {
    pub grant_type: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

impl std::fmt::Debug for TokenForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenForm")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// OAuth error response body (RFC 6749 §5.2).
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<Cow<'static, str>>,
}

impl From<&OAuthError> for ErrorBody {
    fn from(err: &OAuthError) -> Self {
        Self {
            error: err.code.as_str(),
            error_description: err.description.clone(),
        }
    }
}

impl ErrorBody {
    pub const fn bare(error: &'static str) -> Self {
        Self {
            error,
            error_description: None,
        }
    }
}
