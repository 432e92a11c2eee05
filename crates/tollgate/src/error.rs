//! Error types for the Tollgate authorization server.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! Every layer converts failures into one of these typed values; nothing client-caused
//! escapes as a panic.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Invalid startup configuration. Always fatal.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Issuer is not an absolute http(s) URL.
    #[error("Invalid issuer '{value}': {reason}")]
    InvalidIssuer {
        /// Configured value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// Token lifetime of zero would violate `exp > iat`.
    #[error("Token lifetime must be at least one second")]
    ZeroTokenLifetime,

    /// Token lifetime so long that `exp` could overflow or outlive any sane key.
    #[error("Token lifetime of {secs}s exceeds the maximum of {max_secs}s")]
    TokenLifetimeTooLong {
        /// Configured lifetime
        secs: u64,
        /// Accepted maximum
        max_secs: u64,
    },

    /// No global scopes registered.
    #[error("At least one scope must be registered")]
    NoScopes,

    /// Scope name contains characters outside the OAuth scope-token grammar.
    #[error("Invalid scope name '{0}'")]
    InvalidScope(String),

    /// Bootstrap client settings are unusable.
    #[error("Invalid bootstrap client: {0}")]
    InvalidBootstrapClient(String),
}

/// Signing key lifecycle errors.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    /// The OS randomness source could not produce key material.
    #[error("Randomness source unavailable: {0}")]
    Randomness(String),

    /// Reading or writing the persisted key file failed.
    #[error("Key file {path}: {source}")]
    Io {
        /// Key file location
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Persisted key file does not hold a base64url Ed25519 seed.
    #[error("Invalid key file {path}: {reason}")]
    InvalidKeyFile {
        /// Key file location
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// JWT encoding or key construction failed.
    #[error("Token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Reasons a presented token is not accepted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Signature does not match this server's key, or the token names another issuer.
    #[error("Invalid signature")]
    InvalidSignature,

    /// `exp` is in the past.
    #[error("Token expired")]
    Expired,

    /// Token cannot be decoded.
    #[error("Malformed token: {0}")]
    Malformed(String),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidKeyFormat => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed(err.to_string()),
        }
    }
}

/// Client registry backend errors.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// Backend cannot be reached or written right now. Surfaced as 503.
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    /// Record violates registry rules (empty id, bad scope name).
    #[error("Invalid client record: {0}")]
    InvalidRecord(String),
}

impl RegistryError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create an invalid record error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }

    /// Returns true if retrying later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// OAuth 2.0 error codes returned by the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidScope,
    UnsupportedGrantType,
}

impl OAuthErrorCode {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidScope => "invalid_scope",
            Self::UnsupportedGrantType => "unsupported_grant_type",
        }
    }
}

impl fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A client-caused rejection. Always recoverable by correcting the request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}")]
pub struct OAuthError {
    pub code: OAuthErrorCode,
    pub description: Option<Cow<'static, str>>,
}

impl OAuthError {
    #[must_use]
    pub fn invalid_request(description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: OAuthErrorCode::InvalidRequest,
            description: Some(description.into()),
        }
    }

    /// Deliberately carries the same description for unknown ids and bad secrets.
    #[must_use]
    pub const fn invalid_client() -> Self {
        Self {
            code: OAuthErrorCode::InvalidClient,
            description: Some(Cow::Borrowed("Client authentication failed")),
        }
    }

    #[must_use]
    pub fn invalid_scope(description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: OAuthErrorCode::InvalidScope,
            description: Some(description.into()),
        }
    }

    #[must_use]
    pub const fn unsupported_grant_type() -> Self {
        Self {
            code: OAuthErrorCode::UnsupportedGrantType,
            description: Some(Cow::Borrowed("Only client_credentials is supported")),
        }
    }
}

/// Outcome of a failed issuance.
#[derive(thiserror::Error, Debug)]
pub enum IssueError {
    /// Request rejected; maps 1:1 onto a 400 OAuth error body.
    #[error("Request rejected: {0}")]
    Rejected(#[from] OAuthError),

    /// Registry could not answer.
    #[error("Registry error: {0}")]
    Backend(#[from] RegistryError),

    /// Signing failed. Not expected for claims built by the issuer.
    #[error("Signing error: {0}")]
    Signing(#[from] KeyError),

    /// `iat + lifetime` does not fit in a timestamp.
    #[error("Token lifetime of {0}s overflows the expiry timestamp")]
    LifetimeOverflow(u64),
}

impl IssueError {
    /// The OAuth error code if this was a client-caused rejection.
    #[must_use]
    pub const fn oauth_code(&self) -> Option<OAuthErrorCode> {
        match self {
            Self::Rejected(err) => Some(err.code),
            _ => None,
        }
    }
}

/// Result type alias for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_error_codes_serialize_snake_case() {
        let json = serde_json::to_value(OAuthErrorCode::UnsupportedGrantType).unwrap();
        assert_eq!(json, "unsupported_grant_type");
        assert_eq!(OAuthErrorCode::InvalidClient.to_string(), "invalid_client");
    }

    #[test]
    fn test_invalid_client_description_is_generic() {
        let err = OAuthError::invalid_client();
        assert_eq!(err.code, OAuthErrorCode::InvalidClient);
        assert!(!err.description.unwrap().contains("not found"));
    }

    #[test]
    fn test_registry_error_transient() {
        assert!(RegistryError::unavailable("down").is_transient());
        assert!(!RegistryError::invalid_record("empty id").is_transient());
    }

    #[test]
    fn test_verify_error_from_jsonwebtoken() {
        use jsonwebtoken::errors::{Error, ErrorKind};

        assert_eq!(
            VerifyError::from(Error::from(ErrorKind::ExpiredSignature)),
            VerifyError::Expired
        );
        assert_eq!(
            VerifyError::from(Error::from(ErrorKind::InvalidSignature)),
            VerifyError::InvalidSignature
        );
        assert!(matches!(
            VerifyError::from(Error::from(ErrorKind::InvalidToken)),
            VerifyError::Malformed(_)
        ));
    }

    #[test]
    fn test_issue_error_oauth_code() {
        let err = IssueError::from(OAuthError::invalid_scope("nope"));
        assert_eq!(err.oauth_code(), Some(OAuthErrorCode::InvalidScope));

        let err = IssueError::from(RegistryError::unavailable("down"));
        assert_eq!(err.oauth_code(), None);
    }
}
