//! Client-credentials token issuance.
//!
//! Each request moves `Received → Validated → Issued`, or `Received → Rejected`
//! at the first failing check:
//!
//! 1. `grant_type` must be `client_credentials`
//! 2. the client must exist
//! 3. the secret must match (constant time, unknown ids included)
//! 4. requested scopes are narrowed to what the client and server allow
//! 5. claims are built and signed
//!
//! Rejections are values ([`IssueError`]); nothing here panics on client input.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::error::{IssueError, OAuthError};
use crate::keys::{AccessTokenClaims, KeyManager, unix_now};
use crate::registry::{ClientRecord, ClientStore, GrantType, SecretHash};

/// `token_type` returned with every token.
pub const TOKEN_TYPE: &str = "bearer";

/// Per-request progress, recorded in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Validated,
    Issued,
    Rejected,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Issued => "issued",
            Self::Rejected => "rejected",
        })
    }
}

/// Issuance policy.
#[derive(Debug, Clone)]
pub struct IssuerSettings {
    pub token_lifetime: Duration,
    /// Server-wide scope registry; grants never exceed it.
    pub registered_scopes: BTreeSet<String>,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            token_lifetime: defaults::TOKEN_LIFETIME,
            registered_scopes: defaults::SCOPES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// A parsed token request, credentials already extracted from whichever
/// source carried them.
#[derive(Clone)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

impl TokenRequest {
    #[must_use]
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<&str>,
    ) -> Self {
        Self {
            grant_type: GrantType::ClientCredentials.as_str().to_owned(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.map(str::to_owned),
        }
    }
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Successful token response body (RFC 6749 §5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: String,
}

/// Validates client-credentials requests and mints access tokens.
pub struct TokenIssuer {
    store: Arc<dyn ClientStore>,
    keys: Arc<KeyManager>,
    settings: IssuerSettings,
    unknown_client_hash: SecretHash,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(
        store: Arc<dyn ClientStore>,
        keys: Arc<KeyManager>,
        settings: IssuerSettings,
    ) -> Self {
        Self {
            store,
            keys,
            settings,
            unknown_client_hash: SecretHash::unguessable(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &IssuerSettings {
        &self.settings
    }

    /// Run the state machine for one request.
    pub async fn issue(&self, request: &TokenRequest) -> Result<TokenResponse, IssueError> {
        tracing::debug!(
            client_id = %request.client_id,
            state = %RequestState::Received,
            "Token request"
        );

        let result = match self.validate(request).await {
            Ok((client, scopes)) => {
                tracing::debug!(
                    client_id = %client.client_id,
                    state = %RequestState::Validated,
                    "Token request"
                );
                self.mint(&client, &scopes)
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(response) => tracing::info!(
                client_id = %request.client_id,
                scope = %response.scope,
                state = %RequestState::Issued,
                "Issued access token"
            ),
            Err(IssueError::Rejected(e)) => tracing::info!(
                client_id = %request.client_id,
                error = %e.code,
                state = %RequestState::Rejected,
                "Rejected token request"
            ),
            Err(e) => tracing::error!(
                client_id = %request.client_id,
                error = %e,
                state = %RequestState::Rejected,
                "Token request failed"
            ),
        }
        result
    }

    async fn validate(
        &self,
        request: &TokenRequest,
    ) -> Result<(ClientRecord, BTreeSet<String>), IssueError> {
        if GrantType::from_wire(&request.grant_type) != Some(GrantType::ClientCredentials) {
            return Err(OAuthError::unsupported_grant_type().into());
        }

        let client = self.authenticate(&request.client_id, &request.client_secret).await?;
        let scopes = self.resolve_scopes(&client, request.scope.as_deref())?;
        Ok((client, scopes))
    }

    /// Look up the client and check its secret.
    ///
    /// Unknown ids verify against a throwaway hash so both failure paths do
    /// the same work and return the same error.
    async fn authenticate(
        &self,
        client_id: &str,
        secret: &str,
    ) -> Result<ClientRecord, IssueError> {
        let Some(client) = self.store.find_by_id(client_id).await? else {
            std::hint::black_box(self.unknown_client_hash.verify(secret));
            return Err(OAuthError::invalid_client().into());
        };

        if !client.verify_secret(secret) {
            return Err(OAuthError::invalid_client().into());
        }
        if !client.allows_grant(GrantType::ClientCredentials) {
            tracing::warn!(
                client_id = %client_id,
                "Client is not allowed the client_credentials grant"
            );
            return Err(OAuthError::invalid_client().into());
        }
        Ok(client)
    }

    /// Narrow the requested scopes to what this client may receive.
    fn resolve_scopes(
        &self,
        client: &ClientRecord,
        requested: Option<&str>,
    ) -> Result<BTreeSet<String>, OAuthError> {
        let grantable: BTreeSet<&String> = client
            .allowed_scopes
            .intersection(&self.settings.registered_scopes)
            .collect();

        let Some(requested) = parse_scope(requested) else {
            return Ok(grantable.into_iter().cloned().collect());
        };

        let granted: BTreeSet<String> = requested
            .into_iter()
            .filter(|s| grantable.contains(s))
            .collect();
        if granted.is_empty() {
            return Err(OAuthError::invalid_scope(
                "None of the requested scopes are allowed for this client",
            ));
        }
        Ok(granted)
    }

    fn mint(
        &self,
        client: &ClientRecord,
        scopes: &BTreeSet<String>,
    ) -> Result<TokenResponse, IssueError> {
        let lifetime = self.settings.token_lifetime.as_secs().max(1);
        let now = unix_now();
        let exp = now
            .checked_add(lifetime)
            .ok_or(IssueError::LifetimeOverflow(lifetime))?;
        let scope = join_scopes(scopes);

        let claims = AccessTokenClaims {
            iss: self.keys.issuer().to_owned(),
            sub: client.client_id.clone(),
            client_id: client.client_id.clone(),
            scope: scope.clone(),
            iat: now,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        Ok(TokenResponse {
            access_token: self.keys.sign(&claims)?,
            token_type: TOKEN_TYPE.to_owned(),
            expires_in: lifetime,
            scope,
        })
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("keys", &self.keys)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Split a space-delimited `scope` parameter.
///
/// Absent, empty and whitespace-only values all mean "not requested".
#[must_use]
pub fn parse_scope(raw: Option<&str>) -> Option<BTreeSet<String>> {
    let scopes: BTreeSet<String> = raw?.split_whitespace().map(str::to_owned).collect();
    (!scopes.is_empty()).then_some(scopes)
}

/// Join scopes into the canonical space-delimited, sorted form.
#[must_use]
pub fn join_scopes(scopes: &BTreeSet<String>) -> String {
    scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OAuthErrorCode, RegistryError, RegistryResult};
    use crate::registry::{CreateOutcome, MemoryClientStore};

    const ISSUER: &str = "https://auth.example.com";

    async fn issuer_with(
        records: Vec<ClientRecord>,
        registered: &[&str],
    ) -> (TokenIssuer, Arc<KeyManager>) {
        let store = MemoryClientStore::new();
        for record in records {
            store.create_if_absent(record).await.unwrap();
        }
        let keys = Arc::new(KeyManager::generate(ISSUER).unwrap());
        let settings = IssuerSettings {
            token_lifetime: Duration::from_secs(3600),
            registered_scopes: registered.iter().map(|s| (*s).to_owned()).collect(),
        };
        (TokenIssuer::new(Arc::new(store), Arc::clone(&keys), settings), keys)
    }

    fn acme() -> ClientRecord {
        ClientRecord::new("acme", "s3cr3t", "Acme", ["api", "read", "write"]).unwrap()
    }

    async fn issue(
        issuer: &TokenIssuer,
        client_id: &str,
        secret: &str,
        scope: Option<&str>,
    ) -> Result<TokenResponse, IssueError> {
        let request = TokenRequest::client_credentials(client_id, secret, scope);
        issuer.issue(&request).await
    }

    fn code(result: Result<TokenResponse, IssueError>) -> OAuthErrorCode {
        result.unwrap_err().oauth_code().expect("client-caused rejection")
    }

    #[tokio::test]
    async fn test_issues_full_scope_by_default() {
        let (issuer, keys) = issuer_with(vec![acme()], &["api", "read", "write"]).await;
        let response = issue(&issuer, "acme", "s3cr3t", None).await.unwrap();

        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.scope, "api read write");

        let claims = keys.verify(&response.access_token).unwrap();
        assert_eq!(claims.sub, "acme");
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[tokio::test]
    async fn test_requested_subset_is_granted() {
        let (issuer, keys) = issuer_with(vec![acme()], &["api", "read", "write"]).await;
        let response = issue(&issuer, "acme", "s3cr3t", Some("write api")).await.unwrap();

        assert_eq!(response.scope, "api write");
        assert_eq!(keys.verify(&response.access_token).unwrap().scope, "api write");
    }

    #[tokio::test]
    async fn test_partially_allowed_scopes_are_narrowed() {
        let (issuer, _) = issuer_with(vec![acme()], &["api", "read", "write"]).await;
        let response = issue(&issuer, "acme", "s3cr3t", Some("api admin")).await.unwrap();
        assert_eq!(response.scope, "api");
    }

    #[tokio::test]
    async fn test_disjoint_scopes_rejected() {
        let (issuer, _) = issuer_with(vec![acme()], &["api", "read", "write"]).await;
        let result = issue(&issuer, "acme", "s3cr3t", Some("admin")).await;
        assert_eq!(code(result), OAuthErrorCode::InvalidScope);
    }

    #[tokio::test]
    async fn test_blank_scope_means_default() {
        let (issuer, _) = issuer_with(vec![acme()], &["api", "read", "write"]).await;
        let response = issue(&issuer, "acme", "s3cr3t", Some("   ")).await.unwrap();
        assert_eq!(response.scope, "api read write");
    }

    #[tokio::test]
    async fn test_client_scopes_outside_registry_are_never_granted() {
        let (issuer, _) = issuer_with(vec![acme()], &["api"]).await;

        let response = issue(&issuer, "acme", "s3cr3t", None).await.unwrap();
        assert_eq!(response.scope, "api");

        let result = issue(&issuer, "acme", "s3cr3t", Some("write")).await;
        assert_eq!(code(result), OAuthErrorCode::InvalidScope);
    }

    #[tokio::test]
    async fn test_unknown_client_and_wrong_secret_look_identical() {
        let (issuer, _) = issuer_with(vec![acme()], &["api"]).await;

        let unknown = issue(&issuer, "nobody", "s3cr3t", None).await.unwrap_err();
        let wrong = issue(&issuer, "acme", "wrong", None).await.unwrap_err();

        match (unknown, wrong) {
            (IssueError::Rejected(a), IssueError::Rejected(b)) => {
                assert_eq!(a, b);
                assert_eq!(a.code, OAuthErrorCode::InvalidClient);
            }
            other => panic!("expected two rejections, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_grant_checked_first() {
        let (issuer, _) = issuer_with(vec![acme()], &["api"]).await;
        let mut request = TokenRequest::client_credentials("nobody", "wrong", None);
        request.grant_type = "authorization_code".to_owned();

        assert_eq!(code(issuer.issue(&request).await), OAuthErrorCode::UnsupportedGrantType);
    }

    #[tokio::test]
    async fn test_client_without_grant_is_rejected() {
        let mut record = acme();
        record.allowed_grant_types.clear();
        let (issuer, _) = issuer_with(vec![record], &["api"]).await;

        let result = issue(&issuer, "acme", "s3cr3t", None).await;
        assert_eq!(code(result), OAuthErrorCode::InvalidClient);
    }

    struct UnreachableStore;

    #[async_trait::async_trait]
    impl ClientStore for UnreachableStore {
        async fn find_by_id(&self, _client_id: &str) -> RegistryResult<Option<ClientRecord>> {
            Err(RegistryError::unavailable("connection refused"))
        }
        async fn create_if_absent(&self, _record: ClientRecord) -> RegistryResult<CreateOutcome> {
            Err(RegistryError::unavailable("connection refused"))
        }
        async fn update_display_name(&self, _client_id: &str, _name: &str) -> RegistryResult<bool> {
            Err(RegistryError::unavailable("connection refused"))
        }
        async fn len(&self) -> RegistryResult<usize> {
            Err(RegistryError::unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_a_client_error() {
        let keys = Arc::new(KeyManager::generate(ISSUER).unwrap());
        let issuer = TokenIssuer::new(Arc::new(UnreachableStore), keys, IssuerSettings::default());

        let err = issue(&issuer, "acme", "s3cr3t", None).await.unwrap_err();
        assert!(matches!(err, IssueError::Backend(_)));
        assert_eq!(err.oauth_code(), None);
    }

    #[tokio::test]
    async fn test_lifetime_overflow_is_an_error_value() {
        let store = MemoryClientStore::from_records([acme()]);
        let keys = Arc::new(KeyManager::generate(ISSUER).unwrap());
        let settings = IssuerSettings {
            token_lifetime: Duration::from_secs(u64::MAX),
            registered_scopes: BTreeSet::from(["api".to_owned()]),
        };
        let issuer = TokenIssuer::new(Arc::new(store), keys, settings);

        let err = issue(&issuer, "acme", "s3cr3t", None).await.unwrap_err();
        assert!(matches!(err, IssueError::LifetimeOverflow(secs) if secs == u64::MAX));
        assert_eq!(err.oauth_code(), None);
    }

    #[test]
    fn test_parse_scope() {
        assert_eq!(parse_scope(None), None);
        assert_eq!(parse_scope(Some("")), None);
        assert_eq!(parse_scope(Some(" \t ")), None);
        assert_eq!(
            parse_scope(Some("b  a a")),
            Some(BTreeSet::from(["a".to_owned(), "b".to_owned()]))
        );
    }

    #[test]
    fn test_token_request_debug_redacts_secret() {
        let request = TokenRequest::client_credentials("acme", "s3cr3t", None);
        let debug = format!("{request:?}");
        assert!(debug.contains("acme"));
        assert!(!debug.contains("s3cr3t"));
    }
}
