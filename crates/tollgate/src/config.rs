//! Configuration for the Tollgate authorization server.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::bootstrap::BootstrapClient;
use crate::error::ConfigError;
use crate::issuer::IssuerSettings;
use crate::registry::is_valid_scope_token;

/// Default values.
pub mod defaults {
    use std::time::Duration;

    /// Issuer URL stamped into tokens.
    pub const ISSUER: &str = "http://localhost:8000";

    /// HTTP listen port.
    pub const PORT: u16 = 8000;

    /// Access token lifetime (1 hour).
    pub const TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

    /// Longest accepted access token lifetime (30 days).
    pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(30 * 24 * 3600);

    /// Globally registered scopes.
    pub const SCOPES: &[&str] = &["api"];

    /// Well-known client created at startup.
    pub const BOOTSTRAP_CLIENT_ID: &str = "postman";

    /// Secret of the well-known client.
    pub const BOOTSTRAP_CLIENT_SECRET: &str = "postman-secret";

    /// Display name of the well-known client.
    pub const BOOTSTRAP_DISPLAY_NAME: &str = "Postman";
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Issuer URL, without trailing slash.
    pub issuer: String,

    /// HTTP listen port.
    pub port: u16,

    /// Access token lifetime.
    pub token_lifetime: Duration,

    /// Globally registered scopes.
    pub scopes: BTreeSet<String>,

    /// Client ensured at startup.
    pub bootstrap: BootstrapClient,

    /// Persist the client registry to this JSON file (in-memory if unset).
    pub clients_file: Option<PathBuf>,

    /// Persist the signing key seed to this file (ephemeral if unset).
    pub signing_key_file: Option<PathBuf>,
}

impl Config {
    /// Default configuration listening on `port`.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            issuer: defaults::ISSUER.to_owned(),
            port,
            token_lifetime: defaults::TOKEN_LIFETIME,
            scopes: defaults::SCOPES.iter().map(|s| (*s).to_owned()).collect(),
            bootstrap: BootstrapClient::default(),
            clients_file: None,
            signing_key_file: None,
        }
    }

    /// Create a test configuration with a fixed issuer and no persistence.
    #[must_use]
    pub fn for_testing(issuer: &str) -> Self {
        Self {
            issuer: normalize_issuer(issuer),
            ..Self::new(0)
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Reads `TOLLGATE_ISSUER`, `PORT`, `TOLLGATE_TOKEN_LIFETIME` (seconds),
    /// `TOLLGATE_SCOPES` (space or comma separated), `TOLLGATE_CLIENTS_FILE`,
    /// `TOLLGATE_SIGNING_KEY_FILE` and the `TOLLGATE_BOOTSTRAP_*` overrides
    /// for the startup client.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(issuer) = std::env::var("TOLLGATE_ISSUER") {
            config.issuer = normalize_issuer(&issuer);
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port.parse()?;
        }
        if let Ok(secs) = std::env::var("TOLLGATE_TOKEN_LIFETIME") {
            config.token_lifetime = Duration::from_secs(secs.parse()?);
        }
        if let Ok(scopes) = std::env::var("TOLLGATE_SCOPES") {
            config.scopes = parse_scope_list(&scopes);
        }
        if let Ok(id) = std::env::var("TOLLGATE_BOOTSTRAP_CLIENT_ID") {
            config.bootstrap.client_id = id;
        }
        if let Ok(secret) = std::env::var("TOLLGATE_BOOTSTRAP_CLIENT_SECRET") {
            config.bootstrap.client_secret = secret;
        }
        if let Ok(name) = std::env::var("TOLLGATE_BOOTSTRAP_DISPLAY_NAME") {
            config.bootstrap.display_name = name;
        }
        if let Ok(scopes) = std::env::var("TOLLGATE_BOOTSTRAP_SCOPES") {
            config.bootstrap.scopes = parse_scope_list(&scopes);
        }
        config.clients_file = std::env::var_os("TOLLGATE_CLIENTS_FILE").map(PathBuf::from);
        config.signing_key_file =
            std::env::var_os("TOLLGATE_SIGNING_KEY_FILE").map(PathBuf::from);

        Ok(config)
    }

    /// Reject configurations the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid_issuer = |reason: &str| ConfigError::InvalidIssuer {
            value: self.issuer.clone(),
            reason: reason.to_owned(),
        };
        let url = url::Url::parse(&self.issuer).map_err(|e| invalid_issuer(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid_issuer("scheme must be http or https"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid_issuer("must not carry a query or fragment"));
        }

        if self.token_lifetime.as_secs() == 0 {
            return Err(ConfigError::ZeroTokenLifetime);
        }
        if self.token_lifetime > defaults::MAX_TOKEN_LIFETIME {
            return Err(ConfigError::TokenLifetimeTooLong {
                secs: self.token_lifetime.as_secs(),
                max_secs: defaults::MAX_TOKEN_LIFETIME.as_secs(),
            });
        }

        if self.scopes.is_empty() {
            return Err(ConfigError::NoScopes);
        }
        if let Some(bad) = self.scopes.iter().find(|s| !is_valid_scope_token(s)) {
            return Err(ConfigError::InvalidScope(bad.clone()));
        }

        self.bootstrap.validate(&self.scopes)
    }

    /// Issuance policy derived from this configuration.
    #[must_use]
    pub fn issuer_settings(&self) -> IssuerSettings {
        IssuerSettings {
            token_lifetime: self.token_lifetime,
            registered_scopes: self.scopes.clone(),
        }
    }

    /// Whether tokens survive a restart.
    #[must_use]
    pub const fn has_persistent_key(&self) -> bool {
        self.signing_key_file.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(defaults::PORT)
    }
}

/// Strip trailing slashes so endpoint URLs join cleanly.
#[must_use]
pub fn normalize_issuer(issuer: &str) -> String {
    issuer.trim().trim_end_matches('/').to_owned()
}

/// Parse a space- or comma-separated scope list.
#[must_use]
pub fn parse_scope_list(value: &str) -> BTreeSet<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
