//! Client registry: the single source of truth for authorization decisions.
//!
//! Backends implement [`ClientStore`]. Two ship with the crate:
//! - [`MemoryClientStore`]: process-lifetime map
//! - [`FileClientStore`]: the same map persisted to a JSON file

pub mod file;
pub mod memory;
pub mod secret;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};

pub use file::FileClientStore;
pub use memory::MemoryClientStore;
pub use secret::SecretHash;

/// Grant types a client may be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    ClientCredentials,
}

impl GrantType {
    /// Wire name as sent in `grant_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientCredentials => "client_credentials",
        }
    }

    /// Parse a `grant_type` form value. Unknown values yield `None`.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "client_credentials" => Some(Self::ClientCredentials),
            _ => None,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,
    pub secret_hash: SecretHash,
    pub display_name: String,
    pub allowed_grant_types: BTreeSet<GrantType>,
    pub allowed_scopes: BTreeSet<String>,
}

impl ClientRecord {
    /// Build a client-credentials client, hashing the plaintext secret.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` for an empty id, an empty secret or a scope name
    /// outside the OAuth scope-token grammar.
    pub fn new<I, S>(
        client_id: impl Into<String>,
        client_secret: &str,
        display_name: impl Into<String>,
        scopes: I,
    ) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(RegistryError::invalid_record("client_id must not be empty"));
        }
        if client_secret.is_empty() {
            return Err(RegistryError::invalid_record("client_secret must not be empty"));
        }

        let allowed_scopes: BTreeSet<String> = scopes.into_iter().map(Into::into).collect();
        if let Some(bad) = allowed_scopes.iter().find(|s| !is_valid_scope_token(s)) {
            return Err(RegistryError::invalid_record(format!("invalid scope '{bad}'")));
        }

        Ok(Self {
            client_id,
            secret_hash: SecretHash::new(client_secret),
            display_name: display_name.into(),
            allowed_grant_types: BTreeSet::from([GrantType::ClientCredentials]),
            allowed_scopes,
        })
    }

    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant)
    }

    #[must_use]
    pub fn verify_secret(&self, secret: &str) -> bool {
        self.secret_hash.verify(secret)
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) {
        self.display_name = name.into();
    }
}

/// Result of [`ClientStore::create_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A record with this id was already there; it was left untouched.
    AlreadyExists,
}

/// Storage collaborator for client records.
///
/// Implementations must allow concurrent readers and must make
/// `create_if_absent` an atomic check-and-insert.
#[async_trait::async_trait]
pub trait ClientStore: Send + Sync {
    /// Look up a client by id.
    async fn find_by_id(&self, client_id: &str) -> RegistryResult<Option<ClientRecord>>;

    /// Insert the record unless its id is already registered.
    ///
    /// Idempotent: repeating the call is a no-op returning `AlreadyExists`,
    /// never a duplicate-key error.
    async fn create_if_absent(&self, record: ClientRecord) -> RegistryResult<CreateOutcome>;

    /// Change a client's display name. Returns false if the id is unknown.
    async fn update_display_name(
        &self,
        client_id: &str,
        display_name: &str,
    ) -> RegistryResult<bool>;

    /// Number of registered clients.
    async fn len(&self) -> RegistryResult<usize>;
}

/// RFC 6749 §3.3 scope-token: `1*( %x21 / %x23-5B / %x5D-7E )`.
#[must_use]
pub fn is_valid_scope_token(scope: &str) -> bool {
    !scope.is_empty()
        && scope.bytes().all(|b| matches!(b, 0x21 | 0x23..=0x5B | 0x5D..=0x7E))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_hashes_secret() {
        let record = ClientRecord::new("acme", "s3cr3t", "Acme", ["api"]).unwrap();
        assert!(record.verify_secret("s3cr3t"));
        assert!(!record.verify_secret("wrong"));

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("s3cr3t"));
    }

    #[test]
    fn test_record_defaults_to_client_credentials() {
        let record = ClientRecord::new("acme", "s3cr3t", "Acme", ["api", "read"]).unwrap();
        assert!(record.allows_grant(GrantType::ClientCredentials));
        assert_eq!(record.allowed_scopes.len(), 2);
    }

    #[test]
    fn test_record_validation() {
        assert!(ClientRecord::new("", "s", "x", ["api"]).is_err());
        assert!(ClientRecord::new("  ", "s", "x", ["api"]).is_err());
        assert!(ClientRecord::new("id", "", "x", ["api"]).is_err());
        assert!(ClientRecord::new("id", "s", "x", ["two words"]).is_err());
        assert!(ClientRecord::new("id", "s", "x", Vec::<String>::new()).is_ok());
    }

    #[test]
    fn test_record_serde_roundtrip_keeps_secret_verifiable() {
        let record = ClientRecord::new("acme", "s3cr3t", "Acme", ["api"]).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["allowed_grant_types"][0], "client_credentials");

        let back: ClientRecord = serde_json::from_value(json).unwrap();
        assert!(back.verify_secret("s3cr3t"));
        assert_eq!(back, record);
    }

    #[test]
    fn test_grant_type_wire_names() {
        assert_eq!(GrantType::from_wire("client_credentials"), Some(GrantType::ClientCredentials));
        assert_eq!(GrantType::from_wire("authorization_code"), None);
        assert_eq!(GrantType::ClientCredentials.to_string(), "client_credentials");
    }

    #[test]
    fn test_scope_token_grammar() {
        assert!(is_valid_scope_token("api"));
        assert!(is_valid_scope_token("vault:read"));
        assert!(!is_valid_scope_token(""));
        assert!(!is_valid_scope_token("a b"));
        assert!(!is_valid_scope_token("quote\"d"));
        assert!(!is_valid_scope_token("back\\slash"));
    }
}
