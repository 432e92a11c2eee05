//! Startup registration of the well-known client.
//!
//! Runs once per process before the listener accepts traffic. Relies on
//! [`ClientStore::create_if_absent`] being idempotent, so restarts and
//! concurrently starting instances converge on a single record. A registry
//! that cannot be reached is logged and skipped; the next start tries again.

use std::collections::BTreeSet;
use std::fmt;

use crate::config::defaults;
use crate::error::{ConfigError, RegistryResult};
use crate::registry::{ClientRecord, ClientStore, CreateOutcome};

/// The client ensured at startup.
#[derive(Clone)]
pub struct BootstrapClient {
    pub client_id: String,
    pub client_secret: String,
    pub display_name: String,
    pub scopes: BTreeSet<String>,
}

impl BootstrapClient {
    /// Build the registry record, hashing the secret.
    pub fn to_record(&self) -> RegistryResult<ClientRecord> {
        ClientRecord::new(
            self.client_id.clone(),
            &self.client_secret,
            self.display_name.clone(),
            self.scopes.iter().cloned(),
        )
    }

    pub(crate) fn validate(&self, registered_scopes: &BTreeSet<String>) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::InvalidBootstrapClient(
                "client id must not be empty".to_owned(),
            ));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::InvalidBootstrapClient(
                "client secret must not be empty".to_owned(),
            ));
        }
        if let Some(extra) = self.scopes.difference(registered_scopes).next() {
            return Err(ConfigError::InvalidBootstrapClient(format!(
                "scope '{extra}' is not a registered scope"
            )));
        }
        Ok(())
    }
}

impl Default for BootstrapClient {
    fn default() -> Self {
        Self {
            client_id: defaults::BOOTSTRAP_CLIENT_ID.to_owned(),
            client_secret: defaults::BOOTSTRAP_CLIENT_SECRET.to_owned(),
            display_name: defaults::BOOTSTRAP_DISPLAY_NAME.to_owned(),
            scopes: defaults::SCOPES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

impl fmt::Debug for BootstrapClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// What happened during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    AlreadyPresent,
    /// Registry unreachable; retried on the next process start.
    Deferred(String),
}

/// Make sure `client` is registered. Never fails startup.
pub async fn ensure_client(store: &dyn ClientStore, client: &BootstrapClient) -> BootstrapOutcome {
    let record = match client.to_record() {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(
                client_id = %client.client_id,
                error = %e,
                "Bootstrap client is invalid, skipping"
            );
            return BootstrapOutcome::Deferred(e.to_string());
        }
    };

    match store.create_if_absent(record).await {
        Ok(CreateOutcome::Created) => {
            tracing::info!(client_id = %client.client_id, "Registered bootstrap client");
            BootstrapOutcome::Created
        }
        Ok(CreateOutcome::AlreadyExists) => {
            tracing::info!(client_id = %client.client_id, "Bootstrap client already registered");
            BootstrapOutcome::AlreadyPresent
        }
        Err(e) => {
            tracing::warn!(
                client_id = %client.client_id,
                error = %e,
                "Client registry unavailable, bootstrap deferred to next start"
            );
            BootstrapOutcome::Deferred(e.to_string())
        }
    }
}
