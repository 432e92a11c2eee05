//! Tollgate - Entry Point
//!
//! Loads configuration, builds the signing key and client registry, ensures
//! the bootstrap client exists, then serves HTTP.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tollgate::bootstrap::{self, BootstrapOutcome};
use tollgate::config::{Config, normalize_issuer, parse_scope_list};
use tollgate::registry::{ClientStore, FileClientStore, MemoryClientStore};
use tollgate::{AuthServer, KeyManager};

#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(about = "OAuth 2.0 client-credentials authorization server")]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Issuer URL stamped into tokens
    #[arg(long, env = "TOLLGATE_ISSUER")]
    issuer: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "TOLLGATE_TOKEN_LIFETIME")]
    token_lifetime: Option<u64>,

    /// Registered scopes, space or comma separated
    #[arg(long, env = "TOLLGATE_SCOPES")]
    scopes: Option<String>,

    /// Bootstrap client id
    #[arg(long, env = "TOLLGATE_BOOTSTRAP_CLIENT_ID")]
    bootstrap_client_id: Option<String>,

    /// Bootstrap client secret
    #[arg(long, env = "TOLLGATE_BOOTSTRAP_CLIENT_SECRET", hide_env_values = true)]
    bootstrap_client_secret: Option<String>,

    /// Bootstrap client display name
    #[arg(long, env = "TOLLGATE_BOOTSTRAP_DISPLAY_NAME")]
    bootstrap_display_name: Option<String>,

    /// Bootstrap client scopes
    #[arg(long, env = "TOLLGATE_BOOTSTRAP_SCOPES")]
    bootstrap_scopes: Option<String>,

    /// Persist the client registry to this JSON file
    #[arg(long, env = "TOLLGATE_CLIENTS_FILE")]
    clients_file: Option<PathBuf>,

    /// Persist the signing key seed to this file
    #[arg(long, env = "TOLLGATE_SIGNING_KEY_FILE")]
    signing_key_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Layer command-line flags over environment configuration.
    fn apply(self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(issuer) = self.issuer {
            config.issuer = normalize_issuer(&issuer);
        }
        if let Some(secs) = self.token_lifetime {
            config.token_lifetime = Duration::from_secs(secs);
        }
        if let Some(scopes) = self.scopes {
            config.scopes = parse_scope_list(&scopes);
        }
        if let Some(id) = self.bootstrap_client_id {
            config.bootstrap.client_id = id;
        }
        if let Some(secret) = self.bootstrap_client_secret {
            config.bootstrap.client_secret = secret;
        }
        if let Some(name) = self.bootstrap_display_name {
            config.bootstrap.display_name = name;
        }
        if let Some(scopes) = self.bootstrap_scopes {
            config.bootstrap.scopes = parse_scope_list(&scopes);
        }
        if self.clients_file.is_some() {
            config.clients_file = self.clients_file;
        }
        if self.signing_key_file.is_some() {
            config.signing_key_file = self.signing_key_file;
        }
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ClientStore>> {
    let store: Arc<dyn ClientStore> = match &config.clients_file {
        Some(path) => Arc::new(FileClientStore::open(path.clone()).await?),
        None => Arc::new(MemoryClientStore::new()),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = Config::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        issuer = %config.issuer,
        token_lifetime_secs = config.token_lifetime.as_secs(),
        "Starting Tollgate"
    );

    let keys = match &config.signing_key_file {
        Some(path) => KeyManager::load_or_generate(path, &config.issuer)?,
        None => {
            tracing::warn!("No signing key file configured; tokens will not survive a restart");
            KeyManager::generate(&config.issuer)?
        }
    };
    tracing::info!(kid = %keys.kid(), "Signing key ready");

    let store = open_store(&config).await?;

    let outcome = bootstrap::ensure_client(store.as_ref(), &config.bootstrap).await;
    if let BootstrapOutcome::Deferred(reason) = outcome {
        tracing::warn!(%reason, "Starting without bootstrap client");
    }

    AuthServer::new(&config, store, Arc::new(keys)).run_http(config.port).await
}
