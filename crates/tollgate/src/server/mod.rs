//! HTTP server for the authorization endpoints.

pub mod oauth;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;

use crate::config::Config;
use crate::keys::KeyManager;
use crate::registry::ClientStore;
use transport::HttpState;

/// Tollgate authorization server.
pub struct AuthServer {
    state: HttpState,
}

impl AuthServer {
    /// Create a server over the given registry and signing key.
    #[must_use]
    pub fn new(config: &Config, store: Arc<dyn ClientStore>, keys: Arc<KeyManager>) -> Self {
        Self {
            state: HttpState::new(store, keys, config.issuer_settings()),
        }
    }

    /// The router without binding a socket.
    #[must_use]
    pub fn into_router(self) -> Router {
        transport::create_router(self.state)
    }

    /// Serve HTTP until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns error if the port cannot be bound or the server fails.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        let issuer = self.state.keys.issuer().to_owned();
        let router = self.into_router();
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, %issuer, "HTTP server listening");

        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for AuthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServer")
            .field("state", &self.state)
            .finish()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
