//! Bridge server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use super::BridgeCore;
use super::handler::create_router;
use crate::config::Config;
use crate::store::spawn_sweeper;
use crate::{Error, Result};

/// OAuth bridge server
pub struct Bridge {
    /// Configuration
    config: Config,
    /// Shared core
    core: Arc<BridgeCore>,
}

impl Bridge {
    /// Create a bridge with HTTP adapters for every enabled provider.
    pub fn new(config: Config) -> Result<Self> {
        let core = Arc::new(BridgeCore::from_config(&config)?);
        Ok(Self { config, core })
    }

    /// Run the bridge until Ctrl+C or SIGTERM.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

        let sweeper = spawn_sweeper(
            self.core.sweepables(),
            self.config.relay.sweep_interval,
            shutdown_tx.subscribe(),
        );

        let app = create_router(Arc::clone(&self.core));
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("OAUTH BRIDGE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(issuer = %self.core.issuer(), "Issuer");

        let providers = self.core.providers().keys();
        if providers.is_empty() {
            warn!("No providers enabled - every authorization will stall at the connection UI");
        } else {
            for key in &providers {
                info!(provider = %key, "Provider enabled");
            }
        }
        if self.config.tokens.test_mode {
            warn!(
                ttl = ?self.config.tokens.test_access_ttl,
                "TEST MODE: access tokens are short-lived"
            );
        }
        info!(
            code_ttl = ?self.config.relay.code_ttl,
            sweep_interval = ?self.config.relay.sweep_interval,
            session_ttl = ?self.config.sessions.ttl,
            "Stores ready"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        if let Err(e) = sweeper.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
        info!("Bridge stopped");

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
