//! Listener setup, startup checks and graceful shutdown

use crate::{routes, state::AppState};
use anyhow::{Context, Result};
use std::fmt;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Where the clinic server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Signal that ended the serve loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
        }
    }
}

pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until SIGINT or SIGTERM
    ///
    /// The route table is checked against the path policy before the
    /// listener opens; findings are logged, not fatal.
    pub async fn run(self) -> Result<()> {
        let addr = self.config.bind_addr();

        let findings = routes::log_coverage(&self.state);
        if !findings.is_empty() {
            warn!(
                findings = findings.len(),
                "starting with route coverage findings"
            );
        }

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind clinic server to {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            store = self.state.store.backend_name(),
            version = %self.state.version,
            "clinic server listening"
        );

        let app = routes::create_router(self.state.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let reason = shutdown_signal().await;
                info!(signal = %reason, "draining connections");
            })
            .await
            .context("clinic server stopped with an error")?;

        info!(
            uptime_seconds = self.state.uptime_seconds(),
            "clinic server stopped"
        );
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Resolve on the first shutdown signal
///
/// A handler that cannot be installed is logged and that signal is ignored.
async fn shutdown_signal() -> ShutdownReason {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => ShutdownReason::Interrupt,
        _ = terminate => ShutdownReason::Terminate,
    }
}

/// Builder for [`Server`]
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    state: Option<AppState>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    /// Fails when no state was supplied
    pub fn build(self) -> Result<Server> {
        let state = self.state.context("clinic server needs application state")?;
        Ok(Server::new(self.config, state))
    }
}
