//! Clinic API server
//!
//! # Usage
//!
//! ```bash
//! # Start with default settings (0.0.0.0:8000)
//! clinic-server
//!
//! # Custom policy table and demo accounts
//! clinic-server --policy-file policy.json --seed-demo
//!
//! # Debug logging for the gate only
//! RUST_LOG=clinic_rbac=debug clinic-server
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Logging level or filter
//! - `CLINIC_HOST`, `CLINIC_PORT`: bind address
//! - `CLINIC_POLICY_FILE`: JSON path policy; the built-in table when unset
//! - `CLINIC_JSON_LOGS`: JSON log output
//! - `CLINIC_SEED_DEMO`: seed demo accounts on startup

use anyhow::{Context, Result};
use api_server::{seed, server::ServerBuilder, state::AppState, store::InMemoryStore};
use clap::Parser;
use clinic_rbac::PathPolicy;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Clinic API server
#[derive(Parser, Debug)]
#[command(
    name = "clinic-server",
    version,
    about = "Clinical records service with role-based access control",
    long_about = None
)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "CLINIC_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value = "8000", env = "CLINIC_PORT")]
    port: u16,

    /// JSON file with the path policy table
    #[arg(long, env = "CLINIC_POLICY_FILE")]
    policy_file: Option<PathBuf>,

    /// Enable JSON logging format
    #[arg(long, env = "CLINIC_JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Seed demo accounts and records
    #[arg(long, env = "CLINIC_SEED_DEMO")]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args)?;

    info!("Starting clinic server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let policy = load_policy(&args)?;
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::new(policy, store).context("failed to initialize application state")?;

    if args.seed_demo {
        seed::seed_demo(state.store.as_ref()).await?;
    }

    let server = ServerBuilder::new()
        .host(&args.host)
        .port(args.port)
        .state(state)
        .build()?;

    info!("Press Ctrl+C to shutdown gracefully");

    if let Err(e) = server.run().await {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn load_policy(args: &Args) -> Result<PathPolicy> {
    match &args.policy_file {
        Some(path) => {
            let policy = PathPolicy::from_json_file(path)
                .with_context(|| format!("failed to load policy from {}", path.display()))?;
            info!(path = %path.display(), "path policy loaded");
            Ok(policy)
        }
        None => {
            info!("using built-in path policy");
            Ok(PathPolicy::default())
        }
    }
}

/// Initialize tracing/logging subsystem
fn init_tracing(args: &Args) -> Result<()> {
    let log_level = args.log_level.parse::<tracing::Level>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        tracing::Level::INFO
    });
    let http_level = if log_level <= tracing::Level::DEBUG {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "api_server={},clinic_rbac={},tower_http={},axum={}",
            log_level, log_level, http_level, http_level
        )
        .into()
    });

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("failed to install JSON subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .context("failed to install subscriber")?;
    }

    Ok(())
}
