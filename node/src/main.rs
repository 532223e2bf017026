// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Veritas Node
//!
//! Entry point for the `veritas-node` binary. Parses CLI arguments,
//! initializes logging and metrics, starts the session eviction task, and
//! serves the HTTP API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     : start the server
//! - `keygen`  : write a fresh state-signing key
//! - `version` : print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;

use veritas_core::crypto::keys::SigningKeypair;
use veritas_core::engine::MemoryDatabase;
use veritas_core::{SessionManager, StateSigner};

use cli::{Commands, VeritasNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VeritasNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Keygen(args) => keygen(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Merge CLI overrides into the file configuration.
fn resolve_config(args: &cli::RunArgs) -> Result<NodeConfig> {
    let mut config = NodeConfig::load_or_default(args.config.as_deref())?;
    if let Some(port) = args.api_port {
        config.api_port = port;
    }
    if let Some(port) = args.metrics_port {
        config.metrics_port = port;
    }
    if let Some(path) = &args.signing_key {
        config.signing_key_path = Some(path.clone());
    }
    if let Some(name) = &args.database {
        config.database_name = name.clone();
    }
    if let Some(format) = &args.log_format {
        config.log_format = format.clone();
    }
    Ok(config)
}

/// Starts the server: API, metrics endpoint and session eviction.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    logging::init_logging(
        logging::DEFAULT_FILTER,
        LogFormat::from_str_lossy(&config.log_format),
    );

    tracing::info!(
        api_port = config.api_port,
        metrics_port = config.metrics_port,
        database = %config.database_name,
        "starting veritas-node"
    );

    // --- State signer ---
    let signer = match &config.signing_key_path {
        Some(path) => {
            let signer = StateSigner::from_key_file(path)
                .with_context(|| format!("failed to load signing key {}", path.display()))?;
            Some(Arc::new(signer))
        }
        None => {
            tracing::warn!("no signing key configured, served states are unsigned");
            None
        }
    };

    // --- Services ---
    let db = Arc::new(MemoryDatabase::new(config.database_name.clone()));
    let manager = Arc::new(SessionManager::new(config.session.clone()));
    let node_metrics =
        Arc::new(NodeMetrics::new().context("failed to create prometheus registry")?);

    // --- Eviction ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let eviction = {
        let metrics = Arc::clone(&node_metrics);
        let manager_ref = Arc::clone(&manager);
        tokio::spawn(Arc::clone(&manager).run_eviction(shutdown_rx, move |report| {
            metrics
                .sessions_evicted_total
                .inc_by(report.closed.len() as u64);
            metrics.sessions_active.set(manager_ref.count() as i64);
        }))
    };

    let app_state = api::AppState::new(
        env!("CARGO_PKG_VERSION"),
        Arc::clone(&manager),
        db,
        signer,
        Arc::clone(&node_metrics),
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", config.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    // Stop eviction before teardown so the two never race on a session.
    let _ = shutdown_tx.send(true);
    if let Err(e) = eviction.await {
        tracing::error!("eviction task failed: {}", e);
    }

    let closed = manager.close_all();
    node_metrics.sessions_active.set(0);
    tracing::info!(closed, "veritas-node stopped");
    Ok(())
}

/// Writes a new hex-encoded Ed25519 seed and prints its public key.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    logging::init_logging("veritas_node=info", LogFormat::Pretty);

    if args.output.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        );
    }

    let keypair = SigningKeypair::generate();
    write_key_file(&args.output, &keypair.to_hex())?;

    tracing::info!(
        public_key = %keypair.public_key_hex(),
        key_path = %args.output.display(),
        "signing key generated"
    );

    println!("Signing key written.");
    println!("  Key file   : {}", args.output.display());
    println!("  Public key : {}", keypair.public_key_hex());
    Ok(())
}

fn write_key_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write signing key to {}", path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("veritas-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc        {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never completes.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
