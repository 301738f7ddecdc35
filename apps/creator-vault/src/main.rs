//! # Creator Vault
//!
//! Entry point: parses the command line, sets up logging and dispatches.

use clap::Parser;
use creator_vault::api::{AppState, create_router};
use creator_vault::cli::{
    Cli, Commands, cmd_allow, cmd_award, cmd_init, cmd_mine, cmd_requests, cmd_revoke,
    cmd_status,
};
use creator_vault::config::ServeArgs;
use creator_vault_core::Store;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// How often idle rate-limit buckets are dropped.
const LIMITER_SWEEP: Duration = Duration::from_secs(60);

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Serve(args) => serve(&cli.db, args),
        Commands::Init { force } => cmd_init(&cli.db, force).map_err(Into::into),
        Commands::Status { json } => cmd_status(&cli.db, json).map(drop).map_err(Into::into),
        Commands::Allow { address, note } => {
            cmd_allow(&cli.db, &address, note).map(drop).map_err(Into::into)
        }
        Commands::Revoke { address } => cmd_revoke(&cli.db, &address).map(drop).map_err(Into::into),
        Commands::Requests { status, json } => cmd_requests(&cli.db, status.as_deref(), json)
            .map(drop)
            .map_err(Into::into),
        Commands::Award {
            signup_id,
            source,
            source_id,
        } => cmd_award(&cli.db, signup_id, &source, &source_id)
            .map(drop)
            .map_err(Into::into),
        Commands::Mine(args) => cmd_mine(&args).map(drop).map_err(Into::into),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn serve(db: &Path, args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.to_config()?;
    let store = Store::open(db)?;
    tracing::info!(db = %db.display(), ?config, "Store opened");
    let state = AppState::new(store, config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_server(args.listen, state))
}

async fn run_server(listen: SocketAddr, state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(rpc) = state.rpc.clone() {
        tokio::spawn(async move {
            match rpc.block_number().await {
                Ok(block) => tracing::info!(block, endpoints = rpc.urls().len(), "RPC reachable"),
                Err(e) => tracing::warn!(error = %e, "RPC unreachable at startup"),
            }
        });
    }

    let limiter = state.limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_SWEEP);
        loop {
            interval.tick().await;
            limiter.retain_recent();
        }
    });

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(addr = %listen, "Server listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
