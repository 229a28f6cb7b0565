//! herdd — the Herd boss node.
//!
//! Single binary that assembles:
//! - Platform backend (mock or static host roster)
//! - Worker pool (idle queue, scale lifecycle, dispatch)
//! - HTTP API (dispatch, scaling, status)
//!
//! # Usage
//!
//! ```text
//! herdd serve --config /etc/herd/herd.toml --port 8080
//! herdd check --config /etc/herd/herd.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use herd_core::{HerdConfig, PlatformKind};
use herd_pool::WorkerPool;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "herdd", about = "Herd boss node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the boss: warm the pool and serve the API.
    Serve {
        /// Path to herd.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides server.port).
        #[arg(long)]
        port: Option<u16>,

        /// Platform backend (overrides platform.kind).
        #[arg(long)]
        platform: Option<PlatformKind>,

        /// Maximum number of workers (overrides pool.worker_cap).
        #[arg(long)]
        worker_cap: Option<usize>,

        /// Workers to start with (overrides pool.initial_workers).
        #[arg(long)]
        initial_workers: Option<usize>,
    },
    /// Validate a config file and print the effective configuration.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,herdd=debug,herd=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            platform,
            worker_cap,
            initial_workers,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(kind) = platform {
                config.platform.kind = kind;
            }
            if let Some(cap) = worker_cap {
                config.pool.worker_cap = cap;
            }
            if let Some(n) = initial_workers {
                config.pool.initial_workers = n;
            }
            config.validate()?;
            run_serve(config).await
        }
        Command::Check { config } => {
            let config = load_config(Some(&config))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HerdConfig> {
    match path {
        Some(path) => HerdConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(HerdConfig::default()),
    }
}

async fn run_serve(config: HerdConfig) -> anyhow::Result<()> {
    info!("herd boss starting");

    // ── Worker pool ────────────────────────────────────────────

    let pool = WorkerPool::from_config(&config);
    info!(
        platform = pool.platform_name(),
        capacity = pool.capacity(),
        "worker pool initialized"
    );

    if config.pool.initial_workers > 0 {
        pool.warm_up(config.pool.initial_workers).await?;
    }

    // ── API server ─────────────────────────────────────────────

    let router = herd_api::build_router(pool.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    let shutdown_pool = pool.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            // Closing first fails requests still waiting for a worker,
            // so the server can finish draining.
            let destroyed = shutdown_pool.close().await;
            info!(destroyed, "worker pool closed");
        })
        .await?;

    // Anything scaled up while shutting down.
    pool.close().await;

    info!("herd boss stopped");
    Ok(())
}
