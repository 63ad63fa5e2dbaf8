//! relayd — the relaygrid daemon.
//!
//! Single binary that assembles all relaygrid components:
//! - Local transport (memory queue, fs blob store, memory attributes)
//! - Response listener + correlator
//! - Fleet controller + in-process worker slots
//! - Submission API
//!
//! # Usage
//!
//! ```text
//! relayd standalone --config relay.toml --port 8000 --data-dir /var/lib/relaygrid
//! relayd config --config relay.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use relay_core::RelayConfig;
use relayd::Standalone;
use relaygrid_worker::CommandInference;

#[derive(Parser)]
#[command(name = "relayd", about = "relaygrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (API, listener, controller and workers in one process).
    Standalone {
        /// Path to relay.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, default_value = "8000")]
        port: u16,

        /// Data directory for blobs.
        #[arg(long, default_value = "/var/lib/relaygrid")]
        data_dir: PathBuf,
    },

    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RelayConfig> {
    match path {
        Some(path) => RelayConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("load {}: {e:#}", path.display())),
        None => Ok(RelayConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relayd=debug,relaygrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            config,
            port,
            data_dir,
        } => {
            let config = load_config(config.as_deref())?;
            run_standalone(config, port, data_dir).await
        }
        Command::Config { config } => {
            print!("{}", load_config(config.as_deref())?.to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_standalone(config: RelayConfig, port: u16, data_dir: PathBuf) -> anyhow::Result<()> {
    info!("relaygrid daemon starting in standalone mode");

    let inference = CommandInference::from_command_line(&config.worker.inference_command)
        .ok_or_else(|| anyhow::anyhow!("worker.inference_command must name the inference program"))?;
    info!(command = ?config.worker.inference_command, "inference configured");

    let standalone = Standalone::start(&config, &data_dir, Arc::new(inference)).await?;

    // ── Start API server ───────────────────────────────────────

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, standalone.router.clone()).with_graceful_shutdown(async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    });

    server.await?;

    standalone.shutdown().await;

    info!("relaygrid daemon stopped");
    Ok(())
}
