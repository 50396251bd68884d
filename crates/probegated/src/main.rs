//! probegated — the probegate synthetic monitoring daemon.
//!
//! Assembles the probe mutex, the per-target monitor loops, and the
//! status API into one process.
//!
//! # Usage
//!
//! ```text
//! probegated run --config probegated.toml
//! probegated check --config probegated.toml
//! probegated key https://example.com/health
//! probegated init --url http://127.0.0.1:8080/healthz > probegated.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use probegate_mutex::{ProbeMutex, ProbeTarget};
use probegate_runner::{HttpProber, ProbeRunner, StatusState, SyntheticMonitor, build_router};

mod config;

use config::ProbedConfig;

#[derive(Parser)]
#[command(
    name = "probegated",
    about = "probegate — de-duplicated synthetic health probes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe every configured target on its interval and serve status.
    Run {
        /// Path to the config file.
        #[arg(short, long, default_value = "probegated.toml")]
        config: PathBuf,

        /// Override [server].listen.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Run a single probe round over every target and print JSON reports.
    Check {
        #[arg(short, long, default_value = "probegated.toml")]
        config: PathBuf,
    },
    /// Print the normalized URL and target key for a probe URL.
    Key { url: String },
    /// Print a starter config file.
    Init {
        #[arg(long, default_value = "http://127.0.0.1:8080/healthz")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,probegate=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, listen } => run(config, listen).await,
        Command::Check { config } => check(config).await,
        Command::Key { url } => key(&url),
        Command::Init { url } => {
            print!("{}", ProbedConfig::scaffold(&url).to_toml_string()?);
            Ok(())
        }
    }
}

async fn run(config_path: PathBuf, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let settings = ProbedConfig::from_file(&config_path)?.resolve()?;
    info!(path = ?config_path, targets = settings.targets.len(), "probegated starting");

    // ── Initialize subsystems ──────────────────────────────────

    let mutex = Arc::new(ProbeMutex::new(settings.mutex)?);
    let prober = HttpProber::new(settings.runner.timeout());
    let runner = Arc::new(ProbeRunner::new(mutex.clone(), prober, settings.runner));
    let monitor = SyntheticMonitor::new(runner);

    for target in settings.targets {
        monitor.start_target(target).await;
    }

    // ── Start status server ────────────────────────────────────

    let router = build_router(StatusState {
        mutex,
        board: monitor.board().clone(),
    });
    let addr = listen.unwrap_or(settings.listen);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    monitor.stop_all().await;
    info!("probegated stopped");
    Ok(())
}

async fn check(config_path: PathBuf) -> anyhow::Result<()> {
    let settings = ProbedConfig::from_file(&config_path)?.resolve()?;
    let mutex = Arc::new(ProbeMutex::new(settings.mutex)?);
    let prober = HttpProber::new(settings.runner.timeout());
    let runner = Arc::new(ProbeRunner::new(mutex, prober, settings.runner));

    let reports = runner.run_round(&settings.targets).await;
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn key(url: &str) -> anyhow::Result<()> {
    let target = ProbeTarget::parse(url)?;
    println!("{}  {}", target.key(), target.url());
    Ok(())
}
