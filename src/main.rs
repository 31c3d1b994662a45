use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use weft::app;
use weft::commands;
use weft::config;
use weft::server;

#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(about = "A modular application gateway", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (TOML/JSON/YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Write daily-rolling log files into this directory
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the gateway (default)
    Run,
    /// Validate configuration and print the assembled pipeline
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("weft={log_level}").parse()?);

    // The guard must outlive main so buffered log lines reach the file.
    let _guard = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "weft.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    };

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            config::load_from_path(path).await
        }
        None => {
            info!("Loading configuration from default locations");
            config::load_from_env_or_file().await
        }
    }
    .context("failed to load configuration")?;

    match args.command.unwrap_or(Command::Run) {
        Command::Check => commands::run_config_check(config).await?,
        Command::Run => {
            let app = app::assemble(config)
                .await
                .context("failed to assemble application")?;

            let shutdown_tx = app.state.shutdown_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = signal::ctrl_c().await {
                    error!("failed to listen for shutdown signal: {}", e);
                    return;
                }
                info!("shutdown signal received");
                let _ = shutdown_tx.send(());
            });

            server::start(app.state.clone()).await?;
            app.manager.shutdown().await;
        }
    }

    Ok(())
}
