use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use lead_import::view::TerminalRenderer;
use lead_import::{
    Config, HttpInitiator, ImportManager, ImportView, LazyChannelProvider, ManagerOptions,
    SubscriberState,
};

/// Upload lead spreadsheets and follow the import until it finishes.
#[derive(Parser, Debug)]
#[command(name = "lead-import", version)]
struct Cli {
    /// TOML configuration file (defaults to ./lead-import.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Import endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Push channel WebSocket URL
    #[arg(long)]
    channel: Option<String>,

    /// Report the import as stalled after this many seconds without progress
    #[arg(long, value_name = "SECS")]
    stall_timeout: Option<u64>,

    /// Spreadsheet files (.csv, .xlsx, .xls)
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // stderr keeps log lines out of the redrawn progress block
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lead_import=debug")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(endpoint) = cli.endpoint {
        config = config.with_endpoint(endpoint);
    }
    if let Some(channel) = cli.channel {
        config = config.with_channel_url(channel);
    }
    if let Some(secs) = cli.stall_timeout {
        config = config.with_stall_timeout_secs(secs);
    }

    let initiator = HttpInitiator::from_config(&config).context("Invalid import endpoint")?;
    info!(endpoint = %initiator.endpoint(), channel = %config.channel_url, "starting import");
    let provider = LazyChannelProvider::new(config.ws_config());
    let handle = ImportManager::new(
        Arc::new(initiator),
        Arc::new(provider),
        ManagerOptions::from_config(&config),
    );
    let manager = handle.manager.clone();
    let mut job_rx = manager.watch_job();

    let response = match manager.start_import(cli.files).await {
        Ok(response) => response,
        Err(err) => {
            eprintln!("{}", err.user_message());
            handle.shutdown().await?;
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(upload_id = %response.upload_id, "tracking import");

    let mut renderer = TerminalRenderer::new();
    let mut stdout = io::stdout();
    let exit = loop {
        let job = job_rx.borrow_and_update().clone();
        renderer
            .draw(&mut stdout, &ImportView::from_job(&job))
            .context("Failed to draw progress")?;

        if job.state == SubscriberState::Done {
            break ExitCode::SUCCESS;
        }

        tokio::select! {
            changed = job_rx.changed() => {
                if changed.is_err() {
                    warn!("import manager stopped unexpectedly");
                    break ExitCode::FAILURE;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                manager.reset().await?;
                eprintln!("Import dismissed; the server keeps processing it.");
                break ExitCode::FAILURE;
            }
        }
    };

    drop(manager);
    handle.shutdown().await?;
    Ok(exit)
}
