//! Command-line interface

use clap::{Parser, Subcommand};
use lettre::message::Mailbox;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth;
use crate::client::{GmailClient, ProductionGmailClient};
use crate::composer;
use crate::config::Config;
use crate::error::{GmailError, Result};
use crate::orchestrator::{CycleReport, Orchestrator};
use crate::scheduler::Scheduler;
use crate::state::ServiceState;

#[derive(Parser, Debug)]
#[command(name = "gmail-autoreply")]
#[command(version = "0.1.0")]
#[command(about = "Replies to unread Gmail messages while you are away", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-autoreply/token.json")]
    pub token_cache: PathBuf,

    /// Path to the status snapshot written after each cycle
    #[arg(long, default_value = ".gmail-autoreply/state.json")]
    pub state_file: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Reply to unread inbox messages on a randomized schedule
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Show the status snapshot of the last run
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the OAuth flow (reusing a cached token unless `force`) and return the
/// address of the connected account
pub async fn authenticate(cli: &Cli, force: bool) -> Result<String> {
    if force && cli.token_cache.exists() {
        tokio::fs::remove_file(&cli.token_cache).await?;
        info!("Removed existing token cache");
    }

    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    ProductionGmailClient::new(hub).account_address().await
}

/// The single client shared by every component for the lifetime of the
/// process, and the account replies are sent from
async fn connect(cli: &Cli) -> Result<(Arc<dyn GmailClient>, Mailbox)> {
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    let client: Arc<dyn GmailClient> = Arc::new(ProductionGmailClient::new(hub));
    let sender = composer::account_mailbox(client.as_ref()).await?;
    info!("Replying as {}", sender);
    Ok((client, sender))
}

/// Run exactly one cycle and record it in the status snapshot
pub async fn run_once(cli: &Cli) -> Result<CycleReport> {
    let config = Config::load(&cli.config).await?;
    let (client, sender) = connect(cli).await?;

    let mut orchestrator = Orchestrator::from_config(client, &config, sender);
    let report = orchestrator.run_cycle().await;
    record_cycle(&cli.state_file, &report).await;

    Ok(report)
}

/// Fold one cycle into the snapshot at `path` without resetting its totals
async fn record_cycle(path: &Path, report: &CycleReport) {
    let mut state = ServiceState::resume(path).await;
    state.record_cycle(report);
    if let Err(e) = state.save(path).await {
        warn!("Failed to write status snapshot to {:?}: {}", path, e);
    }
}

/// Run the scheduler until Ctrl-C or SIGTERM
pub async fn run_service(cli: &Cli) -> Result<ServiceState> {
    let config = Config::load(&cli.config).await?;
    let (client, sender) = connect(cli).await?;

    let orchestrator = Orchestrator::from_config(client, &config, sender);
    let scheduler =
        Scheduler::new(orchestrator, &config.schedule).with_state_file(cli.state_file.clone());
    let (task, shutdown) = scheduler.spawn();

    info!("Auto-reply service running, press Ctrl-C to stop");
    wait_for_shutdown_signal().await;
    info!("Shutdown requested, finishing the current cycle");
    shutdown.shutdown();

    task.await
        .map_err(|e| GmailError::Unknown(format!("Scheduler task failed: {}", e)))
}

pub async fn show_status(state_file: &Path) -> Result<Option<String>> {
    Ok(ServiceState::load(state_file)
        .await?
        .map(|state| state.summary()))
}

pub async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(GmailError::ConfigError(format!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            output
        )));
    }

    Config::create_example(output).await
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = wait_for_ctrl_c() => {}
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
