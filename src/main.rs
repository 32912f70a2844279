use anyhow::Result;
use clap::Parser;
use gmail_autoreply::cli::{self, Cli, Commands};
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Exit with proper code on error
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        eprintln!("\nFor help, run: gmail-autoreply --help");
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoreply=debug,warn"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_autoreply=info,warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run() -> Result<()> {
    // Multiple dependencies pull in different rustls crypto backends, pick one explicitly
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    init_tracing(&cli);

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            let address = cli::authenticate(&cli, *force).await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);
            println!("Connected to account: {}", address);
            Ok(())
        }

        Commands::Run { once: true } => {
            let report = cli::run_once(&cli).await?;

            println!("\n========================================");
            println!("Cycle {}", report.cycle_id);
            println!("========================================");
            println!("Candidates: {}", report.candidates);
            println!("Replies sent: {}", report.replied.len());
            println!("Skipped (automated): {}", report.skipped.len());
            println!("Messages handled: {}", report.handled.len());
            for failure in &report.failures {
                println!(
                    "Failed: {} at {:?}: {}",
                    failure.message_id, failure.stage, failure.error
                );
            }
            println!("========================================");

            if let Some(abort) = report.aborted {
                anyhow::bail!("Cycle aborted at {:?}: {}", abort.stage, abort.error);
            }
            Ok(())
        }

        Commands::Run { once: false } => {
            let state = cli::run_service(&cli).await?;
            println!(
                "Stopped after {} cycles: {} replies sent, {} messages handled, {} failures",
                state.cycles_completed, state.replies_sent, state.messages_handled, state.failures
            );
            Ok(())
        }

        Commands::Status => {
            match cli::show_status(&cli.state_file).await? {
                Some(summary) => println!("{}", summary),
                None => {
                    println!("No previous runs found.");
                    println!("State file: {:?}", cli.state_file);
                }
            }
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            cli::init_config(output, *force).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - label.name: Label applied to answered messages");
            println!("  - reply.body: Text of the automatic reply");
            println!("  - schedule.min_delay_secs / max_delay_secs: Pause between cycles");
            Ok(())
        }
    }
}
