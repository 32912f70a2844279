//! Gmail Auto-Reply Service
//!
//! Replies once to every unread message in a Gmail inbox while the owner is
//! away, then files the message under a dedicated label and out of the inbox
//! so it is never answered twice.
//!
//! # Overview
//!
//! - **Authentication**: OAuth2 installed-app flow with token caching
//! - **Label Registry**: Finds or creates the "handled" label
//! - **Scanning**: Lists unread inbox messages
//! - **Replying**: Builds a threaded plain-text reply and sends it once
//! - **Relabeling**: Adds the handled label and removes `INBOX` in one request
//! - **Scheduling**: Repeats cycles with a randomized delay and clean shutdown
//!
//! The mailbox is the only processing state: a message is a candidate exactly
//! while it is unread and in the inbox.
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_autoreply::{auth, client::ProductionGmailClient, composer, config::Config};
//! use gmail_autoreply::{GmailClient, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-autoreply/token.json".as_ref()
//!     ).await?;
//!     let client: Arc<dyn GmailClient> = Arc::new(ProductionGmailClient::new(hub));
//!
//!     let sender = composer::account_mailbox(client.as_ref()).await?;
//!
//!     let mut orchestrator = Orchestrator::from_config(client, &config, sender);
//!     let report = orchestrator.run_cycle().await;
//!     println!("Replied to {} messages", report.replied.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Gmail API client trait and production implementation
//! - [`cli`] - Command-line interface
//! - [`composer`] - Reply composition and sending
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`label_registry`] - Handled-label resolution
//! - [`models`] - Core data structures
//! - [`orchestrator`] - A single scan/reply/relabel cycle
//! - [`scanner`] - Unread message discovery
//! - [`scheduler`] - Repeating cycles with randomized delays
//! - [`state`] - Status snapshot
//! - [`transition`] - Moving handled messages out of the inbox

pub mod auth;
pub mod cli;
pub mod client;
pub mod composer;
pub mod config;
pub mod error;
pub mod label_registry;
pub mod models;
pub mod orchestrator;
pub mod scanner;
pub mod scheduler;
pub mod state;
pub mod transition;

// Re-export commonly used types for convenience
pub use error::{GmailError, ProcessingError, Result};

// Core data models
pub use models::{LabelId, LabelInfo, LabelVisibility, MessageHeaders, MessageQuery, MessageRef, ReplyDraft};

// Config types
pub use config::{Config, LabelConfig, ReplyConfig, ScanConfig, ScheduleConfig};

// Client traits
pub use client::{GmailClient, ProductionGmailClient};

// Pipeline components
pub use composer::{ReplyComposer, ReplyOutcome};
pub use label_registry::LabelRegistry;
pub use orchestrator::{CyclePhase, CycleReport, FailureStage, Orchestrator};
pub use scanner::UnreadScanner;
pub use scheduler::{DelayPolicy, Scheduler, ShutdownHandle, Sleeper, TokioSleeper};
pub use transition::StateTransitionApplier;

// State management
pub use state::ServiceState;

// CLI types (for binary usage)
pub use cli::{Cli, Commands};
