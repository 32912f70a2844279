//! One auto-reply cycle: resolve label, scan, then reply and relabel each candidate

use chrono::{DateTime, Utc};
use lettre::message::Mailbox;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::GmailClient;
use crate::composer::{ReplyComposer, ReplyOutcome};
use crate::config::Config;
use crate::error::ProcessingError;
use crate::label_registry::LabelRegistry;
use crate::models::{LabelId, MessageRef};
use crate::scanner::UnreadScanner;
use crate::transition::StateTransitionApplier;

/// Phases a cycle moves through. Between cycles the orchestrator is idle.
///
/// `Replying` is skipped when the scan finds nothing; an aborted cycle stops
/// wherever it failed and never reaches `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Scanning,
    Replying,
    Done,
}

/// Pipeline step at which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Label,
    Scan,
    Metadata,
    Header,
    Compose,
    Send,
    Transition,
}

impl From<&ProcessingError> for FailureStage {
    fn from(error: &ProcessingError) -> Self {
        match error {
            ProcessingError::HeaderMissing { .. } => FailureStage::Header,
            ProcessingError::MetadataFailure { .. } => FailureStage::Metadata,
            ProcessingError::InvalidReply { .. } => FailureStage::Compose,
            ProcessingError::SendFailure { .. } => FailureStage::Send,
            ProcessingError::TransitionFailure { .. } => FailureStage::Transition,
            ProcessingError::ScanFailure(_) => FailureStage::Scan,
            ProcessingError::LabelFailure { .. } => FailureStage::Label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFailure {
    pub message_id: String,
    pub stage: FailureStage,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleAbort {
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of a single cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Phases entered, in order
    #[serde(default)]
    pub phases: Vec<CyclePhase>,
    pub candidates: usize,
    /// Messages a reply was sent for
    pub replied: Vec<String>,
    /// Automated senders that were not replied to
    pub skipped: Vec<String>,
    /// Messages labeled and removed from the inbox
    pub handled: Vec<String>,
    pub failures: Vec<MessageFailure>,
    pub aborted: Option<CycleAbort>,
    /// Delay chosen before the next cycle, filled in by the scheduler
    pub next_delay_secs: Option<u64>,
}

impl CycleReport {
    fn start() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            phases: Vec::new(),
            candidates: 0,
            replied: Vec::new(),
            skipped: Vec::new(),
            handled: Vec::new(),
            failures: Vec::new(),
            aborted: None,
            next_delay_secs: None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Furthest phase the cycle got to, `None` if it failed before scanning
    pub fn last_phase(&self) -> Option<CyclePhase> {
        self.phases.last().copied()
    }

    fn enter(&mut self, phase: CyclePhase) {
        self.phases.push(phase);
    }

    fn abort(&mut self, error: &ProcessingError) {
        self.aborted = Some(CycleAbort {
            stage: FailureStage::from(error),
            error: error.to_string(),
        });
    }

    fn record_failure(&mut self, message: &MessageRef, error: &ProcessingError) {
        self.failures.push(MessageFailure {
            message_id: message.id.clone(),
            stage: FailureStage::from(error),
            error: error.to_string(),
        });
    }
}

/// Runs cycles against the mailbox and owns the cached handled-label id.
///
/// Messages are processed strictly one at a time in listing order: a
/// message is replied to and relabeled before the next one is touched.
pub struct Orchestrator {
    labels: LabelRegistry,
    scanner: UnreadScanner,
    composer: ReplyComposer,
    transition: StateTransitionApplier,
    label_id: Option<LabelId>,
}

impl Orchestrator {
    pub fn new(
        labels: LabelRegistry,
        scanner: UnreadScanner,
        composer: ReplyComposer,
        transition: StateTransitionApplier,
    ) -> Self {
        Self {
            labels,
            scanner,
            composer,
            transition,
            label_id: None,
        }
    }

    /// Wire every component to the same client; replies are sent as `sender`
    pub fn from_config(client: Arc<dyn GmailClient>, config: &Config, sender: Mailbox) -> Self {
        let labels = LabelRegistry::new(
            Arc::clone(&client),
            config.label.name.clone(),
            config.label.visibility(),
        );
        let scanner = UnreadScanner::new(Arc::clone(&client), config.scan.to_query());
        let composer = ReplyComposer::new(Arc::clone(&client), sender, config.reply.body.clone())
            .with_automated_sender_guard(config.reply.skip_automated_senders);
        let transition = StateTransitionApplier::new(client);

        Self::new(labels, scanner, composer, transition)
    }

    pub fn cached_label_id(&self) -> Option<&LabelId> {
        self.label_id.as_ref()
    }

    /// Run one full cycle. Never fails: cycle-level errors are recorded as
    /// an abort in the report, per-message errors as failures.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::start();
        info!(cycle_id = %report.cycle_id, "Cycle started");

        if let Err(e) = self.process(&mut report).await {
            warn!(cycle_id = %report.cycle_id, error = %e, "Cycle aborted");
            report.abort(&e);
        } else {
            report.enter(CyclePhase::Done);
        }

        report.finished_at = Some(Utc::now());
        info!(
            cycle_id = %report.cycle_id,
            candidates = report.candidates,
            replied = report.replied.len(),
            handled = report.handled.len(),
            failures = report.failures.len(),
            "Cycle finished"
        );

        report
    }

    async fn process(&mut self, report: &mut CycleReport) -> Result<(), ProcessingError> {
        let label_id = self.handled_label().await?;

        report.enter(CyclePhase::Scanning);
        let candidates = self.scanner.list_candidates().await?;
        report.candidates = candidates.len();

        if candidates.is_empty() {
            return Ok(());
        }

        report.enter(CyclePhase::Replying);
        for message in &candidates {
            if let Err(e) = self.process_message(message, &label_id, report).await {
                warn!(
                    cycle_id = %report.cycle_id,
                    message_id = %message.id,
                    error = %e,
                    "Message left in inbox for the next cycle"
                );
                report.record_failure(message, &e);
            }
        }

        Ok(())
    }

    async fn process_message(
        &self,
        message: &MessageRef,
        label_id: &LabelId,
        report: &mut CycleReport,
    ) -> Result<(), ProcessingError> {
        match self.composer.compose_and_send(message).await? {
            ReplyOutcome::Sent { .. } => report.replied.push(message.id.clone()),
            ReplyOutcome::SkippedAutomated { .. } => report.skipped.push(message.id.clone()),
        }

        self.transition.mark_handled(message, label_id).await?;
        info!(message_id = %message.id, label_id = %label_id, "Message handled");
        report.handled.push(message.id.clone());
        Ok(())
    }

    /// Cached after the first successful resolution
    async fn handled_label(&mut self) -> Result<LabelId, ProcessingError> {
        if let Some(id) = &self.label_id {
            return Ok(id.clone());
        }

        let id = self.labels.ensure_handled_label().await?;
        self.label_id = Some(id.clone());
        Ok(id)
    }
}
