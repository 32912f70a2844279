use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::orchestrator::CycleReport;

/// Service status written after every cycle.
///
/// Observability only: the mailbox is the sole processing state, nothing in
/// here is consulted when deciding which messages to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceState {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub replies_sent: u64,
    pub messages_handled: u64,
    pub failures: u64,
    pub last_cycle: Option<CycleReport>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceState {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            updated_at: Utc::now(),
            cycles_completed: 0,
            cycles_aborted: 0,
            replies_sent: 0,
            messages_handled: 0,
            failures: 0,
            last_cycle: None,
        }
    }

    /// Fold a finished cycle into the running totals
    pub fn record_cycle(&mut self, report: &CycleReport) {
        self.cycles_completed += 1;
        if report.is_aborted() {
            self.cycles_aborted += 1;
        }
        self.replies_sent += report.replied.len() as u64;
        self.messages_handled += report.handled.len() as u64;
        self.failures += report.failures.len() as u64;
        self.updated_at = Utc::now();
        self.last_cycle = Some(report.clone());
    }

    /// Save state to disk
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        tracing::debug!("Saved service state to {:?}", path);
        Ok(())
    }

    /// Load the last snapshot, `None` if the service never completed a cycle
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(path).await?;
        let state: Self = serde_json::from_str(&json)?;
        Ok(Some(state))
    }

    /// Continue from the snapshot at `path`, or start fresh if there is none
    /// or it cannot be read
    pub async fn resume(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(Some(state)) => state,
            Ok(None) => Self::new(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable status snapshot {:?}: {}", path, e);
                Self::new()
            }
        }
    }

    /// Human-readable summary for the `status` command
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Run ID:           {}", self.run_id),
            format!("Started:          {}", self.started_at.to_rfc3339()),
            format!("Last update:      {}", self.updated_at.to_rfc3339()),
            format!(
                "Cycles:           {} ({} aborted)",
                self.cycles_completed, self.cycles_aborted
            ),
            format!("Replies sent:     {}", self.replies_sent),
            format!("Messages handled: {}", self.messages_handled),
            format!("Failures:         {}", self.failures),
        ];

        if let Some(cycle) = &self.last_cycle {
            lines.push(String::new());
            lines.push(format!("Last cycle {}:", cycle.cycle_id));
            lines.push(format!(
                "  candidates={} replied={} skipped={} handled={} failures={}",
                cycle.candidates,
                cycle.replied.len(),
                cycle.skipped.len(),
                cycle.handled.len(),
                cycle.failures.len()
            ));
            for failure in &cycle.failures {
                lines.push(format!(
                    "  {} failed at {:?}: {}",
                    failure.message_id, failure.stage, failure.error
                ));
            }
            if let Some(abort) = &cycle.aborted {
                lines.push(format!("  aborted at {:?}: {}", abort.stage, abort.error));
            }
            if let Some(delay) = cycle.next_delay_secs {
                lines.push(format!("  next cycle after {}s", delay));
            }
        }

        lines.join("\n")
    }
}
