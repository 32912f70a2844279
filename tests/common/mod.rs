//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use gmail_autoreply::client::GmailClient;
use gmail_autoreply::config::Config;
use gmail_autoreply::error::{GmailError, Result};
use gmail_autoreply::models::{
    LabelId, LabelInfo, LabelVisibility, MessageHeaders, MessageQuery, MessageRef, INBOX_LABEL,
};
use gmail_autoreply::orchestrator::Orchestrator;
use gmail_autoreply::scheduler::{ShutdownHandle, Sleeper};
use lettre::message::Mailbox;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Address of the account that owns the fake mailbox
pub const ACCOUNT_ADDRESS: &str = "me@example.com";

/// A message stored in the fake mailbox
#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub id: String,
    pub thread_id: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub labels: BTreeSet<String>,
    pub unread: bool,
}

impl FakeMessage {
    /// Unread message in the inbox
    pub fn unread(id: &str, from: &str, subject: &str) -> Self {
        Self {
            id: id.to_string(),
            thread_id: format!("thread_{}", id),
            from: Some(from.to_string()),
            subject: Some(subject.to_string()),
            labels: [INBOX_LABEL.to_string()].into_iter().collect(),
            unread: true,
        }
    }

    pub fn read(mut self) -> Self {
        self.unread = false;
        self
    }

    pub fn without_from(mut self) -> Self {
        self.from = None;
        self
    }

    pub fn archived(mut self) -> Self {
        self.labels.remove(INBOX_LABEL);
        self
    }
}

/// A reply captured by the fake mailbox
#[derive(Debug, Clone)]
pub struct SentReply {
    pub raw: String,
    pub thread_id: Option<String>,
}

impl SentReply {
    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}: ", name);
        self.raw
            .split("\r\n\r\n")
            .next()
            .unwrap_or_default()
            .split("\r\n")
            .find_map(|line| line.strip_prefix(&prefix).map(str::to_string))
    }
}

#[derive(Default)]
struct MailboxState {
    labels: Vec<LabelInfo>,
    messages: Vec<FakeMessage>,
    sent: Vec<SentReply>,
    next_label: usize,
    fail_send: HashSet<String>,
    fail_metadata: HashSet<String>,
    fail_modify: HashSet<String>,
    failing_scans: usize,
    failing_label_creates: usize,
    label_creates: usize,
}

/// In-memory Gmail mailbox implementing the client trait.
///
/// Tracks labels, read state and sent replies, supports per-message failure
/// injection and records the highest number of concurrent in-flight calls.
#[derive(Default)]
pub struct FakeMailbox {
    state: Mutex<MailboxState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Option<Duration>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        let mailbox = Self::default();
        mailbox.add_label("INBOX", "INBOX");
        mailbox
    }

    pub fn with_messages(messages: Vec<FakeMessage>) -> Self {
        let mailbox = Self::new();
        for message in messages {
            mailbox.add_message(message);
        }
        mailbox
    }

    /// Every call takes this long (use with a paused tokio clock)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add_message(&self, message: FakeMessage) {
        self.state.lock().unwrap().messages.push(message);
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.state.lock().unwrap().labels.push(LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn message(&self, id: &str) -> Option<FakeMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
    }

    pub fn labels(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn sent(&self) -> Vec<SentReply> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn label_creates(&self) -> usize {
        self.state.lock().unwrap().label_creates
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_inbox(&self, id: &str) -> bool {
        self.message(id)
            .map(|m| m.labels.contains(INBOX_LABEL))
            .unwrap_or(false)
    }

    pub fn fail_send_for(&self, id: &str) {
        self.state.lock().unwrap().fail_send.insert(id.to_string());
    }

    pub fn fail_metadata_for(&self, id: &str) {
        self.state.lock().unwrap().fail_metadata.insert(id.to_string());
    }

    pub fn fail_modify_for(&self, id: &str) {
        self.state.lock().unwrap().fail_modify.insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_send.clear();
        state.fail_metadata.clear();
        state.fail_modify.clear();
    }

    pub fn fail_next_scans(&self, count: usize) {
        self.state.lock().unwrap().failing_scans = count;
    }

    pub fn fail_next_label_creates(&self, count: usize) {
        self.state.lock().unwrap().failing_label_creates = count;
    }

    /// The recipient reads the message, as a user would in the web UI
    pub fn mark_read(&self, id: &str) {
        if let Some(m) = self
            .state
            .lock()
            .unwrap()
            .messages
            .iter_mut()
            .find(|m| m.id == id)
        {
            m.unread = false;
        }
    }

    async fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn list_labels_now(&self) -> Vec<LabelInfo> {
        self.state.lock().unwrap().labels.clone()
    }

    fn create_label_now(&self, name: &str) -> Result<LabelId> {
        let mut state = self.state.lock().unwrap();
        state.label_creates += 1;

        if state.failing_label_creates > 0 {
            state.failing_label_creates -= 1;
            return Err(GmailError::NetworkError("connection reset".to_string()));
        }

        // Gmail compares label names case-insensitively
        if state
            .labels
            .iter()
            .any(|l| l.name.to_lowercase() == name.to_lowercase())
        {
            return Err(GmailError::Conflict(
                "Label name exists or conflicts".to_string(),
            ));
        }

        state.next_label += 1;
        let id = format!("Label_{}", state.next_label);
        state.labels.push(LabelInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    fn list_messages_now(&self, query: &MessageQuery) -> Result<Vec<MessageRef>> {
        let mut state = self.state.lock().unwrap();
        if state.failing_scans > 0 {
            state.failing_scans -= 1;
            return Err(GmailError::AuthError("Token has been expired or revoked".to_string()));
        }

        let unread_only = query.query.contains("is:unread");
        let mut refs: Vec<MessageRef> = state
            .messages
            .iter()
            .filter(|m| !unread_only || m.unread)
            .filter(|m| query.label_ids.iter().all(|l| m.labels.contains(l)))
            .map(|m| MessageRef {
                id: m.id.clone(),
                thread_id: Some(m.thread_id.clone()),
            })
            .collect();

        if let Some(max_results) = query.max_results {
            refs.truncate(max_results as usize);
        }
        Ok(refs)
    }

    fn metadata_now(&self, id: &str) -> Result<MessageHeaders> {
        let state = self.state.lock().unwrap();
        if state.fail_metadata.contains(id) {
            return Err(GmailError::ServerError {
                status: 500,
                message: "Backend Error".to_string(),
            });
        }

        let message = state
            .messages
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))?;

        Ok(MessageHeaders {
            id: message.id.clone(),
            thread_id: Some(message.thread_id.clone()),
            subject: message.subject.clone(),
            from: message.from.clone(),
        })
    }

    fn send_now(&self, encoded_raw: &str, thread_id: Option<String>) -> Result<String> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded_raw)
            .map_err(|e| GmailError::BadRequest(format!("Invalid raw message: {}", e)))?;
        let raw = String::from_utf8(bytes)
            .map_err(|e| GmailError::BadRequest(format!("Invalid raw message: {}", e)))?;
        let reply = SentReply { raw, thread_id };

        let mut state = self.state.lock().unwrap();
        if let Some(in_reply_to) = reply.header("In-Reply-To") {
            if state.fail_send.contains(&in_reply_to) {
                return Err(GmailError::ServerError {
                    status: 503,
                    message: "Service unavailable".to_string(),
                });
            }
        }

        state.sent.push(reply);
        Ok(format!("sent_{}", state.sent.len()))
    }

    fn modify_now(&self, id: &str, add: &[String], remove: &[String]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_modify.contains(id) {
            return Err(GmailError::ServerError {
                status: 500,
                message: "Backend Error".to_string(),
            });
        }

        for label_id in add {
            if !state.labels.iter().any(|l| &l.id == label_id) {
                return Err(GmailError::BadRequest(format!("Invalid label: {}", label_id)));
            }
        }

        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| GmailError::MessageNotFound(id.to_string()))?;

        for label_id in add {
            message.labels.insert(label_id.clone());
        }
        for label_id in remove {
            message.labels.remove(label_id);
        }
        Ok(())
    }
}

#[async_trait]
impl GmailClient for FakeMailbox {
    async fn account_address(&self) -> Result<String> {
        Ok(ACCOUNT_ADDRESS.to_string())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.enter().await;
        let result = Ok(self.list_labels_now());
        self.exit();
        result
    }

    async fn create_label(&self, name: &str, _visibility: &LabelVisibility) -> Result<LabelId> {
        self.enter().await;
        let result = self.create_label_now(name);
        self.exit();
        result
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRef>> {
        self.enter().await;
        let result = self.list_messages_now(query);
        self.exit();
        result
    }

    async fn get_message_metadata(&self, id: &str, _headers: &[String]) -> Result<MessageHeaders> {
        self.enter().await;
        let result = self.metadata_now(id);
        self.exit();
        result
    }

    async fn send_message(&self, encoded_raw: &str, thread_id: Option<String>) -> Result<String> {
        self.enter().await;
        let result = self.send_now(encoded_raw, thread_id);
        self.exit();
        result
    }

    async fn modify_message_labels(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.enter().await;
        let result = self.modify_now(id, add_label_ids, remove_label_ids);
        self.exit();
        result
    }
}

/// Orchestrator over the fake mailbox with default configuration
pub fn orchestrator_for(mailbox: &Arc<FakeMailbox>) -> Orchestrator {
    orchestrator_with_config(mailbox, &Config::default())
}

pub fn orchestrator_with_config(mailbox: &Arc<FakeMailbox>, config: &Config) -> Orchestrator {
    let client: Arc<dyn GmailClient> = mailbox.clone();
    Orchestrator::from_config(client, config, account())
}

pub fn account() -> Mailbox {
    ACCOUNT_ADDRESS.parse().unwrap()
}

/// Sleeper that records requested delays, returns at once, and requests
/// shutdown on the `stop_after`-th call
pub struct StopAfterSleeper {
    pub delays: Mutex<Vec<Duration>>,
    stop_after: usize,
    handle: Mutex<Option<ShutdownHandle>>,
}

impl StopAfterSleeper {
    pub fn new(stop_after: usize, handle: ShutdownHandle) -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            stop_after,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for StopAfterSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut delays = self.delays.lock().unwrap();
            delays.push(duration);
            delays.len()
        };

        if count >= self.stop_after {
            if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                handle.shutdown();
            }
            std::future::pending::<()>().await;
        }
    }
}
