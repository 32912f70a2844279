//! Builds and sends the vacation reply for a single message

use lettre::message::Mailbox;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::GmailClient;
use crate::error::{GmailError, ProcessingError};
use crate::models::{MessageHeaders, MessageRef, ReplyDraft};

/// Address inside angle brackets of a `Display Name <address>` value
static ANGLE_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.*)>").unwrap());

/// Local-part fragments of senders that never read replies
const AUTOMATED_SENDER_KEYWORDS: &[&str] = &[
    "noreply",
    "no-reply",
    "donotreply",
    "do-not-reply",
    "mailer-daemon",
    "notification",
    "automated",
];

/// Result of composing a reply for one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The reply was sent; holds the provider ID of the outgoing message
    Sent { sent_id: String },
    /// No reply was sent because the sender is automated
    SkippedAutomated { sender: String },
}

pub struct ReplyComposer {
    client: Arc<dyn GmailClient>,
    sender: Mailbox,
    body: String,
    skip_automated_senders: bool,
}

impl ReplyComposer {
    /// `sender` is the account replies are sent from
    pub fn new(client: Arc<dyn GmailClient>, sender: Mailbox, body: String) -> Self {
        Self {
            client,
            sender,
            body,
            skip_automated_senders: false,
        }
    }

    pub fn with_automated_sender_guard(mut self, enabled: bool) -> Self {
        self.skip_automated_senders = enabled;
        self
    }

    /// Fetch the message headers, compose the reply and send it once.
    ///
    /// Nothing is retried here; a failed send leaves the message unread and
    /// it is picked up again next cycle.
    pub async fn compose_and_send(&self, message: &MessageRef) -> Result<ReplyOutcome, ProcessingError> {
        let headers = self
            .client
            .get_message_metadata(&message.id, &["Subject".to_string(), "From".to_string()])
            .await
            .map_err(|source| ProcessingError::MetadataFailure {
                message_id: message.id.clone(),
                source,
            })?;

        let from = match headers.from.as_deref().map(str::trim) {
            Some(from) if !from.is_empty() => from.to_string(),
            _ => {
                return Err(ProcessingError::HeaderMissing {
                    message_id: message.id.clone(),
                    header: "From",
                })
            }
        };

        if self.skip_automated_senders && is_automated_sender(&from) {
            info!("Not replying to automated sender {} (message {})", from, message.id);
            return Ok(ReplyOutcome::SkippedAutomated { sender: from });
        }

        let draft = self.draft_for(message, &headers, &from);
        debug!("Sending reply to {} with subject '{}'", draft.to, draft.subject);
        let encoded = draft
            .encode()
            .map_err(|source| ProcessingError::InvalidReply {
                message_id: message.id.clone(),
                source,
            })?;

        let sent_id = self
            .client
            .send_message(&encoded, draft.thread_id.clone())
            .await
            .map_err(|source| ProcessingError::SendFailure {
                message_id: message.id.clone(),
                source,
            })?;

        info!("Sent reply to message {} ({})", message.id, sent_id);
        Ok(ReplyOutcome::Sent { sent_id })
    }

    fn draft_for(&self, message: &MessageRef, headers: &MessageHeaders, from: &str) -> ReplyDraft {
        ReplyDraft {
            from: self.sender.clone(),
            to: extract_recipient(from),
            subject: reply_subject(headers.subject.as_deref().unwrap_or("")),
            body: self.body.clone(),
            in_reply_to: message.id.clone(),
            thread_id: headers.thread_id.clone().or_else(|| message.thread_id.clone()),
        }
    }
}

/// Mailbox of the authenticated account, used as the `From` of every reply
pub async fn account_mailbox(client: &dyn GmailClient) -> Result<Mailbox, GmailError> {
    let address = client.account_address().await?;
    address.parse::<Mailbox>().map_err(|e| {
        GmailError::InvalidMessageFormat(format!(
            "Account address {:?} is not a valid mailbox: {}",
            address, e
        ))
    })
}

/// `Jane Doe <jane@example.com>` yields `jane@example.com`; anything without
/// an angle-bracketed part is used as is
pub fn extract_recipient(from: &str) -> String {
    ANGLE_ADDRESS
        .captures(from)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|address| !address.is_empty())
        .unwrap_or_else(|| from.trim())
        .to_string()
}

pub fn reply_subject(subject: &str) -> String {
    if subject.starts_with("Re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

pub fn is_automated_sender(from: &str) -> bool {
    let address = extract_recipient(from).to_lowercase();
    AUTOMATED_SENDER_KEYWORDS
        .iter()
        .any(|keyword| address.contains(keyword))
}
