use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use lettre::message::{header::ContentType, Mailbox, SinglePart};
use lettre::Message;
use serde::{Deserialize, Serialize};

use crate::error::{GmailError, Result};

/// Gmail system label for the inbox
pub const INBOX_LABEL: &str = "INBOX";

/// Provider-assigned label identifier
pub type LabelId = String;

/// A message as returned by a mailbox listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
}

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: None,
        }
    }
}

/// Header metadata of a single message, limited to what a reply needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
}

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Visibility settings used when creating a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelVisibility {
    pub label_list: String,
    pub message_list: String,
}

impl Default for LabelVisibility {
    fn default() -> Self {
        Self {
            label_list: "labelShow".to_string(),
            message_list: "show".to_string(),
        }
    }
}

/// Listing predicate: a Gmail search query restricted to a set of labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub query: String,
    pub label_ids: Vec<String>,
    pub max_results: Option<u32>,
}

impl MessageQuery {
    /// Unread messages currently in the inbox
    pub fn unread_in_inbox() -> Self {
        Self {
            query: "is:unread".to_string(),
            label_ids: vec![INBOX_LABEL.to_string()],
            max_results: None,
        }
    }
}

/// An outgoing reply, derived from the headers of the message it answers.
///
/// Only lives for the duration of one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDraft {
    /// The account the reply is sent from
    pub from: Mailbox,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Identifier of the answered message, used for In-Reply-To and References
    pub in_reply_to: String,
    pub thread_id: Option<String>,
}

impl ReplyDraft {
    /// Build the RFC 822 message: a single UTF-8 text/plain part threaded
    /// onto the answered message
    pub fn to_message(&self) -> Result<Message> {
        let to: Mailbox = self.to.parse().map_err(|e| {
            GmailError::InvalidMessageFormat(format!("Invalid recipient {:?}: {}", self.to, e))
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(single_line(&self.subject))
            .in_reply_to(single_line(&self.in_reply_to))
            .references(single_line(&self.in_reply_to))
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(self.body.clone()),
            )
            .map_err(|e| GmailError::InvalidMessageFormat(format!("Failed to build reply: {}", e)))
    }

    /// Transport encoding required by `messages.send`: base64url without padding
    pub fn encode(&self) -> Result<String> {
        let message = self.to_message()?;
        Ok(URL_SAFE_NO_PAD.encode(message.formatted()))
    }
}

/// Header values must stay on one line; everything else is kept as is
pub(crate) fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
