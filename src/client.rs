//! Gmail API client: the mailbox capability used by every component

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use google_gmail1::api::{Label, Message, ModifyMessageRequest};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::{GmailHub, LABELS_SCOPE, MODIFY_SCOPE, SEND_SCOPE};
use crate::error::{GmailError, Result};
use crate::models::{LabelId, LabelInfo, LabelVisibility, MessageHeaders, MessageQuery, MessageRef};

/// Per-call timeout applied to every Gmail API request
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Retries for idempotent calls (initial attempt not counted)
const MAX_RETRIES: u32 = 3;

/// Operations the auto-reply core needs from the mailbox provider.
///
/// A single implementation is constructed at startup and shared by every
/// component; tests substitute mocks or an in-memory mailbox.
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// Email address of the authenticated account
    async fn account_address(&self) -> Result<String>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, failing with `GmailError::Conflict` if the name is taken
    async fn create_label(&self, name: &str, visibility: &LabelVisibility) -> Result<LabelId>;

    /// List messages matching a query (first page only)
    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRef>>;

    /// Fetch the requested headers of a message
    async fn get_message_metadata(&self, id: &str, headers: &[String]) -> Result<MessageHeaders>;

    /// Send a base64url-encoded RFC 822 message, returning the sent message ID
    async fn send_message(&self, encoded_raw: &str, thread_id: Option<String>) -> Result<String>;

    /// Add and remove labels on a single message in one request
    async fn modify_message_labels(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;
}

/// Production Gmail client
///
/// This implementation includes:
/// - A timeout around every API call
/// - Exponential backoff retry for idempotent calls
///
/// Sends and label creation are never retried here: a retried send can
/// duplicate a reply, and label creation races are settled by the label
/// registry.
pub struct ProductionGmailClient {
    hub: GmailHub,
    user_id: String,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self {
            hub,
            user_id: "me".to_string(),
        }
    }

    /// Check if an error is retryable
    fn should_retry(error: &GmailError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    let wait = match &e {
                        GmailError::RateLimitExceeded { retry_after } => {
                            std::cmp::max(delay, Duration::from_secs(*retry_after))
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Wrap an API call in a timeout to prevent indefinite hangs
    async fn with_timeout<T, Fut>(operation_name: &str, api_call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        debug!("Calling Gmail API: {}", operation_name);
        match tokio::time::timeout(CALL_TIMEOUT, api_call).await {
            Ok(result) => result.map_err(GmailError::from),
            Err(_) => {
                warn!("Gmail API {} call timed out after {:?}", operation_name, CALL_TIMEOUT);
                Err(GmailError::NetworkError(format!(
                    "API call timed out after {:?}",
                    CALL_TIMEOUT
                )))
            }
        }
    }
}

/// Extract the requested headers from a metadata-format message
fn parse_message_headers(msg: Message) -> Result<MessageHeaders> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let mut parsed = MessageHeaders {
        id,
        thread_id: msg.thread_id,
        ..Default::default()
    };

    let headers = msg
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default();

    for header in headers {
        if let (Some(name), Some(value)) = (header.name, header.value) {
            // First occurrence wins, names are case-insensitive
            match name.to_lowercase().as_str() {
                "subject" if parsed.subject.is_none() => parsed.subject = Some(value),
                "from" if parsed.from.is_none() => parsed.from = Some(value),
                _ => {}
            }
        }
    }

    Ok(parsed)
}

fn non_empty(label_ids: &[String]) -> Option<Vec<String>> {
    if label_ids.is_empty() {
        None
    } else {
        Some(label_ids.to_vec())
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn account_address(&self) -> Result<String> {
        Self::with_retry("account_address", MAX_RETRIES, || async {
            // Must specify scope to avoid triggering an additional OAuth flow
            let (_, profile) = Self::with_timeout(
                "users.getProfile",
                self.hub
                    .users()
                    .get_profile(&self.user_id)
                    .add_scope(MODIFY_SCOPE)
                    .doit(),
            )
            .await?;

            profile.email_address.ok_or_else(|| {
                GmailError::InvalidMessageFormat("Profile has no email address".to_string())
            })
        })
        .await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", MAX_RETRIES, || async {
            let (_, response) = Self::with_timeout(
                "labels.list",
                self.hub
                    .users()
                    .labels_list(&self.user_id)
                    .add_scope(LABELS_SCOPE)
                    .doit(),
            )
            .await?;

            let labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            debug!("Successfully parsed {} labels", labels.len());
            Ok(labels)
        })
        .await
    }

    async fn create_label(&self, name: &str, visibility: &LabelVisibility) -> Result<LabelId> {
        let label = Label {
            name: Some(name.to_string()),
            label_list_visibility: Some(visibility.label_list.clone()),
            message_list_visibility: Some(visibility.message_list.clone()),
            ..Default::default()
        };

        let (_, created_label) = Self::with_timeout(
            "labels.create",
            self.hub
                .users()
                .labels_create(label, &self.user_id)
                .add_scope(LABELS_SCOPE)
                .doit(),
        )
        .await?;

        created_label
            .id
            .ok_or_else(|| GmailError::LabelError("Created label has no ID".to_string()))
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageRef>> {
        Self::with_retry("list_messages", MAX_RETRIES, || async {
            let mut call = self.hub.users().messages_list(&self.user_id).q(&query.query);
            for label_id in &query.label_ids {
                call = call.add_label_ids(label_id);
            }
            if let Some(max_results) = query.max_results {
                call = call.max_results(max_results);
            }

            let (_, response) =
                Self::with_timeout("messages.list", call.add_scope(MODIFY_SCOPE).doit()).await?;

            if response.next_page_token.is_some() {
                debug!("More candidates than one page; the rest are deferred to a later cycle");
            }

            Ok(response
                .messages
                .unwrap_or_default()
                .into_iter()
                .filter_map(|msg| {
                    msg.id.map(|id| MessageRef {
                        id,
                        thread_id: msg.thread_id,
                    })
                })
                .collect())
        })
        .await
    }

    async fn get_message_metadata(&self, id: &str, headers: &[String]) -> Result<MessageHeaders> {
        Self::with_retry("get_message_metadata", MAX_RETRIES, || async {
            let mut call = self
                .hub
                .users()
                .messages_get(&self.user_id, id)
                .format("metadata");
            for header in headers {
                call = call.add_metadata_headers(header);
            }

            let (_, msg) =
                Self::with_timeout("messages.get", call.add_scope(MODIFY_SCOPE).doit()).await?;
            parse_message_headers(msg)
        })
        .await
    }

    async fn send_message(&self, encoded_raw: &str, thread_id: Option<String>) -> Result<String> {
        // The generated API uploads the message as media, so undo the transport encoding
        let raw = URL_SAFE_NO_PAD.decode(encoded_raw).map_err(|e| {
            GmailError::InvalidMessageFormat(format!("Reply is not valid base64url: {}", e))
        })?;
        let media_type: mime::Mime = "message/rfc822".parse().map_err(|e| {
            GmailError::InvalidMessageFormat(format!("Invalid media type: {}", e))
        })?;

        let metadata = Message {
            thread_id,
            ..Default::default()
        };

        let (_, sent) = Self::with_timeout(
            "messages.send",
            self.hub
                .users()
                .messages_send(metadata, &self.user_id)
                .add_scope(SEND_SCOPE)
                .upload(std::io::Cursor::new(raw), media_type),
        )
        .await?;

        sent.id
            .ok_or_else(|| GmailError::InvalidMessageFormat("Sent message has no ID".to_string()))
    }

    async fn modify_message_labels(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        // Safe to retry: applying the same label set twice is a no-op
        Self::with_retry("modify_message_labels", MAX_RETRIES, || async {
            let request = ModifyMessageRequest {
                add_label_ids: non_empty(add_label_ids),
                remove_label_ids: non_empty(remove_label_ids),
            };

            Self::with_timeout(
                "messages.modify",
                self.hub
                    .users()
                    .messages_modify(request, &self.user_id, id)
                    .add_scope(MODIFY_SCOPE)
                    .doit(),
            )
            .await?;

            Ok(())
        })
        .await
    }
}
