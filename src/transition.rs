//! Moves an answered message out of the inbox and under the handled label

use std::sync::Arc;
use tracing::debug;

use crate::client::GmailClient;
use crate::error::ProcessingError;
use crate::models::{LabelId, MessageRef, INBOX_LABEL};

pub struct StateTransitionApplier {
    client: Arc<dyn GmailClient>,
}

impl StateTransitionApplier {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    /// Add the handled label and remove `INBOX` in a single modify request.
    ///
    /// The message leaves the unread-inbox query afterwards, so it is never
    /// answered twice. Applying the same change again is a no-op.
    pub async fn mark_handled(&self, message: &MessageRef, label_id: &LabelId) -> Result<(), ProcessingError> {
        self.client
            .modify_message_labels(&message.id, &[label_id.clone()], &[INBOX_LABEL.to_string()])
            .await
            .map_err(|source| ProcessingError::TransitionFailure {
                message_id: message.id.clone(),
                source,
            })?;

        debug!("Message {} labeled {} and removed from inbox", message.id, label_id);
        Ok(())
    }
}
