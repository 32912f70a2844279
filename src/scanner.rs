//! Discovery of unread inbox messages awaiting a reply

use std::sync::Arc;
use tracing::{debug, info};

use crate::client::GmailClient;
use crate::error::ProcessingError;
use crate::models::{MessageQuery, MessageRef};

/// Lists reply candidates: unread messages that still carry the inbox label.
///
/// A single listing request is made per call. Messages beyond the first page
/// are not lost, they stay unread in the inbox and show up in a later cycle.
pub struct UnreadScanner {
    client: Arc<dyn GmailClient>,
    query: MessageQuery,
}

impl UnreadScanner {
    pub fn new(client: Arc<dyn GmailClient>, query: MessageQuery) -> Self {
        Self { client, query }
    }

    /// Candidates in provider listing order; an empty inbox is `Ok(vec![])`
    pub async fn list_candidates(&self) -> Result<Vec<MessageRef>, ProcessingError> {
        debug!(
            "Listing messages with query '{}' and labels {:?}",
            self.query.query, self.query.label_ids
        );

        let candidates = self
            .client
            .list_messages(&self.query)
            .await
            .map_err(ProcessingError::ScanFailure)?;

        info!("Found {} unread messages awaiting a reply", candidates.len());
        Ok(candidates)
    }
}
