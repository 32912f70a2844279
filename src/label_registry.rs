//! Resolution of the "handled" label, creating it on first use
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::GmailClient;
use crate::error::{GmailError, ProcessingError};
use crate::models::{LabelId, LabelInfo, LabelVisibility};

/// Finds or creates the label applied to answered messages.
///
/// Creation is attempted first; a name conflict means the label already
/// exists (possibly created by an earlier run), in which case the existing
/// label is looked up by name. Calling `ensure_handled_label` repeatedly
/// always yields the same identifier and never creates a second label.
pub struct LabelRegistry {
    client: Arc<dyn GmailClient>,
    name: String,
    visibility: LabelVisibility,
}

impl LabelRegistry {
    pub fn new(client: Arc<dyn GmailClient>, name: String, visibility: LabelVisibility) -> Self {
        Self {
            client,
            name,
            visibility,
        }
    }

    pub async fn ensure_handled_label(&self) -> Result<LabelId, ProcessingError> {
        match self.client.create_label(&self.name, &self.visibility).await {
            Ok(id) => {
                info!("Created label '{}' with ID {}", self.name, id);
                Ok(id)
            }
            Err(e) if e.is_conflict() => {
                debug!("Label '{}' already exists, looking it up", self.name);
                self.find_existing().await
            }
            Err(e) => Err(self.failure(e)),
        }
    }

    async fn find_existing(&self) -> Result<LabelId, ProcessingError> {
        let labels = self
            .client
            .list_labels()
            .await
            .map_err(|e| self.failure(e))?;

        match find_by_name(&labels, &self.name) {
            Some(label) => {
                info!("Using existing label '{}' with ID {}", label.name, label.id);
                Ok(label.id.clone())
            }
            None => {
                warn!(
                    "Label '{}' reported as existing but missing from the label list",
                    self.name
                );
                Err(self.failure(GmailError::LabelError(format!(
                    "Label '{}' conflicts with an existing label that could not be found",
                    self.name
                ))))
            }
        }
    }

    fn failure(&self, source: GmailError) -> ProcessingError {
        ProcessingError::LabelFailure {
            name: self.name.clone(),
            source,
        }
    }
}

/// Exact name match first, then a case-insensitive one (Gmail treats label
/// names case-insensitively when checking for conflicts)
fn find_by_name<'a>(labels: &'a [LabelInfo], name: &str) -> Option<&'a LabelInfo> {
    labels
        .iter()
        .find(|label| label.name == name)
        .or_else(|| {
            labels
                .iter()
                .find(|label| label.name.to_lowercase() == name.to_lowercase())
        })
}
