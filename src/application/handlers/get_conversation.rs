//! GetConversationHandler - export a durable record for reporting.

use std::sync::Arc;

use crate::domain::conversation::ConversationRecord;
use crate::domain::foundation::ConversationId;
use crate::ports::{ConversationStore, StoreError};

/// Error type for the export operation.
#[derive(Debug, thiserror::Error)]
pub enum GetConversationError {
    #[error("invalid conversation id: {0}")]
    InvalidId(String),

    #[error("conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for GetConversationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => GetConversationError::NotFound(id),
            other => GetConversationError::Storage(other.to_string()),
        }
    }
}

/// Handler exposing full conversation records to reporting collaborators.
pub struct GetConversationHandler {
    conversations: Arc<dyn ConversationStore>,
}

impl GetConversationHandler {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self { conversations }
    }

    pub async fn handle(&self, raw_id: &str) -> Result<ConversationRecord, GetConversationError> {
        let conversation_id: ConversationId = raw_id
            .parse()
            .map_err(|e| GetConversationError::InvalidId(format!("{}", e)))?;
        Ok(self.conversations.load(&conversation_id).await?)
    }
}
