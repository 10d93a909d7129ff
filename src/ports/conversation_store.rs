//! Conversation Store Port - Interface for the durable transcript log.
//!
//! Records are append-only and deduplicated by conversation id.
//! Implementations must serialize appends per conversation so transcript
//! ordering is preserved even if two tasks touch the same conversation.

use async_trait::async_trait;

use crate::domain::conversation::{ConversationRecord, ConversationStatus, Event, Ticket};
use crate::domain::foundation::ConversationId;

/// Errors that can occur during conversation storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("Conversation already exists: {0}")]
    AlreadyExists(ConversationId),

    #[error("Failed to serialize record: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize record: {0}")]
    DeserializationFailed(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Port for the durable, append-only conversation log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a fresh record for a conversation.
    ///
    /// # Errors
    /// Returns `StoreError::AlreadyExists` if the id is already present.
    async fn create(&self, conversation_id: &ConversationId)
        -> Result<ConversationRecord, StoreError>;

    /// Append events to a conversation's transcript, in order.
    async fn append(
        &self,
        conversation_id: &ConversationId,
        events: &[Event],
    ) -> Result<(), StoreError>;

    /// Record a status change.
    async fn set_status(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), StoreError>;

    /// Attach the escalation ticket to the record.
    async fn attach_ticket(
        &self,
        conversation_id: &ConversationId,
        ticket: &Ticket,
    ) -> Result<(), StoreError>;

    /// Load the full record for a conversation.
    async fn load(&self, conversation_id: &ConversationId)
        -> Result<ConversationRecord, StoreError>;

    /// Check whether a record exists.
    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_display_the_conversation_id() {
        let id = ConversationId::new("X7K2M9").unwrap();
        assert!(StoreError::NotFound(id.clone()).to_string().contains("X7K2M9"));
        assert!(StoreError::AlreadyExists(id).to_string().contains("exists"));
    }
}
