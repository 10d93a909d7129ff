//! Session Store Port - Interface for persisting transient session state.
//!
//! Injected as a dependency rather than held as a module-level singleton,
//! so tests can substitute an in-memory implementation.

use async_trait::async_trait;

use crate::domain::conversation::Session;
use crate::domain::foundation::ConversationId;

/// Errors that can occur during session storage operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session not found for conversation: {0}")]
    NotFound(ConversationId),

    #[error("Failed to serialize session: {0}")]
    SerializationFailed(String),

    #[error("Failed to deserialize session: {0}")]
    DeserializationFailed(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Port for persisting and loading per-conversation sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Save a session, overwriting any previous snapshot.
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError>;

    /// Load the session for a conversation.
    ///
    /// # Errors
    /// Returns `SessionStoreError::NotFound` if no session exists.
    async fn load(&self, conversation_id: &ConversationId) -> Result<Session, SessionStoreError>;

    /// Check whether a session exists.
    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, SessionStoreError>;

    /// Remove a session.
    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), SessionStoreError>;
}
