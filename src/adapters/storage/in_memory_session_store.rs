//! In-memory session store for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::conversation::Session;
use crate::domain::foundation::ConversationId;
use crate::ports::{SessionStore, SessionStoreError};

/// Session store backed by a process-local map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<ConversationId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session.conversation_id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, conversation_id: &ConversationId) -> Result<Session, SessionStoreError> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| SessionStoreError::NotFound(conversation_id.clone()))
    }

    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, SessionStoreError> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(conversation_id))
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), SessionStoreError> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(conversation_id);
        Ok(())
    }
}
