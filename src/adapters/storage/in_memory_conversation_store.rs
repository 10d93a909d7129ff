//! In-memory conversation store for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::conversation::{ConversationRecord, ConversationStatus, Event, Ticket};
use crate::domain::foundation::ConversationId;
use crate::ports::{ConversationStore, StoreError};

/// Conversation store backed by a process-local map. The map-wide write
/// lock serializes appends, which preserves per-conversation ordering.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    records: RwLock<HashMap<ConversationId, ConversationRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationRecord, StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(conversation_id) {
            return Err(StoreError::AlreadyExists(conversation_id.clone()));
        }
        let record = ConversationRecord::open(conversation_id.clone());
        records.insert(conversation_id.clone(), record.clone());
        Ok(record)
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        events: &[Event],
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.clone()))?;
        for event in events {
            record.append(event.clone());
        }
        Ok(())
    }

    async fn set_status(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.clone()))?;
        record.status = status;
        Ok(())
    }

    async fn attach_ticket(
        &self,
        conversation_id: &ConversationId,
        ticket: &Ticket,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let record = records
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(conversation_id.clone()))?;
        record.ticket = Some(ticket.clone());
        Ok(())
    }

    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationRecord, StoreError> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(conversation_id.clone()))
    }

    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, StoreError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(conversation_id))
    }
}
