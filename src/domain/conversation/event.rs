//! Transcript events and the durable conversation record.
//!
//! The transcript is append-only: events are never rewritten and ordering
//! is monotonic by append time. Status changes fold into the record but
//! are persisted as their own appended lines by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::{self, ButtonToken};
use super::stage::Stage;
use super::ticket::Ticket;
use crate::domain::foundation::{ConversationId, StateMachine, ValidationError};

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventRole {
    User,
    Bot,
    System,
}

/// What shape an event's payload takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Text,
    Button,
    Marker,
}

/// One user turn, bot turn, or internal marker in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub role: EventRole,
    pub kind: EventKind,
    pub payload: String,
    /// Tokens offered alongside a bot reply; empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<ButtonToken>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// A free-text user turn.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: EventRole::User,
            kind: EventKind::Text,
            payload: text.into(),
            buttons: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A button press by the user.
    pub fn user_button(token: ButtonToken) -> Self {
        Self {
            role: EventRole::User,
            kind: EventKind::Button,
            payload: token.as_str().to_string(),
            buttons: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// A user-visible bot reply with its offered controls.
    pub fn bot(reply: impl Into<String>, buttons: Vec<ButtonToken>) -> Self {
        Self {
            role: EventRole::Bot,
            kind: EventKind::Text,
            payload: reply.into(),
            buttons,
            timestamp: Utc::now(),
        }
    }

    /// An internal marker ("classifier_result", "stage_changed", ...).
    pub fn marker(name: &str, detail: impl Into<String>) -> Self {
        Self {
            role: EventRole::System,
            kind: EventKind::Marker,
            payload: format!("{}: {}", name, detail.into()),
            buttons: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Validates the bot-event invariant: a non-empty reply and buttons
    /// that are a subset of the catalog entry for the *resulting* stage.
    pub fn validate_bot_event(&self, resulting_stage: Stage) -> Result<(), ValidationError> {
        if self.role != EventRole::Bot {
            return Ok(());
        }
        if self.payload.trim().is_empty() {
            return Err(ValidationError::empty_field("reply"));
        }
        let allowed = catalog::allowed_tokens(resulting_stage);
        for token in &self.buttons {
            if !allowed.contains(token) {
                return Err(ValidationError::invalid_format(
                    "buttons",
                    format!("token {} is not allowed in stage {}", token, resulting_stage),
                ));
            }
        }
        Ok(())
    }
}

/// Lifecycle status of a durable conversation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Escalated,
    Closed,
}

impl StateMachine for ConversationStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Open => vec![Self::Escalated, Self::Closed],
            Self::Escalated => vec![],
            Self::Closed => vec![],
        }
    }
}

/// Durable record of one conversation: created on first contact, mutated
/// by every turn, never deleted automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: ConversationStatus,
    pub transcript: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

impl ConversationRecord {
    /// Opens a fresh record.
    pub fn open(conversation_id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            created_at: now,
            updated_at: now,
            status: ConversationStatus::Open,
            transcript: Vec::new(),
            ticket: None,
        }
    }

    /// Appends an event, bumping `updated_at`.
    pub fn append(&mut self, event: Event) {
        self.updated_at = event.timestamp;
        self.transcript.push(event);
    }

    pub fn is_escalated(&self) -> bool {
        self.status == ConversationStatus::Escalated
    }
}
