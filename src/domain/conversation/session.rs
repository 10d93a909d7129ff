//! Transient per-conversation session state.
//!
//! One session exists per active conversation and is owned exclusively by
//! the stage machine for the conversation's lifetime. Profile fields are
//! write-once-then-stable; context keys are additive and never removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::catalog::ButtonToken;
use super::stage::Stage;
use crate::domain::foundation::ConversationId;

/// Fingerprint of the last processed inbound turn, used to treat a client
/// retry within a short window as a no-op replay instead of reprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnFingerprint {
    /// SHA-256 digest of the inbound payload, hex-encoded.
    pub digest: String,
    pub received_at: DateTime<Utc>,
    /// Cached reply for replay.
    pub reply: String,
    pub stage: Stage,
    pub buttons: Vec<ButtonToken>,
    pub end_conversation: bool,
}

/// Transient state for one active conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub conversation_id: ConversationId,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Free-form accumulator fed to the completion-service prompts.
    /// Keys are additive; existing values are overwritten, never removed.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub clarification_rounds: u32,
    #[serde(default)]
    pub diagnostic_attempts: u32,
    #[serde(default)]
    pub risk_acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_turn: Option<TurnFingerprint>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Opens a session at the consent stage.
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            stage: Stage::AskConsent,
            language: None,
            user_level: None,
            name: None,
            context: BTreeMap::new(),
            clarification_rounds: 0,
            diagnostic_attempts: 0,
            risk_acknowledged: false,
            last_turn: None,
            created_at: Utc::now(),
        }
    }

    /// Adds or overwrites a context key.
    pub fn set_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }

    /// Reads a context key.
    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    /// Records one more clarification round; returns the new count.
    pub fn record_clarification(&mut self) -> u32 {
        self.clarification_rounds += 1;
        self.clarification_rounds
    }

    /// Records one more failed diagnostic attempt; returns the new count.
    pub fn record_attempt(&mut self) -> u32 {
        self.diagnostic_attempts += 1;
        self.diagnostic_attempts
    }

    /// Marks the one-time risk acknowledgment as given.
    pub fn acknowledge_risk(&mut self) {
        self.risk_acknowledged = true;
    }

    /// Display name for prompts and summaries.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}
