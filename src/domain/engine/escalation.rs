//! Escalation policy.
//!
//! Decides nothing about *when* to escalate (the stage machine owns the
//! thresholds); given the decision, it produces the ticket exactly once
//! per conversation and assembles the human-readable handoff.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::domain::conversation::{ConversationRecord, Session, Ticket};

/// Why a conversation left the automated flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationReason {
    /// The classifier asked for clarification too many times.
    ClarificationLimit,
    /// Diagnostic steps kept failing past the attempt threshold.
    DiagnosticLimit,
    /// The user asked for a technician directly.
    UserRequested,
    /// The classifier judged the situation high-risk.
    HighRisk,
    /// The user declined the risk acknowledgment.
    RiskDeclined,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClarificationLimit => "could not pin down the problem",
            Self::DiagnosticLimit => "automated steps did not resolve the problem",
            Self::UserRequested => "user asked for a technician",
            Self::HighRisk => "high-risk situation",
            Self::RiskDeclined => "user declined to continue a risky procedure",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Produces tickets and handoff links for escalated conversations.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    handoff_base_url: String,
}

impl EscalationPolicy {
    pub fn new(handoff_base_url: impl Into<String>) -> Self {
        Self {
            handoff_base_url: handoff_base_url.into(),
        }
    }

    /// Escalate a conversation, returning its ticket.
    ///
    /// Idempotent: if the record already carries a ticket, that ticket is
    /// returned unchanged and no new one is generated.
    pub fn escalate(
        &self,
        session: &Session,
        record: &ConversationRecord,
        reason: EscalationReason,
    ) -> Ticket {
        if let Some(existing) = &record.ticket {
            tracing::debug!(conversation = %session.conversation_id,
                ticket = %existing.ticket_id, "conversation already escalated, reusing ticket");
            return existing.clone();
        }

        let summary = self.summary(session, reason);
        let ticket = Ticket::new(
            session.conversation_id.clone(),
            summary.clone(),
            self.handoff_link(&session.conversation_id.to_string(), &summary),
        );
        tracing::warn!(conversation = %session.conversation_id, ticket = %ticket.ticket_id,
            reason = %reason, "conversation escalated to a technician");
        ticket
    }

    /// Human-readable summary assembled from accumulated context fields.
    fn summary(&self, session: &Session, reason: EscalationReason) -> String {
        let mut parts = vec![format!("Support request from {}", session.display_name())];
        if let Some(device) = session.context("device") {
            parts.push(format!("device: {}", device));
        }
        if let Some(problem) = session.context("problem") {
            parts.push(format!("problem: {}", problem));
        }
        if let Some(intent) = session.context("intent") {
            parts.push(format!("category: {}", intent));
        }
        if let Some(last_step) = session.context("last_step") {
            parts.push(format!("last step tried: {}", last_step));
        }
        parts.push(format!("escalated because {}", reason));
        parts.join(" | ")
    }

    /// Messaging deep link with the reference and summary prefilled.
    fn handoff_link(&self, conversation_id: &str, summary: &str) -> String {
        let text = format!("[{}] {}", conversation_id, summary);
        format!(
            "{}?text={}",
            self.handoff_base_url,
            utf8_percent_encode(&text, NON_ALPHANUMERIC)
        )
    }
}
