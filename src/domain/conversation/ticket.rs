//! Escalation tickets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConversationId, TicketId};

/// Record of a handoff to a human technician.
///
/// Created once per escalation and immutable thereafter; a repeated
/// escalation of the same conversation references the existing ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: TicketId,
    pub conversation_id: ConversationId,
    pub created_at: DateTime<Utc>,
    /// Human-readable summary assembled from accumulated context fields.
    pub summary: String,
    /// Deep link into the messaging handoff channel.
    pub handoff_link: String,
}

impl Ticket {
    pub fn new(
        conversation_id: ConversationId,
        summary: impl Into<String>,
        handoff_link: impl Into<String>,
    ) -> Self {
        Self {
            ticket_id: TicketId::new(),
            conversation_id,
            created_at: Utc::now(),
            summary: summary.into(),
            handoff_link: handoff_link.into(),
        }
    }
}
