//! Strongly-typed identifier value objects.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ValidationError;

/// Characters a conversation identifier may contain. Confusable glyphs
/// (0/O, 1/I/L) are excluded so identifiers survive being read aloud over
/// a support call.
pub const ID_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

const MIN_ID_LEN: usize = 4;
const MAX_ID_LEN: usize = 16;

/// Short, globally-unique identifier for a conversation.
///
/// Issued by the identifier allocator; the token is opaque to every other
/// component and stable for the lifetime of the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Validates and wraps a raw token.
    pub fn new(token: impl Into<String>) -> Result<Self, ValidationError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ValidationError::empty_field("conversation_id"));
        }
        if token.len() < MIN_ID_LEN || token.len() > MAX_ID_LEN {
            return Err(ValidationError::out_of_range(
                "conversation_id",
                MIN_ID_LEN as i64,
                MAX_ID_LEN as i64,
                token.len() as i64,
            ));
        }
        if let Some(bad) = token.bytes().find(|b| !ID_ALPHABET.contains(b)) {
            return Err(ValidationError::invalid_format(
                "conversation_id",
                format!("character '{}' is not in the identifier alphabet", bad as char),
            ));
        }
        Ok(Self(token))
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConversationId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Unique identifier for an escalation ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random TicketId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a TicketId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_accepts_alphabet_tokens() {
        let id = ConversationId::new("X7K2M9").unwrap();
        assert_eq!(id.as_str(), "X7K2M9");
        assert_eq!(id.to_string(), "X7K2M9");
    }

    #[test]
    fn conversation_id_rejects_empty() {
        assert!(matches!(
            ConversationId::new(""),
            Err(ValidationError::EmptyField { .. })
        ));
    }

    #[test]
    fn conversation_id_rejects_short_and_long() {
        assert!(ConversationId::new("AB2").is_err());
        assert!(ConversationId::new("A".repeat(17)).is_err());
    }

    #[test]
    fn conversation_id_rejects_confusable_characters() {
        // 0, O, 1, I and L are excluded from the alphabet
        for token in ["ABC0EF", "ABCOEF", "ABC1EF", "ABCIEF", "ABCLEF"] {
            assert!(
                ConversationId::new(token).is_err(),
                "{} should be rejected",
                token
            );
        }
    }

    #[test]
    fn conversation_id_rejects_lowercase() {
        assert!(ConversationId::new("abc234").is_err());
    }

    #[test]
    fn conversation_id_parses_from_str() {
        let id: ConversationId = "QRS789".parse().unwrap();
        assert_eq!(id.as_str(), "QRS789");
    }

    #[test]
    fn conversation_id_serializes_transparently() {
        let id = ConversationId::new("X7K2M9").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"X7K2M9\"");
    }

    #[test]
    fn ticket_ids_are_unique() {
        assert_ne!(TicketId::new(), TicketId::new());
    }

    #[test]
    fn ticket_id_round_trips_through_string() {
        let id = TicketId::new();
        let parsed: TicketId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn alphabet_has_no_confusables() {
        for b in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!ID_ALPHABET.contains(&b));
        }
    }
}
