//! Conversation model: stages, affordances, sessions, transcripts.

pub mod catalog;
mod event;
mod session;
mod stage;
mod ticket;

pub use catalog::{AffordanceEntry, ButtonToken};
pub use event::{ConversationRecord, ConversationStatus, Event, EventKind, EventRole};
pub use session::{Session, TurnFingerprint};
pub use stage::Stage;
pub use ticket::Ticket;
