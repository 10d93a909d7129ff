//! Shared building blocks: identifiers, validation errors, the
//! state-machine trait.

mod errors;
mod ids;
mod state_machine;

pub use errors::ValidationError;
pub use ids::{ConversationId, TicketId, ID_ALPHABET};
pub use state_machine::StateMachine;
