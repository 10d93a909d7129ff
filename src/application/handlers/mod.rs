//! One handler per externally-visible operation.

mod get_conversation;
mod process_turn;

pub use get_conversation::{GetConversationError, GetConversationHandler};
pub use process_turn::{
    ButtonDto, ProcessTurnHandler, TurnError, TurnRequest, TurnResponse,
};
