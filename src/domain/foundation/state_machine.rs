//! State machine trait for status enums.
//!
//! Implementors declare their full transition table; callers get validated
//! transitions and terminal-state detection for free. Keeping the table on
//! the enum makes the complete transition set inspectable and testable
//! away from the call sites that drive it.

use super::ValidationError;

/// Trait for enums that represent state machines.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from the current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs a transition with validation, returning an error if the
    /// transition is not in the table.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if the current state is terminal (no valid outgoing
    /// transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
