//! Identifier Allocator Port - Interface for issuing conversation ids.
//!
//! Allocation failures indicate capacity or infrastructure issues, not
//! input problems: they are fatal for the requesting turn only and must
//! be surfaced to operations.

use async_trait::async_trait;

use crate::domain::foundation::ConversationId;

/// Errors that can occur while allocating an identifier.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// No unused identifier was found within the bounded number of draws.
    #[error("identifier space exhausted after {draws} draws")]
    Exhausted { draws: u32 },

    /// The registry lock could not be acquired within the retry budget.
    #[error("registry lock contention: gave up after {attempts} attempts")]
    LockContention { attempts: u32 },

    /// Filesystem failure while reading or persisting the registry.
    #[error("registry IO error: {0}")]
    Io(String),
}

impl AllocationError {
    /// Every allocation failure is retryable from the caller's point of
    /// view: the request failed, not the input.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Port for issuing short, globally-unique conversation identifiers.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// Allocate a fresh identifier, guaranteed to have at most one owner
    /// even under concurrent callers.
    async fn allocate(&self) -> Result<ConversationId, AllocationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_reports_draw_count() {
        let err = AllocationError::Exhausted { draws: 16 };
        assert!(err.to_string().contains("16"));
        assert!(err.is_retryable());
    }

    #[test]
    fn lock_contention_reports_attempts() {
        let err = AllocationError::LockContention { attempts: 5 };
        assert!(err.to_string().contains("5 attempts"));
    }
}
