//! Storage adapters: session snapshots, the append-only conversation
//! log, and the identifier registry.

mod file_conversation_store;
mod file_id_registry;
mod file_session_store;
mod in_memory_conversation_store;
mod in_memory_session_store;

pub use file_conversation_store::FileConversationStore;
pub use file_id_registry::FileIdRegistry;
pub use file_session_store::FileSessionStore;
pub use in_memory_conversation_store::InMemoryConversationStore;
pub use in_memory_session_store::InMemorySessionStore;
