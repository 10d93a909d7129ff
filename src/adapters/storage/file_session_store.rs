//! File-based session store.
//!
//! Stores one YAML snapshot per conversation under a base directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::domain::conversation::Session;
use crate::domain::foundation::ConversationId;
use crate::ports::{SessionStore, SessionStoreError};

/// Session store writing YAML snapshots to disk.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    base_path: PathBuf,
}

impl FileSessionStore {
    /// Create a new file store rooted at a base directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn session_path(&self, conversation_id: &ConversationId) -> PathBuf {
        self.base_path.join(format!("{}.yaml", conversation_id))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| SessionStoreError::Io(e.to_string()))?;

        let yaml = serde_yaml::to_string(session)
            .map_err(|e| SessionStoreError::SerializationFailed(e.to_string()))?;

        fs::write(self.session_path(&session.conversation_id), yaml)
            .await
            .map_err(|e| SessionStoreError::Io(e.to_string()))
    }

    async fn load(&self, conversation_id: &ConversationId) -> Result<Session, SessionStoreError> {
        let path = self.session_path(conversation_id);
        if !path.exists() {
            return Err(SessionStoreError::NotFound(conversation_id.clone()));
        }

        let yaml = fs::read_to_string(&path)
            .await
            .map_err(|e| SessionStoreError::Io(e.to_string()))?;

        serde_yaml::from_str(&yaml)
            .map_err(|e| SessionStoreError::DeserializationFailed(e.to_string()))
    }

    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, SessionStoreError> {
        Ok(self.session_path(conversation_id).exists())
    }

    async fn delete(&self, conversation_id: &ConversationId) -> Result<(), SessionStoreError> {
        let path = self.session_path(conversation_id);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| SessionStoreError::Io(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::Stage;
    use tempfile::TempDir;

    fn test_session(token: &str) -> Session {
        Session::new(ConversationId::new(token).unwrap())
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        let mut session = test_session("X7K2M9");
        session.stage = Stage::AskDevice;
        session.set_context("device", "notebook");
        store.save(&session).await.unwrap();

        let loaded = store.load(&session.conversation_id).await.unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn load_missing_session_errors() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        let result = store.load(&ConversationId::new("ZZZZ99").unwrap()).await;
        assert!(matches!(result, Err(SessionStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn snapshots_are_isolated_per_conversation() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        let a = test_session("AAAA22");
        let b = test_session("BBBB33");
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        assert_eq!(store.load(&a.conversation_id).await.unwrap(), a);
        assert_eq!(store.load(&b.conversation_id).await.unwrap(), b);
    }

    #[tokio::test]
    async fn delete_removes_the_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path());

        let session = test_session("X7K2M9");
        store.save(&session).await.unwrap();
        assert!(store.exists(&session.conversation_id).await.unwrap());

        store.delete(&session.conversation_id).await.unwrap();
        assert!(!store.exists(&session.conversation_id).await.unwrap());
    }
}
