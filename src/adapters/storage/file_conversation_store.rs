//! File-based conversation store.
//!
//! One line-delimited JSON file per conversation: the first line opens
//! the record, every later line appends an event, status change, or
//! ticket. Appends are cheap, the format streams, and the full record is
//! recovered by folding the lines in order. A per-conversation mutex
//! serializes appends so transcript ordering survives concurrent tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::conversation::{ConversationRecord, ConversationStatus, Event, Ticket};
use crate::domain::foundation::ConversationId;
use crate::ports::{ConversationStore, StoreError};

/// One line of the durable log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "line", rename_all = "snake_case")]
enum LogLine {
    Opened {
        conversation_id: ConversationId,
        at: DateTime<Utc>,
    },
    Event {
        event: Event,
    },
    Status {
        status: ConversationStatus,
        at: DateTime<Utc>,
    },
    Ticket {
        ticket: Ticket,
    },
}

/// Conversation store writing line-delimited JSON records to disk.
pub struct FileConversationStore {
    base_path: PathBuf,
    locks: Mutex<HashMap<ConversationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileConversationStore {
    /// Create a new store rooted at a base directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn record_path(&self, conversation_id: &ConversationId) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", conversation_id))
    }

    /// Per-conversation append lock.
    fn lock_for(&self, conversation_id: &ConversationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(conversation_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn append_lines(
        &self,
        conversation_id: &ConversationId,
        lines: &[LogLine],
    ) -> Result<(), StoreError> {
        let path = self.record_path(conversation_id);
        if !path.exists() {
            return Err(StoreError::NotFound(conversation_id.clone()));
        }

        let mut body = String::new();
        for line in lines {
            body.push_str(
                &serde_json::to_string(line)
                    .map_err(|e| StoreError::SerializationFailed(e.to_string()))?,
            );
            body.push('\n');
        }

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(body.as_bytes())
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.flush().await.map_err(|e| StoreError::Io(e.to_string()))
    }

    /// Rebuilds a record by folding the log lines in order.
    fn fold(
        conversation_id: &ConversationId,
        content: &str,
    ) -> Result<ConversationRecord, StoreError> {
        let mut record: Option<ConversationRecord> = None;

        for (number, raw) in content.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            let line: LogLine = serde_json::from_str(raw).map_err(|e| {
                StoreError::DeserializationFailed(format!("line {}: {}", number + 1, e))
            })?;
            let not_opened = || {
                StoreError::DeserializationFailed(format!(
                    "line {}: record not opened yet",
                    number + 1
                ))
            };
            match line {
                LogLine::Opened { conversation_id, at } => {
                    if record.is_some() {
                        return Err(StoreError::DeserializationFailed(format!(
                            "line {}: duplicate open line",
                            number + 1
                        )));
                    }
                    let mut opened = ConversationRecord::open(conversation_id);
                    opened.created_at = at;
                    opened.updated_at = at;
                    record = Some(opened);
                }
                LogLine::Event { event } => {
                    record.as_mut().ok_or_else(not_opened)?.append(event);
                }
                LogLine::Status { status, at } => {
                    let current = record.as_mut().ok_or_else(not_opened)?;
                    current.status = status;
                    current.updated_at = at;
                }
                LogLine::Ticket { ticket } => {
                    record.as_mut().ok_or_else(not_opened)?.ticket = Some(ticket);
                }
            }
        }

        record.ok_or_else(|| StoreError::NotFound(conversation_id.clone()))
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn create(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationRecord, StoreError> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let path = self.record_path(conversation_id);
        if path.exists() {
            return Err(StoreError::AlreadyExists(conversation_id.clone()));
        }
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let record = ConversationRecord::open(conversation_id.clone());
        let opened = LogLine::Opened {
            conversation_id: conversation_id.clone(),
            at: record.created_at,
        };
        let line = serde_json::to_string(&opened)
            .map_err(|e| StoreError::SerializationFailed(e.to_string()))?;
        fs::write(&path, format!("{}\n", line))
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(record)
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        events: &[Event],
    ) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        let lines: Vec<LogLine> = events
            .iter()
            .map(|event| LogLine::Event {
                event: event.clone(),
            })
            .collect();
        self.append_lines(conversation_id, &lines).await
    }

    async fn set_status(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        self.append_lines(
            conversation_id,
            &[LogLine::Status {
                status,
                at: Utc::now(),
            }],
        )
        .await
    }

    async fn attach_ticket(
        &self,
        conversation_id: &ConversationId,
        ticket: &Ticket,
    ) -> Result<(), StoreError> {
        let lock = self.lock_for(conversation_id);
        let _guard = lock.lock().await;

        self.append_lines(
            conversation_id,
            &[LogLine::Ticket {
                ticket: ticket.clone(),
            }],
        )
        .await
    }

    async fn load(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<ConversationRecord, StoreError> {
        let path = self.record_path(conversation_id);
        if !path.exists() {
            return Err(StoreError::NotFound(conversation_id.clone()));
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Self::fold(conversation_id, &content)
    }

    async fn exists(&self, conversation_id: &ConversationId) -> Result<bool, StoreError> {
        Ok(self.record_path(conversation_id).exists())
    }
}
