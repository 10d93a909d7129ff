//! ProcessTurnHandler - drive one inbound turn end to end.
//!
//! Owns the conversation lifecycle around the stage machine: identifier
//! allocation for first contact, session and record loading, duplicate
//! suppression, event persistence, and the wire-level request/response
//! shapes consumed by the web-routing collaborator.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::conversation::catalog;
use crate::domain::conversation::{ButtonToken, Session, Stage, TurnFingerprint};
use crate::domain::engine::{StageMachine, TurnInput, TurnOutcome};
use crate::domain::foundation::ConversationId;
use crate::ports::{
    AllocationError, ConversationStore, IdAllocator, SessionStore, SessionStoreError, StoreError,
};

/// One inbound turn as received from the transport layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnRequest {
    /// Absent on first contact; a new conversation is opened.
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub user_text: Option<String>,
    /// Wire form of a pressed button token.
    #[serde(default)]
    pub button: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

/// A button as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonDto {
    pub label: String,
    pub token: ButtonToken,
}

/// The turn response handed back to the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub conversation_id: String,
    pub reply: String,
    pub stage: Stage,
    pub buttons: Vec<ButtonDto>,
    pub end_conversation: bool,
}

/// Failures a turn can surface to the caller. Adapter fallbacks never
/// appear here; only invalid input and infrastructure failures do.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("identifier allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("session storage failure: {0}")]
    Session(SessionStoreError),

    #[error("conversation storage failure: {0}")]
    Store(#[from] StoreError),
}

impl TurnError {
    /// Infrastructure failures are worth retrying; invalid input is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TurnError::InvalidRequest(_))
    }
}

impl From<SessionStoreError> for TurnError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::NotFound(id) => {
                TurnError::InvalidRequest(format!("unknown conversation '{}'", id))
            }
            other => TurnError::Session(other),
        }
    }
}

/// Handler for the turn operation.
pub struct ProcessTurnHandler {
    allocator: Arc<dyn IdAllocator>,
    sessions: Arc<dyn SessionStore>,
    conversations: Arc<dyn ConversationStore>,
    machine: Arc<StageMachine>,
    dedup_window: Duration,
}

impl ProcessTurnHandler {
    pub fn new(
        allocator: Arc<dyn IdAllocator>,
        sessions: Arc<dyn SessionStore>,
        conversations: Arc<dyn ConversationStore>,
        machine: Arc<StageMachine>,
        dedup_window: Duration,
    ) -> Self {
        Self {
            allocator,
            sessions,
            conversations,
            machine,
            dedup_window,
        }
    }

    pub async fn handle(&self, request: TurnRequest) -> Result<TurnResponse, TurnError> {
        match &request.conversation_id {
            None => self.start_conversation().await,
            Some(raw) => self.continue_conversation(raw, &request).await,
        }
    }

    /// First contact: allocate an identifier, open the session/record
    /// pair, and return the greeting turn.
    async fn start_conversation(&self) -> Result<TurnResponse, TurnError> {
        let conversation_id = self.allocator.allocate().await?;
        tracing::info!(conversation = %conversation_id, "opening conversation");

        let session = Session::new(conversation_id.clone());
        self.conversations.create(&conversation_id).await?;

        let outcome = self.machine.greeting(&session);
        self.conversations
            .append(&conversation_id, &outcome.new_events)
            .await?;
        self.sessions.save(&session).await.map_err(TurnError::from)?;

        Ok(self.to_response(&conversation_id, &outcome))
    }

    async fn continue_conversation(
        &self,
        raw_id: &str,
        request: &TurnRequest,
    ) -> Result<TurnResponse, TurnError> {
        let conversation_id: ConversationId = raw_id
            .parse()
            .map_err(|e| TurnError::InvalidRequest(format!("bad conversation id: {}", e)))?;

        let mut session = self.sessions.load(&conversation_id).await?;

        let digest = fingerprint(request);
        if let Some(last) = &session.last_turn {
            let age = Utc::now().signed_duration_since(last.received_at);
            let within_window = age
                .to_std()
                .map(|age| age <= self.dedup_window)
                .unwrap_or(true);
            if last.digest == digest && within_window {
                tracing::debug!(conversation = %conversation_id,
                    "duplicate turn within window, replaying cached response");
                return Ok(replay(&conversation_id, last));
            }
        }

        let input = to_input(request)?;
        let record = self.conversations.load(&conversation_id).await?;

        let outcome = self.machine.advance(&mut session, &record, &input).await;

        self.conversations
            .append(&conversation_id, &outcome.new_events)
            .await?;
        if let Some(ticket) = &outcome.new_ticket {
            self.conversations
                .attach_ticket(&conversation_id, ticket)
                .await?;
        }
        if let Some(status) = outcome.status_change {
            self.conversations
                .set_status(&conversation_id, status)
                .await?;
        }

        session.last_turn = Some(TurnFingerprint {
            digest,
            received_at: Utc::now(),
            reply: outcome.reply.clone(),
            stage: outcome.stage,
            buttons: outcome.buttons.clone(),
            end_conversation: outcome.end_conversation,
        });
        self.sessions.save(&session).await.map_err(TurnError::from)?;

        tracing::info!(conversation = %conversation_id, stage = %outcome.stage,
            "turn processed");
        Ok(self.to_response(&conversation_id, &outcome))
    }

    fn to_response(&self, conversation_id: &ConversationId, outcome: &TurnOutcome) -> TurnResponse {
        TurnResponse {
            conversation_id: conversation_id.to_string(),
            reply: outcome.reply.clone(),
            stage: outcome.stage,
            buttons: to_button_dtos(outcome.stage, &outcome.buttons),
            end_conversation: outcome.end_conversation,
        }
    }
}

/// SHA-256 over the inbound payload fields, hex-encoded.
fn fingerprint(request: &TurnRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"text:");
    hasher.update(request.user_text.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"|button:");
    hasher.update(request.button.as_deref().unwrap_or("").as_bytes());
    hasher.update(b"|image:");
    hasher.update(request.image_ref.as_deref().unwrap_or("").as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

fn to_input(request: &TurnRequest) -> Result<TurnInput, TurnError> {
    let button = match &request.button {
        Some(raw) => Some(raw.parse::<ButtonToken>().map_err(|e| {
            TurnError::InvalidRequest(format!("unknown button: {}", e))
        })?),
        None => None,
    };
    Ok(TurnInput {
        text: request.user_text.clone(),
        button,
        image_ref: request.image_ref.clone(),
    })
}

fn to_button_dtos(stage: Stage, buttons: &[ButtonToken]) -> Vec<ButtonDto> {
    buttons
        .iter()
        .map(|&token| ButtonDto {
            label: catalog::label_for(stage, token).to_string(),
            token,
        })
        .collect()
}

/// Rebuilds the cached response for a suppressed duplicate.
fn replay(conversation_id: &ConversationId, last: &TurnFingerprint) -> TurnResponse {
    TurnResponse {
        conversation_id: conversation_id.to_string(),
        reply: last.reply.clone(),
        stage: last.stage,
        buttons: to_button_dtos(last.stage, &last.buttons),
        end_conversation: last.end_conversation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryConversationStore, InMemorySessionStore, MockAiProvider};
    use crate::domain::engine::{Classifier, CoherenceMode, EscalationPolicy, StepGenerator};
    use crate::ports::AiProvider;
    use async_trait::async_trait;

    const CLASSIFY_POWER: &str = r#"{"intent": "power", "needs_clarification": false,
        "missing": [], "risk_level": "low", "confidence": 0.92}"#;
    const STEP_JSON: &str = r#"{"reply": "Unplug the charger, wait ten seconds, plug it back in.",
        "buttons": [{"token": "RESOLVED"}, {"token": "NOT_RESOLVED"}]}"#;

    /// Allocator with predictable identifiers for tests.
    struct SeqAllocator {
        next: std::sync::Mutex<usize>,
    }

    impl SeqAllocator {
        fn new() -> Self {
            Self {
                next: std::sync::Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl IdAllocator for SeqAllocator {
        async fn allocate(&self) -> Result<ConversationId, AllocationError> {
            use crate::domain::foundation::ID_ALPHABET;
            let mut next = self.next.lock().unwrap();
            let symbol = ID_ALPHABET[*next % ID_ALPHABET.len()] as char;
            *next += 1;
            Ok(ConversationId::new(format!("TEST{}{}", symbol, symbol)).unwrap())
        }
    }

    struct Fixture {
        handler: ProcessTurnHandler,
        conversations: Arc<InMemoryConversationStore>,
    }

    fn fixture(provider: MockAiProvider) -> Fixture {
        let provider: Arc<dyn AiProvider> = Arc::new(provider);
        let machine = Arc::new(StageMachine::new(
            Classifier::new(provider.clone(), Duration::from_secs(5)),
            StepGenerator::new(provider, Duration::from_secs(5), CoherenceMode::Correct),
            EscalationPolicy::new("https://wa.me/5491100000000"),
            2,
            2,
        ));
        let conversations = Arc::new(InMemoryConversationStore::new());
        let handler = ProcessTurnHandler::new(
            Arc::new(SeqAllocator::new()),
            Arc::new(InMemorySessionStore::new()),
            conversations.clone(),
            machine,
            Duration::from_secs(30),
        );
        Fixture {
            handler,
            conversations,
        }
    }

    fn text_turn(conversation_id: &str, text: &str) -> TurnRequest {
        TurnRequest {
            conversation_id: Some(conversation_id.to_string()),
            user_text: Some(text.to_string()),
            ..TurnRequest::default()
        }
    }

    fn button_turn(conversation_id: &str, token: &str) -> TurnRequest {
        TurnRequest {
            conversation_id: Some(conversation_id.to_string()),
            button: Some(token.to_string()),
            ..TurnRequest::default()
        }
    }

    #[tokio::test]
    async fn absent_id_opens_a_new_conversation() {
        let f = fixture(MockAiProvider::new());
        let response = f.handler.handle(TurnRequest::default()).await.unwrap();

        assert_eq!(response.conversation_id, "TEST22");
        assert_eq!(response.stage, Stage::AskConsent);
        assert_eq!(response.buttons.len(), 2);
        assert_eq!(response.buttons[0].label, "I agree");
        assert!(!response.end_conversation);

        let record = f
            .conversations
            .load(&"TEST22".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(record.transcript.len(), 1); // the greeting
    }

    #[tokio::test]
    async fn turns_advance_and_persist() {
        let f = fixture(MockAiProvider::new());
        let opened = f.handler.handle(TurnRequest::default()).await.unwrap();
        let id = opened.conversation_id;

        let response = f.handler.handle(button_turn(&id, "ACCEPT")).await.unwrap();
        assert_eq!(response.stage, Stage::AskLanguage);

        let record = f.conversations.load(&id.parse().unwrap()).await.unwrap();
        // greeting + button press + stage marker + language prompt
        assert!(record.transcript.len() >= 4);
    }

    #[tokio::test]
    async fn unknown_conversation_is_an_invalid_request() {
        let f = fixture(MockAiProvider::new());
        let err = f
            .handler
            .handle(text_turn("ZZZZ99", "hola"))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::InvalidRequest(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_conversation_id_is_an_invalid_request() {
        let f = fixture(MockAiProvider::new());
        let err = f
            .handler
            .handle(text_turn("not a real id!!", "hola"))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unknown_button_is_an_invalid_request() {
        let f = fixture(MockAiProvider::new());
        let opened = f.handler.handle(TurnRequest::default()).await.unwrap();
        let err = f
            .handler
            .handle(button_turn(&opened.conversation_id, "REBOOT_UNIVERSE"))
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn duplicate_turn_within_window_is_replayed_not_reprocessed() {
        let f = fixture(MockAiProvider::new());
        let opened = f.handler.handle(TurnRequest::default()).await.unwrap();
        let id = opened.conversation_id;

        let first = f.handler.handle(button_turn(&id, "ACCEPT")).await.unwrap();
        let record_after_first = f.conversations.load(&id.parse().unwrap()).await.unwrap();
        let events_after_first = record_after_first.transcript.len();

        // the client retries the same payload
        let second = f.handler.handle(button_turn(&id, "ACCEPT")).await.unwrap();
        assert_eq!(second.reply, first.reply);
        assert_eq!(second.stage, first.stage);

        let record_after_second = f.conversations.load(&id.parse().unwrap()).await.unwrap();
        assert_eq!(
            record_after_second.transcript.len(),
            events_after_first,
            "replayed turn must not append events"
        );
    }

    #[tokio::test]
    async fn different_payload_is_processed_normally() {
        let f = fixture(MockAiProvider::new());
        let opened = f.handler.handle(TurnRequest::default()).await.unwrap();
        let id = opened.conversation_id;

        let first = f.handler.handle(text_turn(&id, "acepto")).await.unwrap();
        assert_eq!(first.stage, Stage::AskLanguage);

        let second = f.handler.handle(button_turn(&id, "LANG_EN")).await.unwrap();
        assert_eq!(second.stage, Stage::AskName);
    }

    #[tokio::test]
    async fn escalation_attaches_ticket_and_status() {
        let provider = MockAiProvider::new()
            .with_response(CLASSIFY_POWER)
            .with_response(STEP_JSON);
        let f = fixture(provider);
        let opened = f.handler.handle(TurnRequest::default()).await.unwrap();
        let id = opened.conversation_id;

        for request in [
            button_turn(&id, "ACCEPT"),
            button_turn(&id, "LANG_ES_AR"),
            button_turn(&id, "NO_NAME"),
            button_turn(&id, "LEVEL_BASIC"),
            button_turn(&id, "DEVICE_NOTEBOOK"),
            text_turn(&id, "mi notebook no enciende"),
        ] {
            f.handler.handle(request).await.unwrap();
        }

        let response = f.handler.handle(button_turn(&id, "NEED_HELP")).await.unwrap();
        assert_eq!(response.stage, Stage::Escalated);
        assert!(response.end_conversation);

        let record = f.conversations.load(&id.parse().unwrap()).await.unwrap();
        assert!(record.is_escalated());
        let ticket = record.ticket.expect("ticket attached");
        assert!(response.reply.contains(&ticket.ticket_id.to_string()));
    }

    #[tokio::test]
    async fn buttons_carry_canonical_labels() {
        let provider = MockAiProvider::new()
            .with_response(CLASSIFY_POWER)
            .with_response(STEP_JSON);
        let f = fixture(provider);
        let opened = f.handler.handle(TurnRequest::default()).await.unwrap();
        let id = opened.conversation_id;

        for request in [
            button_turn(&id, "ACCEPT"),
            button_turn(&id, "LANG_EN"),
            text_turn(&id, "Ana"),
            button_turn(&id, "LEVEL_ADVANCED"),
            button_turn(&id, "DEVICE_NOTEBOOK"),
        ] {
            f.handler.handle(request).await.unwrap();
        }

        let response = f
            .handler
            .handle(text_turn(&id, "mi notebook no enciende"))
            .await
            .unwrap();
        assert_eq!(response.stage, Stage::DiagnosticStep);
        let labels: Vec<&str> = response.buttons.iter().map(|b| b.label.as_str()).collect();
        assert!(labels.contains(&"That fixed it"));
        assert!(labels.contains(&"Still not working"));
    }
}
