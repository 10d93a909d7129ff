//! End-to-end conversation flows through the turn handler, exercising
//! the file-backed stores and the mock completion provider together.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use mesa::adapters::{
    FileConversationStore, FileIdRegistry, FileSessionStore, MockAiProvider, MockError,
};
use mesa::application::handlers::{ProcessTurnHandler, TurnRequest};
use mesa::domain::conversation::{ButtonToken, ConversationStatus, EventRole, Stage};
use mesa::domain::engine::{Classifier, CoherenceMode, EscalationPolicy, StageMachine, StepGenerator};
use mesa::ports::{AiProvider, ConversationStore};

const CLASSIFY_POWER: &str = r#"{"intent": "power", "needs_clarification": false,
    "missing": [], "risk_level": "low", "confidence": 0.92}"#;
const CLASSIFY_VAGUE: &str = r#"{"intent": "unknown", "needs_clarification": true,
    "missing": ["device model"], "risk_level": "low", "confidence": 0.35}"#;
const STEP_JSON: &str = r#"{"reply": "Unplug the charger, wait ten seconds, plug it back in.",
    "buttons": [{"token": "RESOLVED"}, {"token": "NOT_RESOLVED"}, {"token": "NEED_HELP"}]}"#;

struct Harness {
    handler: ProcessTurnHandler,
    conversations: Arc<FileConversationStore>,
    _data_dir: TempDir,
}

fn harness(provider: MockAiProvider) -> Harness {
    let data_dir = TempDir::new().unwrap();
    let provider: Arc<dyn AiProvider> = Arc::new(provider);

    let machine = Arc::new(StageMachine::new(
        Classifier::new(provider.clone(), Duration::from_secs(5)),
        StepGenerator::new(provider, Duration::from_secs(5), CoherenceMode::Correct),
        EscalationPolicy::new("https://wa.me/5491100000000"),
        2,
        2,
    ));

    let conversations = Arc::new(FileConversationStore::new(
        data_dir.path().join("conversations"),
    ));
    let handler = ProcessTurnHandler::new(
        Arc::new(
            FileIdRegistry::new(data_dir.path().join("ids.txt"))
                .with_backoff_base(Duration::from_millis(2)),
        ),
        Arc::new(FileSessionStore::new(data_dir.path().join("sessions"))),
        conversations.clone(),
        machine,
        Duration::from_secs(30),
    );

    Harness {
        handler,
        conversations,
        _data_dir: data_dir,
    }
}

fn text(conversation_id: &str, body: &str) -> TurnRequest {
    TurnRequest {
        conversation_id: Some(conversation_id.to_string()),
        user_text: Some(body.to_string()),
        ..TurnRequest::default()
    }
}

fn button(conversation_id: &str, token: &str) -> TurnRequest {
    TurnRequest {
        conversation_id: Some(conversation_id.to_string()),
        button: Some(token.to_string()),
        ..TurnRequest::default()
    }
}

/// Walks a fresh conversation up to the problem prompt.
async fn advance_to_problem(h: &Harness) -> String {
    let opened = h.handler.handle(TurnRequest::default()).await.unwrap();
    let id = opened.conversation_id.clone();
    assert_eq!(opened.stage, Stage::AskConsent);

    for (request, expected) in [
        (button(&id, "ACCEPT"), Stage::AskLanguage),
        (button(&id, "LANG_ES_AR"), Stage::AskName),
        (text(&id, "Valeria"), Stage::AskUserLevel),
        (button(&id, "LEVEL_BASIC"), Stage::AskDevice),
        (button(&id, "DEVICE_NOTEBOOK"), Stage::AskProblem),
    ] {
        let response = h.handler.handle(request).await.unwrap();
        assert_eq!(response.stage, expected);
    }
    id
}

#[tokio::test]
async fn notebook_power_problem_resolves_end_to_end() {
    let h = harness(
        MockAiProvider::new()
            .with_response(CLASSIFY_POWER)
            .with_response(STEP_JSON),
    );
    let id = advance_to_problem(&h).await;

    // the concrete scenario: free text, no prior intent
    let step = h
        .handler
        .handle(text(&id, "mi notebook no enciende"))
        .await
        .unwrap();
    assert_eq!(step.stage, Stage::DiagnosticStep);
    assert!(!step.reply.is_empty());
    let diagnostic_tokens = [
        ButtonToken::Resolved,
        ButtonToken::NotResolved,
        ButtonToken::NeedHelp,
    ];
    for offered in &step.buttons {
        assert!(diagnostic_tokens.contains(&offered.token));
    }

    let feedback = h.handler.handle(button(&id, "RESOLVED")).await.unwrap();
    assert_eq!(feedback.stage, Stage::AskFeedback);

    let done = h.handler.handle(button(&id, "FEEDBACK_GOOD")).await.unwrap();
    assert_eq!(done.stage, Stage::Ended);
    assert!(done.end_conversation);

    // the durable record folded back from disk
    let record = h.conversations.load(&id.parse().unwrap()).await.unwrap();
    assert_eq!(record.status, ConversationStatus::Closed);
    assert!(record.ticket.is_none());
    assert!(record
        .transcript
        .iter()
        .any(|e| e.payload.starts_with("classifier_result:")));
    assert!(record.transcript.len() >= 10);

    // transcript ordering is monotonic by append time
    for pair in record.transcript.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[tokio::test]
async fn two_vague_descriptions_escalate_without_diagnosis() {
    let provider = MockAiProvider::new()
        .with_response(CLASSIFY_VAGUE)
        .with_response(CLASSIFY_VAGUE);
    let calls = provider.calls();
    let h = harness(provider);
    let id = advance_to_problem(&h).await;

    let first = h.handler.handle(text(&id, "it's broken")).await.unwrap();
    assert_eq!(first.stage, Stage::AskClarification);

    let second = h.handler.handle(text(&id, "still broken")).await.unwrap();
    assert_eq!(second.stage, Stage::Escalated);
    assert!(second.end_conversation);

    // two classifier calls and no generator call
    assert_eq!(calls.lock().unwrap().len(), 2);

    let record = h.conversations.load(&id.parse().unwrap()).await.unwrap();
    assert!(record.is_escalated());
    assert!(record.ticket.is_some());
}

#[tokio::test]
async fn llm_outage_still_yields_coherent_turns() {
    // classifier times out twice; the user still gets usable replies and
    // the conversation escalates instead of erroring
    let h = harness(
        MockAiProvider::new()
            .with_error(MockError::Timeout { timeout_secs: 12 })
            .with_error(MockError::Timeout { timeout_secs: 12 }),
    );
    let id = advance_to_problem(&h).await;

    let first = h.handler.handle(text(&id, "no enciende")).await.unwrap();
    assert_eq!(first.stage, Stage::AskClarification);
    assert!(!first.reply.is_empty());

    let second = h.handler.handle(text(&id, "sigue igual")).await.unwrap();
    assert_eq!(second.stage, Stage::Escalated);
    assert!(!second.reply.is_empty());
}

#[tokio::test]
async fn repeated_escalation_reuses_the_ticket() {
    let h = harness(
        MockAiProvider::new()
            .with_response(CLASSIFY_POWER)
            .with_response(STEP_JSON),
    );
    let id = advance_to_problem(&h).await;
    h.handler
        .handle(text(&id, "mi notebook no enciende"))
        .await
        .unwrap();

    let escalated = h.handler.handle(button(&id, "NEED_HELP")).await.unwrap();
    assert_eq!(escalated.stage, Stage::Escalated);
    let record = h.conversations.load(&id.parse().unwrap()).await.unwrap();
    let first_ticket = record.ticket.unwrap();

    // a later message on the escalated conversation references, never
    // regenerates, the ticket
    let follow_up = h.handler.handle(text(&id, "any news?")).await.unwrap();
    assert!(follow_up.reply.contains(&first_ticket.ticket_id.to_string()));

    let record = h.conversations.load(&id.parse().unwrap()).await.unwrap();
    assert_eq!(record.ticket.unwrap().ticket_id, first_ticket.ticket_id);
}

#[tokio::test]
async fn bot_events_always_carry_reply_and_catalog_buttons() {
    let h = harness(
        MockAiProvider::new()
            .with_response(CLASSIFY_POWER)
            .with_response(STEP_JSON)
            .with_response(STEP_JSON),
    );
    let id = advance_to_problem(&h).await;
    h.handler
        .handle(text(&id, "mi notebook no enciende"))
        .await
        .unwrap();
    h.handler.handle(button(&id, "NOT_RESOLVED")).await.unwrap();

    let record = h.conversations.load(&id.parse().unwrap()).await.unwrap();
    for event in record
        .transcript
        .iter()
        .filter(|e| matches!(e.role, EventRole::Bot))
    {
        assert!(!event.payload.trim().is_empty());
    }
}

#[tokio::test]
async fn declined_consent_closes_without_any_model_call() {
    let provider = MockAiProvider::new();
    let calls = provider.calls();
    let h = harness(provider);

    let opened = h.handler.handle(TurnRequest::default()).await.unwrap();
    let id = opened.conversation_id;
    let closed = h.handler.handle(button(&id, "DECLINE")).await.unwrap();

    assert_eq!(closed.stage, Stage::Ended);
    assert!(closed.end_conversation);
    assert!(calls.lock().unwrap().is_empty());

    let record = h.conversations.load(&id.parse().unwrap()).await.unwrap();
    assert_eq!(record.status, ConversationStatus::Closed);
}
