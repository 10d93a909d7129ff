//! Classifier adapter.
//!
//! One completion call that turns free-form user text into a structured
//! intent/risk/missing-info judgment. The prompt is built from session
//! context fields only, never the transcript, and the call is bounded by
//! a hard deadline. Every failure mode collapses into the deterministic
//! fallback judgment; the raw error never reaches the user.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use super::classification::{Classification, ClassifierVerdict, Intent, RiskLevel};
use super::failure::AdapterFailure;
use crate::domain::conversation::Session;
use crate::ports::{AiError, AiProvider, CompletionRequest, MessageRole, RequestMetadata};

/// Longest slice of the user's message forwarded to the model.
const MAX_USER_TEXT: usize = 600;

/// Completion-call adapter producing [`ClassifierVerdict`]s.
pub struct Classifier {
    provider: Arc<dyn AiProvider>,
    timeout: Duration,
    max_tokens: u32,
}

impl Classifier {
    pub fn new(provider: Arc<dyn AiProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            max_tokens: 256,
        }
    }

    /// Classify one user message in the context of a session.
    ///
    /// Never fails: transport, parse, and schema errors all degrade to
    /// `ClassifierVerdict::Fallback`.
    pub async fn classify(&self, session: &Session, user_text: &str) -> ClassifierVerdict {
        let request = self.build_request(session, user_text);

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
        {
            Err(_) => {
                let err = AiError::Timeout {
                    timeout_secs: self.timeout.as_secs() as u32,
                };
                tracing::warn!(conversation = %session.conversation_id, error = %err,
                    "classifier call abandoned, using fallback judgment");
                return ClassifierVerdict::fallback(err.into());
            }
            Ok(Err(err)) => {
                tracing::warn!(conversation = %session.conversation_id, error = %err,
                    "classifier call failed, using fallback judgment");
                return ClassifierVerdict::fallback(err.into());
            }
            Ok(Ok(response)) => response,
        };

        match parse_classification(&response.content) {
            Ok(classification) => ClassifierVerdict::Valid(classification),
            Err(failure) => {
                tracing::warn!(conversation = %session.conversation_id, failure = %failure,
                    "classifier output rejected, using fallback judgment");
                ClassifierVerdict::fallback(failure)
            }
        }
    }

    fn build_request(&self, session: &Session, user_text: &str) -> CompletionRequest {
        let metadata = RequestMetadata::new(
            session.conversation_id.clone(),
            Uuid::new_v4().to_string(),
        );

        let intents: Vec<&str> = Intent::all().iter().map(Intent::as_str).collect();
        let system = format!(
            "You are the triage classifier of a guided technical-support assistant. \
             Read the user's message and judge it. Respond with a single JSON object and \
             nothing else, using exactly these fields: \
             {{\"intent\": one of [{}], \"needs_clarification\": true|false, \
             \"missing\": [names of facts still needed, may be empty], \
             \"risk_level\": \"low\"|\"medium\"|\"high\", \"confidence\": number in [0,1]}}. \
             Set needs_clarification when the message is too vague to start diagnosis. \
             Set risk_level above low only when the likely next steps involve opening \
             hardware, electrical checks, or data loss.",
            intents.join(", ")
        );

        let mut context_lines = Vec::new();
        if let Some(language) = &session.language {
            context_lines.push(format!("Language: {}", language));
        }
        if let Some(level) = &session.user_level {
            context_lines.push(format!("User level: {}", level));
        }
        for key in ["device", "problem", "last_step"] {
            if let Some(value) = session.context(key) {
                context_lines.push(format!("{}: {}", key, value));
            }
        }
        context_lines.push(format!("Message: {}", truncate(user_text, MAX_USER_TEXT)));

        CompletionRequest::new(metadata)
            .with_system_prompt(system)
            .with_message(MessageRole::User, context_lines.join("\n"))
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.0)
    }
}

/// Cuts `text` at a character boundary at or below `max` bytes.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Wire shape of the classifier's structured output. Every field is
/// optional here so missing fields surface as schema errors, not parse
/// errors.
#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: Option<String>,
    needs_clarification: Option<bool>,
    #[serde(default)]
    missing: Vec<String>,
    risk_level: Option<String>,
    confidence: Option<f32>,
}

/// Parses and schema-validates a model response into a classification.
fn parse_classification(content: &str) -> Result<Classification, AdapterFailure> {
    let document = extract_json_object(content)
        .ok_or_else(|| AdapterFailure::parse("no JSON object in response"))?;

    let raw: RawClassification = serde_json::from_str(document)
        .map_err(|e| AdapterFailure::parse(e.to_string()))?;

    let intent_str = raw
        .intent
        .ok_or_else(|| AdapterFailure::schema("missing required field 'intent'"))?;
    let intent: Intent = intent_str
        .parse()
        .map_err(|_| AdapterFailure::schema(format!("'{}' is not a declared intent", intent_str)))?;

    let needs_clarification = raw
        .needs_clarification
        .ok_or_else(|| AdapterFailure::schema("missing required field 'needs_clarification'"))?;

    let risk_str = raw
        .risk_level
        .ok_or_else(|| AdapterFailure::schema("missing required field 'risk_level'"))?;
    let risk_level: RiskLevel = risk_str.parse().map_err(|_| {
        AdapterFailure::schema(format!("'{}' is not a declared risk level", risk_str))
    })?;

    let confidence = raw
        .confidence
        .ok_or_else(|| AdapterFailure::schema("missing required field 'confidence'"))?;

    let classification = Classification {
        intent,
        needs_clarification,
        missing: raw.missing,
        risk_level,
        confidence,
    };
    classification
        .validate()
        .map_err(|e| AdapterFailure::schema(e.to_string()))?;

    Ok(classification)
}

/// Finds the first balanced JSON object in a model response, tolerating
/// prose or code fences around it.
pub(crate) fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&content[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MockAiProvider, MockError};
    use crate::domain::foundation::ConversationId;

    fn test_session() -> Session {
        let mut session = Session::new(ConversationId::new("X7K2M9").unwrap());
        session.language = Some("es".to_string());
        session.user_level = Some("basic".to_string());
        session.set_context("device", "notebook");
        session
    }

    fn classifier(provider: MockAiProvider) -> Classifier {
        Classifier::new(Arc::new(provider), Duration::from_secs(5))
    }

    const GOOD_JSON: &str = r#"{"intent": "power", "needs_clarification": false,
        "missing": [], "risk_level": "low", "confidence": 0.92}"#;

    #[tokio::test]
    async fn valid_response_yields_valid_verdict() {
        let provider = MockAiProvider::new().with_response(GOOD_JSON);
        let verdict = classifier(provider)
            .classify(&test_session(), "mi notebook no enciende")
            .await;

        assert!(!verdict.is_fallback());
        let judgment = verdict.judgment();
        assert_eq!(judgment.intent, Intent::Power);
        assert!(!judgment.needs_clarification);
        assert_eq!(judgment.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn fenced_json_is_still_parsed() {
        let fenced = format!("Sure! Here is the classification:\n```json\n{}\n```", GOOD_JSON);
        let provider = MockAiProvider::new().with_response(fenced);
        let verdict = classifier(provider)
            .classify(&test_session(), "mi notebook no enciende")
            .await;
        assert!(!verdict.is_fallback());
    }

    #[tokio::test]
    async fn malformed_json_falls_back_deterministically() {
        let provider = MockAiProvider::new().with_response("the intent is probably power");
        let verdict = classifier(provider)
            .classify(&test_session(), "no enciende")
            .await;

        assert!(verdict.is_fallback());
        assert_eq!(verdict.judgment(), &Classification::fallback());
        assert!(matches!(
            verdict,
            ClassifierVerdict::Fallback { reason: AdapterFailure::Parse(_), .. }
        ));
    }

    #[tokio::test]
    async fn missing_field_is_a_schema_failure() {
        let provider = MockAiProvider::new()
            .with_response(r#"{"intent": "power", "needs_clarification": false}"#);
        let verdict = classifier(provider).classify(&test_session(), "x").await;
        assert!(matches!(
            verdict,
            ClassifierVerdict::Fallback { reason: AdapterFailure::Schema(_), .. }
        ));
    }

    #[tokio::test]
    async fn out_of_enum_intent_is_a_schema_failure() {
        let provider = MockAiProvider::new().with_response(
            r#"{"intent": "quantum", "needs_clarification": false,
                "missing": [], "risk_level": "low", "confidence": 0.9}"#,
        );
        let verdict = classifier(provider).classify(&test_session(), "x").await;
        assert!(matches!(
            verdict,
            ClassifierVerdict::Fallback { reason: AdapterFailure::Schema(_), .. }
        ));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_a_schema_failure() {
        let provider = MockAiProvider::new().with_response(
            r#"{"intent": "power", "needs_clarification": false,
                "missing": [], "risk_level": "low", "confidence": 7.5}"#,
        );
        let verdict = classifier(provider).classify(&test_session(), "x").await;
        assert!(matches!(
            verdict,
            ClassifierVerdict::Fallback { reason: AdapterFailure::Schema(_), .. }
        ));
    }

    #[tokio::test]
    async fn provider_error_is_a_transport_failure() {
        let provider = MockAiProvider::new().with_error(MockError::Unavailable {
            message: "overloaded".to_string(),
        });
        let verdict = classifier(provider).classify(&test_session(), "x").await;
        assert!(matches!(
            verdict,
            ClassifierVerdict::Fallback { reason: AdapterFailure::Transport(_), .. }
        ));
    }

    #[tokio::test]
    async fn slow_provider_hits_the_deadline() {
        let provider = MockAiProvider::new()
            .with_response(GOOD_JSON)
            .with_delay(Duration::from_millis(200));
        let classifier = Classifier::new(Arc::new(provider), Duration::from_millis(20));
        let verdict = classifier.classify(&test_session(), "x").await;

        assert!(verdict.is_fallback());
        assert_eq!(verdict.judgment(), &Classification::fallback());
    }

    #[tokio::test]
    async fn prompt_carries_context_fields_not_transcript() {
        let provider = MockAiProvider::new().with_response(GOOD_JSON);
        let calls = provider.calls();
        classifier(provider)
            .classify(&test_session(), "mi notebook no enciende")
            .await;

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let body = &recorded[0].messages[0].content;
        assert!(body.contains("device: notebook"));
        assert!(body.contains("User level: basic"));
        assert!(body.contains("mi notebook no enciende"));
    }

    #[tokio::test]
    async fn long_messages_are_truncated() {
        let provider = MockAiProvider::new().with_response(GOOD_JSON);
        let calls = provider.calls();
        let long_text = "á".repeat(2000);
        classifier(provider).classify(&test_session(), &long_text).await;

        let recorded = calls.lock().unwrap();
        let body = &recorded[0].messages[0].content;
        assert!(body.len() < 1000);
    }

    #[test]
    fn extract_json_object_handles_nesting_and_strings() {
        let content = r#"prefix {"a": {"b": "with } brace"}, "c": 1} suffix"#;
        let doc = extract_json_object(content).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(doc).unwrap();
        assert_eq!(parsed["c"], 1);
    }

    #[test]
    fn extract_json_object_returns_none_without_object() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{unclosed").is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "ááá";
        let cut = truncate(text, 3);
        assert!(cut.len() <= 3);
        assert!(text.starts_with(cut));
    }
}
