//! Step generator adapter.
//!
//! One completion call that turns accumulated context into exactly one
//! next diagnostic instruction plus a constrained button set. Call
//! discipline matches the classifier: bounded prompt, hard deadline,
//! strict parsing, deterministic fallback. The single-step and
//! button-containment rules are enforced here regardless of what the
//! prompt asked the model to do.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::classifier::extract_json_object;
use super::failure::AdapterFailure;
use super::step::{
    check_coherence, enforce_single_step, filter_buttons, CoherenceMode, RawStepPlan, StepPlan,
};
use crate::domain::conversation::catalog::ButtonToken;
use crate::domain::conversation::{Session, Stage};
use crate::ports::{AiError, AiProvider, CompletionRequest, MessageRole, RequestMetadata};

/// Tagged generator result; the plan is always usable.
#[derive(Debug, Clone, PartialEq)]
pub enum StepVerdict {
    Valid(StepPlan),
    Fallback {
        plan: StepPlan,
        reason: AdapterFailure,
    },
}

impl StepVerdict {
    pub fn plan(&self) -> &StepPlan {
        match self {
            Self::Valid(plan) => plan,
            Self::Fallback { plan, .. } => plan,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Completion-call adapter producing validated [`StepPlan`]s.
pub struct StepGenerator {
    provider: Arc<dyn AiProvider>,
    timeout: Duration,
    coherence: CoherenceMode,
    max_tokens: u32,
}

impl StepGenerator {
    pub fn new(provider: Arc<dyn AiProvider>, timeout: Duration, coherence: CoherenceMode) -> Self {
        Self {
            provider,
            timeout,
            coherence,
            max_tokens: 512,
        }
    }

    /// Produce the next diagnostic step for a session.
    ///
    /// Never fails: every failure mode degrades to the deterministic
    /// fallback plan for the stage.
    pub async fn next_step(&self, session: &Session, allowed: &[ButtonToken]) -> StepVerdict {
        let request = self.build_request(session, allowed);

        let response = match tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
        {
            Err(_) => {
                let err = AiError::Timeout {
                    timeout_secs: self.timeout.as_secs() as u32,
                };
                tracing::warn!(conversation = %session.conversation_id, error = %err,
                    "step generation abandoned, using fallback step");
                return self.fallback(err.into());
            }
            Ok(Err(err)) => {
                tracing::warn!(conversation = %session.conversation_id, error = %err,
                    "step generation failed, using fallback step");
                return self.fallback(err.into());
            }
            Ok(Ok(response)) => response,
        };

        match self.validate(&response.content, allowed) {
            Ok(plan) => StepVerdict::Valid(plan),
            Err(failure) => {
                tracing::warn!(conversation = %session.conversation_id, failure = %failure,
                    "step generator output rejected, using fallback step");
                self.fallback(failure)
            }
        }
    }

    fn fallback(&self, reason: AdapterFailure) -> StepVerdict {
        StepVerdict::Fallback {
            plan: StepPlan::fallback(Stage::DiagnosticStep),
            reason,
        }
    }

    /// Parses the model response, then applies the anti-hallucination
    /// pipeline: single-step cut, token filter, canonical substitution,
    /// coherence check.
    fn validate(&self, content: &str, allowed: &[ButtonToken]) -> Result<StepPlan, AdapterFailure> {
        let document = extract_json_object(content)
            .ok_or_else(|| AdapterFailure::parse("no JSON object in response"))?;
        let raw: RawStepPlan =
            serde_json::from_str(document).map_err(|e| AdapterFailure::parse(e.to_string()))?;

        let reply = raw
            .reply
            .ok_or_else(|| AdapterFailure::schema("missing required field 'reply'"))?;
        let reply = enforce_single_step(&reply);
        if reply.is_empty() {
            return Err(AdapterFailure::schema("reply is empty after trimming"));
        }

        let mut buttons = filter_buttons(&raw.buttons, allowed);
        if buttons.is_empty() && Stage::DiagnosticStep.expects_controls() {
            buttons = StepPlan::fallback(Stage::DiagnosticStep).buttons;
        }

        Ok(check_coherence(
            StepPlan { reply, buttons },
            Stage::DiagnosticStep,
            self.coherence,
        ))
    }

    fn build_request(&self, session: &Session, allowed: &[ButtonToken]) -> CompletionRequest {
        let metadata = RequestMetadata::new(
            session.conversation_id.clone(),
            Uuid::new_v4().to_string(),
        );

        let tokens: Vec<&str> = allowed.iter().map(ButtonToken::as_str).collect();
        let system = format!(
            "You are the diagnostic guide of a technical-support assistant. Propose \
             EXACTLY ONE next step the user should try now; never list several steps. \
             Keep the instruction short and concrete, matched to the user's level. \
             Respond with a single JSON object and nothing else: \
             {{\"reply\": the instruction, \"buttons\": [{{\"token\": one of [{}], \
             \"label\": short label}}]}}. Only use the listed tokens.",
            tokens.join(", ")
        );

        let mut lines = Vec::new();
        if let Some(language) = &session.language {
            lines.push(format!("Answer in language: {}", language));
        }
        if let Some(level) = &session.user_level {
            lines.push(format!("User level: {}", level));
        }
        for key in ["device", "problem", "intent", "last_step"] {
            if let Some(value) = session.context(key) {
                lines.push(format!("{}: {}", key, value));
            }
        }
        if session.diagnostic_attempts > 0 {
            lines.push(format!(
                "Previous steps tried and failed: {}. Do not repeat them.",
                session.diagnostic_attempts
            ));
        }
        lines.push("Produce the next single diagnostic step.".to_string());

        CompletionRequest::new(metadata)
            .with_system_prompt(system)
            .with_message(MessageRole::User, lines.join("\n"))
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.3)
    }
}
