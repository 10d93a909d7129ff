//! The conversation stage machine.
//!
//! Drives one inbound turn through the flow: deterministic stages resolve
//! locally against catalog aliases, the AI-governed stages call the
//! classifier and step generator, and the escalation policy takes over
//! when thresholds or risk force a handoff. Adapter fallbacks are valid
//! results; nothing in here lets an adapter failure crash a turn.

use crate::domain::conversation::catalog::{self, ButtonToken};
use crate::domain::conversation::{
    ConversationRecord, ConversationStatus, Event, Session, Stage, Ticket,
};
use crate::domain::foundation::StateMachine;

use super::classification::RiskLevel;
use super::classifier::Classifier;
use super::escalation::{EscalationPolicy, EscalationReason};
use super::step_generator::{StepGenerator, StepVerdict};

/// Longest stored summary of a generated step, fed back into later
/// prompts so the generator does not repeat itself.
const MAX_LAST_STEP: usize = 200;

/// One inbound user turn, already shaped by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: Option<String>,
    pub button: Option<ButtonToken>,
    pub image_ref: Option<String>,
}

impl TurnInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn button(token: ButtonToken) -> Self {
        Self {
            button: Some(token),
            ..Self::default()
        }
    }
}

/// Everything one turn produced: the user-facing reply, the events to
/// append, and any record-level changes for the caller to persist.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub stage: Stage,
    pub buttons: Vec<ButtonToken>,
    pub end_conversation: bool,
    pub new_events: Vec<Event>,
    pub status_change: Option<ConversationStatus>,
    /// Set only when this turn created a fresh ticket.
    pub new_ticket: Option<Ticket>,
}

/// Orchestrates stage transitions for one conversation at a time.
pub struct StageMachine {
    classifier: Classifier,
    generator: StepGenerator,
    escalation: EscalationPolicy,
    clarification_limit: u32,
    attempt_limit: u32,
    escalate_risk: RiskLevel,
}

impl StageMachine {
    pub fn new(
        classifier: Classifier,
        generator: StepGenerator,
        escalation: EscalationPolicy,
        clarification_limit: u32,
        attempt_limit: u32,
    ) -> Self {
        Self {
            classifier,
            generator,
            escalation,
            clarification_limit: clarification_limit.max(1),
            attempt_limit: attempt_limit.max(1),
            escalate_risk: RiskLevel::High,
        }
    }

    /// Classifications at or above this risk level hand off to a human
    /// without any diagnosis.
    pub fn with_escalate_risk(mut self, level: RiskLevel) -> Self {
        self.escalate_risk = level;
        self
    }

    /// The opening turn of a fresh conversation: greeting plus consent
    /// controls. No user event precedes it.
    pub fn greeting(&self, session: &Session) -> TurnOutcome {
        debug_assert_eq!(session.stage, Stage::AskConsent);
        self.respond(
            session,
            Vec::new(),
            "Hi! I'm your guided support assistant. Before we start I need your \
             consent to process what you tell me about your problem. Do you agree?"
                .to_string(),
            full_stage_controls(Stage::AskConsent),
            None,
            None,
        )
    }

    /// Advance a conversation by one inbound turn.
    pub async fn advance(
        &self,
        session: &mut Session,
        record: &ConversationRecord,
        input: &TurnInput,
    ) -> TurnOutcome {
        let mut events = Vec::new();
        record_user_event(&mut events, input);

        let token = resolved_token(session.stage, input);
        let text = input.text.as_deref().map(str::trim).unwrap_or("");

        match session.stage {
            Stage::AskConsent => self.on_consent(session, events, token),
            Stage::AskLanguage => self.on_language(session, events, token),
            Stage::AskName => self.on_name(session, events, token, text),
            Stage::AskUserLevel => self.on_user_level(session, events, token),
            Stage::AskDevice => self.on_device(session, events, token, text),
            Stage::AskProblem | Stage::AskClarification => {
                self.on_problem(session, record, events, text).await
            }
            Stage::RiskAck => self.on_risk_ack(session, record, events, token, text).await,
            Stage::DiagnosticStep => self.on_diagnostic(session, record, events, token, text).await,
            Stage::AskFeedback => self.on_feedback(session, events, token),
            Stage::Ended | Stage::Escalated => self.on_terminal(session, record, events),
        }
    }

    // ---- deterministic stages ------------------------------------------

    fn on_consent(
        &self,
        session: &mut Session,
        mut events: Vec<Event>,
        token: Option<ButtonToken>,
    ) -> TurnOutcome {
        match token {
            Some(ButtonToken::Accept) => {
                transition(session, &mut events, Stage::AskLanguage);
                self.respond(
                    session,
                    events,
                    "Great. Which language would you like to continue in?".to_string(),
                    full_stage_controls(Stage::AskLanguage),
                    None,
                    None,
                )
            }
            Some(ButtonToken::Decline) => {
                transition(session, &mut events, Stage::Ended);
                self.respond(
                    session,
                    events,
                    "Understood, nothing was stored. Come back any time you need help."
                        .to_string(),
                    Vec::new(),
                    Some(ConversationStatus::Closed),
                    None,
                )
            }
            _ => self.respond(
                session,
                events,
                "I need your consent before we continue. Do you agree to me processing \
                 your problem description?"
                    .to_string(),
                full_stage_controls(Stage::AskConsent),
                None,
                None,
            ),
        }
    }

    fn on_language(
        &self,
        session: &mut Session,
        mut events: Vec<Event>,
        token: Option<ButtonToken>,
    ) -> TurnOutcome {
        let language = match token {
            Some(ButtonToken::LangEsAr) => Some("es-AR"),
            Some(ButtonToken::LangEsEs) => Some("es-ES"),
            Some(ButtonToken::LangEn) => Some("en"),
            _ => None,
        };
        match language {
            Some(language) => {
                session.language = Some(language.to_string());
                transition(session, &mut events, Stage::AskName);
                self.respond(
                    session,
                    events,
                    "What's your name? You can also stay anonymous.".to_string(),
                    full_stage_controls(Stage::AskName),
                    None,
                    None,
                )
            }
            None => self.respond(
                session,
                events,
                "Please pick one of the available languages.".to_string(),
                full_stage_controls(Stage::AskLanguage),
                None,
                None,
            ),
        }
    }

    fn on_name(
        &self,
        session: &mut Session,
        mut events: Vec<Event>,
        token: Option<ButtonToken>,
        text: &str,
    ) -> TurnOutcome {
        if token == Some(ButtonToken::NoName) {
            // stays anonymous
        } else if !text.is_empty() {
            session.name = Some(text.chars().take(60).collect());
        } else {
            return self.respond(
                session,
                events,
                "Tell me your name, or skip this step.".to_string(),
                full_stage_controls(Stage::AskName),
                None,
                None,
            );
        }
        transition(session, &mut events, Stage::AskUserLevel);
        self.respond(
            session,
            events,
            "How comfortable are you with technical steps?".to_string(),
            full_stage_controls(Stage::AskUserLevel),
            None,
            None,
        )
    }

    fn on_user_level(
        &self,
        session: &mut Session,
        mut events: Vec<Event>,
        token: Option<ButtonToken>,
    ) -> TurnOutcome {
        let level = match token {
            Some(ButtonToken::LevelBasic) => Some("basic"),
            Some(ButtonToken::LevelIntermediate) => Some("intermediate"),
            Some(ButtonToken::LevelAdvanced) => Some("advanced"),
            _ => None,
        };
        match level {
            Some(level) => {
                session.user_level = Some(level.to_string());
                transition(session, &mut events, Stage::AskDevice);
                self.respond(
                    session,
                    events,
                    "What kind of device is this about?".to_string(),
                    full_stage_controls(Stage::AskDevice),
                    None,
                    None,
                )
            }
            None => self.respond(
                session,
                events,
                "Pick the option that fits you best.".to_string(),
                full_stage_controls(Stage::AskUserLevel),
                None,
                None,
            ),
        }
    }

    fn on_device(
        &self,
        session: &mut Session,
        mut events: Vec<Event>,
        token: Option<ButtonToken>,
        text: &str,
    ) -> TurnOutcome {
        match token {
            Some(token) => {
                let device = if text.is_empty() {
                    catalog::label_for(Stage::AskDevice, token).to_string()
                } else {
                    text.to_string()
                };
                session.set_context("device", device);
                transition(session, &mut events, Stage::AskProblem);
                self.respond(
                    session,
                    events,
                    "Describe the problem in your own words. What is happening?".to_string(),
                    Vec::new(),
                    None,
                    None,
                )
            }
            None => self.respond(
                session,
                events,
                "Which device are we talking about?".to_string(),
                full_stage_controls(Stage::AskDevice),
                None,
                None,
            ),
        }
    }

    fn on_feedback(
        &self,
        session: &mut Session,
        mut events: Vec<Event>,
        token: Option<ButtonToken>,
    ) -> TurnOutcome {
        match token {
            Some(ButtonToken::FeedbackGood) | Some(ButtonToken::FeedbackBad) => {
                session.set_context(
                    "feedback",
                    token.map(|t| t.as_str().to_string()).unwrap_or_default(),
                );
                transition(session, &mut events, Stage::Ended);
                self.respond(
                    session,
                    events,
                    "Thanks for the feedback. Glad to help — come back any time!".to_string(),
                    Vec::new(),
                    Some(ConversationStatus::Closed),
                    None,
                )
            }
            _ => self.respond(
                session,
                events,
                "One last thing: how did this conversation go?".to_string(),
                full_stage_controls(Stage::AskFeedback),
                None,
                None,
            ),
        }
    }

    fn on_terminal(
        &self,
        session: &Session,
        record: &ConversationRecord,
        events: Vec<Event>,
    ) -> TurnOutcome {
        let reply = match (&session.stage, &record.ticket) {
            (Stage::Escalated, Some(ticket)) => format!(
                "This conversation was handed to a technician. Your reference is {} — \
                 you can reach the team here: {}",
                ticket.ticket_id, ticket.handoff_link
            ),
            _ => "This conversation has ended. Start a new one whenever you need help."
                .to_string(),
        };
        self.respond(session, events, reply, Vec::new(), None, None)
    }

    // ---- AI-governed stages --------------------------------------------

    async fn on_problem(
        &self,
        session: &mut Session,
        record: &ConversationRecord,
        mut events: Vec<Event>,
        text: &str,
    ) -> TurnOutcome {
        if text.is_empty() {
            return self.respond(
                session,
                events,
                "Tell me a bit more about what's going on, in your own words.".to_string(),
                Vec::new(),
                None,
                None,
            );
        }

        accumulate_context(session, "problem", text);

        let verdict = self.classifier.classify(session, text).await;
        let judgment = verdict.judgment().clone();
        events.push(Event::marker(
            "classifier_result",
            serde_json::json!({
                "intent": judgment.intent,
                "needs_clarification": judgment.needs_clarification,
                "missing": judgment.missing,
                "risk_level": judgment.risk_level,
                "confidence": judgment.confidence,
                "fallback": verdict.is_fallback(),
            })
            .to_string(),
        ));
        session.set_context("intent", judgment.intent.as_str());

        if judgment.needs_clarification {
            let rounds = session.record_clarification();
            if rounds >= self.clarification_limit {
                return self.escalate(
                    session,
                    record,
                    events,
                    EscalationReason::ClarificationLimit,
                );
            }
            transition(session, &mut events, Stage::AskClarification);
            let reply = if judgment.missing.is_empty() {
                "I want to make sure I understand. Can you describe what happens in a \
                 little more detail — any lights, sounds, or error messages?"
                    .to_string()
            } else {
                format!(
                    "To narrow this down I still need to know: {}. Can you tell me more?",
                    judgment.missing.join(", ")
                )
            };
            return self.respond(session, events, reply, Vec::new(), None, None);
        }

        if judgment.risk_level >= self.escalate_risk {
            return self.escalate(session, record, events, EscalationReason::HighRisk);
        }

        if judgment.risk_level.requires_acknowledgment() && !session.risk_acknowledged {
            transition(session, &mut events, Stage::RiskAck);
            return self.respond(
                session,
                events,
                "Heads up: the next steps may involve checks that can affect your data \
                 or hardware if done carelessly. Follow each instruction exactly and \
                 stop if anything feels off. Ready to continue?"
                    .to_string(),
                full_stage_controls(Stage::RiskAck),
                None,
                None,
            );
        }

        self.run_generator(session, events).await
    }

    async fn on_risk_ack(
        &self,
        session: &mut Session,
        record: &ConversationRecord,
        events: Vec<Event>,
        token: Option<ButtonToken>,
        text: &str,
    ) -> TurnOutcome {
        if token == Some(ButtonToken::RiskUnderstood) {
            session.acknowledge_risk();
            return self.run_generator(session, events).await;
        }
        // an explicit refusal goes to a human instead of looping
        if catalog::match_value(Stage::AskConsent, text) == Some(ButtonToken::Decline) {
            return self.escalate(session, record, events, EscalationReason::RiskDeclined);
        }
        self.respond(
            session,
            events,
            "Please confirm you've read the warning so we can continue.".to_string(),
            full_stage_controls(Stage::RiskAck),
            None,
            None,
        )
    }

    async fn on_diagnostic(
        &self,
        session: &mut Session,
        record: &ConversationRecord,
        events: Vec<Event>,
        token: Option<ButtonToken>,
        text: &str,
    ) -> TurnOutcome {
        match token {
            Some(ButtonToken::Resolved) => {
                let mut events = events;
                transition(session, &mut events, Stage::AskFeedback);
                self.respond(
                    session,
                    events,
                    "Excellent! Before you go: how did this conversation go?".to_string(),
                    full_stage_controls(Stage::AskFeedback),
                    None,
                    None,
                )
            }
            Some(ButtonToken::NotResolved) => {
                let attempts = session.record_attempt();
                if attempts >= self.attempt_limit {
                    return self.escalate(
                        session,
                        record,
                        events,
                        EscalationReason::DiagnosticLimit,
                    );
                }
                self.run_generator(session, events).await
            }
            Some(ButtonToken::NeedHelp) => {
                self.escalate(session, record, events, EscalationReason::UserRequested)
            }
            _ => {
                // free-form detail during diagnosis feeds the next step
                if !text.is_empty() {
                    accumulate_context(session, "problem", text);
                }
                self.run_generator(session, events).await
            }
        }
    }

    /// Invokes the step generator and lands the session on
    /// `DiagnosticStep` with the validated plan.
    async fn run_generator(&self, session: &mut Session, mut events: Vec<Event>) -> TurnOutcome {
        let allowed = catalog::allowed_tokens(Stage::DiagnosticStep);
        let verdict = self.generator.next_step(session, &allowed).await;

        if let StepVerdict::Fallback { reason, .. } = &verdict {
            events.push(Event::marker("generator_fallback", reason.to_string()));
        }
        let plan = verdict.plan().clone();

        if session.stage != Stage::DiagnosticStep {
            transition(session, &mut events, Stage::DiagnosticStep);
        }
        let summary: String = plan.reply.chars().take(MAX_LAST_STEP).collect();
        session.set_context("last_step", summary);

        self.respond(session, events, plan.reply, plan.buttons, None, None)
    }

    /// Hands the conversation to a human: ticket, terminal event, status.
    fn escalate(
        &self,
        session: &mut Session,
        record: &ConversationRecord,
        mut events: Vec<Event>,
        reason: EscalationReason,
    ) -> TurnOutcome {
        let ticket = self.escalation.escalate(session, record, reason);
        let is_new = record.ticket.is_none();

        if session.stage != Stage::Escalated {
            transition(session, &mut events, Stage::Escalated);
        }
        events.push(Event::marker(
            "escalated",
            format!("reason: {}; ticket: {}", reason, ticket.ticket_id),
        ));

        let reply = format!(
            "I'm handing this over to a technician ({}). Your reference is {}. \
             You can reach the team directly here: {}",
            reason, ticket.ticket_id, ticket.handoff_link
        );
        self.respond(
            session,
            events,
            reply,
            Vec::new(),
            if is_new {
                Some(ConversationStatus::Escalated)
            } else {
                None
            },
            is_new.then_some(ticket),
        )
    }

    /// Final gate for every outgoing turn: buttons are filtered against
    /// the catalog entry for the resulting stage and the bot event is
    /// validated before it is recorded.
    fn respond(
        &self,
        session: &Session,
        mut events: Vec<Event>,
        reply: String,
        buttons: Vec<ButtonToken>,
        status_change: Option<ConversationStatus>,
        new_ticket: Option<Ticket>,
    ) -> TurnOutcome {
        let stage = session.stage;
        let allowed = catalog::allowed_tokens(stage);
        let buttons: Vec<ButtonToken> = buttons
            .into_iter()
            .filter(|t| allowed.contains(t))
            .collect();

        let reply = if reply.trim().is_empty() {
            tracing::error!(stage = %stage, "empty reply reached the response gate");
            "Let's try that again.".to_string()
        } else {
            reply
        };

        let bot_event = Event::bot(reply.clone(), buttons.clone());
        if let Err(err) = bot_event.validate_bot_event(stage) {
            tracing::error!(stage = %stage, error = %err, "bot event failed validation");
        }
        events.push(bot_event);

        TurnOutcome {
            reply,
            stage,
            buttons,
            end_conversation: stage.is_terminal(),
            new_events: events,
            status_change,
            new_ticket,
        }
    }
}

/// The full ordered control set of a stage.
fn full_stage_controls(stage: Stage) -> Vec<ButtonToken> {
    catalog::allowed_tokens(stage)
}

/// Resolves the effective token for a turn: an explicit button press, or
/// an alias match for deterministic stages.
fn resolved_token(stage: Stage, input: &TurnInput) -> Option<ButtonToken> {
    if let Some(token) = input.button {
        return Some(token);
    }
    let text = input.text.as_deref()?;
    catalog::match_value(stage, text)
}

fn record_user_event(events: &mut Vec<Event>, input: &TurnInput) {
    if let Some(token) = input.button {
        events.push(Event::user_button(token));
    } else if let Some(text) = &input.text {
        if !text.trim().is_empty() {
            events.push(Event::user_text(text.trim()));
        }
    }
    if let Some(image) = &input.image_ref {
        events.push(Event::marker("image_attached", image.clone()));
    }
}

/// Validated stage change plus its transcript marker.
fn transition(session: &mut Session, events: &mut Vec<Event>, to: Stage) {
    match session.stage.transition_to(to) {
        Ok(next) => {
            events.push(Event::marker(
                "stage_changed",
                format!("{} -> {}", session.stage, next),
            ));
            session.stage = next;
        }
        Err(err) => {
            tracing::error!(error = %err, "refusing invalid stage transition");
        }
    }
}

/// Appends to an additive context key instead of overwriting it.
fn accumulate_context(session: &mut Session, key: &str, value: &str) {
    let merged = match session.context(key) {
        Some(existing) => format!("{}; {}", existing, value),
        None => value.to_string(),
    };
    session.set_context(key, merged);
}
