//! Conversation stages.
//!
//! A stage is a named position in the support-flow state machine. The early
//! identification stages resolve deterministically from catalog aliases;
//! the diagnosis stages are AI-governed. The transition table lives here,
//! on the enum, so the full graph is testable without driving the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Position of a conversation within the support flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Data-processing consent before anything else is asked.
    AskConsent,
    /// Interface language selection.
    AskLanguage,
    /// Optional name capture (the user may stay anonymous).
    AskName,
    /// Self-reported technical comfort level.
    AskUserLevel,
    /// Device category the problem is about.
    AskDevice,
    /// Free-form problem description; classification happens here.
    AskProblem,
    /// The classifier needed more information; loops with a counter.
    AskClarification,
    /// One-time acknowledgment of a medium/high-risk procedure.
    RiskAck,
    /// One diagnostic instruction per turn, generated by the model.
    DiagnosticStep,
    /// Closing rating after a resolved problem.
    AskFeedback,
    /// Conversation finished normally.
    Ended,
    /// Handed off to a human technician.
    Escalated,
}

impl Stage {
    /// Stages resolved by local alias matching; the completion service is
    /// never invoked here.
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            Self::AskConsent
                | Self::AskLanguage
                | Self::AskName
                | Self::AskUserLevel
                | Self::AskDevice
                | Self::RiskAck
                | Self::AskFeedback
        )
    }

    /// Stages whose inbound turn is sent to the classifier.
    pub fn invokes_classifier(&self) -> bool {
        matches!(self, Self::AskProblem | Self::AskClarification)
    }

    /// Stages whose bot reply is expected to carry at least one control.
    pub fn expects_controls(&self) -> bool {
        matches!(
            self,
            Self::AskConsent
                | Self::AskLanguage
                | Self::AskName
                | Self::AskUserLevel
                | Self::AskDevice
                | Self::RiskAck
                | Self::DiagnosticStep
                | Self::AskFeedback
        )
    }

    /// Wire name used in turn responses and stored events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskConsent => "ask_consent",
            Self::AskLanguage => "ask_language",
            Self::AskName => "ask_name",
            Self::AskUserLevel => "ask_user_level",
            Self::AskDevice => "ask_device",
            Self::AskProblem => "ask_problem",
            Self::AskClarification => "ask_clarification",
            Self::RiskAck => "risk_ack",
            Self::DiagnosticStep => "diagnostic_step",
            Self::AskFeedback => "ask_feedback",
            Self::Ended => "ended",
            Self::Escalated => "escalated",
        }
    }

    /// All stages, in flow order.
    pub fn all() -> [Stage; 12] {
        [
            Self::AskConsent,
            Self::AskLanguage,
            Self::AskName,
            Self::AskUserLevel,
            Self::AskDevice,
            Self::AskProblem,
            Self::AskClarification,
            Self::RiskAck,
            Self::DiagnosticStep,
            Self::AskFeedback,
            Self::Ended,
            Self::Escalated,
        ]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StateMachine for Stage {
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use Stage::*;
        match self {
            AskConsent => vec![AskLanguage, Ended],
            AskLanguage => vec![AskName],
            AskName => vec![AskUserLevel],
            AskUserLevel => vec![AskDevice],
            AskDevice => vec![AskProblem],
            AskProblem => vec![AskClarification, RiskAck, DiagnosticStep, Escalated],
            AskClarification => {
                vec![AskClarification, RiskAck, DiagnosticStep, Escalated]
            }
            RiskAck => vec![DiagnosticStep, Escalated],
            DiagnosticStep => vec![DiagnosticStep, AskFeedback, Escalated],
            AskFeedback => vec![Ended],
            Ended => vec![],
            Escalated => vec![],
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::AskConsent
    }
}
