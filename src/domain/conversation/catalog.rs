//! Affordance catalog.
//!
//! The single source of truth for every control a user may ever see. Each
//! stage maps to an ordered list of entries; every other component filters
//! through [`allowed_for`] and no component may synthesize a token that is
//! not present here. Tokens are stable once published.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::stage::Stage;
use crate::domain::foundation::ValidationError;

/// Opaque, stable identifier for a user-selectable control.
///
/// The wire form is SCREAMING_SNAKE_CASE; parsing is closed, so a model
/// response carrying an unknown token simply fails to parse and is
/// dropped by the anti-hallucination filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonToken {
    Accept,
    Decline,
    LangEsAr,
    LangEsEs,
    LangEn,
    NoName,
    LevelBasic,
    LevelIntermediate,
    LevelAdvanced,
    DeviceNotebook,
    DeviceDesktop,
    DeviceNetwork,
    DeviceOther,
    RiskUnderstood,
    Resolved,
    NotResolved,
    NeedHelp,
    FeedbackGood,
    FeedbackBad,
}

impl ButtonToken {
    /// Wire form of the token.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Decline => "DECLINE",
            Self::LangEsAr => "LANG_ES_AR",
            Self::LangEsEs => "LANG_ES_ES",
            Self::LangEn => "LANG_EN",
            Self::NoName => "NO_NAME",
            Self::LevelBasic => "LEVEL_BASIC",
            Self::LevelIntermediate => "LEVEL_INTERMEDIATE",
            Self::LevelAdvanced => "LEVEL_ADVANCED",
            Self::DeviceNotebook => "DEVICE_NOTEBOOK",
            Self::DeviceDesktop => "DEVICE_DESKTOP",
            Self::DeviceNetwork => "DEVICE_NETWORK",
            Self::DeviceOther => "DEVICE_OTHER",
            Self::RiskUnderstood => "RISK_UNDERSTOOD",
            Self::Resolved => "RESOLVED",
            Self::NotResolved => "NOT_RESOLVED",
            Self::NeedHelp => "NEED_HELP",
            Self::FeedbackGood => "FEEDBACK_GOOD",
            Self::FeedbackBad => "FEEDBACK_BAD",
        }
    }
}

impl fmt::Display for ButtonToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ButtonToken {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| {
            ValidationError::invalid_format("button_token", format!("unknown token '{}'", s))
        })
    }
}

/// A catalog entry: token, canonical label, and the free-text aliases that
/// resolve to it during deterministic stage matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffordanceEntry {
    pub token: ButtonToken,
    pub label: &'static str,
    pub aliases: &'static [&'static str],
}

impl AffordanceEntry {
    const fn new(
        token: ButtonToken,
        label: &'static str,
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            token,
            label,
            aliases,
        }
    }
}

static CONSENT: &[AffordanceEntry] = &[
    AffordanceEntry::new(
        ButtonToken::Accept,
        "I agree",
        &["yes", "si", "sí", "acepto", "accept", "agree", "ok", "dale"],
    ),
    AffordanceEntry::new(
        ButtonToken::Decline,
        "No, thanks",
        &["no", "decline", "no acepto", "nope"],
    ),
];

static LANGUAGE: &[AffordanceEntry] = &[
    AffordanceEntry::new(
        ButtonToken::LangEsAr,
        "Español (Argentina)",
        &["es-ar", "argentina", "castellano"],
    ),
    AffordanceEntry::new(
        ButtonToken::LangEsEs,
        "Español (España)",
        &["es-es", "español", "espanol", "spanish"],
    ),
    AffordanceEntry::new(ButtonToken::LangEn, "English", &["en", "english", "ingles", "inglés"]),
];

static NAME: &[AffordanceEntry] = &[AffordanceEntry::new(
    ButtonToken::NoName,
    "Skip — stay anonymous",
    &["anonymous", "anonimo", "anónimo", "skip", "prefer not"],
)];

static USER_LEVEL: &[AffordanceEntry] = &[
    AffordanceEntry::new(
        ButtonToken::LevelBasic,
        "I'm new to this",
        &["basic", "beginner", "basico", "básico", "new"],
    ),
    AffordanceEntry::new(
        ButtonToken::LevelIntermediate,
        "I can follow instructions",
        &["intermediate", "intermedio", "some experience"],
    ),
    AffordanceEntry::new(
        ButtonToken::LevelAdvanced,
        "I'm technical",
        &["advanced", "avanzado", "expert", "technical"],
    ),
];

static DEVICE: &[AffordanceEntry] = &[
    AffordanceEntry::new(
        ButtonToken::DeviceNotebook,
        "Notebook / laptop",
        &["notebook", "laptop", "portatil", "portátil"],
    ),
    AffordanceEntry::new(
        ButtonToken::DeviceDesktop,
        "Desktop PC",
        &["desktop", "pc", "computadora", "tower", "compu"],
    ),
    AffordanceEntry::new(
        ButtonToken::DeviceNetwork,
        "Router / network gear",
        &["router", "network", "modem", "wifi", "red"],
    ),
    AffordanceEntry::new(
        ButtonToken::DeviceOther,
        "Something else",
        &["other", "otro", "else", "printer", "impresora", "tv"],
    ),
];

static RISK_ACK: &[AffordanceEntry] = &[AffordanceEntry::new(
    ButtonToken::RiskUnderstood,
    "Understood, continue",
    &["understood", "entendido", "continue", "continuar", "ok"],
)];

static DIAGNOSTIC: &[AffordanceEntry] = &[
    AffordanceEntry::new(
        ButtonToken::Resolved,
        "That fixed it",
        &["resolved", "fixed", "solucionado", "funciona", "works"],
    ),
    AffordanceEntry::new(
        ButtonToken::NotResolved,
        "Still not working",
        &["not resolved", "still failing", "sigue igual", "no funciona"],
    ),
    AffordanceEntry::new(
        ButtonToken::NeedHelp,
        "I need a technician",
        &["technician", "help", "tecnico", "técnico", "humano", "human"],
    ),
];

static FEEDBACK: &[AffordanceEntry] = &[
    AffordanceEntry::new(
        ButtonToken::FeedbackGood,
        "It went well",
        &["good", "great", "bien", "excelente", "util", "útil"],
    ),
    AffordanceEntry::new(
        ButtonToken::FeedbackBad,
        "Could be better",
        &["bad", "poor", "mal", "regular"],
    ),
];

/// Ordered list of controls a user may be offered at a stage.
///
/// Stages without controls (free-text stages and terminal stages) return
/// an empty slice.
pub fn allowed_for(stage: Stage) -> &'static [AffordanceEntry] {
    match stage {
        Stage::AskConsent => CONSENT,
        Stage::AskLanguage => LANGUAGE,
        Stage::AskName => NAME,
        Stage::AskUserLevel => USER_LEVEL,
        Stage::AskDevice => DEVICE,
        Stage::RiskAck => RISK_ACK,
        Stage::DiagnosticStep => DIAGNOSTIC,
        Stage::AskFeedback => FEEDBACK,
        Stage::AskProblem | Stage::AskClarification | Stage::Ended | Stage::Escalated => &[],
    }
}

/// Allowed tokens for a stage, without labels.
pub fn allowed_tokens(stage: Stage) -> Vec<ButtonToken> {
    allowed_for(stage).iter().map(|e| e.token).collect()
}

/// The 1-2 entry substitute set used when anti-hallucination filtering
/// empties a generated button list for a stage that expects controls.
pub fn canonical_fallback(stage: Stage) -> &'static [AffordanceEntry] {
    let entries = allowed_for(stage);
    match entries.len() {
        0 | 1 => entries,
        _ => &entries[..2],
    }
}

/// Looks up the canonical label for a token within a stage's entries.
///
/// Falls back to the token's wire form if the token is offered outside its
/// home stage (which the filter prevents in practice).
pub fn label_for(stage: Stage, token: ButtonToken) -> &'static str {
    allowed_for(stage)
        .iter()
        .find(|e| e.token == token)
        .map(|e| e.label)
        .unwrap_or_else(|| token.as_str())
}

/// Per-stage alias index, longest alias first so "no acepto" beats "no"
/// vs "acepto" ordering accidents.
static ALIAS_INDEX: Lazy<HashMap<Stage, Vec<(&'static str, ButtonToken)>>> = Lazy::new(|| {
    Stage::all()
        .into_iter()
        .map(|stage| {
            let mut aliases: Vec<(&'static str, ButtonToken)> = allowed_for(stage)
                .iter()
                .flat_map(|entry| {
                    let token = entry.token;
                    entry.aliases.iter().map(move |alias| (*alias, token))
                })
                .collect();
            aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
            (stage, aliases)
        })
        .collect()
});

/// Resolves free text to a token for a deterministic stage by alias
/// matching. Matching is case-insensitive substring containment.
pub fn match_value(stage: Stage, text: &str) -> Option<ButtonToken> {
    let haystack = text.trim().to_lowercase();
    if haystack.is_empty() {
        return None;
    }

    ALIAS_INDEX
        .get(&stage)?
        .iter()
        .find(|(alias, _)| haystack.contains(alias))
        .map(|(_, token)| *token)
}
