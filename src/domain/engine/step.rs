//! Step plans and the validation pipeline applied to generator output.
//!
//! Everything the step generator returns is treated as untrusted: the
//! reply is cut down to a single instruction, every button token is
//! checked against the affordance catalog, and a coherence pass keeps the
//! reply and the final button set from contradicting each other.

use serde::{Deserialize, Serialize};

use crate::domain::conversation::catalog::{self, ButtonToken};
use crate::domain::conversation::Stage;

/// How the coherence check handles a reply/button contradiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoherenceMode {
    /// Log the contradiction and ship the plan unchanged.
    Flag,
    /// Replace the button set with the stage's canonical fallback.
    Correct,
}

impl Default for CoherenceMode {
    fn default() -> Self {
        Self::Correct
    }
}

/// One validated diagnostic step: a single instruction plus the controls
/// the user may answer with.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    pub reply: String,
    pub buttons: Vec<ButtonToken>,
}

impl StepPlan {
    /// The deterministic plan substituted when a generator call fails:
    /// a generic retry prompt plus the stage's canonical controls.
    pub fn fallback(stage: Stage) -> Self {
        Self {
            reply: "Let's try that again. Repeat the last step carefully and tell me \
                    how it went."
                .to_string(),
            buttons: catalog::canonical_fallback(stage)
                .iter()
                .map(|e| e.token)
                .collect(),
        }
    }
}

/// Wire shape of the generator's structured output.
#[derive(Debug, Deserialize)]
pub(crate) struct RawStepPlan {
    pub reply: Option<String>,
    #[serde(default)]
    pub buttons: Vec<RawButton>,
}

/// A button as the model emitted it. The label is advisory only; the
/// canonical label always comes from the catalog.
#[derive(Debug, Deserialize)]
pub(crate) struct RawButton {
    pub token: Option<String>,
    #[allow(dead_code)]
    pub label: Option<String>,
}

/// Cuts a model reply down to exactly one instruction block.
///
/// The reply is truncated at the first blank-line boundary; if the
/// remaining block is an enumerated list, only the first item survives.
pub(crate) fn enforce_single_step(reply: &str) -> String {
    let first_block = reply
        .split("\n\n")
        .map(str::trim)
        .find(|block| !block.is_empty())
        .unwrap_or("");

    let mut kept = Vec::new();
    let mut seen_item_marker = false;
    for line in first_block.lines() {
        if is_enumeration_marker(line) {
            if seen_item_marker {
                break;
            }
            seen_item_marker = true;
        }
        kept.push(line);
    }
    kept.join("\n").trim().to_string()
}

fn is_enumeration_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix(|c: char| c.is_ascii_digit()) {
        return rest.starts_with('.') || rest.starts_with(')');
    }
    trimmed.starts_with("- ") || trimmed.starts_with("* ")
}

/// Parses raw button entries, dropping silently anything that is not in
/// the allowed set. Order is preserved; duplicates collapse.
pub(crate) fn filter_buttons(raw: &[RawButton], allowed: &[ButtonToken]) -> Vec<ButtonToken> {
    let mut kept = Vec::new();
    for button in raw {
        let Some(token_str) = &button.token else {
            continue;
        };
        let Ok(token) = token_str.parse::<ButtonToken>() else {
            continue;
        };
        if allowed.contains(&token) && !kept.contains(&token) {
            kept.push(token);
        }
    }
    kept
}

/// True when a reply is phrased as a question that expects a worked/not
/// worked answer.
pub(crate) fn is_outcome_question(reply: &str) -> bool {
    let trimmed = reply.trim_end();
    if !trimmed.ends_with('?') {
        return false;
    }
    let lower = trimmed.to_lowercase();
    [
        "did ", "does ", "is it", "are ", "can you", "funciona", "encend", "worked",
        "help", "turn on", "¿",
    ]
    .iter()
    .any(|marker| lower.contains(marker))
}

/// Checks that a reply phrased as an outcome question ships with outcome
/// controls. Returns the corrected plan under `CoherenceMode::Correct`.
pub(crate) fn check_coherence(plan: StepPlan, stage: Stage, mode: CoherenceMode) -> StepPlan {
    let has_outcome_controls = plan
        .buttons
        .iter()
        .any(|t| matches!(t, ButtonToken::Resolved | ButtonToken::NotResolved));

    if !is_outcome_question(&plan.reply) || has_outcome_controls {
        return plan;
    }

    tracing::warn!(stage = %stage, "generated reply asks an outcome question without outcome controls");
    match mode {
        CoherenceMode::Flag => plan,
        CoherenceMode::Correct => StepPlan {
            reply: plan.reply,
            buttons: catalog::canonical_fallback(stage)
                .iter()
                .map(|e| e.token)
                .collect(),
        },
    }
}
