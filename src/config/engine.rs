//! Conversation-engine thresholds and policies.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::engine::{CoherenceMode, RiskLevel};

/// Engine configuration: escalation thresholds, duplicate window,
/// coherence handling, and the messaging handoff target.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Clarification rounds before escalating without diagnosis.
    #[serde(default = "default_clarification_limit")]
    pub clarification_limit: u32,

    /// Failed diagnostic attempts before escalating.
    #[serde(default = "default_attempt_limit")]
    pub diagnostic_attempt_limit: u32,

    /// Window within which an identical inbound payload is a no-op.
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Whether reply/button contradictions are corrected or only flagged.
    #[serde(default)]
    pub coherence: CoherenceMode,

    /// Classifications at or above this risk level escalate directly.
    #[serde(default = "default_escalate_risk")]
    pub escalate_risk_level: RiskLevel,

    /// Base URL of the messaging handoff deep link.
    #[serde(default = "default_handoff_url")]
    pub handoff_base_url: String,
}

impl EngineConfig {
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.clarification_limit == 0 {
            return Err(ValidationError::invalid(
                "engine.clarification_limit",
                "must be at least 1",
            ));
        }
        if self.diagnostic_attempt_limit == 0 {
            return Err(ValidationError::invalid(
                "engine.diagnostic_attempt_limit",
                "must be at least 1",
            ));
        }
        if !self.handoff_base_url.starts_with("http") {
            return Err(ValidationError::invalid(
                "engine.handoff_base_url",
                "must be an http(s) URL",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clarification_limit: default_clarification_limit(),
            diagnostic_attempt_limit: default_attempt_limit(),
            dedup_window_secs: default_dedup_window(),
            coherence: CoherenceMode::default(),
            escalate_risk_level: default_escalate_risk(),
            handoff_base_url: default_handoff_url(),
        }
    }
}

fn default_escalate_risk() -> RiskLevel {
    RiskLevel::High
}

fn default_clarification_limit() -> u32 {
    2
}

fn default_attempt_limit() -> u32 {
    2
}

fn default_dedup_window() -> u64 {
    30
}

fn default_handoff_url() -> String {
    "https://wa.me/5491100000000".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.clarification_limit, 2);
        assert_eq!(config.diagnostic_attempt_limit, 2);
        assert_eq!(config.dedup_window_secs, 30);
        assert_eq!(config.coherence, CoherenceMode::Correct);
        assert_eq!(config.escalate_risk_level, RiskLevel::High);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        let config = EngineConfig {
            clarification_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            diagnostic_attempt_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn handoff_url_must_be_http() {
        let config = EngineConfig {
            handoff_base_url: "wa.me/123".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn dedup_window_converts_to_duration() {
        let config = EngineConfig {
            dedup_window_secs: 45,
            ..Default::default()
        };
        assert_eq!(config.dedup_window(), Duration::from_secs(45));
    }
}
