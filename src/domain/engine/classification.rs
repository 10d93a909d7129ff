//! Classification result types.
//!
//! The classifier's output is modeled as a tagged verdict rather than a
//! trusted parsed object: downstream code pattern-matches on the verdict
//! and can always obtain a usable judgment, degraded or not.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::failure::AdapterFailure;
use crate::domain::foundation::ValidationError;

/// Problem category inferred from the user's free-form description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Power,
    Display,
    Network,
    Software,
    Peripheral,
    Performance,
    GuidedTask,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Display => "display",
            Self::Network => "network",
            Self::Software => "software",
            Self::Peripheral => "peripheral",
            Self::Performance => "performance",
            Self::GuidedTask => "guided_task",
            Self::Unknown => "unknown",
        }
    }

    /// All declared intents, for prompt construction.
    pub fn all() -> [Intent; 8] {
        [
            Self::Power,
            Self::Display,
            Self::Network,
            Self::Software,
            Self::Peripheral,
            Self::Performance,
            Self::GuidedTask,
            Self::Unknown,
        ]
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Intent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).map_err(|_| {
            ValidationError::invalid_format("intent", format!("'{}' is not a declared intent", s))
        })
    }
}

/// Risk attached to continuing automated diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Medium and high risk require a one-time acknowledgment before
    /// diagnosis continues.
    pub fn requires_acknowledgment(&self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(ValidationError::invalid_format(
                "risk_level",
                format!("'{}' is not a declared risk level", other),
            )),
        }
    }
}

/// A structured judgment over one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intent: Intent,
    pub needs_clarification: bool,
    /// Fields the classifier still needs (e.g. "device", "error_message").
    #[serde(default)]
    pub missing: Vec<String>,
    pub risk_level: RiskLevel,
    pub confidence: f32,
}

impl Classification {
    /// The deterministic judgment substituted when a classifier call
    /// fails: unknown intent, clarification requested, lowest risk.
    pub fn fallback() -> Self {
        Self {
            intent: Intent::Unknown,
            needs_clarification: true,
            missing: Vec::new(),
            risk_level: RiskLevel::Low,
            confidence: 0.0,
        }
    }

    /// Schema check applied after parsing.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::invalid_format(
                "confidence",
                format!("{} is outside [0, 1]", self.confidence),
            ));
        }
        Ok(())
    }
}

/// Tagged classifier result. A fallback is a valid (if degraded) result;
/// it carries the failure that forced it so the turn can record a marker.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierVerdict {
    Valid(Classification),
    Fallback {
        judgment: Classification,
        reason: AdapterFailure,
    },
}

impl ClassifierVerdict {
    /// The usable judgment, degraded or not.
    pub fn judgment(&self) -> &Classification {
        match self {
            Self::Valid(c) => c,
            Self::Fallback { judgment, .. } => judgment,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Wraps a failure in the deterministic fallback judgment.
    pub fn fallback(reason: AdapterFailure) -> Self {
        Self::Fallback {
            judgment: Classification::fallback(),
            reason,
        }
    }
}
