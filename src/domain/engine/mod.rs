//! The AI-governed conversation engine: classifier and step-generator
//! adapters, their validation layers, the escalation policy, and the
//! stage machine that orchestrates them.

mod classification;
mod classifier;
mod escalation;
mod failure;
mod machine;
mod step;
mod step_generator;

pub use classification::{Classification, ClassifierVerdict, Intent, RiskLevel};
pub use classifier::Classifier;
pub use escalation::{EscalationPolicy, EscalationReason};
pub use failure::AdapterFailure;
pub use machine::{StageMachine, TurnInput, TurnOutcome};
pub use step::{CoherenceMode, StepPlan};
pub use step_generator::{StepGenerator, StepVerdict};
