//! Application configuration module.
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values are read with the `MESA` prefix
//! and `__` (double underscore) separating nested sections.
//!
//! # Example
//!
//! ```no_run
//! use mesa::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod ai;
mod engine;
mod error;
mod storage;

pub use ai::AiConfig;
pub use engine::EngineConfig;
pub use error::{ConfigError, ValidationError};
pub use storage::StorageConfig;

use serde::Deserialize;

/// Root application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Completion-service configuration.
    #[serde(default)]
    pub ai: AiConfig,

    /// Engine thresholds and policies.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Storage layout and identifier keyspace.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Loads a `.env` file if present (development), then reads variables
    /// with the `MESA` prefix:
    ///
    /// - `MESA__AI__ANTHROPIC_API_KEY=...` -> `ai.anthropic_api_key`
    /// - `MESA__ENGINE__CLARIFICATION_LIMIT=3` -> `engine.clarification_limit`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into the expected
    /// types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().prefix("MESA").separator("__"))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration sections.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ai.validate()?;
        self.engine.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}
