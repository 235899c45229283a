//! Configuration for the clearance CLI

use clearance_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Main CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Workflow engine settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    /// Load configuration: defaults, then the optional file, then
    /// `CLEARANCE_` environment variables.
    ///
    /// Nested keys are separated by a double underscore, so
    /// `CLEARANCE_ENGINE__FEES__TOLERANCE_MINOR=1` sets
    /// `engine.fees.tolerance_minor`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&CliConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CLEARANCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: CliConfig = builder.build()?.try_deserialize()?;
        loaded
            .engine
            .validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(loaded)
    }
}
