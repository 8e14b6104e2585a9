//! Configuration types for the warden policy core.

mod connector;
mod logging;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use connector::ConnectorConfig;
pub use logging::{LogFormat, LoggingConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.connector.validate()?;

        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level must not be empty");
        }
        Ok(())
    }
}
