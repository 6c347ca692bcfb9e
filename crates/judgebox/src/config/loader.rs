//! Configuration file loading for judgebox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};
use serde::Deserialize;

use crate::config::{Config, ConfigError};
use crate::types::TestCase;

/// A test battery file: an ordered `[[cases]]` array
#[derive(Debug, Deserialize)]
struct Battery {
    #[serde(default)]
    cases: Vec<TestCase>,
}

/// Load an ordered test battery from a TOML file
pub fn load_battery(path: impl AsRef<Path>) -> Result<Vec<TestCase>, ConfigError> {
    let battery: Battery = ConfigBuilder::builder()
        .add_source(File::from(path.as_ref()).format(FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    Ok(battery.cases)
}

/// Parse an ordered test battery from a TOML string
pub fn parse_battery(content: &str) -> Result<Vec<TestCase>, ConfigError> {
    let battery: Battery = ConfigBuilder::builder()
        .add_source(File::from_str(content, FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    Ok(battery.cases)
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.scratch_dir.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "scratch_dir '{}' must be an absolute path",
                self.scratch_dir
            )));
        }
        if self.scratch_size_mb == 0 {
            return Err(ConfigError::Invalid("scratch_size_mb must be > 0".into()));
        }
        if !(self.cpus > 0.0) {
            return Err(ConfigError::Invalid("cpus must be > 0".into()));
        }
        if !(self.compile_time_limit > 0.0 && self.compile_time_limit.is_finite()) {
            return Err(ConfigError::Invalid(
                "compile_time_limit must be a positive number of seconds".into(),
            ));
        }
        if self.max_concurrent == Some(0) {
            return Err(ConfigError::Invalid("max_concurrent must be > 0".into()));
        }

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty image"
                )));
            }
            if lang.source_name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty source name"
                )));
            }
            if lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(ref compile) = lang.compile
                && compile.command.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty compile command"
                )));
            }
        }

        if let Some(ref remote) = self.remote {
            if remote.url.is_empty() {
                return Err(ConfigError::Invalid("remote url is empty".into()));
            }
            if remote.max_polls == 0 {
                return Err(ConfigError::Invalid("remote max_polls must be > 0".into()));
            }
        }

        Ok(())
    }
}
