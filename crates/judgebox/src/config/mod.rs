use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, LanguageFamily, LanguageId, LanguageProfile, RunConfig, SourceName,
};
pub use crate::config::loader::{load_battery, parse_battery};
use crate::judge::BatchPolicy;
use crate::types::ResourceLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../judgebox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid source file name '{0}'")]
    InvalidSourceName(String),

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("unknown language '{0}'")]
    UnknownLanguage(String),

    #[error("language '{0}' is not configured")]
    LanguageNotConfigured(LanguageId),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for judgebox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the container engine CLI (uses PATH if not specified).
    #[serde(default)]
    pub docker_path: Option<PathBuf>,

    /// Directory inside the container backed by the scratch tmpfs.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Size of the scratch tmpfs in megabytes.
    #[serde(default = "default_scratch_size")]
    pub scratch_size_mb: u64,

    /// Logical CPUs granted to each container.
    #[serde(default = "default_cpus")]
    pub cpus: f64,

    /// Maximum number of processes/threads inside a container.
    #[serde(default = "default_max_processes")]
    pub max_processes: u32,

    /// Deadline for the compile step in seconds.
    #[serde(default = "default_compile_time_limit")]
    pub compile_time_limit: f64,

    /// Maximum bytes kept from each captured stream, in kilobytes.
    #[serde(default = "default_max_output")]
    pub max_output_kb: u64,

    /// Cap on simultaneously live containers. Unset means no admission control.
    #[serde(default)]
    pub max_concurrent: Option<usize>,

    /// How a batch proceeds after a failing test case.
    #[serde(default)]
    pub policy: BatchPolicy,

    /// Default resource limits applied to all executions.
    /// This will be overridden if the judging request specifies different limits
    #[serde(default)]
    pub default_limits: ResourceLimits,

    /// Language profiles keyed by language ID
    #[serde(default, deserialize_with = "language::deserialize_table")]
    pub languages: BTreeMap<LanguageId, LanguageProfile>,

    /// Remote judging service, when execution is delegated over HTTP
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            docker_path: None,
            scratch_dir: default_scratch_dir(),
            scratch_size_mb: default_scratch_size(),
            cpus: default_cpus(),
            max_processes: default_max_processes(),
            compile_time_limit: default_compile_time_limit(),
            max_output_kb: default_max_output(),
            max_concurrent: None,
            policy: BatchPolicy::default(),
            default_limits: ResourceLimits::default(),
            languages: BTreeMap::new(),
            remote: None,
        }
    }

    /// Get a language profile by ID
    pub fn profile(&self, id: LanguageId) -> Result<&LanguageProfile, ConfigError> {
        self.languages
            .get(&id)
            .ok_or(ConfigError::LanguageNotConfigured(id))
    }

    /// Get a language profile by its string identifier
    pub fn language(&self, id: &str) -> Result<&LanguageProfile, ConfigError> {
        self.profile(id.parse()?)
    }

    /// Get the path to the container engine binary
    pub fn docker_binary(&self) -> PathBuf {
        self.docker_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("docker"))
    }

    /// Merge resource limits with defaults
    pub fn effective_limits(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        match overrides {
            Some(limits) => self.default_limits.with_overrides(limits),
            None => self.default_limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

/// Settings for a Judge0-compatible remote judging service
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the service (e.g., "https://judge0-ce.p.rapidapi.com")
    pub url: String,

    /// API key sent with every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Number of status polls before giving up
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Base delay between polls in milliseconds; grows linearly per attempt
    #[serde(default = "default_poll_base_ms")]
    pub poll_base_ms: u64,

    /// Upper bound on the delay between polls in milliseconds
    #[serde(default = "default_poll_cap_ms")]
    pub poll_cap_ms: u64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Service-side numeric language identifiers
    #[serde(default = "default_remote_language_ids")]
    pub language_ids: BTreeMap<LanguageId, u32>,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            max_polls: default_max_polls(),
            poll_base_ms: default_poll_base_ms(),
            poll_cap_ms: default_poll_cap_ms(),
            request_timeout_secs: default_request_timeout(),
            language_ids: default_remote_language_ids(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Whether requests go through the RapidAPI gateway
    pub fn is_rapidapi(&self) -> bool {
        self.url.contains("rapidapi.com")
    }
}

fn default_scratch_dir() -> String {
    "/tmp".to_owned()
}

fn default_scratch_size() -> u64 {
    64
}

fn default_cpus() -> f64 {
    1.0
}

fn default_max_processes() -> u32 {
    64
}

fn default_compile_time_limit() -> f64 {
    30.0
}

fn default_max_output() -> u64 {
    65536
}

fn default_max_polls() -> u32 {
    30
}

fn default_poll_base_ms() -> u64 {
    1000
}

fn default_poll_cap_ms() -> u64 {
    2000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_remote_language_ids() -> BTreeMap<LanguageId, u32> {
    BTreeMap::from([
        (LanguageId::C, 50),
        (LanguageId::Cpp, 54),
        (LanguageId::Java, 62),
        (LanguageId::Python, 71),
    ])
}
