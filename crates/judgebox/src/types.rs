use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LanguageProfile;

/// Exit status reported when a step was killed by the container's memory ceiling
/// (128 + SIGKILL).
pub const OOM_EXIT_CODE: i32 = 137;

/// Exit status of a process terminated by SIGSEGV (128 + 11).
pub const SEGFAULT_EXIT_CODE: i32 = 139;

/// Exit status recorded when the host killed a step at its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock time limit for the run step in seconds
    #[serde(default)]
    pub time_limit: Option<f64>,

    /// Memory ceiling in megabytes
    #[serde(default)]
    pub memory_limit: Option<u64>,
}

impl ResourceLimits {
    /// Create new resource limits with the default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource limits with every field unset, useful as an override base
    pub fn unset() -> Self {
        Self {
            time_limit: None,
            memory_limit: None,
        }
    }

    /// Set the time limit in seconds
    pub fn with_time_limit(mut self, seconds: f64) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    /// Set the memory limit in megabytes
    pub fn with_memory_limit(mut self, mb: u64) -> Self {
        self.memory_limit = Some(mb);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            time_limit: overrides.time_limit.or(self.time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            time_limit: Some(1.0),
            memory_limit: Some(256),
        }
    }
}

/// A request violated the constraints of [`ExecutionRequest`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("memory limit must be greater than zero")]
    NoMemoryLimit,

    #[error("time limit must be a positive number of seconds, got {0}")]
    InvalidTimeLimit(f64),
}

/// One (source, language, stdin) triple to execute under fixed limits.
///
/// Fields are private so a request cannot change after validation.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    source: String,
    language: LanguageProfile,
    stdin: String,
    memory_limit_mb: u64,
    time_limit_seconds: f64,
}

impl ExecutionRequest {
    /// Build a request, rejecting unset or non-positive limits
    pub fn new(
        source: impl Into<String>,
        language: &LanguageProfile,
        stdin: impl Into<String>,
        limits: &ResourceLimits,
    ) -> Result<Self, RequestError> {
        let memory_limit_mb = match limits.memory_limit {
            Some(mb) if mb > 0 => mb,
            _ => return Err(RequestError::NoMemoryLimit),
        };
        let time_limit_seconds = match limits.time_limit {
            Some(t) if t.is_finite() && t > 0.0 => t,
            Some(t) => return Err(RequestError::InvalidTimeLimit(t)),
            None => return Err(RequestError::InvalidTimeLimit(0.0)),
        };

        Ok(Self {
            source: source.into(),
            language: language.clone(),
            stdin: stdin.into(),
            memory_limit_mb,
            time_limit_seconds,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn language(&self) -> &LanguageProfile {
        &self.language
    }

    pub fn stdin(&self) -> &str {
        &self.stdin
    }

    pub fn memory_limit_mb(&self) -> u64 {
        self.memory_limit_mb
    }

    pub fn time_limit_seconds(&self) -> f64 {
        self.time_limit_seconds
    }
}

/// Why the environment was forcibly terminated, if it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KilledReason {
    #[default]
    None,
    Oom,
    Timeout,
}

/// Which step of an execution produced the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Compile,
    #[default]
    Run,
}

/// Raw result of one sandboxed execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub wall_time_ms: u64,
    pub killed_reason: KilledReason,
    pub phase: Phase,
}

impl ExecutionOutcome {
    /// A run step that exited with status 0 and was not killed
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.phase == Phase::Run && self.killed_reason == KilledReason::None && self.exit_code == 0
    }
}

/// Canonical error taxonomy for a failing test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CompileError,
    RuntimeError,
    MemoryLimitExceeded,
    TimeLimitExceeded,
    /// The sandbox itself failed; not attributable to the submitted code
    InternalError,
}

impl ErrorKind {
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::CompileError => "Compile Error",
            ErrorKind::RuntimeError => "Runtime Error",
            ErrorKind::MemoryLimitExceeded => "Memory Limit Exceeded",
            ErrorKind::TimeLimitExceeded => "Time Limit Exceeded",
            ErrorKind::InternalError => "Internal Error",
        }
    }
}

/// Diagnostic derived from an [`ExecutionOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }

    pub fn at_column(mut self, column: Option<u32>) -> Self {
        self.column = column;
        self
    }
}

/// Final classification of a submission or of a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
    MemoryLimitExceeded,
    TimeLimitExceeded,
}

impl Verdict {
    pub fn title(&self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::CompileError => "Compile Error",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
        }
    }
}

impl From<ErrorKind> for Verdict {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::CompileError => Verdict::CompileError,
            ErrorKind::RuntimeError | ErrorKind::InternalError => Verdict::RuntimeError,
            ErrorKind::MemoryLimitExceeded => Verdict::MemoryLimitExceeded,
            ErrorKind::TimeLimitExceeded => Verdict::TimeLimitExceeded,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One entry of a problem's test battery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
            is_hidden: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }
}

/// Result of evaluating one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub index: usize,
    pub passed: bool,
    pub verdict: Verdict,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    #[serde(default)]
    pub wall_time_ms: u64,
}

/// Terminal artifact of judging one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub verdict: Verdict,
    pub test_results: Vec<TestCaseResult>,
    pub message: String,
}
