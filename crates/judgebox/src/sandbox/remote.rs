//! Runner delegating execution to a Judge0-compatible HTTP service
//!
//! The service's status codes are translated into the same outcome shape the
//! local runner produces, so classification and judging are unaffected by
//! where the code actually ran.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::RemoteConfig;
use crate::sandbox::{Runner, SandboxError};
use crate::types::{
    ExecutionOutcome, ExecutionRequest, KilledReason, OOM_EXIT_CODE, Phase, SEGFAULT_EXIT_CODE,
    TIMEOUT_EXIT_CODE,
};

const USER_AGENT_VALUE: &str = concat!("judgebox/", env!("CARGO_PKG_VERSION"));

/// Host header value expected by the RapidAPI gateway
const RAPIDAPI_HOST: &str = "judge0-ce.p.rapidapi.com";

// Judge0 status identifiers
const STATUS_IN_QUEUE: u32 = 1;
const STATUS_PROCESSING: u32 = 2;
const STATUS_ACCEPTED: u32 = 3;
const STATUS_WRONG_ANSWER: u32 = 4;
const STATUS_TIME_LIMIT: u32 = 5;
const STATUS_COMPILATION_ERROR: u32 = 6;
const STATUS_SIGSEGV: u32 = 7;
const STATUS_RUNTIME_OTHER: u32 = 12;

/// Remote judging service client implementing [`Runner`]
#[derive(Debug, Clone)]
pub struct RemoteRunner {
    client: reqwest::Client,
    base_url: String,
    config: RemoteConfig,
}

#[derive(Debug, Serialize)]
struct SubmissionRequest {
    source_code: String,
    language_id: u32,
    stdin: String,
    cpu_time_limit: f64,
    wall_time_limit: f64,
    /// Kilobytes
    memory_limit: u64,
}

#[derive(Debug, Deserialize)]
struct SubmissionToken {
    token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Status {
    id: u32,
    #[serde(default)]
    description: String,
}

/// Subset of a submission as returned by the service (base64 fields)
#[derive(Debug, Clone, Default, Deserialize)]
struct Submission {
    #[serde(default)]
    status: Status,
    #[serde(default)]
    stdout: Option<String>,
    #[serde(default)]
    stderr: Option<String>,
    #[serde(default)]
    compile_output: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    exit_code: Option<i32>,
    /// Peak memory in kilobytes
    #[serde(default)]
    memory: Option<u64>,
}

impl RemoteRunner {
    /// Create a new remote runner
    pub fn new(config: RemoteConfig) -> Result<Self, SandboxError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        if let Some(ref key) = config.api_key {
            if config.is_rapidapi() {
                headers.insert("x-rapidapi-key", header_value(key)?);
                headers.insert("x-rapidapi-host", HeaderValue::from_static(RAPIDAPI_HOST));
            } else {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| SandboxError::Remote(format!("failed to create HTTP client: {e}")))?;

        let base_url = config.url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    async fn submit(&self, request: &ExecutionRequest) -> Result<String, SandboxError> {
        let language = request.language().id;
        let language_id = *self
            .config
            .language_ids
            .get(&language)
            .ok_or(SandboxError::RemoteLanguage(language))?;

        let body = SubmissionRequest {
            source_code: BASE64.encode(request.source()),
            language_id,
            stdin: BASE64.encode(request.stdin()),
            cpu_time_limit: request.time_limit_seconds(),
            wall_time_limit: request.time_limit_seconds() * 2.0,
            memory_limit: request.memory_limit_mb() * 1024,
        };

        let url = format!("{}/submissions", self.base_url);
        debug!(%url, language_id, "creating remote submission");

        let response = self
            .client
            .post(&url)
            .query(&[("base64_encoded", "true"), ("wait", "false")])
            .json(&body)
            .send()
            .await
            .map_err(|e| SandboxError::Remote(format!("failed to create submission: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SandboxError::Remote(format!(
                "failed to create submission: {} - {}",
                status.as_u16(),
                text
            )));
        }

        let token: SubmissionToken = response
            .json()
            .await
            .map_err(|e| SandboxError::Remote(format!("invalid submission response: {e}")))?;
        Ok(token.token)
    }

    async fn fetch(&self, token: &str) -> Result<Submission, SandboxError> {
        let url = format!("{}/submissions/{}", self.base_url, token);

        let response = self
            .client
            .get(&url)
            .query(&[("base64_encoded", "true")])
            .send()
            .await
            .map_err(|e| SandboxError::Remote(format!("failed to get submission: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SandboxError::Remote(format!(
                "failed to get submission: {} - {}",
                status.as_u16(),
                text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SandboxError::Remote(format!("invalid submission result: {e}")))
    }

    /// Poll until the submission leaves the queued/processing states
    async fn wait_for_result(&self, token: &str) -> Result<Submission, SandboxError> {
        for attempt in 0..self.config.max_polls {
            let submission = self.fetch(token).await?;
            let id = submission.status.id;
            if id != STATUS_IN_QUEUE && id != STATUS_PROCESSING {
                return Ok(submission);
            }

            let delay = self.poll_delay(attempt);
            debug!(attempt, status = id, ?delay, "submission still pending");
            tokio::time::sleep(delay).await;
        }

        warn!(token, polls = self.config.max_polls, "remote submission did not finish");
        Err(SandboxError::RemoteTimeout(self.config.max_polls))
    }

    /// Linear backoff with a ceiling
    fn poll_delay(&self, attempt: u32) -> Duration {
        let ms = self
            .config
            .poll_base_ms
            .saturating_mul(u64::from(attempt) + 1)
            .min(self.config.poll_cap_ms);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl Runner for RemoteRunner {
    #[instrument(skip(self, request), fields(language = %request.language().id))]
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, SandboxError> {
        let start = Instant::now();
        let token = self.submit(request).await?;
        let submission = self.wait_for_result(&token).await?;

        let mut outcome = translate(&submission, request.memory_limit_mb() * 1024)?;
        outcome.wall_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            status = submission.status.id,
            exit_code = outcome.exit_code,
            killed = ?outcome.killed_reason,
            "remote execution finished"
        );
        Ok(outcome)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, SandboxError> {
    HeaderValue::from_str(value)
        .map_err(|_| SandboxError::Remote("API key contains invalid header characters".into()))
}

/// Decode a base64 field; the service wraps long values across lines
fn decode(field: &Option<String>) -> String {
    let Some(encoded) = field else {
        return String::new();
    };
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    match BASE64.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => encoded.clone(),
    }
}

/// Map a finished submission onto an outcome
fn translate(submission: &Submission, memory_limit_kb: u64) -> Result<ExecutionOutcome, SandboxError> {
    let stdout = decode(&submission.stdout);
    let stderr = decode(&submission.stderr);
    let message = decode(&submission.message);
    let over_memory = submission.memory.is_some_and(|kb| kb >= memory_limit_kb);

    let outcome = match submission.status.id {
        STATUS_ACCEPTED | STATUS_WRONG_ANSWER => ExecutionOutcome {
            stdout,
            stderr,
            exit_code: 0,
            ..Default::default()
        },
        STATUS_TIME_LIMIT => ExecutionOutcome {
            stdout,
            stderr,
            exit_code: TIMEOUT_EXIT_CODE,
            killed_reason: KilledReason::Timeout,
            ..Default::default()
        },
        STATUS_COMPILATION_ERROR => ExecutionOutcome {
            stderr: decode(&submission.compile_output),
            exit_code: 1,
            phase: Phase::Compile,
            ..Default::default()
        },
        STATUS_SIGSEGV..=STATUS_RUNTIME_OTHER if over_memory => ExecutionOutcome {
            stdout,
            stderr,
            exit_code: OOM_EXIT_CODE,
            killed_reason: KilledReason::Oom,
            ..Default::default()
        },
        STATUS_SIGSEGV => ExecutionOutcome {
            stdout,
            stderr,
            exit_code: SEGFAULT_EXIT_CODE,
            ..Default::default()
        },
        id @ 8..=STATUS_RUNTIME_OTHER => {
            let stderr = if stderr.trim().is_empty() {
                if message.trim().is_empty() {
                    submission.status.description.clone()
                } else {
                    message
                }
            } else {
                stderr
            };
            debug!(status = id, "remote runtime error");
            ExecutionOutcome {
                stdout,
                stderr,
                exit_code: submission.exit_code.filter(|&c| c != 0).unwrap_or(1),
                ..Default::default()
            }
        }
        id => {
            let detail = if message.trim().is_empty() {
                format!("execution failed with status {id}")
            } else {
                message.trim().to_string()
            };
            return Err(SandboxError::Remote(format!(
                "{}: {}",
                submission.status.description, detail
            )));
        }
    };

    Ok(outcome)
}
