//! Judge orchestration
//!
//! Drives a [`Runner`] over an ordered battery of test cases and reduces the
//! per-case results into a [`SubmissionResult`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::{Config, ConfigError, LanguageId, LanguageProfile};
use crate::sandbox::Runner;
use crate::types::{
    ErrorKind, ExecutionRequest, RequestError, ResourceLimits, SubmissionResult, TestCase,
    TestCaseResult, Verdict,
};

mod verdict;

/// Errors in how the judge was called
///
/// Failures of the submitted code or of the sandbox are never errors; they
/// are reported inside the result.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("no test cases")]
    NoTestCases,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid limits: {0}")]
    InvalidLimits(#[from] RequestError),

    #[error("judging cancelled")]
    Cancelled,
}

/// How a batch proceeds after a failing test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Stop at the first case that is not a clean pass
    #[default]
    StopAtFirstFailure,
    /// Evaluate every case; a compile error still ends the batch
    RunAll,
}

/// Cooperative cancellation for an in-flight batch
///
/// Checked before each test case is dispatched. A case already running
/// finishes or hits its own deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of judging a single caller-supplied case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleCaseResult {
    pub verdict: Verdict,
    pub result: TestCaseResult,
}

/// Judges submissions with a runner and an immutable language table
#[derive(Debug, Clone)]
pub struct Judge<R> {
    runner: R,
    languages: BTreeMap<LanguageId, LanguageProfile>,
    default_limits: ResourceLimits,
    policy: BatchPolicy,
}

impl<R: Runner> Judge<R> {
    /// Create a judge using the languages, limits and policy of `config`
    pub fn new(runner: R, config: &Config) -> Self {
        Self {
            runner,
            languages: config.languages.clone(),
            default_limits: config.default_limits.clone(),
            policy: config.policy,
        }
    }

    /// Override the batch policy
    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    fn profile(&self, id: LanguageId) -> Result<&LanguageProfile, JudgeError> {
        self.languages
            .get(&id)
            .ok_or(JudgeError::Config(ConfigError::LanguageNotConfigured(id)))
    }

    fn limits(&self, overrides: Option<&ResourceLimits>) -> ResourceLimits {
        match overrides {
            Some(limits) => self.default_limits.with_overrides(limits),
            None => self.default_limits.clone(),
        }
    }

    /// Judge a submission against an ordered battery of test cases
    pub async fn judge(
        &self,
        code: &str,
        language: LanguageId,
        cases: &[TestCase],
        limits: Option<&ResourceLimits>,
    ) -> Result<SubmissionResult, JudgeError> {
        self.judge_with_cancel(code, language, cases, limits, &CancelToken::new())
            .await
    }

    /// Judge a submission, checking `cancel` before each test case
    ///
    /// Cases run sequentially in the given order. Under the default policy the
    /// batch stops at the first case that is not a clean pass, so later cases
    /// (hidden ones included) are never executed.
    #[instrument(skip(self, code, cases, limits, cancel), fields(cases = cases.len()))]
    pub async fn judge_with_cancel(
        &self,
        code: &str,
        language: LanguageId,
        cases: &[TestCase],
        limits: Option<&ResourceLimits>,
        cancel: &CancelToken,
    ) -> Result<SubmissionResult, JudgeError> {
        if cases.is_empty() {
            return Err(JudgeError::NoTestCases);
        }
        let profile = self.profile(language)?;
        let limits = self.limits(limits);

        // Validates the limits before anything runs
        let requests = cases
            .iter()
            .map(|case| ExecutionRequest::new(code, profile, case.input.as_str(), &limits))
            .collect::<Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(cases.len());
        for (index, (case, request)) in cases.iter().zip(&requests).enumerate() {
            if cancel.is_cancelled() {
                info!(index, "judging cancelled");
                return Err(JudgeError::Cancelled);
            }

            let executed = self.runner.execute(request).await;
            let result = verdict::evaluate(index, case, request, executed);
            debug!(index, passed = result.passed, verdict = %result.verdict, "test case evaluated");

            let compile_failed = result
                .error
                .as_ref()
                .is_some_and(|e| e.kind == ErrorKind::CompileError);
            let stop = !result.passed
                && (self.policy == BatchPolicy::StopAtFirstFailure || compile_failed);

            results.push(verdict::redact(result));
            if stop {
                break;
            }
        }

        let verdict = verdict::reduce(&results).ok_or(JudgeError::NoTestCases)?;
        let message = verdict::summary(verdict, &results);
        info!(%verdict, evaluated = results.len(), total = cases.len(), "submission judged");

        Ok(SubmissionResult {
            verdict,
            test_results: results,
            message,
        })
    }

    /// Evaluate exactly one caller-supplied case
    ///
    /// Used for interactive checks with edited input; no other case is run.
    #[instrument(skip(self, code, case, limits))]
    pub async fn run_one(
        &self,
        code: &str,
        language: LanguageId,
        case: &TestCase,
        limits: Option<&ResourceLimits>,
    ) -> Result<SingleCaseResult, JudgeError> {
        let profile = self.profile(language)?;
        let limits = self.limits(limits);
        let request = ExecutionRequest::new(code, profile, case.input.as_str(), &limits)?;

        let executed = self.runner.execute(&request).await;
        let result = verdict::redact(verdict::evaluate(0, case, &request, executed));
        debug!(passed = result.passed, verdict = %result.verdict, "single case evaluated");

        Ok(SingleCaseResult {
            verdict: result.verdict,
            result,
        })
    }
}
