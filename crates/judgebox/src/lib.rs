//! A library for judging untrusted code submissions.
//!
//! judgebox runs submitted programs against a battery of test cases in
//! isolated, resource-bounded containers, classifies every failure mode into
//! a fixed taxonomy and reduces the per-case results into a verdict.
//!
//! # Features
//!
//! - **Sandboxed execution**: One fresh container per execution with no network, a private tmpfs, one CPU, a hard memory ceiling and a wall-clock deadline.
//! - **Multi-language**: C, C++, Java and Python, configured in TOML.
//! - **Error classification**: Compiler diagnostics, tracebacks and signals mapped to line-annotated errors.
//! - **Short-circuit judging**: Test cases run in order and stop at the first failure.
//! - **Remote execution**: A Judge0-compatible service can stand in for local containers.
//!
//! ```rust,ignore
//! use judgebox::{Config, DockerRunner, Judge, LanguageId, TestCase};
//!
//! let config = Config::default();
//! let judge = Judge::new(DockerRunner::new(config.clone()), &config);
//! let cases = [TestCase::new("1 2\n", "3\n")];
//! let result = judge.judge(source, LanguageId::Python, &cases, None).await?;
//! println!("{}: {}", result.verdict, result.message);
//! ```

pub use classify::{classify, classify_outcome};
pub use config::{
    Config, ConfigError, EXAMPLE_CONFIG, LanguageId, LanguageProfile, RemoteConfig, load_battery,
};
pub use judge::{BatchPolicy, CancelToken, Judge, JudgeError, SingleCaseResult};
pub use normalize::normalize;
pub use sandbox::{DockerRunner, RemoteRunner, Runner, SandboxError};
pub use types::{
    ClassifiedError, ErrorKind, ExecutionOutcome, ExecutionRequest, KilledReason, Phase,
    RequestError, ResourceLimits, SubmissionResult, TestCase, TestCaseResult, Verdict,
};

pub mod classify;
pub mod config;
pub mod judge;
pub mod normalize;
pub mod sandbox;
pub mod types;
