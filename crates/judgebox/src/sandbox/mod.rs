//! Isolated execution of one submission
//!
//! This module drives a container engine through its CLI: argument building,
//! container lifecycle, step execution and outcome mapping. A remote
//! Judge0-compatible service is available as an alternative [`Runner`].
//!
//! References for the engine's CLI arguments:
//! - https://docs.docker.com/reference/cli/docker/container/run/
//! - https://docs.docker.com/reference/cli/docker/container/exec/

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::sandbox::command::{ContainerLimits, DockerAction, DockerCommand};
pub use crate::sandbox::container::{Container, ContainerSpec};
pub use crate::sandbox::local::DockerRunner;
pub use crate::sandbox::process::{StepOutput, run_step};
pub use crate::sandbox::remote::RemoteRunner;
use crate::config::LanguageId;
use crate::types::{ExecutionOutcome, ExecutionRequest};

mod command;
mod container;
mod local;
mod process;
mod remote;

/// Errors raised by the isolation layer itself, never by the submitted code
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to spawn container engine: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("failed to launch image {image}: {message}")]
    LaunchFailed { image: String, message: String },

    #[error("failed to write {name} into container {container}: {message}")]
    WriteFailed {
        container: String,
        name: String,
        message: String,
    },

    #[error("failed to remove container {name}: {message}")]
    CleanupFailed { name: String, message: String },

    #[error("container command failed: {0}")]
    CommandFailed(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("admission control is closed")]
    AdmissionClosed,

    #[error("remote judge error: {0}")]
    Remote(String),

    #[error("submission timeout after {0} polls")]
    RemoteTimeout(u32),

    #[error("language '{0}' has no remote identifier")]
    RemoteLanguage(LanguageId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes one request in a fresh isolated environment
///
/// Implementations are stateless with respect to other calls and may be
/// invoked concurrently. An `Err` means the infrastructure failed; anything
/// the submitted code does is reported through the returned outcome.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, SandboxError>;
}

#[async_trait]
impl<R: Runner + ?Sized> Runner for Arc<R> {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, SandboxError> {
        (**self).execute(request).await
    }
}

#[async_trait]
impl<R: Runner + ?Sized> Runner for Box<R> {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, SandboxError> {
        (**self).execute(request).await
    }
}
