//! Local container-backed runner

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::sandbox::command::ContainerLimits;
use crate::sandbox::container::{Container, ContainerSpec};
use crate::sandbox::process::StepOutput;
use crate::sandbox::{Runner, SandboxError};
use crate::types::{
    ExecutionOutcome, ExecutionRequest, KilledReason, OOM_EXIT_CODE, Phase, TIMEOUT_EXIT_CODE,
};

/// File the stdin payload is materialized into
const INPUT_FILE: &str = "input.txt";

/// Redirects stdin from the file in `$1`, then replaces itself with the
/// program given as the remaining arguments
const RUN_WRAPPER: &str = "f=\"$1\"; shift; exec \"$@\" < \"$f\"";

/// Extra keep-alive time on top of the compile and run deadlines
const TTL_MARGIN: Duration = Duration::from_secs(60);

/// Runs each request in a fresh container through the engine CLI
#[derive(Debug, Clone)]
pub struct DockerRunner {
    config: Config,
    admission: Option<Arc<Semaphore>>,
}

impl DockerRunner {
    /// Create a new runner with the given configuration
    ///
    /// Admission control is enabled when `max_concurrent` is set.
    pub fn new(config: Config) -> Self {
        let admission = config
            .max_concurrent
            .map(|n| Arc::new(Semaphore::new(n)));
        Self { config, admission }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of containers that may still be started right now, if capped
    pub fn available(&self) -> Option<usize> {
        self.admission.as_ref().map(|s| s.available_permits())
    }

    fn container_spec(&self, request: &ExecutionRequest) -> ContainerSpec {
        let ttl = Duration::from_secs_f64(self.config.compile_time_limit)
            + Duration::from_secs_f64(request.time_limit_seconds())
            + TTL_MARGIN;

        ContainerSpec {
            image: request.language().image.clone(),
            limits: ContainerLimits {
                memory_mb: request.memory_limit_mb(),
                cpus: self.config.cpus,
                max_processes: self.config.max_processes,
                scratch_dir: self.config.scratch_dir.clone(),
                scratch_size_mb: self.config.scratch_size_mb,
            },
            ttl,
        }
    }

    fn max_output(&self) -> usize {
        (self.config.max_output_kb as usize).saturating_mul(1024)
    }

    /// Everything that happens between creation and removal of the container
    async fn execute_in(
        &self,
        container: &Container,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let profile = request.language();
        let dir = container.scratch_dir();

        container
            .write_file(profile.source_name.as_str(), request.source().as_bytes())
            .await?;
        let input_path = container
            .write_file(INPUT_FILE, request.stdin().as_bytes())
            .await?;

        if let Some(argv) = profile.compile_argv(dir) {
            let deadline = Duration::from_secs_f64(self.config.compile_time_limit);
            let step = container
                .exec(argv, &HashMap::new(), None, deadline, self.max_output())
                .await?;

            if !step.succeeded() {
                debug!(exit_code = ?step.exit_code, timed_out = step.timed_out, "compile step failed");
                return Ok(compile_failure(step, self.config.compile_time_limit));
            }
        }

        let mut argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            RUN_WRAPPER.to_string(),
            "sh".to_string(),
            input_path,
        ];
        argv.extend(profile.run_argv(dir));

        let deadline = Duration::from_secs_f64(request.time_limit_seconds());
        let step = container
            .exec(argv, &profile.run.env, None, deadline, self.max_output())
            .await?;

        if step.timed_out
            && let Err(e) = container.kill().await
        {
            warn!(container = %container.name(), error = %e, "failed to kill container after deadline");
        }

        Ok(run_outcome(step))
    }
}

#[async_trait]
impl Runner for DockerRunner {
    #[instrument(skip(self, request), fields(language = %request.language().id))]
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, SandboxError> {
        let permit = match &self.admission {
            Some(semaphore) => Some(
                semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| SandboxError::AdmissionClosed)?,
            ),
            None => None,
        };

        let spec = self.container_spec(request);
        let mut container = Container::create(self.config.docker_binary(), &spec).await?;
        if let Some(permit) = permit {
            container = container.with_permit(permit);
        }

        let result = self.execute_in(&container, request).await;

        // Removal runs on every path; a failed removal does not hide the result
        let name = container.name().to_string();
        if let Err(e) = container.remove().await {
            warn!(container = %name, error = %e, "failed to remove container");
        }

        if let Ok(ref outcome) = result {
            debug!(
                exit_code = outcome.exit_code,
                killed = ?outcome.killed_reason,
                phase = ?outcome.phase,
                wall_ms = outcome.wall_time_ms,
                "execution finished"
            );
        }
        result
    }
}

/// Outcome of a compile step that did not succeed
fn compile_failure(step: StepOutput, limit_seconds: f64) -> ExecutionOutcome {
    let mut diagnostics = step.stderr_lossy();
    let stdout = step.stdout_lossy();
    if !stdout.trim().is_empty() {
        if !diagnostics.is_empty() && !diagnostics.ends_with('\n') {
            diagnostics.push('\n');
        }
        diagnostics.push_str(&stdout);
    }

    // The memory ceiling covers the compiler as well
    let (exit_code, killed_reason) = if step.timed_out {
        diagnostics = format!("Compilation timed out after {limit_seconds} seconds");
        (TIMEOUT_EXIT_CODE, KilledReason::None)
    } else {
        match step.exit_code {
            Some(OOM_EXIT_CODE) => (OOM_EXIT_CODE, KilledReason::Oom),
            code => (code.unwrap_or(-1), KilledReason::None),
        }
    };

    ExecutionOutcome {
        stdout: String::new(),
        stderr: diagnostics,
        exit_code,
        wall_time_ms: step.wall_time.as_millis() as u64,
        killed_reason,
        phase: Phase::Compile,
    }
}

/// Outcome of the run step
fn run_outcome(step: StepOutput) -> ExecutionOutcome {
    let (exit_code, killed_reason) = if step.timed_out {
        (TIMEOUT_EXIT_CODE, KilledReason::Timeout)
    } else {
        match step.exit_code {
            Some(OOM_EXIT_CODE) => (OOM_EXIT_CODE, KilledReason::Oom),
            Some(code) => (code, KilledReason::None),
            None => (-1, KilledReason::None),
        }
    };

    ExecutionOutcome {
        stdout: step.stdout_lossy(),
        stderr: step.stderr_lossy(),
        exit_code,
        wall_time_ms: step.wall_time.as_millis() as u64,
        killed_reason,
        phase: Phase::Run,
    }
}
