//! Container lifecycle management
//!
//! Creates one uniquely named container per execution, moves payloads into
//! it, runs steps inside it and removes it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::sandbox::SandboxError;
use crate::sandbox::command::{ContainerLimits, DockerAction, DockerCommand};
use crate::sandbox::process::{StepOutput, run_step};

/// Deadline for engine housekeeping commands (create, write, remove).
/// Generous because `run` may have to pull the image first.
const ENGINE_DEADLINE: Duration = Duration::from_secs(300);

/// Decodes a base64 payload from stdin into the file named by `$1`.
/// The script is constant; only the host-chosen path is passed as an argument.
const DECODE_SCRIPT: &str = "base64 -d > \"$1\"";

/// Everything needed to create a container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub limits: ContainerLimits,
    /// Lifetime of the keep-alive process; the container exits on its own afterwards
    pub ttl: Duration,
}

/// A running, uniquely named container
///
/// # Cleanup
///
/// Call [`remove()`](Self::remove) when done. If the container is dropped
/// while still running, `Drop` logs a warning and force-removes it from a
/// spawned thread; that path is best-effort only.
#[derive(Debug)]
pub struct Container {
    name: String,
    docker_path: PathBuf,
    image: String,
    scratch_dir: String,
    running: bool,
    /// Admission permit held for the container's lifetime
    _permit: Option<OwnedSemaphorePermit>,
}

impl Container {
    /// Create and start a new container
    #[instrument(skip(docker_path, spec), fields(image = %spec.image))]
    pub async fn create(
        docker_path: impl Into<PathBuf>,
        spec: &ContainerSpec,
    ) -> Result<Self, SandboxError> {
        let docker_path = docker_path.into();
        let name = format!("judgebox-{}", Uuid::new_v4().simple());

        let args = DockerCommand::new(&docker_path, &name)
            .action(DockerAction::Create)
            .image(&spec.image)
            .limits(spec.limits.clone())
            .command(["sleep".to_string(), spec.ttl.as_secs().max(1).to_string()])
            .build();

        debug!(?args, "creating container");

        let output = run_step(args, None, ENGINE_DEADLINE, 64 * 1024).await?;

        // The engine may have created it even if `run` failed; owning it
        // here means every path below still tears it down
        let container = Self {
            name,
            docker_path,
            image: spec.image.clone(),
            scratch_dir: spec.limits.scratch_dir.clone(),
            running: true,
            _permit: None,
        };

        if !output.succeeded() {
            let message = if output.timed_out {
                "timed out waiting for the container to start".to_string()
            } else {
                output.stderr_lossy().trim().to_string()
            };
            let image = container.image.clone();
            if let Err(e) = container.remove().await {
                warn!(error = %e, "failed to remove container after launch failure");
            }
            return Err(SandboxError::LaunchFailed { image, message });
        }

        debug!(name = %container.name, "container started");
        Ok(container)
    }

    /// Get the container name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the image the container was created from
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Get the scratch directory inside the container
    pub fn scratch_dir(&self) -> &str {
        &self.scratch_dir
    }

    /// Get the path to the engine binary
    pub fn docker_path(&self) -> &Path {
        &self.docker_path
    }

    /// Get the in-container path of a file in the scratch directory
    ///
    /// Returns an error if the name is not a plain file name.
    pub fn scratch_path(&self, name: &str) -> Result<String, SandboxError> {
        if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\0') {
            return Err(SandboxError::InvalidPath(format!(
                "not a plain file name: {name:?}"
            )));
        }
        Ok(format!("{}/{}", self.scratch_dir.trim_end_matches('/'), name))
    }

    /// Write a payload into the scratch directory
    ///
    /// The bytes travel base64-encoded over the exec's stdin and are decoded
    /// inside the container, so their content is never interpreted by a shell.
    /// Returns the in-container path of the written file.
    #[instrument(skip(self, content), fields(container = %self.name))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<String, SandboxError> {
        let path = self.scratch_path(name)?;

        let args = DockerCommand::new(&self.docker_path, &self.name)
            .interactive(true)
            .command([
                "sh".to_string(),
                "-c".to_string(),
                DECODE_SCRIPT.to_string(),
                "sh".to_string(),
                path.clone(),
            ])
            .build();

        let payload = BASE64.encode(content).into_bytes();
        let output = run_step(args, Some(payload), ENGINE_DEADLINE, 64 * 1024).await?;

        if !output.succeeded() {
            return Err(SandboxError::WriteFailed {
                container: self.name.clone(),
                name: name.to_string(),
                message: output.stderr_lossy().trim().to_string(),
            });
        }

        debug!(%path, len = content.len(), "wrote file to container");
        Ok(path)
    }

    /// Run a command inside the container
    #[instrument(skip(self, argv, env, stdin), fields(container = %self.name))]
    pub async fn exec(
        &self,
        argv: Vec<String>,
        env: &HashMap<String, String>,
        stdin: Option<Vec<u8>>,
        deadline: Duration,
        max_output: usize,
    ) -> Result<StepOutput, SandboxError> {
        let mut cmd = DockerCommand::new(&self.docker_path, &self.name)
            .interactive(stdin.is_some())
            .working_dir(&self.scratch_dir)
            .command(argv);
        for (key, value) in env {
            cmd = cmd.env(key, value);
        }
        let args = cmd.build();

        debug!(?args, "executing in container");
        run_step(args, stdin, deadline, max_output).await
    }

    /// Kill every process in the container
    ///
    /// Used after a step overran its deadline; the exec client being gone does
    /// not stop the process inside.
    #[instrument(skip(self), fields(container = %self.name))]
    pub async fn kill(&self) -> Result<(), SandboxError> {
        let args = DockerCommand::new(&self.docker_path, &self.name)
            .action(DockerAction::Kill)
            .build();
        let output = run_step(args, None, ENGINE_DEADLINE, 64 * 1024).await?;
        if !output.succeeded() {
            debug!(stderr = %output.stderr_lossy().trim(), "kill reported failure");
        }
        Ok(())
    }

    /// Force-remove the container
    ///
    /// # Errors
    ///
    /// Returns an error if the engine reports a failure other than the
    /// container already being gone.
    #[must_use = "cleanup errors should be handled"]
    #[instrument(skip(self), fields(container = %self.name))]
    pub async fn remove(mut self) -> Result<(), SandboxError> {
        self.force_remove().await
    }

    /// Removal that leaves the guard armed on failure, so `Drop` retries
    async fn force_remove(&mut self) -> Result<(), SandboxError> {
        if !self.running {
            return Ok(());
        }

        let args = DockerCommand::new(&self.docker_path, &self.name)
            .action(DockerAction::Remove)
            .build();

        debug!(?args, "removing container");

        let output = run_step(args, None, ENGINE_DEADLINE, 64 * 1024).await?;
        let stderr = output.stderr_lossy();
        if !output.succeeded() && !is_already_gone(&stderr) {
            warn!(name = %self.name, stderr = %stderr, "container removal failed");
            return Err(SandboxError::CleanupFailed {
                name: self.name.clone(),
                message: stderr.trim().to_string(),
            });
        }

        self.running = false;
        debug!("container removed");
        Ok(())
    }

    /// Attach an admission permit to this container
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }

    /// Check if the container has not been removed yet
    pub fn is_running(&self) -> bool {
        self.running
    }
}

fn is_already_gone(stderr: &str) -> bool {
    stderr.contains("No such container")
}

impl Drop for Container {
    fn drop(&mut self) {
        if self.running {
            warn!(
                container = %self.name,
                "Container dropped without explicit removal! \
                 Attempting best-effort removal via spawned thread (may not complete)."
            );

            let args = DockerCommand::new(&self.docker_path, &self.name)
                .action(DockerAction::Remove)
                .build();
            let name = self.name.clone();

            std::thread::spawn(move || {
                if let Some(program) = args.first() {
                    match std::process::Command::new(program)
                        .args(&args[1..])
                        .output()
                    {
                        Ok(output) if output.status.success() => {
                            debug!(container = %name, "best-effort removal succeeded");
                        }
                        Ok(output) => {
                            let stderr = String::from_utf8_lossy(&output.stderr);
                            if !is_already_gone(&stderr) {
                                warn!(container = %name, stderr = %stderr, "best-effort removal failed");
                            }
                        }
                        Err(e) => {
                            warn!(container = %name, error = %e, "best-effort removal spawn failed");
                        }
                    }
                }
            });
        }
    }
}
