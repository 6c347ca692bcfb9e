//! Command builder for the container engine CLI
//!
//! Builds argument vectors for `docker` (or a CLI-compatible engine). Every
//! value is passed as its own argument; nothing is ever handed to a host shell.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Isolation settings applied when a container is created
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerLimits {
    /// Hard memory ceiling in megabytes (swap disabled)
    pub memory_mb: u64,
    /// Logical CPUs
    pub cpus: f64,
    /// --pids-limit
    pub max_processes: u32,
    /// Mount point of the scratch tmpfs
    pub scratch_dir: String,
    /// Size of the scratch tmpfs in megabytes
    pub scratch_size_mb: u64,
}

/// Builder for container engine arguments
#[derive(Debug)]
pub struct DockerCommand {
    /// Path to the engine binary
    docker_path: PathBuf,
    /// One of run, exec, kill, rm
    action: DockerAction,
    /// --name for create, target container otherwise
    name: String,
    image: Option<String>,
    limits: Option<ContainerLimits>,
    /// -e, --env (exec only)
    env: BTreeMap<String, String>,
    /// -i, --interactive (exec only)
    interactive: bool,
    /// -w, --workdir (exec only)
    working_dir: Option<String>,
    command: Vec<String>,
}

impl DockerCommand {
    /// Create a new command builder targeting the named container
    pub fn new(docker_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            docker_path: docker_path.into(),
            action: DockerAction::Exec,
            name: name.into(),
            image: None,
            limits: None,
            env: BTreeMap::new(),
            interactive: false,
            working_dir: None,
            command: Vec::new(),
        }
    }

    /// Set the action to perform
    pub fn action(mut self, action: DockerAction) -> Self {
        self.action = action;
        self
    }

    /// Set the image a new container is created from
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set isolation limits for a new container
    pub fn limits(mut self, limits: ContainerLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Set an environment variable for an exec
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Keep stdin open so a payload can be piped into the exec
    pub fn interactive(mut self, enable: bool) -> Self {
        self.interactive = enable;
        self
    }

    /// Set the working directory inside the container
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the command to run
    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Build the command-line arguments
    ///
    /// Consumes self to avoid cloning the command vector.
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.docker_path.to_string_lossy().into_owned()];

        match self.action {
            DockerAction::Create => {
                args.push("run".to_string());
                args.push("--detach".to_string());
                args.push("--rm".to_string());
                args.push(format!("--name={}", self.name));
                args.push("--network=none".to_string());
                args.push("--cap-drop=ALL".to_string());
                args.push("--security-opt=no-new-privileges".to_string());

                if let Some(ref limits) = self.limits {
                    args.push(format!("--memory={}m", limits.memory_mb));
                    // Equal to --memory: no swap, so the ceiling is a hard kill
                    args.push(format!("--memory-swap={}m", limits.memory_mb));
                    args.push(format!("--cpus={}", limits.cpus));
                    args.push(format!("--pids-limit={}", limits.max_processes));
                    args.push(format!(
                        "--tmpfs={}:rw,exec,nosuid,size={}m",
                        limits.scratch_dir, limits.scratch_size_mb
                    ));
                    args.push(format!("--workdir={}", limits.scratch_dir));
                }

                if let Some(image) = self.image {
                    args.push(image);
                }
                args.extend(self.command);
            }
            DockerAction::Exec => {
                args.push("exec".to_string());
                if self.interactive {
                    args.push("--interactive".to_string());
                }
                if let Some(ref dir) = self.working_dir {
                    args.push(format!("--workdir={dir}"));
                }
                for (key, value) in &self.env {
                    args.push(format!("--env={key}={value}"));
                }
                args.push(self.name);
                args.extend(self.command);
            }
            DockerAction::Kill => {
                args.push("kill".to_string());
                args.push(self.name);
            }
            DockerAction::Remove => {
                args.push("rm".to_string());
                args.push("--force".to_string());
                args.push(self.name);
            }
        }

        args
    }

    /// Get the engine binary path
    pub fn docker_path(&self) -> &Path {
        &self.docker_path
    }

    /// Get the container name
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerAction {
    /// Create and start a detached container
    Create,
    /// Run a command in a running container
    Exec,
    /// Send SIGKILL to every process in the container
    Kill,
    /// Force-remove the container
    Remove,
}
