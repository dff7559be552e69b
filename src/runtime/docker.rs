//! [`ContainerRuntime`] backed by the `docker` command line client.

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::RuntimeError;

use super::{excerpt, ContainerRuntime, ContainerSpec, ExecOutput};

/// Go template that prints the address of the first attached network.
const NETWORK_ADDRESS_FORMAT: &str = "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}";

const STDERR_EXCERPT: usize = 500;

/// How `docker run` should treat the container lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Start in the background and return immediately.
    Detached,
    /// Wait for exit and remove the container afterwards.
    RemoveOnExit,
}

/// Builds the argument vector for `docker run`.
///
/// Kept as a pure function so the exact invocation can be asserted on
/// without a container engine present.
pub fn run_args(spec: &ContainerSpec, mode: RunMode) -> Vec<String> {
    let mut args = vec!["run".to_string()];
    match mode {
        RunMode::Detached => args.push("-d".to_string()),
        RunMode::RemoveOnExit => args.push("--rm".to_string()),
    }
    if let Some(user) = &spec.user {
        args.push("-u".to_string());
        args.push(user.clone());
    }
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    for mount in &spec.mounts {
        args.push("-v".to_string());
        args.push(mount.to_bind_arg());
    }
    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

/// Container engine driven through the `docker` binary.
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }

    /// Uses an alternative client binary, e.g. `podman`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    // The summary is what ends up in logs and error messages. It names the
    // verb and the image or container only; environment values stay out.
    async fn invoke(&self, args: &[String], summary: &str) -> Result<ExecOutput, RuntimeError> {
        debug!(command = %summary, "invoking container engine");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        Ok(into_exec_output(output))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

fn into_exec_output(output: std::process::Output) -> ExecOutput {
    ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    }
}

fn require_success(output: &ExecOutput, summary: &str) -> Result<(), RuntimeError> {
    if output.success() {
        return Ok(());
    }
    Err(RuntimeError::NonZeroExit {
        command: summary.to_string(),
        code: output.exit_code,
        stderr: excerpt(&output.stderr, STDERR_EXCERPT),
    })
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerCli {
    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        let summary = format!("docker pull {}", image);
        info!(image = %image, "pulling image");
        let args = vec!["pull".to_string(), image.to_string()];
        let output = self.invoke(&args, &summary).await?;
        require_success(&output, &summary)
    }

    async fn run_detached(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let summary = format!("docker run -d {}", spec.image);
        let args = run_args(spec, RunMode::Detached);
        let output = self.invoke(&args, &summary).await?;
        require_success(&output, &summary)?;
        let container_id = output.stdout.trim().to_string();
        if container_id.is_empty() {
            return Err(RuntimeError::MalformedOutput {
                command: summary,
                message: "no container id on stdout".to_string(),
            });
        }
        Ok(container_id)
    }

    async fn run_to_completion(&self, spec: &ContainerSpec) -> Result<ExecOutput, RuntimeError> {
        let summary = format!("docker run --rm {}", spec.image);
        let args = run_args(spec, RunMode::RemoveOnExit);
        self.invoke(&args, &summary).await
    }

    async fn inspect_network_address(&self, container_id: &str) -> Result<String, RuntimeError> {
        let summary = format!("docker inspect {}", container_id);
        let args = vec![
            "inspect".to_string(),
            "-f".to_string(),
            NETWORK_ADDRESS_FORMAT.to_string(),
            container_id.to_string(),
        ];
        let output = self.invoke(&args, &summary).await?;
        require_success(&output, &summary)?;
        Ok(output.stdout.trim().to_string())
    }

    async fn kill(&self, container_id: &str) -> Result<(), RuntimeError> {
        let summary = format!("docker kill {}", container_id);
        let args = vec!["kill".to_string(), container_id.to_string()];
        let output = self.invoke(&args, &summary).await?;
        require_success(&output, &summary)
    }
}
