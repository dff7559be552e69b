//! Container runtime abstraction.
//!
//! Every container the pipeline touches goes through [`ContainerRuntime`],
//! so the orchestration logic can be exercised in tests without Docker
//! installed. The production implementation is [`DockerCli`], which shells
//! out to the `docker` binary.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::RuntimeError;

mod docker;

pub use docker::DockerCli;

/// A host directory mapped into a container.
#[derive(Debug, Clone)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub readonly: bool,
}

impl Mount {
    pub fn new(host_path: impl AsRef<Path>, container_path: impl AsRef<Path>) -> Self {
        Self {
            host_path: host_path.as_ref().to_path_buf(),
            container_path: container_path.as_ref().to_path_buf(),
            readonly: false,
        }
    }

    pub fn readonly(host_path: impl AsRef<Path>, container_path: impl AsRef<Path>) -> Self {
        Self {
            readonly: true,
            ..Self::new(host_path, container_path)
        }
    }

    /// Renders the mount as a `-v` argument value.
    pub fn to_bind_arg(&self) -> String {
        let ro = if self.readonly { ":ro" } else { "" };
        format!(
            "{}:{}{}",
            self.host_path.display(),
            self.container_path.display(),
            ro
        )
    }
}

/// Everything needed to run one container.
///
/// Environment values are passed to the runtime as an argument vector,
/// never interpolated into a shell string, and they are omitted from log
/// output because they may carry credentials.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
    pub args: Vec<String>,
    pub user: Option<String>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            env: Vec::new(),
            mounts: Vec::new(),
            args: Vec::new(),
            user: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

/// Captured output of a container that ran to completion.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations the pipeline needs from a container engine.
///
/// `run_to_completion` reports a non-zero container exit through
/// [`ExecOutput::exit_code`] rather than an error; callers decide whether
/// that is fatal. Errors are reserved for the engine itself failing.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Fetches an image so later runs start without a download pause.
    async fn pull(&self, image: &str) -> Result<(), RuntimeError>;

    /// Starts a container in the background and returns its identifier.
    async fn run_detached(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Runs a container until it exits and captures its output.
    async fn run_to_completion(&self, spec: &ContainerSpec) -> Result<ExecOutput, RuntimeError>;

    /// Returns the container's address on its attached network.
    async fn inspect_network_address(&self, container_id: &str) -> Result<String, RuntimeError>;

    /// Terminates a running container.
    async fn kill(&self, container_id: &str) -> Result<(), RuntimeError>;
}

/// Shortens captured output for inclusion in error messages.
pub(crate) fn excerpt(s: &str, max_len: usize) -> String {
    let s = s.trim();
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
