//! GitHub Actions workflow integration.
//!
//! Reads the runner environment (event name, repository, event payload) and
//! speaks the two workflow commands the pipeline needs: masking secrets and
//! publishing step outputs.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct EventPayload {
    #[serde(default)]
    pull_request: Option<PullRequestRef>,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    number: u64,
}

/// What the surrounding workflow run looks like.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub event_name: Option<String>,
    pub repository: Option<String>,
    /// Number of the pull request that triggered the run, if any.
    pub pull_request: Option<u64>,
    pub api_url: String,
}

impl WorkflowContext {
    /// Builds the context from the environment the runner provides.
    ///
    /// Everything is optional so the tool also runs outside a workflow;
    /// only the pieces needed for commenting require the full context.
    pub fn from_env() -> Result<Self, ConfigError> {
        let event_name = env::var("GITHUB_EVENT_NAME").ok().filter(|v| !v.is_empty());
        let repository = env::var("GITHUB_REPOSITORY").ok().filter(|v| !v.is_empty());
        let api_url = env::var("GITHUB_API_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let pull_request = match env::var("GITHUB_EVENT_PATH") {
            Ok(path) if !path.is_empty() => read_pull_request_number(Path::new(&path))?,
            _ => None,
        };

        Ok(Self {
            event_name,
            repository,
            pull_request,
            api_url,
        })
    }

    pub fn is_pull_request(&self) -> bool {
        self.event_name
            .as_deref()
            .map(|name| name.eq_ignore_ascii_case("pull_request"))
            .unwrap_or(false)
    }
}

fn read_pull_request_number(path: &Path) -> Result<Option<u64>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::EventPayload {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let payload: EventPayload =
        serde_json::from_str(&raw).map_err(|e| ConfigError::EventPayload {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(payload.pull_request.map(|pr| pr.number))
}

/// Asks the workflow runner to mask a value in all later log output.
///
/// Must reach stdout before the value can appear anywhere else. The values
/// passed here are single-line tokens, so no escaping is needed.
pub fn add_mask(value: &str) {
    println!("::add-mask::{}", value);
}

/// Publishes a step output by appending to the file named in `GITHUB_OUTPUT`.
///
/// Outside a workflow the variable is unset and the call is a no-op.
pub fn set_output(name: &str, value: &str) -> std::io::Result<()> {
    let path = match env::var("GITHUB_OUTPUT") {
        Ok(path) if !path.is_empty() => path,
        _ => {
            debug!(output = %name, "GITHUB_OUTPUT is not set, skipping step output");
            return Ok(());
        }
    };
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}={}", name, value)
}
