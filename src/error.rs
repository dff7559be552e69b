//! Error types for the pipeline subsystems.
//!
//! Defines error types for all major subsystems:
//! - Input resolution and validation
//! - Container runtime invocations
//! - Database provisioning
//! - Schema preparation (migrations, init scripts)
//! - Analysis runs
//! - Findings parsing and publication

use thiserror::Error;

/// Errors from the container runtime layer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with code {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("'{command}' produced unusable output: {message}")]
    MalformedOutput { command: String, message: String },
}

/// Errors that can occur while resolving run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{input}': {message}")]
    InvalidValue { input: String, message: String },

    #[error("path given for '{input}' does not exist: '{path}': {source}")]
    PathNotFound {
        input: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("version for '{input}' contains invalid character '{found}': '{value}'")]
    InvalidVersion {
        input: String,
        value: String,
        found: char,
    },

    #[error("pr-comment is enabled for a pull request event but no GitHub token was provided")]
    MissingToken,

    #[error("pr-comment is enabled but GITHUB_REPOSITORY is not set")]
    MissingRepository,

    #[error("failed to read event payload '{path}': {message}")]
    EventPayload { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while provisioning the database container.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to start the database container: {0}")]
    Start(#[source] RuntimeError),

    #[error("failed to inspect the database container: {0}")]
    Inspect(#[source] RuntimeError),

    #[error("container '{container_id}' reported no network address")]
    AddressUnavailable { container_id: String },
}

/// Errors that can occur while preparing the database schema.
#[derive(Debug, Error)]
pub enum PreparationError {
    #[error("migration container could not be executed: {0}")]
    Migration(#[source] RuntimeError),

    #[error("flyway migrate exited with code {code}: {stderr}")]
    MigrationFailed { code: i32, stderr: String },

    #[error("failed to run psql: {0}")]
    PsqlSpawn(#[source] std::io::Error),

    #[error("init script '{path}' exited with code {code}: {stderr}")]
    InitScriptFailed {
        path: String,
        code: i32,
        stderr: String,
    },
}

/// Errors that can occur during the analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis container could not be executed: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("dblinter exited with code {code}: {stderr}")]
    ToolFailed { code: i32, stderr: String },

    #[error("analysis finished but no report was written to '{path}'")]
    ReportMissing { path: String },
}

/// Errors that can occur while loading a findings report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to read findings file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("findings file '{path}' is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors that can occur while publishing findings on the pull request.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("could not load findings report: {0}")]
    Report(#[from] ReportError),
}
