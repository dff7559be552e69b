//! Run configuration resolved and validated from raw inputs.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::ConfigError;
use crate::workflow::WorkflowContext;

/// Validated configuration for one pipeline run.
///
/// The token never appears in `Debug` output.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Canonical host directory the findings file is written into.
    pub report_dir: PathBuf,
    /// File name of the findings file inside `report_dir`.
    pub report_filename: String,
    /// Directory of Flyway migrations to apply, if any.
    pub migration_source: Option<PathBuf>,
    /// SQL script applied after migrations, if any.
    pub init_script: Option<PathBuf>,
    /// Analyzer configuration file, if any.
    pub config_file: Option<PathBuf>,
    pub dblinter_version: String,
    pub postgres_version: String,
    pub flyway_version: String,
    /// Whether findings should be posted as a pull request comment.
    pub publish_comment: bool,
    pub github_token: Option<String>,
}

impl PipelineConfig {
    /// Validates the raw inputs against the filesystem and the workflow
    /// context.
    pub fn resolve(cli: &Cli, context: &WorkflowContext) -> Result<Self, ConfigError> {
        let (report_dir, report_filename) = split_report_path(&cli.report_path)?;
        let migration_source =
            resolve_existing("flyway-migration", cli.flyway_migration.as_deref())?;
        let init_script = resolve_existing("init-script", cli.init_script.as_deref())?;
        let config_file = resolve_existing("dblinter-config", cli.dblinter_config.as_deref())?;

        validate_version_tag("dblinter-version", &cli.dblinter_version)?;
        validate_version_tag("postgres-version", &cli.postgres_version)?;
        validate_version_tag("flyway-version", &cli.flyway_version)?;

        let github_token = cli
            .github_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(String::from);

        // Commenting needs credentials only when this run can actually
        // comment, i.e. the triggering event is a pull request.
        if cli.pr_comment && context.is_pull_request() {
            if github_token.is_none() {
                return Err(ConfigError::MissingToken);
            }
            if context.repository.is_none() {
                return Err(ConfigError::MissingRepository);
            }
        }

        Ok(Self {
            report_dir,
            report_filename,
            migration_source,
            init_script,
            config_file,
            dblinter_version: cli.dblinter_version.clone(),
            postgres_version: cli.postgres_version.clone(),
            flyway_version: cli.flyway_version.clone(),
            publish_comment: cli.pr_comment,
            github_token,
        })
    }

    /// Full host path of the findings file.
    pub fn report_path(&self) -> PathBuf {
        self.report_dir.join(&self.report_filename)
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("report_dir", &self.report_dir)
            .field("report_filename", &self.report_filename)
            .field("migration_source", &self.migration_source)
            .field("init_script", &self.init_script)
            .field("config_file", &self.config_file)
            .field("dblinter_version", &self.dblinter_version)
            .field("postgres_version", &self.postgres_version)
            .field("flyway_version", &self.flyway_version)
            .field("publish_comment", &self.publish_comment)
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn split_report_path(raw: &str) -> Result<(PathBuf, String), ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ConfigError::InvalidValue {
            input: "report-path".to_string(),
            message: "a file path is required".to_string(),
        });
    }
    let path = Path::new(raw);
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ConfigError::InvalidValue {
            input: "report-path".to_string(),
            message: "the path must end in a file name".to_string(),
        })?
        .to_string();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    // Bind mounts need an absolute host path.
    let report_dir = parent
        .canonicalize()
        .map_err(|source| ConfigError::PathNotFound {
            input: "report-path".to_string(),
            path: parent.display().to_string(),
            source,
        })?;
    Ok((report_dir, filename))
}

fn resolve_existing(input: &str, raw: Option<&str>) -> Result<Option<PathBuf>, ConfigError> {
    let raw = match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(None),
    };
    let path = Path::new(raw)
        .canonicalize()
        .map_err(|source| ConfigError::PathNotFound {
            input: input.to_string(),
            path: raw.to_string(),
            source,
        })?;
    Ok(Some(path))
}

// Version tags become part of image references handed to the container
// engine, so only characters valid in registry tags are accepted.
fn validate_version_tag(input: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::InvalidValue {
            input: input.to_string(),
            message: "a version tag is required".to_string(),
        });
    }
    if let Some(found) = value
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return Err(ConfigError::InvalidVersion {
            input: input.to_string(),
            value: value.to_string(),
            found,
        });
    }
    Ok(())
}
