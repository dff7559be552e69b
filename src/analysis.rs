//! Runs the dblinter container against the prepared database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::AnalysisError;
use crate::provision::DatabaseHandle;
use crate::runtime::{excerpt, ContainerRuntime, ContainerSpec, Mount};

const DBLINTER_IMAGE: &str = "decathlon/dblinter";
const REPORT_DIR: &str = "/report";
const CONFIG_DIR: &str = "/config";
const STDERR_EXCERPT: usize = 500;

/// Executes the static analyzer and locates the findings file it wrote.
pub struct AnalysisRunner {
    runtime: Arc<dyn ContainerRuntime>,
    dblinter_version: String,
}

impl AnalysisRunner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, dblinter_version: impl Into<String>) -> Self {
        Self {
            runtime,
            dblinter_version: dblinter_version.into(),
        }
    }

    pub fn image(&self) -> String {
        format!("{}:{}", DBLINTER_IMAGE, self.dblinter_version)
    }

    /// Runs the analyzer and returns the host path of the findings file.
    pub async fn run(
        &self,
        database: &DatabaseHandle,
        report_dir: &Path,
        report_filename: &str,
        config_file: Option<&Path>,
    ) -> Result<PathBuf, AnalysisError> {
        let image = self.image();
        info!(image = %image, "running analysis");
        let spec = container_spec(
            &image,
            database,
            report_dir,
            report_filename,
            config_file,
            current_uid(),
        );
        let output = self.runtime.run_to_completion(&spec).await?;
        if !output.success() {
            return Err(AnalysisError::ToolFailed {
                code: output.exit_code,
                stderr: excerpt(&output.stderr, STDERR_EXCERPT),
            });
        }

        let report_path = report_dir.join(report_filename);
        if !report_path.is_file() {
            return Err(AnalysisError::ReportMissing {
                path: report_path.display().to_string(),
            });
        }
        info!(report = %report_path.display(), "analysis report written");
        Ok(report_path)
    }
}

// The analyzer writes the report into the bind mount; running it as the
// host user keeps that file readable by the rest of the run.
fn current_uid() -> String {
    nix::unistd::getuid().as_raw().to_string()
}

fn container_spec(
    image: &str,
    database: &DatabaseHandle,
    report_dir: &Path,
    report_filename: &str,
    config_file: Option<&Path>,
    uid: String,
) -> ContainerSpec {
    let mut spec = ContainerSpec::new(image)
        .with_user(uid)
        .with_mount(Mount::new(report_dir, REPORT_DIR))
        .with_args([
            "--dbname".to_string(),
            database.database.clone(),
            "--host".to_string(),
            database.host.clone(),
            "--user".to_string(),
            database.user.clone(),
            "--password".to_string(),
            database.password().to_string(),
            "--port".to_string(),
            database.port.to_string(),
            "-o".to_string(),
            format!("{}/{}", REPORT_DIR, report_filename),
        ]);

    if let Some(config) = config_file {
        let config_dir = config.parent().unwrap_or_else(|| Path::new("/"));
        let config_name = config
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        spec = spec
            .with_mount(Mount::readonly(config_dir, CONFIG_DIR))
            .with_args([
                "-f".to_string(),
                format!("{}/{}", CONFIG_DIR, config_name),
            ]);
    }
    spec
}
