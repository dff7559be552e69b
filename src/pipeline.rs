//! Pipeline orchestration.
//!
//! Drives a run through its stages: pull images, provision the database,
//! prepare the schema, analyze, publish, terminate. Once the database
//! container is up it is stopped exactly once on every path; when both a
//! stage and the teardown fail, the stage error is the one reported.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::analysis::AnalysisRunner;
use crate::config::PipelineConfig;
use crate::error::{AnalysisError, PreparationError, ProvisionError, RuntimeError};
use crate::github::ReviewPlatform;
use crate::prepare::SchemaPreparer;
use crate::provision::{DatabaseHandle, PostgresProvisioner};
use crate::publish::ResultPublisher;
use crate::runtime::ContainerRuntime;
use crate::workflow::{self, WorkflowContext};

/// Name of the step output carrying the findings file path.
pub const REPORT_OUTPUT: &str = "sarif-report";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image pull failed: {0}")]
    Pull(RuntimeError),

    #[error("database provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("schema preparation failed: {0}")]
    Preparation(#[from] PreparationError),

    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("database teardown failed: {0}")]
    Termination(RuntimeError),
}

/// Stages a run moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    Pulling,
    Provisioning,
    Preparing,
    Analyzing,
    Publishing,
    Terminating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::Pulling => "pulling",
            Stage::Provisioning => "provisioning",
            Stage::Preparing => "preparing",
            Stage::Analyzing => "analyzing",
            Stage::Publishing => "publishing",
            Stage::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub report_path: PathBuf,
    pub comment_published: bool,
}

/// Owns the per-stage components and sequences one run.
pub struct Pipeline {
    config: PipelineConfig,
    context: WorkflowContext,
    provisioner: PostgresProvisioner,
    preparer: SchemaPreparer,
    analyzer: AnalysisRunner,
    publisher: Option<ResultPublisher>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        context: WorkflowContext,
        runtime: Arc<dyn ContainerRuntime>,
        platform: Option<Arc<dyn ReviewPlatform>>,
    ) -> Self {
        let provisioner = PostgresProvisioner::new(runtime.clone());
        let preparer = SchemaPreparer::new(runtime.clone(), config.flyway_version.clone());
        let analyzer = AnalysisRunner::new(runtime.clone(), config.dblinter_version.clone());
        let publisher = platform.map(ResultPublisher::new);
        Self {
            config,
            context,
            provisioner,
            preparer,
            analyzer,
            publisher,
            runtime,
        }
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        self.pull_images().await?;

        info!(stage = %Stage::Provisioning, "starting database");
        let database = self
            .provisioner
            .provision(&self.config.postgres_version)
            .await?;

        let outcome = self.run_against(&database).await;

        info!(stage = %Stage::Terminating, "stopping database");
        let teardown = self.provisioner.teardown(database).await;
        if let (Err(teardown_err), Err(_)) = (&teardown, &outcome) {
            warn!(error = %teardown_err, "teardown also failed; reporting the stage error");
        }
        let summary = outcome?;
        teardown.map_err(PipelineError::Termination)?;
        Ok(summary)
    }

    async fn pull_images(&self) -> Result<(), PipelineError> {
        let images = [
            self.analyzer.image(),
            self.preparer.image(),
            PostgresProvisioner::image(&self.config.postgres_version),
        ];
        info!(stage = %Stage::Pulling, images = ?images, "fetching container images");
        try_join_all(images.iter().map(|image| self.runtime.pull(image)))
            .await
            .map_err(PipelineError::Pull)?;
        Ok(())
    }

    async fn run_against(&self, database: &DatabaseHandle) -> Result<RunSummary, PipelineError> {
        info!(stage = %Stage::Preparing, "preparing schema");
        self.preparer
            .prepare(
                database,
                self.config.migration_source.as_deref(),
                self.config.init_script.as_deref(),
            )
            .await?;

        info!(stage = %Stage::Analyzing, "running analyzer");
        let report_path = self
            .analyzer
            .run(
                database,
                &self.config.report_dir,
                &self.config.report_filename,
                self.config.config_file.as_deref(),
            )
            .await?;

        if let Err(err) = workflow::set_output(REPORT_OUTPUT, &report_path.display().to_string()) {
            warn!(error = %err, "could not write step output");
        }

        let comment_published = self.publish_findings(&report_path).await;

        Ok(RunSummary {
            report_path,
            comment_published,
        })
    }

    async fn publish_findings(&self, report_path: &Path) -> bool {
        let publisher = match &self.publisher {
            Some(publisher) => publisher,
            None => {
                info!(stage = %Stage::Publishing, "publishing disabled, skipping comment");
                return false;
            }
        };
        let pr_number = match self.context.pull_request {
            Some(number) => number,
            None => {
                info!(stage = %Stage::Publishing, "no pull request in this event, skipping comment");
                return false;
            }
        };

        info!(stage = %Stage::Publishing, pr_number, "publishing findings");
        match publisher.publish(report_path, pr_number).await {
            Ok(()) => true,
            Err(err) => {
                // A failed comment does not fail the run.
                error!(error = %err, "failed to publish findings comment");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tempfile::TempDir;

    use crate::github::testing::FakePlatform;
    use crate::runtime::testing::RecordingRuntime;
    use crate::workflow::DEFAULT_API_URL;

    use super::*;

    fn test_config(dir: &TempDir, publish: bool) -> PipelineConfig {
        PipelineConfig {
            report_dir: dir.path().to_path_buf(),
            report_filename: "report.json".to_string(),
            migration_source: None,
            init_script: None,
            config_file: None,
            dblinter_version: "latest".to_string(),
            postgres_version: "16".to_string(),
            flyway_version: "10".to_string(),
            publish_comment: publish,
            github_token: publish.then(|| "token".to_string()),
        }
    }

    fn test_context(pull_request: Option<u64>) -> WorkflowContext {
        let event = if pull_request.is_some() {
            "pull_request"
        } else {
            "push"
        };
        WorkflowContext {
            event_name: Some(event.to_string()),
            repository: Some("acme/widgets".to_string()),
            pull_request,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    fn write_findings(dir: &TempDir, results: &str) {
        std::fs::write(
            dir.path().join("report.json"),
            format!(r#"{{"runs":[{{"results":{}}}]}}"#, results),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_run_success_without_publishing() {
        let dir = tempfile::tempdir().unwrap();
        write_findings(&dir, "[]");

        let mut config = test_config(&dir, false);
        config.migration_source = Some(PathBuf::from("/sql"));

        let runtime = Arc::new(RecordingRuntime::new());
        let pipeline = Pipeline::new(config, test_context(None), runtime.clone(), None);

        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.report_path, dir.path().join("report.json"));
        assert!(!summary.comment_published);
        assert_eq!(runtime.pulled.lock().unwrap().len(), 3);
        assert_eq!(runtime.start_count(), 1);
        assert_eq!(runtime.kill_count(), 1);
        // flyway and the analyzer both ran
        assert_eq!(runtime.completed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_analysis_failure_stops_database_and_skips_comment() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(RecordingRuntime::failing_image("decathlon/dblinter", 3));
        let platform = Arc::new(FakePlatform::new());
        let pipeline = Pipeline::new(
            test_config(&dir, true),
            test_context(Some(12)),
            runtime.clone(),
            Some(platform.clone() as Arc<dyn ReviewPlatform>),
        );

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Analysis(_))));
        assert_eq!(runtime.start_count(), 1);
        assert_eq!(runtime.kill_count(), 1);
        assert_eq!(platform.comment_count(), 0);
    }

    #[tokio::test]
    async fn test_preparation_failure_stops_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir, false);
        config.migration_source = Some(PathBuf::from("/sql"));

        let runtime = Arc::new(RecordingRuntime::failing_image("flyway/flyway", 1));
        let pipeline = Pipeline::new(config, test_context(None), runtime.clone(), None);

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Preparation(_))));
        assert_eq!(runtime.kill_count(), 1);
        // the analyzer never ran
        assert_eq!(runtime.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provision_failure_kills_started_container() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(RecordingRuntime {
            address: String::new(),
            ..RecordingRuntime::new()
        });
        let pipeline = Pipeline::new(
            test_config(&dir, false),
            test_context(None),
            runtime.clone(),
            None,
        );

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Provision(_))));
        assert_eq!(runtime.start_count(), 1);
        assert_eq!(runtime.kill_count(), 1);
    }

    #[tokio::test]
    async fn test_run_publishes_findings_comment() {
        let dir = tempfile::tempdir().unwrap();
        write_findings(&dir, "[]");

        let runtime = Arc::new(RecordingRuntime::new());
        let platform = Arc::new(FakePlatform::new());
        let pipeline = Pipeline::new(
            test_config(&dir, true),
            test_context(Some(12)),
            runtime,
            Some(platform.clone() as Arc<dyn ReviewPlatform>),
        );

        let summary = pipeline.run().await.unwrap();

        assert!(summary.comment_published);
        assert_eq!(platform.comment_count(), 1);
        assert!(platform
            .body_of(1)
            .unwrap()
            .starts_with("# DBLinter Report:"));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_the_run() {
        let dir = tempfile::tempdir().unwrap();
        write_findings(&dir, "[]");

        let runtime = Arc::new(RecordingRuntime::new());
        let platform = Arc::new(FakePlatform {
            fail_listing: true,
            ..FakePlatform::new()
        });
        let pipeline = Pipeline::new(
            test_config(&dir, true),
            test_context(Some(12)),
            runtime.clone(),
            Some(platform.clone() as Arc<dyn ReviewPlatform>),
        );

        let summary = pipeline.run().await.unwrap();

        assert!(!summary.comment_published);
        assert_eq!(runtime.kill_count(), 1);
        assert_eq!(platform.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_pull_request_skips_comment() {
        let dir = tempfile::tempdir().unwrap();
        write_findings(&dir, "[]");

        let runtime = Arc::new(RecordingRuntime::new());
        let platform = Arc::new(FakePlatform::new());
        let pipeline = Pipeline::new(
            test_config(&dir, true),
            test_context(None),
            runtime,
            Some(platform.clone() as Arc<dyn ReviewPlatform>),
        );

        let summary = pipeline.run().await.unwrap();

        assert!(!summary.comment_published);
        assert_eq!(platform.comment_count(), 0);
    }

    #[tokio::test]
    async fn test_teardown_failure_fails_a_successful_run() {
        let dir = tempfile::tempdir().unwrap();
        write_findings(&dir, "[]");

        let runtime = Arc::new(RecordingRuntime {
            fail_kill: true,
            ..RecordingRuntime::new()
        });
        let pipeline = Pipeline::new(
            test_config(&dir, false),
            test_context(None),
            runtime.clone(),
            None,
        );

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Termination(_))));
        assert_eq!(runtime.kill_count(), 1);
    }

    #[tokio::test]
    async fn test_stage_error_wins_over_teardown_error() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(RecordingRuntime {
            fail_kill: true,
            fail_image_prefix: Some("decathlon/dblinter".to_string()),
            ..RecordingRuntime::new()
        });
        let pipeline = Pipeline::new(
            test_config(&dir, false),
            test_context(None),
            runtime.clone(),
            None,
        );

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Analysis(_))));
        assert_eq!(runtime.kill_count(), 1);
    }

    #[tokio::test]
    async fn test_pull_failure_runs_no_containers() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(RecordingRuntime {
            fail_pull_prefix: Some("postgres".to_string()),
            ..RecordingRuntime::new()
        });
        let pipeline = Pipeline::new(
            test_config(&dir, false),
            test_context(None),
            runtime.clone(),
            None,
        );

        let result = pipeline.run().await;

        assert!(matches!(result, Err(PipelineError::Pull(_))));
        assert_eq!(runtime.start_count(), 0);
        assert_eq!(runtime.kill_count(), 0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Pulling.to_string(), "pulling");
        assert_eq!(Stage::Terminating.to_string(), "terminating");
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::Termination(RuntimeError::NonZeroExit {
            command: "docker kill abc".to_string(),
            code: 1,
            stderr: "no such container".to_string(),
        });
        assert!(err.to_string().contains("teardown failed"));
        assert!(err.to_string().contains("docker kill abc"));
    }
}
