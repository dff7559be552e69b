//! Command line interface.
//!
//! Every option can also be supplied through the `INPUT_*` environment
//! variables a composite GitHub Action passes to its steps.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::config::PipelineConfig;
use crate::github::{GitHubClient, ReviewPlatform};
use crate::pipeline::{Pipeline, Stage};
use crate::runtime::DockerCli;
use crate::workflow::WorkflowContext;

#[derive(Debug, Parser)]
#[command(
    name = "dblint-gate",
    about = "Run dblinter against an ephemeral PostgreSQL database",
    version
)]
pub struct Cli {
    /// Where the findings report is written (directories are created)
    #[arg(long, env = "INPUT_REPORT_PATH")]
    pub report_path: String,

    /// Directory of Flyway migrations to apply before the analysis
    #[arg(long, env = "INPUT_FLYWAY_MIGRATION")]
    pub flyway_migration: Option<String>,

    /// SQL script applied with psql after the migrations
    #[arg(long, env = "INPUT_INIT_SCRIPT")]
    pub init_script: Option<String>,

    /// dblinter configuration file
    #[arg(long, env = "INPUT_DBLINTER_CONFIG")]
    pub dblinter_config: Option<String>,

    /// Image tag of the dblinter analyzer
    #[arg(long, env = "INPUT_DBLINTER_VERSION")]
    pub dblinter_version: String,

    /// Image tag of the PostgreSQL database
    #[arg(long, env = "INPUT_POSTGRES_VERSION")]
    pub postgres_version: String,

    /// Image tag of Flyway
    #[arg(long, env = "INPUT_FLYWAY_VERSION")]
    pub flyway_version: String,

    /// Post the findings as a pull request comment (true/false)
    #[arg(
        long,
        env = "INPUT_PR_COMMENT",
        default_value_t = false,
        action = clap::ArgAction::Set
    )]
    pub pr_comment: bool,

    /// Token used to create or update the pull request comment
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    info!(stage = %Stage::Validating, "resolving inputs");
    let context = WorkflowContext::from_env()?;
    let config = PipelineConfig::resolve(&cli, &context)?;
    info!(
        report = %config.report_path().display(),
        dblinter = %config.dblinter_version,
        postgres = %config.postgres_version,
        flyway = %config.flyway_version,
        publish_comment = config.publish_comment,
        "configuration resolved"
    );

    let runtime = Arc::new(DockerCli::new());
    let platform = review_platform(&config, &context)?;
    let pipeline = Pipeline::new(config, context, runtime, platform);

    let summary = pipeline.run().await?;
    info!(
        report = %summary.report_path.display(),
        comment_published = summary.comment_published,
        "analysis complete"
    );
    Ok(())
}

fn review_platform(
    config: &PipelineConfig,
    context: &WorkflowContext,
) -> anyhow::Result<Option<Arc<dyn ReviewPlatform>>> {
    if !config.publish_comment || context.pull_request.is_none() {
        return Ok(None);
    }
    let (token, repository) = match (&config.github_token, &context.repository) {
        (Some(token), Some(repository)) => (token, repository),
        _ => return Ok(None),
    };
    let client = GitHubClient::new(context.api_url.clone(), repository.clone(), token.clone())
        .context("could not build the review platform client")?;
    Ok(Some(Arc::new(client)))
}
