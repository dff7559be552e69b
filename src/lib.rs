//! dblint-gate: a database lint gate for CI pipelines.
//!
//! Provisions an ephemeral PostgreSQL container, prepares its schema with
//! Flyway migrations and an init script, runs the dblinter analyzer
//! against it and publishes the findings as a pull request comment.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod github;
pub mod pipeline;
pub mod prepare;
pub mod provision;
pub mod publish;
pub mod report;
pub mod runtime;
pub mod workflow;

pub use error::{
    AnalysisError, ConfigError, PreparationError, ProvisionError, PublishError, ReportError,
    RuntimeError,
};
