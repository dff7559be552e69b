//! Schema preparation before analysis.
//!
//! Applies Flyway migrations and an ad hoc init script to the fresh
//! database. Both steps are optional; migrations always run before the
//! init script so the script can build on the migrated schema.

use std::path::Path;
use std::sync::Arc;

use tokio::process::Command;
use tracing::info;

use crate::error::PreparationError;
use crate::provision::DatabaseHandle;
use crate::runtime::{excerpt, ContainerRuntime, ContainerSpec, Mount};

const FLYWAY_IMAGE: &str = "flyway/flyway";
const FLYWAY_SQL_DIR: &str = "/flyway/sql";
const STDERR_EXCERPT: usize = 500;

/// Applies migrations and init scripts to a provisioned database.
pub struct SchemaPreparer {
    runtime: Arc<dyn ContainerRuntime>,
    flyway_version: String,
}

impl SchemaPreparer {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, flyway_version: impl Into<String>) -> Self {
        Self {
            runtime,
            flyway_version: flyway_version.into(),
        }
    }

    pub fn image(&self) -> String {
        format!("{}:{}", FLYWAY_IMAGE, self.flyway_version)
    }

    /// Runs the configured preparation steps in order.
    pub async fn prepare(
        &self,
        database: &DatabaseHandle,
        migration_source: Option<&Path>,
        init_script: Option<&Path>,
    ) -> Result<(), PreparationError> {
        match migration_source {
            Some(source) => self.run_flyway(database, source).await?,
            None => info!("no migration source configured, skipping flyway"),
        }
        match init_script {
            Some(script) => self.run_init_script(database, script).await?,
            None => info!("no init script configured, skipping psql"),
        }
        Ok(())
    }

    async fn run_flyway(
        &self,
        database: &DatabaseHandle,
        source: &Path,
    ) -> Result<(), PreparationError> {
        info!(source = %source.display(), image = %self.image(), "applying migrations");
        let spec = self.flyway_spec(database, source);
        let output = self
            .runtime
            .run_to_completion(&spec)
            .await
            .map_err(PreparationError::Migration)?;
        if !output.success() {
            return Err(PreparationError::MigrationFailed {
                code: output.exit_code,
                stderr: excerpt(&output.stderr, STDERR_EXCERPT),
            });
        }
        Ok(())
    }

    fn flyway_spec(&self, database: &DatabaseHandle, source: &Path) -> ContainerSpec {
        let url = format!(
            "jdbc:postgresql://{}:{}/{}",
            database.host, database.port, database.database
        );
        ContainerSpec::new(self.image())
            .with_mount(Mount::new(source, FLYWAY_SQL_DIR))
            .with_args([
                format!("-locations=filesystem:{}", FLYWAY_SQL_DIR),
                format!("-url={}", url),
                format!("-user={}", database.user),
                format!("-password={}", database.password()),
                "migrate".to_string(),
            ])
    }

    async fn run_init_script(
        &self,
        database: &DatabaseHandle,
        script: &Path,
    ) -> Result<(), PreparationError> {
        info!(script = %script.display(), "applying init script");
        let output = Command::new("psql")
            .args(["-v", "ON_ERROR_STOP=1", "-f"])
            .arg(script)
            .envs(psql_env(database))
            .output()
            .await
            .map_err(PreparationError::PsqlSpawn)?;

        if !output.status.success() {
            return Err(PreparationError::InitScriptFailed {
                path: script.display().to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: excerpt(&String::from_utf8_lossy(&output.stderr), STDERR_EXCERPT),
            });
        }
        Ok(())
    }
}

/// Connection settings for `psql`.
///
/// Credentials travel through the environment, never the argument vector,
/// so they cannot show up in a process listing.
pub fn psql_env(database: &DatabaseHandle) -> Vec<(String, String)> {
    vec![
        ("PGPASSWORD".to_string(), database.password().to_string()),
        ("PGHOST".to_string(), database.host.clone()),
        ("PGPORT".to_string(), database.port.to_string()),
        ("PGUSER".to_string(), database.user.clone()),
        ("PGDATABASE".to_string(), database.database.clone()),
    ]
}
