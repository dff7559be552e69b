//! Ephemeral PostgreSQL provisioning.
//!
//! Starts a throwaway database container with a generated credential and
//! hands back a [`DatabaseHandle`]. Tearing the container down consumes
//! the handle, so a run cannot stop the same container twice.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use tracing::{info, warn};

use crate::error::{ProvisionError, RuntimeError};
use crate::runtime::{ContainerRuntime, ContainerSpec};
use crate::workflow;

const POSTGRES_IMAGE: &str = "postgres";
const POSTGRES_PORT: u16 = 5432;
const POSTGRES_USER: &str = "postgres";
const POSTGRES_DATABASE: &str = "postgres";
const PASSWORD_BYTES: usize = 16;

/// A running database container and the credentials to reach it.
///
/// The password never appears in `Debug` output; use [`Self::password`]
/// where the value itself is needed.
pub struct DatabaseHandle {
    pub container_id: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub database: String,
    password: String,
    released: bool,
}

impl DatabaseHandle {
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("container_id", &self.container_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Drop for DatabaseHandle {
    fn drop(&mut self) {
        if !self.released {
            warn!(container = %self.container_id, "database container was not torn down");
        }
    }
}

#[cfg(test)]
impl DatabaseHandle {
    /// Handle with fixed values for asserting on container invocations.
    pub(crate) fn test_fixture() -> Self {
        Self {
            container_id: "test-db".to_string(),
            host: "10.0.0.5".to_string(),
            port: POSTGRES_PORT,
            user: POSTGRES_USER.to_string(),
            database: POSTGRES_DATABASE.to_string(),
            password: "s3cret".to_string(),
            released: true,
        }
    }
}

/// Starts and stops the throwaway database container.
pub struct PostgresProvisioner {
    runtime: Arc<dyn ContainerRuntime>,
}

impl PostgresProvisioner {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn image(version: &str) -> String {
        format!("{}:{}", POSTGRES_IMAGE, version)
    }

    /// Starts a database container and waits for it to have an address.
    ///
    /// If the container starts but never becomes reachable it is stopped
    /// again before the error is returned.
    pub async fn provision(&self, version: &str) -> Result<DatabaseHandle, ProvisionError> {
        let password = generate_password();
        // Mask before the value can reach any other output.
        workflow::add_mask(&password);

        let image = Self::image(version);
        let spec = ContainerSpec::new(&image).with_env("POSTGRES_PASSWORD", &password);
        let container_id = self
            .runtime
            .run_detached(&spec)
            .await
            .map_err(ProvisionError::Start)?;
        info!(container = %container_id, image = %image, "database container started");

        let host = match self.runtime.inspect_network_address(&container_id).await {
            Ok(address) if !address.is_empty() => address,
            Ok(_) => {
                self.abandon(&container_id).await;
                return Err(ProvisionError::AddressUnavailable { container_id });
            }
            Err(err) => {
                self.abandon(&container_id).await;
                return Err(ProvisionError::Inspect(err));
            }
        };

        Ok(DatabaseHandle {
            container_id,
            host,
            port: POSTGRES_PORT,
            user: POSTGRES_USER.to_string(),
            database: POSTGRES_DATABASE.to_string(),
            password,
            released: false,
        })
    }

    /// Stops the database container. Consumes the handle so the container
    /// can only be stopped once.
    pub async fn teardown(&self, mut handle: DatabaseHandle) -> Result<(), RuntimeError> {
        handle.released = true;
        info!(container = %handle.container_id, "stopping database container");
        self.runtime.kill(&handle.container_id).await
    }

    async fn abandon(&self, container_id: &str) {
        if let Err(err) = self.runtime.kill(container_id).await {
            warn!(container = %container_id, error = %err, "failed to stop unusable database container");
        }
    }
}

fn generate_password() -> String {
    let mut bytes = [0u8; PASSWORD_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use crate::runtime::testing::RecordingRuntime;

    use super::*;

    #[test]
    fn test_generated_password_shape() {
        let password = generate_password();
        // 16 bytes in url-safe base64 without padding.
        assert_eq!(password.len(), 22);
        assert!(password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generated_passwords_differ() {
        assert_ne!(generate_password(), generate_password());
    }

    #[test]
    fn test_debug_output_redacts_password() {
        let handle = DatabaseHandle::test_fixture();
        let rendered = format!("{:?}", handle);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[tokio::test]
    async fn test_provision_starts_container_and_discovers_address() {
        let runtime = Arc::new(RecordingRuntime::new());
        let provisioner = PostgresProvisioner::new(runtime.clone());

        let handle = provisioner.provision("16").await.unwrap();

        assert_eq!(handle.container_id, "test-container-1");
        assert_eq!(handle.host, "172.17.0.2");
        assert_eq!(handle.port, 5432);
        assert_eq!(handle.user, "postgres");
        assert_eq!(handle.database, "postgres");
        assert_eq!(handle.password().len(), 22);
        assert_eq!(runtime.start_count(), 1);

        {
            let started = runtime.started.lock().unwrap();
            assert_eq!(started[0].image, "postgres:16");
            assert_eq!(started[0].env.len(), 1);
            assert_eq!(started[0].env[0].0, "POSTGRES_PASSWORD");
            assert_eq!(started[0].env[0].1, handle.password());
        }

        provisioner.teardown(handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_provision_kills_container_when_address_missing() {
        let runtime = Arc::new(RecordingRuntime {
            address: String::new(),
            ..RecordingRuntime::new()
        });
        let provisioner = PostgresProvisioner::new(runtime.clone());

        let result = provisioner.provision("16").await;

        assert!(matches!(
            result,
            Err(ProvisionError::AddressUnavailable { .. })
        ));
        assert_eq!(runtime.kill_count(), 1);
    }

    #[tokio::test]
    async fn test_teardown_kills_the_container() {
        let runtime = Arc::new(RecordingRuntime::new());
        let provisioner = PostgresProvisioner::new(runtime.clone());

        let handle = provisioner.provision("16").await.unwrap();
        provisioner.teardown(handle).await.unwrap();

        assert_eq!(runtime.kill_count(), 1);
        assert_eq!(runtime.killed.lock().unwrap()[0], "test-container-1");
    }

    #[test]
    fn test_image_reference() {
        assert_eq!(PostgresProvisioner::image("16.2"), "postgres:16.2");
    }
}
