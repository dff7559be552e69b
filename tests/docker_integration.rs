//! Integration tests that exercise a real container engine.
//!
//! Excluded from the default test run; they need Docker and network
//! access to pull images.

use std::sync::Arc;

use dblint_gate::provision::PostgresProvisioner;
use dblint_gate::runtime::{ContainerRuntime, DockerCli};

#[tokio::test]
#[ignore] // Run with: cargo test --test docker_integration -- --ignored
async fn test_provision_and_teardown_real_container() {
    let runtime = Arc::new(DockerCli::new());
    runtime
        .pull("postgres:16")
        .await
        .expect("failed to pull postgres image");

    let provisioner = PostgresProvisioner::new(runtime.clone());
    let database = provisioner
        .provision("16")
        .await
        .expect("failed to provision database");

    assert!(!database.host.is_empty());
    assert_eq!(database.port, 5432);

    provisioner
        .teardown(database)
        .await
        .expect("failed to stop database container");
}

#[tokio::test]
#[ignore] // Run with: cargo test --test docker_integration -- --ignored
async fn test_pull_unknown_image_fails() {
    let runtime = DockerCli::new();
    let result = runtime.pull("dblint-gate-no-such-image:latest").await;
    assert!(result.is_err());
}
