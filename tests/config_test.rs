//! Configuration files drive the wired orchestrator

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use teamforge_core::config::{ConfigManager, ConfigurationError};
use teamforge_core::orchestration::{ArchiveTarget, BulkOperationOrchestrator, ProcessStatus};
use teamforge_core::session::{AccessToken, InMemoryDirectory};

fn write_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[tokio::test]
async fn test_orchestrator_from_config_file() {
    let file = write_toml(
        r#"
environment = "test"

[bulk]
default_batch_size = 3
default_max_concurrency = 2
default_acceptable_error_percentage = 0.0

[registry]
retention_minutes = 5
sweep_interval_seconds = 10
"#,
    );
    let manager = ConfigManager::load_with_env_prefix(Some(file.path()), "TEAMFORGE_IT_FILE").unwrap();

    let directory = Arc::new(InMemoryDirectory::new());
    directory.seed_team("team-a", "Class A");
    directory.seed_team("team-b", "Class B");
    let orchestrator = BulkOperationOrchestrator::from_config(manager.config(), directory.clone());

    let options = orchestrator.default_options();
    assert_eq!(options.batch_size, 3);
    assert_eq!(options.max_concurrency, 2);
    assert_eq!(orchestrator.registry().retention(), Duration::from_secs(300));

    let process_id = orchestrator
        .start_team_archival(
            vec![ArchiveTarget::new("team-a"), ArchiveTarget::new("team-b")],
            &AccessToken::new("config-token-0001"),
            options,
            "admin@school.edu",
        )
        .await
        .unwrap();
    let result = orchestrator.wait_for_completion(process_id).await.unwrap();

    assert_eq!(result.status, ProcessStatus::Completed);
    assert_eq!(directory.connect_count(), 1);
}

#[test]
fn test_invalid_bulk_defaults_are_rejected() {
    let file = write_toml("[bulk]\ndefault_batch_size = 0\n");
    let result = ConfigManager::load_with_env_prefix(Some(file.path()), "TEAMFORGE_IT_INVALID");
    assert!(result.is_err());
}

#[test]
fn test_malformed_toml_is_a_load_error() {
    let file = write_toml("[bulk\ndefault_batch_size = ");
    let result = ConfigManager::load_with_env_prefix(Some(file.path()), "TEAMFORGE_IT_MALFORMED");
    assert!(matches!(result, Err(ConfigurationError::LoadError { .. })));
}
