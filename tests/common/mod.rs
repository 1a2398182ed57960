//! Shared wiring for integration tests: an orchestrator over an in-memory
//! directory with immediate retries, plus collaborators that record calls.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use teamforge_core::cache::ResultCache;
use teamforge_core::config::TeamforgeConfig;
use teamforge_core::error::{DirectoryError, DirectoryResult};
use teamforge_core::orchestration::{
    AdminNotifier, BatchRun, BulkOperationOptions, BulkOperationOrchestrator,
    BulkOperationResult, Collaborators, OperationHistory, ProcessRegistry, ProgressNotifier,
};
use teamforge_core::resilience::{CircuitBreakerManager, ResilientExecutor, RetryPolicy};
use teamforge_core::services::{DirectoryServices, ServiceContext};
use teamforge_core::session::{AccessToken, InMemoryDirectory, SessionManager};

pub const ADMIN: &str = "admin@school.edu";

pub fn token() -> AccessToken {
    AccessToken::new("integration-token-0001")
}

/// Options with notifications off and a generous timeout
pub fn options() -> BulkOperationOptions {
    BulkOperationOptions::default().without_notifications()
}

/// Orchestrator over `directory` using `config`, but with zero-delay retries
pub fn orchestrator_with(
    directory: Arc<InMemoryDirectory>,
    config: &TeamforgeConfig,
) -> BulkOperationOrchestrator {
    let session = Arc::new(SessionManager::new(
        directory,
        config.session.connect_timeout(),
    ));
    let breakers = Arc::new(CircuitBreakerManager::from_config(
        &config.resilience.circuit_breakers,
    ));
    let executor = ResilientExecutor::new(
        Arc::clone(&breakers),
        RetryPolicy::immediate(config.resilience.retry.max_retries),
        config.resilience.read_timeout(),
        config.resilience.write_timeout(),
    );
    let cache = Arc::new(ResultCache::from_config(&config.cache));
    let context = Arc::new(ServiceContext::new(Arc::clone(&session), cache, executor));

    BulkOperationOrchestrator::new(
        session,
        DirectoryServices::new(context),
        Arc::new(ProcessRegistry::from_config(&config.registry)),
        &breakers,
        config.bulk.clone(),
    )
}

pub fn orchestrator(directory: Arc<InMemoryDirectory>) -> BulkOperationOrchestrator {
    orchestrator_with(directory, &TeamforgeConfig::default())
}

/// Seed `count` unarchived teams named `team-000`, `team-001`, ...
pub fn seed_teams(directory: &InMemoryDirectory, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let id = format!("team-{i:03}");
            directory.seed_team(&id, &format!("Class {i}"));
            id
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorEvent {
    Started(String),
    Finished(String),
    Progress(String, usize),
    Completed(String),
    AdminSummary(String),
}

/// Records every collaborator call; optionally fails them all
#[derive(Debug, Default)]
pub struct RecordingCollaborators {
    events: Mutex<Vec<CollaboratorEvent>>,
    failing: AtomicBool,
}

impl RecordingCollaborators {
    pub fn failing() -> Self {
        let recorder = Self::default();
        recorder.failing.store(true, Ordering::SeqCst);
        recorder
    }

    pub fn events(&self) -> Vec<CollaboratorEvent> {
        self.events.lock().clone()
    }

    fn record(&self, event: CollaboratorEvent) -> DirectoryResult<()> {
        self.events.lock().push(event);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::transient("notify", "mail relay unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl OperationHistory for RecordingCollaborators {
    async fn record_started(&self, run: &BatchRun) -> DirectoryResult<()> {
        self.record(CollaboratorEvent::Started(run.status.to_string()))
    }

    async fn record_finished(
        &self,
        _run: &BatchRun,
        result: &BulkOperationResult,
    ) -> DirectoryResult<()> {
        self.record(CollaboratorEvent::Finished(result.status.to_string()))
    }
}

#[async_trait]
impl ProgressNotifier for RecordingCollaborators {
    async fn progress(&self, user: &str, run: &BatchRun) -> DirectoryResult<()> {
        self.record(CollaboratorEvent::Progress(
            user.to_string(),
            run.completed_items(),
        ))
    }

    async fn completed(&self, user: &str, _result: &BulkOperationResult) -> DirectoryResult<()> {
        self.record(CollaboratorEvent::Completed(user.to_string()))
    }
}

#[async_trait]
impl AdminNotifier for RecordingCollaborators {
    async fn bulk_summary(
        &self,
        initiated_by: &str,
        _result: &BulkOperationResult,
    ) -> DirectoryResult<()> {
        self.record(CollaboratorEvent::AdminSummary(initiated_by.to_string()))
    }
}

pub fn collaborators(recorder: &Arc<RecordingCollaborators>) -> Collaborators {
    Collaborators {
        history: recorder.clone(),
        progress: recorder.clone(),
        admin: recorder.clone(),
    }
}
