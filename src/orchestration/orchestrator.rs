//! # Bulk Operation Orchestrator
//!
//! Inbound entry point for bulk work. Every `start_*` call validates its
//! options and items, connects the session with the caller's token, registers
//! a run and returns its process id immediately; the run itself executes on a
//! spawned task and is observed through the registry.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::collaborators::Collaborators;
use super::engine::{execute_run, RunEnvironment, RunPlan};
use super::items::{
    ensure_unique_keys, ArchiveTarget, MembershipOperation, OffboardingTarget, OnboardingPlan,
    RoleChange, WorkItem,
};
use super::options::BulkOperationOptions;
use super::process::BatchRun;
use super::processors::{
    ArchiveProcessor, ItemProcessor, MembershipProcessor, OffboardingProcessor,
    OnboardingProcessor, RoleChangeProcessor,
};
use super::registry::ProcessRegistry;
use super::result::BulkOperationResult;
use crate::config::{BulkConfig, TeamforgeConfig};
use crate::constants::{downstreams, events, operation_types};
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::logging::log_bulk_operation;
use crate::resilience::CircuitBreakerManager;
use crate::services::{DirectoryServices, ServiceContext};
use crate::session::{AccessToken, DirectoryTransport, SessionManager};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct BulkOperationOrchestrator {
    session: Arc<SessionManager>,
    services: DirectoryServices,
    registry: Arc<ProcessRegistry>,
    environment: RunEnvironment,
    bulk: BulkConfig,
    sweep_interval: Duration,
}

impl BulkOperationOrchestrator {
    pub fn new(
        session: Arc<SessionManager>,
        services: DirectoryServices,
        registry: Arc<ProcessRegistry>,
        breakers: &CircuitBreakerManager,
        bulk: BulkConfig,
    ) -> Self {
        let environment = RunEnvironment {
            registry: Arc::clone(&registry),
            collaborators: Collaborators::default(),
            external: breakers.get_circuit_breaker(downstreams::EXTERNAL),
            collaborator_timeout: bulk.collaborator_timeout(),
            admin_summary_threshold: bulk.admin_summary_threshold,
        };
        Self {
            session,
            services,
            registry,
            environment,
            bulk,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Wire the whole stack from configuration around a transport
    pub fn from_config(config: &TeamforgeConfig, transport: Arc<dyn DirectoryTransport>) -> Self {
        let session = Arc::new(SessionManager::new(
            transport,
            config.session.connect_timeout(),
        ));
        let context = Arc::new(ServiceContext::from_config(config, Arc::clone(&session)));
        let breakers = Arc::clone(context.executor().breakers());

        Self::new(
            session,
            DirectoryServices::new(context),
            Arc::new(ProcessRegistry::from_config(&config.registry)),
            &breakers,
            config.bulk.clone(),
        )
        .with_sweep_interval(config.registry.sweep_interval())
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.environment.collaborators = collaborators;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_secs(1));
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn services(&self) -> &DirectoryServices {
        &self.services
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Run options built from the configured defaults
    pub fn default_options(&self) -> BulkOperationOptions {
        self.bulk.default_options()
    }

    pub async fn start_bulk_onboarding(
        &self,
        plans: Vec<OnboardingPlan>,
        token: &AccessToken,
        options: BulkOperationOptions,
        initiated_by: &str,
    ) -> OrchestrationResult<Uuid> {
        let processor: Arc<dyn ItemProcessor<OnboardingPlan>> =
            Arc::new(OnboardingProcessor::new(self.services.clone()));
        self.start(operation_types::BULK_ONBOARDING, plans, processor, token, options, initiated_by)
            .await
    }

    pub async fn start_bulk_offboarding(
        &self,
        targets: Vec<OffboardingTarget>,
        token: &AccessToken,
        options: BulkOperationOptions,
        initiated_by: &str,
    ) -> OrchestrationResult<Uuid> {
        let processor: Arc<dyn ItemProcessor<OffboardingTarget>> =
            Arc::new(OffboardingProcessor::new(self.services.clone()));
        self.start(operation_types::BULK_OFFBOARDING, targets, processor, token, options, initiated_by)
            .await
    }

    pub async fn start_role_change(
        &self,
        changes: Vec<RoleChange>,
        token: &AccessToken,
        options: BulkOperationOptions,
        initiated_by: &str,
    ) -> OrchestrationResult<Uuid> {
        let processor: Arc<dyn ItemProcessor<RoleChange>> =
            Arc::new(RoleChangeProcessor::new(self.services.clone()));
        self.start(operation_types::BULK_ROLE_CHANGE, changes, processor, token, options, initiated_by)
            .await
    }

    pub async fn start_team_membership_ops(
        &self,
        ops: Vec<MembershipOperation>,
        token: &AccessToken,
        options: BulkOperationOptions,
        initiated_by: &str,
    ) -> OrchestrationResult<Uuid> {
        let processor: Arc<dyn ItemProcessor<MembershipOperation>> =
            Arc::new(MembershipProcessor::new(self.services.clone()));
        self.start(operation_types::BULK_TEAM_MEMBERSHIP, ops, processor, token, options, initiated_by)
            .await
    }

    pub async fn start_team_archival(
        &self,
        targets: Vec<ArchiveTarget>,
        token: &AccessToken,
        options: BulkOperationOptions,
        initiated_by: &str,
    ) -> OrchestrationResult<Uuid> {
        let processor: Arc<dyn ItemProcessor<ArchiveTarget>> =
            Arc::new(ArchiveProcessor::new(self.services.clone()));
        self.start(operation_types::BULK_TEAM_ARCHIVAL, targets, processor, token, options, initiated_by)
            .await
    }

    /// Runs that are pending or running
    pub fn get_active_processes(&self) -> Vec<BatchRun> {
        self.registry.active()
    }

    pub fn get_process(&self, process_id: Uuid) -> Option<BatchRun> {
        self.registry.get(process_id)
    }

    /// The terminal result, once the run has finished
    pub fn get_result(&self, process_id: Uuid) -> Option<BulkOperationResult> {
        self.registry.result(process_id)
    }

    /// `true` when the run exists and is still live; the run stops at its
    /// next batch boundary
    pub fn cancel_process(&self, process_id: Uuid) -> bool {
        self.registry.cancel(process_id)
    }

    pub async fn wait_for_completion(
        &self,
        process_id: Uuid,
    ) -> OrchestrationResult<BulkOperationResult> {
        self.registry.wait(process_id).await
    }

    /// Start the registry's background eviction task
    pub fn spawn_registry_sweeper(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.registry.spawn_sweeper(self.sweep_interval, shutdown)
    }

    async fn start<I: WorkItem>(
        &self,
        operation_type: &'static str,
        items: Vec<I>,
        processor: Arc<dyn ItemProcessor<I>>,
        token: &AccessToken,
        options: BulkOperationOptions,
        initiated_by: &str,
    ) -> OrchestrationResult<Uuid> {
        options.validate()?;
        if initiated_by.trim().is_empty() {
            return Err(OrchestrationError::InvalidInput(
                "initiated_by must not be empty".to_string(),
            ));
        }
        ensure_unique_keys(&items)?;

        self.session.connect(token).await?;

        let run = BatchRun::new(operation_type, initiated_by, items.len(), options.dry_run);
        let process_id = run.process_id;
        let cancel = self.registry.register(run.clone());

        log_bulk_operation(operation_type, process_id, "pending", items.len(), None);
        info!(
            event = events::BULK_STARTED,
            process_id = %process_id,
            operation = operation_type,
            total_items = items.len(),
            batch_size = options.batch_size,
            max_concurrency = options.max_concurrency,
            dry_run = options.dry_run,
            initiated_by = %initiated_by,
            "Bulk run accepted"
        );

        let plan = RunPlan {
            run,
            items,
            options,
            processor,
            cancel,
        };
        tokio::spawn(execute_run(plan, self.environment.clone()));

        Ok(process_id)
    }
}
