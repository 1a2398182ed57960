//! # Bulk Orchestration
//!
//! Runs bulk directory work (onboarding, offboarding, role changes,
//! membership edits, team archival) as tracked background processes.
//!
//! ## Components
//!
//! - **BulkOperationOrchestrator**: entry point; validates a submission,
//!   registers a run and spawns it
//! - **Batch engine**: partitions items, bounds concurrency, applies the stop
//!   rules and builds the terminal [`BulkOperationResult`]
//! - **ItemProcessor**: per-operation logic over the directory services
//! - **ProcessRegistry**: pollable run state, cancellation and retention
//! - **Collaborators**: audit history and notifications, guarded by the
//!   `external` circuit breaker

pub mod collaborators;
mod engine;
pub mod items;
pub mod options;
pub mod orchestrator;
pub mod process;
pub mod processors;
pub mod registry;
pub mod result;

pub use collaborators::{
    AdminNotifier, Collaborators, OperationHistory, ProgressNotifier, TracingAdminNotifier,
    TracingOperationHistory, TracingProgressNotifier,
};
pub use items::{
    ArchiveTarget, MembershipAction, MembershipOperation, OffboardingTarget, OnboardingPlan,
    RoleChange, TeamAssignment, WorkItem,
};
pub use options::BulkOperationOptions;
pub use orchestrator::BulkOperationOrchestrator;
pub use process::{BatchRun, ProcessStatus};
pub use processors::{ItemProcessor, ItemReport};
pub use registry::ProcessRegistry;
pub use result::{BulkOperationResult, ErrorRateSummary, ItemError, ItemSuccess, SkippedItem};
