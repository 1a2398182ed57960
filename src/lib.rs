#![allow(clippy::doc_markdown)] // Allow technical terms like UPN, SKU, Graph in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Teamforge Core
//!
//! Bulk directory-operations core for provisioning Microsoft 365 teams in
//! schools: onboarding and offboarding accounts, role and membership changes,
//! and team archival, run as tracked background processes against Microsoft
//! Graph.
//!
//! ## Architecture
//!
//! ```text
//! BulkOperationOrchestrator ──▶ batch engine ──▶ ItemProcessor
//!          │                        │                 │
//!   ProcessRegistry          Collaborators     DirectoryServices
//!                                                     │
//!                              ResultCache ◀──────────┤
//!                                                     ▼
//!                      ResilientExecutor (retry ▶ breaker ▶ timeout)
//!                                                     │
//!                                 SessionManager ──▶ DirectoryTransport
//! ```
//!
//! ## Module Organization
//!
//! - [`session`] - Connection lifecycle and the transport seam (Graph, in-memory)
//! - [`resilience`] - Retry, circuit breakers and per-call timeouts
//! - [`cache`] - Read-through result cache with scoped invalidation
//! - [`services`] - Typed user, team, membership and license commands
//! - [`orchestration`] - Bulk runs, batching, cancellation and results
//! - [`config`] - Layered TOML and environment configuration
//! - [`logging`] - Structured `tracing` setup
//! - [`error`] - Directory and orchestration error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use teamforge_core::config::TeamforgeConfig;
//! use teamforge_core::orchestration::{BulkOperationOrchestrator, OffboardingTarget};
//! use teamforge_core::session::{AccessToken, GraphTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TeamforgeConfig::default();
//! let transport = Arc::new(GraphTransport::from_config(&config.session));
//! let orchestrator = BulkOperationOrchestrator::from_config(&config, transport);
//!
//! let process_id = orchestrator
//!     .start_bulk_offboarding(
//!         vec![OffboardingTarget::new("leaver@school.edu")],
//!         &AccessToken::new("token"),
//!         orchestrator.default_options(),
//!         "admin@school.edu",
//!     )
//!     .await?;
//! let result = orchestrator.wait_for_completion(process_id).await?;
//! println!("{}: {}", process_id, result.status);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod orchestration;
pub mod resilience;
pub mod services;
pub mod session;
pub mod types;
pub mod validation;

pub use config::{ConfigManager, TeamforgeConfig};
pub use error::{DirectoryError, DirectoryResult, OrchestrationError, OrchestrationResult};
pub use orchestration::{
    BatchRun, BulkOperationOptions, BulkOperationOrchestrator, BulkOperationResult, ProcessStatus,
};
pub use services::{DirectoryServices, ServiceContext};
pub use session::{AccessToken, DirectoryTransport, SessionManager};
