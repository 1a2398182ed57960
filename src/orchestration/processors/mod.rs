//! # Item Processors
//!
//! Per-item behaviour of each bulk operation type, built on the entity
//! command services. Processors validate before any external call and, in
//! dry-run mode, only issue reads.

pub mod archive;
pub mod membership;
pub mod offboarding;
pub mod onboarding;
pub mod role_change;

use async_trait::async_trait;

use super::items::WorkItem;
use crate::error::DirectoryResult;

pub use archive::ArchiveProcessor;
pub use membership::MembershipProcessor;
pub use offboarding::OffboardingProcessor;
pub use onboarding::OnboardingProcessor;
pub use role_change::RoleChangeProcessor;

/// What a successful item did (or would do, in dry-run mode)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub message: String,
    /// Entity ids touched by the item
    pub affected: Vec<String>,
}

impl ItemReport {
    pub fn new(message: impl Into<String>, affected: Vec<String>) -> Self {
        Self {
            message: message.into(),
            affected,
        }
    }
}

#[async_trait]
pub trait ItemProcessor<I: WorkItem>: Send + Sync {
    async fn process(&self, item: &I, dry_run: bool) -> DirectoryResult<ItemReport>;
}
