//! Team archival

use async_trait::async_trait;

use super::{ItemProcessor, ItemReport};
use crate::error::{DirectoryError, DirectoryResult};
use crate::orchestration::items::ArchiveTarget;
use crate::services::DirectoryServices;
use crate::validation::validate_id;

#[derive(Debug, Clone)]
pub struct ArchiveProcessor {
    services: DirectoryServices,
}

impl ArchiveProcessor {
    pub fn new(services: DirectoryServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ItemProcessor<ArchiveTarget> for ArchiveProcessor {
    async fn process(&self, target: &ArchiveTarget, dry_run: bool) -> DirectoryResult<ItemReport> {
        let team_id = validate_id("team_id", &target.team_id)?;

        if dry_run {
            let team = self
                .services
                .teams
                .get_team(&team_id)
                .await?
                .ok_or_else(|| DirectoryError::not_found("team", &team_id))?;
            let message = if team.is_archived == Some(true) {
                "already archived"
            } else {
                "would archive"
            };
            return Ok(ItemReport::new(message, vec![team_id]));
        }

        if !self
            .services
            .teams
            .archive_team(&team_id, target.set_site_read_only)
            .await?
        {
            return Err(DirectoryError::not_found("team", &team_id));
        }

        Ok(ItemReport::new("archived", vec![team_id]))
    }
}
