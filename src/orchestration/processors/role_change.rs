//! Role change: promote or demote a team member

use async_trait::async_trait;

use super::{ItemProcessor, ItemReport};
use crate::error::{DirectoryError, DirectoryResult};
use crate::orchestration::items::{RoleChange, WorkItem};
use crate::services::DirectoryServices;
use crate::validation::{validate_id, validate_upn};

#[derive(Debug, Clone)]
pub struct RoleChangeProcessor {
    services: DirectoryServices,
}

impl RoleChangeProcessor {
    pub fn new(services: DirectoryServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ItemProcessor<RoleChange> for RoleChangeProcessor {
    async fn process(&self, change: &RoleChange, dry_run: bool) -> DirectoryResult<ItemReport> {
        let team_id = validate_id("team_id", &change.team_id)?;
        let upn = validate_upn(&change.upn)?;

        if dry_run {
            let members = self
                .services
                .memberships
                .list_members(&team_id)
                .await?
                .ok_or_else(|| DirectoryError::not_found("team", &team_id))?;
            let Some(member) = members.iter().find(|m| m.matches_upn(&upn)) else {
                return Err(DirectoryError::not_found("membership", change.key()));
            };
            let message = if member.role() == change.role {
                format!("already {}", change.role)
            } else {
                format!("would change role from {} to {}", member.role(), change.role)
            };
            return Ok(ItemReport::new(message, vec![team_id]));
        }

        if !self
            .services
            .memberships
            .set_member_role(&team_id, &upn, change.role)
            .await?
        {
            return Err(DirectoryError::not_found("membership", change.key()));
        }

        Ok(ItemReport::new(format!("role set to {}", change.role), vec![team_id]))
    }
}
