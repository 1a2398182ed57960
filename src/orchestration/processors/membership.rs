//! Membership operations: add or remove a user

use async_trait::async_trait;

use super::{ItemProcessor, ItemReport};
use crate::error::{DirectoryError, DirectoryResult};
use crate::orchestration::items::{MembershipAction, MembershipOperation};
use crate::services::{DirectoryServices, MembershipChange};
use crate::validation::{validate_id, validate_upn};

#[derive(Debug, Clone)]
pub struct MembershipProcessor {
    services: DirectoryServices,
}

impl MembershipProcessor {
    pub fn new(services: DirectoryServices) -> Self {
        Self { services }
    }

    async fn preview(
        &self,
        op: &MembershipOperation,
        team_id: &str,
        upn: &str,
    ) -> DirectoryResult<ItemReport> {
        let members = self
            .services
            .memberships
            .list_members(team_id)
            .await?
            .ok_or_else(|| DirectoryError::not_found("team", team_id))?;
        let is_member = members.iter().any(|m| m.matches_upn(upn));

        let message = match op.action {
            MembershipAction::Add if is_member => "already a member".to_string(),
            MembershipAction::Add => {
                if self.services.users.get_user(upn).await?.is_none() {
                    return Err(DirectoryError::not_found("user", upn));
                }
                format!("would add as {}", op.role)
            }
            MembershipAction::Remove if is_member => "would remove".to_string(),
            MembershipAction::Remove => "not a member".to_string(),
        };
        Ok(ItemReport::new(message, vec![team_id.to_string()]))
    }
}

#[async_trait]
impl ItemProcessor<MembershipOperation> for MembershipProcessor {
    async fn process(&self, op: &MembershipOperation, dry_run: bool) -> DirectoryResult<ItemReport> {
        let team_id = validate_id("team_id", &op.team_id)?;
        let upn = validate_upn(&op.upn)?;

        if dry_run {
            return self.preview(op, &team_id, &upn).await;
        }

        let message = match op.action {
            MembershipAction::Add => {
                match self
                    .services
                    .memberships
                    .add_member(&team_id, &upn, op.role)
                    .await?
                {
                    MembershipChange::Added => format!("added as {}", op.role),
                    MembershipChange::AlreadyMember => "already a member".to_string(),
                }
            }
            MembershipAction::Remove => {
                if self.services.memberships.remove_member(&team_id, &upn).await? {
                    "removed".to_string()
                } else {
                    "not a member, nothing removed".to_string()
                }
            }
        };

        Ok(ItemReport::new(message, vec![team_id]))
    }
}
