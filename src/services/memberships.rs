//! Team membership commands
//!
//! Removals and role changes address a membership id, which is resolved from
//! a fresh member listing so an external change within the cache TTL cannot
//! hide a membership.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{MembershipChange, MembershipCommands, ServiceContext};
use crate::cache::CacheKey;
use crate::error::DirectoryResult;
use crate::session::DirectoryCommand;
use crate::types::{DirectoryUser, MemberRole, TeamMember};
use crate::validation::{validate_id, validate_upn};

#[derive(Debug, Clone)]
pub struct MembershipService {
    context: Arc<ServiceContext>,
}

impl MembershipService {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }

    fn forget_membership(&self, team_id: &str, upn: &str) {
        self.context.forget(&CacheKey::team_members(team_id));
        self.context.forget(&CacheKey::user_teams(upn));
    }

    /// `Ok(None)` when the team does not exist, `Ok(Some(None))` when the
    /// user is not a member
    async fn find_membership(
        &self,
        team_id: &str,
        upn: &str,
    ) -> DirectoryResult<Option<Option<TeamMember>>> {
        self.context.forget(&CacheKey::team_members(team_id));
        let Some(members) = self.list_members(team_id).await? else {
            return Ok(None);
        };

        if let Some(member) = members.iter().find(|m| m.matches_upn(upn)) {
            return Ok(Some(Some(member.clone())));
        }

        // Membership email can differ from the UPN; fall back to the user id
        let user: Option<DirectoryUser> = self
            .context
            .read_entity(
                &CacheKey::user(upn),
                &DirectoryCommand::GetUser {
                    upn: upn.to_string(),
                },
            )
            .await?;
        let member = user.and_then(|user| {
            members
                .into_iter()
                .find(|m| m.user_id.as_deref() == Some(user.id.as_str()))
        });
        Ok(Some(member))
    }
}

#[async_trait]
impl MembershipCommands for MembershipService {
    async fn list_members(&self, team_id: &str) -> DirectoryResult<Option<Vec<TeamMember>>> {
        let team_id = validate_id("team_id", team_id)?;
        self.context
            .read_collection(
                &CacheKey::team_members(&team_id),
                &DirectoryCommand::ListMembers { team_id },
            )
            .await
    }

    async fn add_member(
        &self,
        team_id: &str,
        upn: &str,
        role: MemberRole,
    ) -> DirectoryResult<MembershipChange> {
        let team_id = validate_id("team_id", team_id)?;
        let upn = validate_upn(upn)?;

        let outcome = self
            .context
            .run(&DirectoryCommand::AddMember {
                team_id: team_id.clone(),
                upn: upn.clone(),
                role,
            })
            .await;

        match outcome {
            Ok(_) => {
                self.forget_membership(&team_id, &upn);
                info!(team_id = %team_id, upn = %upn, role = %role, "Member added");
                Ok(MembershipChange::Added)
            }
            Err(error) if error.is_conflict() => {
                self.forget_membership(&team_id, &upn);
                debug!(team_id = %team_id, upn = %upn, "Already a member");
                Ok(MembershipChange::AlreadyMember)
            }
            Err(error) => Err(error),
        }
    }

    async fn remove_member(&self, team_id: &str, upn: &str) -> DirectoryResult<bool> {
        let team_id = validate_id("team_id", team_id)?;
        let upn = validate_upn(upn)?;

        let Some(Some(member)) = self.find_membership(&team_id, &upn).await? else {
            debug!(team_id = %team_id, upn = %upn, "Not a member, nothing to remove");
            return Ok(false);
        };

        let command = DirectoryCommand::RemoveMember {
            team_id: team_id.clone(),
            membership_id: member.id,
        };
        let removed = self.context.mutate(&command, &[]).await?;
        self.forget_membership(&team_id, &upn);

        info!(team_id = %team_id, upn = %upn, removed = removed, "Member removed");
        Ok(removed)
    }

    async fn set_member_role(
        &self,
        team_id: &str,
        upn: &str,
        role: MemberRole,
    ) -> DirectoryResult<bool> {
        let team_id = validate_id("team_id", team_id)?;
        let upn = validate_upn(upn)?;

        let Some(Some(member)) = self.find_membership(&team_id, &upn).await? else {
            return Ok(false);
        };
        if member.role() == role {
            debug!(team_id = %team_id, upn = %upn, role = %role, "Role already set");
            return Ok(true);
        }

        let command = DirectoryCommand::SetMemberRole {
            team_id: team_id.clone(),
            membership_id: member.id,
            role,
        };
        let updated = self.context.mutate(&command, &[]).await?;
        self.forget_membership(&team_id, &upn);

        info!(team_id = %team_id, upn = %upn, role = %role, "Member role changed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::harness;
    use crate::services::{UserCommands, UserService};

    #[tokio::test]
    async fn test_add_member_tolerates_existing_membership() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        h.directory.seed_team("t-1", "7B Science");
        let memberships = MembershipService::new(h.context.clone());

        let first = memberships
            .add_member("t-1", "ada@school.edu", MemberRole::Member)
            .await
            .unwrap();
        let second = memberships
            .add_member("t-1", "ada@school.edu", MemberRole::Member)
            .await
            .unwrap();

        assert_eq!(first, MembershipChange::Added);
        assert_eq!(second, MembershipChange::AlreadyMember);
        assert_eq!(h.directory.members("t-1").len(), 1);
    }

    #[tokio::test]
    async fn test_membership_mutation_invalidates_both_lists() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        h.directory.seed_team("t-1", "7B Science");
        let memberships = MembershipService::new(h.context.clone());
        let users = UserService::new(h.context.clone());

        assert!(memberships.list_members("t-1").await.unwrap().unwrap().is_empty());
        assert!(users.list_user_teams("ada@school.edu").await.unwrap().unwrap().is_empty());

        memberships
            .add_member("t-1", "ada@school.edu", MemberRole::Owner)
            .await
            .unwrap();

        let members = memberships.list_members("t-1").await.unwrap().unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role(), MemberRole::Owner);
        let teams = users.list_user_teams("ada@school.edu").await.unwrap().unwrap();
        assert_eq!(teams[0].id, "t-1");
    }

    #[tokio::test]
    async fn test_remove_member_is_noop_for_non_members() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        h.directory.seed_team("t-1", "7B Science");
        let memberships = MembershipService::new(h.context.clone());

        assert!(!memberships.remove_member("t-1", "ada@school.edu").await.unwrap());
        assert!(!memberships.remove_member("t-404", "ada@school.edu").await.unwrap());
        assert_eq!(h.directory.call_count("remove_member"), 0);

        h.directory.seed_member("t-1", "ada@school.edu", MemberRole::Member);
        assert!(memberships.remove_member("t-1", "ada@school.edu").await.unwrap());
        assert!(h.directory.members("t-1").is_empty());
    }

    #[tokio::test]
    async fn test_set_member_role() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        h.directory.seed_team("t-1", "7B Science");
        h.directory.seed_member("t-1", "ada@school.edu", MemberRole::Member);
        let memberships = MembershipService::new(h.context.clone());

        assert!(memberships
            .set_member_role("t-1", "ada@school.edu", MemberRole::Owner)
            .await
            .unwrap());
        assert_eq!(h.directory.members("t-1")[0].role(), MemberRole::Owner);

        // Unchanged role issues no write
        assert!(memberships
            .set_member_role("t-1", "ada@school.edu", MemberRole::Owner)
            .await
            .unwrap());
        assert_eq!(h.directory.call_count("set_member_role"), 1);

        assert!(!memberships
            .set_member_role("t-1", "bob@school.edu", MemberRole::Owner)
            .await
            .unwrap());
    }
}
