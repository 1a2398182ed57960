//! Team lifecycle commands

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::{ServiceContext, TeamCommands};
use crate::cache::{CacheKey, CacheScope};
use crate::error::{DirectoryError, DirectoryResult};
use crate::session::DirectoryCommand;
use crate::types::{NewTeam, Team};
use crate::validation::{validate_display_name, validate_id, validate_upn};

#[derive(Debug, Clone)]
pub struct TeamService {
    context: Arc<ServiceContext>,
}

impl TeamService {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl TeamCommands for TeamService {
    async fn get_team(&self, team_id: &str) -> DirectoryResult<Option<Team>> {
        let team_id = validate_id("team_id", team_id)?;
        self.context
            .read_entity(&CacheKey::team(&team_id), &DirectoryCommand::GetTeam { team_id })
            .await
    }

    async fn create_team(&self, team: NewTeam) -> DirectoryResult<Team> {
        let display_name = validate_display_name(&team.display_name)?;
        let owner_upn = validate_upn(&team.owner_upn)?;
        let template = validate_id("template", &team.template)?;
        let description = team.description.clone();

        let value = self
            .context
            .run(&DirectoryCommand::CreateTeam(NewTeam {
                display_name: display_name.clone(),
                description: description.clone(),
                owner_upn: owner_upn.clone(),
                template,
            }))
            .await?;

        // The owner's team list now includes the new team
        self.context.invalidate(&[CacheScope::user(&owner_upn)]);

        let id = value
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                DirectoryError::Serialization(
                    "create_team response did not include a team id".to_string(),
                )
            })?
            .to_string();

        info!(team_id = %id, display_name = %display_name, owner = %owner_upn, "Team created");
        Ok(Team {
            id,
            display_name: Some(display_name),
            description,
            is_archived: Some(false),
            visibility: None,
        })
    }

    async fn archive_team(&self, team_id: &str, set_site_read_only: bool) -> DirectoryResult<bool> {
        let team_id = validate_id("team_id", team_id)?;
        let found = self
            .context
            .mutate(
                &DirectoryCommand::ArchiveTeam {
                    team_id: team_id.clone(),
                    set_site_read_only,
                },
                &[CacheScope::team(&team_id)],
            )
            .await?;
        info!(team_id = %team_id, found = found, set_site_read_only = set_site_read_only, "Team archived");
        Ok(found)
    }

    async fn unarchive_team(&self, team_id: &str) -> DirectoryResult<bool> {
        let team_id = validate_id("team_id", team_id)?;
        self.context
            .mutate(
                &DirectoryCommand::UnarchiveTeam {
                    team_id: team_id.clone(),
                },
                &[CacheScope::team(&team_id)],
            )
            .await
    }

    async fn rename_team(&self, team_id: &str, display_name: &str) -> DirectoryResult<bool> {
        let team_id = validate_id("team_id", team_id)?;
        let display_name = validate_display_name(display_name)?;
        self.context
            .mutate(
                &DirectoryCommand::RenameTeam {
                    team_id: team_id.clone(),
                    display_name,
                },
                &[CacheScope::team(&team_id)],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::harness;

    #[tokio::test]
    async fn test_archive_invalidates_cached_team() {
        let h = harness().await;
        h.directory.seed_team("t-1", "7B Science");
        let teams = TeamService::new(h.context.clone());

        let team = teams.get_team("t-1").await.unwrap().unwrap();
        assert_eq!(team.is_archived, Some(false));

        assert!(teams.archive_team("t-1", true).await.unwrap());
        let team = teams.get_team("t-1").await.unwrap().unwrap();
        assert_eq!(team.is_archived, Some(true));
        assert_eq!(h.directory.call_count("get_team"), 2);
    }

    #[tokio::test]
    async fn test_missing_team_is_none_and_mutations_report_false() {
        let h = harness().await;
        let teams = TeamService::new(h.context.clone());

        assert!(teams.get_team("t-404").await.unwrap().is_none());
        assert!(!teams.archive_team("t-404", false).await.unwrap());
        assert!(!teams.rename_team("t-404", "Renamed").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_team_is_not_retried() {
        let h = harness().await;
        h.directory.seed_user("teacher@school.edu", "Teacher");
        h.directory.fail_times(
            "create_team",
            None,
            DirectoryError::transient("create_team", "502"),
            1,
        );
        let teams = TeamService::new(h.context.clone());
        let new_team = NewTeam {
            display_name: "7B Science".into(),
            description: None,
            owner_upn: "teacher@school.edu".into(),
            template: "educationClass".into(),
        };

        assert!(teams.create_team(new_team.clone()).await.unwrap_err().is_transient());
        assert_eq!(h.directory.call_count("create_team"), 1);

        let team = teams.create_team(new_team).await.unwrap();
        assert_eq!(h.directory.team(&team.id).unwrap().display_name.as_deref(), Some("7B Science"));
    }

    #[tokio::test]
    async fn test_rename_validates_display_name() {
        let h = harness().await;
        h.directory.seed_team("t-1", "7B Science");
        let teams = TeamService::new(h.context.clone());

        assert!(teams.rename_team("t-1", "   ").await.is_err());
        assert!(teams.rename_team("t-1", "7B Biology").await.unwrap());
        assert_eq!(
            teams.get_team("t-1").await.unwrap().unwrap().display_name.as_deref(),
            Some("7B Biology")
        );
    }
}
