//! Offboarding: disable the account, leave teams, release licenses

use async_trait::async_trait;

use super::{ItemProcessor, ItemReport};
use crate::error::{DirectoryError, DirectoryResult};
use crate::orchestration::items::OffboardingTarget;
use crate::services::DirectoryServices;
use crate::validation::validate_upn;

#[derive(Debug, Clone)]
pub struct OffboardingProcessor {
    services: DirectoryServices,
}

impl OffboardingProcessor {
    pub fn new(services: DirectoryServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ItemProcessor<OffboardingTarget> for OffboardingProcessor {
    async fn process(&self, target: &OffboardingTarget, dry_run: bool) -> DirectoryResult<ItemReport> {
        let upn = validate_upn(&target.upn)?;
        if self.services.users.get_user(&upn).await?.is_none() {
            return Err(DirectoryError::not_found("user", &upn));
        }

        let teams = if target.remove_from_teams {
            self.services
                .users
                .list_user_teams(&upn)
                .await?
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        let licenses = if target.remove_licenses {
            self.services
                .licenses
                .list_user_licenses(&upn)
                .await?
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        if dry_run {
            return Ok(ItemReport::new(
                format!(
                    "would disable account, leave {} team(s), release {} license(s)",
                    teams.len(),
                    licenses.len()
                ),
                vec![upn],
            ));
        }

        if !self.services.users.disable_user(&upn).await? {
            return Err(DirectoryError::not_found("user", &upn));
        }

        let mut affected = vec![upn.clone()];
        let mut left = 0;
        for team in &teams {
            if self.services.memberships.remove_member(&team.id, &upn).await? {
                left += 1;
                affected.push(team.id.clone());
            }
        }

        let mut released = 0;
        for license in &licenses {
            if self
                .services
                .licenses
                .remove_license(&upn, &license.sku_id)
                .await?
            {
                released += 1;
            }
        }

        Ok(ItemReport::new(
            format!("account disabled; left {left} team(s); released {released} license(s)"),
            affected,
        ))
    }
}
