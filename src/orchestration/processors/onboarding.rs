//! Onboarding: create-if-absent account, assign licenses, join teams

use async_trait::async_trait;

use super::{ItemProcessor, ItemReport};
use crate::error::{DirectoryError, DirectoryResult};
use crate::orchestration::items::OnboardingPlan;
use crate::services::{DirectoryServices, MembershipChange};
use crate::validation::{validate_display_name, validate_id, validate_upn};

#[derive(Debug, Clone)]
pub struct OnboardingProcessor {
    services: DirectoryServices,
}

impl OnboardingProcessor {
    pub fn new(services: DirectoryServices) -> Self {
        Self { services }
    }

    async fn preview(&self, plan: &OnboardingPlan, upn: &str) -> DirectoryResult<ItemReport> {
        let existing = self.services.users.get_user(upn).await?;
        if existing.is_none() {
            validate_display_name(&plan.user.display_name)?;
        }

        for assignment in &plan.teams {
            if self.services.teams.get_team(&assignment.team_id).await?.is_none() {
                return Err(DirectoryError::not_found("team", &assignment.team_id));
            }
        }

        if !plan.license_sku_ids.is_empty() {
            let catalog = self.services.licenses.list_catalog().await?;
            if let Some(unknown) = plan
                .license_sku_ids
                .iter()
                .find(|sku| !catalog.iter().any(|entry| entry.sku_id == **sku))
            {
                return Err(DirectoryError::validation(
                    "sku_id",
                    format!("'{unknown}' is not in the license catalog"),
                ));
            }
        }

        let action = if existing.is_some() { "reuse existing" } else { "create" };
        Ok(ItemReport::new(
            format!(
                "would {action} account, assign {} license(s), add to {} team(s)",
                plan.license_sku_ids.len(),
                plan.teams.len()
            ),
            vec![upn.to_string()],
        ))
    }
}

#[async_trait]
impl ItemProcessor<OnboardingPlan> for OnboardingProcessor {
    async fn process(&self, plan: &OnboardingPlan, dry_run: bool) -> DirectoryResult<ItemReport> {
        let upn = validate_upn(&plan.user.user_principal_name)?;
        for sku_id in &plan.license_sku_ids {
            validate_id("sku_id", sku_id)?;
        }
        for assignment in &plan.teams {
            validate_id("team_id", &assignment.team_id)?;
        }

        if dry_run {
            return self.preview(plan, &upn).await;
        }

        let (user, created) = match self.services.users.get_user(&upn).await? {
            Some(user) => (user, false),
            None => (self.services.users.create_user(plan.user.clone()).await?, true),
        };

        for sku_id in &plan.license_sku_ids {
            if !self.services.licenses.assign_license(&upn, sku_id).await? {
                return Err(DirectoryError::not_found("user", &upn));
            }
        }

        let mut affected = vec![upn.clone()];
        let mut joined = 0;
        for assignment in &plan.teams {
            let change = self
                .services
                .memberships
                .add_member(&assignment.team_id, &upn, assignment.role)
                .await?;
            if change == MembershipChange::Added {
                joined += 1;
            }
            affected.push(assignment.team_id.clone());
        }

        Ok(ItemReport::new(
            format!(
                "{} account {}; {} license(s) assigned; added to {joined} of {} team(s)",
                if created { "created" } else { "reused" },
                user.id,
                plan.license_sku_ids.len(),
                plan.teams.len()
            ),
            affected,
        ))
    }
}
