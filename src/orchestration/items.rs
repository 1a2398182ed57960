//! Work items accepted by the bulk orchestrator
//!
//! Each item carries a natural key; duplicate keys inside one submission are
//! rejected before a run is registered.

use serde::Deserialize;
use std::collections::HashSet;

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::types::{MemberRole, NewUser};

/// One unit of bulk work
pub trait WorkItem: Send + Sync + Clone + 'static {
    /// Natural identity, compared case-insensitively
    fn key(&self) -> String;

    /// Per-item operation label used in results and logs
    fn operation(&self) -> &'static str;
}

/// Reject a submission containing the same key twice
pub fn ensure_unique_keys<I: WorkItem>(items: &[I]) -> OrchestrationResult<()> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let key = item.key().trim().to_lowercase();
        if !seen.insert(key.clone()) {
            return Err(OrchestrationError::InvalidInput(format!(
                "duplicate key '{key}' in submission"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamAssignment {
    pub team_id: String,
    #[serde(default = "default_member_role")]
    pub role: MemberRole,
}

fn default_member_role() -> MemberRole {
    MemberRole::Member
}

/// Create-if-absent account, then licenses, then team memberships
#[derive(Debug, Clone, Deserialize)]
pub struct OnboardingPlan {
    pub user: NewUser,
    #[serde(default)]
    pub license_sku_ids: Vec<String>,
    #[serde(default)]
    pub teams: Vec<TeamAssignment>,
}

impl OnboardingPlan {
    pub fn new(user: NewUser) -> Self {
        Self {
            user,
            license_sku_ids: Vec::new(),
            teams: Vec::new(),
        }
    }

    pub fn with_license(mut self, sku_id: impl Into<String>) -> Self {
        self.license_sku_ids.push(sku_id.into());
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>, role: MemberRole) -> Self {
        self.teams.push(TeamAssignment {
            team_id: team_id.into(),
            role,
        });
        self
    }
}

impl WorkItem for OnboardingPlan {
    fn key(&self) -> String {
        self.user.user_principal_name.trim().to_lowercase()
    }

    fn operation(&self) -> &'static str {
        "onboard_user"
    }
}

/// Disable an account and optionally strip its memberships and licenses
#[derive(Debug, Clone, Deserialize)]
pub struct OffboardingTarget {
    pub upn: String,
    #[serde(default = "default_true")]
    pub remove_from_teams: bool,
    #[serde(default = "default_true")]
    pub remove_licenses: bool,
}

fn default_true() -> bool {
    true
}

impl OffboardingTarget {
    pub fn new(upn: impl Into<String>) -> Self {
        Self {
            upn: upn.into(),
            remove_from_teams: true,
            remove_licenses: true,
        }
    }

    /// Disable only
    pub fn disable_only(upn: impl Into<String>) -> Self {
        Self {
            upn: upn.into(),
            remove_from_teams: false,
            remove_licenses: false,
        }
    }
}

impl From<&str> for OffboardingTarget {
    fn from(upn: &str) -> Self {
        Self::new(upn)
    }
}

impl WorkItem for OffboardingTarget {
    fn key(&self) -> String {
        self.upn.trim().to_lowercase()
    }

    fn operation(&self) -> &'static str {
        "offboard_user"
    }
}

/// Set a member's role in a team
#[derive(Debug, Clone, Deserialize)]
pub struct RoleChange {
    pub team_id: String,
    pub upn: String,
    pub role: MemberRole,
}

impl WorkItem for RoleChange {
    fn key(&self) -> String {
        format!("{}/{}", self.team_id.trim(), self.upn.trim().to_lowercase())
    }

    fn operation(&self) -> &'static str {
        "change_member_role"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipAction {
    Add,
    Remove,
}

/// Add a user to, or remove a user from, a team
#[derive(Debug, Clone, Deserialize)]
pub struct MembershipOperation {
    pub team_id: String,
    pub upn: String,
    pub action: MembershipAction,
    /// Role granted on add
    #[serde(default = "default_member_role")]
    pub role: MemberRole,
}

impl MembershipOperation {
    pub fn add(team_id: impl Into<String>, upn: impl Into<String>, role: MemberRole) -> Self {
        Self {
            team_id: team_id.into(),
            upn: upn.into(),
            action: MembershipAction::Add,
            role,
        }
    }

    pub fn remove(team_id: impl Into<String>, upn: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            upn: upn.into(),
            action: MembershipAction::Remove,
            role: MemberRole::Member,
        }
    }
}

impl WorkItem for MembershipOperation {
    fn key(&self) -> String {
        format!("{}/{}", self.team_id.trim(), self.upn.trim().to_lowercase())
    }

    fn operation(&self) -> &'static str {
        match self.action {
            MembershipAction::Add => "add_member",
            MembershipAction::Remove => "remove_member",
        }
    }
}

/// Archive a team
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveTarget {
    pub team_id: String,
    #[serde(default)]
    pub set_site_read_only: bool,
}

impl ArchiveTarget {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            set_site_read_only: false,
        }
    }
}

impl From<&str> for ArchiveTarget {
    fn from(team_id: &str) -> Self {
        Self::new(team_id)
    }
}

impl WorkItem for ArchiveTarget {
    fn key(&self) -> String {
        self.team_id.trim().to_lowercase()
    }

    fn operation(&self) -> &'static str {
        "archive_team"
    }
}
