//! # Directory Commands
//!
//! Typed commands issued through the session. Each command knows its
//! operation name (for logs and breaker metrics), its call class (for retry
//! eligibility and timeout budget) and the entity it addresses (for not-found
//! reporting).

use crate::resilience::CallClass;
use crate::types::{MemberRole, NewTeam, NewUser, UserPatch};

#[derive(Debug, Clone)]
pub enum DirectoryCommand {
    GetUser {
        upn: String,
    },
    CreateUser(NewUser),
    UpdateUser {
        upn: String,
        patch: UserPatch,
    },
    SetAccountEnabled {
        upn: String,
        enabled: bool,
    },
    ListUserTeams {
        upn: String,
    },
    GetTeam {
        team_id: String,
    },
    CreateTeam(NewTeam),
    ArchiveTeam {
        team_id: String,
        set_site_read_only: bool,
    },
    UnarchiveTeam {
        team_id: String,
    },
    RenameTeam {
        team_id: String,
        display_name: String,
    },
    ListMembers {
        team_id: String,
    },
    AddMember {
        team_id: String,
        upn: String,
        role: MemberRole,
    },
    RemoveMember {
        team_id: String,
        membership_id: String,
    },
    SetMemberRole {
        team_id: String,
        membership_id: String,
        role: MemberRole,
    },
    ListLicenseCatalog,
    ListUserLicenses {
        upn: String,
    },
    AssignLicense {
        upn: String,
        sku_id: String,
    },
    RemoveLicense {
        upn: String,
        sku_id: String,
    },
}

impl DirectoryCommand {
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::GetUser { .. } => "get_user",
            Self::CreateUser(_) => "create_user",
            Self::UpdateUser { .. } => "update_user",
            Self::SetAccountEnabled { enabled: true, .. } => "enable_user",
            Self::SetAccountEnabled { enabled: false, .. } => "disable_user",
            Self::ListUserTeams { .. } => "list_user_teams",
            Self::GetTeam { .. } => "get_team",
            Self::CreateTeam(_) => "create_team",
            Self::ArchiveTeam { .. } => "archive_team",
            Self::UnarchiveTeam { .. } => "unarchive_team",
            Self::RenameTeam { .. } => "rename_team",
            Self::ListMembers { .. } => "list_members",
            Self::AddMember { .. } => "add_member",
            Self::RemoveMember { .. } => "remove_member",
            Self::SetMemberRole { .. } => "set_member_role",
            Self::ListLicenseCatalog => "list_license_catalog",
            Self::ListUserLicenses { .. } => "list_user_licenses",
            Self::AssignLicense { .. } => "assign_license",
            Self::RemoveLicense { .. } => "remove_license",
        }
    }

    /// Retry eligibility and timeout budget
    pub fn call_class(&self) -> CallClass {
        match self {
            Self::GetUser { .. }
            | Self::ListUserTeams { .. }
            | Self::GetTeam { .. }
            | Self::ListMembers { .. }
            | Self::ListLicenseCatalog
            | Self::ListUserLicenses { .. } => CallClass::Read,
            // Keyed by UPN and conflict-tolerant, so a replay is harmless
            Self::CreateUser(_) => CallClass::IdempotentWrite,
            Self::UpdateUser { .. }
            | Self::SetAccountEnabled { .. }
            | Self::ArchiveTeam { .. }
            | Self::UnarchiveTeam { .. }
            | Self::RenameTeam { .. }
            | Self::AddMember { .. }
            | Self::RemoveMember { .. }
            | Self::SetMemberRole { .. }
            | Self::AssignLicense { .. }
            | Self::RemoveLicense { .. } => CallClass::IdempotentWrite,
            Self::CreateTeam(_) => CallClass::NonIdempotentWrite,
        }
    }

    /// Entity kind and id addressed by the command
    pub fn target(&self) -> (&'static str, &str) {
        match self {
            Self::GetUser { upn }
            | Self::UpdateUser { upn, .. }
            | Self::SetAccountEnabled { upn, .. }
            | Self::ListUserTeams { upn }
            | Self::ListUserLicenses { upn }
            | Self::AssignLicense { upn, .. }
            | Self::RemoveLicense { upn, .. } => ("user", upn),
            Self::CreateUser(user) => ("user", &user.user_principal_name),
            Self::GetTeam { team_id }
            | Self::ArchiveTeam { team_id, .. }
            | Self::UnarchiveTeam { team_id }
            | Self::RenameTeam { team_id, .. }
            | Self::ListMembers { team_id } => ("team", team_id),
            Self::CreateTeam(team) => ("team", &team.display_name),
            Self::AddMember { team_id, .. } => ("team", team_id),
            Self::RemoveMember { membership_id, .. }
            | Self::SetMemberRole { membership_id, .. } => ("membership", membership_id),
            Self::ListLicenseCatalog => ("license_catalog", "subscribedSkus"),
        }
    }

    pub fn is_mutation(&self) -> bool {
        self.call_class() != CallClass::Read
    }
}
