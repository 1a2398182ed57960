//! # Directory Types
//!
//! Entities exchanged with the directory platform. Field names follow the
//! Microsoft Graph JSON shape (`camelCase`) so responses deserialize directly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A directory user account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub user_principal_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub account_enabled: Option<bool>,
}

/// Input for account creation
#[derive(Clone, Default, Deserialize)]
pub struct NewUser {
    pub user_principal_name: String,
    pub display_name: String,
    /// Derived from the UPN local part when absent
    #[serde(default)]
    pub mail_nickname: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub usage_location: Option<String>,
    #[serde(default)]
    pub initial_password: Option<String>,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("user_principal_name", &self.user_principal_name)
            .field("display_name", &self.display_name)
            .field("mail_nickname", &self.mail_nickname)
            .field("department", &self.department)
            .field(
                "initial_password",
                &self.initial_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.given_name.is_none()
            && self.surname.is_none()
            && self.department.is_none()
            && self.job_title.is_none()
    }
}

/// A collaboration team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Input for team creation
#[derive(Debug, Clone, Deserialize)]
pub struct NewTeam {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner_upn: String,
    /// Graph team template id, e.g. `standard` or `educationClass`
    #[serde(default = "default_team_template")]
    pub template: String,
}

fn default_team_template() -> String {
    "standard".to_string()
}

/// Membership role inside a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    /// Graph `roles` array for this role
    pub fn graph_roles(&self) -> Vec<&'static str> {
        match self {
            Self::Owner => vec!["owner"],
            Self::Member => Vec::new(),
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Member => write!(f, "member"),
        }
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "member" => Ok(Self::Member),
            _ => Err(format!("Invalid member role: {s}")),
        }
    }
}

/// A team membership (`aadUserConversationMember`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    /// Membership id, distinct from the user id
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl TeamMember {
    pub fn role(&self) -> MemberRole {
        if self.roles.iter().any(|r| r.eq_ignore_ascii_case("owner")) {
            MemberRole::Owner
        } else {
            MemberRole::Member
        }
    }

    /// Whether this membership belongs to `upn`
    pub fn matches_upn(&self, upn: &str) -> bool {
        self.email
            .as_deref()
            .is_some_and(|email| email.eq_ignore_ascii_case(upn))
    }
}

/// A subscribed license SKU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSku {
    pub sku_id: String,
    #[serde(default)]
    pub sku_part_number: Option<String>,
    #[serde(default)]
    pub consumed_units: i64,
}

/// A license assigned to a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLicense {
    pub sku_id: String,
    #[serde(default)]
    pub sku_part_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserializes_from_graph_shape() {
        let json = serde_json::json!({
            "id": "1f0e",
            "userPrincipalName": "ada@school.edu",
            "displayName": "Ada Lovelace",
            "accountEnabled": false
        });
        let user: DirectoryUser = serde_json::from_value(json).unwrap();
        assert_eq!(user.user_principal_name, "ada@school.edu");
        assert_eq!(user.account_enabled, Some(false));
        assert!(user.mail.is_none());
    }

    #[test]
    fn test_member_role_resolution() {
        let owner = TeamMember {
            id: "m1".into(),
            display_name: None,
            user_id: Some("u1".into()),
            email: Some("Teacher@School.edu".into()),
            roles: vec!["Owner".into()],
        };
        assert_eq!(owner.role(), MemberRole::Owner);
        assert!(owner.matches_upn("teacher@school.edu"));
        assert!(!owner.matches_upn("student@school.edu"));
    }

    #[test]
    fn test_member_role_parsing() {
        assert_eq!("OWNER".parse::<MemberRole>().unwrap(), MemberRole::Owner);
        assert_eq!(MemberRole::Member.to_string(), "member");
        assert!("guest".parse::<MemberRole>().is_err());
        assert!(MemberRole::Member.graph_roles().is_empty());
    }

    #[test]
    fn test_new_user_debug_redacts_password() {
        let user = NewUser {
            user_principal_name: "ada@school.edu".into(),
            display_name: "Ada".into(),
            initial_password: Some("Hunter2!".into()),
            ..Default::default()
        };
        let rendered = format!("{user:?}");
        assert!(!rendered.contains("Hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_patch_emptiness() {
        assert!(UserPatch::default().is_empty());
        let patch = UserPatch {
            department: Some("Science".into()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        let body = serde_json::to_value(&patch).unwrap();
        assert_eq!(body, serde_json::json!({"department": "Science"}));
    }
}
