//! Cache key construction and invalidation scopes.
//!
//! Keys are `entity:id[:derived]`. UPNs are lower-cased so lookups are
//! case-insensitive, matching the directory's own UPN semantics.

use std::fmt;

use crate::constants::cache_keys;

/// Entity family a key belongs to; drives its default TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    User,
    UserTeams,
    UserLicenses,
    Team,
    TeamMembers,
    LicenseCatalog,
}

/// A fully built cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    value: String,
    kind: CacheKind,
}

impl CacheKey {
    pub fn user(upn: &str) -> Self {
        Self {
            value: format!("{}:{}", cache_keys::USER, normalize_upn(upn)),
            kind: CacheKind::User,
        }
    }

    pub fn user_teams(upn: &str) -> Self {
        Self {
            value: format!(
                "{}:{}:{}",
                cache_keys::USER,
                normalize_upn(upn),
                cache_keys::TEAMS_SUFFIX
            ),
            kind: CacheKind::UserTeams,
        }
    }

    pub fn user_licenses(upn: &str) -> Self {
        Self {
            value: format!(
                "{}:{}:{}",
                cache_keys::USER,
                normalize_upn(upn),
                cache_keys::LICENSES_SUFFIX
            ),
            kind: CacheKind::UserLicenses,
        }
    }

    pub fn team(team_id: &str) -> Self {
        Self {
            value: format!("{}:{}", cache_keys::TEAM, team_id.trim()),
            kind: CacheKind::Team,
        }
    }

    pub fn team_members(team_id: &str) -> Self {
        Self {
            value: format!(
                "{}:{}:{}",
                cache_keys::TEAM,
                team_id.trim(),
                cache_keys::MEMBERS_SUFFIX
            ),
            kind: CacheKind::TeamMembers,
        }
    }

    pub fn license_catalog() -> Self {
        Self {
            value: cache_keys::LICENSE_CATALOG.to_string(),
            kind: CacheKind::LicenseCatalog,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Everything cached about one entity: its base key and all derived keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheScope {
    User(String),
    Team(String),
    LicenseCatalog,
}

impl CacheScope {
    pub fn user(upn: &str) -> Self {
        Self::User(normalize_upn(upn))
    }

    pub fn team(team_id: &str) -> Self {
        Self::Team(team_id.trim().to_string())
    }

    pub fn base_key(&self) -> String {
        match self {
            Self::User(upn) => format!("{}:{}", cache_keys::USER, upn),
            Self::Team(id) => format!("{}:{}", cache_keys::TEAM, id),
            Self::LicenseCatalog => cache_keys::LICENSE_CATALOG.to_string(),
        }
    }

    /// Prefix shared by derived keys (`base:`)
    pub fn derived_prefix(&self) -> String {
        format!("{}:", self.base_key())
    }
}

pub fn normalize_upn(upn: &str) -> String {
    upn.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(CacheKey::user("Ada@School.EDU").as_str(), "user:ada@school.edu");
        assert_eq!(
            CacheKey::user_teams("ada@school.edu").as_str(),
            "user:ada@school.edu:teams"
        );
        assert_eq!(
            CacheKey::user_licenses("ada@school.edu").as_str(),
            "user:ada@school.edu:licenses"
        );
        assert_eq!(CacheKey::team("t-1").as_str(), "team:t-1");
        assert_eq!(CacheKey::team_members("t-1").as_str(), "team:t-1:members");
        assert_eq!(CacheKey::license_catalog().as_str(), "licenses:catalog");
    }

    #[test]
    fn test_scope_covers_derived_keys_only_for_same_entity() {
        let scope = CacheScope::user("ada@school.edu");
        let prefix = scope.derived_prefix();

        assert_eq!(scope.base_key(), CacheKey::user("ada@school.edu").as_str());
        assert!(CacheKey::user_teams("ada@school.edu")
            .as_str()
            .starts_with(&prefix));
        assert!(!CacheKey::user("ada@school.edu.au").as_str().starts_with(&prefix));
    }
}
