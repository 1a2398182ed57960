//! User account commands

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ServiceContext, UserCommands};
use crate::cache::{CacheKey, CacheScope};
use crate::error::DirectoryResult;
use crate::session::DirectoryCommand;
use crate::types::{DirectoryUser, NewUser, Team, UserPatch};
use crate::validation::{
    derive_mail_nickname, sanitize_mail_nickname, validate_display_name, validate_upn,
};

#[derive(Debug, Clone)]
pub struct UserService {
    context: Arc<ServiceContext>,
}

impl UserService {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }

    fn sanitize_new_user(user: NewUser) -> DirectoryResult<NewUser> {
        let upn = validate_upn(&user.user_principal_name)?;
        let display_name = validate_display_name(&user.display_name)?;
        let mail_nickname = match user.mail_nickname.as_deref() {
            Some(raw) => sanitize_mail_nickname(raw)?,
            None => derive_mail_nickname(&upn),
        };

        Ok(NewUser {
            user_principal_name: upn,
            display_name,
            mail_nickname: Some(mail_nickname),
            ..user
        })
    }

    fn sanitize_patch(patch: UserPatch) -> DirectoryResult<UserPatch> {
        let display_name = patch
            .display_name
            .as_deref()
            .map(validate_display_name)
            .transpose()?;
        Ok(UserPatch {
            display_name,
            ..patch
        })
    }

    async fn set_account_enabled(&self, upn: &str, enabled: bool) -> DirectoryResult<bool> {
        let upn = validate_upn(upn)?;
        let changed = self
            .context
            .mutate(
                &DirectoryCommand::SetAccountEnabled {
                    upn: upn.clone(),
                    enabled,
                },
                &[CacheScope::user(&upn)],
            )
            .await?;
        info!(upn = %upn, enabled = enabled, found = changed, "Account state updated");
        Ok(changed)
    }
}

#[async_trait]
impl UserCommands for UserService {
    async fn get_user(&self, upn: &str) -> DirectoryResult<Option<DirectoryUser>> {
        let upn = validate_upn(upn)?;
        self.context
            .read_entity(&CacheKey::user(&upn), &DirectoryCommand::GetUser { upn })
            .await
    }

    async fn create_user(&self, user: NewUser) -> DirectoryResult<DirectoryUser> {
        let user = Self::sanitize_new_user(user)?;
        let upn = user.user_principal_name.clone();

        match self.context.run(&DirectoryCommand::CreateUser(user)).await {
            Ok(value) => {
                self.context.invalidate(&[CacheScope::user(&upn)]);
                let created: DirectoryUser = serde_json::from_value(value)?;
                info!(upn = %upn, user_id = %created.id, "User created");
                Ok(created)
            }
            Err(error) if error.is_conflict() => {
                // Also covers a retried create whose first attempt landed
                self.context.forget(&CacheKey::user(&upn));
                match self.get_user(&upn).await? {
                    Some(existing) => {
                        debug!(upn = %upn, user_id = %existing.id, "User already exists, reusing");
                        Ok(existing)
                    }
                    None => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    async fn update_user(&self, upn: &str, patch: UserPatch) -> DirectoryResult<bool> {
        let upn = validate_upn(upn)?;
        let patch = Self::sanitize_patch(patch)?;

        if patch.is_empty() {
            return Ok(self.get_user(&upn).await?.is_some());
        }

        self.context
            .mutate(
                &DirectoryCommand::UpdateUser {
                    upn: upn.clone(),
                    patch,
                },
                &[CacheScope::user(&upn)],
            )
            .await
    }

    async fn disable_user(&self, upn: &str) -> DirectoryResult<bool> {
        self.set_account_enabled(upn, false).await
    }

    async fn enable_user(&self, upn: &str) -> DirectoryResult<bool> {
        self.set_account_enabled(upn, true).await
    }

    async fn list_user_teams(&self, upn: &str) -> DirectoryResult<Option<Vec<Team>>> {
        let upn = validate_upn(upn)?;
        self.context
            .read_collection(
                &CacheKey::user_teams(&upn),
                &DirectoryCommand::ListUserTeams { upn },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;
    use crate::services::test_support::{harness, harness_with_transport};
    use crate::session::{AccessToken, DirectoryTransport, InMemoryDirectory};
    use std::time::Duration;

    /// Applies reads right away but answers them only after `delay`
    #[derive(Debug)]
    struct SlowReads {
        inner: Arc<InMemoryDirectory>,
        delay: Duration,
    }

    #[async_trait]
    impl DirectoryTransport for SlowReads {
        async fn connect(&self, token: &AccessToken) -> DirectoryResult<()> {
            self.inner.connect(token).await
        }

        async fn execute(&self, command: &DirectoryCommand) -> DirectoryResult<serde_json::Value> {
            let result = self.inner.execute(command).await;
            if !command.is_mutation() {
                tokio::time::sleep(self.delay).await;
            }
            result
        }

        async fn disconnect(&self) {
            self.inner.disconnect().await
        }
    }

    fn new_user(upn: &str) -> NewUser {
        NewUser {
            user_principal_name: upn.to_string(),
            display_name: "Ada Lovelace".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_user_is_cached_within_ttl() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        let users = UserService::new(h.context.clone());

        for _ in 0..3 {
            let user = users.get_user("ADA@school.edu").await.unwrap();
            assert!(user.is_some());
        }
        assert_eq!(h.directory.call_count("get_user"), 1);

        h.clock.advance(Duration::from_secs(901));
        users.get_user("ada@school.edu").await.unwrap();
        assert_eq!(h.directory.call_count("get_user"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_overlapping_a_write_does_not_cache_stale_state() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.seed_user("ada@school.edu", "Ada");
        let transport = Arc::new(SlowReads {
            inner: directory.clone(),
            delay: Duration::from_millis(100),
        });
        let h = harness_with_transport(directory, transport).await;
        let users = Arc::new(UserService::new(h.context.clone()));

        let reader = {
            let users = users.clone();
            tokio::spawn(async move { users.get_user("ada@school.edu").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(users.disable_user("ada@school.edu").await.unwrap());

        let in_flight = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(in_flight.account_enabled, Some(true));

        let fresh = users.get_user("ada@school.edu").await.unwrap().unwrap();
        assert_eq!(fresh.account_enabled, Some(false));
        assert_eq!(h.directory.user("ada@school.edu").unwrap().account_enabled, Some(false));
        assert_eq!(h.directory.call_count("get_user"), 2);
    }

    #[tokio::test]
    async fn test_missing_user_is_negatively_cached() {
        let h = harness().await;
        let users = UserService::new(h.context.clone());

        assert!(users.get_user("ghost@school.edu").await.unwrap().is_none());
        assert!(users.get_user("ghost@school.edu").await.unwrap().is_none());
        assert_eq!(h.directory.call_count("get_user"), 1);

        h.clock.advance(Duration::from_secs(61));
        users.get_user("ghost@school.edu").await.unwrap();
        assert_eq!(h.directory.call_count("get_user"), 2);
    }

    #[tokio::test]
    async fn test_create_user_invalidates_negative_entry() {
        let h = harness().await;
        let users = UserService::new(h.context.clone());

        assert!(users.get_user("ada@school.edu").await.unwrap().is_none());
        let created = users.create_user(new_user("Ada@School.edu")).await.unwrap();
        assert_eq!(created.user_principal_name, "ada@school.edu");

        let fetched = users.get_user("ada@school.edu").await.unwrap();
        assert_eq!(fetched.map(|u| u.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_create_user_tolerates_existing_account() {
        let h = harness().await;
        let existing = h.directory.seed_user("ada@school.edu", "Ada");
        let users = UserService::new(h.context.clone());

        let returned = users.create_user(new_user("ada@school.edu")).await.unwrap();
        assert_eq!(returned.id, existing.id);
    }

    #[tokio::test]
    async fn test_validation_fails_before_any_call() {
        let h = harness().await;
        let users = UserService::new(h.context.clone());

        let err = users.create_user(new_user("not-an-upn")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Validation { .. }));
        let err = users.disable_user("a b@school.edu").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Validation { .. }));
        assert!(h.directory.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disable_user_invalidates_and_reports_absence() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        let users = UserService::new(h.context.clone());

        let before = users.get_user("ada@school.edu").await.unwrap().unwrap();
        assert_eq!(before.account_enabled, Some(true));

        assert!(users.disable_user("ada@school.edu").await.unwrap());
        let after = users.get_user("ada@school.edu").await.unwrap().unwrap();
        assert_eq!(after.account_enabled, Some(false));
        assert_eq!(h.directory.call_count("get_user"), 2);

        assert!(!users.disable_user("ghost@school.edu").await.unwrap());
    }

    #[tokio::test]
    async fn test_transient_read_failures_are_retried() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        h.directory.fail_times(
            "get_user",
            None,
            DirectoryError::transient("get_user", "503"),
            2,
        );
        let users = UserService::new(h.context.clone());

        assert!(users.get_user("ada@school.edu").await.unwrap().is_some());
        assert_eq!(h.directory.call_count("get_user"), 3);
    }

    #[tokio::test]
    async fn test_update_user_with_empty_patch_checks_existence() {
        let h = harness().await;
        h.directory.seed_user("ada@school.edu", "Ada");
        let users = UserService::new(h.context.clone());

        assert!(users
            .update_user("ada@school.edu", UserPatch::default())
            .await
            .unwrap());
        assert_eq!(h.directory.mutation_count(), 0);

        let patch = UserPatch {
            department: Some("Science".into()),
            ..Default::default()
        };
        assert!(users.update_user("ada@school.edu", patch).await.unwrap());
        let user = h.directory.user("ada@school.edu").unwrap();
        assert_eq!(user.department.as_deref(), Some("Science"));
    }
}
