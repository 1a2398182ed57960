//! # Entity Command Services
//!
//! One capability trait per entity family. The bulk orchestrator depends on
//! these traits only; [`DirectoryServices`] bundles the concrete
//! implementations built on a shared [`ServiceContext`].
//!
//! ## Contract
//!
//! - Writes validate input, require a live session, run through the
//!   [`ResilientExecutor`] and invalidate affected cache scopes on success.
//! - Reads are cache-first, populate the cache on success and record a
//!   negative entry when the entity does not exist.
//! - Not-found surfaces as `Ok(None)` from reads and `Ok(false)` from
//!   mutations of absent entities.

pub mod licenses;
pub mod memberships;
pub mod teams;
pub mod users;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::cache::{CacheKey, CacheScope, ResultCache};
use crate::config::TeamforgeConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::resilience::{CircuitBreakerManager, ResilientExecutor};
use crate::session::{DirectoryCommand, SessionManager};
use crate::types::{
    DirectoryUser, LicenseSku, MemberRole, NewTeam, NewUser, Team, TeamMember, UserLicense,
    UserPatch,
};

pub use licenses::LicenseService;
pub use memberships::MembershipService;
pub use teams::TeamService;
pub use users::UserService;

/// Outcome of an add-member request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added,
    AlreadyMember,
}

#[async_trait]
pub trait UserCommands: Send + Sync {
    async fn get_user(&self, upn: &str) -> DirectoryResult<Option<DirectoryUser>>;

    /// Create the account; an existing account with the same UPN is returned
    async fn create_user(&self, user: NewUser) -> DirectoryResult<DirectoryUser>;

    /// `Ok(false)` when the user does not exist
    async fn update_user(&self, upn: &str, patch: UserPatch) -> DirectoryResult<bool>;

    async fn disable_user(&self, upn: &str) -> DirectoryResult<bool>;

    async fn enable_user(&self, upn: &str) -> DirectoryResult<bool>;

    async fn list_user_teams(&self, upn: &str) -> DirectoryResult<Option<Vec<Team>>>;
}

#[async_trait]
pub trait TeamCommands: Send + Sync {
    async fn get_team(&self, team_id: &str) -> DirectoryResult<Option<Team>>;

    /// Never retried: a replay could create a second team
    async fn create_team(&self, team: NewTeam) -> DirectoryResult<Team>;

    async fn archive_team(&self, team_id: &str, set_site_read_only: bool) -> DirectoryResult<bool>;

    async fn unarchive_team(&self, team_id: &str) -> DirectoryResult<bool>;

    async fn rename_team(&self, team_id: &str, display_name: &str) -> DirectoryResult<bool>;
}

#[async_trait]
pub trait MembershipCommands: Send + Sync {
    async fn list_members(&self, team_id: &str) -> DirectoryResult<Option<Vec<TeamMember>>>;

    async fn add_member(
        &self,
        team_id: &str,
        upn: &str,
        role: MemberRole,
    ) -> DirectoryResult<MembershipChange>;

    /// `Ok(false)` when `upn` is not a member
    async fn remove_member(&self, team_id: &str, upn: &str) -> DirectoryResult<bool>;

    /// `Ok(false)` when `upn` is not a member
    async fn set_member_role(
        &self,
        team_id: &str,
        upn: &str,
        role: MemberRole,
    ) -> DirectoryResult<bool>;
}

#[async_trait]
pub trait LicenseCommands: Send + Sync {
    async fn list_catalog(&self) -> DirectoryResult<Vec<LicenseSku>>;

    async fn list_user_licenses(&self, upn: &str) -> DirectoryResult<Option<Vec<UserLicense>>>;

    /// `Ok(false)` when the user does not exist
    async fn assign_license(&self, upn: &str, sku_id: &str) -> DirectoryResult<bool>;

    /// `Ok(false)` when the SKU was not assigned
    async fn remove_license(&self, upn: &str, sku_id: &str) -> DirectoryResult<bool>;
}

/// Shared plumbing for the concrete services
#[derive(Debug)]
pub struct ServiceContext {
    session: Arc<SessionManager>,
    cache: Arc<ResultCache>,
    executor: ResilientExecutor,
}

impl ServiceContext {
    pub fn new(
        session: Arc<SessionManager>,
        cache: Arc<ResultCache>,
        executor: ResilientExecutor,
    ) -> Self {
        Self {
            session,
            cache,
            executor,
        }
    }

    /// Wire a context from configuration around an existing session
    pub fn from_config(config: &TeamforgeConfig, session: Arc<SessionManager>) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::from_config(
            &config.resilience.circuit_breakers,
        ));
        Self::new(
            session,
            Arc::new(ResultCache::from_config(&config.cache)),
            ResilientExecutor::from_config(&config.resilience, breakers),
        )
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    pub(crate) async fn run(&self, command: &DirectoryCommand) -> DirectoryResult<Value> {
        self.executor.run_command(&self.session, command).await
    }

    /// Cache-first single entity read
    pub(crate) async fn read_entity<T>(
        &self,
        key: &CacheKey,
        command: &DirectoryCommand,
    ) -> DirectoryResult<Option<T>>
    where
        T: DeserializeOwned + serde::Serialize,
    {
        self.read_through(key, command, |value| value).await
    }

    /// Cache-first collection read; Graph wraps collections in `{"value": [...]}`
    pub(crate) async fn read_collection<T>(
        &self,
        key: &CacheKey,
        command: &DirectoryCommand,
    ) -> DirectoryResult<Option<Vec<T>>>
    where
        T: DeserializeOwned + serde::Serialize,
    {
        self.read_through(key, command, |mut value| match value.get_mut("value") {
            Some(items) => items.take(),
            None => Value::Array(Vec::new()),
        })
        .await
    }

    async fn read_through<T, F>(
        &self,
        key: &CacheKey,
        command: &DirectoryCommand,
        extract: F,
    ) -> DirectoryResult<Option<T>>
    where
        T: DeserializeOwned + serde::Serialize,
        F: FnOnce(Value) -> Value,
    {
        if let Some(cached) = self.cache.lookup::<T>(key) {
            return Ok(cached);
        }

        // A write landing while this read is in flight wins over its result
        let generation = self.cache.generation(key);
        match self.run(command).await {
            Ok(value) => {
                let decoded: T = serde_json::from_value(extract(value))?;
                self.cache.store_if_current(key, &decoded, generation);
                Ok(Some(decoded))
            }
            Err(DirectoryError::NotFound { .. }) => {
                self.cache.store_not_found_if_current(key, generation);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Run a mutation whose target may be absent: `Ok(false)` on not-found
    ///
    /// The scopes are invalidated either way; a not-found answer means any
    /// cached positive entry is stale.
    pub(crate) async fn mutate(
        &self,
        command: &DirectoryCommand,
        scopes: &[CacheScope],
    ) -> DirectoryResult<bool> {
        let outcome = match self.run(command).await {
            Ok(_) => Ok(true),
            Err(DirectoryError::NotFound { .. }) => Ok(false),
            Err(error) => return Err(error),
        };
        self.invalidate(scopes);
        outcome
    }

    /// Drop a cached value so the next read goes to the directory
    pub(crate) fn forget(&self, key: &CacheKey) {
        self.cache.invalidate(key.as_str());
    }

    pub(crate) fn invalidate(&self, scopes: &[CacheScope]) {
        for scope in scopes {
            self.cache.invalidate_scope(scope);
        }
    }
}

/// The four capability sets the orchestrator works against
#[derive(Clone)]
pub struct DirectoryServices {
    pub users: Arc<dyn UserCommands>,
    pub teams: Arc<dyn TeamCommands>,
    pub memberships: Arc<dyn MembershipCommands>,
    pub licenses: Arc<dyn LicenseCommands>,
}

impl DirectoryServices {
    /// Concrete services sharing one context
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self {
            users: Arc::new(UserService::new(context.clone())),
            teams: Arc::new(TeamService::new(context.clone())),
            memberships: Arc::new(MembershipService::new(context.clone())),
            licenses: Arc::new(LicenseService::new(context)),
        }
    }
}

impl std::fmt::Debug for DirectoryServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::{AccessToken, DirectoryTransport, InMemoryDirectory};
    use std::time::Duration;

    pub(crate) struct Harness {
        pub directory: Arc<InMemoryDirectory>,
        pub context: Arc<ServiceContext>,
        pub clock: ManualClock,
    }

    /// Connected context over an in-memory directory with immediate retries
    pub(crate) async fn harness() -> Harness {
        let directory = Arc::new(InMemoryDirectory::new());
        harness_with_transport(directory.clone(), directory).await
    }

    /// Same wiring with `transport` standing in front of `directory`
    pub(crate) async fn harness_with_transport(
        directory: Arc<InMemoryDirectory>,
        transport: Arc<dyn DirectoryTransport>,
    ) -> Harness {
        let clock = ManualClock::new();
        let config = TeamforgeConfig::default();

        let session = Arc::new(SessionManager::new(transport, Duration::from_secs(5)));
        session.connect(&AccessToken::new("test-token-0001")).await.unwrap();

        let cache = Arc::new(ResultCache::new(
            (&config.cache).into(),
            config.cache.max_entries,
            Arc::new(clock.clone()),
        ));
        let breakers = Arc::new(CircuitBreakerManager::with_clock(
            &config.resilience.circuit_breakers,
            Arc::new(clock.clone()),
        ));
        let executor = ResilientExecutor::new(
            breakers,
            crate::resilience::RetryPolicy::immediate(3),
            Duration::from_secs(30),
            Duration::from_secs(60),
        );

        Harness {
            directory,
            context: Arc::new(ServiceContext::new(session, cache, executor)),
            clock,
        }
    }
}
