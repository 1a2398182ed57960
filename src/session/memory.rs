//! # In-Memory Directory
//!
//! A [`DirectoryTransport`] backed by an in-process directory model. Used by
//! tests and local tooling: seed users, teams, memberships and SKUs, inject
//! scripted failures per operation/target, and inspect the call log and peak
//! concurrency afterwards.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{AccessToken, DirectoryCommand, DirectoryTransport};
use crate::error::{DirectoryError, DirectoryResult};
use crate::types::{DirectoryUser, LicenseSku, MemberRole, Team, TeamMember};

/// Scripted failure for matching commands
#[derive(Debug, Clone)]
struct FailureRule {
    operation: String,
    /// Matches `DirectoryCommand::target` id, case-insensitively
    target: Option<String>,
    error: DirectoryError,
    /// `None` fails forever
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<String, DirectoryUser>,
    teams: HashMap<String, Team>,
    members: HashMap<String, Vec<TeamMember>>,
    user_licenses: HashMap<String, Vec<String>>,
    catalog: Vec<LicenseSku>,
    next_id: u64,
}

impl DirectoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }
}

/// In-process directory implementing [`DirectoryTransport`]
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
    failures: Mutex<Vec<FailureRule>>,
    calls: Mutex<Vec<(String, String)>>,
    latency: Duration,
    reject_connect: bool,
    connects: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn not_found(entity: &str, id: &str) -> DirectoryError {
    DirectoryError::not_found(entity, id)
}

fn conflict(operation: &str, message: &str) -> DirectoryError {
    DirectoryError::Permanent {
        operation: operation.to_string(),
        status: Some(409),
        message: message.to_string(),
    }
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command sleeps for `latency` before it is applied
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every `connect` is refused
    pub fn rejecting_connections(mut self) -> Self {
        self.reject_connect = true;
        self
    }

    pub fn seed_user(&self, upn: &str, display_name: &str) -> DirectoryUser {
        let mut state = self.state.lock();
        let id = state.next_id("user");
        let user = DirectoryUser {
            id,
            user_principal_name: upn.to_lowercase(),
            display_name: Some(display_name.to_string()),
            given_name: None,
            surname: None,
            mail: Some(upn.to_lowercase()),
            department: None,
            job_title: None,
            account_enabled: Some(true),
        };
        state.users.insert(upn.to_lowercase(), user.clone());
        user
    }

    pub fn seed_team(&self, team_id: &str, display_name: &str) -> Team {
        let team = Team {
            id: team_id.to_string(),
            display_name: Some(display_name.to_string()),
            description: None,
            is_archived: Some(false),
            visibility: Some("private".to_string()),
        };
        let mut state = self.state.lock();
        state.teams.insert(team_id.to_string(), team.clone());
        state.members.entry(team_id.to_string()).or_default();
        team
    }

    pub fn seed_member(&self, team_id: &str, upn: &str, role: MemberRole) {
        let mut state = self.state.lock();
        let id = state.next_id("member");
        let user_id = state.users.get(&upn.to_lowercase()).map(|u| u.id.clone());
        state
            .members
            .entry(team_id.to_string())
            .or_default()
            .push(TeamMember {
                id,
                display_name: None,
                user_id,
                email: Some(upn.to_lowercase()),
                roles: role.graph_roles().into_iter().map(str::to_string).collect(),
            });
    }

    pub fn seed_sku(&self, sku_id: &str, part_number: &str) {
        self.state.lock().catalog.push(LicenseSku {
            sku_id: sku_id.to_string(),
            sku_part_number: Some(part_number.to_string()),
            consumed_units: 0,
        });
    }

    pub fn seed_license(&self, upn: &str, sku_id: &str) {
        self.state
            .lock()
            .user_licenses
            .entry(upn.to_lowercase())
            .or_default()
            .push(sku_id.to_string());
    }

    /// Fail the next `times` matching calls with `error`
    pub fn fail_times(
        &self,
        operation: &str,
        target: Option<&str>,
        error: DirectoryError,
        times: u32,
    ) {
        self.failures.lock().push(FailureRule {
            operation: operation.to_string(),
            target: target.map(str::to_lowercase),
            error,
            remaining: Some(times),
        });
    }

    /// Fail every matching call with `error`
    pub fn fail_always(&self, operation: &str, target: Option<&str>, error: DirectoryError) {
        self.failures.lock().push(FailureRule {
            operation: operation.to_string(),
            target: target.map(str::to_lowercase),
            error,
            remaining: None,
        });
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// `(operation, target)` of every executed command, in order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| op == operation)
            .count()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| {
                !(op.starts_with("get_") || op.starts_with("list_"))
            })
            .count()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Peak number of concurrently executing commands
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn user(&self, upn: &str) -> Option<DirectoryUser> {
        self.state.lock().users.get(&upn.to_lowercase()).cloned()
    }

    pub fn team(&self, team_id: &str) -> Option<Team> {
        self.state.lock().teams.get(team_id).cloned()
    }

    pub fn members(&self, team_id: &str) -> Vec<TeamMember> {
        self.state
            .lock()
            .members
            .get(team_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn licenses_of(&self, upn: &str) -> Vec<String> {
        self.state
            .lock()
            .user_licenses
            .get(&upn.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    fn scripted_failure(&self, command: &DirectoryCommand) -> Option<DirectoryError> {
        let operation = command.operation_name();
        let target = command.target().1.to_lowercase();
        let mut failures = self.failures.lock();

        let index = failures.iter().position(|rule| {
            rule.operation == operation
                && rule.target.as_ref().map_or(true, |t| *t == target)
                && rule.remaining != Some(0)
        })?;

        let rule = &mut failures[index];
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.error.clone())
    }

    fn apply(&self, command: &DirectoryCommand) -> DirectoryResult<Value> {
        let operation = command.operation_name();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match command {
            DirectoryCommand::GetUser { upn } => state
                .users
                .get(&upn.to_lowercase())
                .map(|user| json!(user))
                .ok_or_else(|| not_found("user", upn)),
            DirectoryCommand::CreateUser(new_user) => {
                let upn = new_user.user_principal_name.to_lowercase();
                if state.users.contains_key(&upn) {
                    return Err(conflict(operation, "Another object with the same value for property userPrincipalName already exists."));
                }
                let id = state.next_id("user");
                let user = DirectoryUser {
                    id,
                    user_principal_name: upn.clone(),
                    display_name: Some(new_user.display_name.clone()),
                    given_name: new_user.given_name.clone(),
                    surname: new_user.surname.clone(),
                    mail: Some(upn.clone()),
                    department: new_user.department.clone(),
                    job_title: new_user.job_title.clone(),
                    account_enabled: Some(true),
                };
                state.users.insert(upn, user.clone());
                Ok(json!(user))
            }
            DirectoryCommand::UpdateUser { upn, patch } => {
                let user = state
                    .users
                    .get_mut(&upn.to_lowercase())
                    .ok_or_else(|| not_found("user", upn))?;
                if let Some(value) = &patch.display_name {
                    user.display_name = Some(value.clone());
                }
                if let Some(value) = &patch.given_name {
                    user.given_name = Some(value.clone());
                }
                if let Some(value) = &patch.surname {
                    user.surname = Some(value.clone());
                }
                if let Some(value) = &patch.department {
                    user.department = Some(value.clone());
                }
                if let Some(value) = &patch.job_title {
                    user.job_title = Some(value.clone());
                }
                Ok(Value::Null)
            }
            DirectoryCommand::SetAccountEnabled { upn, enabled } => {
                let user = state
                    .users
                    .get_mut(&upn.to_lowercase())
                    .ok_or_else(|| not_found("user", upn))?;
                user.account_enabled = Some(*enabled);
                Ok(Value::Null)
            }
            DirectoryCommand::ListUserTeams { upn } => {
                if !state.users.contains_key(&upn.to_lowercase()) {
                    return Err(not_found("user", upn));
                }
                let teams: Vec<&Team> = state
                    .members
                    .iter()
                    .filter(|(_, members)| members.iter().any(|m| m.matches_upn(upn)))
                    .filter_map(|(team_id, _)| state.teams.get(team_id))
                    .collect();
                Ok(json!({ "value": teams }))
            }
            DirectoryCommand::GetTeam { team_id } => state
                .teams
                .get(team_id)
                .map(|team| json!(team))
                .ok_or_else(|| not_found("team", team_id)),
            DirectoryCommand::CreateTeam(new_team) => {
                let owner = new_team.owner_upn.to_lowercase();
                let owner_id = state
                    .users
                    .get(&owner)
                    .map(|u| u.id.clone())
                    .ok_or_else(|| DirectoryError::Permanent {
                        operation: operation.to_string(),
                        status: Some(400),
                        message: format!("owner '{owner}' does not exist"),
                    })?;
                let team_id = state.next_id("team");
                let member_id = state.next_id("member");
                state.teams.insert(
                    team_id.clone(),
                    Team {
                        id: team_id.clone(),
                        display_name: Some(new_team.display_name.clone()),
                        description: new_team.description.clone(),
                        is_archived: Some(false),
                        visibility: Some("private".to_string()),
                    },
                );
                state.members.insert(
                    team_id.clone(),
                    vec![TeamMember {
                        id: member_id,
                        display_name: None,
                        user_id: Some(owner_id),
                        email: Some(owner),
                        roles: vec!["owner".to_string()],
                    }],
                );
                Ok(json!({ "id": team_id }))
            }
            DirectoryCommand::ArchiveTeam { team_id, .. }
            | DirectoryCommand::UnarchiveTeam { team_id } => {
                let archive = matches!(command, DirectoryCommand::ArchiveTeam { .. });
                let team = state
                    .teams
                    .get_mut(team_id)
                    .ok_or_else(|| not_found("team", team_id))?;
                team.is_archived = Some(archive);
                Ok(Value::Null)
            }
            DirectoryCommand::RenameTeam {
                team_id,
                display_name,
            } => {
                let team = state
                    .teams
                    .get_mut(team_id)
                    .ok_or_else(|| not_found("team", team_id))?;
                team.display_name = Some(display_name.clone());
                Ok(Value::Null)
            }
            DirectoryCommand::ListMembers { team_id } => {
                if !state.teams.contains_key(team_id) {
                    return Err(not_found("team", team_id));
                }
                let members = state.members.get(team_id).cloned().unwrap_or_default();
                Ok(json!({ "value": members }))
            }
            DirectoryCommand::AddMember { team_id, upn, role } => {
                if !state.teams.contains_key(team_id) {
                    return Err(not_found("team", team_id));
                }
                let user_id = state
                    .users
                    .get(&upn.to_lowercase())
                    .map(|u| u.id.clone())
                    .ok_or_else(|| not_found("user", upn))?;
                let member_id = state.next_id("member");
                let members = state.members.entry(team_id.clone()).or_default();
                if members.iter().any(|m| m.matches_upn(upn)) {
                    return Err(conflict(operation, "member already exists"));
                }
                let member = TeamMember {
                    id: member_id,
                    display_name: None,
                    user_id: Some(user_id),
                    email: Some(upn.to_lowercase()),
                    roles: role.graph_roles().into_iter().map(str::to_string).collect(),
                };
                members.push(member.clone());
                Ok(json!(member))
            }
            DirectoryCommand::RemoveMember {
                team_id,
                membership_id,
            } => {
                let members = state
                    .members
                    .get_mut(team_id)
                    .ok_or_else(|| not_found("team", team_id))?;
                let before = members.len();
                members.retain(|m| m.id != *membership_id);
                if members.len() == before {
                    return Err(not_found("membership", membership_id));
                }
                Ok(Value::Null)
            }
            DirectoryCommand::SetMemberRole {
                team_id,
                membership_id,
                role,
            } => {
                let member = state
                    .members
                    .get_mut(team_id)
                    .and_then(|members| members.iter_mut().find(|m| m.id == *membership_id))
                    .ok_or_else(|| not_found("membership", membership_id))?;
                member.roles = role.graph_roles().into_iter().map(str::to_string).collect();
                Ok(json!(member))
            }
            DirectoryCommand::ListLicenseCatalog => Ok(json!({ "value": state.catalog })),
            DirectoryCommand::ListUserLicenses { upn } => {
                if !state.users.contains_key(&upn.to_lowercase()) {
                    return Err(not_found("user", upn));
                }
                let assigned = state
                    .user_licenses
                    .get(&upn.to_lowercase())
                    .cloned()
                    .unwrap_or_default();
                let details: Vec<Value> = assigned
                    .iter()
                    .map(|sku_id| {
                        let part = state
                            .catalog
                            .iter()
                            .find(|sku| sku.sku_id == *sku_id)
                            .and_then(|sku| sku.sku_part_number.clone());
                        json!({ "skuId": sku_id, "skuPartNumber": part })
                    })
                    .collect();
                Ok(json!({ "value": details }))
            }
            DirectoryCommand::AssignLicense { upn, sku_id }
            | DirectoryCommand::RemoveLicense { upn, sku_id } => {
                let assign = matches!(command, DirectoryCommand::AssignLicense { .. });
                let key = upn.to_lowercase();
                if !state.users.contains_key(&key) {
                    return Err(not_found("user", upn));
                }
                let Some(sku) = state.catalog.iter_mut().find(|sku| sku.sku_id == *sku_id) else {
                    return Err(DirectoryError::Permanent {
                        operation: operation.to_string(),
                        status: Some(400),
                        message: format!("License {sku_id} does not correspond to a valid company License."),
                    });
                };

                let assigned = state.user_licenses.entry(key).or_default();
                let present = assigned.iter().any(|s| s == sku_id);
                if assign && !present {
                    assigned.push(sku_id.clone());
                    sku.consumed_units += 1;
                } else if !assign && present {
                    assigned.retain(|s| s != sku_id);
                    sku.consumed_units -= 1;
                }
                Ok(Value::Null)
            }
        }
    }
}

#[async_trait]
impl DirectoryTransport for InMemoryDirectory {
    async fn connect(&self, _token: &AccessToken) -> DirectoryResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.reject_connect {
            return Err(DirectoryError::Permanent {
                operation: "connect".to_string(),
                status: Some(401),
                message: "token rejected".to_string(),
            });
        }
        Ok(())
    }

    async fn execute(&self, command: &DirectoryCommand) -> DirectoryResult<Value> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.calls.lock().push((
            command.operation_name().to_string(),
            command.target().1.to_string(),
        ));

        if let Some(error) = self.scripted_failure(command) {
            return Err(error);
        }
        self.apply(command)
    }

    async fn disconnect(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewUser;

    #[tokio::test]
    async fn test_create_then_conflict() {
        let directory = InMemoryDirectory::new();
        let command = DirectoryCommand::CreateUser(NewUser {
            user_principal_name: "Ada@School.edu".into(),
            display_name: "Ada".into(),
            ..Default::default()
        });

        let created = directory.execute(&command).await.unwrap();
        assert_eq!(created["userPrincipalName"], "ada@school.edu");

        let err = directory.execute(&command).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed() {
        let directory = InMemoryDirectory::new();
        directory.seed_user("ada@school.edu", "Ada");
        directory.fail_times(
            "get_user",
            Some("ADA@school.edu"),
            DirectoryError::transient("get_user", "503"),
            2,
        );
        let command = DirectoryCommand::GetUser {
            upn: "ada@school.edu".into(),
        };

        assert!(directory.execute(&command).await.is_err());
        assert!(directory.execute(&command).await.is_err());
        assert!(directory.execute(&command).await.is_ok());
        assert_eq!(directory.call_count("get_user"), 3);
    }

    #[tokio::test]
    async fn test_membership_lifecycle() {
        let directory = InMemoryDirectory::new();
        directory.seed_user("ada@school.edu", "Ada");
        directory.seed_team("t-1", "7B Science");

        let added = directory
            .execute(&DirectoryCommand::AddMember {
                team_id: "t-1".into(),
                upn: "ada@school.edu".into(),
                role: MemberRole::Member,
            })
            .await
            .unwrap();
        let membership_id = added["id"].as_str().unwrap().to_string();

        let teams = directory
            .execute(&DirectoryCommand::ListUserTeams {
                upn: "ada@school.edu".into(),
            })
            .await
            .unwrap();
        assert_eq!(teams["value"][0]["id"], "t-1");

        directory
            .execute(&DirectoryCommand::RemoveMember {
                team_id: "t-1".into(),
                membership_id,
            })
            .await
            .unwrap();
        assert!(directory.members("t-1").is_empty());
    }

    #[tokio::test]
    async fn test_license_assignment_tracks_units() {
        let directory = InMemoryDirectory::new();
        directory.seed_user("ada@school.edu", "Ada");
        directory.seed_sku("sku-a1", "STANDARDWOFFPACK_STUDENT");

        let assign = DirectoryCommand::AssignLicense {
            upn: "ada@school.edu".into(),
            sku_id: "sku-a1".into(),
        };
        directory.execute(&assign).await.unwrap();
        directory.execute(&assign).await.unwrap();
        assert_eq!(directory.licenses_of("ada@school.edu"), vec!["sku-a1"]);

        let bad = DirectoryCommand::AssignLicense {
            upn: "ada@school.edu".into(),
            sku_id: "sku-zz".into(),
        };
        assert!(!directory.execute(&bad).await.unwrap_err().is_transient());
    }
}
