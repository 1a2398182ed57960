//! # Microsoft Graph Transport
//!
//! [`DirectoryTransport`] over the Graph REST API. Command-to-request mapping
//! and status classification are pure functions so they can be tested without
//! a network.

use async_trait::async_trait;
use parking_lot::RwLock;
use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{AccessToken, DirectoryCommand, DirectoryTransport};
use crate::config::SessionConfig;
use crate::error::{DirectoryError, DirectoryResult};

const CONVERSATION_MEMBER_TYPE: &str = "#microsoft.graph.aadUserConversationMember";

/// Escaped inside one path segment; `@` stays literal so UPN paths read naturally
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'@');

/// One URL path segment
fn segment(value: &str) -> PercentEncode<'_> {
    utf8_percent_encode(value, PATH_SEGMENT)
}

/// OData string key: quotes doubled, then encoded as a path segment
fn odata_key(value: &str) -> String {
    segment(&value.replace('\'', "''")).to_string()
}

/// One HTTP request derived from a [`DirectoryCommand`]
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl GraphRequest {
    fn get(path: String) -> Self {
        Self {
            method: Method::GET,
            path,
            body: None,
        }
    }

    fn with_body(method: Method, path: String, body: Value) -> Self {
        Self {
            method,
            path,
            body: Some(body),
        }
    }
}

/// Map a command to its Graph request relative to `base_url`
pub fn build_request(command: &DirectoryCommand, base_url: &str) -> GraphRequest {
    let user_bind = |upn: &str| format!("{base_url}/users('{}')", odata_key(upn));

    match command {
        DirectoryCommand::GetUser { upn } => GraphRequest::get(format!(
            "/users/{}?$select=id,userPrincipalName,displayName,givenName,surname,mail,department,jobTitle,accountEnabled",
            segment(upn)
        )),
        DirectoryCommand::CreateUser(user) => {
            let nickname = user
                .mail_nickname
                .clone()
                .unwrap_or_else(|| crate::validation::derive_mail_nickname(&user.user_principal_name));
            let mut body = json!({
                "accountEnabled": true,
                "displayName": user.display_name,
                "mailNickname": nickname,
                "userPrincipalName": user.user_principal_name,
            });
            if let Some(map) = body.as_object_mut() {
                let optional = [
                    ("givenName", &user.given_name),
                    ("surname", &user.surname),
                    ("department", &user.department),
                    ("jobTitle", &user.job_title),
                    ("usageLocation", &user.usage_location),
                ];
                for (field, value) in optional {
                    if let Some(value) = value {
                        map.insert(field.to_string(), json!(value));
                    }
                }
                if let Some(password) = &user.initial_password {
                    map.insert(
                        "passwordProfile".to_string(),
                        json!({
                            "forceChangePasswordNextSignIn": true,
                            "password": password,
                        }),
                    );
                }
            }
            GraphRequest::with_body(Method::POST, "/users".to_string(), body)
        }
        DirectoryCommand::UpdateUser { upn, patch } => GraphRequest::with_body(
            Method::PATCH,
            format!("/users/{}", segment(upn)),
            serde_json::to_value(patch).unwrap_or_else(|_| json!({})),
        ),
        DirectoryCommand::SetAccountEnabled { upn, enabled } => GraphRequest::with_body(
            Method::PATCH,
            format!("/users/{}", segment(upn)),
            json!({ "accountEnabled": enabled }),
        ),
        DirectoryCommand::ListUserTeams { upn } => {
            GraphRequest::get(format!("/users/{}/joinedTeams", segment(upn)))
        }
        DirectoryCommand::GetTeam { team_id } => GraphRequest::get(format!("/teams/{}", segment(team_id))),
        DirectoryCommand::CreateTeam(team) => GraphRequest::with_body(
            Method::POST,
            "/teams".to_string(),
            json!({
                "template@odata.bind": format!("{base_url}/teamsTemplates('{}')", odata_key(&team.template)),
                "displayName": team.display_name,
                "description": team.description.clone().unwrap_or_default(),
                "members": [{
                    "@odata.type": CONVERSATION_MEMBER_TYPE,
                    "roles": ["owner"],
                    "user@odata.bind": user_bind(&team.owner_upn),
                }],
            }),
        ),
        DirectoryCommand::ArchiveTeam {
            team_id,
            set_site_read_only,
        } => GraphRequest::with_body(
            Method::POST,
            format!("/teams/{}/archive", segment(team_id)),
            json!({ "shouldSetSpoSiteReadOnlyForMembers": set_site_read_only }),
        ),
        DirectoryCommand::UnarchiveTeam { team_id } => GraphRequest::with_body(
            Method::POST,
            format!("/teams/{}/unarchive", segment(team_id)),
            json!({}),
        ),
        DirectoryCommand::RenameTeam {
            team_id,
            display_name,
        } => GraphRequest::with_body(
            Method::PATCH,
            format!("/teams/{}", segment(team_id)),
            json!({ "displayName": display_name }),
        ),
        DirectoryCommand::ListMembers { team_id } => {
            GraphRequest::get(format!("/teams/{}/members", segment(team_id)))
        }
        DirectoryCommand::AddMember { team_id, upn, role } => GraphRequest::with_body(
            Method::POST,
            format!("/teams/{}/members", segment(team_id)),
            json!({
                "@odata.type": CONVERSATION_MEMBER_TYPE,
                "roles": role.graph_roles(),
                "user@odata.bind": user_bind(upn),
            }),
        ),
        DirectoryCommand::RemoveMember {
            team_id,
            membership_id,
        } => GraphRequest {
            method: Method::DELETE,
            path: format!("/teams/{}/members/{}", segment(team_id), segment(membership_id)),
            body: None,
        },
        DirectoryCommand::SetMemberRole {
            team_id,
            membership_id,
            role,
        } => GraphRequest::with_body(
            Method::PATCH,
            format!("/teams/{}/members/{}", segment(team_id), segment(membership_id)),
            json!({
                "@odata.type": CONVERSATION_MEMBER_TYPE,
                "roles": role.graph_roles(),
            }),
        ),
        DirectoryCommand::ListLicenseCatalog => GraphRequest::get("/subscribedSkus".to_string()),
        DirectoryCommand::ListUserLicenses { upn } => {
            GraphRequest::get(format!("/users/{}/licenseDetails", segment(upn)))
        }
        DirectoryCommand::AssignLicense { upn, sku_id } => GraphRequest::with_body(
            Method::POST,
            format!("/users/{}/assignLicense", segment(upn)),
            json!({
                "addLicenses": [{ "skuId": sku_id, "disabledPlans": [] }],
                "removeLicenses": [],
            }),
        ),
        DirectoryCommand::RemoveLicense { upn, sku_id } => GraphRequest::with_body(
            Method::POST,
            format!("/users/{}/assignLicense", segment(upn)),
            json!({
                "addLicenses": [],
                "removeLicenses": [sku_id],
            }),
        ),
    }
}

/// Classify a non-success HTTP status into the directory error taxonomy
pub fn classify_status(
    command: &DirectoryCommand,
    status: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> DirectoryError {
    let operation = command.operation_name().to_string();
    let message = graph_error_message(body).unwrap_or_else(|| format!("HTTP {status}"));

    match status {
        404 => {
            let (entity, id) = command.target();
            DirectoryError::not_found(entity, id)
        }
        408 | 429 | 500..=599 => DirectoryError::Transient {
            operation,
            status: Some(status),
            retry_after,
            message,
        },
        _ => DirectoryError::Permanent {
            operation,
            status: Some(status),
            message,
        },
    }
}

/// Seconds-form `Retry-After` header value
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn graph_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    let error = parsed.get("error")?;
    let code = error.get("code").and_then(Value::as_str).unwrap_or("unknown");
    let message = error.get("message").and_then(Value::as_str).unwrap_or("");
    Some(format!("{code}: {message}"))
}

/// Extract the new team id from a `Content-Location: /teams('{id}')` header
fn team_id_from_location(location: &str) -> Option<String> {
    let start = location.find("teams('")? + "teams('".len();
    let end = location[start..].find('\'')? + start;
    Some(location[start..end].to_string())
}

/// Graph REST implementation of [`DirectoryTransport`]
#[derive(Debug)]
pub struct GraphTransport {
    base_url: String,
    user_agent: String,
    client: RwLock<Option<reqwest::Client>>,
}

impl GraphTransport {
    pub fn new(base_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
            client: RwLock::new(None),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.graph_base_url, &config.user_agent)
    }

    fn live_client(&self, operation: &str) -> DirectoryResult<reqwest::Client> {
        self.client.read().clone().ok_or_else(|| {
            DirectoryError::ConnectionNotReady(format!("transport not connected for {operation}"))
        })
    }
}

#[async_trait]
impl DirectoryTransport for GraphTransport {
    async fn connect(&self, token: &AccessToken) -> DirectoryResult<()> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| DirectoryError::validation("access_token", "contains invalid characters"))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(|e| DirectoryError::ConnectionNotReady(e.to_string()))?;

        *self.client.write() = Some(client);
        Ok(())
    }

    async fn execute(&self, command: &DirectoryCommand) -> DirectoryResult<Value> {
        let operation = command.operation_name();
        let client = self.live_client(operation)?;
        let request = build_request(command, &self.base_url);
        let url = format!("{}{}", self.base_url, request.path);

        debug!(operation = operation, method = %request.method, path = %request.path, "Graph request");

        let mut builder = client.request(request.method.clone(), &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() || e.is_request() {
                DirectoryError::transient(operation, e.to_string())
            } else {
                DirectoryError::permanent(operation, e.to_string())
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let location = response
            .headers()
            .get("content-location")
            .or_else(|| response.headers().get("location"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response
            .text()
            .await
            .map_err(|e| DirectoryError::transient(operation, e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(command, status.as_u16(), retry_after, &text));
        }

        if text.trim().is_empty() || status == StatusCode::NO_CONTENT {
            let id = location.as_deref().and_then(team_id_from_location);
            return Ok(match id {
                Some(id) => json!({ "id": id }),
                None => Value::Null,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    async fn disconnect(&self) {
        *self.client.write() = None;
    }
}
