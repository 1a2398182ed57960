//! # Session Manager
//!
//! Owns the single live session to the directory platform. All workers
//! multiplex their calls onto it through [`SessionManager::run`].
//!
//! ## Lifecycle
//!
//! - [`SessionManager::connect`] is serialized; concurrent callers presenting
//!   the same credential share one transport initialisation.
//! - A different credential or an expired session triggers a reconnect.
//!   Credentials are compared by a SHA-256 digest of the whole token; the
//!   short fingerprint is for logs only.
//! - Calls never reconnect implicitly; without a live session they fail fast
//!   with [`DirectoryError::ConnectionNotReady`].

pub mod command;
pub mod graph;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::events;
use crate::error::{DirectoryError, DirectoryResult};

pub use command::DirectoryCommand;
pub use graph::GraphTransport;
pub use memory::InMemoryDirectory;

/// Caller-supplied bearer token, forwarded on-behalf-of the initiating user
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Raw token for the transport's authorization header
    pub fn expose_secret(&self) -> &str {
        &self.secret
    }

    /// Identity used to decide whether a live session belongs to this token
    pub(crate) fn credential_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Loggable identity: length plus the last four characters
    pub fn fingerprint(&self) -> String {
        let tail: String = self
            .secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("len{}…{}", self.secret.chars().count(), tail)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("fingerprint", &self.fingerprint())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Wire-level seam between the session and the directory platform
#[async_trait]
pub trait DirectoryTransport: Send + Sync + fmt::Debug {
    /// Establish a live connection using `token`
    async fn connect(&self, token: &AccessToken) -> DirectoryResult<()>;

    /// Execute one command on the live connection
    async fn execute(&self, command: &DirectoryCommand) -> DirectoryResult<serde_json::Value>;

    /// Drop the live connection and any credential it holds
    async fn disconnect(&self);
}

#[derive(Debug, Clone)]
struct LiveSession {
    credential_digest: String,
    fingerprint: String,
    connected_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl LiveSession {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| at > Utc::now())
    }
}

/// Point-in-time session view for health checks
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub ready: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_fingerprint: Option<String>,
    pub connect_count: u64,
}

/// Owner of the single live directory session
#[derive(Debug)]
pub struct SessionManager {
    transport: Arc<dyn DirectoryTransport>,
    session: RwLock<Option<LiveSession>>,
    connect_lock: tokio::sync::Mutex<()>,
    connect_timeout: Duration,
    connect_count: AtomicU64,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn DirectoryTransport>, connect_timeout: Duration) -> Self {
        Self {
            transport,
            session: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            connect_timeout,
            connect_count: AtomicU64::new(0),
        }
    }

    /// Whether a live, unexpired session exists
    pub fn is_ready(&self) -> bool {
        self.session
            .read()
            .as_ref()
            .is_some_and(LiveSession::is_live)
    }

    /// Establish or refresh the session for `token`
    ///
    /// A no-op when the live session already belongs to the same credential.
    pub async fn connect(&self, token: &AccessToken) -> DirectoryResult<()> {
        if token.is_expired() {
            return Err(DirectoryError::ConnectionNotReady(
                "access token has expired".to_string(),
            ));
        }

        let fingerprint = token.fingerprint();
        let credential_digest = token.credential_digest();
        let _guard = self.connect_lock.lock().await;

        let reusable = self
            .session
            .read()
            .as_ref()
            .is_some_and(|live| live.is_live() && live.credential_digest == credential_digest);
        if reusable {
            debug!(fingerprint = %fingerprint, "Reusing live directory session");
            return Ok(());
        }

        match tokio::time::timeout(self.connect_timeout, self.transport.connect(token)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(fingerprint = %fingerprint, error = %error, "Directory connect failed");
                *self.session.write() = None;
                return Err(match error {
                    DirectoryError::ConnectionNotReady(_) => error,
                    other => DirectoryError::ConnectionNotReady(other.to_string()),
                });
            }
            Err(_) => {
                *self.session.write() = None;
                return Err(DirectoryError::ConnectionNotReady(format!(
                    "connect timed out after {:?}",
                    self.connect_timeout
                )));
            }
        }

        let live = LiveSession {
            credential_digest,
            fingerprint: fingerprint.clone(),
            connected_at: Utc::now(),
            expires_at: token.expires_at(),
        };
        *self.session.write() = Some(live);
        let count = self.connect_count.fetch_add(1, Ordering::Relaxed) + 1;

        info!(
            event = events::SESSION_CONNECTED,
            fingerprint = %fingerprint,
            connect_count = count,
            "Directory session established"
        );
        Ok(())
    }

    /// Execute `command` on the live session
    pub async fn run(&self, command: &DirectoryCommand) -> DirectoryResult<serde_json::Value> {
        if !self.is_ready() {
            return Err(DirectoryError::ConnectionNotReady(format!(
                "no live session for {}",
                command.operation_name()
            )));
        }
        self.transport.execute(command).await
    }

    /// Tear down the live session
    pub async fn disconnect(&self) {
        let _guard = self.connect_lock.lock().await;
        let previous = self.session.write().take();
        if previous.is_some() {
            self.transport.disconnect().await;
            info!(event = events::SESSION_DISCONNECTED, "Directory session closed");
        }
    }

    pub fn status(&self) -> SessionStatus {
        let session = self.session.read();
        SessionStatus {
            ready: session.as_ref().is_some_and(LiveSession::is_live),
            connected_at: session.as_ref().map(|s| s.connected_at),
            expires_at: session.as_ref().and_then(|s| s.expires_at),
            token_fingerprint: session.as_ref().map(|s| s.fingerprint.clone()),
            connect_count: self.connect_count.load(Ordering::Relaxed),
        }
    }
}
