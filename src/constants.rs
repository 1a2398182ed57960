//! # System Constants
//!
//! Names shared across the session, cache, resilience and orchestration
//! layers: operation types, downstream identifiers, event names and cache
//! key prefixes.

/// Bulk operation types recorded in history and progress events
pub mod operation_types {
    pub const BULK_ONBOARDING: &str = "bulk_onboarding";
    pub const BULK_OFFBOARDING: &str = "bulk_offboarding";
    pub const BULK_ROLE_CHANGE: &str = "bulk_role_change";
    pub const BULK_TEAM_MEMBERSHIP: &str = "bulk_team_membership";
    pub const BULK_TEAM_ARCHIVAL: &str = "bulk_team_archival";

    pub const ALL: [&str; 5] = [
        BULK_ONBOARDING,
        BULK_OFFBOARDING,
        BULK_ROLE_CHANGE,
        BULK_TEAM_MEMBERSHIP,
        BULK_TEAM_ARCHIVAL,
    ];
}

/// Logical downstreams guarded by their own circuit breaker
pub mod downstreams {
    /// Microsoft Graph directory calls
    pub const DIRECTORY: &str = "directory";
    /// Notification and history sinks
    pub const EXTERNAL: &str = "external";
}

/// Progress and lifecycle event names
pub mod events {
    pub const BULK_STARTED: &str = "bulk.started";
    pub const BATCH_COMPLETED: &str = "bulk.batch_completed";
    pub const BULK_FINISHED: &str = "bulk.finished";
    pub const BULK_CANCELLED: &str = "bulk.cancelled";
    pub const BULK_TIMED_OUT: &str = "bulk.timed_out";
    pub const BULK_EARLY_TERMINATION: &str = "bulk.early_termination";
    pub const CIRCUIT_OPENED: &str = "circuit.opened";
    pub const CIRCUIT_CLOSED: &str = "circuit.closed";
    pub const SESSION_CONNECTED: &str = "session.connected";
    pub const SESSION_DISCONNECTED: &str = "session.disconnected";
}

/// Cache key prefixes
pub mod cache_keys {
    pub const USER: &str = "user";
    pub const TEAM: &str = "team";
    pub const TEAMS_SUFFIX: &str = "teams";
    pub const MEMBERS_SUFFIX: &str = "members";
    pub const LICENSES_SUFFIX: &str = "licenses";
    pub const LICENSE_CATALOG: &str = "licenses:catalog";
}
