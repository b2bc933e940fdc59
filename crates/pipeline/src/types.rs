//! Shared value types for the webhook relay domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (a route's path is derived from its
//! identity, a history record belongs to exactly one scope) and participate in
//! domain computations.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{EventType, PlatformName, RepositoryName, RouteId, RouteKey, TargetId, WebhookPath};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Creates a [`Timestamp`] from whole seconds since the Unix epoch.
    ///
    /// Returns `None` if the value is outside the representable range.
    pub fn from_unix_seconds(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Self)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Whole seconds since the Unix epoch.
    pub fn unix_seconds(self) -> i64 {
        self.0.timestamp()
    }

    /// Whole seconds elapsed from `earlier` to `self` (negative if `earlier`
    /// is in the future).
    pub fn seconds_since(self, earlier: Timestamp) -> i64 {
        (self.0 - earlier.0).num_seconds()
    }

    /// Returns this timestamp shifted by `secs` seconds (saturating at the
    /// representable range).
    pub fn plus_seconds(self, secs: i64) -> Self {
        self.0
            .checked_add_signed(chrono::Duration::seconds(secs))
            .map(Self)
            .unwrap_or(self)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

// ---------------------------------------------------------------------------
// Route configuration
// ---------------------------------------------------------------------------

/// Kind of messaging target a route notifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// A group chat / channel.
    Group,
    /// A direct conversation with a single user.
    User,
}

impl TargetType {
    /// Returns the wire name (`"group"` or `"user"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------

/// One webhook subscription: which repository's events go to which target.
///
/// Persisted as an element of the route configuration list. Disabled routes
/// stay in storage but are never registered as live routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Unique route identifier.
    pub id: RouteId,

    /// Group or user receiving notifications.
    pub target_id: TargetId,

    /// Whether [`Self::target_id`] names a group or a user.
    pub target_type: TargetType,

    /// Outbound messaging platform the target lives on.
    pub platform: PlatformName,

    /// Repository whose events are forwarded.
    pub repository: RepositoryName,

    /// Event types forwarded for this route; anything else is ignored.
    pub subscribed_events: BTreeSet<EventType>,

    /// Shared secret for `X-Hub-Signature-256` verification.
    ///
    /// `None` disables signature checking for this route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Whether the route is served.
    pub enabled: bool,

    /// When the route was created.
    pub created_at: Timestamp,
}

impl RouteConfig {
    /// The `<targetId>_<id>` key naming this route.
    pub fn route_key(&self) -> RouteKey {
        RouteKey::from_parts(&self.target_id, &self.id)
    }

    /// The path this route is served on under `prefix`.
    pub fn path(&self, prefix: &str) -> WebhookPath {
        WebhookPath::for_route(prefix, &self.route_key())
    }

    /// Returns `true` if deliveries of `event_type` are forwarded.
    pub fn is_subscribed(&self, event_type: &EventType) -> bool {
        self.subscribed_events.contains(event_type)
    }

    /// The history bucket this route's deliveries are recorded under.
    pub fn history_scope(&self) -> HistoryScope {
        HistoryScope {
            target_id: self.target_id.clone(),
            repository: self.repository.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// The (target, repository) pair history records are bucketed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryScope {
    /// Target the deliveries were forwarded to.
    pub target_id: TargetId,
    /// Repository the deliveries came from.
    pub repository: RepositoryName,
}

impl std::fmt::Display for HistoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.target_id, self.repository)
    }
}

/// One received delivery, kept for the history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// GitHub event type of the delivery.
    pub event_type: EventType,

    /// When the delivery was recorded.
    pub timestamp: Timestamp,

    /// Parsed delivery body.
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// A text notification addressed to one messaging target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Platform that delivers the message.
    pub platform: PlatformName,
    /// Whether the target is a group or a user.
    pub target_type: TargetType,
    /// Recipient on the platform.
    pub target_id: TargetId,
    /// Plain-text body.
    pub text: String,
}

impl OutboundMessage {
    /// Addresses `text` to the target configured on `route`.
    pub fn for_route(route: &RouteConfig, text: impl Into<String>) -> Self {
        Self {
            platform: route.platform.clone(),
            target_type: route.target_type,
            target_id: route.target_id.clone(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> RouteConfig {
        RouteConfig {
            id: RouteId::new("1a2b3c4d").unwrap(),
            target_id: TargetId::new("team").unwrap(),
            target_type: TargetType::Group,
            platform: PlatformName::new("telegram").unwrap(),
            repository: RepositoryName::parse("octo/hello").unwrap(),
            subscribed_events: ["push", "issues"]
                .into_iter()
                .filter_map(EventType::new)
                .collect(),
            secret: None,
            enabled: true,
            created_at: Timestamp::from_unix_seconds(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn timestamp_arithmetic_in_seconds() {
        let t0 = Timestamp::from_unix_seconds(1_000).unwrap();
        let t1 = t0.plus_seconds(300);
        assert_eq!(t1.unix_seconds(), 1_300);
        assert_eq!(t1.seconds_since(t0), 300);
        assert_eq!(t0.seconds_since(t1), -300);
    }

    #[test]
    fn route_derives_key_path_and_scope() {
        let r = route();
        assert_eq!(r.route_key().as_str(), "team_1a2b3c4d");
        assert_eq!(r.path("github-webhook").as_str(), "/github-webhook/team_1a2b3c4d");
        assert_eq!(r.history_scope().to_string(), "team:octo/hello");
    }

    #[test]
    fn subscription_check_is_exact() {
        let r = route();
        assert!(r.is_subscribed(&EventType::new("push").unwrap()));
        assert!(!r.is_subscribed(&EventType::new("deployment").unwrap()));
    }

    #[test]
    fn route_config_omits_missing_secret_and_uses_snake_case() {
        let json = serde_json::to_value(route()).unwrap();
        assert!(json.get("secret").is_none());
        assert_eq!(json["target_type"], "group");
        assert_eq!(json["repository"], "octo/hello");

        let back: RouteConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, route());
    }
}
