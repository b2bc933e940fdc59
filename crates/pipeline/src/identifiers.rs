//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive, so a [`TargetId`] cannot be passed where a [`RouteId`]
//! is expected even though both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Generated identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Short random token identifying one webhook subscription.
    ///
    /// Unique within the route registry; combined with the [`TargetId`] to form
    /// the webhook path.
    RouteId
}

impl RouteId {
    /// Number of hex characters taken from a v4 UUID for a fresh identifier.
    pub const LENGTH: usize = 8;

    /// Generates a fresh random identifier.
    ///
    /// Uniqueness is not guaranteed; the registry checks for collisions.
    pub fn random() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..Self::LENGTH].to_string())
    }
}

// ---------------------------------------------------------------------------
// Messaging targets
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies the group or user that receives notifications for a route.
    TargetId
}

string_id! {
    /// Opaque name of the outbound messaging platform (e.g. `"telegram"`).
    PlatformName
}

string_id! {
    /// The `<targetId>_<routeId>` pair that names one route.
    ///
    /// Used as the last path segment of the webhook URL and as the key for
    /// per-route error rate limiting.
    RouteKey
}

impl RouteKey {
    /// Builds the key for a target/route pair.
    pub fn from_parts(target: &TargetId, route: &RouteId) -> Self {
        Self(format!("{target}_{route}"))
    }
}

string_id! {
    /// Absolute HTTP path a route is served on (e.g. `/github-webhook/42_1a2b3c4d`).
    WebhookPath
}

impl WebhookPath {
    /// Builds the path for a route under the given prefix.
    ///
    /// Leading and trailing slashes on `prefix` are ignored.
    pub fn for_route(prefix: &str, key: &RouteKey) -> Self {
        Self(format!("/{}/{}", prefix.trim_matches('/'), key))
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

string_id! {
    /// A GitHub webhook event type as sent in `X-GitHub-Event`
    /// (e.g. `"push"`, `"pull_request"`).
    EventType
}

impl EventType {
    /// Subscription tags accepted when creating a route.
    pub const SUBSCRIBABLE: &'static [&'static str] = &[
        "push",
        "issues",
        "pull_request",
        "release",
        "star",
        "fork",
        "workflow_run",
    ];

    /// Parses a user-supplied subscription tag.
    ///
    /// Input is trimmed and lower-cased; `pr` is accepted as an alias for
    /// `pull_request`. Returns `None` for tags outside [`Self::SUBSCRIBABLE`].
    pub fn parse_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        let tag = if tag == "pr" { "pull_request".to_string() } else { tag };
        Self::SUBSCRIBABLE
            .contains(&tag.as_str())
            .then_some(Self(tag))
    }
}

string_id! {
    /// Content-derived key identifying one logical GitHub event.
    ///
    /// Two deliveries producing the same key are collapsed into one notification.
    DedupKey
}

// ---------------------------------------------------------------------------

/// A GitHub repository in `"owner/name"` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Parses `"owner/name"`, returning `None` unless both halves are non-empty
    /// and there is exactly one slash.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (owner, name) = value.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// Returns the repository as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RepositoryName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid repository name '{value}'"))
    }
}

impl From<RepositoryName> for String {
    fn from(value: RepositoryName) -> Self {
        value.0
    }
}

impl std::fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
