use std::time::Duration;

/// Tunables for the relay components.
///
/// Built by the composition root from the loaded configuration; every field
/// has the default the service ships with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// First path segment of every webhook URL (`/<prefix>/<target>_<id>`).
    pub path_prefix: String,
    /// How long a dedup key suppresses repeated deliveries.
    pub dedup_ttl: Duration,
    /// How long history records are kept.
    pub history_ttl: Duration,
    /// Minimum gap between two failure notifications for the same route.
    pub error_ratelimit: Duration,
    /// Cap on history records per (target, repository).
    pub max_history_records: usize,
}

impl RelaySettings {
    pub const DEFAULT_PATH_PREFIX: &'static str = "github-webhook";
    pub const DEFAULT_DEDUP_TTL_SECS: u64 = 60 * 60;
    pub const DEFAULT_HISTORY_TTL_DAYS: u64 = 7;
    pub const DEFAULT_ERROR_RATELIMIT_SECS: u64 = 5 * 60;
    pub const DEFAULT_MAX_HISTORY_RECORDS: usize = 100;
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            path_prefix: Self::DEFAULT_PATH_PREFIX.to_string(),
            dedup_ttl: Duration::from_secs(Self::DEFAULT_DEDUP_TTL_SECS),
            history_ttl: Duration::from_secs(Self::DEFAULT_HISTORY_TTL_DAYS * 24 * 60 * 60),
            error_ratelimit: Duration::from_secs(Self::DEFAULT_ERROR_RATELIMIT_SECS),
            max_history_records: Self::DEFAULT_MAX_HISTORY_RECORDS,
        }
    }
}

/// Converts a duration to whole seconds for comparison with timestamps.
pub(crate) fn whole_seconds(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}
