use serde::{Deserialize, Serialize};

/// Hub timing and channel bounds, env-loaded with fixed defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// How long a session may sit in `Requested` or `Accepted` before
    /// it is cancelled with `window_expired`.
    pub acceptance_window_secs: u64,
    /// Grace period after a session turns terminal: in-flight
    /// recognition may drain for this long, and the session stays in
    /// the registry for late final segments before removal.
    pub end_grace_secs: u64,
    /// Capacity of each participant's outbound message queue.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            acceptance_window_secs: 120,
            end_grace_secs: 2,
            channel_capacity: 64,
        }
    }
}

impl HubConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            acceptance_window_secs: env_parse(
                "HUB_ACCEPTANCE_WINDOW_SECS",
                defaults.acceptance_window_secs,
            ),
            end_grace_secs: env_parse("HUB_END_GRACE_SECS", defaults.end_grace_secs),
            channel_capacity: env_parse("HUB_CHANNEL_CAPACITY", defaults.channel_capacity),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
