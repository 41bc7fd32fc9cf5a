//! Rate Limit Configuration
//!
//! Limiter settings and the named action table. Call sites look limits up by
//! action name instead of hardcoding thresholds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::error::{RateLimitError, Result};

/// Default cap on tracked keys
pub const DEFAULT_MAX_KEYS: usize = 10_000;
/// Buckets idle for this many windows are swept
pub const DEFAULT_IDLE_TTL_WINDOWS: u32 = 10;
/// Seconds between background sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Permits per window for one named action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLimit {
    /// Permits per window
    pub limit: u32,

    /// Window length in milliseconds
    pub window_ms: u64,
}

impl ActionLimit {
    pub const fn new(limit: u32, window_ms: u64) -> Self {
        Self { limit, window_ms }
    }

    /// Window as a `Duration`
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject entries the limiter would treat degenerately
    pub fn validate(&self, action: &str) -> Result<()> {
        if self.limit == 0 {
            return Err(RateLimitError::InvalidActionLimit {
                action: action.to_string(),
                reason: "limit must be > 0".to_string(),
            });
        }
        if self.window_ms == 0 {
            return Err(RateLimitError::InvalidActionLimit {
                action: action.to_string(),
                reason: "window_ms must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Default action table
pub fn default_actions() -> BTreeMap<String, ActionLimit> {
    [
        ("sendMessage", ActionLimit::new(10, 60_000)),
        ("createLead", ActionLimit::new(5, 60_000)),
        ("uploadFile", ActionLimit::new(5, 60_000)),
        ("updateProfile", ActionLimit::new(10, 60_000)),
    ]
    .into_iter()
    .map(|(name, limit)| (name.to_string(), limit))
    .collect()
}

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Maximum number of tracked keys (`None` = unbounded, written as `0`)
    #[serde(with = "max_keys_format")]
    pub max_keys: Option<usize>,

    /// Buckets idle longer than this many windows are swept
    pub idle_ttl_windows: u32,

    /// Background sweep interval in seconds
    pub sweep_interval_secs: u64,

    /// Named action limits
    pub actions: BTreeMap<String, ActionLimit>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_keys: Some(DEFAULT_MAX_KEYS),
            idle_ttl_windows: DEFAULT_IDLE_TTL_WINDOWS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            actions: default_actions(),
        }
    }
}

/// `max_keys` on disk: `0` means no cap, the same as the environment
/// override, so an unbounded configuration survives a save and reload.
mod max_keys_format {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        max_keys: &Option<usize>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(max_keys.map_or(0, |max| max as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<usize>, D::Error> {
        let max = usize::deserialize(deserializer)?;
        Ok((max > 0).then_some(max))
    }
}

impl RateLimitConfig {
    /// Disable rate limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Apply `PORTAL_THROTTLE_*` environment overrides
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("PORTAL_THROTTLE_RATE_LIMIT_ENABLED") {
            self.enabled = val.parse().unwrap_or(self.enabled);
        }

        if let Ok(val) = std::env::var("PORTAL_THROTTLE_MAX_KEYS") {
            if let Ok(max) = val.parse::<usize>() {
                self.max_keys = if max == 0 { None } else { Some(max) };
            }
        }

        self
    }

    /// Look up an action's limit
    pub fn action(&self, name: &str) -> Result<ActionLimit> {
        self.actions
            .get(name)
            .copied()
            .ok_or_else(|| RateLimitError::UnknownAction(name.to_string()))
    }

    /// Add or replace an action entry
    pub fn with_action(mut self, name: &str, limit: ActionLimit) -> Self {
        self.actions.insert(name.to_string(), limit);
        self
    }

    /// Sweep interval as a `Duration`
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate every action entry and the eviction settings
    pub fn validate(&self) -> Result<()> {
        if self.max_keys == Some(0) {
            return Err(RateLimitError::InvalidConfig(
                "max_keys must be > 0".to_string(),
            ));
        }
        if self.idle_ttl_windows == 0 {
            return Err(RateLimitError::InvalidConfig(
                "idle_ttl_windows must be > 0".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(RateLimitError::InvalidConfig(
                "sweep_interval_secs must be > 0".to_string(),
            ));
        }
        for (name, limit) in &self.actions {
            limit.validate(name)?;
        }
        Ok(())
    }
}
