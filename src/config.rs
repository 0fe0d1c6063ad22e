//! Engine configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AclError, Result};
use crate::types::Verdict;

/// Default ACL pool size
pub const DEFAULT_MAX_ACLS: usize = 1024;
/// Default per-ACL rule limit
pub const DEFAULT_MAX_RULES_PER_ACL: usize = 4096;
/// Default session capacity across all shards
pub const DEFAULT_SESSION_CAPACITY: usize = 65536;
/// Default number of session shards
pub const DEFAULT_SESSION_SHARDS: usize = 16;
/// Idle timeout for UDP (and other non-TCP) sessions
pub const DEFAULT_UDP_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
/// Idle timeout for TCP sessions
pub const DEFAULT_TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(86400);
/// Lifetime of a TCP session after both sides sent FIN
pub const DEFAULT_TCP_CLOSING_TIMEOUT: Duration = Duration::from_secs(30);
/// Period of the background reaper
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(1);
/// Session slots examined per shard per reaper tick
pub const DEFAULT_REAP_BUDGET: usize = 1024;
/// Rewrite cache size
pub const DEFAULT_REWRITE_CACHE_SIZE: usize = 1024;
/// Rewrite cache entry lifetime
pub const DEFAULT_REWRITE_CACHE_TIMEOUT: Duration = Duration::from_secs(5);

/// Verdict applied when no rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    Permit,
    Deny,
}

impl DefaultPolicy {
    pub fn verdict(self) -> Verdict {
        match self {
            DefaultPolicy::Permit => Verdict::Permit,
            DefaultPolicy::Deny => Verdict::Deny,
        }
    }
}

/// Engine options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum number of live ACLs
    pub max_acls: usize,
    /// Maximum number of rules in one ACL
    pub max_rules_per_acl: usize,
    /// Session capacity, split evenly across shards
    pub session_capacity: usize,
    /// Number of independently locked session shards
    pub session_shards: usize,
    #[serde(with = "duration_secs")]
    pub udp_idle_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub tcp_idle_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub tcp_closing_timeout: Duration,
    /// Verdict when no bound rule matches
    pub default_policy: DefaultPolicy,
    /// Verdict for non-IP and malformed packets
    pub unmatchable_policy: DefaultPolicy,
    /// Track sessions for permit+reflect rules
    pub session_tracking: bool,
    #[serde(with = "duration_secs")]
    pub reap_interval: Duration,
    pub reap_budget: usize,
    pub rewrite_cache_size: usize,
    #[serde(with = "duration_secs")]
    pub rewrite_cache_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_acls: DEFAULT_MAX_ACLS,
            max_rules_per_acl: DEFAULT_MAX_RULES_PER_ACL,
            session_capacity: DEFAULT_SESSION_CAPACITY,
            session_shards: DEFAULT_SESSION_SHARDS,
            udp_idle_timeout: DEFAULT_UDP_IDLE_TIMEOUT,
            tcp_idle_timeout: DEFAULT_TCP_IDLE_TIMEOUT,
            tcp_closing_timeout: DEFAULT_TCP_CLOSING_TIMEOUT,
            default_policy: DefaultPolicy::Permit,
            unmatchable_policy: DefaultPolicy::Permit,
            session_tracking: true,
            reap_interval: DEFAULT_REAP_INTERVAL,
            reap_budget: DEFAULT_REAP_BUDGET,
            rewrite_cache_size: DEFAULT_REWRITE_CACHE_SIZE,
            rewrite_cache_timeout: DEFAULT_REWRITE_CACHE_TIMEOUT,
        }
    }
}

impl EngineOptions {
    /// Create new engine options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a JSON document; absent fields keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            AclError::ConfigError(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_max_acls(mut self, max: usize) -> Self {
        self.max_acls = max;
        self
    }

    pub fn with_max_rules_per_acl(mut self, max: usize) -> Self {
        self.max_rules_per_acl = max;
        self
    }

    pub fn with_session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity;
        self
    }

    pub fn with_session_shards(mut self, shards: usize) -> Self {
        self.session_shards = shards;
        self
    }

    pub fn with_udp_idle_timeout(mut self, timeout: Duration) -> Self {
        self.udp_idle_timeout = timeout;
        self
    }

    pub fn with_tcp_idle_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_idle_timeout = timeout;
        self
    }

    pub fn with_tcp_closing_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_closing_timeout = timeout;
        self
    }

    pub fn with_default_policy(mut self, policy: DefaultPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_unmatchable_policy(mut self, policy: DefaultPolicy) -> Self {
        self.unmatchable_policy = policy;
        self
    }

    pub fn with_session_tracking(mut self, enabled: bool) -> Self {
        self.session_tracking = enabled;
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn with_reap_budget(mut self, budget: usize) -> Self {
        self.reap_budget = budget;
        self
    }

    pub fn with_rewrite_cache(mut self, size: usize, timeout: Duration) -> Self {
        self.rewrite_cache_size = size;
        self.rewrite_cache_timeout = timeout;
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_acls == 0 || self.max_acls > u32::MAX as usize {
            return Err(AclError::ConfigError(format!(
                "max_acls must be in 1..={}",
                u32::MAX
            )));
        }
        if self.session_shards == 0 {
            return Err(AclError::ConfigError(
                "session_shards must be at least 1".to_string(),
            ));
        }
        if self.session_capacity < self.session_shards {
            return Err(AclError::ConfigError(format!(
                "session_capacity ({}) must be at least session_shards ({})",
                self.session_capacity, self.session_shards
            )));
        }
        if self.reap_interval.is_zero() {
            return Err(AclError::ConfigError(
                "reap_interval must be non-zero".to_string(),
            ));
        }
        if self.reap_budget == 0 {
            return Err(AclError::ConfigError(
                "reap_budget must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durations as (fractional) seconds
mod duration_secs {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = EngineOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.udp_idle_timeout, Duration::from_secs(600));
        assert_eq!(options.tcp_idle_timeout, Duration::from_secs(86400));
        assert_eq!(options.tcp_closing_timeout, Duration::from_secs(30));
        assert_eq!(options.default_policy, DefaultPolicy::Permit);
    }

    #[test]
    fn test_from_json_partial() {
        let options = EngineOptions::from_json_str(
            r#"{ "default_policy": "deny", "udp_idle_timeout": 30, "reap_interval": 0.25 }"#,
        )
        .unwrap();
        assert_eq!(options.default_policy, DefaultPolicy::Deny);
        assert_eq!(options.udp_idle_timeout, Duration::from_secs(30));
        assert_eq!(options.reap_interval, Duration::from_millis(250));
        assert_eq!(options.max_acls, DEFAULT_MAX_ACLS);
    }

    #[test]
    fn test_from_json_rejects_negative_duration() {
        let res = EngineOptions::from_json_str(r#"{ "tcp_idle_timeout": -1 }"#);
        assert!(matches!(res, Err(AclError::JsonError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_shards() {
        let options = EngineOptions::new().with_session_shards(0);
        assert!(matches!(options.validate(), Err(AclError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let options = EngineOptions::new().with_reap_interval(Duration::ZERO);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let options = EngineOptions::new()
            .with_default_policy(DefaultPolicy::Deny)
            .with_session_capacity(128);
        let text = serde_json::to_string(&options).unwrap();
        assert_eq!(EngineOptions::from_json_str(&text).unwrap(), options);
    }

    #[test]
    fn test_from_file_missing() {
        let res = EngineOptions::from_file("/nonexistent/acl-dataplane.json");
        assert!(matches!(res, Err(AclError::ConfigError(_))));
    }
}
