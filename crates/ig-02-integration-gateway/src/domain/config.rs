//! Gateway configuration with validation.
//!
//! Defaults are production-safe; `from_env` layers `IG_*` overrides on top.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Client IP resolution and whitelist policy
    pub security: SecurityConfig,
    /// Per-client rate limiting
    pub rate_limit: RateLimitConfig,
    /// API key issuance and rotation
    pub keys: KeyConfig,
    /// Usage logging
    pub usage: UsageConfig,
    /// Log output
    pub logging: LogConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.enabled && self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "requests_per_minute cannot be 0".into(),
            ));
        }

        if self.rate_limit.enabled && self.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "burst_size cannot be 0".into(),
            ));
        }

        let prefix = &self.keys.key_prefix;
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidKeyPrefix(prefix.clone()));
        }

        if self.keys.max_whitelist_entries == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_whitelist_entries cannot be 0".into(),
            ));
        }

        if matches!(self.keys.default_ttl, Some(ttl) if ttl.is_zero()) {
            return Err(ConfigError::InvalidLimit(
                "default_ttl cannot be 0".into(),
            ));
        }

        if self.usage.enabled && self.usage.buffer_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "usage buffer_capacity cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IG_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `IG_JSON_LOGS`: JSON log output (default: false)
    /// - `IG_TRUSTED_PROXIES`: Comma-separated proxy addresses
    /// - `IG_TRUST_PRIVATE_IPS`: Trust private ranges as proxies (default: false)
    /// - `IG_PROXY_COUNT`: Proxies in front of the gateway (default: 1)
    /// - `IG_EMPTY_WHITELIST`: `allow` or `deny` (default: allow)
    /// - `IG_RATE_LIMIT_ENABLED`: Enable rate limiting (default: true)
    /// - `IG_RATE_LIMIT_RPM`: Requests per minute per client (default: 600)
    /// - `IG_KEY_PREFIX`: Issued key prefix (default: ig_live)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = env::var("IG_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            config.logging.level = level;
        }

        if let Ok(json) = env::var("IG_JSON_LOGS") {
            config.logging.json = parse_flag(&json);
        }

        if let Ok(proxies) = env::var("IG_TRUSTED_PROXIES") {
            config.security.trusted_proxies = proxies
                .split(',')
                .filter_map(|p| p.trim().parse::<IpAddr>().ok())
                .collect();
        }

        if let Ok(trust) = env::var("IG_TRUST_PRIVATE_IPS") {
            config.security.trust_private_ips = parse_flag(&trust);
        }

        if let Ok(count) = env::var("IG_PROXY_COUNT") {
            if let Ok(c) = count.parse() {
                config.security.proxy_count = c;
            }
        }

        if let Ok(policy) = env::var("IG_EMPTY_WHITELIST") {
            match policy.trim().to_ascii_lowercase().as_str() {
                "allow" => config.security.empty_whitelist = EmptyWhitelistPolicy::Allow,
                "deny" => config.security.empty_whitelist = EmptyWhitelistPolicy::Deny,
                _ => {}
            }
        }

        if let Ok(enabled) = env::var("IG_RATE_LIMIT_ENABLED") {
            config.rate_limit.enabled = parse_flag(&enabled);
        }

        if let Ok(rpm) = env::var("IG_RATE_LIMIT_RPM") {
            if let Ok(r) = rpm.parse() {
                config.rate_limit.requests_per_minute = r;
            }
        }

        if let Ok(prefix) = env::var("IG_KEY_PREFIX") {
            config.keys.key_prefix = prefix;
        }

        config
    }
}

fn parse_flag(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v != "false" && v != "0" && !v.is_empty()
}

/// What an empty credential whitelist means
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyWhitelistPolicy {
    /// No entries configured: any source address may use the key
    #[default]
    Allow,
    /// No entries configured: every request is rejected
    Deny,
}

impl EmptyWhitelistPolicy {
    pub fn allows_empty(self) -> bool {
        matches!(self, EmptyWhitelistPolicy::Allow)
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// List of trusted proxy IPs
    pub trusted_proxies: Vec<IpAddr>,
    /// Trust loopback peers as proxies
    pub trust_localhost: bool,
    /// Trust private IPs (10.x, 172.16.x, 192.168.x, fc00::/7)
    pub trust_private_ips: bool,
    /// Number of proxies in chain (for X-Forwarded-For parsing)
    pub proxy_count: usize,
    /// Header carrying the client address when the peer is a trusted proxy
    pub real_ip_header: String,
    /// Meaning of a credential with no whitelist entries
    pub empty_whitelist: EmptyWhitelistPolicy,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            trust_localhost: true,
            trust_private_ips: false,
            proxy_count: 1,
            real_ip_header: "X-Forwarded-For".to_string(),
            empty_whitelist: EmptyWhitelistPolicy::Allow,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Requests per minute per client, unless the client overrides it
    pub requests_per_minute: u32,
    /// Burst allowance (token bucket)
    pub burst_size: u32,
    /// How often stale buckets are swept
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    /// Buckets idle longer than this are dropped
    #[serde(with = "humantime_serde")]
    pub bucket_max_age: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 600,
            burst_size: 60,
            cleanup_interval: Duration::from_secs(60),
            bucket_max_age: Duration::from_secs(600),
        }
    }
}

/// API key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Prefix of issued keys (`<prefix>_<hex secret>`)
    pub key_prefix: String,
    /// Lifetime of newly issued keys (None = no expiry)
    #[serde(with = "humantime_serde::option")]
    pub default_ttl: Option<Duration>,
    /// How long a rotated-out key keeps working
    #[serde(with = "humantime_serde")]
    pub rotation_grace: Duration,
    /// Max whitelist entries per client
    pub max_whitelist_entries: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ig_live".to_string(),
            default_ttl: Some(Duration::from_secs(365 * 24 * 60 * 60)),
            rotation_grace: Duration::from_secs(24 * 60 * 60),
            max_whitelist_entries: 50,
        }
    }
}

/// Usage logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Record usage for every request passing the gateway
    pub enabled: bool,
    /// Records kept by the in-memory usage log
    pub buffer_capacity: usize,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_capacity: 10_000,
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive (trace, debug, info, warn, error, or EnvFilter syntax)
    pub level: String,
    /// JSON formatted output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid rate limiting configuration
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Key prefix must be non-empty ASCII alphanumerics or '_'
    #[error("invalid key prefix: {0:?}")]
    InvalidKeyPrefix(String),
}

/// Duration serialization as `"30s"`, `"500ms"`, `"15m"`, `"12h"`, `"90d"`
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "m" and "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map_err(|_| "invalid minutes")
                .and_then(|m| m.checked_mul(60).ok_or("minutes out of range"))
                .map(Duration::from_secs)
        } else if let Some(hours) = s.strip_suffix('h') {
            hours
                .trim()
                .parse::<u64>()
                .map_err(|_| "invalid hours")
                .and_then(|h| h.checked_mul(3600).ok_or("hours out of range"))
                .map(Duration::from_secs)
        } else if let Some(days) = s.strip_suffix('d') {
            days.trim()
                .parse::<u64>()
                .map_err(|_| "invalid days")
                .and_then(|d| d.checked_mul(86_400).ok_or("days out of range"))
                .map(Duration::from_secs)
        } else {
            // Try parsing as plain seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => super::parse_duration(&s)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.security.empty_whitelist, EmptyWhitelistPolicy::Allow);
        assert_eq!(config.keys.key_prefix, "ig_live");
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_rate_limit_validation() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests_per_minute = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRateLimit(_))
        ));

        // Zero is fine when limiting is off
        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_prefix_validation() {
        let mut config = GatewayConfig::default();
        config.keys.key_prefix = "bad prefix".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKeyPrefix(_))
        ));

        config.keys.key_prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_whitelist_limit_validation() {
        let mut config = GatewayConfig::default();
        config.keys.max_whitelist_entries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLimit(_))
        ));
    }

    #[test]
    fn test_parse_duration_suffixes() {
        use humantime_serde::parse_duration;
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("12h"), Ok(Duration::from_secs(43_200)));
        assert_eq!(parse_duration("90d"), Ok(Duration::from_secs(90 * 86_400)));
        assert_eq!(parse_duration("42"), Ok(Duration::from_secs(42)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_error() {
        use humantime_serde::parse_duration;
        let huge = format!("{}", u64::MAX);
        assert_eq!(parse_duration(&format!("{}m", huge)), Err("minutes out of range"));
        assert_eq!(parse_duration(&format!("{}h", huge)), Err("hours out of range"));
        assert_eq!(parse_duration(&format!("{}d", huge)), Err("days out of range"));
        assert_eq!(parse_duration(&format!("{}s", huge)), Ok(Duration::from_secs(u64::MAX)));

        let json = format!(r#"{{"rate_limit": {{"bucket_max_age": "{}d"}}}}"#, huge);
        assert!(serde_json::from_str::<GatewayConfig>(&json).is_err());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{
            "security": { "empty_whitelist": "deny", "trusted_proxies": ["10.0.0.1"] },
            "keys": { "default_ttl": "30d", "rotation_grace": "1h" }
        }"#;
        let config: GatewayConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.security.empty_whitelist, EmptyWhitelistPolicy::Deny);
        assert_eq!(config.security.trusted_proxies.len(), 1);
        assert_eq!(config.keys.default_ttl, Some(Duration::from_secs(30 * 86_400)));
        assert_eq!(config.keys.rotation_grace, Duration::from_secs(3600));
        // Untouched sections keep their defaults
        assert_eq!(config.rate_limit.requests_per_minute, 600);
    }

    #[test]
    fn test_no_expiry_round_trip() {
        let mut config = GatewayConfig::default();
        config.keys.default_ttl = None;
        let json = serde_json::to_string(&config).unwrap();
        let back: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.keys.default_ttl, None);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
