//! Domain types for the integration gateway.
//!
//! Configuration, errors, credentials and usage records. Whitelist matching
//! itself lives in `ig-01-ip-authorization`.

pub mod config;
pub mod credentials;
pub mod error;
pub mod keys;
pub mod usage;

// Re-exports for convenience
pub use config::{
    ConfigError, EmptyWhitelistPolicy, GatewayConfig, KeyConfig, LogConfig, RateLimitConfig,
    SecurityConfig, UsageConfig,
};
pub use credentials::{
    ApiClient, ApiKey, AuthenticatedClient, IpWhitelistEntry, IssuedKey, KeyStatus,
};
pub use error::{ApiError, ApiResult, ErrorCode, GatewayError, StoreError};
pub use usage::UsageRecord;
