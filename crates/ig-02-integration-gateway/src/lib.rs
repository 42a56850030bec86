#![allow(missing_docs)]

//! IG-02 Integration Gateway - API key authentication and IP whitelisting
//! for third-party integrations.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                INTEGRATION GATEWAY (ig-02)                │
//! ├───────────────────────────────────────────────────────────┤
//! │  Request                                                  │
//! │    │                                                      │
//! │  IpProtection   resolve client address (trusted proxies)  │
//! │    │                                                      │
//! │  UsageLog       record every outcome                      │
//! │    │                                                      │
//! │  Auth           key → client → whitelist (ig-01)          │
//! │    │                                                      │
//! │  RateLimit      per-client token bucket                   │
//! │    │                                                      │
//! │  Handler                                                  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Credentials
//!
//! - Keys look like `<prefix>_<64 hex>`; only a SHA-256 digest is stored.
//! - Rotation keeps the old key valid for a grace window.
//! - Each client owns a list of exact-address or CIDR whitelist entries.
//!   An empty list means "any address" or "no address" depending on
//!   [`EmptyWhitelistPolicy`].
//!
//! # Usage
//!
//! ```ignore
//! use ig_02_integration_gateway::{GatewayConfig, IntegrationGateway};
//!
//! let config = GatewayConfig::from_env();
//! ig_02_integration_gateway::telemetry::init_tracing(&config.logging)?;
//!
//! let mut gateway = IntegrationGateway::new(config)?;
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! gateway.serve(listener, routes).await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod gateway;
pub mod middleware;
pub mod ports;
pub mod service;
pub mod telemetry;

pub use adapters::{CompositeUsageSink, InMemoryCredentialStore, InMemoryUsageLog, TracingUsageSink};
pub use domain::{
    ApiClient, ApiError, ApiKey, ApiResult, AuthenticatedClient, ConfigError,
    EmptyWhitelistPolicy, ErrorCode, GatewayConfig, GatewayError, IpWhitelistEntry, IssuedKey,
    KeyConfig, KeyStatus, LogConfig, RateLimitConfig, SecurityConfig, StoreError, UsageConfig,
    UsageRecord,
};
pub use gateway::IntegrationGateway;
pub use middleware::{ClientIp, GatewayMetrics, MetricsSnapshot, MiddlewareStack};
pub use ports::{CredentialStore, TimeSource, UsageSink};
pub use service::CredentialService;
