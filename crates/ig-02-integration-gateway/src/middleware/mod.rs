//! Middleware stack for the integration gateway.
//!
//! Layer order: Request → IpProtection → UsageLog → Auth → RateLimit → Handler

pub mod auth;
pub mod ip_protection;
pub mod metrics;
pub mod rate_limit;
pub mod usage;

pub use auth::{AuthLayer, API_KEY_HEADER};
pub use ip_protection::{ClientIp, IpProtectionLayer, TrustedProxyConfig, REAL_CLIENT_IP_HEADER};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use rate_limit::{cleanup_task, RateLimitLayer, RateLimitState};
pub use usage::UsageLogLayer;

use axum::Router;
use std::sync::Arc;

use crate::domain::config::GatewayConfig;
use crate::ports::UsageSink;
use crate::service::CredentialService;

/// Middleware stack builder
pub struct MiddlewareStack {
    pub ip_protection: IpProtectionLayer,
    pub usage: Option<UsageLogLayer>,
    pub auth: AuthLayer,
    pub rate_limit: RateLimitLayer,
    pub metrics: Arc<GatewayMetrics>,
}

impl MiddlewareStack {
    /// Create middleware stack from gateway config
    pub fn from_config(
        config: &GatewayConfig,
        service: Arc<CredentialService>,
        usage_sink: Arc<dyn UsageSink>,
    ) -> Self {
        let metrics = Arc::new(GatewayMetrics::new());

        Self {
            ip_protection: IpProtectionLayer::new(TrustedProxyConfig::from(&config.security)),
            usage: config
                .usage
                .enabled
                .then(|| UsageLogLayer::new(usage_sink, Arc::clone(&metrics))),
            auth: AuthLayer::new(service, Arc::clone(&metrics)),
            rate_limit: RateLimitLayer::new(config.rate_limit.clone(), Arc::clone(&metrics)),
            metrics,
        }
    }

    /// Wrap `router` in the full stack
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Last added runs first
        let router = router
            .layer(self.rate_limit.clone())
            .layer(self.auth.clone());

        let router = match &self.usage {
            Some(usage) => router.layer(usage.clone()),
            None => router,
        };

        router.layer(self.ip_protection.clone())
    }

    /// Get shared metrics
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get rate limit state for cleanup task
    pub fn rate_limit_state(&self) -> Arc<RateLimitState> {
        self.rate_limit.state()
    }
}
