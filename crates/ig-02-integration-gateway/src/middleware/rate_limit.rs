//! Per-client rate limiting using token buckets.
//!
//! Buckets are keyed by API client id, so every key of a client shares one
//! budget. The quota is the client's own `requests_per_minute` override when
//! set, otherwise the configured default.

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::{debug, warn};
use uuid::Uuid;

use super::metrics::GatewayMetrics;
use crate::domain::{ApiError, AuthenticatedClient, RateLimitConfig};

/// Token bucket for one client
struct TokenBucket {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    /// Quota the limiter was built with
    requests_per_minute: u32,
    /// Last access time (for cleanup)
    last_access: Instant,
}

impl TokenBucket {
    fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst_size.min(requests_per_minute)).unwrap_or(NonZeroU32::MIN);

        Self {
            limiter: RateLimiter::direct(Quota::per_minute(rate).allow_burst(burst)),
            requests_per_minute,
            last_access: Instant::now(),
        }
    }
}

/// Rate limiter state shared across requests
pub struct RateLimitState {
    /// Per-client token buckets
    buckets: DashMap<Uuid, TokenBucket>,
    config: RateLimitConfig,
    clock: DefaultClock,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
            clock: DefaultClock::default(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take one token for `client_id`. On exhaustion returns the wait until
    /// the next token.
    pub fn check(&self, client_id: Uuid, override_rpm: Option<u32>) -> Result<(), Duration> {
        if !self.config.enabled {
            return Ok(());
        }

        let rpm = override_rpm
            .filter(|r| *r > 0)
            .unwrap_or(self.config.requests_per_minute);

        let mut bucket = self.buckets.entry(client_id).or_insert_with(|| {
            debug!(client_id = %client_id, rpm, "Creating new rate limit bucket");
            TokenBucket::new(rpm, self.config.burst_size)
        });

        if bucket.requests_per_minute != rpm {
            debug!(client_id = %client_id, rpm, "Client quota changed; resetting bucket");
            *bucket = TokenBucket::new(rpm, self.config.burst_size);
        }

        bucket.last_access = Instant::now();
        bucket
            .limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Clean up old buckets (call periodically)
    pub fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets.retain(|client_id, bucket| {
            let age = now.duration_since(bucket.last_access);
            if age > max_age {
                debug!(client_id = %client_id, age_secs = age.as_secs(), "Removing stale rate limit bucket");
                false
            } else {
                true
            }
        });
    }

    /// Get number of tracked clients
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

/// Rate limit layer
#[derive(Clone)]
pub struct RateLimitLayer {
    state: Arc<RateLimitState>,
    metrics: Arc<GatewayMetrics>,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            state: Arc::new(RateLimitState::new(config)),
            metrics,
        }
    }

    pub fn state(&self) -> Arc<RateLimitState> {
        Arc::clone(&self.state)
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Rate limit service
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    state: Arc<RateLimitState>,
    metrics: Arc<GatewayMetrics>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = Arc::clone(&self.state);
        let metrics = Arc::clone(&self.metrics);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // Runs inside authentication; unauthenticated requests never get here
            let Some((client_id, override_rpm, source_ip)) = req
                .extensions()
                .get::<AuthenticatedClient>()
                .map(|c| (c.client_id, c.requests_per_minute, c.source_ip))
            else {
                return inner.call(req).await;
            };

            match state.check(client_id, override_rpm) {
                Ok(()) => inner.call(req).await,
                Err(retry_after) => {
                    let retry_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        client_id = %client_id,
                        source_ip = %source_ip,
                        retry_after_ms = retry_ms,
                        "Rate limit exceeded"
                    );
                    metrics.record_rate_limit_rejection();
                    Ok(ApiError::rate_limited(retry_ms).into_response())
                }
            }
        })
    }
}

/// Background task to clean up stale rate limit buckets
pub async fn cleanup_task(state: Arc<RateLimitState>, interval: Duration, max_age: Duration) {
    let mut cleanup_interval = tokio::time::interval(interval);
    cleanup_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        cleanup_interval.tick().await;
        state.cleanup(max_age);
    }
}
