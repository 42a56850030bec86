//! Gateway request counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::ErrorCode;

/// Gateway metrics
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    pub requests_total: AtomicU64,
    pub requests_authorized: AtomicU64,

    // Rejections by cause
    pub rejected_missing_key: AtomicU64,
    pub rejected_invalid_key: AtomicU64,
    pub rejected_client_disabled: AtomicU64,
    pub rejected_ip_not_allowed: AtomicU64,
    pub rate_limit_rejected: AtomicU64,

    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

/// Point-in-time copy of [`GatewayMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_authorized: u64,
    pub rejected_missing_key: u64,
    pub rejected_invalid_key: u64,
    pub rejected_client_disabled: u64,
    pub rejected_ip_not_allowed: u64,
    pub rate_limit_rejected: u64,
    pub average_latency_ms: f64,
}

impl MetricsSnapshot {
    /// All authentication and authorization rejections, excluding rate limits
    pub fn rejected_total(&self) -> u64 {
        self.rejected_missing_key
            + self.rejected_invalid_key
            + self.rejected_client_disabled
            + self.rejected_ip_not_allowed
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request
    pub fn record_request(&self, latency_ms: u64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_authorized(&self) {
        self.requests_authorized.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an authentication/authorization rejection under its cause
    pub fn record_rejection(&self, code: ErrorCode) {
        let counter = match code {
            ErrorCode::MissingApiKey => &self.rejected_missing_key,
            ErrorCode::InvalidApiKey | ErrorCode::ApiKeyExpired | ErrorCode::ApiKeyRevoked => {
                &self.rejected_invalid_key
            }
            ErrorCode::ClientDisabled => &self.rejected_client_disabled,
            ErrorCode::IpNotAllowed => &self.rejected_ip_not_allowed,
            ErrorCode::RateLimited => &self.rate_limit_rejected,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_rejection(&self) {
        self.rate_limit_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_authorized: self.requests_authorized.load(Ordering::Relaxed),
            rejected_missing_key: self.rejected_missing_key.load(Ordering::Relaxed),
            rejected_invalid_key: self.rejected_invalid_key.load(Ordering::Relaxed),
            rejected_client_disabled: self.rejected_client_disabled.load(Ordering::Relaxed),
            rejected_ip_not_allowed: self.rejected_ip_not_allowed.load(Ordering::Relaxed),
            rate_limit_rejected: self.rate_limit_rejected.load(Ordering::Relaxed),
            average_latency_ms: self.average_latency_ms(),
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let s = self.snapshot();
        serde_json::json!({
            "requests": {
                "total": s.requests_total,
                "authorized": s.requests_authorized,
            },
            "rejected": {
                "total": s.rejected_total(),
                "missing_key": s.rejected_missing_key,
                "invalid_key": s.rejected_invalid_key,
                "client_disabled": s.rejected_client_disabled,
                "ip_not_allowed": s.rejected_ip_not_allowed,
            },
            "rate_limiting": {
                "rejected": s.rate_limit_rejected,
            },
            "latency": {
                "average_ms": s.average_latency_ms,
            }
        })
    }
}
