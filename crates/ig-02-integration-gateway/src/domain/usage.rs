//! Usage records for integration API calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// One request seen by the gateway.
///
/// `client_id`/`key_id` are empty for requests rejected before
/// authentication completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub client_id: Option<Uuid>,
    pub key_id: Option<Uuid>,
    pub source_ip: Option<IpAddr>,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub latency_ms: u64,
}

impl UsageRecord {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}
