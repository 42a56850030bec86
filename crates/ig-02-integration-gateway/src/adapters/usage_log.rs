//! Usage sinks.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::domain::UsageRecord;
use crate::ports::UsageSink;

/// Emits each record as a structured event with target `usage`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingUsageSink;

impl UsageSink for TracingUsageSink {
    fn record(&self, record: UsageRecord) {
        info!(
            target: "usage",
            client_id = ?record.client_id,
            key_id = ?record.key_id,
            source_ip = ?record.source_ip,
            method = %record.method,
            path = %record.path,
            status = record.status,
            latency_ms = record.latency_ms,
            "API request"
        );
    }
}

/// Bounded in-memory usage log.
///
/// Keeps the most recent `capacity` records plus lifetime per-client
/// request counts.
#[derive(Debug)]
pub struct InMemoryUsageLog {
    records: Mutex<VecDeque<UsageRecord>>,
    capacity: usize,
    per_client: DashMap<Uuid, u64>,
}

impl InMemoryUsageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            per_client: DashMap::new(),
        }
    }

    /// Most recent records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<UsageRecord> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    pub fn for_client(&self, client_id: Uuid) -> Vec<UsageRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.client_id == Some(client_id))
            .cloned()
            .collect()
    }

    /// Lifetime request count for a client, including evicted records
    pub fn request_count(&self, client_id: Uuid) -> u64 {
        self.per_client.get(&client_id).map(|c| *c).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl UsageSink for InMemoryUsageLog {
    fn record(&self, record: UsageRecord) {
        if let Some(client_id) = record.client_id {
            *self.per_client.entry(client_id).or_insert(0) += 1;
        }

        let mut records = self.records.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}

/// Forwards every record to each inner sink
#[derive(Default, Clone)]
pub struct CompositeUsageSink {
    sinks: Vec<Arc<dyn UsageSink>>,
}

impl CompositeUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn UsageSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl UsageSink for CompositeUsageSink {
    fn record(&self, record: UsageRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(record.clone());
            }
            last.record(record);
        }
    }
}
