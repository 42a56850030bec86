//! Adapters Layer (Driven Adapters)
//!
//! - `InMemoryCredentialStore` - DashMap-backed `CredentialStore`
//! - `TracingUsageSink` - usage records as structured log events
//! - `InMemoryUsageLog` - bounded usage buffer with per-client counters
//! - `CompositeUsageSink` - fan-out to several sinks

pub mod memory_store;
pub mod usage_log;

pub use memory_store::InMemoryCredentialStore;
pub use usage_log::{CompositeUsageSink, InMemoryUsageLog, TracingUsageSink};
