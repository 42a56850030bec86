//! Outbound ports for the integration gateway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{ApiClient, ApiError, ApiKey, StoreError, UsageRecord};

/// In-place edit of a client record. An `Err` leaves the record untouched.
pub type ClientEdit = Box<dyn FnOnce(&mut ApiClient) -> Result<(), ApiError> + Send>;

/// In-place edit of a key record. An `Err` leaves the record untouched.
pub type KeyEdit = Box<dyn FnOnce(&mut ApiKey) -> Result<(), ApiError> + Send>;

/// Persistence for API clients and keys
///
/// Records are never replaced wholesale. All changes go through
/// `modify_client` / `modify_key`, which apply the edit and store the result
/// as a single step, so concurrent edits to the same record cannot overwrite
/// each other.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert_client(&self, client: ApiClient) -> Result<(), StoreError>;

    /// Atomically edit a client and return the stored result.
    /// A rejected edit surfaces as `StoreError::Rejected`.
    async fn modify_client(&self, id: Uuid, edit: ClientEdit) -> Result<ApiClient, StoreError>;

    async fn get_client(&self, id: Uuid) -> Result<Option<ApiClient>, StoreError>;

    async fn insert_key(&self, key: ApiKey) -> Result<(), StoreError>;

    /// Atomically edit a key and return the stored result. The lookup
    /// segment is fixed at issue time and may not change.
    async fn modify_key(&self, id: Uuid, edit: KeyEdit) -> Result<ApiKey, StoreError>;

    async fn get_key(&self, id: Uuid) -> Result<Option<ApiKey>, StoreError>;

    /// All keys whose lookup segment equals `lookup`
    async fn find_keys_by_lookup(&self, lookup: &str) -> Result<Vec<ApiKey>, StoreError>;

    async fn list_keys(&self, client_id: Uuid) -> Result<Vec<ApiKey>, StoreError>;
}

/// Destination for usage records. Must not block.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: UsageRecord);
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests and replays
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
