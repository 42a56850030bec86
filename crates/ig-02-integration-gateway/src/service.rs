//! Credential service: API client and key lifecycle, whitelist management,
//! and request authentication.
//!
//! ## Authentication order
//!
//! 1. Key shape and hash (401 `invalid_api_key`)
//! 2. Key lifecycle (401 `api_key_expired` / `api_key_revoked`)
//! 3. Client active flag (403 `client_disabled`)
//! 4. Source address against the client's whitelist (403 `ip_not_allowed`)
//!
//! Whitelist matching is delegated to `ig-01-ip-authorization`; this service
//! only decides what an empty whitelist means, per `EmptyWhitelistPolicy`.
//!
//! ## Concurrency
//!
//! Every change to a stored client or key goes through the store's atomic
//! `modify_*` operations. Checks that guard a change (capacity, duplicates,
//! key still usable) run inside the edit, against the record being written.

use chrono::{DateTime, Utc};
use ig_01_ip_authorization::{WhitelistPattern, WhitelistVerdict};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::keys::{self, generate_key};
use crate::domain::{
    ApiClient, ApiError, ApiKey, ApiResult, AuthenticatedClient, EmptyWhitelistPolicy,
    IpWhitelistEntry, IssuedKey, KeyConfig, KeyStatus,
};
use crate::ports::{CredentialStore, SystemTimeSource, TimeSource};

/// Credential lifecycle and authentication
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    config: KeyConfig,
    empty_whitelist: EmptyWhitelistPolicy,
    time: Arc<dyn TimeSource>,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        config: KeyConfig,
        empty_whitelist: EmptyWhitelistPolicy,
    ) -> Self {
        Self::with_time_source(store, config, empty_whitelist, Arc::new(SystemTimeSource))
    }

    pub fn with_time_source(
        store: Arc<dyn CredentialStore>,
        config: KeyConfig,
        empty_whitelist: EmptyWhitelistPolicy,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            store,
            config,
            empty_whitelist,
            time,
        }
    }

    pub fn key_config(&self) -> &KeyConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    pub async fn create_client(
        &self,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> ApiResult<ApiClient> {
        let client = ApiClient::new(name, owner, self.time.now());
        self.store.insert_client(client.clone()).await?;
        info!(client_id = %client.id, name = %client.name, "API client created");
        Ok(client)
    }

    pub async fn get_client(&self, client_id: Uuid) -> ApiResult<ApiClient> {
        self.store
            .get_client(client_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("client {}", client_id)))
    }

    pub async fn set_client_active(&self, client_id: Uuid, active: bool) -> ApiResult<ApiClient> {
        let client = self
            .store
            .modify_client(
                client_id,
                Box::new(move |c| {
                    c.is_active = active;
                    Ok(())
                }),
            )
            .await?;
        info!(client_id = %client_id, active, "API client activation changed");
        Ok(client)
    }

    /// Set or clear the per-client rate limit override
    pub async fn set_rate_limit(
        &self,
        client_id: Uuid,
        requests_per_minute: Option<u32>,
    ) -> ApiResult<ApiClient> {
        let requests_per_minute = requests_per_minute.filter(|r| *r > 0);
        let client = self
            .store
            .modify_client(
                client_id,
                Box::new(move |c| {
                    c.requests_per_minute = requests_per_minute;
                    Ok(())
                }),
            )
            .await?;
        Ok(client)
    }

    // -------------------------------------------------------------------------
    // Keys
    // -------------------------------------------------------------------------

    /// Issue a new key. `ttl = None` uses the configured default lifetime.
    pub async fn issue_key(&self, client_id: Uuid, ttl: Option<Duration>) -> ApiResult<IssuedKey> {
        // Client must exist
        self.get_client(client_id).await?;

        let issued = self.mint_key(client_id, ttl, self.time.now());
        self.store.insert_key(issued.key.clone()).await?;
        info!(
            client_id = %client_id,
            key_id = %issued.key.id,
            expires_at = ?issued.key.expires_at,
            "API key issued"
        );

        Ok(issued)
    }

    /// Replace a key. The old key stays valid for the rotation grace window.
    pub async fn rotate_key(&self, key_id: Uuid) -> ApiResult<IssuedKey> {
        let current = self.get_key(key_id).await?;
        let now = self.time.now();

        let issued = self.mint_key(current.client_id, None, now);
        let new_key_id = issued.key.id;
        let grace_end = add_duration(now, self.config.rotation_grace);

        // Retiring the old key is the commit point. A key already replaced
        // is in its grace window and cannot be rotated a second time.
        let old = self
            .store
            .modify_key(
                key_id,
                Box::new(move |k| {
                    ensure_usable(k, now)?;
                    if k.replaced_by.is_some() {
                        return Err(ApiError::key_revoked());
                    }
                    k.revoked_at = Some(match k.expires_at {
                        Some(exp) if exp < grace_end => exp,
                        _ => grace_end,
                    });
                    k.replaced_by = Some(new_key_id);
                    Ok(())
                }),
            )
            .await?;

        if let Err(e) = self.store.insert_key(issued.key.clone()).await {
            error!(old_key_id = %old.id, new_key_id = %new_key_id, error = %e, "Failed to store rotated key");
            return Err(e.into());
        }

        info!(
            client_id = %old.client_id,
            old_key_id = %old.id,
            new_key_id = %new_key_id,
            old_key_valid_until = ?old.revoked_at,
            "API key rotated"
        );
        Ok(issued)
    }

    /// Revoke a key immediately
    pub async fn revoke_key(&self, key_id: Uuid) -> ApiResult<ApiKey> {
        let now = self.time.now();

        let key = self
            .store
            .modify_key(
                key_id,
                Box::new(move |k| {
                    // Pull a pending grace-window revocation forward
                    if !matches!(k.revoked_at, Some(at) if at <= now) {
                        k.revoked_at = Some(now);
                    }
                    Ok(())
                }),
            )
            .await?;

        info!(client_id = %key.client_id, key_id = %key.id, "API key revoked");
        Ok(key)
    }

    pub async fn get_key(&self, key_id: Uuid) -> ApiResult<ApiKey> {
        self.store
            .get_key(key_id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("key {}", key_id)))
    }

    pub async fn list_keys(&self, client_id: Uuid) -> ApiResult<Vec<ApiKey>> {
        self.get_client(client_id).await?;
        Ok(self.store.list_keys(client_id).await?)
    }

    fn mint_key(&self, client_id: Uuid, ttl: Option<Duration>, now: DateTime<Utc>) -> IssuedKey {
        let ttl = ttl.or(self.config.default_ttl);
        let material = generate_key(&self.config.key_prefix);

        IssuedKey {
            key: ApiKey {
                id: Uuid::new_v4(),
                client_id,
                lookup: material.lookup,
                key_hash: material.hash,
                created_at: now,
                expires_at: ttl.map(|t| add_duration(now, t)),
                revoked_at: None,
                last_used_at: None,
                replaced_by: None,
            },
            plaintext: material.plaintext,
        }
    }

    // -------------------------------------------------------------------------
    // Whitelist
    // -------------------------------------------------------------------------

    /// Add a whitelist entry. The pattern is trimmed, validated and checked
    /// for textual duplicates before it is stored.
    ///
    /// Exact entries match textually. One not written in canonical form
    /// (e.g. `2001:0db8::7`) is accepted but logged, since peer addresses
    /// are always rendered canonically and will never equal it.
    pub async fn add_whitelist_entry(
        &self,
        client_id: Uuid,
        pattern: &str,
        description: Option<String>,
    ) -> ApiResult<IpWhitelistEntry> {
        let pattern = pattern.trim();
        let parsed = match WhitelistPattern::parse(pattern) {
            Ok(parsed) => parsed,
            Err(reason) => {
                warn!(client_id = %client_id, pattern, error = %reason, "Rejected whitelist pattern");
                return Err(ApiError::invalid_pattern(pattern, reason));
            }
        };

        if !parsed.is_canonical() {
            warn!(
                client_id = %client_id,
                pattern,
                canonical = %parsed.canonical_text(),
                "Exact whitelist entry is not in canonical form and will only match that exact text"
            );
        }

        let entry = IpWhitelistEntry {
            id: Uuid::new_v4(),
            pattern: pattern.to_string(),
            description,
            created_at: self.time.now(),
        };
        let max = self.config.max_whitelist_entries;
        let stored = entry.clone();

        self.store
            .modify_client(
                client_id,
                Box::new(move |c| {
                    if c.has_pattern(&stored.pattern) {
                        return Err(ApiError::duplicate_entry(&stored.pattern));
                    }
                    if c.whitelist.len() >= max {
                        return Err(ApiError::whitelist_full(max));
                    }
                    c.whitelist.push(stored);
                    Ok(())
                }),
            )
            .await?;

        info!(client_id = %client_id, entry_id = %entry.id, pattern = %entry.pattern, "Whitelist entry added");
        Ok(entry)
    }

    pub async fn remove_whitelist_entry(
        &self,
        client_id: Uuid,
        entry_id: Uuid,
    ) -> ApiResult<IpWhitelistEntry> {
        let not_found = move || ApiError::not_found(format!("whitelist entry {}", entry_id));

        // Entries are immutable once added, so the copy read here is what
        // the edit below removes.
        let removed = self
            .get_client(client_id)
            .await?
            .whitelist
            .into_iter()
            .find(|e| e.id == entry_id)
            .ok_or_else(not_found)?;

        self.store
            .modify_client(
                client_id,
                Box::new(move |c| {
                    let position = c
                        .whitelist
                        .iter()
                        .position(|e| e.id == entry_id)
                        .ok_or_else(not_found)?;
                    c.whitelist.remove(position);
                    Ok(())
                }),
            )
            .await?;

        info!(client_id = %client_id, entry_id = %entry_id, pattern = %removed.pattern, "Whitelist entry removed");
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------

    /// Authenticate a presented key from `source_ip`.
    ///
    /// IPv4-mapped IPv6 sources (`::ffff:a.b.c.d`) are checked as the IPv4
    /// address they carry.
    pub async fn authenticate(
        &self,
        raw_key: &str,
        source_ip: IpAddr,
    ) -> ApiResult<AuthenticatedClient> {
        let now = self.time.now();
        let source_ip = source_ip.to_canonical();

        let lookup = keys::lookup_segment(raw_key, &self.config.key_prefix)
            .ok_or_else(ApiError::invalid_api_key)?;

        let key = self
            .store
            .find_keys_by_lookup(lookup)
            .await?
            .into_iter()
            .find(|k| keys::verify_key(raw_key, &k.key_hash))
            .ok_or_else(ApiError::invalid_api_key)?;

        if let Err(e) = ensure_usable(&key, now) {
            debug!(key_id = %key.id, code = ?e.code, "Unusable API key presented");
            return Err(e);
        }

        let client = self
            .store
            .get_client(key.client_id)
            .await?
            .ok_or_else(ApiError::invalid_api_key)?;

        if !client.is_active {
            return Err(ApiError::client_disabled());
        }

        let whitelist = client.compiled_whitelist();
        let verdict = whitelist.check(&source_ip.to_string());

        if !verdict.permits(self.empty_whitelist.allows_empty()) {
            warn!(
                client_id = %client.id,
                key_id = %key.id,
                source_ip = %source_ip,
                entries = whitelist.len(),
                "Source address not whitelisted"
            );
            return Err(ApiError::ip_not_allowed(Some(source_ip)));
        }

        let matched_entry = match verdict {
            WhitelistVerdict::Allowed { matched } => Some(matched),
            _ => None,
        };

        // Only `last_used_at` is written, and only if the key is still
        // usable: a revocation that landed since the lookup wins.
        let key_id = key.id;
        self.store
            .modify_key(
                key_id,
                Box::new(move |k| {
                    ensure_usable(k, now)?;
                    k.last_used_at = Some(now);
                    Ok(())
                }),
            )
            .await?;

        debug!(
            client_id = %client.id,
            key_id = %key_id,
            source_ip = %source_ip,
            matched_entry = ?matched_entry,
            "API key authenticated"
        );

        Ok(AuthenticatedClient {
            client_id: client.id,
            client_name: client.name,
            key_id,
            source_ip,
            requests_per_minute: client.requests_per_minute,
            matched_entry,
        })
    }
}

fn ensure_usable(key: &ApiKey, now: DateTime<Utc>) -> ApiResult<()> {
    match key.status_at(now) {
        KeyStatus::Active => Ok(()),
        KeyStatus::Expired => Err(ApiError::key_expired()),
        KeyStatus::Revoked => Err(ApiError::key_revoked()),
    }
}

fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
