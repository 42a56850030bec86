//! API clients, their keys and their IP whitelists.

use chrono::{DateTime, Utc};
use ig_01_ip_authorization::IpWhitelist;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use uuid::Uuid;

/// An integration partner allowed to call the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiClient {
    pub id: Uuid,
    pub name: String,
    /// Customer or dealer account the client acts for
    pub owner: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Per-client override of the configured rate limit
    pub requests_per_minute: Option<u32>,
    pub whitelist: Vec<IpWhitelistEntry>,
}

impl ApiClient {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner: owner.into(),
            is_active: true,
            created_at: now,
            requests_per_minute: None,
            whitelist: Vec::new(),
        }
    }

    /// Parse the whitelist for matching, in insertion order
    pub fn compiled_whitelist(&self) -> IpWhitelist {
        IpWhitelist::compile(self.whitelist.iter().map(|e| e.pattern.as_str()))
    }

    /// Textual duplicate check, ignoring ASCII case
    pub fn has_pattern(&self, pattern: &str) -> bool {
        self.whitelist
            .iter()
            .any(|e| e.pattern.eq_ignore_ascii_case(pattern))
    }
}

/// One permitted source pattern (exact address or CIDR block)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpWhitelistEntry {
    pub id: Uuid,
    pub pattern: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stored API key. The secret itself is never kept, only its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub client_id: Uuid,
    /// Leading secret characters, used to find candidate keys
    pub lookup: String,
    /// SHA-256 of the full key, hex encoded
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Revocation instant; may lie in the future during a rotation grace window
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Key issued to replace this one
    pub replaced_by: Option<Uuid>,
}

/// Lifecycle state of a key at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Expired,
    Revoked,
}

impl ApiKey {
    pub fn status_at(&self, now: DateTime<Utc>) -> KeyStatus {
        if matches!(self.revoked_at, Some(at) if at <= now) {
            return KeyStatus::Revoked;
        }
        if matches!(self.expires_at, Some(at) if at <= now) {
            return KeyStatus::Expired;
        }
        KeyStatus::Active
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.status_at(now) == KeyStatus::Active
    }
}

/// A freshly issued key. `plaintext` is shown to the operator once.
#[derive(Clone)]
pub struct IssuedKey {
    pub key: ApiKey,
    pub plaintext: String,
}

impl fmt::Debug for IssuedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedKey")
            .field("key", &self.key)
            .field("plaintext", &"<redacted>")
            .finish()
    }
}

/// Identity attached to a request that passed authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedClient {
    pub client_id: Uuid,
    pub client_name: String,
    pub key_id: Uuid,
    pub source_ip: IpAddr,
    pub requests_per_minute: Option<u32>,
    /// Whitelist entry that admitted the request (None when the whitelist was empty)
    pub matched_entry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ig_01_ip_authorization::WhitelistVerdict;

    fn key(now: DateTime<Utc>) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            lookup: "abcd1234".into(),
            key_hash: "00".into(),
            created_at: now,
            expires_at: None,
            revoked_at: None,
            last_used_at: None,
            replaced_by: None,
        }
    }

    #[test]
    fn test_key_status() {
        let now = Utc::now();
        let mut k = key(now);
        assert_eq!(k.status_at(now), KeyStatus::Active);

        k.expires_at = Some(now + Duration::hours(1));
        assert!(k.is_usable_at(now));
        assert_eq!(k.status_at(now + Duration::hours(1)), KeyStatus::Expired);

        // Revocation wins over expiry
        k.revoked_at = Some(now + Duration::minutes(30));
        assert!(k.is_usable_at(now));
        assert_eq!(k.status_at(now + Duration::hours(2)), KeyStatus::Revoked);
    }

    #[test]
    fn test_has_pattern_ignores_case() {
        let now = Utc::now();
        let mut client = ApiClient::new("erp", "dealer-42", now);
        client.whitelist.push(IpWhitelistEntry {
            id: Uuid::new_v4(),
            pattern: "2001:DB8::/32".into(),
            description: None,
            created_at: now,
        });

        assert!(client.has_pattern("2001:db8::/32"));
        assert!(!client.has_pattern("2001:db8::/48"));

        let compiled = client.compiled_whitelist();
        assert_eq!(compiled.len(), 1);
        assert_eq!(
            compiled.check("2001:db8:5::1"),
            WhitelistVerdict::Allowed {
                matched: "2001:DB8::/32".into(),
            }
        );
    }

    #[test]
    fn test_issued_key_debug_redacts() {
        let issued = IssuedKey {
            key: key(Utc::now()),
            plaintext: "ig_live_secret".into(),
        };
        let debug = format!("{:?}", issued);
        assert!(!debug.contains("ig_live_secret"));
        assert!(debug.contains("redacted"));
    }
}
