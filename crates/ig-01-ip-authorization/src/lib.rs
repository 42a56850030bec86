//! # IG-01 IP Authorization
//!
//! IP whitelist matching for integration API credentials.
//!
//! ## Operations
//!
//! - [`is_valid_pattern`]: validates an entry before it is stored
//! - [`is_in_range`]: matches one source address against one entry
//! - [`is_authorized`]: OR across a credential's entries
//!
//! Entries are exact addresses (`203.0.113.7`, `2001:db8::1`) or CIDR
//! blocks (`10.0.0.0/8`, `2001:db8::/32`). Exact entries are compared as
//! text, ignoring ASCII case; CIDR entries are compared octet by octet up
//! to the prefix length.
//!
//! ## Invariants
//!
//! - Malformed input never matches and never panics.
//! - IPv4 and IPv6 never match each other.
//! - The decision does not depend on entry order.
//! - An empty whitelist is reported, not decided: see
//!   [`WhitelistVerdict::NoEntries`].
//!
//! ## Usage
//!
//! ```
//! use ig_01_ip_authorization::{is_authorized, is_valid_pattern, MatchRequest};
//!
//! assert!(is_valid_pattern("10.0.0.0/8"));
//!
//! let whitelist = vec!["10.0.0.0/8".to_string(), "192.168.1.1".to_string()];
//! assert!(is_authorized(&MatchRequest::new("10.4.5.6", &whitelist)));
//! assert!(!is_authorized(&MatchRequest::new("192.168.1.2", &whitelist)));
//! ```
//!
//! Everything here is synchronous and stateless; call it from any thread.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod error;

pub use domain::{
    is_authorized, is_in_range, is_valid_pattern, AddressFamily, CidrBlock, IpWhitelist,
    MatchRequest, WhitelistPattern, WhitelistVerdict,
};
pub use error::{PatternError, PatternResult};
