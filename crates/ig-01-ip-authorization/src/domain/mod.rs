//! Domain Layer - whitelist parsing and matching
//!
//! RULES:
//! - No I/O operations
//! - No async code
//! - Every public predicate is total and returns `false` on malformed input

pub mod address;
pub mod cidr;
pub mod decision;
pub mod matcher;
pub mod pattern;

pub use address::{parse_address, AddressFamily, IPV4_BITS, IPV6_BITS};
pub use cidr::{prefix_matches, CidrBlock};
pub use decision::{is_authorized, IpWhitelist, MatchRequest, WhitelistVerdict};
pub use matcher::is_in_range;
pub use pattern::{is_valid_pattern, WhitelistPattern};
