//! Error types for whitelist pattern parsing.
//!
//! These never cross the public predicate boundary: `is_valid_pattern`,
//! `is_in_range` and `is_authorized` collapse every error to `false`. They
//! exist so callers that want a reason (e.g. an admin form) can get one.

use thiserror::Error;

/// Why a whitelist pattern or address failed to parse
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("CIDR pattern needs exactly one '/' separator, found {count}")]
    SeparatorCount { count: usize },

    #[error("invalid prefix length: {0}")]
    InvalidPrefix(String),

    #[error("prefix length {prefix} exceeds {max} for this address family")]
    PrefixOutOfRange { prefix: u32, max: u8 },
}

/// Result alias for pattern parsing
pub type PatternResult<T> = Result<T, PatternError>;
