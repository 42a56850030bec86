//! Per-credential authorization decision.
//!
//! An empty whitelist is NOT a decision this crate makes. `evaluate` reports
//! it as [`WhitelistVerdict::NoEntries`] and the calling policy layer picks
//! default-allow or default-deny. `is_authorized` is the plain OR over the
//! entries and is therefore `false` for an empty list.

use crate::domain::address::parse_address;
use crate::domain::matcher::is_in_range;
use crate::domain::pattern::WhitelistPattern;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One authorization check: a source address against a credential's entries
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub source_ip: &'a str,
    pub whitelist: &'a [String],
}

impl<'a> MatchRequest<'a> {
    pub fn new(source_ip: &'a str, whitelist: &'a [String]) -> Self {
        Self {
            source_ip,
            whitelist,
        }
    }

    /// Three-way verdict, leaving the empty case to the caller
    pub fn evaluate(&self) -> WhitelistVerdict {
        if self.whitelist.is_empty() {
            return WhitelistVerdict::NoEntries;
        }

        match self
            .whitelist
            .iter()
            .find(|entry| is_in_range(self.source_ip, entry))
        {
            Some(entry) => WhitelistVerdict::Allowed {
                matched: entry.clone(),
            },
            None => WhitelistVerdict::Denied,
        }
    }
}

/// Outcome of evaluating a whitelist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum WhitelistVerdict {
    /// The credential has no entries configured
    NoEntries,
    /// Some entry matched; `matched` is the first one in iteration order
    Allowed { matched: String },
    /// Entries exist and none matched
    Denied,
}

impl WhitelistVerdict {
    /// Resolve to a boolean, using `empty_allows` for the no-entries case
    pub fn permits(&self, empty_allows: bool) -> bool {
        match self {
            WhitelistVerdict::NoEntries => empty_allows,
            WhitelistVerdict::Allowed { .. } => true,
            WhitelistVerdict::Denied => false,
        }
    }
}

/// Whether any entry in the request's whitelist permits its source address
pub fn is_authorized(request: &MatchRequest<'_>) -> bool {
    request
        .whitelist
        .iter()
        .any(|entry| is_in_range(request.source_ip, entry))
}

/// A whitelist parsed once and checked many times.
///
/// Gives the same answers as [`MatchRequest::evaluate`] over the raw
/// strings, including the entry text reported on a match. Entries that fail
/// to parse could never match, so they are dropped at compile time (and
/// logged).
#[derive(Debug, Clone, Default)]
pub struct IpWhitelist {
    /// (entry as configured, parsed form)
    entries: Vec<(String, WhitelistPattern)>,
    rejected: usize,
}

impl IpWhitelist {
    pub fn compile<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        let mut rejected = 0;

        for entry in entries {
            let entry = entry.as_ref();
            match WhitelistPattern::parse(entry) {
                Ok(pattern) => compiled.push((entry.to_string(), pattern)),
                Err(e) => {
                    warn!(pattern = entry, error = %e, "Skipping malformed whitelist entry");
                    rejected += 1;
                }
            }
        }

        Self {
            entries: compiled,
            rejected,
        }
    }

    /// True when no entries were configured at all (valid or not)
    pub fn is_unconfigured(&self) -> bool {
        self.entries.is_empty() && self.rejected == 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped because they did not parse
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    pub fn patterns(&self) -> impl Iterator<Item = &WhitelistPattern> {
        self.entries.iter().map(|(_, pattern)| pattern)
    }

    pub fn check(&self, source_ip: &str) -> WhitelistVerdict {
        if self.is_unconfigured() {
            return WhitelistVerdict::NoEntries;
        }

        let Ok(addr) = parse_address(source_ip) else {
            return WhitelistVerdict::Denied;
        };

        match self
            .entries
            .iter()
            .find(|(_, pattern)| pattern.matches(source_ip, &addr))
        {
            Some((text, _)) => WhitelistVerdict::Allowed {
                matched: text.clone(),
            },
            None => WhitelistVerdict::Denied,
        }
    }
}
