//! Whitelist patterns: an exact address or a CIDR block.

use crate::domain::address::parse_address;
use crate::domain::cidr::CidrBlock;
use crate::error::{PatternError, PatternResult};
use std::fmt;
use std::net::IpAddr;

/// A parsed whitelist entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistPattern {
    /// Bare address. Matching is textual (ASCII case-insensitive), so the
    /// original text is kept alongside the parsed address.
    Exact { text: String, addr: IpAddr },
    /// `address/prefix` block
    Cidr(CidrBlock),
}

impl WhitelistPattern {
    /// Try-parse a pattern.
    ///
    /// Any `/` routes the input to CIDR parsing, which requires exactly one.
    pub fn parse(input: &str) -> PatternResult<Self> {
        if input.trim().is_empty() {
            return Err(PatternError::Empty);
        }

        if input.contains('/') {
            return CidrBlock::parse(input).map(WhitelistPattern::Cidr);
        }

        let addr = parse_address(input)?;
        Ok(WhitelistPattern::Exact {
            text: input.to_string(),
            addr,
        })
    }

    /// Match a candidate given as text, failing closed on unparseable input
    pub fn matches_str(&self, candidate: &str) -> bool {
        match parse_address(candidate) {
            Ok(addr) => self.matches(candidate, &addr),
            Err(_) => false,
        }
    }

    /// Match a candidate already parsed by the caller.
    ///
    /// `candidate_text` must be the text `candidate` was parsed from; the
    /// exact path compares text, not addresses.
    pub fn matches(&self, candidate_text: &str, candidate: &IpAddr) -> bool {
        match self {
            WhitelistPattern::Exact { text, .. } => text.eq_ignore_ascii_case(candidate_text),
            WhitelistPattern::Cidr(block) => block.contains(candidate),
        }
    }

    pub fn is_cidr(&self) -> bool {
        matches!(self, WhitelistPattern::Cidr(_))
    }

    /// Whether an exact pattern is written the way addresses are rendered
    /// (`IpAddr` display form, any ASCII case).
    ///
    /// A non-canonical exact pattern such as `2001:0db8::7` is valid but
    /// only matches a candidate spelled the same way, which rendered peer
    /// addresses never are. CIDR patterns are always canonical.
    pub fn is_canonical(&self) -> bool {
        match self {
            WhitelistPattern::Exact { text, addr } => {
                text.eq_ignore_ascii_case(&addr.to_string())
            }
            WhitelistPattern::Cidr(_) => true,
        }
    }

    /// The pattern rewritten in canonical form
    pub fn canonical_text(&self) -> String {
        match self {
            WhitelistPattern::Exact { addr, .. } => addr.to_string(),
            WhitelistPattern::Cidr(block) => block.to_string(),
        }
    }
}

impl fmt::Display for WhitelistPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhitelistPattern::Exact { text, .. } => write!(f, "{}", text),
            WhitelistPattern::Cidr(block) => write!(f, "{}", block),
        }
    }
}

/// Whether `input` is a well-formed whitelist pattern.
///
/// Total: never panics, returns `false` for anything not affirmatively valid.
pub fn is_valid_pattern(input: &str) -> bool {
    WhitelistPattern::parse(input).is_ok()
}
