//! CIDR blocks and prefix containment.
//!
//! Containment compares the network and candidate octets up to the prefix
//! length: whole bytes first, then the single partially covered byte under
//! a left-aligned mask. Host bits in the network address are ignored, so
//! `192.168.1.77/24` and `192.168.1.0/24` describe the same block.

use crate::domain::address::{address_octets, parse_address, AddressFamily};
use crate::error::{PatternError, PatternResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A parsed `address/prefix` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrBlock {
    /// Build a block, checking the prefix against the address family width
    pub fn new(network: IpAddr, prefix_len: u8) -> PatternResult<Self> {
        let max = AddressFamily::of(&network).bits();
        if prefix_len > max {
            return Err(PatternError::PrefixOutOfRange {
                prefix: u32::from(prefix_len),
                max,
            });
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// Parse `address/prefix`. Exactly one `/` is required.
    pub fn parse(input: &str) -> PatternResult<Self> {
        if input.trim().is_empty() {
            return Err(PatternError::Empty);
        }

        let separators = input.matches('/').count();
        if separators != 1 {
            return Err(PatternError::SeparatorCount { count: separators });
        }

        let (addr_part, prefix_part) = input
            .split_once('/')
            .ok_or(PatternError::SeparatorCount { count: 0 })?;

        let network = parse_address(addr_part)?;
        let prefix = parse_prefix(prefix_part)?;
        let max = AddressFamily::of(&network).bits();
        if prefix > u32::from(max) {
            return Err(PatternError::PrefixOutOfRange { prefix, max });
        }

        // prefix <= 128 here
        Self::new(network, prefix as u8)
    }

    pub fn network(&self) -> IpAddr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(&self.network)
    }

    /// Whether `addr` falls inside this block.
    ///
    /// Mixed families never match. A zero prefix matches every address of
    /// the same family.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        if AddressFamily::of(addr) != self.family() {
            return false;
        }

        prefix_matches(
            &address_octets(&self.network),
            &address_octets(addr),
            self.prefix_len,
        )
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

/// Compare the leading `prefix_len` bits of two equal-length octet slices.
pub fn prefix_matches(network: &[u8], candidate: &[u8], prefix_len: u8) -> bool {
    if network.len() != candidate.len() {
        return false;
    }

    let full_bytes = usize::from(prefix_len / 8);
    let remaining_bits = prefix_len % 8;

    if full_bytes > network.len() {
        return false;
    }

    if network[..full_bytes] != candidate[..full_bytes] {
        return false;
    }

    if remaining_bits == 0 {
        return true;
    }

    // A partial byte past the end means the prefix overran the width.
    let (Some(net_byte), Some(cand_byte)) = (network.get(full_bytes), candidate.get(full_bytes))
    else {
        return false;
    };

    let mask = 0xFFu8 << (8 - remaining_bits);
    (net_byte & mask) == (cand_byte & mask)
}

/// Prefix suffix: ASCII digits only, no sign, no whitespace.
fn parse_prefix(input: &str) -> PatternResult<u32> {
    if input.is_empty() || !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PatternError::InvalidPrefix(input.to_string()));
    }

    input
        .parse::<u32>()
        .map_err(|_| PatternError::InvalidPrefix(input.to_string()))
}
