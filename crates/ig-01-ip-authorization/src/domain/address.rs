//! Address parsing and family helpers.

use crate::error::{PatternError, PatternResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// IPv4 address width in bits
pub const IPV4_BITS: u8 = 32;

/// IPv6 address width in bits
pub const IPV6_BITS: u8 = 128;

/// Address family of a parsed address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Family of an address
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Full width in bits (32 or 128)
    pub fn bits(self) -> u8 {
        match self {
            AddressFamily::V4 => IPV4_BITS,
            AddressFamily::V6 => IPV6_BITS,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::V4 => write!(f, "IPv4"),
            AddressFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Try-parse an IPv4 or IPv6 address.
///
/// Empty and whitespace-only input is rejected. Surrounding whitespace is not
/// stripped: `" 10.0.0.1"` is not an address.
pub fn parse_address(input: &str) -> PatternResult<IpAddr> {
    if input.trim().is_empty() {
        return Err(PatternError::Empty);
    }

    input
        .parse::<IpAddr>()
        .map_err(|_| PatternError::InvalidAddress(input.to_string()))
}

/// Address octets: 4 for IPv4, 16 for IPv6
pub fn address_octets(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}
