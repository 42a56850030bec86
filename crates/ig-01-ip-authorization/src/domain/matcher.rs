//! Single-entry range matching.

use crate::domain::pattern::WhitelistPattern;

/// Whether `candidate_ip` is permitted by a single whitelist `pattern`.
///
/// - Blank or unparseable input on either side: `false`.
/// - Pattern without `/`: ASCII case-insensitive text equality.
/// - Pattern with `/`: octet-wise prefix comparison; mixed families are
///   always `false`.
pub fn is_in_range(candidate_ip: &str, pattern: &str) -> bool {
    if candidate_ip.trim().is_empty() || pattern.trim().is_empty() {
        return false;
    }

    match WhitelistPattern::parse(pattern) {
        Ok(parsed) => parsed.matches_str(candidate_ip),
        Err(_) => false,
    }
}
