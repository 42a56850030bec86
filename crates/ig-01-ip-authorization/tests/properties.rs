//! # Property Tests for IP Authorization (ig-01)
//!
//! 1. **Order independence** - permuting a whitelist never changes the decision
//! 2. **Full-width blocks** - `ip/32` and `ip/128` behave as exact matches
//! 3. **Purity** - repeated calls agree
//! 4. **Totality** - arbitrary strings never panic and malformed input is rejected

use ig_01_ip_authorization::{
    is_authorized, is_in_range, is_valid_pattern, CidrBlock, IpWhitelist, MatchRequest,
};
use proptest::prelude::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

// =============================================================================
// STRATEGIES
// =============================================================================

fn any_ipv4() -> impl Strategy<Value = IpAddr> {
    any::<[u8; 4]>().prop_map(|o| IpAddr::V4(Ipv4Addr::from(o)))
}

fn any_ipv6() -> impl Strategy<Value = IpAddr> {
    any::<[u8; 16]>().prop_map(|o| IpAddr::V6(Ipv6Addr::from(o)))
}

fn any_ip() -> impl Strategy<Value = IpAddr> {
    prop_oneof![any_ipv4(), any_ipv6()]
}

fn any_entry() -> impl Strategy<Value = String> {
    prop_oneof![
        any_ip().prop_map(|ip| ip.to_string()),
        (any_ipv4(), 0u8..=32).prop_map(|(ip, p)| format!("{}/{}", ip, p)),
        (any_ipv6(), 0u8..=128).prop_map(|(ip, p)| format!("{}/{}", ip, p)),
        "[a-z0-9./:]{0,12}",
    ]
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #[test]
    fn prop_order_independent(
        source in any_ip(),
        mut whitelist in prop::collection::vec(any_entry(), 0..8),
        rotate_by in 0usize..8,
    ) {
        let source = source.to_string();
        let forward = is_authorized(&MatchRequest::new(&source, &whitelist));

        if !whitelist.is_empty() {
            let n = rotate_by % whitelist.len();
            whitelist.rotate_left(n);
        }
        let rotated = is_authorized(&MatchRequest::new(&source, &whitelist));

        whitelist.reverse();
        let reversed = is_authorized(&MatchRequest::new(&source, &whitelist));

        prop_assert_eq!(forward, rotated);
        prop_assert_eq!(forward, reversed);
    }

    #[test]
    fn prop_full_width_block_is_exact(ip in any_ip()) {
        let width = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let text = ip.to_string();
        let block = format!("{}/{}", text, width);
        prop_assert!(is_valid_pattern(&block));
        prop_assert!(is_in_range(&text, &block));
        prop_assert!(is_in_range(&text, &text));
    }

    #[test]
    fn prop_zero_prefix_matches_same_family(a in any_ipv4(), b in any_ipv4(), c in any_ipv6()) {
        let block = format!("{}/0", a);
        prop_assert!(is_in_range(&b.to_string(), &block));
        prop_assert!(!is_in_range(&c.to_string(), &block));
    }

    #[test]
    fn prop_cidr_agrees_with_integer_mask(a in any::<u32>(), b in any::<u32>(), prefix in 0u8..=32) {
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) };
        let expected = (a & mask) == (b & mask);

        let network = Ipv4Addr::from(a).to_string();
        let candidate = Ipv4Addr::from(b).to_string();
        prop_assert_eq!(is_in_range(&candidate, &format!("{}/{}", network, prefix)), expected);
    }

    #[test]
    fn prop_pure(source in any_ip(), entry in any_entry()) {
        let source = source.to_string();
        prop_assert_eq!(is_in_range(&source, &entry), is_in_range(&source, &entry));
    }

    #[test]
    fn prop_total_on_arbitrary_strings(a in ".{0,48}", b in ".{0,48}") {
        let valid = is_valid_pattern(&b);
        let matched = is_in_range(&a, &b);
        if matched {
            prop_assert!(valid);
        }
    }

    #[test]
    fn prop_validator_agrees_with_block_parser(ip in any_ip(), prefix in 0u32..=200) {
        let width = match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let pattern = format!("{}/{}", ip, prefix);
        prop_assert_eq!(is_valid_pattern(&pattern), prefix <= width);
        prop_assert_eq!(CidrBlock::parse(&pattern).is_ok(), prefix <= width);
    }

    #[test]
    fn prop_compiled_whitelist_agrees(
        source in any_ip(),
        whitelist in prop::collection::vec(any_entry(), 1..8),
    ) {
        let source = source.to_string();
        let compiled = IpWhitelist::compile(&whitelist);
        prop_assert_eq!(
            compiled.check(&source).permits(false),
            is_authorized(&MatchRequest::new(&source, &whitelist))
        );
    }
}

#[test]
fn test_documented_examples() {
    assert!(!is_valid_pattern(""));
    assert!(!is_valid_pattern("   "));
    assert!(is_valid_pattern("192.168.1.1"));
    assert!(is_valid_pattern("192.168.1.1/24"));
    assert!(!is_valid_pattern("192.168.1.1/33"));
    assert!(is_valid_pattern("2001:db8::1"));
    assert!(!is_valid_pattern("2001:db8::1/129"));
    assert!(is_valid_pattern("2001:db8::1/128"));
    assert!(!is_valid_pattern("10.0.0.1/24/8"));

    assert!(is_in_range("192.168.1.5", "192.168.1.0/24"));
    assert!(!is_in_range("192.168.2.5", "192.168.1.0/24"));
    assert!(is_in_range("192.168.1.1", "192.168.1.1"));
    assert!(!is_in_range("192.168.1.1", "192.168.1.2"));
    assert!(!is_in_range("10.0.0.1", "::1/64"));
    assert!(is_in_range("10.0.0.5", "10.0.0.0/0"));
}

#[test]
fn test_concurrent_callers() {
    let whitelist: Vec<String> = vec!["10.0.0.0/8".into(), "2001:db8::/32".into()];

    std::thread::scope(|scope| {
        for i in 0..8u8 {
            let whitelist = &whitelist;
            scope.spawn(move || {
                let inside = format!("10.{}.0.1", i);
                let outside = format!("11.{}.0.1", i);
                for _ in 0..1000 {
                    assert!(is_authorized(&MatchRequest::new(&inside, whitelist)));
                    assert!(!is_authorized(&MatchRequest::new(&outside, whitelist)));
                }
            });
        }
    });
}
