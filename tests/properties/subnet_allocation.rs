//! Property tests for reserved-block subnet allocation.

use proptest::prelude::*;

use notesctl::{allocate, DeployError, RESERVED_BLOCKS};

/// An arbitrary subset of the reserved pool, as docker would report it
fn reserved_subset() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(0usize..RESERVED_BLOCKS.len(), 0..=8).prop_map(|indexes| {
        indexes
            .into_iter()
            .map(|i| RESERVED_BLOCKS[i].to_string())
            .collect()
    })
}

fn unrelated_subnets() -> impl Strategy<Value = Vec<String>> {
    let octet = 0u8..=255;
    let subnet = (octet.clone(), octet.clone(), octet)
        .prop_map(|(a, b, c)| format!("{}.{}.{}.0/24", a, b, c))
        .prop_filter("must not fall in the reserved range", |s| {
            !(s.starts_with("172.2") || s.starts_with("172.3"))
        });
    proptest::collection::vec(subnet, 0..16)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    /// PROPERTY: Allocation never panics on arbitrary inventory strings.
    #[test]
    fn property_allocate_never_panics(
        assigned in proptest::collection::vec("(?s).{0,32}", 0..16)
    ) {
        let _ = allocate(&assigned);
    }

    /// PROPERTY: For any subset of the reserved pool, allocation returns the
    /// first candidate not in the subset, or exhaustion when none is free.
    #[test]
    fn property_first_free_candidate_wins(
        assigned in reserved_subset()
    ) {
        let expected = RESERVED_BLOCKS
            .iter()
            .find(|candidate| !assigned.iter().any(|a| a == *candidate));

        match (allocate(&assigned), expected) {
            (Ok(lease), Some(candidate)) => prop_assert_eq!(lease.subnet, *candidate),
            (Err(DeployError::SubnetExhausted { candidates }), None) => {
                prop_assert_eq!(candidates, RESERVED_BLOCKS.len());
            }
            (outcome, expected) => {
                prop_assert!(false, "mismatch: {:?} vs {:?}", outcome, expected);
            }
        }
    }

    /// PROPERTY: An allocated block never shares its /16 with any assigned
    /// subnet, and its gateway is the .1 host of the block.
    #[test]
    fn property_lease_is_disjoint_and_gateway_derives(
        assigned in reserved_subset()
    ) {
        if let Ok(lease) = allocate(&assigned) {
            let key = |s: &str| {
                s.split('.').take(2).map(str::to_string).collect::<Vec<_>>()
            };
            for taken in &assigned {
                prop_assert_ne!(key(&lease.subnet), key(taken));
            }
            let base = lease.subnet.split('/').next().unwrap();
            let expected_gateway = format!("{}.1", base.rsplit_once('.').unwrap().0);
            prop_assert_eq!(lease.gateway, expected_gateway);
        }
    }

    /// PROPERTY: Subnets outside the reserved range never affect allocation.
    #[test]
    fn property_unrelated_inventory_is_ignored(
        noise in unrelated_subnets(),
        assigned in reserved_subset()
    ) {
        let without_noise = allocate(&assigned);
        let mut mixed: Vec<String> = noise;
        mixed.extend(assigned.iter().cloned());
        let with_noise = allocate(&mixed);

        match (without_noise, with_noise) {
            (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
            (Err(_), Err(_)) => {}
            (a, b) => prop_assert!(false, "noise changed outcome: {:?} vs {:?}", a, b),
        }
    }
}
