//! Property-based tests for identifier pools

use proptest::prelude::*;
use std::collections::HashSet;

use crate::idgen::IdGenerator;

#[derive(Debug, Clone)]
enum PoolOp {
    Allocate,
    Free(usize),
}

fn pool_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        3 => Just(PoolOp::Allocate),
        1 => (0usize..64).prop_map(PoolOp::Free),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any interleaving of allocate/free never issues a value that is still held
    #[test]
    fn prop_never_double_issues(max in 1i64..32, ops in prop::collection::vec(pool_op(), 1..200)) {
        let idgen = IdGenerator::new("prop", 1, max).unwrap();
        let mut held: Vec<i64> = Vec::new();

        for op in ops {
            match op {
                PoolOp::Allocate => match idgen.allocate() {
                    Ok(id) => {
                        prop_assert!(!held.contains(&id));
                        prop_assert!((1..=max).contains(&id));
                        held.push(id);
                    }
                    Err(_) => prop_assert_eq!(held.len() as i64, max),
                },
                PoolOp::Free(idx) => {
                    if !held.is_empty() {
                        let id = held.swap_remove(idx % held.len());
                        prop_assert!(idgen.free(id));
                    }
                }
            }
        }

        let unique: HashSet<i64> = held.iter().copied().collect();
        prop_assert_eq!(unique.len(), held.len());
        prop_assert_eq!(idgen.in_use(), held.len());
    }

    /// A full range is exhausted after exactly `max - min + 1` allocations
    #[test]
    fn prop_exhausts_at_range_size(min in -100i64..100, span in 0i64..50) {
        let idgen = IdGenerator::new("prop", min, min + span).unwrap();
        for _ in 0..=span {
            prop_assert!(idgen.allocate().is_ok());
        }
        prop_assert!(idgen.allocate().is_err());
    }
}
