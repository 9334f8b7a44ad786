//! Randomized AVL balance/count invariant checks for `List` (spec.md §8
//! seed scenario 6: "insert 1,000 random keys via `append_last`/`insert_at`,
//! delete 500 random indices; after every 100 operations, validate AVL
//! balance and count invariants").

use protobase_core::value::Value;
use protobase_primitives::List;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn randomized_mutations_preserve_avl_invariants() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut list = List::new();

    for i in 0..1000u32 {
        if list.is_empty() || rng.gen_bool(0.5) {
            list = list.append_last(Value::Int(i as i64));
        } else {
            let index = rng.gen_range(0..=list.len()) as i64;
            list = list.insert_at(index, Value::Int(i as i64));
        }
        if (i + 1) % 100 == 0 {
            assert!(list.check_invariants(), "invariants broken after insert {i}");
        }
    }

    for i in 0..500u32 {
        if list.is_empty() {
            break;
        }
        let index = rng.gen_range(0..list.len()) as i64;
        list = list.remove_at(index);
        if (i + 1) % 100 == 0 {
            assert!(list.check_invariants(), "invariants broken after removal {i}");
        }
    }

    assert!(list.check_invariants());
}

#[test]
fn random_seeds_never_unbalance_a_list() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut list = List::new();
        for i in 0..300u32 {
            let index = if list.is_empty() { 0 } else { rng.gen_range(0..=list.len()) as i64 };
            list = list.insert_at(index, Value::Int(i as i64));
        }
        assert!(list.check_invariants(), "seed {seed} produced an unbalanced tree");
    }
}
