use mesh_dofs::algs::renumbering::{check_permutation, subdomain_wise};
use mesh_dofs::prelude::*;
use proptest::prelude::*;

fn permutation(max_len: usize) -> impl Strategy<Value = Vec<DofIndex>> {
    (0..max_len).prop_flat_map(|n| Just((0..n as DofIndex).collect::<Vec<_>>()).prop_shuffle())
}

proptest! {
    #[test]
    fn inverse_undoes_permutation(p in permutation(200)) {
        prop_assert!(is_permutation(&p));
        let inv = invert(&p).unwrap();
        for (i, &pi) in p.iter().enumerate() {
            prop_assert_eq!(inv[pi as usize], i as DofIndex);
        }
        prop_assert_eq!(invert(&inv).unwrap(), p);
    }

    #[test]
    fn duplicates_are_never_permutations(p in permutation(50), a in 0usize..50, b in 0usize..50) {
        prop_assume!(p.len() > 1);
        let (a, b) = (a % p.len(), b % p.len());
        prop_assume!(a != b);
        let mut p = p;
        p[a] = p[b];
        prop_assert!(check_permutation(&p).is_err());
    }

    #[test]
    fn index_set_positions_round_trip(indices in prop::collection::vec(0u64..500, 0..120)) {
        let mut set = IndexSet::new(500);
        set.add_indices(indices.iter().copied());
        let mut unique = indices.clone();
        unique.sort_unstable();
        unique.dedup();
        prop_assert_eq!(set.n_elements(), unique.len() as u64);
        prop_assert_eq!(set.iter().collect::<Vec<_>>(), unique.clone());
        for (k, &i) in unique.iter().enumerate() {
            prop_assert_eq!(set.index_within_set(i), Some(k as u64));
            prop_assert_eq!(set.nth_index_in_set(k as u64), Some(i));
        }
        prop_assert_eq!(set.nth_index_in_set(unique.len() as u64), None);
        // ranges are sorted, disjoint and never touch
        for w in set.ranges().windows(2) {
            prop_assert!(w[0].end < w[1].start);
        }
    }

    #[test]
    fn subdomain_wise_groups_by_owner(assoc in prop::collection::vec(0u32..4, 0..80)) {
        let p = subdomain_wise(&assoc, 4);
        prop_assert!(is_permutation(&p));
        for i in 0..assoc.len() {
            for j in 0..assoc.len() {
                if (assoc[i], i) < (assoc[j], j) {
                    prop_assert!(p[i] < p[j]);
                }
            }
        }
    }
}
