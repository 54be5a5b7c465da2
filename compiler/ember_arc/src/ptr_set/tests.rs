use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;

#[test]
fn empty_construction_returns_the_singleton() {
    let mut f: PtrSetFactory<u32> = PtrSetFactory::new();
    assert_eq!(f.get(&[]), PtrSet::EMPTY);
    assert!(PtrSet::EMPTY.is_empty());
    assert_eq!(f.elements(PtrSet::EMPTY), &[] as &[u32]);
    assert_eq!(f.num_sets(), 0);
}

/// Equal contents from independent constructions yield the same handle.
#[test]
fn sets_are_uniqued() {
    let mut f: PtrSetFactory<u32> = PtrSetFactory::new();
    let a = f.get(&[1, 3, 5]);
    let b = f.get(&[1, 3, 5]);
    let c = f.get(&[1, 3]);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(f.num_sets(), 2);
}

#[test]
fn merge_reuses_inputs() {
    let mut f: PtrSetFactory<u32> = PtrSetFactory::new();
    let big = f.get(&[1, 2, 3]);
    let small = f.get(&[2]);
    assert_eq!(f.merge(big, PtrSet::EMPTY), big);
    assert_eq!(f.merge(PtrSet::EMPTY, small), small);
    assert_eq!(f.merge(big, small), big);
    assert_eq!(f.merge(small, big), big);
    assert_eq!(f.num_sets(), 2);

    let other = f.get(&[0, 4]);
    let union = f.merge(big, other);
    assert_eq!(f.elements(union), &[0, 1, 2, 3, 4]);
    assert_eq!(f.get(&[0, 1, 2, 3, 4]), union);
}

#[test]
fn count_and_intersection() {
    let mut f: PtrSetFactory<u32> = PtrSetFactory::new();
    let a = f.get(&[1, 4, 9]);
    let b = f.get(&[2, 3, 10]);
    let c = f.get(&[9, 11]);
    assert_eq!(f.count(a, &4), 1);
    assert_eq!(f.count(a, &5), 0);
    assert!(f.has_empty_intersection(a, b));
    assert!(!f.has_empty_intersection(a, c));
    assert!(f.has_empty_intersection(a, PtrSet::EMPTY));
}

#[test]
fn clear_starts_a_new_epoch() {
    let mut f: PtrSetFactory<u32> = PtrSetFactory::new();
    let before = f.get(&[7]);
    f.clear();
    let after = f.get(&[7]);
    assert_ne!(before, after);
    assert_eq!(f.elements(after), &[7]);
    assert_eq!(f.num_sets(), 1);
}

fn sorted_unique(mut v: Vec<u16>) -> Vec<u16> {
    v.sort_unstable();
    v.dedup();
    v
}

proptest! {
    /// Elements of a merge are exactly the sorted union of the inputs.
    #[test]
    fn merge_is_sorted_union(
        a in proptest::collection::vec(0u16..64, 0..16),
        b in proptest::collection::vec(0u16..64, 0..16),
    ) {
        let a = sorted_unique(a);
        let b = sorted_unique(b);
        let mut f: PtrSetFactory<u16> = PtrSetFactory::new();
        let sa = f.get(&a);
        let sb = f.get(&b);
        let merged = f.merge(sa, sb);

        let mut expected = a.clone();
        expected.extend_from_slice(&b);
        let expected = sorted_unique(expected);
        prop_assert_eq!(f.elements(merged), expected.as_slice());
        prop_assert_eq!(f.get(&expected), merged);
        prop_assert_eq!(f.merge(sb, sa), merged);
    }

    /// Intersection emptiness agrees with a naive check.
    #[test]
    fn empty_intersection_matches_naive(
        a in proptest::collection::vec(0u16..32, 0..12),
        b in proptest::collection::vec(0u16..32, 0..12),
    ) {
        let a = sorted_unique(a);
        let b = sorted_unique(b);
        let mut f: PtrSetFactory<u16> = PtrSetFactory::new();
        let sa = f.get(&a);
        let sb = f.get(&b);
        let naive = a.iter().all(|x| !b.contains(x));
        prop_assert_eq!(f.has_empty_intersection(sa, sb), naive);
    }
}
