use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{b, cfg_func};

#[test]
fn diamond_orders_and_dominance() {
    // B0 → B1, B0 → B2, B1 → B3, B2 → B3
    let func = cfg_func(&[&[1, 2], &[3], &[3], &[]]);
    let cfg = Cfg::build(&func);
    let dom = DominatorTree::build(&func, &cfg);

    assert_eq!(cfg.preds(b(3)), &[b(1), b(2)]);
    assert_eq!(cfg.succs(b(0)), &[b(1), b(2)]);
    assert_eq!(cfg.postorder().last(), Some(&b(0)));
    assert_eq!(cfg.reverse_postorder().next(), Some(b(0)));
    assert_eq!(cfg.reverse_postorder().last(), Some(b(3)));

    assert!(dom.dominates(b(0), b(3)));
    assert!(!dom.dominates(b(1), b(3)));
    assert!(!dom.dominates(b(2), b(3)));
    assert_eq!(dom.idom(b(3)), Some(b(0)));
    assert_eq!(dom.idom(b(1)), Some(b(0)));
    assert_eq!(dom.idom(b(0)), None);
}

#[test]
fn loop_back_edge_is_retreating() {
    // B0 → B1, B1 → B2 | B3, B2 → B1
    let func = cfg_func(&[&[1], &[2, 3], &[1], &[]]);
    let cfg = Cfg::build(&func);
    let dom = DominatorTree::build(&func, &cfg);

    assert!(cfg.is_retreating_edge(b(2), b(1)));
    assert!(!cfg.is_retreating_edge(b(1), b(2)));
    assert!(dom.dominates(b(1), b(2)));
    assert!(dom.dominates(b(1), b(3)));
    assert_eq!(cfg.single_pred(b(2)), Some(b(1)));
    assert_eq!(cfg.single_pred(b(1)), None);
}

#[test]
fn unreachable_blocks_are_excluded() {
    // B2 has no predecessor.
    let func = cfg_func(&[&[1], &[], &[1]]);
    let cfg = Cfg::build(&func);
    let dom = DominatorTree::build(&func, &cfg);

    assert!(!cfg.is_reachable(b(2)));
    assert_eq!(cfg.postorder(), &[b(1), b(0)]);
    assert!(!dom.is_reachable(b(2)));
    assert!(!dom.dominates(b(0), b(2)));
    assert!(dom.dominates(b(2), b(2)));
}

#[test]
fn duplicate_edges_are_collapsed() {
    let func = cfg_func(&[&[1, 1], &[]]);
    let cfg = Cfg::build(&func);
    assert_eq!(cfg.succs(b(0)), &[b(1)]);
    assert_eq!(cfg.preds(b(1)), &[b(0)]);
}
