use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{b, cfg_func};

fn info_for(edges: &[&[u32]]) -> LoopRegionInfo {
    let func = cfg_func(edges);
    let cfg = Cfg::build(&func);
    let dom = DominatorTree::build(&func, &cfg);
    LoopRegionInfo::build(&func, &cfg, &dom)
}

fn region_of(info: &LoopRegionInfo, block: u32) -> RegionId {
    info.block_region(b(block)).unwrap()
}

#[test]
fn straight_line_has_only_the_function_region() {
    let info = info_for(&[&[1], &[2], &[]]);
    let func_region = info.function_region();
    assert_eq!(info.containers_innermost_first(), vec![func_region]);
    let subs: Vec<_> = info
        .region(func_region)
        .subregions()
        .iter()
        .map(|&r| info.region(r).block())
        .collect();
    assert_eq!(subs, vec![Some(b(0)), Some(b(1)), Some(b(2))]);
    assert_eq!(info.region(region_of(&info, 1)).preds(), &[region_of(&info, 0)]);
}

#[test]
fn single_loop_is_summarized_as_one_subregion() {
    // B0 → B1 (header), B1 → B2 | B3, B2 → B1 (latch), B3 exit
    let info = info_for(&[&[1], &[2, 3], &[1], &[]]);
    let containers = info.containers_innermost_first();
    assert_eq!(containers.len(), 2);
    let loop_region = containers[0];
    assert_eq!(info.region(loop_region).kind(), RegionKind::Loop { header: b(1) });
    assert_eq!(info.region(loop_region).depth(), 1);

    let header = region_of(&info, 1);
    let latch = region_of(&info, 2);
    assert_eq!(info.region(loop_region).subregions(), &[header, latch]);
    assert!(info.region(latch).is_backedge_source());
    assert!(info.region(header).is_backedge_target());
    assert!(info.region(header).exits_parent());
    assert!(!info.region(latch).exits_parent());
    // The back edge is not a local edge.
    assert!(info.region(header).preds().is_empty());

    let top: Vec<_> = info.region(info.function_region()).subregions().to_vec();
    assert_eq!(top, vec![region_of(&info, 0), loop_region, region_of(&info, 3)]);
    assert_eq!(info.region(loop_region).preds(), &[region_of(&info, 0)]);
    assert_eq!(info.region(loop_region).succs(), &[region_of(&info, 3)]);
    assert_eq!(info.blocks_in(loop_region), vec![b(1), b(2)]);
}

#[test]
fn nested_loops_are_innermost_first() {
    // B0 → B1 (outer header) → B2 (inner header) → B3 | B2's exit B4
    // B3 → B2 (inner latch), B4 → B1 | B5 (outer latch / exit)
    let info = info_for(&[&[1], &[2], &[3, 4], &[2], &[1, 5], &[]]);
    let containers = info.containers_innermost_first();
    assert_eq!(containers.len(), 3);
    let inner = containers[0];
    let outer = containers[1];
    assert_eq!(info.region(inner).kind(), RegionKind::Loop { header: b(2) });
    assert_eq!(info.region(outer).kind(), RegionKind::Loop { header: b(1) });
    assert_eq!(info.region(inner).parent(), Some(outer));
    assert_eq!(info.region(inner).depth(), 2);
    assert!(!info.region(inner).exits_parent());
    assert_eq!(info.region(inner).succs(), &[region_of(&info, 4)]);
    assert!(info.region(region_of(&info, 4)).is_backedge_source());
    assert!(info.region(region_of(&info, 4)).exits_parent());
}

#[test]
fn irreducible_cfg_has_no_loop_regions() {
    // B0 → B1 | B2, B1 → B2, B2 → B1 | B3: two entries into the cycle.
    let info = info_for(&[&[1, 2], &[2], &[1, 3], &[]]);
    assert!(info.is_irreducible());
    assert_eq!(info.containers_innermost_first(), vec![info.function_region()]);
    let retreating_source = [region_of(&info, 1), region_of(&info, 2)]
        .into_iter()
        .filter(|&r| info.region(r).is_backedge_source())
        .count();
    assert_eq!(retreating_source, 1);
}
