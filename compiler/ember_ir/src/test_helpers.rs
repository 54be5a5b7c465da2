//! Shared test utilities for IR and CFG tests. Only compiled in test builds.

use crate::{ArgConvention, BlockId, Function, FunctionBuilder};

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// Build a function whose CFG is given as an adjacency list.
///
/// Blocks with two successors branch on a boolean argument; blocks with none
/// return. Block arguments are never used.
pub(crate) fn cfg_func(edges: &[&[u32]]) -> Function {
    let mut fb = FunctionBuilder::new("cfg");
    let bool_ty = fb.types().trivial("Bool");
    let cond = fb.add_function_arg(bool_ty, ArgConvention::Unowned);
    for _ in 1..edges.len() {
        fb.create_block();
    }
    for (i, succs) in edges.iter().enumerate() {
        fb.switch_to(b(u32::try_from(i).unwrap()));
        match succs {
            [] => fb.ret(cond),
            [only] => fb.br(b(*only), vec![]),
            [t, f] => fb.cond_br(cond, b(*t), vec![], b(*f), vec![]),
            _ => panic!("at most two successors"),
        }
    }
    fb.finish().unwrap()
}
