//! Multi-line window rules. The driver offers the last `k` emitted lines
//! for `k = limit..=2`; each family inspects the window and answers with a
//! replacement or "no change".

mod calls;
mod compact;
mod movem;

use crate::{Rewrite, RuleCtx};

pub struct MultiRule {
    pub name: &'static str,
    pub apply: fn(&mut RuleCtx<'_>, usize) -> Option<Rewrite>,
}

pub const RULES: &[MultiRule] = &[
    MultiRule {
        name: "movem-push-coalesce",
        apply: movem::coalesce_push,
    },
    MultiRule {
        name: "movem-pop-coalesce",
        apply: movem::coalesce_pop,
    },
    MultiRule {
        name: "movem-stride-loads",
        apply: movem::stride_loads,
    },
    MultiRule {
        name: "range-test",
        apply: compact::range_test,
    },
    MultiRule {
        name: "tail-call",
        apply: calls::tail_call,
    },
    MultiRule {
        name: "bsr-chain-pea",
        apply: calls::bsr_chain,
    },
    MultiRule {
        name: "direct-call",
        apply: calls::direct_call,
    },
    MultiRule {
        name: "pea-jump",
        apply: calls::pea_jump,
    },
    MultiRule {
        name: "zero-pair",
        apply: compact::zero_pair,
    },
    MultiRule {
        name: "array-index",
        apply: compact::array_index,
    },
    MultiRule {
        name: "push-compact",
        apply: compact::push_compact,
    },
    MultiRule {
        name: "clear-before-word-move",
        apply: compact::clear_before_word_move,
    },
    MultiRule {
        name: "tas-io",
        apply: compact::tas_io,
    },
];
