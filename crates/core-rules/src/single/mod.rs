//! Single-line peepholes: a table of matcher + builder entries tried in
//! order against every instruction line.

mod arith;
mod imm;
mod muldiv;

use core_config::OptimizerConfig;
use core_flow::DeclaredFunctions;
use core_line::{AsmBuf, Instr, Line};

use crate::{record, RewriteRecord, RuleCtx};

pub struct Peephole {
    pub name: &'static str,
    pub apply: fn(&Instr, &mut RuleCtx<'_>) -> Option<Vec<Line>>,
}

pub const PEEPHOLES: &[Peephole] = &[
    Peephole {
        name: "imm-moveq",
        apply: imm::materialize_immediate,
    },
    Peephole {
        name: "imm-clear-addr",
        apply: imm::clear_address_register,
    },
    Peephole {
        name: "clr-sp-push",
        apply: imm::clr_stack_push,
    },
    Peephole {
        name: "quick-arith",
        apply: arith::quick_arithmetic,
    },
    Peephole {
        name: "addq-word-addr",
        apply: arith::quick_to_word_on_addr,
    },
    Peephole {
        name: "cmp-zero-tst",
        apply: arith::compare_zero_to_tst,
    },
    Peephole {
        name: "single-bit-mask",
        apply: arith::single_bit_mask,
    },
    Peephole {
        name: "shift-16",
        apply: arith::shift_by_sixteen,
    },
    Peephole {
        name: "mul-const",
        apply: muldiv::multiply_by_constant,
    },
    Peephole {
        name: "div-const",
        apply: muldiv::divide_by_constant,
    },
];

/// Run the peephole table over the whole buffer, left to right. Each
/// match replaces exactly the matched line (possibly with several lines,
/// possibly with none); scanning resumes after the replacement.
pub fn run_single_line(
    buf: &mut AsmBuf,
    cfg: &OptimizerConfig,
    funcs: &DeclaredFunctions,
) -> Vec<RewriteRecord> {
    let mut records = Vec::new();
    let mut i = 0usize;
    while i < buf.len() {
        buf.set_cursor(i + 1);
        {
            let line = buf.line(i);
            if line.pinned || line.instr().is_none() {
                i += 1;
                continue;
            }
        }
        let ins = buf.line(i).instr().unwrap();
        let fired = {
            let mut ctx = RuleCtx {
                buf: &mut *buf,
                cfg,
                funcs,
            };
            let mut hit = None;
            for rule in PEEPHOLES {
                if let Some(replacement) = (rule.apply)(&ins, &mut ctx) {
                    hit = Some((rule.name, replacement));
                    break;
                }
            }
            hit
        };
        match fired {
            Some((name, replacement)) => {
                let at = buf.cursor() - 1;
                let before = buf.line(at).clone();
                record(
                    &mut records,
                    name,
                    before.origin,
                    std::slice::from_ref(&before),
                    &replacement,
                );
                buf.splice_tail(1, replacement);
                i = buf.cursor();
            }
            None => {
                i = buf.cursor();
            }
        }
    }
    records
}
