//! Per-line register usage classification and control-flow kinds.
//!
//! `classify` answers, for one instruction, which registers it reads
//! (source operands, indirect bases and indexes, pushes to the stack) and
//! which it definitely overwrites (a full write that makes the previous
//! value unobservable: `move`/`movea`/`moveq`/`lea` into a register
//! distinct from the source, `clr`, a same-register `sub`/`eor`, a pop
//! from the stack, a movem load). Read-modify-write instructions count as
//! reads only. Lines the classifier cannot categorize yield `None`; the
//! analyzers skip them and no rewrite involving them fires.

use crate::line::Line;
use crate::operand::Operand;
#[allow(unused_imports)]
use crate::register::{Reg, RegSet};

pub const CONDITION_CODES: [&str; 16] = [
    "cc", "cs", "eq", "ge", "gt", "hi", "le", "ls", "lt", "mi", "ne", "pl", "vc", "vs", "hs", "lo",
];

pub fn is_condition_code(cc: &str) -> bool {
    CONDITION_CODES.contains(&cc)
}

/// Control-flow classification of one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowKind {
    Label(String),
    /// Conditional branch (`bcc`, `jcc` pseudo, `dbcc`): falls through or
    /// transfers to `target`.
    Branch { target: String },
    /// Unconditional transfer. `None` target means a computed jump the
    /// analyzers cannot follow.
    Goto { target: Option<String> },
    /// Subroutine call; control returns here. `None` target is a computed
    /// call through a register.
    Call { target: Option<String> },
    /// `rts`/`rte`/`rtr`.
    Return,
    /// `.size`/`.type` boundary: the enclosing function ends here.
    FunctionEnd,
    Other,
}

pub fn flow_kind(line: &Line) -> FlowKind {
    if let Some(name) = line.label() {
        return FlowKind::Label(name.to_string());
    }
    if let Some(name) = line.numeric_label() {
        return FlowKind::Label(name.to_string());
    }
    if let Some((name, _)) = line.directive() {
        return match name {
            ".size" | ".type" => FlowKind::FunctionEnd,
            _ => FlowKind::Other,
        };
    }
    let Some(ins) = line.instr() else {
        return FlowKind::Other;
    };
    let target_of = |idx: usize| -> Option<String> {
        match ins.operand(idx) {
            Some(Operand::Abs(sym)) => Some(sym.clone()),
            _ => ins.raw.get(idx).and_then(|raw| {
                crate::patterns::NUMERIC_LABEL_REF
                    .is_match(raw)
                    .then(|| raw.clone())
            }),
        }
    };
    match ins.op.as_str() {
        "rts" | "rte" | "rtr" => FlowKind::Return,
        "bra" | "jra" => FlowKind::Goto {
            target: target_of(0),
        },
        "jmp" => FlowKind::Goto {
            target: match ins.operand(0) {
                Some(Operand::Abs(sym)) => Some(sym.clone()),
                _ => None,
            },
        },
        "bsr" | "jbsr" => FlowKind::Call {
            target: target_of(0),
        },
        "jsr" => FlowKind::Call {
            target: match ins.operand(0) {
                Some(Operand::Abs(sym)) => Some(sym.clone()),
                _ => None,
            },
        },
        "dbra" => FlowKind::Branch {
            target: ins.raw.get(1).cloned().unwrap_or_default(),
        },
        op => {
            if let Some(cc) = op.strip_prefix("db") {
                if is_condition_code(cc) {
                    return FlowKind::Branch {
                        target: ins.raw.get(1).cloned().unwrap_or_default(),
                    };
                }
            }
            if let Some(cc) = op.strip_prefix('b') {
                if is_condition_code(cc) {
                    return FlowKind::Branch {
                        target: target_of(0).unwrap_or_default(),
                    };
                }
            }
            if let Some(cc) = op.strip_prefix('j') {
                if is_condition_code(cc) {
                    return FlowKind::Branch {
                        target: target_of(0).unwrap_or_default(),
                    };
                }
            }
            FlowKind::Other
        }
    }
}

/// Registers read and definitely overwritten by one line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub reads: RegSet,
    pub overwrites: RegSet,
}

fn mem_regs(op: &Operand) -> RegSet {
    if op.is_memory() {
        op.referenced_regs()
    } else {
        RegSet::EMPTY
    }
}

fn source_regs(op: &Operand) -> RegSet {
    op.referenced_regs()
}

pub fn classify(line: &Line) -> Option<Usage> {
    if line.is_empty() || line.is_comment() || line.is_label() || line.is_directive() {
        return Some(Usage::default());
    }
    let ins = line.instr()?;
    let op = ins.op.as_str();

    // Control transfers: only a computed target reads registers.
    match flow_kind(line) {
        FlowKind::Branch { .. } if !op.starts_with("db") => return Some(Usage::default()),
        FlowKind::Goto { .. } | FlowKind::Call { .. } => {
            let reads = ins
                .operand(0)
                .map(|o| mem_regs(o))
                .unwrap_or(RegSet::EMPTY);
            return Some(Usage {
                reads,
                overwrites: RegSet::EMPTY,
            });
        }
        FlowKind::Return => return Some(Usage::default()),
        _ => {}
    }

    match op {
        "move" | "movea" => {
            let src = ins.operand(0)?;
            let dst = ins.operand(1)?;
            let mut reads = source_regs(src).union(mem_regs(dst));
            let mut overwrites = RegSet::EMPTY;
            if let Some(dreg) = dst.direct_reg() {
                if src.direct_reg() == Some(dreg) {
                    reads.insert(dreg);
                } else {
                    overwrites.insert(dreg);
                }
            }
            Some(Usage { reads, overwrites })
        }
        "moveq" => {
            let dst = ins.operand(1)?.direct_reg()?;
            Some(Usage {
                reads: RegSet::EMPTY,
                overwrites: RegSet::single(dst),
            })
        }
        "lea" => {
            let src = ins.operand(0)?;
            let dst = ins.operand(1)?.direct_reg()?;
            let reads = mem_regs(src);
            let overwrites = if reads.contains(dst) {
                RegSet::EMPTY
            } else {
                RegSet::single(dst)
            };
            Some(Usage { reads, overwrites })
        }
        "clr" => {
            let dst = ins.operand(0)?;
            match dst.direct_reg() {
                Some(r) => Some(Usage {
                    reads: RegSet::EMPTY,
                    overwrites: RegSet::single(r),
                }),
                None => Some(Usage {
                    reads: mem_regs(dst),
                    overwrites: RegSet::EMPTY,
                }),
            }
        }
        "movem" => {
            let a = ins.operand(0)?;
            let b = ins.operand(1)?;
            let list_of = |o: &Operand| -> Option<RegSet> {
                match o {
                    Operand::MovemList(set) => Some(*set),
                    Operand::Data(r) | Operand::Addr(r) => Some(RegSet::single(*r)),
                    _ => None,
                }
            };
            if b.is_memory() {
                // Store: registers -> memory.
                let list = list_of(a)?;
                Some(Usage {
                    reads: list.union(mem_regs(b)),
                    overwrites: RegSet::EMPTY,
                })
            } else {
                // Load: memory -> registers; a full (sign-extending) write.
                let list = list_of(b)?;
                Some(Usage {
                    reads: mem_regs(a),
                    overwrites: list,
                })
            }
        }
        "pea" => Some(Usage {
            reads: mem_regs(ins.operand(0)?),
            overwrites: RegSet::EMPTY,
        }),
        "sub" | "suba" | "eor" => {
            let src = ins.operand(0)?;
            let dst = ins.operand(1)?;
            if let (Some(s), Some(d)) = (src.direct_reg(), dst.direct_reg()) {
                if s == d {
                    // Zeroing idiom: the previous value is unobservable.
                    return Some(Usage {
                        reads: RegSet::EMPTY,
                        overwrites: RegSet::single(d),
                    });
                }
            }
            Some(rmw_usage(&ins))
        }
        "add" | "adda" | "addi" | "addq" | "addx" | "subi" | "subq" | "subx" | "and"
        | "andi" | "or" | "ori" | "eori" | "abcd" | "sbcd" | "mulu" | "muls" | "divu" | "divs"
        | "asl" | "asr" | "lsl" | "lsr" | "rol" | "ror" | "roxl" | "roxr" | "bset" | "bclr"
        | "bchg" => Some(rmw_usage(&ins)),
        "cmp" | "cmpa" | "cmpi" | "cmpm" | "btst" | "tst" | "tas" | "chk" => Some(rmw_usage(&ins)),
        "not" | "neg" | "negx" | "ext" | "extb" | "swap" => Some(rmw_usage(&ins)),
        "exg" => Some(rmw_usage(&ins)),
        "link" | "unlk" => {
            let base = ins.operand(0)?.direct_reg()?;
            Some(Usage {
                reads: RegSet::single(base),
                overwrites: RegSet::EMPTY,
            })
        }
        "nop" | "stop" | "trap" | "trapv" | "reset" | "illegal" => Some(Usage::default()),
        "dbra" => Some(rmw_usage(&ins)),
        op if op.starts_with("db") && is_condition_code(&op[2..]) => Some(rmw_usage(&ins)),
        op if op.starts_with('s') && is_condition_code(&op[1..]) => {
            // Scc: byte-sized conditional store, reads nothing.
            let dst = ins.operand(0)?;
            Some(Usage {
                reads: mem_regs(dst),
                overwrites: RegSet::EMPTY,
            })
        }
        _ => None,
    }
}

fn rmw_usage(ins: &crate::line::Instr) -> Usage {
    let mut reads = RegSet::EMPTY;
    for op in ins.ops.iter().flatten() {
        reads = reads.union(source_regs(op));
    }
    Usage {
        reads,
        overwrites: RegSet::EMPTY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(text: &str) -> Usage {
        classify(&Line::new(text)).unwrap()
    }

    #[test]
    fn move_overwrites_distinct_target() {
        let u = usage("move.l %d0,%d1");
        assert!(u.reads.contains(Reg::D0));
        assert!(u.overwrites.contains(Reg::D1));
        // Self-move keeps the value observable.
        let u = usage("move.l %d2,%d2");
        assert!(u.reads.contains(Reg::D2));
        assert!(!u.overwrites.contains(Reg::D2));
    }

    #[test]
    fn stack_push_reads_pop_overwrites() {
        let push = usage("move.l %d3,-(%sp)");
        assert!(push.reads.contains(Reg::D3));
        assert!(push.overwrites.is_empty());
        let pop = usage("move.l (%sp)+,%d3");
        assert!(pop.overwrites.contains(Reg::D3));
    }

    #[test]
    fn zeroing_idiom_is_an_overwrite() {
        let u = usage("sub.l %d4,%d4");
        assert!(u.reads.is_empty());
        assert!(u.overwrites.contains(Reg::D4));
        let u = usage("sub.l %d4,%d5");
        assert!(u.reads.contains(Reg::D4));
        assert!(u.reads.contains(Reg::D5));
        assert!(u.overwrites.is_empty());
    }

    #[test]
    fn movem_directions() {
        let store = usage("movem.l %d2-%d4,-(%sp)");
        assert!(store.reads.contains(Reg::D3));
        assert!(store.overwrites.is_empty());
        let load = usage("movem.l (%sp)+,%d2-%d4");
        assert!(load.overwrites.contains(Reg::D2));
        assert!(load.overwrites.contains(Reg::D4));
    }

    #[test]
    fn rmw_counts_as_read() {
        let u = usage("add.l %d0,%d1");
        assert!(u.reads.contains(Reg::D1));
        assert!(u.overwrites.is_empty());
    }

    #[test]
    fn indirect_bases_are_reads() {
        let u = usage("move.w 8(%a2,%d1.w),%d0");
        assert!(u.reads.contains(Reg::A2));
        assert!(u.reads.contains(Reg::D1));
        assert!(u.overwrites.contains(Reg::D0));
    }

    #[test]
    fn flow_kinds() {
        assert_eq!(
            flow_kind(&Line::new("bne .L3")),
            FlowKind::Branch {
                target: ".L3".to_string()
            }
        );
        assert_eq!(
            flow_kind(&Line::new("bra .L1")),
            FlowKind::Goto {
                target: Some(".L1".to_string())
            }
        );
        assert_eq!(flow_kind(&Line::new("jmp (%a0)")), FlowKind::Goto { target: None });
        assert_eq!(
            flow_kind(&Line::new("jsr frobnicate")),
            FlowKind::Call {
                target: Some("frobnicate".to_string())
            }
        );
        assert_eq!(flow_kind(&Line::new("rts")), FlowKind::Return);
        assert_eq!(
            flow_kind(&Line::new(".size main,.-main")),
            FlowKind::FunctionEnd
        );
    }

    #[test]
    fn unknown_mnemonic_is_unclassifiable() {
        assert!(classify(&Line::new("frob %d0")).is_none());
    }
}
