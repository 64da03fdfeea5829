//! Call-shape rewrites: tail calls, `bsr` chains via `pea`, replacing an
//! indirect call through a just-loaded register with a direct one, and the
//! load+jump to `jmp` substitution.

use core_line::{classify, flow_kind, FlowKind, Line, Operand};

use crate::{Rewrite, RuleCtx};

/// `jsr f / rts` -> `jmp f`, `bsr f / rts` -> `bra f`. A `jsr` to a
/// function declared in this unit also takes the pc-relative `bra`.
pub fn tail_call(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if k != 2 {
        return None;
    }
    let (op, target) = {
        let window = ctx.window(2)?;
        if !matches!(flow_kind(&window[1]), FlowKind::Return)
            || window[1].instr()?.op != "rts"
        {
            return None;
        }
        let ins = window[0].instr()?;
        let target = match ins.operand(0)? {
            Operand::Abs(sym) => sym.clone(),
            _ => return None,
        };
        match ins.op.as_str() {
            "jsr" if ctx.funcs.is_declared(&target) => ("bra", target),
            "jsr" => ("jmp", target),
            "bsr" | "jbsr" => ("bra", target),
            _ => return None,
        }
    };
    Some(Rewrite {
        rule: "tail-call",
        consumed: 2,
        replacement: vec![Line::new(format!("{op} {target}"))],
    })
}

/// `bsr f1 / bsr f2 / rts` -> `pea f2 / bra f1` (and the three-call form):
/// the pushed address becomes f1's return address, so control threads
/// through the chain without the extra frames.
pub fn bsr_chain(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if k != 3 && k != 4 {
        return None;
    }
    let targets = {
        let window = ctx.window(k)?;
        if window[k - 1].instr()?.op != "rts" {
            return None;
        }
        let mut targets = Vec::with_capacity(k - 1);
        for line in &window[..k - 1] {
            let ins = line.instr()?;
            if ins.op != "bsr" && ins.op != "jbsr" {
                return None;
            }
            match ins.operand(0)? {
                Operand::Abs(sym) => targets.push(sym.clone()),
                _ => return None,
            }
        }
        targets
    };
    let mut replacement = Vec::with_capacity(k - 1);
    for target in targets.iter().skip(1).rev() {
        replacement.push(Line::new(format!("pea {target}")));
    }
    replacement.push(Line::new(format!("bra {}", targets[0])));
    Some(Rewrite {
        rule: "bsr-chain-pea",
        consumed: k,
        replacement,
    })
}

/// `move.l #f,aM ... jsr (aM)` -> `jsr f` when nothing between redefines
/// `aM`, no label lets another definition reach the call, and `aM` is not
/// needed afterwards.
pub fn direct_call(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if !ctx.cfg.use_replace_load_subroutine_into_an_by_direct_call {
        return None;
    }
    let (reg, target, middle) = {
        let window = ctx.window(k)?;
        let first = window[0].instr()?;
        let target = match (first.op.as_str(), first.operand(0)?, first.operand(1)?) {
            ("move" | "movea", Operand::Imm(v), Operand::Addr(reg)) => {
                (*reg, format!("{v}"))
            }
            ("lea", Operand::Abs(sym), Operand::Addr(reg)) => (*reg, sym.clone()),
            _ => return None,
        };
        let (reg, sym) = target;
        let last = window[k - 1].instr()?;
        if last.op != "jsr" || last.operand(0)? != &Operand::Indirect(reg) {
            return None;
        }
        let middle: Vec<Line> = window[1..k - 1].to_vec();
        for line in &middle {
            if line.is_label() || line.is_directive() {
                return None;
            }
            match flow_kind(line) {
                FlowKind::Other => {}
                _ => return None,
            }
            let usage = classify(line)?;
            if usage.reads.contains(reg) || usage.overwrites.contains(reg) {
                return None;
            }
        }
        (reg, sym, middle)
    };
    if ctx.used_after(k, reg) {
        return None;
    }
    let mut replacement = middle;
    replacement.push(Line::new(format!("jsr {target}")));
    Some(Rewrite {
        rule: "direct-call",
        consumed: k,
        replacement,
    })
}

/// `move.l d(aN),aM / jmp (aM)` -> `jmp d(aN)`, admissible when `aM` can
/// be retired from the prologue set (or never needed saving).
pub fn pea_jump(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if k != 2 || !ctx.cfg.use_fabri1983_optimizations {
        return None;
    }
    let (reg, mem) = {
        let window = ctx.window(2)?;
        let first = window[0].instr()?;
        if first.op != "move" && first.op != "movea" && first.op != "lea" {
            return None;
        }
        let mem = match first.operand(0)? {
            op @ Operand::Disp { .. } | op @ Operand::Indirect(_) => op.clone(),
            _ => return None,
        };
        let reg = match first.operand(1)? {
            Operand::Addr(r) => *r,
            _ => return None,
        };
        if mem.referenced_regs().contains(reg) {
            return None;
        }
        let second = window[1].instr()?;
        if second.op != "jmp" || second.operand(0)? != &Operand::Indirect(reg) {
            return None;
        }
        (reg, mem)
    };
    if ctx.used_after(2, reg) {
        return None;
    }
    if !reg.is_scratch() {
        // The register only existed for this jump; retiring it shrinks the
        // frame. When it is not in the prologue set there is nothing to do.
        let _ = ctx.retire_saved(reg);
    }
    Some(Rewrite {
        rule: "pea-jump",
        consumed: 2,
        replacement: vec![Line::new(format!("jmp {mem}"))],
    })
}
