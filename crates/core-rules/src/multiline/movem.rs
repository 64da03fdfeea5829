//! Register-list coalescing: runs of pushes, pops, and fixed-stride loads
//! fold into a single `movem`.

use core_line::{format_movem_list, Disp, Line, Operand, Reg, RegSet, Size};

use crate::{Rewrite, RuleCtx};

/// `move.s xN,-(aM)` -> (size, base, pushed register)
fn parse_push(line: &Line) -> Option<(Size, Reg, Reg)> {
    let ins = line.instr()?;
    if ins.op != "move" {
        return None;
    }
    let size = ins.size?;
    if size == Size::Byte {
        return None;
    }
    let src = ins.operand(0)?.direct_reg()?;
    match ins.operand(1)? {
        Operand::PreDec(base) => Some((size, *base, src)),
        _ => None,
    }
}

/// `move.s (aM)+,xN` -> (size, base, popped register)
fn parse_pop(line: &Line) -> Option<(Size, Reg, Reg)> {
    let ins = line.instr()?;
    if ins.op != "move" {
        return None;
    }
    let size = ins.size?;
    if size == Size::Byte {
        return None;
    }
    let dst = ins.operand(1)?.direct_reg()?;
    match ins.operand(0)? {
        Operand::PostInc(base) => Some((size, *base, dst)),
        _ => None,
    }
}

/// `move.s d(aM),xN` -> (size, base, displacement, target register)
fn parse_load(line: &Line) -> Option<(Size, Reg, i64, Reg)> {
    let ins = line.instr()?;
    if ins.op != "move" {
        return None;
    }
    let size = ins.size?;
    if size == Size::Byte {
        return None;
    }
    let dst = ins.operand(1)?.direct_reg()?;
    match ins.operand(0)? {
        Operand::Indirect(base) => Some((size, *base, 0, dst)),
        Operand::Disp {
            disp: Disp::Num(d),
            base,
        } => Some((size, *base, *d, dst)),
        _ => None,
    }
}

fn movem_mem(base: Reg, disp: i64) -> String {
    if disp == 0 {
        format!("({})", base.name())
    } else {
        format!("{disp}({})", base.name())
    }
}

/// `k` consecutive pushes in strictly decreasing register order become one
/// `movem` push.
pub fn coalesce_push(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if !ctx.cfg.use_fabri1983_movem_optimizations {
        return None;
    }
    let limit = ctx.cfg.multi_line_optimization_limit;
    let (size, base, regs) = {
        let window = ctx.window(k)?;
        let mut parsed = Vec::with_capacity(k);
        for line in window {
            parsed.push(parse_push(line)?);
        }
        let (size, base, _) = parsed[0];
        if parsed.iter().any(|(s, b, _)| *s != size || *b != base) {
            return None;
        }
        let mut regs = RegSet::new();
        for pair in parsed.windows(2) {
            if pair[1].2.index() >= pair[0].2.index() {
                return None; // hardware pushes high registers first
            }
        }
        for (_, _, r) in &parsed {
            if *r == base {
                return None;
            }
            regs.insert(*r);
        }
        (size, base, regs)
    };
    // Wait for the maximal run before folding.
    if k < limit {
        if let Some(next) = ctx.peek_pending() {
            if let Some((s, b, r)) = parse_push(next) {
                if s == size && b == base && r.index() < regs.first().map(Reg::index).unwrap_or(16)
                {
                    return None;
                }
            }
        }
    }
    Some(Rewrite {
        rule: "movem-push-coalesce",
        consumed: k,
        replacement: vec![Line::new(format!(
            "movem.{} {},-({})",
            size.suffix(),
            format_movem_list(regs),
            base.name()
        ))],
    })
}

/// Dual of `coalesce_push`: consecutive pops in ascending order. A word
/// pop into a data register changes meaning under `movem` (it sign
/// extends), so those need the register's high half to be dead.
pub fn coalesce_pop(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if !ctx.cfg.use_fabri1983_movem_optimizations {
        return None;
    }
    let limit = ctx.cfg.multi_line_optimization_limit;
    let (size, base, regs, word_data) = {
        let window = ctx.window(k)?;
        let mut parsed = Vec::with_capacity(k);
        for line in window {
            parsed.push(parse_pop(line)?);
        }
        let (size, base, _) = parsed[0];
        if parsed.iter().any(|(s, b, _)| *s != size || *b != base) {
            return None;
        }
        for pair in parsed.windows(2) {
            if pair[1].2.index() <= pair[0].2.index() {
                return None;
            }
        }
        let mut regs = RegSet::new();
        let mut word_data = RegSet::new();
        for (_, _, r) in &parsed {
            if *r == base {
                return None;
            }
            regs.insert(*r);
            if size == Size::Word && r.is_data() {
                word_data.insert(*r);
            }
        }
        (size, base, regs, word_data)
    };
    for reg in word_data.iter() {
        if ctx.used_after(k, reg) {
            return None;
        }
    }
    if k < limit {
        if let Some(next) = ctx.peek_pending() {
            if let Some((s, b, r)) = parse_pop(next) {
                if s == size
                    && b == base
                    && r.index() > regs.iter().map(Reg::index).max().unwrap_or(0)
                {
                    return None;
                }
            }
        }
    }
    Some(Rewrite {
        rule: "movem-pop-coalesce",
        consumed: k,
        replacement: vec![Line::new(format!(
            "movem.{} ({})+,{}",
            size.suffix(),
            base.name(),
            format_movem_list(regs)
        ))],
    })
}

/// Consecutive loads with a fixed stride fold into one `movem`, optionally
/// bridging up to three stride gaps with freshly obtained registers.
pub fn stride_loads(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if !ctx.cfg.use_fabri1983_movem_optimizations {
        return None;
    }
    let limit = ctx.cfg.multi_line_optimization_limit;
    let (size, base, start, loads) = {
        let window = ctx.window(k)?;
        let mut parsed = Vec::with_capacity(k);
        for line in window {
            parsed.push(parse_load(line)?);
        }
        let (size, base, start, _) = parsed[0];
        if parsed.iter().any(|(s, b, _, _)| *s != size || *b != base) {
            return None;
        }
        let loads: Vec<(i64, Reg)> = parsed.iter().map(|(_, _, d, r)| (*d, *r)).collect();
        (size, base, start, loads)
    };
    let stride = size.bytes();
    // Strictly ascending displacements on the stride grid, strictly
    // ascending registers, base untouched.
    let mut gaps = 0usize;
    for pair in loads.windows(2) {
        let (d0, r0) = pair[0];
        let (d1, r1) = pair[1];
        if r1.index() <= r0.index() || d1 <= d0 {
            return None;
        }
        let span = d1 - d0;
        if span % stride != 0 {
            return None;
        }
        gaps += (span / stride - 1) as usize;
    }
    if gaps > 3 {
        return None;
    }
    if loads.iter().any(|(_, r)| *r == base) {
        return None;
    }
    if gaps > 0 && base == Reg::A7 {
        // Filling gaps may grow the frame and re-offset sp displacements,
        // including ours.
        return None;
    }
    // Word-sized movem sign-extends data registers; plain move.w does not.
    for (_, reg) in &loads {
        if size == Size::Word && reg.is_data() && ctx.used_after(k, *reg) {
            return None;
        }
    }
    if k < limit {
        if let Some(next) = ctx.peek_pending() {
            if let Some((s, b, d, r)) = parse_load(next) {
                let (last_d, last_r) = *loads.last().unwrap();
                if s == size && b == base && d > last_d && r.index() > last_r.index() {
                    return None;
                }
            }
        }
    }

    let mut list: RegSet = loads.iter().map(|(_, r)| *r).collect();
    if gaps > 0 {
        // One free register per gap slot, ordered between its neighbours.
        let mut exclude = list;
        exclude.insert(base);
        let free = ctx.find_free(k, RegSet::DATA.union(RegSet::ADDR), exclude);
        if free.is_empty() {
            return None;
        }
        let mut fillers = RegSet::new();
        for pair in loads.windows(2) {
            let (d0, r0) = pair[0];
            let (d1, r1) = pair[1];
            let missing = ((d1 - d0) / stride - 1) as usize;
            if missing == 0 {
                continue;
            }
            let mut picked = Vec::new();
            for candidate in &free {
                if picked.len() == missing {
                    break;
                }
                let idx = candidate.index();
                let floor = picked.last().map(|r: &Reg| r.index()).unwrap_or(r0.index());
                if idx > floor && idx < r1.index() && !fillers.contains(*candidate) {
                    picked.push(*candidate);
                }
            }
            if picked.len() < missing {
                return None;
            }
            for r in picked {
                fillers.insert(r);
            }
        }
        if !core_frame::ensure_saved_set(ctx.buf, fillers) {
            return None;
        }
        list = list.union(fillers);
    }
    Some(Rewrite {
        rule: "movem-stride-loads",
        consumed: k,
        replacement: vec![Line::new(format!(
            "movem.{} {},{}",
            size.suffix(),
            movem_mem(base, start),
            format_movem_list(list)
        ))],
    })
}
