//! Window rules that compress idiomatic gcc sequences: the 16-bit range
//! test, the moveq/swap zero pairs, array-index address computations, and
//! the aggressive push/adjust and clear-elision families.

use core_line::{Disp, Line, Operand, Reg, RegSet, Size};

use crate::{Rewrite, RuleCtx};

fn branch_target(line: &Line, ops: &[&str]) -> Option<String> {
    let ins = line.instr()?;
    if !ops.contains(&ins.op.as_str()) || ins.short {
        return None;
    }
    match ins.operand(0)? {
        Operand::Abs(sym) => Some(sym.clone()),
        _ => None,
    }
}

fn cmp_long_imm(line: &Line, value: i64) -> Option<Reg> {
    let ins = line.instr()?;
    if (ins.op != "cmp" && ins.op != "cmpi") || ins.size != Some(Size::Long) {
        return None;
    }
    match (ins.operand(0)?, ins.operand(1)?) {
        (Operand::Imm(Disp::Num(v)), dst) if *v == value => dst.direct_reg(),
        _ => None,
    }
}

/// `cmp.l #-32768,xN / blt L / cmp.l #32767,xN / bgt L` ->
/// `cmpa.w xN,aM / bne L`: the sign-extended low word equals the full
/// value exactly when the value fits in 16 bits.
pub fn range_test(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if k != 4 || !ctx.cfg.use_fabri1983_optimizations {
        return None;
    }
    let (reg, label) = {
        let window = ctx.window(4)?;
        let lo = cmp_long_imm(&window[0], -32768)?;
        let blt = branch_target(&window[1], &["blt", "jlt"])?;
        let hi = cmp_long_imm(&window[2], 32767)?;
        let bgt = branch_target(&window[3], &["bgt", "jgt"])?;
        if lo != hi || blt != bgt {
            return None;
        }
        (lo, blt)
    };
    let replacement = if reg.is_addr() && reg != Reg::A7 {
        vec![
            Line::new(format!("cmpa.w {},{}", reg.name(), reg.name())),
            Line::new(format!("bne {label}")),
        ]
    } else if reg.is_data() {
        let scratch = ctx.find_free_addr(4, RegSet::EMPTY)?;
        if !ctx.ensure_saved(scratch) {
            return None;
        }
        vec![
            Line::new(format!("movea.l {},{}", reg.name(), scratch.name())),
            Line::new(format!("cmpa.w {},{}", reg.name(), scratch.name())),
            Line::new(format!("bne {label}")),
        ]
    } else {
        return None;
    };
    Some(Rewrite {
        rule: "range-test",
        consumed: 4,
        replacement,
    })
}

/// `moveq #0,dN / move.w a,dN / swap dN / clr.w dN / move.w b,dN` ->
/// `move.w a,dN / swap dN / move.w b,dN`: both halves end up overwritten,
/// so the clearing is dead either way.
pub fn zero_pair(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if k != 5 || !ctx.cfg.use_fabri1983_optimizations {
        return None;
    }
    let (reg, first, second) = {
        let window = ctx.window(5)?;
        let moveq = window[0].instr()?;
        if moveq.op != "moveq" {
            return None;
        }
        let reg = match (moveq.operand(0)?, moveq.operand(1)?) {
            (Operand::Imm(Disp::Num(0)), Operand::Data(r)) => *r,
            _ => return None,
        };
        let first = word_move_into(&window[1], reg)?;
        let swap = window[2].instr()?;
        if swap.op != "swap" || swap.operand(0)? != &Operand::Data(reg) {
            return None;
        }
        let clr = window[3].instr()?;
        if clr.op != "clr"
            || clr.size != Some(Size::Word)
            || clr.operand(0)? != &Operand::Data(reg)
        {
            return None;
        }
        let second = word_move_into(&window[4], reg)?;
        (reg, first, second)
    };
    Some(Rewrite {
        rule: "zero-pair",
        consumed: 5,
        replacement: vec![
            Line::new(format!("move.w {first},{}", reg.name())),
            Line::new(format!("swap {}", reg.name())),
            Line::new(format!("move.w {second},{}", reg.name())),
        ],
    })
}

/// `move.w src,dN` where the source does not involve `dN` itself; returns
/// the raw source text.
fn word_move_into(line: &Line, reg: Reg) -> Option<String> {
    let ins = line.instr()?;
    if ins.op != "move" || ins.size != Some(Size::Word) {
        return None;
    }
    if ins.operand(1)? != &Operand::Data(reg) {
        return None;
    }
    let src = ins.operand(0)?;
    if src.referenced_regs().contains(reg) {
        return None;
    }
    Some(ins.raw[0].clone())
}

/// The 5/6-line `base + dN*2` address computation collapses onto
/// `add.w dN,dN / lea base,aM / move.s (aM,dN.w),dP`.
pub fn array_index(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if (k != 4 && k != 5) || !ctx.cfg.use_fabri1983_optimizations {
        return None;
    }
    struct Match {
        prefix: Option<Line>,
        index: Reg,
        base_sym: String,
        addr: Reg,
        size: Size,
        dst: String,
    }
    let m = {
        let window = ctx.window(k)?;
        let (prefix, rest) = if k == 5 {
            // Leading `move.w src,dT` feeding the index register.
            (Some(window[0].clone()), &window[1..])
        } else {
            (None, &window[..])
        };
        let ext = rest[0].instr()?;
        if ext.op != "ext" || ext.size != Some(Size::Long) {
            return None;
        }
        let index = match ext.operand(0)? {
            Operand::Data(r) => *r,
            _ => return None,
        };
        if let Some(prefix_line) = &prefix {
            let ins = prefix_line.instr()?;
            if ins.op != "move"
                || ins.size != Some(Size::Word)
                || ins.operand(1)? != &Operand::Data(index)
            {
                return None;
            }
        }
        let dbl = rest[1].instr()?;
        if dbl.op != "add"
            || dbl.size != Some(Size::Long)
            || dbl.operand(0)? != &Operand::Data(index)
            || dbl.operand(1)? != &Operand::Data(index)
        {
            return None;
        }
        let lea = rest[2].instr()?;
        if lea.op != "lea" {
            return None;
        }
        let base_sym = match lea.operand(0)? {
            Operand::Abs(sym) => sym.clone(),
            _ => return None,
        };
        let addr = match lea.operand(1)? {
            Operand::Addr(r) => *r,
            _ => return None,
        };
        let load = rest[3].instr()?;
        if load.op != "move" {
            return None;
        }
        let size = load.size?;
        match load.operand(0)? {
            Operand::Index {
                disp: Disp::Num(0),
                base,
                index: idx,
                ..
            } if *base == addr && *idx == index => {}
            _ => return None,
        }
        let dst = load.raw[1].clone();
        let dst_reg = load.operand(1)?.direct_reg();
        if dst_reg == Some(index) || dst_reg == Some(addr) {
            return None;
        }
        Match {
            prefix,
            index,
            base_sym,
            addr,
            size,
            dst,
        }
    };
    // The word-sized doubling clobbers the high half of the index; it must
    // be dead past this sequence.
    if ctx.used_after(k, m.index) {
        return None;
    }
    let mut replacement = Vec::with_capacity(4);
    if let Some(prefix) = m.prefix {
        replacement.push(prefix);
    }
    replacement.push(Line::new(format!(
        "add.w {},{}",
        m.index.name(),
        m.index.name()
    )));
    replacement.push(Line::new(format!("lea {},{}", m.base_sym, m.addr.name())));
    replacement.push(Line::new(format!(
        "move.{} ({},{}.w),{}",
        m.size.suffix(),
        m.addr.name(),
        m.index.name(),
        m.dst
    )));
    Some(Rewrite {
        rule: "array-index",
        consumed: k,
        replacement,
    })
}

fn parse_word_push_to_sp(line: &Line) -> Option<String> {
    let ins = line.instr()?;
    if ins.op != "move" || ins.size != Some(Size::Word) {
        return None;
    }
    if ins.operand(1)? != &Operand::PreDec(Reg::A7) {
        return None;
    }
    // Sources touching sp would need their own re-offsetting.
    if ins.operand(0)?.referenced_regs().contains(Reg::A7) {
        return None;
    }
    Some(ins.raw[0].clone())
}

fn parse_sp_adjust(line: &Line) -> Option<i64> {
    let ins = line.instr()?;
    if ins.op != "subq" && ins.op != "sub" && ins.op != "subi" {
        return None;
    }
    match (ins.operand(0)?, ins.operand(1)?) {
        (Operand::Imm(Disp::Num(v)), Operand::Addr(Reg::A7)) => Some(*v),
        _ => None,
    }
}

/// `move.w v,-(sp) / subq #2,sp [/ move.w v2,-(sp) / subq #2,sp]` ->
/// one `subq` and displacement stores.
pub fn push_compact(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if (k != 2 && k != 4) || !ctx.cfg.use_aggressive_compact_two_words_push {
        return None;
    }
    let values = {
        let window = ctx.window(k)?;
        let mut values = Vec::new();
        let mut i = 0;
        while i < k {
            let value = parse_word_push_to_sp(&window[i])?;
            let adjust = parse_sp_adjust(&window[i + 1])?;
            if adjust != 2 {
                return None;
            }
            values.push(value);
            i += 2;
        }
        values
    };
    // Defer while another push/adjust pair is still incoming, so the
    // widest form wins.
    if k < ctx.cfg.multi_line_optimization_limit {
        if let Some(next) = ctx.peek_pending() {
            if parse_word_push_to_sp(next).is_some() {
                return None;
            }
        }
    }
    let total = values.len() as i64 * 4;
    let mut replacement = vec![Line::new(format!("subq.l #{total},%sp"))];
    let mut offset = total - 2;
    for value in values {
        replacement.push(Line::new(format!("move.w {value},{offset}(%sp)")));
        offset -= 4;
    }
    Some(Rewrite {
        rule: "push-compact",
        consumed: k,
        replacement,
    })
}

/// `moveq #0,dN / move.w src,dN` -> `move.w src,dN` when nothing reads
/// the zeroed high half afterwards.
pub fn clear_before_word_move(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if k != 2 || !ctx.cfg.use_aggressive_avoid_clear_before_move_word {
        return None;
    }
    let (reg, mov) = {
        let window = ctx.window(2)?;
        let clear = window[0].instr()?;
        let reg = match clear.op.as_str() {
            "moveq" => match (clear.operand(0)?, clear.operand(1)?) {
                (Operand::Imm(Disp::Num(0)), Operand::Data(r)) => *r,
                _ => return None,
            },
            "clr" if clear.size == Some(Size::Long) => match clear.operand(0)? {
                Operand::Data(r) => *r,
                _ => return None,
            },
            _ => return None,
        };
        word_move_into(&window[1], reg)?;
        (reg, window[1].clone())
    };
    if ctx.used_after(2, reg) {
        return None;
    }
    Some(Rewrite {
        rule: "clear-before-word-move",
        consumed: 2,
        replacement: vec![mov],
    })
}

/// `bset.b #7,mem / beq L` -> `tas mem / bpl L`: both test the old bit 7
/// and set it, but `tas` is one atomic read-modify-write.
pub fn tas_io(ctx: &mut RuleCtx<'_>, k: usize) -> Option<Rewrite> {
    if k != 2 || !ctx.cfg.use_tas_on_io_memory {
        return None;
    }
    let (mem, label) = {
        let window = ctx.window(2)?;
        let bset = window[0].instr()?;
        if bset.op != "bset" || bset.size != Some(Size::Byte) {
            return None;
        }
        match bset.operand(0)? {
            Operand::Imm(Disp::Num(7)) => {}
            _ => return None,
        }
        if !bset.operand(1)?.is_memory() {
            return None;
        }
        let label = branch_target(&window[1], &["beq", "jeq"])?;
        (bset.raw[1].clone(), label)
    };
    Some(Rewrite {
        rule: "tas-io",
        consumed: 2,
        replacement: vec![
            Line::new(format!("tas {mem}")),
            Line::new(format!("bpl {label}")),
        ],
    })
}
