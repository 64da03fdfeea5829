//! Stack-frame maintenance. When a rule synthesizes a new scratch
//! register the callee-save contract must keep holding: the register is
//! added to the prologue `movem` push (or one is created), the matching
//! pop is added before every `rts`/`rte`, and every `sp`-relative
//! displacement between them is re-offset by the byte delta. Removal is
//! symmetric.

use core_flow::{region_is_interrupt, ControlFlowMap};
use core_line::{
    flow_kind, format_movem_list, patterns, AsmBuf, FlowKind, Line, Operand, Reg, RegSet, Size,
};
use tracing::{debug, warn};

/// A recognized prologue push or epilogue pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MovemFrame {
    size: Size,
    regs: RegSet,
}

impl MovemFrame {
    fn stride(self) -> i64 {
        self.size.bytes()
    }
}

fn parse_push(line: &Line) -> Option<MovemFrame> {
    let ins = line.instr()?;
    if ins.op != "movem" {
        return None;
    }
    let size = ins.size.unwrap_or(Size::Long);
    match (ins.operand(0), ins.operand(1)) {
        (Some(src), Some(Operand::PreDec(Reg::A7))) => {
            let regs = movem_regs(src)?;
            Some(MovemFrame { size, regs })
        }
        _ => None,
    }
}

fn parse_pop(line: &Line) -> Option<MovemFrame> {
    let ins = line.instr()?;
    if ins.op != "movem" {
        return None;
    }
    let size = ins.size.unwrap_or(Size::Long);
    match (ins.operand(0), ins.operand(1)) {
        (Some(Operand::PostInc(Reg::A7)), Some(dst)) => {
            let regs = movem_regs(dst)?;
            Some(MovemFrame { size, regs })
        }
        _ => None,
    }
}

fn movem_regs(op: &Operand) -> Option<RegSet> {
    match op {
        Operand::MovemList(set) => Some(*set),
        Operand::Data(r) | Operand::Addr(r) => Some(RegSet::single(*r)),
        _ => None,
    }
}

fn push_text(size: Size, regs: RegSet) -> String {
    format!("movem.{} {},-(%sp)", size.suffix(), format_movem_list(regs))
}

fn pop_text(size: Size, regs: RegSet) -> String {
    format!("movem.{} (%sp)+,{}", size.suffix(), format_movem_list(regs))
}

/// The enclosing function region, validated to actually start at a
/// `.type NAME,@function` declaration; the label index follows it.
struct Region {
    label_idx: usize,
    end: usize,
    interrupt: bool,
}

fn enclosing_region(buf: &AsmBuf) -> Option<Region> {
    let map = ControlFlowMap::build(buf);
    let decl = buf.get(map.func_start)?;
    let name = patterns::TYPE_FUNCTION.captures(decl.text())?[1].to_string();
    let label_idx = (map.func_start..map.func_end)
        .find(|&idx| buf.line(idx).label() == Some(name.as_str()))?;
    Some(Region {
        label_idx,
        end: map.func_end,
        interrupt: region_is_interrupt(buf, &map),
    })
}

/// Make sure `reg` survives the rewrite: scratch-pad registers need no
/// saving in ordinary routines; anything else is pushed/popped via
/// `add_registers`.
pub fn ensure_saved(buf: &mut AsmBuf, reg: Reg) -> bool {
    ensure_saved_set(buf, RegSet::single(reg))
}

/// `ensure_saved` for a whole set, committed atomically: either every
/// register that needs saving lands in the frame, or nothing changes.
pub fn ensure_saved_set(buf: &mut AsmBuf, regs: RegSet) -> bool {
    if regs.is_empty() {
        return true;
    }
    let interrupt = match enclosing_region(buf) {
        Some(region) => region.interrupt,
        None => return false,
    };
    let to_push = if interrupt {
        regs
    } else {
        regs.difference(RegSet::SCRATCH)
    };
    if to_push.is_empty() {
        return true;
    }
    add_registers(buf, to_push)
}

/// Add callee-save registers to the enclosing function's frame. Returns
/// false (leaving the buffer untouched) when the request is inadmissible.
pub fn add_registers(buf: &mut AsmBuf, regs: RegSet) -> bool {
    if regs.is_empty() {
        return true;
    }
    let Some(region) = enclosing_region(buf) else {
        return false;
    };
    if !region.interrupt && !regs.intersect(RegSet::SCRATCH).is_empty() {
        // Scratch-pad registers are only pushed in interrupt handlers.
        return false;
    }

    let mut end = region.end;

    // Locate the prologue push (among the first instructions) before any
    // mutation, so an inadmissible request leaves the buffer untouched.
    let mut prologue_idx = None;
    let mut seen_instrs = 0;
    let mut first_instr_idx = None;
    for idx in region.label_idx + 1..end {
        let line = buf.line(idx);
        if line.instr().is_none() {
            continue;
        }
        if first_instr_idx.is_none() {
            first_instr_idx = Some(idx);
        }
        if parse_push(line).is_some() {
            prologue_idx = Some(idx);
            break;
        }
        seen_instrs += 1;
        if seen_instrs >= 2 {
            break;
        }
    }

    let old_push = prologue_idx.map(|idx| parse_push(buf.line(idx)).unwrap());
    let added = match old_push {
        Some(old) => regs.difference(old.regs),
        None => regs,
    };
    if added.is_empty() {
        return true; // already saved
    }

    // When a terminator is not preceded by a movem pop (the function
    // restores its old registers some other way), the synthesized pop only
    // restores the added registers. That is only layout-compatible when
    // every added register sorts after the existing push list.
    if let Some(old) = old_push {
        let scan_start = prologue_idx.unwrap() + 1;
        let bare_terminator = (scan_start..end).any(|idx| {
            matches!(flow_kind(buf.line(idx)), FlowKind::Return)
                && parse_pop(buf.line(idx - 1)).is_none()
        });
        if bare_terminator {
            let old_max = old.regs.iter().map(Reg::index).max().unwrap_or(0);
            if added.iter().any(|r| r.index() < old_max) {
                return false;
            }
        }
    }

    let (prologue_idx, frame) = match (prologue_idx, old_push) {
        (Some(idx), Some(old)) => {
            let merged = MovemFrame {
                size: old.size,
                regs: old.regs.union(regs),
            };
            buf.line_mut(idx).set_text(push_text(merged.size, merged.regs));
            (idx, merged)
        }
        _ => {
            let idx = first_instr_idx.unwrap_or(region.label_idx + 1);
            let frame = MovemFrame {
                size: Size::Long,
                regs,
            };
            buf.insert(idx, Line::new(push_text(frame.size, frame.regs)));
            end += 1;
            (idx, frame)
        }
    };

    let delta = added.len() as i64 * frame.stride();

    // Epilogues: union into each pop preceding a terminator, or synthesize
    // a pop of the added registers.
    let mut pop_indices = Vec::new();
    let mut idx = prologue_idx + 1;
    while idx < end {
        if matches!(flow_kind(buf.line(idx)), FlowKind::Return) {
            if idx > 0 && parse_pop(buf.line(idx - 1)).is_some() {
                let old = parse_pop(buf.line(idx - 1)).unwrap();
                let merged = old.regs.union(frame.regs);
                buf.line_mut(idx - 1).set_text(pop_text(old.size, merged));
                pop_indices.push(idx - 1);
            } else {
                buf.insert(idx, Line::new(pop_text(frame.size, added)));
                pop_indices.push(idx);
                end += 1;
                idx += 1;
            }
        }
        idx += 1;
    }

    adjust_span(buf, prologue_idx + 1, end, &pop_indices, delta);
    debug!(
        target: "frame",
        regs = %format_movem_list(regs),
        delta,
        "frame_registers_added"
    );
    true
}

/// Remove one register from the enclosing function's push and pops,
/// subtracting its stride from every `sp` displacement in between. An
/// emptied `movem` becomes a commented-out line.
pub fn remove_register(buf: &mut AsmBuf, reg: Reg) -> bool {
    let Some(region) = enclosing_region(buf) else {
        return false;
    };
    let end = region.end;

    let mut prologue_idx = None;
    let mut seen_instrs = 0;
    for idx in region.label_idx + 1..end {
        let line = buf.line(idx);
        if line.instr().is_none() {
            continue;
        }
        if let Some(push) = parse_push(line) {
            if push.regs.contains(reg) {
                prologue_idx = Some((idx, push));
            }
            break;
        }
        seen_instrs += 1;
        if seen_instrs >= 2 {
            break;
        }
    }
    let Some((prologue_idx, push)) = prologue_idx else {
        return false;
    };

    let mut remaining = push.regs;
    remaining.remove(reg);
    if remaining.is_empty() {
        let old = buf.line(prologue_idx).text().to_string();
        buf.line_mut(prologue_idx).set_text(format!("# {old}"));
    } else {
        buf.line_mut(prologue_idx)
            .set_text(push_text(push.size, remaining));
    }

    let mut pop_indices = Vec::new();
    for idx in prologue_idx + 1..end {
        if !matches!(flow_kind(buf.line(idx)), FlowKind::Return) {
            continue;
        }
        if let Some(pop) = parse_pop(buf.line(idx - 1)) {
            if !pop.regs.contains(reg) {
                continue;
            }
            let mut rest = pop.regs;
            rest.remove(reg);
            if rest.is_empty() {
                let old = buf.line(idx - 1).text().to_string();
                buf.line_mut(idx - 1).set_text(format!("# {old}"));
            } else {
                buf.line_mut(idx - 1).set_text(pop_text(pop.size, rest));
            }
            pop_indices.push(idx - 1);
        }
    }

    adjust_span(buf, prologue_idx + 1, end, &pop_indices, -push.stride());
    debug!(target: "frame", reg = %reg, "frame_register_removed");
    true
}

fn adjust_span(buf: &mut AsmBuf, start: usize, end: usize, skip: &[usize], delta: i64) {
    if delta == 0 {
        return;
    }
    for idx in start..end.min(buf.len()) {
        if skip.contains(&idx) {
            continue;
        }
        let line = buf.line(idx);
        if line.pinned {
            if patterns::SP_DISP_PREFIX.is_match(line.text())
                || patterns::SP_DISP_COMMA.is_match(line.text())
            {
                warn!(
                    target: "frame",
                    line = line.text(),
                    "pinned_line_with_sp_displacement_not_adjusted"
                );
            }
            continue;
        }
        adjust_sp_displacements(buf.line_mut(idx), delta);
    }
}

/// Re-offset both `d(%sp...)` and `(d,%sp...)` displacement spellings.
pub fn adjust_sp_displacements(line: &mut Line, delta: i64) {
    let text = line.text().to_string();
    let pass1 = patterns::SP_DISP_PREFIX.replace_all(&text, |caps: &regex::Captures<'_>| {
        let v: i64 = caps[1].parse().unwrap_or(0);
        format!("{}(%sp", v + delta)
    });
    let pass2 = patterns::SP_DISP_COMMA.replace_all(&pass1, |caps: &regex::Captures<'_>| {
        let v: i64 = caps[1].parse().unwrap_or(0);
        format!("({},%sp", v + delta)
    });
    if pass2.as_ref() != text.as_str() {
        line.set_text(pass2.into_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(lines: &[&str], cursor: usize) -> AsmBuf {
        let mut b = AsmBuf::load(lines.iter().map(|l| Line::new(*l)).collect());
        b.set_cursor(cursor);
        b
    }

    fn texts(buf: &AsmBuf) -> Vec<String> {
        buf.lines().iter().map(|l| l.text().to_string()).collect()
    }

    #[test]
    fn synthesizes_push_and_pop() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "move.l 8(%sp),%d0",
                "rts",
                ".size f,.-f",
            ],
            3,
        );
        assert!(add_registers(&mut b, RegSet::single(Reg::D2)));
        assert_eq!(
            texts(&b),
            vec![
                ".type f,@function",
                "f:",
                "movem.l %d2,-(%sp)",
                "move.l 12(%sp),%d0",
                "movem.l (%sp)+,%d2",
                "rts",
                ".size f,.-f",
            ]
        );
    }

    #[test]
    fn unions_into_existing_frame() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "movem.l %d3-%d4,-(%sp)",
                "move.w 10(%sp),%d3",
                "movem.l (%sp)+,%d3-%d4",
                "rts",
                ".size f,.-f",
            ],
            4,
        );
        assert!(add_registers(&mut b, RegSet::single(Reg::A2)));
        assert_eq!(
            texts(&b),
            vec![
                ".type f,@function",
                "f:",
                "movem.l %d3-%d4/%a2,-(%sp)",
                "move.w 14(%sp),%d3",
                "movem.l (%sp)+,%d3-%d4/%a2",
                "rts",
                ".size f,.-f",
            ]
        );
    }

    #[test]
    fn rejects_scratch_outside_interrupts() {
        let mut b = buf(
            &[".type f,@function", "f:", "rts", ".size f,.-f"],
            2,
        );
        assert!(!add_registers(&mut b, RegSet::single(Reg::D0)));
        // But ensure_saved succeeds without touching the frame.
        assert!(ensure_saved(&mut b, Reg::D0));
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn interrupt_handlers_push_scratch_too() {
        let mut b = buf(
            &[".type h,@function", "h:", "clr.w 4(%sp)", "rte", ".size h,.-h"],
            3,
        );
        assert!(add_registers(&mut b, RegSet::single(Reg::D0)));
        assert_eq!(
            texts(&b),
            vec![
                ".type h,@function",
                "h:",
                "movem.l %d0,-(%sp)",
                "clr.w 8(%sp)",
                "movem.l (%sp)+,%d0",
                "rte",
                ".size h,.-h",
            ]
        );
    }

    #[test]
    fn removal_is_symmetric() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "movem.l %d2,-(%sp)",
                "move.l 8(%sp),%d2",
                "movem.l (%sp)+,%d2",
                "rts",
                ".size f,.-f",
            ],
            3,
        );
        assert!(remove_register(&mut b, Reg::D2));
        assert_eq!(
            texts(&b),
            vec![
                ".type f,@function",
                "f:",
                "# movem.l %d2,-(%sp)",
                "move.l 4(%sp),%d2",
                "# movem.l (%sp)+,%d2",
                "rts",
                ".size f,.-f",
            ]
        );
    }

    #[test]
    fn adjusts_both_displacement_spellings() {
        let mut line = Line::new("move.l (8,%sp),-4(%sp,%d1.w)");
        adjust_sp_displacements(&mut line, 4);
        assert_eq!(line.text(), "move.l (12,%sp),0(%sp,%d1.w)");
    }

    #[test]
    fn multiple_epilogues_each_get_a_pop() {
        let mut b = buf(
            &[
                ".type f,@function",
                "f:",
                "beq .L1",
                "rts",
                ".L1:",
                "rts",
                ".size f,.-f",
            ],
            2,
        );
        assert!(add_registers(&mut b, RegSet::single(Reg::D5)));
        let t = texts(&b);
        assert_eq!(t[2], "movem.l %d5,-(%sp)");
        assert_eq!(
            t.iter().filter(|l| l.contains("(%sp)+,%d5")).count(),
            2
        );
    }
}
