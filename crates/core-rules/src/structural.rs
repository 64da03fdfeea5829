//! Structural rules: `movem` degeneration. A single-register `movem`
//! becomes a plain `move` (with `ext.l` where `movem.w` guaranteed sign
//! extension into a data register), and on the final pass a two-register
//! `movem.l (sp)+` pop expands into two `move.l` pops, which the 68000
//! executes faster at the same size.

use core_config::OptimizerConfig;
use core_line::{AsmBuf, Line, Operand, Reg, RegSet, Size};

use crate::{record, RewriteRecord};

fn movem_list(op: &Operand) -> Option<RegSet> {
    match op {
        Operand::MovemList(set) => Some(*set),
        Operand::Data(r) | Operand::Addr(r) => Some(RegSet::single(*r)),
        _ => None,
    }
}

fn degenerate(line: &Line) -> Option<(&'static str, Vec<Line>)> {
    let ins = line.instr()?;
    if ins.op != "movem" {
        return None;
    }
    let size = ins.size?;
    let (a, b) = (ins.operand(0)?, ins.operand(1)?);
    if b.is_memory() {
        // Store direction.
        let list = movem_list(a)?;
        if list.len() != 1 {
            return None;
        }
        let reg = list.first().unwrap();
        return Some((
            "movem-single-store",
            vec![Line::new(format!(
                "move.{} {},{}",
                size.suffix(),
                reg.name(),
                ins.raw[1]
            ))],
        ));
    }
    let list = movem_list(b)?;
    if list.len() != 1 {
        return None;
    }
    let reg = list.first().unwrap();
    let mut lines = vec![Line::new(format!(
        "move.{} {},{}",
        size.suffix(),
        ins.raw[0],
        reg.name()
    ))];
    if size == Size::Word && reg.is_data() {
        // movem.w sign-extends each word on the way in; move.w does not.
        lines.push(Line::new(format!("ext.l {}", reg.name())));
    }
    Some(("movem-single-load", lines))
}

fn expand_pop_pair(line: &Line) -> Option<(&'static str, Vec<Line>)> {
    let ins = line.instr()?;
    if ins.op != "movem" || ins.size != Some(Size::Long) {
        return None;
    }
    match ins.operand(0)? {
        Operand::PostInc(Reg::A7) => {}
        _ => return None,
    }
    let list = movem_list(ins.operand(1)?)?;
    if list.len() != 2 {
        return None;
    }
    let regs: Vec<Reg> = list.iter().collect();
    Some((
        "movem-pop-expand",
        regs.iter()
            .map(|r| Line::new(format!("move.l (%sp)+,{}", r.name())))
            .collect(),
    ))
}

pub fn run_structural(
    buf: &mut AsmBuf,
    cfg: &OptimizerConfig,
    final_pass: bool,
) -> Vec<RewriteRecord> {
    let _ = cfg;
    let mut records = Vec::new();
    let mut i = 0usize;
    while i < buf.len() {
        buf.set_cursor(i + 1);
        let line = buf.line(i);
        if line.pinned {
            i += 1;
            continue;
        }
        let hit = degenerate(line)
            .or_else(|| final_pass.then(|| expand_pop_pair(line)).flatten());
        match hit {
            Some((name, replacement)) => {
                let before = line.clone();
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
            None => i += 1,
        }
    }
    records
}
