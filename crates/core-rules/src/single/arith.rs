//! Arithmetic, comparison, mask and shift peepholes.

use core_line::{Disp, Instr, Line, Operand, Size};

use crate::RuleCtx;

fn quick_target_ok(op: &Operand) -> bool {
    match op {
        Operand::Data(_) | Operand::Addr(_) => true,
        Operand::Indirect(_)
        | Operand::PostInc(_)
        | Operand::PreDec(_)
        | Operand::Disp { .. }
        | Operand::Index { .. }
        | Operand::Abs(_) => true,
        _ => false,
    }
}

/// `add/sub #1..8` (any spelling) -> `addq`/`subq`; negated immediates
/// flip the opcode.
pub fn quick_arithmetic(ins: &Instr, _ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    let add = match ins.op.as_str() {
        "add" | "addi" | "adda" => true,
        "sub" | "subi" | "suba" => false,
        _ => return None,
    };
    let size = ins.size?;
    let value = match ins.operand(0)? {
        Operand::Imm(Disp::Num(v)) => *v,
        _ => return None,
    };
    let dst = ins.operand(1)?;
    if !quick_target_ok(dst) {
        return None;
    }
    let (op, magnitude) = if (1..=8).contains(&value) {
        (if add { "addq" } else { "subq" }, value)
    } else if (-8..=-1).contains(&value) {
        (if add { "subq" } else { "addq" }, -value)
    } else {
        return None;
    };
    Some(vec![Line::new(format!(
        "{op}.{} #{magnitude},{}",
        size.suffix(),
        ins.raw[1]
    ))])
}

/// `addq.l/subq.l #v,aN` -> `.w`: word operations on an address register
/// still update all 32 bits (the operand is sign-extended), so the shrink
/// is safe there; gated regardless, loop counters being the intended use.
pub fn quick_to_word_on_addr(ins: &Instr, ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if !ctx.cfg.use_replace_addql_subql_by_addqw_subqw {
        return None;
    }
    if ins.op != "addq" && ins.op != "subq" {
        return None;
    }
    if ins.size != Some(Size::Long) {
        return None;
    }
    match ins.operand(1)? {
        Operand::Addr(_) => {}
        _ => return None,
    }
    Some(vec![Line::new(format!(
        "{}.w {},{}",
        ins.op, ins.raw[0], ins.raw[1]
    ))])
}

/// `cmp #0,X` -> `tst X`. Not for address registers (the 68000 has no
/// `tst aN`) and not for pc-relative sources.
pub fn compare_zero_to_tst(ins: &Instr, _ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if ins.op != "cmp" && ins.op != "cmpi" {
        return None;
    }
    let size = ins.size?;
    match ins.operand(0)? {
        Operand::Imm(Disp::Num(0)) => {}
        _ => return None,
    }
    match ins.operand(1)? {
        Operand::Data(_)
        | Operand::Indirect(_)
        | Operand::PostInc(_)
        | Operand::PreDec(_)
        | Operand::Disp { .. }
        | Operand::Index { .. }
        | Operand::Abs(_) => {}
        _ => return None,
    }
    Some(vec![Line::new(format!(
        "tst.{} {}",
        size.suffix(),
        ins.raw[1]
    ))])
}

/// Single-bit masks: `and.l` with one cleared bit -> `bclr`, `or.l` with
/// one set bit -> `bset`, `eor.l` -> `bchg`. The bit instructions set Z
/// from the old bit, so CCR differs from the logical forms.
pub fn single_bit_mask(ins: &Instr, _ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if ins.size != Some(Size::Long) {
        return None;
    }
    let value = match ins.operand(0)? {
        Operand::Imm(Disp::Num(v)) => *v,
        _ => return None,
    };
    let reg = match ins.operand(1)? {
        Operand::Data(r) => *r,
        _ => return None,
    };
    let mask = (value as u32) as u64;
    let (op, bit) = match ins.op.as_str() {
        "and" | "andi" => {
            let cleared = !mask & 0xFFFF_FFFF;
            if cleared.count_ones() != 1 {
                return None;
            }
            ("bclr", cleared.trailing_zeros())
        }
        "or" | "ori" => {
            if mask.count_ones() != 1 {
                return None;
            }
            ("bset", mask.trailing_zeros())
        }
        "eor" | "eori" => {
            if mask.count_ones() != 1 {
                return None;
            }
            ("bchg", mask.trailing_zeros())
        }
        _ => return None,
    };
    Some(vec![Line::new(format!("{op} #{bit},{}", reg.name()))])
}

/// Shift-by-16 lowerings on data registers: the halves can be moved with
/// `swap` instead of iterating the shifter.
pub fn shift_by_sixteen(ins: &Instr, _ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if ins.size != Some(Size::Long) {
        return None;
    }
    match ins.operand(0)? {
        Operand::Imm(Disp::Num(16)) => {}
        _ => return None,
    }
    let reg = match ins.operand(1)? {
        Operand::Data(r) => *r,
        _ => return None,
    };
    let name = reg.name();
    let lines = match ins.op.as_str() {
        "lsl" | "asl" => vec![
            Line::new(format!("swap {name}")),
            Line::new(format!("clr.w {name}")),
        ],
        "lsr" => vec![
            Line::new(format!("clr.w {name}")),
            Line::new(format!("swap {name}")),
        ],
        "asr" => vec![
            Line::new(format!("swap {name}")),
            Line::new(format!("ext.l {name}")),
        ],
        _ => return None,
    };
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_config::OptimizerConfig;
    use core_flow::DeclaredFunctions;
    use core_line::AsmBuf;

    fn apply(
        rule: fn(&Instr, &mut RuleCtx<'_>) -> Option<Vec<Line>>,
        text: &str,
    ) -> Option<Vec<String>> {
        let mut buf = AsmBuf::load(vec![Line::new(text)]);
        buf.set_cursor(1);
        let cfg = OptimizerConfig::default();
        let funcs = DeclaredFunctions::default();
        let mut ctx = RuleCtx {
            buf: &mut buf,
            cfg: &cfg,
            funcs: &funcs,
        };
        let ins = ctx.buf.line(0).instr()?;
        rule(&ins, &mut ctx).map(|ls| ls.into_iter().map(|l| l.text().to_string()).collect())
    }

    #[test]
    fn quick_forms() {
        assert_eq!(
            apply(quick_arithmetic, "add.l #4,%d0"),
            Some(vec!["addq.l #4,%d0".to_string()])
        );
        assert_eq!(
            apply(quick_arithmetic, "sub.w #-3,%d1"),
            Some(vec!["addq.w #3,%d1".to_string()])
        );
        assert_eq!(apply(quick_arithmetic, "add.l #9,%d0"), None);
    }

    #[test]
    fn tst_rewrite() {
        assert_eq!(
            apply(compare_zero_to_tst, "cmp.l #0,%d3"),
            Some(vec!["tst.l %d3".to_string()])
        );
        assert_eq!(apply(compare_zero_to_tst, "cmp.l #0,%a3"), None);
        assert_eq!(apply(compare_zero_to_tst, "cmp.l #1,%d3"), None);
    }

    #[test]
    fn mask_rewrites() {
        assert_eq!(
            apply(single_bit_mask, "and.l #-3,%d0"),
            Some(vec!["bclr #1,%d0".to_string()])
        );
        assert_eq!(
            apply(single_bit_mask, "or.l #8,%d0"),
            Some(vec!["bset #3,%d0".to_string()])
        );
        assert_eq!(
            apply(single_bit_mask, "eor.l #16,%d0"),
            Some(vec!["bchg #4,%d0".to_string()])
        );
        assert_eq!(apply(single_bit_mask, "and.l #-4,%d0"), None);
    }

    #[test]
    fn shift_lowerings() {
        assert_eq!(
            apply(shift_by_sixteen, "lsl.l #16,%d0"),
            Some(vec!["swap %d0".to_string(), "clr.w %d0".to_string()])
        );
        assert_eq!(
            apply(shift_by_sixteen, "lsr.l #16,%d0"),
            Some(vec!["clr.w %d0".to_string(), "swap %d0".to_string()])
        );
        assert_eq!(
            apply(shift_by_sixteen, "asr.l #16,%d0"),
            Some(vec!["swap %d0".to_string(), "ext.l %d0".to_string()])
        );
        assert_eq!(apply(shift_by_sixteen, "lsl.l #8,%d0"), None);
    }
}
