//! Immediate materialization: `move.l #v,dN` becomes `moveq` (optionally
//! followed by `not.b`/`not.w`/`swap`) for the values where sign extension
//! reconstructs the constant. The `not`/`swap` forms leave different CCR
//! bits than the original `move`.

use core_line::{Disp, Instr, Line, Operand, Reg, Size};

use crate::RuleCtx;

/// Signed and unsigned 32-bit views of an immediate.
fn imm32(value: i64) -> Option<(i64, i64)> {
    if !(-0x8000_0000..=0xFFFF_FFFF).contains(&value) {
        return None;
    }
    let unsigned = (value as u32) as i64;
    let signed = (value as u32) as i32 as i64;
    Some((signed, unsigned))
}

pub fn materialize_immediate(ins: &Instr, _ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if ins.op != "move" || ins.size != Some(Size::Long) {
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
    let (sv, uv) = imm32(value)?;
    build_long_immediate(sv, uv, reg)
}

fn build_long_immediate(sv: i64, uv: i64, reg: Reg) -> Option<Vec<Line>> {
    let name = reg.name();
    if (-128..=127).contains(&sv) {
        return Some(vec![Line::new(format!("moveq #{sv},{name}"))]);
    }
    if (128..=255).contains(&uv) {
        // moveq keeps the upper bytes zero; not.b flips only the low one.
        return Some(vec![
            Line::new(format!("moveq #{},{name}", 255 - uv)),
            Line::new(format!("not.b {name}")),
        ]);
    }
    if (-256..=-129).contains(&sv) {
        let seed = !(sv & 0xFF) as u8 as i8 as i64;
        return Some(vec![
            Line::new(format!("moveq #{seed},{name}")),
            Line::new(format!("not.b {name}")),
        ]);
    }
    if (65408..=65535).contains(&uv) {
        return Some(vec![
            Line::new(format!("moveq #{},{name}", 65535 - uv)),
            Line::new(format!("not.w {name}")),
        ]);
    }
    // moveq sign-extends, so a negative seed leaves 0xFFFF in the low
    // word after the swap; only a non-negative high word is reachable.
    if sv != 0 && sv & 0xFFFF == 0 && (0..=127).contains(&(sv >> 16)) {
        return Some(vec![
            Line::new(format!("moveq #{},{name}", sv >> 16)),
            Line::new(format!("swap {name}")),
        ]);
    }
    None
}

/// `move.l #0,aN` -> `suba.l aN,aN` (and `suba` leaves CCR untouched).
pub fn clear_address_register(ins: &Instr, _ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if (ins.op != "move" && ins.op != "movea") || ins.size != Some(Size::Long) {
        return None;
    }
    match (ins.operand(0)?, ins.operand(1)?) {
        (Operand::Imm(Disp::Num(0)), Operand::Addr(reg)) if *reg != Reg::A7 => Some(vec![
            Line::new(format!("suba.l {},{}", reg.name(), reg.name())),
        ]),
        _ => None,
    }
}

/// `move.w/l #0,-(sp)` -> `clr.w/l -(sp)`. `clr` performs a read cycle on
/// the 68000, which is why this stays behind its aggressive flag.
pub fn clr_stack_push(ins: &Instr, ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if !ctx.cfg.use_aggressive_clr_sp {
        return None;
    }
    if ins.op != "move" {
        return None;
    }
    let size = ins.size?;
    if size == Size::Byte {
        return None;
    }
    match (ins.operand(0)?, ins.operand(1)?) {
        (Operand::Imm(Disp::Num(0)), Operand::PreDec(Reg::A7)) => Some(vec![Line::new(format!(
            "clr.{} -(%sp)",
            size.suffix()
        ))]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: Vec<Line>) -> Vec<String> {
        lines.into_iter().map(|l| l.text().to_string()).collect()
    }

    #[test]
    fn moveq_window() {
        assert_eq!(
            texts(build_long_immediate(0, 0, Reg::D0).unwrap()),
            vec!["moveq #0,%d0"]
        );
        assert_eq!(
            texts(build_long_immediate(-128, 0xFFFFFF80, Reg::D0).unwrap()),
            vec!["moveq #-128,%d0"]
        );
    }

    #[test]
    fn not_b_form_matches_spec_example() {
        // 200 = 255 - 55
        assert_eq!(
            texts(build_long_immediate(200, 200, Reg::D1).unwrap()),
            vec!["moveq #55,%d1", "not.b %d1"]
        );
    }

    #[test]
    fn negative_not_b_form() {
        // -200 = 0xFFFFFF38; moveq #-57 gives 0xFFFFFFC7, not.b flips to 0x38.
        let (sv, uv) = imm32(-200).unwrap();
        assert_eq!(
            texts(build_long_immediate(sv, uv, Reg::D2).unwrap()),
            vec!["moveq #-57,%d2", "not.b %d2"]
        );
    }

    #[test]
    fn not_w_and_swap_forms() {
        assert_eq!(
            texts(build_long_immediate(65535, 65535, Reg::D3).unwrap()),
            vec!["moveq #0,%d3", "not.w %d3"]
        );
        assert_eq!(
            texts(build_long_immediate(0x20_0000, 0x20_0000, Reg::D4).unwrap()),
            vec!["moveq #32,%d4", "swap %d4"]
        );
        assert_eq!(
            texts(build_long_immediate(0x7F_0000, 0x7F_0000, Reg::D4).unwrap()),
            vec!["moveq #127,%d4", "swap %d4"]
        );
        // A negative high word is not reachable: moveq #-1 / swap would
        // leave 0xFFFF in the low word, not zero.
        let (sv, uv) = imm32(-65536).unwrap();
        assert!(build_long_immediate(sv, uv, Reg::D5).is_none());
    }

    #[test]
    fn out_of_reach_values_stay() {
        assert!(build_long_immediate(1000, 1000, Reg::D0).is_none());
        assert!(build_long_immediate(0x12345678, 0x12345678, Reg::D0).is_none());
    }
}
