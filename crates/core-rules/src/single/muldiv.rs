//! Constant multiply and divide lowering. Each constant in reach becomes
//! a fixed doubling/add chain (`move` / `add` / `lsl` / `neg`), in the
//! word-only flavour when the high half does not matter, or extended to
//! 32-bit arithmetic when it does. Scratch registers come from the
//! liveness query and are committed through the stack-frame maintainer.

use core_line::{Disp, Instr, Line, Operand, Reg, RegSet, Size};

use crate::RuleCtx;

/// Replacement-length budget. `mulu.w` costs ~70 cycles; a handful of
/// 4-cycle adds wins, a long chain does not.
const MAX_OPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Run of doublings (`add dN,dN` or one `lsl`).
    Double(u32),
    /// Add the saved original value.
    AddOrig,
}

/// Doubling/add plan for `n >= 2`, most significant bit first.
fn shift_add_plan(n: u64) -> Vec<Step> {
    let bits = 64 - n.leading_zeros();
    let mut steps = Vec::new();
    let mut pending = 0u32;
    for i in (0..bits - 1).rev() {
        pending += 1;
        if (n >> i) & 1 == 1 {
            steps.push(Step::Double(pending));
            pending = 0;
            steps.push(Step::AddOrig);
        }
    }
    if pending > 0 {
        steps.push(Step::Double(pending));
    }
    steps
}

fn plan_needs_scratch(steps: &[Step]) -> bool {
    steps.iter().any(|s| *s == Step::AddOrig)
}

fn plan_cost(steps: &[Step]) -> usize {
    steps
        .iter()
        .map(|s| match s {
            // Three or more doublings collapse into one shift (two when
            // the count exceeds the shifter's immediate range).
            Step::Double(k) if *k >= 3 => usize::from(*k > 8) + 1,
            Step::Double(k) => *k as usize,
            Step::AddOrig => 1,
        })
        .sum()
}

fn emit_plan(out: &mut Vec<Line>, steps: &[Step], reg: Reg, scratch: Option<Reg>, size: Size) {
    let s = size.suffix();
    let name = reg.name();
    for step in steps {
        match step {
            Step::Double(k) if *k >= 3 => {
                let mut left = *k;
                while left > 0 {
                    let chunk = left.min(8);
                    out.push(Line::new(format!("lsl.{s} #{chunk},{name}")));
                    left -= chunk;
                }
            }
            Step::Double(k) => {
                for _ in 0..*k {
                    out.push(Line::new(format!("add.{s} {name},{name}")));
                }
            }
            Step::AddOrig => {
                let scratch = scratch.expect("plan with AddOrig needs a scratch register");
                out.push(Line::new(format!("add.{s} {},{name}", scratch.name())));
            }
        }
    }
}

pub fn multiply_by_constant(ins: &Instr, ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    let low_only = ctx.cfg.optimize_mul_high_word_not_important;
    let high_exact = ctx.cfg.optimize_mul_high_word_important;
    if !low_only && !high_exact {
        return None;
    }
    if (ins.op != "mulu" && ins.op != "muls") || ins.size != Some(Size::Word) {
        return None;
    }
    let signed = ins.op == "muls";
    let value = match ins.operand(0)? {
        Operand::Imm(Disp::Num(v)) => *v,
        _ => return None,
    };
    let reg = match ins.operand(1)? {
        Operand::Data(r) => *r,
        _ => return None,
    };
    let name = reg.name();

    // Normalize the constant per operand signedness.
    let (magnitude, negate) = if signed {
        let v = i64::from(value as i16);
        (v.unsigned_abs(), v < 0)
    } else {
        (u64::from(value as u16), false)
    };

    let mut out = Vec::new();
    if magnitude == 0 {
        return Some(vec![Line::new(format!("moveq #0,{name}"))]);
    }
    if high_exact {
        if signed {
            out.push(Line::new(format!("ext.l {name}")));
        } else {
            out.push(Line::new(format!("and.l #65535,{name}")));
        }
    }
    if magnitude == 1 {
        if negate {
            out.push(Line::new(format!(
                "neg.{} {name}",
                if high_exact { "l" } else { "w" }
            )));
        }
        // In the word-only flavour a multiply by one is simply dropped.
        return Some(out);
    }

    let steps = shift_add_plan(magnitude);
    let mut cost = plan_cost(&steps) + out.len() + usize::from(negate);
    let scratch = if plan_needs_scratch(&steps) {
        cost += 1;
        if cost > MAX_OPS {
            return None;
        }
        let scratch = ctx.find_free_data(1, RegSet::single(reg))?;
        if !ctx.ensure_saved(scratch) {
            return None;
        }
        Some(scratch)
    } else {
        if cost > MAX_OPS {
            return None;
        }
        None
    };

    let size = if high_exact { Size::Long } else { Size::Word };
    if let Some(scratch) = scratch {
        out.push(Line::new(format!(
            "move.{} {name},{}",
            size.suffix(),
            scratch.name()
        )));
    }
    emit_plan(&mut out, &steps, reg, scratch, size);
    if negate {
        out.push(Line::new(format!("neg.{} {name}", size.suffix())));
    }
    Some(out)
}

pub fn divide_by_constant(ins: &Instr, ctx: &mut RuleCtx<'_>) -> Option<Vec<Line>> {
    if !ctx.cfg.optimize_division_high_word_not_important {
        return None;
    }
    if (ins.op != "divu" && ins.op != "divs") || ins.size != Some(Size::Word) {
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
    let name = reg.name();
    if ins.op == "divu" {
        let value = u64::from(value as u16);
        if value == 1 {
            return Some(Vec::new());
        }
        if !value.is_power_of_two() {
            return None;
        }
        let shift = value.trailing_zeros();
        if !(1..=8).contains(&shift) {
            return None;
        }
        return Some(vec![Line::new(format!("lsr.w #{shift},{name}"))]);
    }
    // divs: only the branchless /2, which needs the sign bit in hand.
    if i64::from(value as i16) != 2 {
        return None;
    }
    let scratch = ctx.find_free_data(1, RegSet::single(reg))?;
    if !ctx.ensure_saved(scratch) {
        return None;
    }
    let sn = scratch.name();
    Some(vec![
        Line::new(format!("move.w {name},{sn}")),
        Line::new(format!("rol.w #1,{sn}")),
        Line::new(format!("and.w #1,{sn}")),
        Line::new(format!("add.w {sn},{name}")),
        Line::new(format!("asr.w #1,{name}")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_for_ten_is_double_double_add_double() {
        assert_eq!(
            shift_add_plan(10),
            vec![Step::Double(2), Step::AddOrig, Step::Double(1)]
        );
    }

    #[test]
    fn plan_for_powers_is_pure_doubling() {
        assert_eq!(shift_add_plan(8), vec![Step::Double(3)]);
        assert!(!plan_needs_scratch(&shift_add_plan(16)));
        assert!(plan_needs_scratch(&shift_add_plan(10)));
    }

    #[test]
    fn costs_collapse_long_runs() {
        assert_eq!(plan_cost(&shift_add_plan(8)), 1); // one lsl
        assert_eq!(plan_cost(&shift_add_plan(10)), 4); // 2 adds + add + add
        assert_eq!(plan_cost(&shift_add_plan(1024)), 2); // lsl #8, lsl #2
    }

    #[test]
    fn emitted_chain_for_ten_matches_doubling_sequence() {
        let steps = shift_add_plan(10);
        let mut out = vec![Line::new("move.w %d2,%d3")];
        emit_plan(&mut out, &steps, Reg::D2, Some(Reg::D3), Size::Word);
        let texts: Vec<&str> = out.iter().map(|l| l.text()).collect();
        assert_eq!(
            texts,
            vec![
                "move.w %d2,%d3",
                "add.w %d2,%d2",
                "add.w %d2,%d2",
                "add.w %d3,%d2",
                "add.w %d2,%d2",
            ]
        );
    }
}
