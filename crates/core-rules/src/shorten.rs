//! Short-branch shortening (second pass only): every `bcc`/`bra`/`bsr`
//! (and their `jcc`/`jra`/`jsr` pseudo spellings) whose target lands
//! within an 8-bit displacement of the instruction's end gets the `.s`
//! suffix. Distances come from the byte sizer; a region the sizer cannot
//! measure is left alone.

use core_line::{patterns, usage::is_condition_code, AsmBuf, Line, Operand};
use core_sizer::layout;
use tracing::warn;

use crate::{record, RewriteRecord};

/// Mnemonic the instruction shortens to, when it is a branch at all.
fn short_form(op: &str) -> Option<String> {
    match op {
        "bra" | "jra" => Some("bra".to_string()),
        "bsr" | "jbsr" | "jsr" => Some("bsr".to_string()),
        _ => {
            if let Some(cc) = op.strip_prefix('b') {
                if is_condition_code(cc) {
                    return Some(op.to_string());
                }
            }
            if let Some(cc) = op.strip_prefix('j') {
                if is_condition_code(cc) {
                    return Some(format!("b{cc}"));
                }
            }
            None
        }
    }
}

/// Function regions: `[.type, .size]` index spans.
fn regions(buf: &AsmBuf) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (idx, line) in buf.lines().iter().enumerate() {
        if patterns::TYPE_FUNCTION.is_match(line.text()) {
            start = Some(idx);
        } else if patterns::SIZE_DIRECTIVE.is_match(line.text()) {
            if let Some(s) = start.take() {
                spans.push((s, idx));
            }
        }
    }
    spans
}

pub fn run_shorten(buf: &mut AsmBuf) -> Vec<RewriteRecord> {
    let mut records = Vec::new();
    for (start, end) in regions(buf) {
        // Distances only settle once no further branch shrinks; a few
        // rounds are plenty.
        for _ in 0..4 {
            let region = &buf.lines()[start..end];
            let measured = match layout(region) {
                Ok(l) => l,
                Err(e) => {
                    warn!(target: "sizer", error = %e, "region_unmeasurable_no_shortening");
                    break;
                }
            };
            let mut rewrites: Vec<(usize, String)> = Vec::new();
            for (rel, line) in region.iter().enumerate() {
                if line.pinned {
                    continue;
                }
                let Some(ins) = line.instr() else { continue };
                if ins.short || ins.op == "jmp" {
                    continue;
                }
                let Some(short_op) = short_form(&ins.op) else {
                    continue;
                };
                let target = match ins.operand(0) {
                    Some(Operand::Abs(sym)) => sym.clone(),
                    _ => continue,
                };
                let Some(&target_off) = measured.labels.get(&target) else {
                    continue;
                };
                let disp = target_off - (measured.offsets[rel] + 2);
                if disp != 0 && (-126..=127).contains(&disp) {
                    rewrites.push((start + rel, format!("{short_op}.s {target}")));
                }
            }
            if rewrites.is_empty() {
                break;
            }
            for (idx, text) in rewrites {
                let before = buf.line(idx).clone();
                let after = Line::new(text);
                record(
                    &mut records,
                    "short-branch",
                    before.origin,
                    std::slice::from_ref(&before),
                    std::slice::from_ref(&after),
                );
                *buf.line_mut(idx) = after;
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Vec<String> {
        let mut buf = AsmBuf::load(lines.iter().map(|l| Line::new(*l)).collect());
        run_shorten(&mut buf);
        buf.lines().iter().map(|l| l.text().to_string()).collect()
    }

    #[test]
    fn nearby_branch_shortens() {
        let out = run(&[
            ".type f,@function",
            "f:",
            "bra .L1",
            "moveq #0,%d0",
            ".L1:",
            "rts",
            ".size f,.-f",
        ]);
        assert_eq!(out[2], "bra.s .L1");
    }

    #[test]
    fn far_branch_stays_long() {
        let mut lines = vec![
            ".type f,@function".to_string(),
            "f:".to_string(),
            "bra .L1".to_string(),
        ];
        for _ in 0..40 {
            lines.push("move.l #70000,%d0".to_string()); // 6 bytes each
        }
        lines.push(".L1:".to_string());
        lines.push("rts".to_string());
        lines.push(".size f,.-f".to_string());
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let out = run(&refs);
        assert_eq!(out[2], "bra .L1");
    }

    #[test]
    fn local_jsr_becomes_short_bsr() {
        let out = run(&[
            ".type f,@function",
            "f:",
            "jsr .Lhelper",
            "rts",
            ".Lhelper:",
            "rts",
            ".size f,.-f",
        ]);
        assert_eq!(out[2], "bsr.s .Lhelper");
    }

    #[test]
    fn backward_branch_shortens() {
        let out = run(&[
            ".type f,@function",
            "f:",
            ".L0:",
            "moveq #1,%d0",
            "bne .L0",
            "rts",
            ".size f,.-f",
        ]);
        assert_eq!(out[4], "bne.s .L0");
    }

    #[test]
    fn unmeasurable_region_is_left_alone() {
        let out = run(&[
            ".type f,@function",
            "f:",
            "frobnicate %d0",
            "bra .L1",
            ".L1:",
            "rts",
            ".size f,.-f",
        ]);
        assert_eq!(out[3], "bra .L1");
    }
}
