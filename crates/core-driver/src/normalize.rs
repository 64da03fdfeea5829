//! GAS-syntax normalization: bring the compiler's idioms into one
//! canonical spelling so every later rewrite needs only one pattern.
//! Applying the pass twice yields the same text as applying it once.

use core_config::OptimizerConfig;
use core_line::{from_movem_mask, format_movem_list, patterns, AsmBuf, Disp, Line, Operand};
use tracing::debug;

pub fn run(buf: &mut AsmBuf, cfg: &OptimizerConfig) -> usize {
    let mut changed = 0usize;
    for idx in 0..buf.len() {
        if buf.line(idx).pinned {
            continue;
        }
        let old = buf.line(idx).text().to_string();
        let new = normalize_line(&old, cfg);
        if new != old {
            buf.line_mut(idx).set_text(new);
            changed += 1;
        }
    }
    changed += rename_local_labels(buf);
    if changed > 0 {
        debug!(target: "driver", lines = changed, "normalized");
    }
    changed
}

fn normalize_line(text: &str, cfg: &OptimizerConfig) -> String {
    let mut text = text.to_string();

    // `%pc@(disp,%dN:s)` -> `disp(%pc,%dN.s)`
    if text.contains("%pc@") {
        text = patterns::PC_AT
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                format!("{}(%pc,%{}.{})", &caps[1], &caps[2], &caps[3])
            })
            .into_owned();
    }

    // `%fp` is `%a6`.
    if text.contains("%fp") {
        text = patterns::FP_ALIAS.replace_all(&text, "%a6").into_owned();
    }

    // Optional: long-indexed addressing down to word indexing. Off by
    // default; it changes addressing when the index exceeds 16 bits.
    if cfg.use_aggressive_replace_long_indirect_by_word && text.contains(".l)") {
        text = patterns::INDEX_LONG.replace_all(&text, "${1}.w)").into_owned();
    }

    normalize_operands(&text).unwrap_or(text)
}

/// Operand-level canonicalization: numeric movem masks become symbolic
/// lists, redundant parentheses around bare symbols and immediates go
/// away. Returns `None` when the line has no operands to rework.
fn normalize_operands(text: &str) -> Option<String> {
    let line = Line::new(text);
    let ins = line.instr()?;
    let mut raw = ins.raw.clone();
    let mut touched = false;

    if ins.op == "movem" && raw.len() == 2 {
        for pos in 0..2 {
            if let Some(Operand::Imm(Disp::Num(mask))) = ins.operand(pos).cloned() {
                let predec = matches!(ins.operand(1), Some(Operand::PreDec(_)));
                let set = from_movem_mask(mask as u16, predec);
                raw[pos] = format_movem_list(set);
                touched = true;
            }
        }
    }

    if matches!(ins.op.as_str(), "jmp" | "jsr" | "jra" | "jbsr" | "bra" | "bsr" | "pea") {
        if let Some(first) = raw.first_mut() {
            if let Some(caps) = patterns::PAREN_SYMBOL.captures(first) {
                *first = caps[1].to_string();
                touched = true;
            }
        }
    }

    for part in raw.iter_mut() {
        if let Some(caps) = patterns::PAREN_IMMEDIATE.captures(part) {
            *part = format!("#{}", &caps[1]);
            touched = true;
        }
    }

    if !touched {
        return None;
    }
    let size = match ins.size {
        Some(s) => format!(".{s}"),
        None => {
            if ins.short {
                ".s".to_string()
            } else {
                String::new()
            }
        }
    };
    Some(format!("{}{} {}", ins.op, size, raw.join(",")))
}

/// Rename compiler-local numeric labels (`0:`..`9:`, referenced as
/// `0f`/`0b`) to unique names, rewriting every referencing branch. GAS
/// resolves these positionally; so do we.
fn rename_local_labels(buf: &mut AsmBuf) -> usize {
    let mut defs: Vec<(usize, char, String)> = Vec::new();
    let mut serial = 0usize;
    for idx in 0..buf.len() {
        if buf.line(idx).pinned {
            continue;
        }
        let digit = match buf.line(idx).numeric_label() {
            Some(d) => d.chars().next().unwrap(),
            None => continue,
        };
        let name = format!(".LN{digit}_{serial}");
        serial += 1;
        defs.push((idx, digit, name));
    }
    if defs.is_empty() {
        return 0;
    }

    let mut changed = 0usize;
    for (idx, _, name) in &defs {
        let old = buf.line(*idx).text().to_string();
        let rest = old[2..].to_string(); // past `N:`
        buf.line_mut(*idx).set_text(format!("{name}:{rest}"));
        changed += 1;
    }

    for idx in 0..buf.len() {
        if buf.line(idx).pinned {
            continue;
        }
        let Some(ins) = buf.line(idx).instr() else {
            continue;
        };
        let mut raw = ins.raw.clone();
        let mut touched = false;
        for part in raw.iter_mut() {
            let Some(caps) = patterns::NUMERIC_LABEL_REF.captures(part) else {
                continue;
            };
            let digit = caps[1].chars().next().unwrap();
            let forward = &caps[2] == "f";
            let resolved = if forward {
                defs.iter().find(|(d, c, _)| *d > idx && *c == digit)
            } else {
                defs.iter().rev().find(|(d, c, _)| *d <= idx && *c == digit)
            };
            if let Some((_, _, name)) = resolved {
                *part = name.clone();
                touched = true;
            }
        }
        if touched {
            let size = match ins.size {
                Some(s) => format!(".{s}"),
                None if ins.short => ".s".to_string(),
                None => String::new(),
            };
            buf.line_mut(idx)
                .set_text(format!("{}{} {}", ins.op, size, raw.join(",")));
            changed += 1;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(text: &str) -> String {
        normalize_line(text, &OptimizerConfig::default())
    }

    #[test]
    fn pc_at_form_is_rewritten() {
        assert_eq!(norm("jmp %pc@(2,%d0:w)"), "jmp 2(%pc,%d0.w)");
    }

    #[test]
    fn fp_becomes_a6() {
        assert_eq!(norm("move.l 8(%fp),%d0"), "move.l 8(%a6),%d0");
    }

    #[test]
    fn long_index_stays_without_flag() {
        assert_eq!(norm("move.w 4(%a0,%d1.l),%d0"), "move.w 4(%a0,%d1.l),%d0");
        let mut cfg = OptimizerConfig::default();
        cfg.use_aggressive_replace_long_indirect_by_word = true;
        assert_eq!(
            normalize_line("move.w 4(%a0,%d1.l),%d0", &cfg),
            "move.w 4(%a0,%d1.w),%d0"
        );
    }

    #[test]
    fn movem_mask_becomes_symbolic() {
        // d2-d3 push: predecrement mask bits are reversed.
        assert_eq!(
            norm("movem.l #12288,-(%sp)"),
            "movem.l %d2-%d3,-(%sp)"
        );
        assert_eq!(
            norm("movem.l (%sp)+,#12"),
            "movem.l (%sp)+,%d2-%d3"
        );
    }

    #[test]
    fn redundant_parens_are_stripped() {
        assert_eq!(norm("jsr (frobnicate)"), "jsr frobnicate");
        assert_eq!(norm("move.l #(42),%d0"), "move.l #42,%d0");
        // Register indirection is not redundant.
        assert_eq!(norm("jsr (%a0)"), "jsr (%a0)");
    }

    #[test]
    fn normalization_is_idempotent() {
        for text in [
            "jmp %pc@(2,%d0:w)",
            "move.l 8(%fp),%d0",
            "movem.l #12288,-(%sp)",
            "jsr (frobnicate)",
        ] {
            let once = norm(text);
            assert_eq!(norm(&once), once, "for {text}");
        }
    }

    #[test]
    fn local_labels_become_unique_names() {
        let mut buf = AsmBuf::load(
            ["1:", "move.l %d0,%d1", "bne 1b", "bra 2f", "2:", "rts"]
                .iter()
                .map(|t| Line::new(*t))
                .collect(),
        );
        rename_local_labels(&mut buf);
        let texts: Vec<&str> = buf.lines().iter().map(|l| l.text()).collect();
        assert_eq!(
            texts,
            vec![
                ".LN1_0:",
                "move.l %d0,%d1",
                "bne .LN1_0",
                "bra .LN2_1",
                ".LN2_1:",
                "rts"
            ]
        );
    }
}
