//! The line model: one trimmed assembly source line plus derived queries.

use crate::operand::{Operand, Size};
use crate::patterns;

/// Suffix that unconditionally pins a line against any rewrite.
pub const PIN_MARKER: &str = ";# DO_NOT_OPTIMIZE";

/// One source line. The text is held trimmed; mnemonic, size and operands
/// are derived on demand rather than cached, so a rewrite of the text never
/// leaves stale state behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    text: String,
    /// 1-based source line this text originated from, for diagnostics.
    /// Synthesized lines have none.
    pub origin: Option<u32>,
    /// Pinned lines are never rewritten (inline-asm regions, the
    /// `DO_NOT_OPTIMIZE` marker).
    pub pinned: bool,
}

impl Line {
    pub fn new(text: impl Into<String>) -> Line {
        let text = text.into().trim().to_string();
        let pinned = text.contains(PIN_MARKER);
        Line {
            text,
            origin: None,
            pinned,
        }
    }

    pub fn with_origin(text: impl Into<String>, origin: u32) -> Line {
        let mut line = Line::new(text);
        line.origin = Some(origin);
        line
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into().trim().to_string();
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_comment(&self) -> bool {
        self.text.starts_with('#') || self.text.starts_with('|')
    }

    /// The instruction part of the line: everything before a `|` comment
    /// or the pin marker.
    pub fn code(&self) -> &str {
        let mut end = self.text.len();
        if let Some(bar) = self.text.find('|') {
            end = end.min(bar);
        }
        if let Some(semi) = self.text.find(';') {
            end = end.min(semi);
        }
        self.text[..end].trim_end()
    }

    pub fn label(&self) -> Option<&str> {
        if self.is_comment() {
            return None;
        }
        patterns::LABEL
            .captures(&self.text)
            .map(|c| c.get(1).unwrap().as_str())
    }

    pub fn numeric_label(&self) -> Option<&str> {
        patterns::NUMERIC_LABEL
            .captures(&self.text)
            .map(|c| c.get(1).unwrap().as_str())
    }

    pub fn is_label(&self) -> bool {
        self.label().is_some() || self.numeric_label().is_some()
    }

    pub fn is_directive(&self) -> bool {
        self.code().starts_with('.') && !self.is_label()
    }

    /// `(.name, args)` for a directive line.
    pub fn directive(&self) -> Option<(&str, &str)> {
        if !self.is_directive() {
            return None;
        }
        let code = self.code();
        match code.split_once(char::is_whitespace) {
            Some((name, args)) => Some((name, args.trim())),
            None => Some((code, "")),
        }
    }

    /// Parse the line as an instruction. Labels, directives, comments and
    /// empty lines yield `None`.
    pub fn instr(&self) -> Option<Instr> {
        if self.is_empty() || self.is_comment() || self.is_label() || self.is_directive() {
            return None;
        }
        let caps = patterns::MNEMONIC.captures(self.code())?;
        let op = caps.get(1).unwrap().as_str().to_string();
        let (size, short) = match caps.get(2).map(|m| m.as_str()) {
            Some("s") => (None, true),
            Some(suffix) => (Size::from_suffix(suffix), false),
            None => (None, false),
        };
        let raw: Vec<String> = match caps.get(3) {
            Some(rest) => split_operands(rest.as_str())
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        let ops = raw.iter().map(|t| Operand::parse(t)).collect();
        Some(Instr {
            op,
            size,
            short,
            raw,
            ops,
        })
    }
}

/// A parsed instruction: mnemonic, size suffix, raw operand texts and the
/// classified operands (`None` where classification failed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instr {
    pub op: String,
    pub size: Option<Size>,
    /// `.s` short-branch suffix.
    pub short: bool,
    pub raw: Vec<String>,
    pub ops: Vec<Option<Operand>>,
}

impl Instr {
    pub fn operand(&self, idx: usize) -> Option<&Operand> {
        self.ops.get(idx).and_then(|o| o.as_ref())
    }

    pub fn operand_count(&self) -> usize {
        self.raw.len()
    }

    /// All operands classified successfully.
    pub fn fully_classified(&self) -> bool {
        self.ops.iter().all(|o| o.is_some())
    }
}

/// Split an operand list on top-level commas (commas inside parentheses
/// belong to an addressing mode).
pub fn split_operands(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::Reg;

    #[test]
    fn trims_and_detects_pin() {
        let line = Line::new("  move.l %d0,%d1  ");
        assert_eq!(line.text(), "move.l %d0,%d1");
        assert!(!line.pinned);
        let pinned = Line::new("move.l %d0,%d1 ;# DO_NOT_OPTIMIZE");
        assert!(pinned.pinned);
    }

    #[test]
    fn splits_operands_at_top_level_only() {
        assert_eq!(
            split_operands("8(%a0,%d1.w),%d0"),
            vec!["8(%a0,%d1.w)", "%d0"]
        );
        assert_eq!(split_operands("(8,%sp),%d2"), vec!["(8,%sp)", "%d2"]);
    }

    #[test]
    fn parses_instruction() {
        let line = Line::new("move.l 8(%a0),%d1");
        let instr = line.instr().unwrap();
        assert_eq!(instr.op, "move");
        assert_eq!(instr.size, Some(Size::Long));
        assert_eq!(instr.operand(1), Some(&Operand::Data(Reg::D1)));
    }

    #[test]
    fn short_branch_suffix() {
        let line = Line::new("bra.s .L4");
        let instr = line.instr().unwrap();
        assert_eq!(instr.op, "bra");
        assert!(instr.short);
        assert_eq!(instr.size, None);
    }

    #[test]
    fn labels_and_directives_are_not_instructions() {
        assert!(Line::new(".L2:").instr().is_none());
        assert!(Line::new(".globl main").instr().is_none());
        assert!(Line::new("# comment").instr().is_none());
        assert!(Line::new(".L2:").is_label());
        assert!(Line::new("3:").is_label());
        assert!(Line::new(".even").is_directive());
    }

    #[test]
    fn code_strips_trailing_comment() {
        let line = Line::new("move.l %d0,%d1 | spill");
        assert_eq!(line.code(), "move.l %d0,%d1");
    }
}
