//! Control-flow map for the function enclosing the current scan point:
//! every label definition plus the positions citing it, kept in two halves
//! (already-emitted output vs not-yet-consumed input). Rebuilt per query;
//! building is a pair of linear scans over one function region.

use std::collections::HashMap;

use core_line::{flow_kind, patterns, AsmBuf, FlowKind};

/// Which half of the buffer a position belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Output,
    Input,
}

#[derive(Debug, Default, Clone)]
pub struct ControlFlowEntry {
    pub def_in_output: Option<usize>,
    pub def_in_input: Option<usize>,
    pub refs_in_output: Vec<usize>,
    pub refs_in_input: Vec<usize>,
}

impl ControlFlowEntry {
    pub fn def(&self) -> Option<usize> {
        self.def_in_output.or(self.def_in_input)
    }

    pub fn ref_count(&self) -> usize {
        self.refs_in_output.len() + self.refs_in_input.len()
    }
}

#[derive(Debug, Clone)]
pub struct ControlFlowMap {
    labels: HashMap<String, ControlFlowEntry>,
    /// Function region bounds (absolute buffer indices, end exclusive).
    pub func_start: usize,
    pub func_end: usize,
}

impl ControlFlowMap {
    /// Build for the function enclosing the buffer cursor: the emitted
    /// half is walked backwards to the enclosing `.type`, the pending half
    /// forwards to the `.size` (or the next function declaration).
    pub fn build(buf: &AsmBuf) -> ControlFlowMap {
        let cursor = buf.cursor();
        let mut func_start = 0;
        for idx in (0..cursor).rev() {
            let text = buf.line(idx).text();
            if patterns::TYPE_FUNCTION.is_match(text) {
                func_start = idx;
                break;
            }
            if patterns::SIZE_DIRECTIVE.is_match(text) {
                // Between functions: no enclosing declaration behind us.
                func_start = idx + 1;
                break;
            }
        }
        let mut func_end = buf.len();
        for idx in cursor..buf.len() {
            let text = buf.line(idx).text();
            if patterns::SIZE_DIRECTIVE.is_match(text) || patterns::TYPE_FUNCTION.is_match(text) {
                func_end = idx;
                break;
            }
        }

        let mut labels: HashMap<String, ControlFlowEntry> = HashMap::new();
        for idx in func_start..func_end {
            if let FlowKind::Label(name) = flow_kind(buf.line(idx)) {
                let entry = labels.entry(name).or_default();
                if idx < cursor {
                    entry.def_in_output = Some(idx);
                } else {
                    entry.def_in_input = Some(idx);
                }
            }
        }
        for idx in func_start..func_end {
            let target = match flow_kind(buf.line(idx)) {
                FlowKind::Branch { target } => Some(target),
                FlowKind::Goto { target } => target,
                FlowKind::Call { target } => target,
                _ => None,
            };
            if let Some(target) = target {
                if let Some(entry) = labels.get_mut(&target) {
                    if idx < cursor {
                        entry.refs_in_output.push(idx);
                    } else {
                        entry.refs_in_input.push(idx);
                    }
                }
            }
        }
        ControlFlowMap {
            labels,
            func_start,
            func_end,
        }
    }

    pub fn entry(&self, label: &str) -> Option<&ControlFlowEntry> {
        self.labels.get(label)
    }

    /// Definition position of a label, either side.
    pub fn def(&self, label: &str) -> Option<usize> {
        self.labels.get(label).and_then(|e| e.def())
    }

    pub fn side_of(&self, buf: &AsmBuf, idx: usize) -> Side {
        if idx < buf.cursor() {
            Side::Output
        } else {
            Side::Input
        }
    }

    pub fn contains(&self, idx: usize) -> bool {
        idx >= self.func_start && idx < self.func_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_line::Line;

    fn buf(lines: &[&str], cursor: usize) -> AsmBuf {
        let mut b = AsmBuf::load(lines.iter().map(|l| Line::new(*l)).collect());
        b.set_cursor(cursor);
        b
    }

    #[test]
    fn maps_defs_and_refs_per_side() {
        let b = buf(
            &[
                ".type f,@function",
                "f:",
                ".L1:",
                "move.l %d0,%d1",
                "bne .L1",
                "bra .L2",
                ".L2:",
                "rts",
                ".size f,.-f",
            ],
            5, // cursor after `bne .L1`
        );
        let map = ControlFlowMap::build(&b);
        assert_eq!(map.func_start, 0);
        assert_eq!(map.func_end, 8);
        let l1 = map.entry(".L1").unwrap();
        assert_eq!(l1.def_in_output, Some(2));
        assert_eq!(l1.refs_in_output, vec![4]);
        let l2 = map.entry(".L2").unwrap();
        assert_eq!(l2.def_in_input, Some(6));
        assert_eq!(l2.refs_in_input, vec![5]);
        assert_eq!(map.def(".L2"), Some(6));
    }

    #[test]
    fn external_targets_stay_unresolved() {
        let b = buf(
            &[".type f,@function", "f:", "jsr external", "rts", ".size f,.-f"],
            2,
        );
        let map = ControlFlowMap::build(&b);
        assert!(map.entry("external").is_none());
    }
}
