//! Declared-function discovery: the set of names carrying a
//! `.type NAME,@function` directive, and the exported subset also named by
//! a `.globl`. Control-flow analysis consults the declared set to
//! distinguish intra-unit labels from external calls; exported functions
//! are never considered dead.

use std::collections::HashSet;

use core_line::{patterns, Line};

#[derive(Debug, Default, Clone)]
pub struct DeclaredFunctions {
    declared: HashSet<String>,
    globals: HashSet<String>,
}

impl DeclaredFunctions {
    pub fn scan(lines: &[Line]) -> DeclaredFunctions {
        let mut declared = HashSet::new();
        let mut globals = HashSet::new();
        for line in lines {
            if let Some(caps) = patterns::TYPE_FUNCTION.captures(line.text()) {
                declared.insert(caps[1].to_string());
            } else if let Some(caps) = patterns::GLOBL.captures(line.text()) {
                globals.insert(caps[1].to_string());
            }
        }
        DeclaredFunctions { declared, globals }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    /// Declared and exported: visible outside the translation unit.
    pub fn is_exported(&self, name: &str) -> bool {
        self.declared.contains(name) && self.globals.contains(name)
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_type_and_globl() {
        let lines: Vec<Line> = [
            "\t.globl main",
            "\t.type main,@function",
            "main:",
            "\trts",
            "\t.size main,.-main",
            "\t.type helper,@function",
            "helper:",
            "\trts",
        ]
        .iter()
        .map(|t| Line::new(*t))
        .collect();
        let funcs = DeclaredFunctions::scan(&lines);
        assert!(funcs.is_declared("main"));
        assert!(funcs.is_declared("helper"));
        assert!(funcs.is_exported("main"));
        assert!(!funcs.is_exported("helper"));
        assert!(!funcs.is_declared("rts"));
    }
}
