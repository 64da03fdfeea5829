//! Operand model: size suffixes, displacement values and the GAS m68k
//! addressing-mode surface emitted by gcc.

use std::fmt;

use crate::expr::parse_number;
use crate::register::{parse_movem_list, Reg, RegSet};

/// `.b` / `.w` / `.l` operation size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    pub fn from_suffix(s: &str) -> Option<Size> {
        match s {
            "b" => Some(Size::Byte),
            "w" => Some(Size::Word),
            "l" => Some(Size::Long),
            _ => None,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Size::Byte => "b",
            Size::Word => "w",
            Size::Long => "l",
        }
    }

    pub fn bytes(self) -> i64 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Index-register width in indexed addressing (`%d0.w` / `%d0.l`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSize {
    Word,
    Long,
}

impl IndexSize {
    pub fn suffix(self) -> &'static str {
        match self {
            IndexSize::Word => "w",
            IndexSize::Long => "l",
        }
    }
}

/// A displacement: numeric when it parses as a literal, otherwise the raw
/// symbolic text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Disp {
    Num(i64),
    Sym(String),
}

impl Disp {
    pub fn parse(text: &str) -> Disp {
        match parse_number(text) {
            Some(v) => Disp::Num(v),
            None => Disp::Sym(text.trim().to_string()),
        }
    }

    pub fn num(&self) -> Option<i64> {
        match self {
            Disp::Num(v) => Some(*v),
            Disp::Sym(_) => None,
        }
    }
}

impl fmt::Display for Disp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disp::Num(v) => write!(f, "{v}"),
            Disp::Sym(s) => f.write_str(s),
        }
    }
}

/// One parsed operand. Anything the parser cannot categorize stays out of
/// this enum; callers treat such operands as unclassifiable and give up on
/// the rewrite involving them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// `%d0`
    Data(Reg),
    /// `%a0` / `%sp` / `%fp`
    Addr(Reg),
    /// `(%a0)`
    Indirect(Reg),
    /// `(%a0)+`
    PostInc(Reg),
    /// `-(%a0)`
    PreDec(Reg),
    /// `8(%a0)` or `(8,%a0)`
    Disp { disp: Disp, base: Reg },
    /// `8(%a0,%d1.w)` or `(8,%a0,%d1.w)`
    Index {
        disp: Disp,
        base: Reg,
        index: Reg,
        iwidth: IndexSize,
    },
    /// `8(%pc)` or `(8,%pc)`
    PcDisp { disp: Disp },
    /// `8(%pc,%d1.w)`
    PcIndex {
        disp: Disp,
        index: Reg,
        iwidth: IndexSize,
    },
    /// `#123`
    Imm(Disp),
    /// Absolute address or symbol reference, possibly with `+N`/`-N`/`*N`
    /// arithmetic or a `.w`/`.l` suffix.
    Abs(String),
    /// `%d0-%d3/%a2` movem register list.
    MovemList(RegSet),
}

impl Operand {
    pub fn parse(text: &str) -> Option<Operand> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Some(imm) = text.strip_prefix('#') {
            return Some(Operand::Imm(Disp::parse(imm)));
        }
        if let Some(reg) = Reg::from_name(text) {
            return Some(if reg.is_data() {
                Operand::Data(reg)
            } else {
                Operand::Addr(reg)
            });
        }
        // Movem lists contain '/' or a register range.
        if text.starts_with('%') && (text.contains('/') || text.contains('-')) {
            if let Some(set) = parse_movem_list(text) {
                return Some(Operand::MovemList(set));
            }
        }
        if let Some(inner) = text.strip_prefix("-(").and_then(|t| t.strip_suffix(')')) {
            let reg = Reg::from_name(inner)?;
            return reg.is_addr().then_some(Operand::PreDec(reg));
        }
        if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(")+")) {
            let reg = Reg::from_name(inner)?;
            return reg.is_addr().then_some(Operand::PostInc(reg));
        }
        if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
            if let Some(reg) = Reg::from_name(inner) {
                return reg.is_addr().then_some(Operand::Indirect(reg));
            }
            // `(disp,base[,index.s])` comma form.
            return parse_paren_form(inner, None);
        }
        // `disp(...)` prefix form.
        if let Some(open) = text.find('(') {
            if text.ends_with(')') {
                let disp = &text[..open];
                let inner = &text[open + 1..text.len() - 1];
                if let Some(reg) = Reg::from_name(inner) {
                    let disp = Disp::parse(disp);
                    return if reg.is_addr() {
                        Some(Operand::Disp { disp, base: reg })
                    } else {
                        None
                    };
                }
                if inner == "%pc" {
                    return Some(Operand::PcDisp {
                        disp: Disp::parse(disp),
                    });
                }
                return parse_paren_form(inner, Some(Disp::parse(disp)));
            }
        }
        // Absolute address / symbol reference. Reject anything with
        // register syntax left in it.
        if text.contains('%') || text.contains('(') {
            return None;
        }
        Some(Operand::Abs(text.to_string()))
    }

    /// Every register this operand reads to form an effective address or
    /// provide a source value; the direct-register case is included.
    pub fn referenced_regs(&self) -> RegSet {
        let mut set = RegSet::new();
        match self {
            Operand::Data(r) | Operand::Addr(r) => set.insert(*r),
            Operand::Indirect(r) | Operand::PostInc(r) | Operand::PreDec(r) => set.insert(*r),
            Operand::Disp { base, .. } => set.insert(*base),
            Operand::Index { base, index, .. } => {
                set.insert(*base);
                set.insert(*index);
            }
            Operand::PcIndex { index, .. } => set.insert(*index),
            Operand::MovemList(list) => return *list,
            Operand::PcDisp { .. } | Operand::Imm(_) | Operand::Abs(_) => {}
        }
        set
    }

    /// The directly-named register, when the operand is register-direct.
    pub fn direct_reg(&self) -> Option<Reg> {
        match self {
            Operand::Data(r) | Operand::Addr(r) => Some(*r),
            _ => None,
        }
    }

    /// True when the operand is a memory access (reads or writes through a
    /// computed effective address).
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Operand::Indirect(_)
                | Operand::PostInc(_)
                | Operand::PreDec(_)
                | Operand::Disp { .. }
                | Operand::Index { .. }
                | Operand::PcDisp { .. }
                | Operand::PcIndex { .. }
                | Operand::Abs(_)
        )
    }
}

fn parse_index_part(text: &str) -> Option<(Reg, IndexSize)> {
    let text = text.trim();
    let (reg, width) = match text.rsplit_once('.') {
        Some((reg, "w")) => (reg, IndexSize::Word),
        Some((reg, "l")) => (reg, IndexSize::Long),
        None => (text, IndexSize::Word),
        _ => return None,
    };
    Some((Reg::from_name(reg.trim())?, width))
}

fn parse_paren_form(inner: &str, leading_disp: Option<Disp>) -> Option<Operand> {
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    let (disp, rest) = match leading_disp {
        Some(d) => (d, parts.as_slice()),
        None => {
            if parts.len() < 2 {
                return None;
            }
            // `(aN,Xn.s)` and `(pc,Xn.s)` carry an implicit zero
            // displacement.
            if parts[0] == "%pc" || Reg::from_name(parts[0]).is_some() {
                (Disp::Num(0), parts.as_slice())
            } else {
                (Disp::parse(parts[0]), &parts[1..])
            }
        }
    };
    match rest {
        [base] => {
            if *base == "%pc" {
                return Some(Operand::PcDisp { disp });
            }
            let base = Reg::from_name(base)?;
            base.is_addr().then_some(Operand::Disp { disp, base })
        }
        [base, index] => {
            let (index, iwidth) = parse_index_part(index)?;
            if *base == "%pc" {
                return Some(Operand::PcIndex {
                    disp,
                    index,
                    iwidth,
                });
            }
            let base = Reg::from_name(base)?;
            base.is_addr().then_some(Operand::Index {
                disp,
                base,
                index,
                iwidth,
            })
        }
        _ => None,
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Data(r) | Operand::Addr(r) => f.write_str(r.name()),
            Operand::Indirect(r) => write!(f, "({})", r.name()),
            Operand::PostInc(r) => write!(f, "({})+", r.name()),
            Operand::PreDec(r) => write!(f, "-({})", r.name()),
            Operand::Disp { disp, base } => write!(f, "{disp}({})", base.name()),
            Operand::Index {
                disp,
                base,
                index,
                iwidth,
            } => write!(
                f,
                "{disp}({},{}.{})",
                base.name(),
                index.name(),
                iwidth.suffix()
            ),
            Operand::PcDisp { disp } => write!(f, "{disp}(%pc)"),
            Operand::PcIndex {
                disp,
                index,
                iwidth,
            } => write!(f, "{disp}(%pc,{}.{})", index.name(), iwidth.suffix()),
            Operand::Imm(v) => write!(f, "#{v}"),
            Operand::Abs(s) => f.write_str(s),
            Operand::MovemList(set) => f.write_str(&crate::register::format_movem_list(*set)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_and_indirect_forms() {
        assert_eq!(Operand::parse("%d3"), Some(Operand::Data(Reg::D3)));
        assert_eq!(Operand::parse("%sp"), Some(Operand::Addr(Reg::A7)));
        assert_eq!(Operand::parse("(%a0)"), Some(Operand::Indirect(Reg::A0)));
        assert_eq!(Operand::parse("(%a0)+"), Some(Operand::PostInc(Reg::A0)));
        assert_eq!(Operand::parse("-(%sp)"), Some(Operand::PreDec(Reg::A7)));
    }

    #[test]
    fn displacement_forms_agree() {
        let prefix = Operand::parse("8(%a0)").unwrap();
        let comma = Operand::parse("(8,%a0)").unwrap();
        assert_eq!(prefix, comma);
        assert_eq!(
            prefix,
            Operand::Disp {
                disp: Disp::Num(8),
                base: Reg::A0
            }
        );
    }

    #[test]
    fn indexed_forms() {
        assert_eq!(
            Operand::parse("-6(%a2,%d1.w)"),
            Some(Operand::Index {
                disp: Disp::Num(-6),
                base: Reg::A2,
                index: Reg::D1,
                iwidth: IndexSize::Word,
            })
        );
        assert_eq!(
            Operand::parse("2(%pc,%d0.l)"),
            Some(Operand::PcIndex {
                disp: Disp::Num(2),
                index: Reg::D0,
                iwidth: IndexSize::Long,
            })
        );
        // Implicit zero displacement.
        assert_eq!(
            Operand::parse("(%a0,%d0.l)"),
            Some(Operand::Index {
                disp: Disp::Num(0),
                base: Reg::A0,
                index: Reg::D0,
                iwidth: IndexSize::Long,
            })
        );
    }

    #[test]
    fn immediates_and_symbols() {
        assert_eq!(Operand::parse("#100"), Some(Operand::Imm(Disp::Num(100))));
        assert_eq!(
            Operand::parse("#0xFF"),
            Some(Operand::Imm(Disp::Num(255)))
        );
        assert_eq!(
            Operand::parse("table+4"),
            Some(Operand::Abs("table+4".to_string()))
        );
    }

    #[test]
    fn movem_list_operand() {
        let op = Operand::parse("%d2-%d4/%a2").unwrap();
        match op {
            Operand::MovemList(set) => assert_eq!(set.len(), 4),
            other => panic!("unexpected operand {other:?}"),
        }
    }

    #[test]
    fn display_round_trips() {
        for text in [
            "%d0", "(%a1)", "(%a1)+", "-(%sp)", "8(%a0)", "-6(%a2,%d1.w)", "#42", "label",
        ] {
            let op = Operand::parse(text).unwrap();
            let shown = op.to_string();
            assert_eq!(Operand::parse(&shown), Some(op), "round trip of {text}");
        }
    }
}
